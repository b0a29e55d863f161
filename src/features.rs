//! Per-IP feature accumulation with bounded state.
//!
//! The accumulator is the only stateful piece of the detection path. It maps
//! source IPs to sliding counters under three hard bounds so adversarial
//! input cannot grow memory without limit:
//!
//! - at most [`MAX_TRACKED_IPS`] vectors; inserting past the cap evicts the
//!   least interesting entry (lowest failure count, oldest activity)
//! - per-IP distinct-user and distinct-path sets stop growing at
//!   [`MAX_USERS_PER_IP`] / [`MAX_PATHS_PER_IP`]; counters keep advancing
//! - a minute sweep deletes vectors idle past the window
//!
//! All mutation is serialized under a single mutex. `add_*` return a clone of
//! the updated vector so callers evaluate rules without holding the lock.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const MAX_TRACKED_IPS: usize = 5000;
pub const MAX_USERS_PER_IP: usize = 50;
pub const MAX_PATHS_PER_IP: usize = 50;

/// Upper bound on the eviction scan. The table cap keeps this unreachable
/// today; it guards against a future cap raise turning eviction into a stall.
const EVICTION_SCAN_LIMIT: usize = 10_000;

const CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// Sliding counters for one entity (a source IP).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureVector {
    pub ip: String,
    pub failed_logins: u64,
    pub distinct_users: HashSet<String>,
    pub http_404_count: u64,
    pub distinct_paths: HashSet<String>,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
}

impl FeatureVector {
    fn new(ip: &str, now: DateTime<Utc>) -> Self {
        Self {
            ip: ip.to_string(),
            failed_logins: 0,
            distinct_users: HashSet::new(),
            http_404_count: 0,
            distinct_paths: HashSet::new(),
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Concurrency-safe, bounded, time-windowed feature store.
pub struct Accumulator {
    features: Mutex<HashMap<String, FeatureVector>>,
    window: chrono::Duration,
}

impl Accumulator {
    /// `window` is the idle duration after which an entity becomes eligible
    /// for the minute sweep.
    pub fn new(window: Duration) -> Self {
        Self {
            features: Mutex::new(HashMap::new()),
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::hours(1)),
        }
    }

    /// Record a failed login attempt; returns the updated vector.
    pub fn add_failure(&self, ip: &str, user: &str) -> FeatureVector {
        let now = Utc::now();
        let mut features = self.features.lock().expect("accumulator lock poisoned");

        Self::make_room(&mut features, ip);
        let feat = features
            .entry(ip.to_string())
            .or_insert_with(|| FeatureVector::new(ip, now));

        feat.failed_logins += 1;
        if feat.distinct_users.len() < MAX_USERS_PER_IP {
            feat.distinct_users.insert(user.to_string());
        }
        feat.last_seen = now;

        feat.clone()
    }

    /// Record a 404 response; returns the updated vector.
    pub fn add_http_404(&self, ip: &str, path: &str) -> FeatureVector {
        let now = Utc::now();
        let mut features = self.features.lock().expect("accumulator lock poisoned");

        Self::make_room(&mut features, ip);
        let feat = features
            .entry(ip.to_string())
            .or_insert_with(|| FeatureVector::new(ip, now));

        feat.http_404_count += 1;
        if feat.distinct_paths.len() < MAX_PATHS_PER_IP {
            feat.distinct_paths.insert(path.to_string());
        }
        feat.last_seen = now;

        feat.clone()
    }

    /// Current vector for an IP, if tracked.
    pub fn get(&self, ip: &str) -> Option<FeatureVector> {
        let features = self.features.lock().expect("accumulator lock poisoned");
        features.get(ip).cloned()
    }

    /// Snapshot of the whole table, for persistence.
    pub fn get_all(&self) -> HashMap<String, FeatureVector> {
        let features = self.features.lock().expect("accumulator lock poisoned");
        features.clone()
    }

    /// Replace the whole table, used to restore persisted counters at startup.
    pub fn replace_all(&self, vectors: HashMap<String, FeatureVector>) {
        let mut features = self.features.lock().expect("accumulator lock poisoned");
        *features = vectors;
    }

    /// Number of tracked entities.
    pub fn len(&self) -> usize {
        let features = self.features.lock().expect("accumulator lock poisoned");
        features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Delete every vector idle past the window. Returns how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = Utc::now();
        let window = self.window;
        let mut features = self.features.lock().expect("accumulator lock poisoned");
        let before = features.len();
        features.retain(|_, feat| now - feat.last_seen <= window);
        before - features.len()
    }

    /// Spawn the background sweep task on a fixed cadence. The task runs for
    /// the lifetime of the runtime.
    pub fn spawn_cleanup(self: &Arc<Self>) {
        let acc = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(CLEANUP_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let removed = acc.sweep_expired();
                if removed > 0 {
                    debug!(removed, "swept expired feature vectors");
                }
            }
        });
    }

    /// Ensure the table has room for `ip`, evicting if necessary.
    /// Caller must hold the lock.
    fn make_room(features: &mut HashMap<String, FeatureVector>, ip: &str) {
        if features.len() >= MAX_TRACKED_IPS && !features.contains_key(ip) {
            Self::evict_low_priority(features);
        }
    }

    /// Remove the least interesting entry: lowest failure count first (noise),
    /// oldest activity as the tiebreak. The noisiest long-lived attackers are
    /// preserved. Caller must hold the lock.
    fn evict_low_priority(features: &mut HashMap<String, FeatureVector>) {
        let mut victim: Option<String> = None;
        let mut lowest_logins = u64::MAX;
        let mut oldest: DateTime<Utc> = Utc::now();

        for (count, (ip, feat)) in features.iter().enumerate() {
            if feat.failed_logins < lowest_logins
                || (feat.failed_logins == lowest_logins && feat.last_seen < oldest)
            {
                lowest_logins = feat.failed_logins;
                oldest = feat.last_seen;
                victim = Some(ip.clone());
            }
            if count >= EVICTION_SCAN_LIMIT {
                break;
            }
        }

        if let Some(ip) = victim {
            features.remove(&ip);
        } else if let Some(ip) = features.keys().next().cloned() {
            // Degenerate case (e.g. every entry newer than "now"): drop one
            // arbitrary entry so the insert can proceed.
            features.remove(&ip);
        }
    }
}
