//! Core alert types shared across all sentrygate modules.
//!
//! The rule engine produces [`Alert`] values; the explainer enriches them, the
//! broker acts on them, and the audit writer persists them as one JSON object
//! per line. After the explainer runs an alert is treated as immutable.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Risk level attached to an alert, ordered from lowest to highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Risk {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Risk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Risk::Info => write!(f, "info"),
            Risk::Low => write!(f, "low"),
            Risk::Medium => write!(f, "medium"),
            Risk::High => write!(f, "high"),
            Risk::Critical => write!(f, "critical"),
        }
    }
}

/// A key-value pair supporting a detection (counts, cardinalities, raw strings).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: serde_json::Value,
}

impl Evidence {
    pub fn new(kind: &str, value: impl Into<serde_json::Value>) -> Self {
        Self {
            kind: kind.to_string(),
            value: value.into(),
        }
    }
}

/// The reaction an alert proposes (e.g. `ban_ip 203.0.113.7 1h`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuggestedAction {
    #[serde(rename = "type")]
    pub kind: String,
    pub target: String,
    pub duration: String,
}

/// A structured security event emitted by the rule engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Unique per emission.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// Which subsystem flagged it (e.g. "rule_engine", "mysql", "ssh").
    pub source: String,
    pub risk: Risk,
    /// 1.0 for hard rules, 0.9 for threshold rules.
    pub confidence: f64,
    pub summary: String,
    pub explanation: String,
    pub evidence: Vec<Evidence>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_action: Option<SuggestedAction>,
    /// Operating mode the alert was raised under, e.g. "advisory".
    pub mode: String,
}

impl Alert {
    /// Generate a fresh alert id.
    pub fn next_id() -> String {
        format!("evt_{}", Uuid::new_v4().simple())
    }
}
