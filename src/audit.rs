//! Append-only audit trail.
//!
//! One JSON-serialized alert per line, so every record is independently
//! recoverable. The file is opened create-or-append with mode 0600 and
//! writes are serialized by a mutex.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::alerts::Alert;

pub struct AuditLogger {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuditLogger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Append one alert as a single JSON line.
    pub fn log_alert(&self, alert: &Alert) -> Result<()> {
        let _guard = self.lock.lock().expect("audit lock poisoned");

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("failed to open audit log {}", self.path.display()))?;

        let json = serde_json::to_string(alert).context("failed to encode alert")?;
        writeln!(file, "{}", json)
            .with_context(|| format!("failed to write audit log {}", self.path.display()))?;

        Ok(())
    }
}

/// Read every parseable alert from an audit log. Unparseable lines are
/// skipped and counted.
pub fn read_audit_log(path: &Path) -> Result<(Vec<Alert>, usize)> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("failed to open audit log {}", path.display()))?;

    let mut alerts = Vec::new();
    let mut skipped = 0;
    for line in BufReader::new(file).lines() {
        let line = line.context("failed to read audit log line")?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<Alert>(&line) {
            Ok(alert) => alerts.push(alert),
            Err(_) => skipped += 1,
        }
    }

    Ok((alerts, skipped))
}
