//! Feature-vector persistence across restarts.
//!
//! Snapshots the accumulator to a JSON file on shutdown and SIGHUP, and
//! restores it through `replace_all` at startup. The write goes through a
//! temp file plus rename so a crash mid-write never corrupts the previous
//! snapshot. Load failures are non-fatal; the daemon starts cold.

use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::features::FeatureVector;

pub struct StateStore {
    path: PathBuf,
}

impl StateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Persist a snapshot, replacing any previous one atomically.
    pub fn save(&self, vectors: &HashMap<String, FeatureVector>) -> Result<()> {
        let json = serde_json::to_vec(vectors).context("failed to encode state")?;

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, &json)
            .with_context(|| format!("failed to write state file {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("failed to replace state file {}", self.path.display()))?;

        Ok(())
    }

    /// Load the last snapshot. A missing file is an empty snapshot, not an
    /// error.
    pub fn load(&self) -> Result<HashMap<String, FeatureVector>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(HashMap::new());
            }
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("failed to read state file {}", self.path.display())
                });
            }
        };

        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse state file {}", self.path.display()))
    }
}
