//! Configuration loading and serialization.
//!
//! Defines the TOML configuration schema for sentrygate. All sections and
//! fields use `#[serde(default)]` so a sparse config file gracefully falls
//! back to sensible defaults. Load with [`Config::load`].
//!
//! Log paths are read once at startup; changing them requires a restart
//! because the tailer tasks own their files. Detection and action settings
//! (rules, allowlist, webhook, executor socket, active defense) are applied
//! live on SIGHUP via the broker.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::alerts::Risk;

/// Root configuration struct, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub notification: NotificationConfig,
    #[serde(default)]
    pub action: ActionConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

/// Log sources to ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// SSH auth log (always tailed).
    #[serde(default = "default_auth_log_path")]
    pub auth_log_path: String,
    /// Generic syslog for MySQL/sudo events (empty = disabled).
    #[serde(default)]
    pub syslog_path: String,
    /// Nginx/Apache access log in Combined Log Format (empty = disabled).
    #[serde(default)]
    pub web_log_path: String,
    /// Follow the systemd journal via journalctl.
    #[serde(default)]
    pub enable_journald: bool,
}

fn default_auth_log_path() -> String {
    "/var/log/auth.log".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            auth_log_path: default_auth_log_path(),
            syslog_path: String::new(),
            web_log_path: String::new(),
            enable_journald: false,
        }
    }
}

/// Detection engine settings: rules, allowlist, and LLM enrichment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Enrich alert explanations through a local LLM endpoint.
    #[serde(default)]
    pub enable_local_llm: bool,
    #[serde(default = "default_llm_url")]
    pub local_llm_url: String,
    #[serde(default = "default_llm_model")]
    pub local_llm_model: String,
    /// When false, every real action is gated to a dry-run log line.
    #[serde(default)]
    pub active_defense: bool,
    /// IPs that are never acted upon.
    #[serde(default)]
    pub allowlist: Vec<String>,
    /// Detection rules; empty installs the built-in defaults.
    #[serde(default)]
    pub rules: Vec<DetectionRule>,
}

fn default_llm_url() -> String {
    "http://localhost:11434/api/generate".to_string()
}

fn default_llm_model() -> String {
    "tinyllama".to_string()
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            enable_local_llm: false,
            local_llm_url: default_llm_url(),
            local_llm_model: default_llm_model(),
            active_defense: false,
            allowlist: Vec::new(),
            rules: Vec::new(),
        }
    }
}

/// A configurable threshold rule over one accumulator metric.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionRule {
    pub name: String,
    /// Rule kind; only "threshold" is evaluated.
    #[serde(rename = "type", default = "default_rule_kind")]
    pub kind: String,
    /// "failed_logins" or "http_404_count".
    pub metric: String,
    pub threshold: u64,
    /// Suggested action kind, e.g. "ban_ip".
    pub action: String,
    /// Human-readable ban duration, e.g. "1h".
    pub duration: String,
    pub risk: Risk,
    /// Alert summary used verbatim when the rule fires.
    pub summary: String,
}

fn default_rule_kind() -> String {
    "threshold".to_string()
}

/// Outbound notification settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Discord-style webhook URL (empty = disabled).
    #[serde(default)]
    pub discord_webhook: String,
}

/// Privileged executor connection settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionConfig {
    /// Unix domain socket path of the privileged executor (empty = disabled).
    #[serde(default)]
    pub executor_socket: String,
}

/// Audit trail and persistence output settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_audit_log_path")]
    pub audit_log_path: String,
    /// Audit record format; only "json" is implemented.
    #[serde(default = "default_format")]
    pub format: String,
    /// Where feature-vector snapshots persist across restarts.
    #[serde(default = "default_state_path")]
    pub state_path: String,
}

fn default_audit_log_path() -> String {
    "audit.log".to_string()
}

fn default_format() -> String {
    "json".to_string()
}

fn default_state_path() -> String {
    "sentrygate-state.json".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            audit_log_path: default_audit_log_path(),
            format: default_format(),
            state_path: default_state_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.input.auth_log_path, "/var/log/auth.log");
        assert_eq!(config.detection.local_llm_url, "http://localhost:11434/api/generate");
        assert_eq!(config.detection.local_llm_model, "tinyllama");
        assert_eq!(config.output.format, "json");
        assert!(!config.detection.active_defense);
        assert!(config.detection.rules.is_empty());
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.input.auth_log_path, "/var/log/auth.log");
        assert!(!config.input.enable_journald);
        assert_eq!(config.output.audit_log_path, "audit.log");
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
[input]
syslog_path = "/var/log/syslog"
"#,
        )
        .unwrap();
        assert_eq!(config.input.syslog_path, "/var/log/syslog");
        assert_eq!(config.input.auth_log_path, "/var/log/auth.log");
    }

    #[test]
    fn test_rules_parse() {
        let config: Config = toml::from_str(
            r#"
[detection]
active_defense = true
allowlist = ["8.8.8.8"]

[[detection.rules]]
name = "custom_ssh"
type = "threshold"
metric = "failed_logins"
threshold = 3
action = "ban_ip"
duration = "30m"
risk = "medium"
summary = "Custom SSH Alert"
"#,
        )
        .unwrap();
        assert!(config.detection.active_defense);
        assert_eq!(config.detection.allowlist, vec!["8.8.8.8"]);
        let rule = &config.detection.rules[0];
        assert_eq!(rule.metric, "failed_logins");
        assert_eq!(rule.threshold, 3);
        assert_eq!(rule.risk, Risk::Medium);
        assert_eq!(rule.summary, "Custom SSH Alert");
    }

    #[test]
    fn test_rule_kind_defaults_to_threshold() {
        let config: Config = toml::from_str(
            r#"
[[detection.rules]]
name = "r"
metric = "http_404_count"
threshold = 10
action = "ban_ip"
duration = "1h"
risk = "low"
summary = "s"
"#,
        )
        .unwrap();
        assert_eq!(config.detection.rules[0].kind, "threshold");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[notification]\ndiscord_webhook = \"https://example.invalid/hook\"").unwrap();
        file.flush().unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.notification.discord_webhook, "https://example.invalid/hook");
    }

    #[test]
    fn test_load_missing_file_errors() {
        let err = Config::load(Path::new("/nonexistent/sentrygate.toml")).unwrap_err();
        assert!(err.to_string().contains("failed to read config file"));
    }
}
