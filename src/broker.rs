//! Action broker: the safety layer between an alert and any side effect.
//!
//! Dispatch order for a suggested action:
//! 1. fire-and-forget webhook notification (if configured)
//! 2. allowlist filter
//! 3. strict target validation — `ban_ip` targets must parse as an IP
//!    address; this is the command-injection barrier for attacker-controlled
//!    log fields
//! 4. `notify_admin` completes after the webhook
//! 5. executor dispatch over the Unix socket (gated by active defense)
//! 6. without an executor, the OS command is only ever built for logging
//!
//! The broker never runs privileged commands itself; privileged work happens
//! exclusively on the other side of the executor socket.

use std::net::IpAddr;
use std::sync::RwLock;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::io::AsyncWriteExt;
use tokio::net::UnixStream;
use tracing::{info, warn};

use crate::alerts::{Alert, SuggestedAction};

const NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// Runtime-reloadable broker settings.
#[derive(Debug, Clone, Default)]
pub struct BrokerConfig {
    /// When false, every real action becomes a dry-run log line.
    pub active_defense: bool,
    /// Targets that are never acted upon.
    pub allowlist: Vec<String>,
    /// Webhook URL for notifications (empty = disabled).
    pub notify_webhook: String,
    /// Unix socket path of the privileged executor (empty = disabled).
    pub executor_socket: String,
}

pub struct ActionBroker {
    // Reads vastly outnumber the SIGHUP-driven writes.
    config: RwLock<BrokerConfig>,
    http: reqwest::Client,
}

impl ActionBroker {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            http: reqwest::Client::builder()
                .timeout(NOTIFY_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Swap in new settings at runtime (SIGHUP reload path).
    pub fn update_config(&self, config: BrokerConfig) {
        let mut current = self.config.write().expect("broker config lock poisoned");
        *current = config;
        info!("broker configuration updated");
    }

    /// Process an alert's suggested action through the dispatch chain.
    pub async fn execute(&self, alert: &Alert) -> Result<()> {
        let Some(action) = &alert.suggested_action else {
            return Ok(());
        };

        // Copy settings out under the read lock; never hold it across awaits.
        let config = {
            let guard = self.config.read().expect("broker config lock poisoned");
            guard.clone()
        };

        if !config.notify_webhook.is_empty() {
            self.spawn_notify(alert.clone(), config.notify_webhook.clone());
        }

        if config.allowlist.iter().any(|allowed| allowed == &action.target) {
            info!(target = %action.target, "action blocked by allowlist");
            return Ok(());
        }

        if action.kind == "ban_ip" && !is_valid_ip(&action.target) {
            warn!(
                target = %action.target,
                "action blocked: target is not a valid IP (possible injection attempt)"
            );
            return Ok(());
        }

        if action.kind == "notify_admin" {
            info!(summary = %alert.summary, "admin notification dispatched");
            return Ok(());
        }

        if !config.executor_socket.is_empty() {
            if !config.active_defense {
                info!(target = %action.target, "safe mode: would send to executor: ban");
                return Ok(());
            }
            return self
                .send_to_executor(&config.executor_socket, "ban", &action.target)
                .await;
        }

        // No executor configured: build the command line for the operator's
        // benefit only. An unprivileged analyzer cannot usefully run it.
        if let Some(command) = build_command(action) {
            if config.active_defense {
                warn!(%command, "no executor configured; cannot apply action");
            } else {
                info!(%command, "safe mode: would execute");
            }
        }

        Ok(())
    }

    /// Fire-and-forget webhook POST; errors are logged, never propagated.
    fn spawn_notify(&self, alert: Alert, webhook: String) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let body = serde_json::json!({ "content": format_notification(&alert) });
            match http.post(&webhook).json(&body).send().await {
                Ok(response) if !response.status().is_success() => {
                    warn!(status = %response.status(), "webhook notification rejected");
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "failed to send webhook notification"),
            }
        });
    }

    /// Send one `"<verb> <target>\n"` line to the privileged executor and
    /// close the connection. The connection closing without error is the
    /// implicit success signal.
    async fn send_to_executor(&self, socket: &str, verb: &str, target: &str) -> Result<()> {
        let mut stream = UnixStream::connect(socket)
            .await
            .with_context(|| format!("failed to connect to executor at {}", socket))?;

        stream
            .write_all(format!("{} {}\n", verb, target).as_bytes())
            .await
            .context("failed to send command to executor")?;
        stream
            .shutdown()
            .await
            .context("failed to close executor connection")?;

        info!(verb, target, "command sent to privileged executor");
        Ok(())
    }
}

/// Human-readable multi-line webhook message.
fn format_notification(alert: &Alert) -> String {
    let action = alert
        .suggested_action
        .as_ref()
        .map(|a| format!("{} {}", a.kind, a.target))
        .unwrap_or_else(|| "none".to_string());
    format!(
        "**[{}] sentrygate alert**\n**Summary**: {}\n**Risk**: {}\n**Source**: {}\n**Action**: {}\n\n`{}`",
        alert.timestamp.format("%H:%M:%S"),
        alert.summary,
        alert.risk,
        alert.source,
        action,
        alert.explanation
    )
}

/// Build the OS command string for logging. Returns `None` for action kinds
/// the fallback path does not model.
fn build_command(action: &SuggestedAction) -> Option<String> {
    if action.kind == "ban_ip" && !is_valid_ip(&action.target) {
        return None;
    }
    match action.kind.as_str() {
        "ban_ip" => Some(format!(
            "iptables -A INPUT -s {} -j DROP # duration: {}",
            action.target, action.duration
        )),
        _ => None,
    }
}

fn is_valid_ip(target: &str) -> bool {
    target.parse::<IpAddr>().is_ok()
}
