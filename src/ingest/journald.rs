//! systemd journal source.
//!
//! Spawns `journalctl -f -o json` and re-emits entries in the classic syslog
//! shape (`"<identifier>[<pid>]: <message>"`) so the same parsers handle
//! journal and file input.
//!
//! Anti-spoofing: any unprivileged user can run `logger -t sshd ...` and
//! inject arbitrary `sshd`-tagged journal entries. Entries claiming the
//! `sshd` identifier are therefore dropped unless their `_UID` field is `0`
//! (the kernel-attested uid of the writing process).

use anyhow::{Context, Result};
use serde::Deserialize;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{LogLine, CHANNEL_CAPACITY};

/// The journal fields we care about, as emitted by `journalctl -o json`.
#[derive(Debug, Deserialize)]
struct JournalEntry {
    #[serde(rename = "MESSAGE", default)]
    message: String,
    #[serde(rename = "SYSLOG_IDENTIFIER", default)]
    identifier: String,
    #[serde(rename = "_PID", default)]
    pid: String,
    #[serde(rename = "_UID", default)]
    uid: String,
}

/// Parse one journal JSON line, apply the anti-spoof rule, and reformat to
/// the syslog shape. Returns `None` for malformed or rejected entries.
pub fn filter_entry(line: &str) -> Option<String> {
    let entry: JournalEntry = match serde_json::from_str(line) {
        Ok(entry) => entry,
        Err(_) => {
            // Malformed (possibly partial) journal output; skip.
            return None;
        }
    };

    if entry.identifier == "sshd" && entry.uid != "0" {
        warn!(uid = %entry.uid, pid = %entry.pid, "dropped spoofed sshd journal entry");
        return None;
    }

    Some(format!(
        "{}[{}]: {}",
        entry.identifier, entry.pid, entry.message
    ))
}

pub struct JournalReader {
    shutdown: watch::Receiver<bool>,
}

impl JournalReader {
    pub fn new(shutdown: watch::Receiver<bool>) -> Self {
        Self { shutdown }
    }

    /// Spawn journalctl and return the line channel. Fails when journalctl
    /// cannot be started (not a systemd system).
    pub fn start(self) -> Result<mpsc::Receiver<LogLine>> {
        let mut child = tokio::process::Command::new("journalctl")
            .args(["-f", "-o", "json"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context("failed to start journalctl (not a systemd system?)")?;

        let stdout = child
            .stdout
            .take()
            .context("failed to capture journalctl stdout")?;

        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut shutdown = self.shutdown;

        info!("journal reader started");

        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            debug!("journal reader stopping");
                            let _ = child.kill().await;
                            return;
                        }
                    }
                    line = lines.next_line() => {
                        match line {
                            Ok(Some(line)) => {
                                if let Some(content) = filter_entry(&line) {
                                    if tx.send(LogLine::now("journald", content)).await.is_err() {
                                        let _ = child.kill().await;
                                        return;
                                    }
                                }
                            }
                            Ok(None) => {
                                // journalctl exited; close the channel.
                                warn!("journalctl stream ended");
                                let _ = child.wait().await;
                                return;
                            }
                            Err(e) => {
                                warn!(error = %e, "journal read error");
                                let _ = child.kill().await;
                                return;
                            }
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spoofed_sshd_entry_dropped() {
        let line = r#"{"SYSLOG_IDENTIFIER":"sshd","_UID":"1000","_PID":"4242","MESSAGE":"Failed password for root from 9.9.9.9"}"#;
        assert!(filter_entry(line).is_none());
    }

    #[test]
    fn test_root_sshd_entry_passes() {
        let line = r#"{"SYSLOG_IDENTIFIER":"sshd","_UID":"0","_PID":"811","MESSAGE":"Failed password for root from 9.9.9.9 port 22 ssh2"}"#;
        let content = filter_entry(line).unwrap();
        assert_eq!(
            content,
            "sshd[811]: Failed password for root from 9.9.9.9 port 22 ssh2"
        );
    }

    #[test]
    fn test_sshd_entry_without_uid_dropped() {
        // No _UID field at all: cannot attest, so the sshd claim is rejected.
        let line = r#"{"SYSLOG_IDENTIFIER":"sshd","_PID":"1","MESSAGE":"hello"}"#;
        assert!(filter_entry(line).is_none());
    }

    #[test]
    fn test_non_sshd_identifier_passes_any_uid() {
        let line = r#"{"SYSLOG_IDENTIFIER":"cron","_UID":"1000","_PID":"77","MESSAGE":"job finished"}"#;
        assert_eq!(filter_entry(line).unwrap(), "cron[77]: job finished");
    }

    #[test]
    fn test_malformed_json_dropped() {
        assert!(filter_entry("{not json").is_none());
        assert!(filter_entry("").is_none());
    }

    #[test]
    fn test_reformatted_shape_parses_as_ssh_line() {
        // The reformat exists so journal entries flow through the same
        // parsers as auth.log lines.
        use crate::parse::{EventKind, SshParser};

        let line = r#"{"SYSLOG_IDENTIFIER":"sshd","_UID":"0","_PID":"811","MESSAGE":"Failed password for invalid user admin from 203.0.113.50 port 9 ssh2"}"#;
        let content = filter_entry(line).unwrap();

        let evt = SshParser::new().parse(&content).unwrap();
        assert_eq!(evt.kind, EventKind::LoginFailed);
        assert_eq!(evt.ip, "203.0.113.50");
        assert_eq!(evt.user, "admin");
    }

    #[test]
    fn test_array_message_is_rejected() {
        // journalctl emits binary messages as byte arrays; those fail string
        // deserialization and are skipped rather than crashing the reader.
        let line = r#"{"SYSLOG_IDENTIFIER":"app","_UID":"0","_PID":"1","MESSAGE":[104,105]}"#;
        assert!(filter_entry(line).is_none());
    }
}
