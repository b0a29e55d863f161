//! Privileged executor: the root-owned side of the privilege boundary.
//!
//! Listens on a local Unix domain socket for newline-delimited commands of
//! the form `"<verb> <ip>"` where verb is `ban` or `unban`. Every target is
//! re-validated as a parseable IP before any firewall rule is touched; the
//! socket carries no other trust. Connections are served concurrently and a
//! failure on one never brings down the listener.

use std::net::IpAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Ban,
    Unban,
}

pub struct Executor {
    socket_path: PathBuf,
}

impl Executor {
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    /// Bind the socket and serve connections until the process exits.
    pub async fn run(&self) -> Result<()> {
        // Remove a stale socket from a previous run.
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path).with_context(|| {
            format!(
                "failed to bind executor socket at {}",
                self.socket_path.display()
            )
        })?;

        // Group-accessible so the unprivileged analyzer account can connect.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.socket_path, std::fs::Permissions::from_mode(0o660))
                .with_context(|| {
                    format!(
                        "failed to set permissions on {}",
                        self.socket_path.display()
                    )
                })?;
        }

        info!(socket = %self.socket_path.display(), "executor listening");

        loop {
            match listener.accept().await {
                Ok((stream, _)) => {
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream).await {
                            warn!(error = %e, "executor connection error");
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "executor accept error");
                }
            }
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

async fn handle_connection(stream: UnixStream) -> Result<()> {
    let mut lines = BufReader::new(stream).lines();
    while let Some(line) = lines.next_line().await? {
        match parse_command(&line) {
            Some((verb, ip)) => apply(verb, ip).await,
            None => {
                warn!(%line, "executor rejected command");
            }
        }
    }
    Ok(())
}

/// Parse one command line. Requires exactly two whitespace-separated tokens,
/// a known verb, and a target that parses as an IP address.
fn parse_command(line: &str) -> Option<(Verb, IpAddr)> {
    let mut tokens = line.split_whitespace();
    let verb = tokens.next()?;
    let target = tokens.next()?;
    if tokens.next().is_some() {
        return None;
    }

    let verb = match verb {
        "ban" => Verb::Ban,
        "unban" => Verb::Unban,
        _ => return None,
    };

    let ip: IpAddr = target.parse().ok()?;
    Some((verb, ip))
}

/// Install or remove the drop rule. Failures are logged; the listener keeps
/// serving.
async fn apply(verb: Verb, ip: IpAddr) {
    let (flag, label) = match verb {
        Verb::Ban => ("-A", "ban"),
        Verb::Unban => ("-D", "unban"),
    };

    info!(%ip, action = label, "applying firewall rule");

    let result = tokio::process::Command::new("iptables")
        .args([flag, "INPUT", "-s", &ip.to_string(), "-j", "DROP"])
        .status()
        .await;

    match result {
        Ok(status) if status.success() => {}
        Ok(status) => {
            warn!(%ip, action = label, %status, "iptables exited with failure");
        }
        Err(e) => {
            warn!(%ip, action = label, error = %e, "failed to run iptables");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ban_command() {
        let (verb, ip) = parse_command("ban 192.168.1.100").unwrap();
        assert_eq!(verb, Verb::Ban);
        assert_eq!(ip.to_string(), "192.168.1.100");
    }

    #[test]
    fn test_parse_unban_command() {
        let (verb, ip) = parse_command("unban 2001:db8::1").unwrap();
        assert_eq!(verb, Verb::Unban);
        assert_eq!(ip.to_string(), "2001:db8::1");
    }

    #[test]
    fn test_rejects_single_token() {
        assert!(parse_command("ban").is_none());
        assert!(parse_command("").is_none());
    }

    #[test]
    fn test_rejects_extra_tokens() {
        assert!(parse_command("ban 1.2.3.4 now").is_none());
    }

    #[test]
    fn test_rejects_unknown_verb() {
        assert!(parse_command("nuke 1.2.3.4").is_none());
    }

    #[test]
    fn test_rejects_non_ip_target() {
        assert!(parse_command("ban example.com").is_none());
        assert!(parse_command("ban 1.2.3.4;reboot").is_none());
        assert!(parse_command("ban $(id)").is_none());
    }

    #[test]
    fn test_leading_whitespace_tolerated() {
        // split_whitespace ignores leading/trailing runs.
        assert!(parse_command("  ban 10.0.0.1  ").is_some());
    }

    #[tokio::test]
    async fn test_socket_lifecycle_and_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("executor.sock");
        // Simulate a stale socket from a crashed run.
        std::fs::write(&path, b"stale").unwrap();

        let executor = Executor::new(&path);
        let run_path = executor.socket_path().to_path_buf();
        tokio::spawn(async move { executor.run().await });

        // Give the listener a moment to bind.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        let meta = std::fs::metadata(&run_path).unwrap();
        assert_eq!(meta.permissions().mode() & 0o777, 0o660);

        // The analyzer side can connect and disconnect cleanly.
        let stream = UnixStream::connect(&run_path).await.unwrap();
        drop(stream);
    }
}
