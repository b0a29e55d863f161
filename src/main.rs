//! sentrygate — host log sentry with privilege-separated active defense.
//!
//! Subcommands:
//! - `run`: the unprivileged analyzer — tails configured logs, detects
//!   brute-force and scan behavior, emits alerts, and asks the executor for
//!   bans over a Unix socket
//! - `executor`: the root-owned side that actually touches the firewall
//! - `audit`: pretty-print the append-only audit trail
//! - `status`: placeholder
//!
//! Signals: SIGINT/SIGTERM drain and persist state before exit; SIGHUP
//! reloads detection/action settings live and persists the current counters.

mod alerts;
mod audit;
mod broker;
mod config;
mod console;
mod engine;
mod executor;
mod explain;
mod features;
mod ingest;
mod parse;
mod pipeline;
mod state;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::sync::watch;
use tracing::{error, info, warn};

use broker::{ActionBroker, BrokerConfig};
use config::Config;
use engine::RuleEngine;
use explain::Explainer;
use features::Accumulator;
use state::StateStore;

const DEFAULT_CONFIG_PATH: &str = "/etc/sentrygate/config.toml";

/// Sliding window for feature accumulation.
const FEATURE_WINDOW: Duration = Duration::from_secs(3600);

fn print_help() {
    eprintln!(
        r#"sentrygate — host log sentry with privilege-separated active defense

USAGE:
    sentrygate <COMMAND> [--config <path>]

COMMANDS:
    run        Start the analyzer (unprivileged)
    executor   Start the privileged executor (requires root)
    audit      Print the audit trail
    status     Show daemon status
    help       Show this help message
    version    Show version info

CONFIG:
    Default config path: {}
    Override with:       sentrygate run --config /path/to/config.toml
"#,
        DEFAULT_CONFIG_PATH
    );
}

fn print_version() {
    eprintln!("sentrygate v{}", env!("CARGO_PKG_VERSION"));
}

/// Extract `--config <path>` from the remaining args.
fn config_path(args: &[String]) -> PathBuf {
    args.iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let subcommand = args.get(1).map(String::as_str).unwrap_or("help");
    let rest = args.get(2..).unwrap_or(&[]);

    match subcommand {
        "run" => tokio::runtime::Runtime::new()?.block_on(run_command(config_path(rest))),
        "executor" => {
            tokio::runtime::Runtime::new()?.block_on(executor_command(config_path(rest)))
        }
        "audit" => audit_command(config_path(rest)),
        "status" => {
            println!("sentrygate status: not implemented (no PID file yet)");
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_help();
            Ok(())
        }
        "version" | "--version" | "-V" => {
            print_version();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {}", other);
            print_help();
            std::process::exit(1);
        }
    }
}

/// The analyzer: wire up the pipeline, then sit on the signal loop.
async fn run_command(config_file: PathBuf) -> Result<()> {
    init_tracing();

    let config = Config::load(&config_file)?;

    eprintln!(
        "Starting sentrygate{}...",
        if config.detection.active_defense {
            ""
        } else {
            " [safe mode]"
        }
    );
    eprintln!("Monitoring: {}", config.input.auth_log_path);

    let accumulator = Arc::new(Accumulator::new(FEATURE_WINDOW));
    accumulator.spawn_cleanup();

    let state_store = StateStore::new(&config.output.state_path);
    match state_store.load() {
        Ok(vectors) if !vectors.is_empty() => {
            info!(entities = vectors.len(), "restored persisted counters");
            accumulator.replace_all(vectors);
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "failed to restore state, starting cold"),
    }

    let engine = Arc::new(RuleEngine::new(
        config.detection.rules.clone(),
        Arc::clone(&accumulator),
    ));

    let explainer = Arc::new(if config.detection.enable_local_llm {
        eprintln!(
            "Enabling local LLM enrichment ({})...",
            config.detection.local_llm_model
        );
        Explainer::llm(&config.detection.local_llm_url, &config.detection.local_llm_model)
    } else {
        Explainer::template()
    });

    let broker = Arc::new(ActionBroker::new(broker_config(&config)));
    let audit = Arc::new(audit::AuditLogger::new(&config.output.audit_log_path));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pipeline = pipeline::Pipeline::new(
        Arc::clone(&engine),
        Arc::clone(&explainer),
        Arc::clone(&broker),
        Arc::clone(&audit),
    );
    let pipeline_handle = tokio::spawn(pipeline.run(config.clone(), shutdown_rx));

    signal_loop(&config_file, &broker, &accumulator, &state_store).await?;

    // Drain: sources stop, channels close, the aggregation loop exits.
    let _ = shutdown_tx.send(true);
    match pipeline_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "pipeline exited with error"),
        Err(e) => error!(error = %e, "pipeline task panicked"),
    }

    if let Err(e) = state_store.save(&accumulator.get_all()) {
        warn!(error = %e, "failed to persist state on shutdown");
    } else {
        info!("state persisted");
    }

    eprintln!("Shutdown complete.");
    Ok(())
}

/// Block on SIGINT/SIGTERM; handle SIGHUP reloads inline.
async fn signal_loop(
    config_file: &PathBuf,
    broker: &Arc<ActionBroker>,
    accumulator: &Arc<Accumulator>,
    state_store: &StateStore,
) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm =
        signal(SignalKind::terminate()).context("failed to register SIGTERM handler")?;
    let mut sighup = signal(SignalKind::hangup()).context("failed to register SIGHUP handler")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                eprintln!("\nShutting down (SIGINT)...");
                return Ok(());
            }
            _ = sigterm.recv() => {
                eprintln!("Shutting down (SIGTERM)...");
                return Ok(());
            }
            _ = sighup.recv() => {
                info!("SIGHUP received, reloading configuration");
                match Config::load(config_file) {
                    Ok(new_config) => {
                        broker.update_config(broker_config(&new_config));
                        if let Err(e) = state_store.save(&accumulator.get_all()) {
                            warn!(error = %e, "failed to persist state on reload");
                        }
                        // Log paths are not reloaded; tailers own their files.
                        info!("reload complete");
                    }
                    Err(e) => error!(error = %e, "reload failed, keeping previous configuration"),
                }
            }
        }
    }
}

fn broker_config(config: &Config) -> BrokerConfig {
    BrokerConfig {
        active_defense: config.detection.active_defense,
        allowlist: config.detection.allowlist.clone(),
        notify_webhook: config.notification.discord_webhook.clone(),
        executor_socket: config.action.executor_socket.clone(),
    }
}

/// The privileged side. Runs until killed.
async fn executor_command(config_file: PathBuf) -> Result<()> {
    init_tracing();

    let config = Config::load(&config_file)?;
    if config.action.executor_socket.is_empty() {
        bail!("action.executor_socket is not set in {}", config_file.display());
    }

    eprintln!(
        "Starting privileged executor on {}...",
        config.action.executor_socket
    );
    executor::Executor::new(&config.action.executor_socket)
        .run()
        .await
}

/// Pretty-print the audit trail.
fn audit_command(config_file: PathBuf) -> Result<()> {
    let config = Config::load(&config_file)?;
    let path = PathBuf::from(&config.output.audit_log_path);

    let (alerts, skipped) = audit::read_audit_log(&path)?;
    for alert in &alerts {
        let action = alert
            .suggested_action
            .as_ref()
            .map(|a| format!(" [{} {} {}]", a.kind, a.target, a.duration))
            .unwrap_or_default();
        println!(
            "{} {:>8} {} — {}{}",
            alert.timestamp.format("%Y-%m-%d %H:%M:%S"),
            console::sanitize(&alert.risk.to_string()),
            console::sanitize(&alert.summary),
            console::sanitize(&alert.explanation),
            console::sanitize(&action),
        );
    }
    if skipped > 0 {
        eprintln!("({} unparseable lines skipped)", skipped);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_flag() {
        let args = vec!["--config".to_string(), "/tmp/a.toml".to_string()];
        assert_eq!(config_path(&args), PathBuf::from("/tmp/a.toml"));
    }

    #[test]
    fn test_config_path_default() {
        assert_eq!(config_path(&[]), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_config_path_missing_value_falls_back() {
        let args = vec!["--config".to_string()];
        assert_eq!(config_path(&args), PathBuf::from(DEFAULT_CONFIG_PATH));
    }

    #[test]
    fn test_broker_config_mapping() {
        let mut config = Config::default();
        config.detection.active_defense = true;
        config.detection.allowlist = vec!["8.8.8.8".to_string()];
        config.notification.discord_webhook = "https://example.invalid/hook".to_string();
        config.action.executor_socket = "/run/sentrygate.sock".to_string();

        let bc = broker_config(&config);
        assert!(bc.active_defense);
        assert_eq!(bc.allowlist, vec!["8.8.8.8"]);
        assert_eq!(bc.notify_webhook, "https://example.invalid/hook");
        assert_eq!(bc.executor_socket, "/run/sentrygate.sock");
    }
}
