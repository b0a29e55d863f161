//! The event pipeline: sources → parsers → rule engine → alert chain.
//!
//! One task per source feeds a bounded channel; this module's loop performs a
//! fair selection across all open channels, routes each line to the parser
//! for its origin, and runs any resulting alert through explain → broker →
//! audit → console. A select branch is disabled once its channel closes; the
//! loop exits when every source has closed, which happens after the shutdown
//! signal flips.
//!
//! Nothing in the alert chain can stall ingestion: explainer failures fall
//! back to the template, broker and audit failures are logged and dropped.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::audit::AuditLogger;
use crate::broker::ActionBroker;
use crate::config::Config;
use crate::console;
use crate::engine::RuleEngine;
use crate::explain::{self, Explainer};
use crate::ingest::{FileTailer, JournalReader, LogLine};
use crate::parse::{HttpParser, ParsedEvent, SshParser, SyslogParser};

/// Which origin family a line came from; selects its parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Auth,
    Syslog,
    Web,
    Journal,
}

pub struct Pipeline {
    engine: Arc<RuleEngine>,
    explainer: Arc<Explainer>,
    broker: Arc<ActionBroker>,
    audit: Arc<AuditLogger>,
    ssh_parser: SshParser,
    syslog_parser: SyslogParser,
    http_parser: HttpParser,
}

impl Pipeline {
    pub fn new(
        engine: Arc<RuleEngine>,
        explainer: Arc<Explainer>,
        broker: Arc<ActionBroker>,
        audit: Arc<AuditLogger>,
    ) -> Self {
        Self {
            engine,
            explainer,
            broker,
            audit,
            ssh_parser: SshParser::new(),
            syslog_parser: SyslogParser::new(),
            http_parser: HttpParser::new("web_server"),
        }
    }

    /// Start all configured sources and drive the aggregation loop until
    /// every source channel has closed.
    pub async fn run(self, config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut auth_rx = Some(
            FileTailer::new(&config.input.auth_log_path, shutdown.clone()).start(),
        );

        let mut syslog_rx = if config.input.syslog_path.is_empty() {
            None
        } else {
            Some(FileTailer::new(&config.input.syslog_path, shutdown.clone()).start())
        };

        let mut web_rx = if config.input.web_log_path.is_empty() {
            None
        } else {
            Some(FileTailer::new(&config.input.web_log_path, shutdown.clone()).start())
        };

        let mut journal_rx = if config.input.enable_journald {
            match JournalReader::new(shutdown.clone()).start() {
                Ok(rx) => Some(rx),
                Err(e) => {
                    warn!(error = %e, "journald disabled");
                    None
                }
            }
        } else {
            None
        };

        info!("pipeline running");

        loop {
            let (origin, line) = tokio::select! {
                msg = recv_opt(&mut auth_rx), if auth_rx.is_some() => match msg {
                    Some(line) => (Origin::Auth, line),
                    None => { auth_rx = None; continue; }
                },
                msg = recv_opt(&mut syslog_rx), if syslog_rx.is_some() => match msg {
                    Some(line) => (Origin::Syslog, line),
                    None => { syslog_rx = None; continue; }
                },
                msg = recv_opt(&mut web_rx), if web_rx.is_some() => match msg {
                    Some(line) => (Origin::Web, line),
                    None => { web_rx = None; continue; }
                },
                msg = recv_opt(&mut journal_rx), if journal_rx.is_some() => match msg {
                    Some(line) => (Origin::Journal, line),
                    None => { journal_rx = None; continue; }
                },
                else => break,
            };

            if let Some(evt) = self.dispatch(origin, &line) {
                self.handle_event(&evt).await;
            }
        }

        info!("pipeline drained, all sources closed");
        Ok(())
    }

    /// Route a line to the parser for its origin.
    fn dispatch(&self, origin: Origin, line: &LogLine) -> Option<ParsedEvent> {
        match origin {
            Origin::Auth => self.ssh_parser.parse(&line.content),
            Origin::Syslog => self.syslog_parser.parse(&line.content),
            Origin::Web => self.http_parser.parse(&line.content),
            // Journal entries arrive reformatted to the syslog shape; auth
            // events first, then the generic syslog patterns.
            Origin::Journal => self
                .ssh_parser
                .parse(&line.content)
                .or_else(|| self.syslog_parser.parse(&line.content)),
        }
    }

    /// Run one parsed event through detection and, for any alert, the full
    /// reaction chain. Errors here never propagate back to ingest.
    async fn handle_event(&self, evt: &ParsedEvent) {
        let Some(mut alert) = self.engine.process(evt) else {
            return;
        };

        if let Err(e) = self.explainer.explain(&mut alert).await {
            warn!(error = %e, "explainer failed, using template fallback");
            explain::apply_template(&mut alert);
        }

        if let Err(e) = self.broker.execute(&alert).await {
            warn!(error = %e, "action dispatch failed");
        }

        if let Err(e) = self.audit.log_alert(&alert) {
            warn!(error = %e, "failed to write audit log");
        }

        console::print_alert(&alert);
    }
}

/// Receive from an optional channel. The `None` arm never resolves; the
/// select guard keeps it from being polled once the channel is retired.
async fn recv_opt(rx: &mut Option<mpsc::Receiver<LogLine>>) -> Option<LogLine> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
