//! Log line parsers.
//!
//! Each parser is a pure function from one raw log line to at most one
//! [`ParsedEvent`]. Malformed or unrecognized lines produce `None` — the
//! pipeline favors robustness over counting malformed input.

pub mod http;
pub mod ssh;
pub mod syslog;

pub use http::HttpParser;
pub use ssh::SshParser;
pub use syslog::SyslogParser;

/// What a parsed line represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    LoginFailed,
    LoginSuccess,
    HttpRequest,
    PrivEscalationFail,
}

/// A normalized event extracted from a raw log line.
///
/// `ip` and `user` are empty when the source line carries none; HTTP fields
/// are only set by the HTTP parser.
#[derive(Debug, Clone)]
pub struct ParsedEvent {
    /// Origin family: "ssh", "mysql", "syslog_sudo", "web_server".
    pub source: String,
    pub kind: EventKind,
    pub ip: String,
    pub user: String,
    pub method: Option<String>,
    pub url: Option<String>,
    pub status_code: Option<u16>,
    pub user_agent: Option<String>,
    /// The raw line, kept for audit context.
    pub raw: String,
}

impl ParsedEvent {
    /// Minimal constructor for non-HTTP events.
    pub fn new(source: &str, kind: EventKind, ip: &str, user: &str, raw: &str) -> Self {
        Self {
            source: source.to_string(),
            kind,
            ip: ip.to_string(),
            user: user.to_string(),
            method: None,
            url: None,
            status_code: None,
            user_agent: None,
            raw: raw.to_string(),
        }
    }
}
