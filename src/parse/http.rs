//! Combined Log Format parser for Nginx/Apache access logs.
//!
//! Format: `1.2.3.4 - user [01/Jan/2026:12:00:00 +0000] "GET /path HTTP/1.1"
//! 200 123 "-" "UserAgent"`.

use regex::Regex;

use super::{EventKind, ParsedEvent};

pub struct HttpParser {
    re: Regex,
    source: String,
}

impl HttpParser {
    /// `source_label` tags emitted events (e.g. "nginx"); empty uses
    /// "web_server".
    pub fn new(source_label: &str) -> Self {
        let source = if source_label.is_empty() {
            "web_server".to_string()
        } else {
            source_label.to_string()
        };
        Self {
            // IP, ident, user, time, method, url, proto, status, size, referer, UA
            re: Regex::new(
                r#"^(\S+) \S+ (\S+) \[([^\]]+)\] "(\S+) (\S+) ([^"]+)" (\d+) (\d+) "([^"]*)" "([^"]*)""#,
            )
            .expect("valid clf regex"),
            source,
        }
    }

    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        let caps = self.re.captures(line)?;

        let status_code = caps[7].parse::<u16>().unwrap_or(0);

        Some(ParsedEvent {
            source: self.source.clone(),
            kind: EventKind::HttpRequest,
            ip: caps[1].to_string(),
            user: String::new(),
            method: Some(caps[4].to_string()),
            url: Some(caps[5].to_string()),
            status_code: Some(status_code),
            user_agent: Some(caps[10].to_string()),
            raw: line.to_string(),
        })
    }
}
