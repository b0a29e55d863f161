//! sshd auth-line parser.
//!
//! Recognizes failed and accepted password/publickey attempts from standard
//! OpenSSH log lines. The "invalid user" form is checked before the generic
//! failure form because the generic pattern would otherwise capture the
//! literal word "invalid" as the username.

use regex::Regex;

use super::{EventKind, ParsedEvent};

pub struct SshParser {
    re_failed_invalid: Regex,
    re_failed: Regex,
    re_accepted: Regex,
}

impl SshParser {
    pub fn new() -> Self {
        Self {
            // Failed password for invalid user admin from 1.2.3.4 ...
            re_failed_invalid: Regex::new(r"Failed password for invalid user (\S+) from (\S+)")
                .expect("valid ssh regex"),
            // Failed password for root from 1.2.3.4 ...
            re_failed: Regex::new(r"Failed password for (\S+) from (\S+)")
                .expect("valid ssh regex"),
            // Accepted password for root from 1.2.3.4 ...
            re_accepted: Regex::new(r"Accepted \w+ for (\S+) from (\S+)")
                .expect("valid ssh regex"),
        }
    }

    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        if !line.contains("sshd") {
            return None;
        }

        if let Some(caps) = self.re_failed_invalid.captures(line) {
            return Some(ParsedEvent::new(
                "ssh",
                EventKind::LoginFailed,
                &caps[2],
                &caps[1],
                line,
            ));
        }

        if let Some(caps) = self.re_failed.captures(line) {
            return Some(ParsedEvent::new(
                "ssh",
                EventKind::LoginFailed,
                &caps[2],
                &caps[1],
                line,
            ));
        }

        if let Some(caps) = self.re_accepted.captures(line) {
            return Some(ParsedEvent::new(
                "ssh",
                EventKind::LoginSuccess,
                &caps[2],
                &caps[1],
                line,
            ));
        }

        None
    }
}

impl Default for SshParser {
    fn default() -> Self {
        Self::new()
    }
}
