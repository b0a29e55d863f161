//! Generic syslog parser: MySQL access denials and sudo PAM failures.

use regex::Regex;

use super::{EventKind, ParsedEvent};

pub struct SyslogParser {
    re_mysql: Regex,
    re_sudo: Regex,
}

impl SyslogParser {
    pub fn new() -> Self {
        Self {
            // MySQL: Access denied for user 'root'@'1.2.3.4'
            re_mysql: Regex::new(r"Access denied for user '(\S+)'@'(\S+)'")
                .expect("valid syslog regex"),
            // sudo: pam_unix(sudo:auth): authentication failure; logname= user=root ...
            re_sudo: Regex::new(r"sudo:auth.*authentication failure;.*user=(\S+)")
                .expect("valid syslog regex"),
        }
    }

    pub fn parse(&self, line: &str) -> Option<ParsedEvent> {
        if let Some(caps) = self.re_mysql.captures(line) {
            return Some(ParsedEvent::new(
                "mysql",
                EventKind::LoginFailed,
                &caps[2],
                &caps[1],
                line,
            ));
        }

        if line.contains("sudo") {
            if let Some(caps) = self.re_sudo.captures(line) {
                return Some(ParsedEvent::new(
                    "syslog_sudo",
                    EventKind::PrivEscalationFail,
                    "local",
                    &caps[1],
                    line,
                ));
            }
        }

        None
    }
}

impl Default for SyslogParser {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mysql_access_denied() {
        let parser = SyslogParser::new();
        let line = "Dec 10 12:00:00 db mysqld[88]: Access denied for user 'root'@'5.5.5.5' (using password: YES)";
        let evt = parser.parse(line).unwrap();
        assert_eq!(evt.source, "mysql");
        assert_eq!(evt.kind, EventKind::LoginFailed);
        assert_eq!(evt.user, "root");
        assert_eq!(evt.ip, "5.5.5.5");
    }

    #[test]
    fn test_sudo_auth_failure() {
        let parser = SyslogParser::new();
        let line = "Dec 10 12:00:00 host sudo: pam_unix(sudo:auth): authentication failure; logname=bob uid=1000 euid=0 tty=/dev/pts/0 ruser=bob rhost= user=bob";
        let evt = parser.parse(line).unwrap();
        assert_eq!(evt.source, "syslog_sudo");
        assert_eq!(evt.kind, EventKind::PrivEscalationFail);
        assert_eq!(evt.user, "bob");
        assert_eq!(evt.ip, "local");
    }

    #[test]
    fn test_sudo_success_line_ignored() {
        let parser = SyslogParser::new();
        let line = "Dec 10 12:00:00 host sudo: bob : TTY=pts/0 ; PWD=/home/bob ; USER=root ; COMMAND=/bin/ls";
        assert!(parser.parse(line).is_none());
    }

    #[test]
    fn test_unrelated_line_ignored() {
        let parser = SyslogParser::new();
        assert!(parser
            .parse("Dec 10 12:00:00 host systemd[1]: Started daily apt upgrade.")
            .is_none());
    }

    #[test]
    fn test_pam_failure_without_sudo_tag_ignored() {
        // su PAM failures are not sudo escalation attempts.
        let parser = SyslogParser::new();
        let line = "host su: pam_unix(su:auth): authentication failure; user=root";
        assert!(parser.parse(line).is_none());
    }
}
