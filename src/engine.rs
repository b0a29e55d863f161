//! Threshold rule engine.
//!
//! Stateless apart from its rule list and a handle to the accumulator. Every
//! parsed event goes through [`RuleEngine::process`]; alerts come out. Rules
//! fire on every event at or past their threshold, not only on the exact
//! crossing — continued flooding keeps alerting downstream.

use std::sync::Arc;

use chrono::Utc;

use crate::alerts::{Alert, Evidence, Risk, SuggestedAction};
use crate::config::DetectionRule;
use crate::features::{Accumulator, FeatureVector};
use crate::parse::{EventKind, ParsedEvent};

pub struct RuleEngine {
    features: Arc<Accumulator>,
    rules: Vec<DetectionRule>,
}

impl RuleEngine {
    /// An empty rule list installs the built-in defaults.
    pub fn new(rules: Vec<DetectionRule>, features: Arc<Accumulator>) -> Self {
        let rules = if rules.is_empty() {
            Self::default_rules()
        } else {
            rules
        };
        Self { features, rules }
    }

    /// Built-in rules: SSH brute force and web scanning.
    pub fn default_rules() -> Vec<DetectionRule> {
        vec![
            DetectionRule {
                name: "ssh_brute_force".to_string(),
                kind: "threshold".to_string(),
                metric: "failed_logins".to_string(),
                threshold: 5,
                action: "ban_ip".to_string(),
                duration: "1h".to_string(),
                risk: Risk::High,
                summary: "SSH Brute Force Detected".to_string(),
            },
            DetectionRule {
                name: "web_scanning".to_string(),
                kind: "threshold".to_string(),
                metric: "http_404_count".to_string(),
                threshold: 20,
                action: "ban_ip".to_string(),
                duration: "30m".to_string(),
                risk: Risk::Medium,
                summary: "Web Scanning Detected (404 Flood)".to_string(),
            },
        ]
    }

    /// Run one parsed event through the engine, updating the accumulator and
    /// returning an alert when a rule fires.
    pub fn process(&self, evt: &ParsedEvent) -> Option<Alert> {
        match evt.kind {
            EventKind::LoginSuccess => {
                // Immediate rule: a successful root login is always worth an
                // alert, without touching the accumulator.
                if evt.user == "root" {
                    return Some(Alert {
                        id: Alert::next_id(),
                        timestamp: Utc::now(),
                        source: evt.source.clone(),
                        risk: Risk::High,
                        confidence: 1.0,
                        summary: "Suspicious Root Login".to_string(),
                        explanation: format!(
                            "Successful login for 'root' from IP {}. Root logins are discouraged.",
                            evt.ip
                        ),
                        evidence: vec![Evidence::new("user", "root")],
                        suggested_action: Some(SuggestedAction {
                            kind: "notify_admin".to_string(),
                            target: "admin".to_string(),
                            duration: "0".to_string(),
                        }),
                        mode: "advisory".to_string(),
                    });
                }
                None
            }
            EventKind::LoginFailed => {
                let feat = self.features.add_failure(&evt.ip, &evt.user);
                let mut alert = self.check_thresholds(&feat)?;
                if evt.source == "mysql" {
                    alert.summary = "Database Brute Force Detected".to_string();
                    alert.explanation = format!(
                        "IP {} attempted {} database logins using {} distinct usernames.",
                        feat.ip,
                        feat.failed_logins,
                        feat.distinct_users.len()
                    );
                    alert.source = "mysql".to_string();
                }
                Some(alert)
            }
            EventKind::HttpRequest => {
                if evt.status_code == Some(404) {
                    let url = evt.url.as_deref().unwrap_or("");
                    let feat = self.features.add_http_404(&evt.ip, url);
                    return self.check_thresholds(&feat);
                }
                None
            }
            EventKind::PrivEscalationFail => None,
        }
    }

    /// Evaluate rules in configured order; the first one at or past its
    /// threshold wins.
    fn check_thresholds(&self, feat: &FeatureVector) -> Option<Alert> {
        for rule in &self.rules {
            if rule.kind != "threshold" {
                continue;
            }

            let (current, evidence, explanation) = match rule.metric.as_str() {
                "failed_logins" => (
                    feat.failed_logins,
                    vec![
                        Evidence::new("ssh_fail_count", feat.failed_logins),
                        Evidence::new("distinct_users", feat.distinct_users.len() as u64),
                    ],
                    format!(
                        "IP {} attempted {} SSH logins using {} distinct usernames.",
                        feat.ip,
                        feat.failed_logins,
                        feat.distinct_users.len()
                    ),
                ),
                "http_404_count" => (
                    feat.http_404_count,
                    vec![
                        Evidence::new("http_404_count", feat.http_404_count),
                        Evidence::new("distinct_paths", feat.distinct_paths.len() as u64),
                    ],
                    format!(
                        "IP {} triggered {} 404 errors across {} distinct paths.",
                        feat.ip,
                        feat.http_404_count,
                        feat.distinct_paths.len()
                    ),
                ),
                _ => continue,
            };

            if current >= rule.threshold {
                return Some(Alert {
                    id: Alert::next_id(),
                    timestamp: Utc::now(),
                    source: "rule_engine".to_string(),
                    risk: rule.risk,
                    confidence: 0.9,
                    summary: rule.summary.clone(),
                    explanation,
                    evidence,
                    suggested_action: Some(SuggestedAction {
                        kind: rule.action.clone(),
                        target: feat.ip.clone(),
                        duration: rule.duration.clone(),
                    }),
                    mode: "advisory".to_string(),
                });
            }
        }

        None
    }
}
