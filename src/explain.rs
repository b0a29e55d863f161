//! Alert explanation: static templates with optional local-LLM enrichment.
//!
//! The pipeline calls [`Explainer::explain`] once per alert. The template
//! variant never fails; the LLM variant returns an error on any transport,
//! status, or decode problem and leaves the alert untouched so the caller
//! can fall back to [`apply_template`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::alerts::Alert;

const LLM_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Serialize)]
struct LlmRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct LlmResponse {
    response: String,
}

/// Closed set of explanation strategies.
pub enum Explainer {
    /// Fill empty explanations from a static template. Never fails.
    Template,
    /// Ask an Ollama-style generate endpoint for a one-sentence analysis.
    Llm {
        url: String,
        model: String,
        client: reqwest::Client,
    },
}

impl Explainer {
    pub fn template() -> Self {
        Explainer::Template
    }

    /// Empty `url`/`model` fall back to the local Ollama defaults.
    pub fn llm(url: &str, model: &str) -> Self {
        let url = if url.is_empty() {
            "http://localhost:11434/api/generate".to_string()
        } else {
            url.to_string()
        };
        let model = if model.is_empty() {
            "tinyllama".to_string()
        } else {
            model.to_string()
        };
        Explainer::Llm {
            url,
            model,
            client: reqwest::Client::builder()
                .timeout(LLM_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    pub async fn explain(&self, alert: &mut Alert) -> Result<()> {
        match self {
            Explainer::Template => {
                apply_template(alert);
                Ok(())
            }
            Explainer::Llm { url, model, client } => {
                let request = LlmRequest {
                    model: model.as_str(),
                    prompt: build_prompt(alert),
                    stream: false,
                };

                let response = client
                    .post(url)
                    .json(&request)
                    .send()
                    .await
                    .context("llm connection failed")?
                    .error_for_status()
                    .context("llm returned error status")?;

                let body: LlmResponse = response
                    .json()
                    .await
                    .context("failed to decode llm response")?;

                alert.explanation = body.response;
                Ok(())
            }
        }
    }
}

/// Fill an empty explanation from the static template. Explanations already
/// set by the rule engine are left alone.
pub fn apply_template(alert: &mut Alert) {
    if alert.explanation.is_empty() {
        alert.explanation = format!(
            "Detected {} from {}. Risk: {}.",
            alert.summary, alert.source, alert.risk
        );
    }
}

fn build_prompt(alert: &Alert) -> String {
    let evidence: Vec<String> = alert
        .evidence
        .iter()
        .map(|e| format!("{}={}", e.kind, e.value))
        .collect();
    format!(
        "You are a security analyst. Explain the risk of this event in one sentence.\n\
         Event: {}\nSource: {}\nRisk: {}\nDetails: {}\nEvidence: {}\nExplanation:",
        alert.summary,
        alert.source,
        alert.risk,
        alert.explanation,
        evidence.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Evidence, Risk};
    use chrono::Utc;

    fn alert_with_explanation(explanation: &str) -> Alert {
        Alert {
            id: Alert::next_id(),
            timestamp: Utc::now(),
            source: "rule_engine".to_string(),
            risk: Risk::High,
            confidence: 0.9,
            summary: "SSH Brute Force Detected".to_string(),
            explanation: explanation.to_string(),
            evidence: vec![Evidence::new("ssh_fail_count", 5)],
            suggested_action: None,
            mode: "advisory".to_string(),
        }
    }

    #[tokio::test]
    async fn test_template_fills_empty_explanation() {
        let explainer = Explainer::template();
        let mut alert = alert_with_explanation("");
        explainer.explain(&mut alert).await.unwrap();
        assert_eq!(
            alert.explanation,
            "Detected SSH Brute Force Detected from rule_engine. Risk: high."
        );
    }

    #[tokio::test]
    async fn test_template_preserves_existing_explanation() {
        let explainer = Explainer::template();
        let mut alert = alert_with_explanation("already explained");
        explainer.explain(&mut alert).await.unwrap();
        assert_eq!(alert.explanation, "already explained");
    }

    #[tokio::test]
    async fn test_llm_error_leaves_alert_unchanged() {
        // Nothing listens on this port; the client must error out and the
        // alert must keep its original explanation for the fallback path.
        let explainer = Explainer::llm("http://127.0.0.1:9/api/generate", "tinyllama");
        let mut alert = alert_with_explanation("original");
        let result = explainer.explain(&mut alert).await;
        assert!(result.is_err());
        assert_eq!(alert.explanation, "original");
    }

    #[test]
    fn test_llm_defaults_applied() {
        match Explainer::llm("", "") {
            Explainer::Llm { url, model, .. } => {
                assert_eq!(url, "http://localhost:11434/api/generate");
                assert_eq!(model, "tinyllama");
            }
            Explainer::Template => panic!("expected llm variant"),
        }
    }

    #[test]
    fn test_prompt_contains_evidence() {
        let alert = alert_with_explanation("ctx");
        let prompt = build_prompt(&alert);
        assert!(prompt.contains("SSH Brute Force Detected"));
        assert!(prompt.contains("ssh_fail_count=5"));
        assert!(prompt.contains("Risk: high"));
    }

    #[test]
    fn test_llm_request_shape() {
        let request = LlmRequest {
            model: "tinyllama",
            prompt: "p".to_string(),
            stream: false,
        };
        let json = serde_json::to_string(&request).unwrap();
        assert_eq!(json, r#"{"model":"tinyllama","prompt":"p","stream":false}"#);
    }
}
