//! The LLM broker: prompted invocation of an external language model for
//! mapping synthesis, subject-filter synthesis, and gate evaluation.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::config::LlmConfig;
use crate::error::Error;
use crate::mapping::MappingSynthesizer;
use crate::metrics::Metrics;

use super::budget::{Budget, ChargeOutcome, Clock, SystemClock};
use super::prompts::{gate_evaluation_prompt, mapping_synthesis_prompt, subject_filter_synthesis_prompt};

/// Outcome of a gate-evaluation call.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct GateOutcome {
    pub decision: bool,
    pub confidence: f32,
    pub reasoning: String,
}

impl GateOutcome {
    pub fn failover(failover_policy: crate::domain::FailoverPolicy) -> Self {
        use crate::domain::FailoverPolicy;
        match failover_policy {
            FailoverPolicy::FailOpen => GateOutcome {
                decision: true,
                confidence: 1.0,
                reasoning: "llm-unavailable:fail_open".to_string(),
            },
            FailoverPolicy::FailClosed => GateOutcome {
                decision: false,
                confidence: 1.0,
                reasoning: "llm-unavailable:fail_closed".to_string(),
            },
        }
    }
}

/// Client for an OpenAI-compatible chat-completions endpoint, with a
/// process-wide daily spend cap.
pub struct LlmBroker<C: Clock = SystemClock> {
    http: reqwest::Client,
    config: LlmConfig,
    budget: Budget<C>,
    metrics: Arc<Metrics>,
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: u32,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(serde::Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize, Default)]
struct ChatUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

/// Rough per-token rate used to estimate spend; real pricing varies by
/// model, so this is a conservative stand-in, configurable in future via
/// `LlmConfig` if an operator needs precision (see `DESIGN.md`).
const MICROS_PER_TOKEN: f64 = 1.5;

impl LlmBroker<SystemClock> {
    pub fn new(config: LlmConfig, metrics: Arc<Metrics>) -> Result<Self, Error> {
        Self::with_clock(config, SystemClock, metrics)
    }
}

impl<C: Clock> LlmBroker<C> {
    pub fn with_clock(config: LlmConfig, clock: C, metrics: Arc<Metrics>) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| Error::Config(format!("failed to build LLM http client: {e}")))?;
        let budget = Budget::new(clock, config.daily_cost_limit_usd, config.cost_alert_threshold);
        Ok(Self { http, config, budget, metrics })
    }

    async fn complete(&self, prompt: &str) -> Result<String, Error> {
        match self.budget.charge(0.0) {
            ChargeOutcome::Exhausted => return Err(Error::BudgetExhausted),
            ChargeOutcome::ThresholdCrossed => {
                tracing::warn!("LLM daily spend crossed alert threshold");
            }
            ChargeOutcome::Ok => {}
        }

        let request = ChatRequest {
            model: &self.config.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };

        let endpoint = format!("{}/chat/completions", provider_base_url(&self.config.provider));
        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::LlmSynthesisFailed(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Error::LlmSynthesisFailed(format!(
                "llm endpoint returned {}",
                response.status()
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::LlmSynthesisFailed(format!("invalid llm response: {e}")))?;

        let usage = parsed.usage.unwrap_or_default();
        let estimated_usd =
            (usage.prompt_tokens + usage.completion_tokens) as f64 * MICROS_PER_TOKEN / 1_000_000.0;
        let outcome = self.budget.charge(estimated_usd);
        if matches!(outcome, ChargeOutcome::ThresholdCrossed) {
            tracing::warn!(estimated_usd, "LLM daily spend crossed alert threshold");
        }
        self.metrics
            .llm_spend_today_usd_x1000
            .set((self.budget.spent_today_usd() * 1000.0) as i64);

        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| Error::LlmSynthesisFailed("empty choices array".to_string()))
    }

    /// Synthesize a broker subject filter from a natural-language
    /// description, validated against the publisher's current known schema
    /// triples.
    pub async fn synthesize_subject_filter(
        &self,
        description: &str,
        known_triples: &[(String, String, String)],
    ) -> Result<String, Error> {
        self.metrics
            .llm_invocations_total
            .with_label_values(&["subject_filter"])
            .inc();
        let prompt = subject_filter_synthesis_prompt(description, known_triples);
        let raw = self.complete(&prompt).await?;
        let filter = raw.trim().trim_matches('"').to_string();

        let known_tokens: std::collections::HashSet<&str> = known_triples
            .iter()
            .flat_map(|(p, r, a)| [p.as_str(), r.as_str(), a.as_str()])
            .collect();

        let has_known_token = filter
            .split('.')
            .any(|token| token == "*" || token == ">" || known_tokens.contains(token));
        if !has_known_token {
            return Err(Error::SubscriptionPatternUnknownSchema(filter));
        }

        Ok(filter)
    }

    /// Evaluate a subscription gate against a canonical event. Failover on
    /// unreachability/budget exhaustion is the caller's responsibility (the
    /// subscription matcher), since only it knows the subscription's
    /// `failover_policy`.
    pub async fn evaluate_gate(
        &self,
        prompt_or_description: &str,
        canonical_event_json: &str,
    ) -> Result<GateOutcome, Error> {
        let prompt = gate_evaluation_prompt(prompt_or_description, canonical_event_json);
        let raw = self.complete(&prompt).await?;
        serde_json::from_str(raw.trim())
            .map_err(|e| Error::LlmSynthesisFailed(format!("invalid gate response: {e}")))
    }

    pub fn spent_today_usd(&self) -> f64 {
        self.budget.spent_today_usd()
    }
}

#[async_trait::async_trait]
impl<C: Clock> MappingSynthesizer for LlmBroker<C> {
    async fn synthesize_mapping(&self, publisher: &str, sample_payload: &Value) -> Result<String, Error> {
        self.metrics
            .llm_invocations_total
            .with_label_values(&["mapping"])
            .inc();
        let prompt = mapping_synthesis_prompt(publisher, sample_payload);
        self.complete(&prompt).await
    }
}

fn provider_base_url(provider: &str) -> &'static str {
    match provider {
        "openai" => "https://api.openai.com/v1",
        _ => "https://api.openai.com/v1",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FailoverPolicy;

    #[test]
    fn fail_open_policy_passes_with_reason() {
        let outcome = GateOutcome::failover(FailoverPolicy::FailOpen);
        assert!(outcome.decision);
        assert_eq!(outcome.reasoning, "llm-unavailable:fail_open");
    }

    #[test]
    fn fail_closed_policy_blocks_with_reason() {
        let outcome = GateOutcome::failover(FailoverPolicy::FailClosed);
        assert!(!outcome.decision);
        assert_eq!(outcome.reasoning, "llm-unavailable:fail_closed");
    }
}
