//! The natural-language scoring oracle and its policy adapters.
//!
//! Production implementation is an OpenAI-compatible chat-completions
//! client. Replies are parsed leniently: scoring replies that are not JSON
//! degrade to an empty map, decision replies that are JSON but miss fields
//! get defaults, and only transport failures or completely unreadable
//! decision replies surface as errors (which the fallback policies then
//! absorb).

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use triage::{
    Incident, OracleUsage, PolicyError, RouteDecision, RoutePolicy, RouteTarget, ToolDecision,
    ToolKind, ToolPolicy, TopicScores,
};

use crate::config::OracleConfig;
use crate::prompts::{self, ScoreScope};

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("oracle request failed: {0}")]
    RequestFailed(String),

    #[error("oracle reply parse error: {0}")]
    ParseError(String),

    #[error("API key not configured ({0} unset)")]
    MissingApiKey(String),
}

/// Dollar prices per million tokens (input, output), longest prefix first.
const MODEL_PRICES: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.60),
    ("gpt-4o", 2.50, 10.00),
    ("gpt-4.1-mini", 0.40, 1.60),
    ("gpt-4.1-nano", 0.10, 0.40),
    ("gpt-4.1", 2.00, 8.00),
];

fn model_price(model: &str) -> Option<(f64, f64)> {
    MODEL_PRICES
        .iter()
        .find(|(prefix, _, _)| model.starts_with(prefix))
        .map(|&(_, input, output)| (input, output))
}

/// Accumulates oracle requests, tokens and cost. Stages drain it with
/// [`UsageMeter::take`] on exit, so each stage log carries exactly the
/// traffic it caused.
#[derive(Default)]
pub struct UsageMeter {
    inner: Mutex<OracleUsage>,
}

impl UsageMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, usage: OracleUsage) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .absorb(usage);
    }

    /// Token and cost accounting straight off a chat-completions reply.
    pub fn record_reply(&self, model: &str, reply: &Value) {
        let usage = &reply["usage"];
        let prompt = usage["prompt_tokens"].as_u64().unwrap_or(0);
        let completion = usage["completion_tokens"].as_u64().unwrap_or(0);
        let total = usage["total_tokens"].as_u64().unwrap_or(prompt + completion);
        let cost = model_price(model)
            .map(|(input, output)| prompt as f64 / 1e6 * input + completion as f64 / 1e6 * output)
            .unwrap_or(0.0);
        self.record(OracleUsage {
            requests: 1,
            total_tokens: total,
            cost,
        });
    }

    /// Drains the usage accumulated since the last call.
    pub fn take(&self) -> OracleUsage {
        std::mem::take(&mut *self.inner.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn snapshot(&self) -> OracleUsage {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The three oracle operations the pipeline consumes.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TriageOracle: Send + Sync {
    /// Scores the incident against the (scope-dependent) ontology. A reply
    /// that is not a JSON mapping yields an empty map, not an error.
    async fn score_topics(
        &self,
        incident: &Incident,
        vocabulary: &BTreeSet<String>,
        scope: ScoreScope,
        model: &str,
        temperature: f64,
    ) -> Result<TopicScores, OracleError>;

    async fn decide_route(
        &self,
        topics: &TopicScores,
        model: &str,
        temperature: f64,
    ) -> Result<RouteDecision, OracleError>;

    async fn decide_tool(
        &self,
        incident: &Incident,
        topics: &TopicScores,
        model: &str,
        temperature: f64,
    ) -> Result<ToolDecision, OracleError>;

    async fn is_available(&self) -> bool;
}

/// OpenAI-compatible chat-completions client.
pub struct HttpOracle {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    key_env: String,
    meter: Arc<UsageMeter>,
}

impl HttpOracle {
    pub fn new(config: &OracleConfig, meter: Arc<UsageMeter>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("failed to build HTTP client"),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key(),
            key_env: config.api_key_env.clone(),
            meter,
        }
    }

    async fn chat(
        &self,
        system: &str,
        user: &str,
        model: &str,
        temperature: f64,
    ) -> Result<String, OracleError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| OracleError::MissingApiKey(self.key_env.clone()))?;

        let request_body = serde_json::json!({
            "model": model,
            "temperature": temperature,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user},
            ],
        });

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| OracleError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(OracleError::RequestFailed(format!(
                "oracle API error ({status}): {body}"
            )));
        }

        let reply: Value = response
            .json()
            .await
            .map_err(|e| OracleError::ParseError(e.to_string()))?;
        self.meter.record_reply(model, &reply);

        Ok(reply["choices"][0]["message"]["content"]
            .as_str()
            .unwrap_or("")
            .to_string())
    }
}

#[async_trait]
impl TriageOracle for HttpOracle {
    async fn score_topics(
        &self,
        incident: &Incident,
        vocabulary: &BTreeSet<String>,
        scope: ScoreScope,
        model: &str,
        temperature: f64,
    ) -> Result<TopicScores, OracleError> {
        let (system, user) = prompts::scoring_prompt(scope, incident, vocabulary);
        let content = self.chat(system, &user, model, temperature).await?;
        match extract_json(&content) {
            Some(value) => Ok(TopicScores::from_json(&value)),
            None => {
                debug!(reply = %content, "non-JSON scoring reply treated as empty");
                Ok(TopicScores::new())
            }
        }
    }

    async fn decide_route(
        &self,
        topics: &TopicScores,
        model: &str,
        temperature: f64,
    ) -> Result<RouteDecision, OracleError> {
        let (system, user) = prompts::routing_prompt(topics);
        let content = self.chat(system, &user, model, temperature).await?;
        let value = extract_json(&content).ok_or_else(|| {
            OracleError::ParseError(format!("no JSON in route reply: {content}"))
        })?;
        Ok(parse_route_reply(&value))
    }

    async fn decide_tool(
        &self,
        incident: &Incident,
        topics: &TopicScores,
        model: &str,
        temperature: f64,
    ) -> Result<ToolDecision, OracleError> {
        let (system, user) = prompts::tool_prompt(incident, topics);
        let content = self.chat(system, &user, model, temperature).await?;
        let value = extract_json(&content).ok_or_else(|| {
            OracleError::ParseError(format!("no JSON in tool reply: {content}"))
        })?;
        Ok(parse_tool_reply(&value))
    }

    async fn is_available(&self) -> bool {
        self.api_key.as_deref().is_some_and(|key| !key.is_empty())
    }
}

/// Pulls a JSON value out of a reply that may carry fences or prose.
fn extract_json(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    if let Some(start) = trimmed.find("```json") {
        let body = &trimmed[start + 7..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    serde_json::from_str(trimmed[start..=end].trim()).ok()
}

/// A JSON reply with a missing or unknown route defaults to the
/// entity-graph path; confidence falls back to the matching group score.
fn parse_route_reply(reply: &Value) -> RouteDecision {
    let route = reply["route"].as_str().unwrap_or("").trim();
    let target = match route {
        "root_cause" | "root_cause_consultant" => RouteTarget::RootCause,
        "entity_graph" | "entity_graph_consultant" => RouteTarget::EntityGraph,
        other => {
            debug!(route = other, "unrecognized route in reply, defaulting to entity graph");
            RouteTarget::EntityGraph
        }
    };
    let group_score = match target {
        RouteTarget::RootCause => reply["rc_score"].as_f64(),
        RouteTarget::EntityGraph => reply["eg_score"].as_f64(),
    };
    let confidence = reply["confidence"]
        .as_f64()
        .or(group_score)
        .unwrap_or(0.0)
        .clamp(0.0, 1.0);
    let reason = reply["reason"]
        .as_str()
        .unwrap_or("oracle route decision")
        .to_string();
    RouteDecision {
        target,
        confidence,
        reason,
    }
}

/// A JSON reply with a missing or unknown tool defaults to the work note.
fn parse_tool_reply(reply: &Value) -> ToolDecision {
    let tool = match reply["tool_name"].as_str().and_then(ToolKind::from_name) {
        Some(tool) => tool,
        None => {
            debug!("unrecognized tool in reply, defaulting to work note");
            ToolKind::LogWorkNote
        }
    };
    let confidence = reply["confidence"].as_f64().unwrap_or(0.5).clamp(0.0, 1.0);
    let reason = reply["reason"].as_str().unwrap_or("oracle selection").to_string();
    ToolDecision {
        tool,
        confidence,
        reason,
    }
}

fn policy_error(err: OracleError) -> PolicyError {
    match err {
        OracleError::ParseError(message) => PolicyError::UnusableReply(message),
        other => PolicyError::Oracle(other.to_string()),
    }
}

/// Routing policy backed by the oracle. Composed under a fallback decorator
/// by the pipeline, so its errors never surface to a run.
pub struct OracleRoutePolicy {
    oracle: Arc<dyn TriageOracle>,
    model: String,
    temperature: f64,
}

impl OracleRoutePolicy {
    pub fn new(oracle: Arc<dyn TriageOracle>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            oracle,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl RoutePolicy for OracleRoutePolicy {
    async fn decide(&self, topics: &TopicScores) -> Result<RouteDecision, PolicyError> {
        self.oracle
            .decide_route(topics, &self.model, self.temperature)
            .await
            .map_err(policy_error)
    }
}

/// Tool policy backed by the oracle.
pub struct OracleToolPolicy {
    oracle: Arc<dyn TriageOracle>,
    model: String,
    temperature: f64,
}

impl OracleToolPolicy {
    pub fn new(oracle: Arc<dyn TriageOracle>, model: impl Into<String>, temperature: f64) -> Self {
        Self {
            oracle,
            model: model.into(),
            temperature,
        }
    }
}

#[async_trait]
impl ToolPolicy for OracleToolPolicy {
    async fn select(
        &self,
        topics: &TopicScores,
        incident: &Incident,
    ) -> Result<ToolDecision, PolicyError> {
        self.oracle
            .decide_tool(incident, topics, &self.model, self.temperature)
            .await
            .map_err(policy_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use triage::RouteWithFallback;

    #[test]
    fn test_extract_json_direct() {
        let value = extract_json(r#"{"availability": 0.9}"#).unwrap();
        assert_eq!(value["availability"], 0.9);
    }

    #[test]
    fn test_extract_json_fenced() {
        let value = extract_json("```json\n{\"latency\": 0.5}\n```").unwrap();
        assert_eq!(value["latency"], 0.5);
    }

    #[test]
    fn test_extract_json_embedded_in_prose() {
        let value =
            extract_json("Sure, here is the scoring: {\"auth\": 0.7} hope that helps").unwrap();
        assert_eq!(value["auth"], 0.7);
    }

    #[test]
    fn test_extract_json_none_for_plain_text() {
        assert!(extract_json("cannot score this incident").is_none());
    }

    #[test]
    fn test_parse_route_reply_complete() {
        let decision = parse_route_reply(&json!({
            "route": "root_cause",
            "reason": "root-cause dominance: availability=0.85",
            "confidence": 0.85,
            "rc_score": 0.85,
            "eg_score": 0.3
        }));
        assert_eq!(decision.target, RouteTarget::RootCause);
        assert_eq!(decision.confidence, 0.85);
    }

    #[test]
    fn test_parse_route_reply_accepts_consultant_names() {
        let decision = parse_route_reply(&json!({"route": "root_cause_consultant"}));
        assert_eq!(decision.target, RouteTarget::RootCause);
    }

    #[test]
    fn test_parse_route_reply_defaults_to_entity_graph() {
        let decision = parse_route_reply(&json!({"reason": "no idea"}));
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert_eq!(decision.reason, "no idea");
        assert_eq!(decision.confidence, 0.0);
    }

    #[test]
    fn test_parse_route_reply_confidence_from_group_score() {
        let decision = parse_route_reply(&json!({"route": "entity_graph", "eg_score": 0.72}));
        assert_eq!(decision.confidence, 0.72);
    }

    #[test]
    fn test_parse_route_reply_clamps_confidence() {
        let decision = parse_route_reply(&json!({"route": "root_cause", "confidence": 3.5}));
        assert_eq!(decision.confidence, 1.0);
    }

    #[test]
    fn test_parse_tool_reply_known_tool() {
        let decision = parse_tool_reply(&json!({
            "tool_name": "restart_worker",
            "confidence": 0.9,
            "reason": "strong restart signal"
        }));
        assert_eq!(decision.tool, ToolKind::Restart);
        assert_eq!(decision.confidence, 0.9);
    }

    #[test]
    fn test_parse_tool_reply_defaults_to_work_note() {
        let decision = parse_tool_reply(&json!({"tool_name": "reboot_everything"}));
        assert_eq!(decision.tool, ToolKind::LogWorkNote);
        assert_eq!(decision.confidence, 0.5);
        assert_eq!(decision.reason, "oracle selection");
    }

    #[test]
    fn test_model_price_prefers_longest_prefix() {
        let mini = model_price("gpt-4o-mini-2024-07-18").unwrap();
        let full = model_price("gpt-4o-2024-08-06").unwrap();
        assert_eq!(mini, (0.15, 0.60));
        assert_eq!(full, (2.50, 10.00));
        assert!(model_price("some-local-model").is_none());
    }

    #[test]
    fn test_meter_records_reply_usage() {
        let meter = UsageMeter::new();
        meter.record_reply(
            "gpt-4o-mini",
            &json!({
                "usage": {"prompt_tokens": 1_000_000, "completion_tokens": 1_000_000, "total_tokens": 2_000_000}
            }),
        );
        let usage = meter.snapshot();
        assert_eq!(usage.requests, 1);
        assert_eq!(usage.total_tokens, 2_000_000);
        assert!((usage.cost - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_meter_take_drains() {
        let meter = UsageMeter::new();
        meter.record(OracleUsage {
            requests: 2,
            total_tokens: 50,
            cost: 0.01,
        });
        let first = meter.take();
        assert_eq!(first.requests, 2);
        let second = meter.take();
        assert_eq!(second, OracleUsage::default());
    }

    #[test]
    fn test_meter_unknown_model_costs_nothing() {
        let meter = UsageMeter::new();
        meter.record_reply("llama-local", &json!({"usage": {"total_tokens": 500}}));
        let usage = meter.snapshot();
        assert_eq!(usage.total_tokens, 500);
        assert_eq!(usage.cost, 0.0);
    }

    #[tokio::test]
    async fn test_oracle_route_policy_maps_errors() {
        let mut mock = MockTriageOracle::new();
        mock.expect_decide_route()
            .returning(|_, _, _| Err(OracleError::RequestFailed("connection refused".into())));

        let policy = OracleRoutePolicy::new(Arc::new(mock), "gpt-4o-mini", 0.5);
        let topics: TopicScores = [("availability", 0.9)].into_iter().collect();
        let err = policy.decide(&topics).await.unwrap_err();
        assert!(matches!(err, PolicyError::Oracle(_)));
    }

    #[tokio::test]
    async fn test_failing_oracle_policy_degrades_under_fallback() {
        let mut mock = MockTriageOracle::new();
        mock.expect_decide_route()
            .returning(|_, _, _| Err(OracleError::ParseError("not json".into())));

        let policy = RouteWithFallback::new(OracleRoutePolicy::new(
            Arc::new(mock),
            "gpt-4o-mini",
            0.5,
        ));
        let topics: TopicScores = [("availability", 0.9)].into_iter().collect();
        let decision = policy.decide(&topics).await.unwrap();
        assert_eq!(decision.target, RouteTarget::RootCause);
    }
}
