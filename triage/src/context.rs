//! The shared state threaded through one incident's pipeline walk.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::incident::Incident;
use crate::logs::{empty_run_logs, RunLogs, StageLog};
use crate::scoring::TopicScores;
use crate::tooling::ToolKind;

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_TEMPERATURE: f64 = 0.5;

#[derive(Debug, Error)]
pub enum ContextError {
    #[error("incident identifier is empty")]
    EmptyIncidentId,
}

/// Annotation layer a token belongs to. Wire names keep the layer prefix
/// used by downstream consumers of the run output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenLayer {
    #[serde(rename = "observation")]
    Observation,
    #[serde(rename = "analysis:root_cause")]
    RootCauseAnalysis,
    #[serde(rename = "analysis:entity_graph")]
    EntityGraphAnalysis,
}

impl std::fmt::Display for TokenLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TokenLayer::Observation => "observation",
            TokenLayer::RootCauseAnalysis => "analysis:root_cause",
            TokenLayer::EntityGraphAnalysis => "analysis:entity_graph",
        };
        write!(f, "{label}")
    }
}

/// One scoring stage's annotation of the incident: the topic scores it
/// computed over the text it analyzed. The context keeps only the most
/// recent token, not a history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: Uuid,
    pub layer: TokenLayer,
    pub topics: TopicScores,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub produced_by: String,
    pub elapsed_ms: u64,
}

impl Token {
    pub fn new(
        layer: TokenLayer,
        topics: TopicScores,
        content: impl Into<String>,
        produced_by: impl Into<String>,
        elapsed_ms: u64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            layer,
            topics,
            content: content.into(),
            created_at: Utc::now(),
            produced_by: produced_by.into(),
            elapsed_ms,
        }
    }
}

/// A decision issued by the router or the tool supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Directive {
    pub id: Uuid,
    pub action: String,
    pub confidence: f64,
    pub source_token_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<ToolKind>,
}

impl Directive {
    pub fn new(
        action: impl Into<String>,
        confidence: f64,
        source_token_id: Uuid,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            action: action.into(),
            confidence,
            source_token_id,
            issued_at: Utc::now(),
            reason: reason.into(),
            tool: None,
        }
    }

    pub fn with_tool(mut self, tool: ToolKind) -> Self {
        self.tool = Some(tool);
        self
    }
}

/// Mutable state of one incident's walk through the pipeline. Owned by the
/// scheduler and handed to each stage as `&mut`; discarded after the run,
/// once its log map has been copied into the batch list.
#[derive(Debug, Clone, Serialize)]
pub struct RunContext {
    /// Topic names seen so far, union-merged across stages and runs.
    pub vocabulary: BTreeSet<String>,
    /// Whether decision stages may consult the external oracle. Scoring
    /// always tries the oracle regardless.
    pub oracle_decisions: bool,
    pub incident: Incident,
    pub token: Option<Token>,
    /// Latest decision set; replaced whole by each decision stage.
    pub directives: Vec<Directive>,
    pub logs: RunLogs,
    pub model: String,
    pub temperature: f64,
}

impl RunContext {
    /// Validates the incident and seeds an empty context around it. The log
    /// map starts with all three roles present.
    pub fn new(incident: Incident, vocabulary: BTreeSet<String>) -> Result<Self, ContextError> {
        if incident.id.trim().is_empty() {
            return Err(ContextError::EmptyIncidentId);
        }
        Ok(Self {
            vocabulary,
            oracle_decisions: false,
            incident,
            token: None,
            directives: Vec::new(),
            logs: empty_run_logs(),
            model: DEFAULT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
        })
    }

    pub fn with_oracle_decisions(mut self, enabled: bool) -> Self {
        self.oracle_decisions = enabled;
        self
    }

    pub fn with_model(mut self, model: impl Into<String>, temperature: f64) -> Self {
        self.model = model.into();
        self.temperature = temperature;
        self
    }

    /// Appends a stage log under its role.
    pub fn record_log(&mut self, log: StageLog) {
        self.logs.entry(log.role()).or_default().push(log);
    }

    /// Unions topic names into the accumulated vocabulary.
    pub fn extend_vocabulary<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.vocabulary.insert(name.as_ref().to_string());
        }
    }

    /// Consumes the context, keeping only what the batch needs.
    pub fn into_logs(self) -> RunLogs {
        self.logs
    }
}
