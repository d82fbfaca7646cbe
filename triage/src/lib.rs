//! Deterministic core of the incident-triage pipeline.
//!
//! Everything in this crate is side-effect free apart from the vocabulary
//! store: the data model ([`incident`], [`context`]), topic scoring and
//! macro-grouping ([`scoring`]), the routing and tool-selection policies
//! ([`routing`], [`tooling`]), per-stage execution logs ([`logs`]) and the
//! batch-level metrics reduction ([`metrics`]). The async orchestrator that
//! drives stages against live oracles and workers lives in the
//! `triage-agents` crate and builds entirely on these types.

pub mod context;
pub mod incident;
pub mod logs;
pub mod metrics;
pub mod routing;
pub mod scoring;
pub mod tooling;
pub mod vocabulary;

pub use context::{ContextError, Directive, RunContext, Token, TokenLayer};
pub use incident::{Impact, Incident, TicketState};
pub use logs::{OracleUsage, RunLogs, StageDetail, StageLog, StageRole};
pub use metrics::{aggregate, MetricsError, ProcessedMetrics};
pub use routing::{
    HeuristicRoutePolicy, PolicyError, RouteDecision, RoutePolicy, RouteTarget, RouteWithFallback,
    ROUTE_MARGIN, ROUTE_MIN,
};
pub use scoring::{group_scores, MacroGroupScores, TopicScores};
pub use tooling::{HeuristicToolPolicy, ToolDecision, ToolKind, ToolPolicy, ToolWithFallback};
pub use vocabulary::{FileVocabulary, MemoryVocabulary, VocabularyError, VocabularyStore};
