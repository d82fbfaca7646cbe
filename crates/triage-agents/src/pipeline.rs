//! The five-stage triage pipeline.
//!
//! One incident walks the stage graph as a small state machine: every hop a
//! stage requests is validated against the legal transition table and
//! recorded, so a run that would leave the graph fails loudly instead of
//! looping. Stage bodies live in [`crate::stages`]; this module owns the
//! walk, the wiring of policies and workers, and the transition trace.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use triage::{
    ContextError, HeuristicRoutePolicy, HeuristicToolPolicy, Incident, RoutePolicy,
    RouteWithFallback, RunContext, ToolPolicy, ToolWithFallback, VocabularyStore,
};

use crate::config::TriageConfig;
use crate::oracle::{OracleRoutePolicy, OracleToolPolicy, TriageOracle, UsageMeter};
use crate::workers::WorkerRegistry;

/// The five pipeline stages, named as they appear in logs and traces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageId {
    #[serde(rename = "entry_consultant")]
    EntryConsultant,
    #[serde(rename = "router_supervisor")]
    Router,
    #[serde(rename = "root_cause_consultant")]
    RootCauseConsultant,
    #[serde(rename = "entity_graph_consultant")]
    EntityGraphConsultant,
    #[serde(rename = "tool_invocation_supervisor")]
    ToolSupervisor,
}

impl StageId {
    pub fn name(self) -> &'static str {
        match self {
            StageId::EntryConsultant => "entry_consultant",
            StageId::Router => "router_supervisor",
            StageId::RootCauseConsultant => "root_cause_consultant",
            StageId::EntityGraphConsultant => "entity_graph_consultant",
            StageId::ToolSupervisor => "tool_invocation_supervisor",
        }
    }
}

impl std::fmt::Display for StageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Where a stage hands control next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Transition {
    Goto(StageId),
    Terminal,
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Goto(stage) => write!(f, "{stage}"),
            Transition::Terminal => write!(f, "terminal"),
        }
    }
}

/// Legal hops:
///
/// entry_consultant -> router_supervisor
/// router_supervisor -> root_cause_consultant | entity_graph_consultant
/// root_cause_consultant -> tool_invocation_supervisor
/// entity_graph_consultant -> tool_invocation_supervisor
/// tool_invocation_supervisor -> terminal
pub fn is_legal_transition(from: StageId, to: Transition) -> bool {
    use StageId::*;
    use Transition::*;
    matches!(
        (from, to),
        (EntryConsultant, Goto(Router))
            | (Router, Goto(RootCauseConsultant))
            | (Router, Goto(EntityGraphConsultant))
            | (RootCauseConsultant, Goto(ToolSupervisor))
            | (EntityGraphConsultant, Goto(ToolSupervisor))
            | (ToolSupervisor, Terminal)
    )
}

/// One recorded hop of a run's walk. `elapsed_ms` counts from run start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: StageId,
    pub to: Transition,
    pub elapsed_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("illegal stage transition: {from} -> {to}")]
    IllegalTransition { from: StageId, to: Transition },

    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Everything one incident run produced: the final context (token,
/// directives, role-keyed logs) and the transition trace.
#[derive(Debug)]
pub struct RunOutcome {
    pub context: RunContext,
    pub trace: Vec<TransitionRecord>,
}

impl RunOutcome {
    pub fn final_directive(&self) -> Option<&triage::Directive> {
        self.context.directives.last()
    }
}

/// Drives one incident at a time through the stage graph. Holds the oracle,
/// the decision policies, the worker registry and the vocabulary store; the
/// per-run state lives in the [`RunContext`] threaded through the stages.
pub struct TriagePipeline {
    pub(crate) oracle: Arc<dyn TriageOracle>,
    pub(crate) meter: Arc<UsageMeter>,
    pub(crate) route_policy: Box<dyn RoutePolicy>,
    pub(crate) tool_policy: Box<dyn ToolPolicy>,
    pub(crate) workers: WorkerRegistry,
    pub(crate) vocabulary: Arc<dyn VocabularyStore>,
    pub(crate) model: String,
    pub(crate) temperature: f64,
    pub(crate) oracle_decisions: bool,
}

impl TriagePipeline {
    /// Wires the pipeline from configuration. With oracle decisions enabled
    /// both decision stages go through the oracle with the heuristic rules
    /// as fallback; otherwise they use the heuristics directly. Scoring
    /// always goes through the oracle.
    pub fn new(
        config: &TriageConfig,
        oracle: Arc<dyn TriageOracle>,
        meter: Arc<UsageMeter>,
        workers: WorkerRegistry,
        vocabulary: Arc<dyn VocabularyStore>,
    ) -> Self {
        let (route_policy, tool_policy): (Box<dyn RoutePolicy>, Box<dyn ToolPolicy>) =
            if config.oracle_decisions {
                (
                    Box::new(RouteWithFallback::new(OracleRoutePolicy::new(
                        oracle.clone(),
                        config.model.clone(),
                        config.temperature,
                    ))),
                    Box::new(ToolWithFallback::new(OracleToolPolicy::new(
                        oracle.clone(),
                        config.model.clone(),
                        config.temperature,
                    ))),
                )
            } else {
                (Box::new(HeuristicRoutePolicy), Box::new(HeuristicToolPolicy))
            };

        Self {
            oracle,
            meter,
            route_policy,
            tool_policy,
            workers,
            vocabulary,
            model: config.model.clone(),
            temperature: config.temperature,
            oracle_decisions: config.oracle_decisions,
        }
    }

    /// Walks one incident through the stage graph. Decision and scoring
    /// failures degrade inside the stages; the only run-level errors are an
    /// invalid incident and a hop outside the legal graph.
    pub async fn run(&self, incident: Incident) -> Result<RunOutcome, PipelineError> {
        let vocabulary = match self.vocabulary.load() {
            Ok(names) => names,
            Err(err) => {
                warn!(error = %err, "vocabulary load failed, starting empty");
                BTreeSet::new()
            }
        };

        let mut ctx = RunContext::new(incident, vocabulary)?
            .with_oracle_decisions(self.oracle_decisions)
            .with_model(self.model.clone(), self.temperature);

        info!(incident = %ctx.incident.id, "triage run starting");
        let started = Instant::now();
        // Drop usage left over from a previous failed run.
        self.meter.take();

        let mut trace: Vec<TransitionRecord> = Vec::new();
        let mut current = StageId::EntryConsultant;

        loop {
            let (to, reason) = self.execute_stage(current, &mut ctx).await;
            if !is_legal_transition(current, to) {
                warn!(from = %current, to = %to, "stage requested an illegal transition");
                return Err(PipelineError::IllegalTransition { from: current, to });
            }
            debug!(from = %current, to = %to, "stage transition");
            trace.push(TransitionRecord {
                from: current,
                to,
                elapsed_ms: started.elapsed().as_millis() as u64,
                reason,
            });
            match to {
                Transition::Goto(next) => current = next,
                Transition::Terminal => break,
            }
        }

        info!(
            incident = %ctx.incident.id,
            stages = trace.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "triage run complete"
        );
        Ok(RunOutcome {
            context: ctx,
            trace,
        })
    }

    async fn execute_stage(
        &self,
        stage: StageId,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        match stage {
            StageId::EntryConsultant => self.entry_consultant(ctx).await,
            StageId::Router => self.router_supervisor(ctx).await,
            StageId::RootCauseConsultant => self.root_cause_consultant(ctx).await,
            StageId::EntityGraphConsultant => self.entity_graph_consultant(ctx).await,
            StageId::ToolSupervisor => self.tool_supervisor(ctx).await,
        }
    }
}
