//! The two decision stages.

use std::time::Instant;

use tracing::{info, warn};
use uuid::Uuid;

use triage::{
    Directive, HeuristicRoutePolicy, HeuristicToolPolicy, OracleUsage, RouteTarget, RunContext,
    StageDetail, StageLog,
};

use crate::pipeline::{StageId, Transition, TriagePipeline};

use super::supervisor_log;

impl TriagePipeline {
    /// Routes the run to one of the analysis consultants. The policy is
    /// already fallback-wrapped, so the extra heuristic arm here only keeps
    /// the stage total when the pipeline is wired with a bare oracle policy.
    pub(crate) async fn router_supervisor(
        &self,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        let started = Instant::now();
        info!(stage = %StageId::Router, incident = %ctx.incident.id, "routing");

        let token = ctx.token.as_ref();
        let topics = token.map(|t| t.topics.clone()).unwrap_or_default();
        let token_id = token.map(|t| t.id).unwrap_or_else(Uuid::nil);

        let decision = match self.route_policy.decide(&topics).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "route policy failed, using heuristic rule");
                HeuristicRoutePolicy.apply(&topics)
            }
        };

        let target = match decision.target {
            RouteTarget::RootCause => StageId::RootCauseConsultant,
            RouteTarget::EntityGraph => StageId::EntityGraphConsultant,
        };
        let directive = Directive::new(
            format!("Routing to route: {target}"),
            decision.confidence,
            token_id,
            decision.reason.clone(),
        );
        info!(
            directive = %directive.id,
            route = %target,
            confidence = decision.confidence,
            reason = %directive.reason,
            "route selected"
        );

        let elapsed = started.elapsed().as_millis() as u64;
        ctx.record_log(supervisor_log(StageId::Router, elapsed, self.meter.take(), &directive));
        ctx.directives = vec![directive];
        (Transition::Goto(target), Some(decision.reason))
    }

    /// Selects a remediation tool, issues the directive and dispatches the
    /// matching worker. A worker failure is logged and the run still ends
    /// normally; only a successful execution produces a worker log.
    pub(crate) async fn tool_supervisor(
        &self,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        let started = Instant::now();
        info!(stage = %StageId::ToolSupervisor, incident = %ctx.incident.id, "selecting remediation tool");

        let token = ctx.token.as_ref();
        let topics = token.map(|t| t.topics.clone()).unwrap_or_default();
        let token_id = token.map(|t| t.id).unwrap_or_else(Uuid::nil);

        let decision = match self.tool_policy.select(&topics, &ctx.incident).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, "tool policy failed, using heuristic rules");
                HeuristicToolPolicy.apply(&topics, &ctx.incident)
            }
        };

        let directive = Directive::new(
            format!(
                "[Directive] Execute tool '{}' for incident {}.",
                decision.tool.name(),
                ctx.incident.id
            ),
            decision.confidence,
            token_id,
            decision.reason.clone(),
        )
        .with_tool(decision.tool);
        info!(
            directive = %directive.id,
            tool = %decision.tool,
            confidence = decision.confidence,
            reason = %directive.reason,
            "tool selected"
        );

        match self
            .workers
            .execute(decision.tool, &directive.action, directive.id)
            .await
        {
            Ok(record) => {
                info!(tool = %record.tool, success = record.success, "worker finished");
                ctx.record_log(StageLog::from_usage(
                    record.tool.name(),
                    record.elapsed_ms,
                    OracleUsage::default(),
                    StageDetail::Worker {
                        directive_id: record.directive_id,
                        action: record.detail,
                        succeeded: record.success,
                        at: record.completed_at,
                    },
                ));
            }
            Err(err) => {
                warn!(error = %err, tool = %decision.tool, "worker execution failed");
            }
        }

        let elapsed = started.elapsed().as_millis() as u64;
        ctx.record_log(supervisor_log(StageId::ToolSupervisor, elapsed, self.meter.take(), &directive));
        ctx.directives = vec![directive];
        (Transition::Terminal, Some(decision.reason))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Arc;

    use chrono::Utc;
    use triage::{
        Impact, Incident, MemoryVocabulary, RunContext, StageRole, TicketState, Token, TokenLayer,
        ToolKind, TopicScores,
    };

    use crate::config::TriageConfig;
    use crate::oracle::{MockTriageOracle, UsageMeter};
    use crate::pipeline::{StageId, Transition, TriagePipeline};
    use crate::workers::WorkerRegistry;

    fn incident() -> Incident {
        Incident {
            id: "INC0001".into(),
            created_at: Utc::now(),
            short_description: "API gateway down".into(),
            description: "All requests to the API gateway time out.".into(),
            service: Some("api-gateway".into()),
            impact: Some(Impact::High),
            state: Some(TicketState::New),
        }
    }

    fn heuristic_pipeline(workers: WorkerRegistry) -> TriagePipeline {
        TriagePipeline::new(
            &TriageConfig::default(),
            Arc::new(MockTriageOracle::new()),
            Arc::new(UsageMeter::new()),
            workers,
            Arc::new(MemoryVocabulary::new()),
        )
    }

    fn ctx_with_topics(pairs: &[(&str, f64)]) -> RunContext {
        let topics: TopicScores = pairs.iter().map(|&(name, score)| (name, score)).collect();
        let mut ctx = RunContext::new(incident(), BTreeSet::new()).unwrap();
        ctx.token = Some(Token::new(
            TokenLayer::Observation,
            topics,
            "obs",
            "entry_consultant",
            5,
        ));
        ctx
    }

    #[tokio::test]
    async fn test_router_sends_strong_root_cause_signal_to_rc() {
        let pipeline = heuristic_pipeline(WorkerRegistry::with_builtin());
        let mut ctx = ctx_with_topics(&[("availability", 0.9), ("dependency", 0.3)]);

        let (transition, reason) = pipeline.router_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Goto(StageId::RootCauseConsultant));
        assert_eq!(reason.as_deref(), Some("root-cause dominance: availability=0.90"));

        let directive = &ctx.directives[0];
        assert_eq!(directive.action, "Routing to route: root_cause_consultant");
        assert_eq!(directive.confidence, 0.9);
        assert_eq!(ctx.logs[&StageRole::Supervisor].len(), 1);
        assert_eq!(ctx.logs[&StageRole::Supervisor][0].node, "router_supervisor");
    }

    #[tokio::test]
    async fn test_router_weak_signals_prefer_entity_graph() {
        let pipeline = heuristic_pipeline(WorkerRegistry::with_builtin());
        let mut ctx = ctx_with_topics(&[("availability", 0.3), ("dependency", 0.1)]);

        let (transition, reason) = pipeline.router_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Goto(StageId::EntityGraphConsultant));
        assert_eq!(reason.as_deref(), Some("weak signals (rc=0.30, eg=0.10)"));
    }

    #[tokio::test]
    async fn test_router_without_token_still_routes() {
        let pipeline = heuristic_pipeline(WorkerRegistry::with_builtin());
        let mut ctx = RunContext::new(incident(), BTreeSet::new()).unwrap();

        let (transition, _) = pipeline.router_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Goto(StageId::EntityGraphConsultant));
        assert!(ctx.directives[0].source_token_id.is_nil());
    }

    #[tokio::test]
    async fn test_tool_supervisor_restarts_and_logs_worker() {
        let pipeline = heuristic_pipeline(WorkerRegistry::with_builtin());
        let mut ctx = ctx_with_topics(&[("restart_candidate", 0.9)]);

        let (transition, reason) = pipeline.tool_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Terminal);
        assert_eq!(reason.as_deref(), Some("restart_candidate strong and ticket open"));

        let directive = &ctx.directives[0];
        assert_eq!(directive.tool, Some(ToolKind::Restart));
        assert_eq!(
            directive.action,
            "[Directive] Execute tool 'restart_worker' for incident INC0001."
        );

        let worker_logs = &ctx.logs[&StageRole::Worker];
        assert_eq!(worker_logs.len(), 1);
        assert_eq!(worker_logs[0].node, "restart_worker");
        assert!(matches!(
            worker_logs[0].detail,
            triage::StageDetail::Worker { succeeded: true, .. }
        ));
        assert_eq!(ctx.logs[&StageRole::Supervisor].len(), 1);
    }

    #[tokio::test]
    async fn test_tool_supervisor_falls_back_to_work_note() {
        let pipeline = heuristic_pipeline(WorkerRegistry::with_builtin());
        let mut ctx = ctx_with_topics(&[("latency", 0.2)]);

        let (transition, _) = pipeline.tool_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Terminal);

        let directive = &ctx.directives[0];
        assert_eq!(directive.tool, Some(ToolKind::LogWorkNote));
        assert_eq!(directive.confidence, 0.5);
    }

    #[tokio::test]
    async fn test_missing_worker_skips_worker_log_but_ends_run() {
        let pipeline = heuristic_pipeline(WorkerRegistry::empty());
        let mut ctx = ctx_with_topics(&[("restart_candidate", 0.9)]);

        let (transition, _) = pipeline.tool_supervisor(&mut ctx).await;
        assert_eq!(transition, Transition::Terminal);
        assert!(ctx.logs[&StageRole::Worker].is_empty());
        assert_eq!(ctx.logs[&StageRole::Supervisor].len(), 1);
        assert_eq!(ctx.directives[0].tool, Some(ToolKind::Restart));
    }
}
