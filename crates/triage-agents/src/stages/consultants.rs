//! The three scoring stages.

use std::time::Instant;

use tracing::{info, warn};

use triage::{RunContext, Token, TokenLayer, TopicScores};

use crate::pipeline::{StageId, Transition, TriagePipeline};
use crate::prompts::ScoreScope;

use super::consultant_log;

impl TriagePipeline {
    /// Scores the raw incident and seeds the observation token.
    pub(crate) async fn entry_consultant(
        &self,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        let started = Instant::now();
        info!(stage = %StageId::EntryConsultant, incident = %ctx.incident.id, "scoring incident");

        let topics = self.score_or_empty(ctx, ScoreScope::Observation).await;
        let elapsed = started.elapsed().as_millis() as u64;
        let token = Token::new(
            TokenLayer::Observation,
            topics,
            ctx.incident.description.clone(),
            StageId::EntryConsultant.name(),
            elapsed,
        );
        info!(token = %token.id, topics = token.topics.len(), "observation token created");

        self.remember_topics(ctx, &token);
        ctx.record_log(consultant_log(
            StageId::EntryConsultant,
            elapsed,
            self.meter.take(),
            &token,
        ));
        ctx.token = Some(token);
        (Transition::Goto(StageId::Router), None)
    }

    pub(crate) async fn root_cause_consultant(
        &self,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        self.analysis_consultant(
            ctx,
            StageId::RootCauseConsultant,
            ScoreScope::RootCause,
            TokenLayer::RootCauseAnalysis,
        )
        .await
    }

    pub(crate) async fn entity_graph_consultant(
        &self,
        ctx: &mut RunContext,
    ) -> (Transition, Option<String>) {
        self.analysis_consultant(
            ctx,
            StageId::EntityGraphConsultant,
            ScoreScope::EntityGraph,
            TokenLayer::EntityGraphAnalysis,
        )
        .await
    }

    /// Shared body of the two analysis stages: re-score with a focused
    /// ontology, max-merge into the current token's scores and replace the
    /// token with the annotated layer.
    async fn analysis_consultant(
        &self,
        ctx: &mut RunContext,
        stage: StageId,
        scope: ScoreScope,
        layer: TokenLayer,
    ) -> (Transition, Option<String>) {
        let started = Instant::now();
        info!(stage = %stage, incident = %ctx.incident.id, "scoring incident");

        let scored = self.score_or_empty(ctx, scope).await;
        let merged = match &ctx.token {
            Some(token) => token.topics.merge(&scored),
            None => scored,
        };
        let elapsed = started.elapsed().as_millis() as u64;
        let token = Token::new(
            layer,
            merged,
            ctx.incident.description.clone(),
            stage.name(),
            elapsed,
        );
        info!(token = %token.id, layer = %token.layer, topics = token.topics.len(), "analysis token created");

        self.remember_topics(ctx, &token);
        ctx.record_log(consultant_log(stage, elapsed, self.meter.take(), &token));
        ctx.token = Some(token);
        (Transition::Goto(StageId::ToolSupervisor), None)
    }

    /// A scoring failure never stops the run; the stage continues with an
    /// empty map and the decision stages degrade accordingly.
    async fn score_or_empty(&self, ctx: &RunContext, scope: ScoreScope) -> TopicScores {
        match self
            .oracle
            .score_topics(&ctx.incident, &ctx.vocabulary, scope, &ctx.model, ctx.temperature)
            .await
        {
            Ok(topics) => topics,
            Err(err) => {
                warn!(error = %err, scope = ?scope, "scoring failed, continuing with empty topics");
                TopicScores::new()
            }
        }
    }

    /// Unions the token's topic names into the run vocabulary and persists
    /// them. Persistence failures are logged and skipped.
    fn remember_topics(&self, ctx: &mut RunContext, token: &Token) {
        ctx.extend_vocabulary(token.topics.names());
        if let Err(err) = self.vocabulary.save(&ctx.vocabulary) {
            warn!(error = %err, "could not persist vocabulary");
        }
    }
}
