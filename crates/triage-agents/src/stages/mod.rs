//! Stage bodies of the triage pipeline.
//!
//! Each stage mutates the run context (token, directives, vocabulary, logs)
//! and returns the transition it wants plus an optional reason for the
//! trace. Stages never fail a run: oracle trouble degrades to empty scores
//! or to the heuristic decision rules inside the stage.

mod consultants;
mod supervisors;

use triage::{Directive, OracleUsage, StageDetail, StageLog, Token};

use crate::pipeline::StageId;

/// Consultant record around the token the stage produced. `usage` is the
/// oracle traffic metered while the stage ran.
fn consultant_log(stage: StageId, elapsed_ms: u64, usage: OracleUsage, token: &Token) -> StageLog {
    StageLog::from_usage(
        stage.name(),
        elapsed_ms,
        usage,
        StageDetail::Consultant {
            token_id: token.id,
            input_length: token.content.len(),
            topics: token.topics.names().map(str::to_string).collect(),
        },
    )
}

/// Supervisor record around the directive the stage issued.
fn supervisor_log(
    stage: StageId,
    elapsed_ms: u64,
    usage: OracleUsage,
    directive: &Directive,
) -> StageLog {
    StageLog::from_usage(
        stage.name(),
        elapsed_ms,
        usage,
        StageDetail::Supervisor {
            token_id: directive.source_token_id,
            actions: vec![directive.action.clone()],
            reasons: vec![directive.reason.clone()],
            directives: 1,
            at: directive.issued_at,
        },
    )
}
