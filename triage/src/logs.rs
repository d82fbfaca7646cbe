//! Per-stage execution records.
//!
//! Every stage appends exactly one [`StageLog`] to its role's list in the run
//! context; the batch aggregator later folds these into fleet metrics. The
//! common fields (cost, token usage, LLM call count) come straight from the
//! oracle usage metered while the stage ran, and are zero for stages that
//! never reached the oracle.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The three roles a stage can log under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageRole {
    Consultant,
    Supervisor,
    Worker,
}

impl StageRole {
    pub const ALL: [StageRole; 3] = [StageRole::Consultant, StageRole::Supervisor, StageRole::Worker];
}

impl std::fmt::Display for StageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            StageRole::Consultant => "consultant",
            StageRole::Supervisor => "supervisor",
            StageRole::Worker => "worker",
        };
        write!(f, "{label}")
    }
}

/// Oracle accounting for one scope (one stage, or one whole run).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleUsage {
    pub requests: u32,
    pub total_tokens: u64,
    pub cost: f64,
}

impl OracleUsage {
    pub fn absorb(&mut self, other: OracleUsage) {
        self.requests += other.requests;
        self.total_tokens += other.total_tokens;
        self.cost += other.cost;
    }
}

/// Role-specific payload of a stage log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StageDetail {
    Consultant {
        token_id: Uuid,
        input_length: usize,
        topics: Vec<String>,
    },
    Supervisor {
        token_id: Uuid,
        actions: Vec<String>,
        reasons: Vec<String>,
        directives: u32,
        at: DateTime<Utc>,
    },
    Worker {
        directive_id: Uuid,
        action: String,
        succeeded: bool,
        at: DateTime<Utc>,
    },
}

impl StageDetail {
    pub fn role(&self) -> StageRole {
        match self {
            StageDetail::Consultant { .. } => StageRole::Consultant,
            StageDetail::Supervisor { .. } => StageRole::Supervisor,
            StageDetail::Worker { .. } => StageRole::Worker,
        }
    }
}

/// One stage execution record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLog {
    pub node: String,
    pub token_usage: u64,
    pub processing_ms: u64,
    pub total_cost: f64,
    pub llm_calls: u32,
    pub detail: StageDetail,
}

impl StageLog {
    /// Builds a record from the usage metered while the stage ran.
    pub fn from_usage(
        node: impl Into<String>,
        processing_ms: u64,
        usage: OracleUsage,
        detail: StageDetail,
    ) -> Self {
        Self {
            node: node.into(),
            token_usage: usage.total_tokens,
            processing_ms,
            total_cost: usage.cost,
            llm_calls: usage.requests,
            detail,
        }
    }

    pub fn role(&self) -> StageRole {
        self.detail.role()
    }
}

/// Role-keyed log lists for one incident run. Always carries all three role
/// keys, even for roles that logged nothing.
pub type RunLogs = BTreeMap<StageRole, Vec<StageLog>>;

/// A `RunLogs` with every role present and empty.
pub fn empty_run_logs() -> RunLogs {
    StageRole::ALL.into_iter().map(|role| (role, Vec::new())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_run_logs_has_all_roles() {
        let logs = empty_run_logs();
        assert_eq!(logs.len(), 3);
        for role in StageRole::ALL {
            assert!(logs[&role].is_empty());
        }
    }

    #[test]
    fn test_usage_absorb_accumulates() {
        let mut total = OracleUsage::default();
        total.absorb(OracleUsage {
            requests: 1,
            total_tokens: 120,
            cost: 0.002,
        });
        total.absorb(OracleUsage {
            requests: 2,
            total_tokens: 80,
            cost: 0.001,
        });
        assert_eq!(total.requests, 3);
        assert_eq!(total.total_tokens, 200);
        assert!((total.cost - 0.003).abs() < 1e-9);
    }

    #[test]
    fn test_log_role_follows_detail() {
        let log = StageLog::from_usage(
            "entry_consultant",
            42,
            OracleUsage::default(),
            StageDetail::Consultant {
                token_id: Uuid::new_v4(),
                input_length: 10,
                topics: vec!["availability".into()],
            },
        );
        assert_eq!(log.role(), StageRole::Consultant);
        assert_eq!(log.token_usage, 0);
        assert_eq!(log.processing_ms, 42);
    }

    #[test]
    fn test_detail_serializes_with_role_tag() {
        let detail = StageDetail::Worker {
            directive_id: Uuid::new_v4(),
            action: "restart".into(),
            succeeded: true,
            at: Utc::now(),
        };
        let value = serde_json::to_value(&detail).unwrap();
        assert_eq!(value["role"], "worker");
        assert_eq!(value["succeeded"], true);
    }
}
