//! Routing between the two analysis paths.
//!
//! The router never fails: the deterministic policy is total, and the
//! fallback decorator turns any primary-policy error into a deterministic
//! decision. Thresholds follow the triage playbook: a macro-group score
//! below [`ROUTE_MIN`] is a weak signal, and two groups within
//! [`ROUTE_MARGIN`] of each other are a tie, resolved toward the
//! entity-graph path to gather context before committing to a root cause.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::scoring::{group_scores, TopicScores};

/// Minimum macro-group score for a signal to count as strong.
pub const ROUTE_MIN: f64 = 0.50;
/// Score margin one group must exceed the other by to dominate.
pub const ROUTE_MARGIN: f64 = 0.10;

/// The two analysis paths a run can take after the entry stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteTarget {
    RootCause,
    EntityGraph,
}

impl std::fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RouteTarget::RootCause => "root_cause",
            RouteTarget::EntityGraph => "entity_graph",
        };
        write!(f, "{label}")
    }
}

/// Outcome of a routing decision.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteDecision {
    pub target: RouteTarget,
    pub confidence: f64,
    pub reason: String,
}

/// Why a policy could not produce a decision. Deterministic policies never
/// return these; oracle-backed ones surface transport failures and replies
/// too broken to default.
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("oracle request failed: {0}")]
    Oracle(String),
    #[error("oracle reply unusable: {0}")]
    UnusableReply(String),
}

/// Decides which analysis path to take given the current topic scores.
#[async_trait]
pub trait RoutePolicy: Send + Sync {
    async fn decide(&self, topics: &TopicScores) -> Result<RouteDecision, PolicyError>;
}

/// The deterministic routing rule. Total over all inputs.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicRoutePolicy;

impl HeuristicRoutePolicy {
    /// Infallible form of [`RoutePolicy::decide`].
    pub fn apply(&self, topics: &TopicScores) -> RouteDecision {
        let groups = group_scores(topics);
        let rc = groups.root_cause;
        let eg = groups.entity_graph;

        if rc < ROUTE_MIN && eg < ROUTE_MIN {
            return RouteDecision {
                target: RouteTarget::EntityGraph,
                confidence: eg,
                reason: format!("weak signals (rc={rc:.2}, eg={eg:.2})"),
            };
        }
        if rc > eg + ROUTE_MARGIN {
            let top = groups.top_root_cause.as_deref().unwrap_or("root_cause");
            return RouteDecision {
                target: RouteTarget::RootCause,
                confidence: rc,
                reason: format!("root-cause dominance: {top}={rc:.2}"),
            };
        }
        if eg > rc + ROUTE_MARGIN {
            let top = groups.top_entity.as_deref().unwrap_or("entity_graph");
            return RouteDecision {
                target: RouteTarget::EntityGraph,
                confidence: eg,
                reason: format!("entity-graph dominance: {top}={eg:.2}"),
            };
        }
        RouteDecision {
            target: RouteTarget::EntityGraph,
            confidence: eg,
            reason: format!("tie (rc={rc:.2}, eg={eg:.2}) -> prefer entity"),
        }
    }
}

#[async_trait]
impl RoutePolicy for HeuristicRoutePolicy {
    async fn decide(&self, topics: &TopicScores) -> Result<RouteDecision, PolicyError> {
        Ok(self.apply(topics))
    }
}

/// Decorator that tries a primary policy and degrades to the deterministic
/// rule on any error.
pub struct RouteWithFallback<P> {
    primary: P,
    fallback: HeuristicRoutePolicy,
}

impl<P: RoutePolicy> RouteWithFallback<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: HeuristicRoutePolicy,
        }
    }
}

#[async_trait]
impl<P: RoutePolicy> RoutePolicy for RouteWithFallback<P> {
    async fn decide(&self, topics: &TopicScores) -> Result<RouteDecision, PolicyError> {
        match self.primary.decide(topics).await {
            Ok(decision) => Ok(decision),
            Err(err) => {
                warn!(error = %err, "route policy failed, using heuristic rule");
                self.fallback.decide(topics).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn topics(pairs: &[(&str, f64)]) -> TopicScores {
        pairs.iter().copied().collect()
    }

    async fn decide(pairs: &[(&str, f64)]) -> RouteDecision {
        HeuristicRoutePolicy.decide(&topics(pairs)).await.unwrap()
    }

    #[tokio::test]
    async fn test_weak_signals_go_to_entity_graph() {
        let decision = decide(&[("availability", 0.40), ("latency", 0.30)]).await;
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert!(decision.reason.contains("weak signals"));
        assert_eq!(decision.confidence, 0.0);
    }

    #[tokio::test]
    async fn test_root_cause_dominance() {
        let decision = decide(&[("availability", 0.85), ("dependency", 0.30)]).await;
        assert_eq!(decision.target, RouteTarget::RootCause);
        assert_eq!(decision.confidence, 0.85);
        assert!(decision.reason.contains("availability=0.85"));
    }

    #[tokio::test]
    async fn test_entity_graph_dominance() {
        let decision = decide(&[("availability", 0.55), ("restart_candidate", 0.90)]).await;
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert_eq!(decision.confidence, 0.90);
        assert!(decision.reason.contains("restart_candidate=0.90"));
    }

    #[tokio::test]
    async fn test_close_scores_tie_break_to_entity_graph() {
        let decision = decide(&[("dependency", 0.65), ("availability", 0.60)]).await;
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert!(decision.reason.contains("prefer entity"));
    }

    #[tokio::test]
    async fn test_exact_margin_is_still_a_tie() {
        // 0.70 - 0.60 == ROUTE_MARGIN, dominance requires strictly more.
        let decision = decide(&[("availability", 0.70), ("dependency", 0.60)]).await;
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert!(decision.reason.contains("prefer entity"));
    }

    #[tokio::test]
    async fn test_single_strong_group_dominates_empty_other() {
        let decision = decide(&[("database", 0.75)]).await;
        assert_eq!(decision.target, RouteTarget::RootCause);
        assert!(decision.reason.contains("database"));
    }

    #[tokio::test]
    async fn test_decision_is_deterministic() {
        let pairs = [("availability", 0.62), ("dependency", 0.58)];
        let first = decide(&pairs).await;
        let second = decide(&pairs).await;
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_empty_topics_route_to_entity_graph() {
        let decision = decide(&[]).await;
        assert_eq!(decision.target, RouteTarget::EntityGraph);
        assert!(decision.reason.contains("weak signals"));
    }

    #[tokio::test]
    async fn test_fallback_decorator_recovers_from_policy_error() {
        struct AlwaysFails;

        #[async_trait]
        impl RoutePolicy for AlwaysFails {
            async fn decide(&self, _topics: &TopicScores) -> Result<RouteDecision, PolicyError> {
                Err(PolicyError::UnusableReply("not json".into()))
            }
        }

        let decision = RouteWithFallback::new(AlwaysFails)
            .decide(&topics(&[("availability", 0.9)]))
            .await
            .unwrap();
        assert_eq!(decision.target, RouteTarget::RootCause);
    }
}
