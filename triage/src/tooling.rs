//! Remediation tool selection.
//!
//! Mirrors the routing layer: a [`ToolPolicy`] trait, a deterministic rule
//! table that never fails, and a fallback decorator so an oracle-backed
//! policy can degrade to the rules instead of erroring out of the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::incident::Incident;
use crate::routing::PolicyError;
use crate::scoring::TopicScores;

/// Minimum restart_candidate score for the restart rule.
pub const RESTART_MIN: f64 = 0.70;
/// Minimum notification_required score for the notify rule.
pub const NOTIFY_MIN: f64 = 0.70;
/// Availability score that, on a high-impact incident, forces a notification.
pub const AVAILABILITY_CRITICAL: f64 = 0.85;
/// Minimum diagnostics score for the diagnostics rule.
pub const DIAGNOSTICS_MIN: f64 = 0.60;
/// Confidence floor for the work-note fallback.
pub const WORK_NOTE_FLOOR: f64 = 0.50;

/// The four remediation tools, named as registered on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ToolKind {
    #[serde(rename = "restart_worker")]
    Restart,
    #[serde(rename = "diagnostics_worker")]
    Diagnostics,
    #[serde(rename = "notify_team_worker")]
    NotifyTeam,
    #[serde(rename = "log_work_note_worker")]
    LogWorkNote,
}

impl ToolKind {
    pub const ALL: [ToolKind; 4] = [
        ToolKind::Restart,
        ToolKind::Diagnostics,
        ToolKind::NotifyTeam,
        ToolKind::LogWorkNote,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Restart => "restart_worker",
            ToolKind::Diagnostics => "diagnostics_worker",
            ToolKind::NotifyTeam => "notify_team_worker",
            ToolKind::LogWorkNote => "log_work_note_worker",
        }
    }

    pub fn from_name(name: &str) -> Option<ToolKind> {
        ToolKind::ALL.into_iter().find(|tool| tool.name() == name.trim())
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Outcome of tool selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDecision {
    pub tool: ToolKind,
    pub confidence: f64,
    pub reason: String,
}

/// Picks the remediation tool for an incident given its topic scores.
#[async_trait]
pub trait ToolPolicy: Send + Sync {
    async fn select(
        &self,
        topics: &TopicScores,
        incident: &Incident,
    ) -> Result<ToolDecision, PolicyError>;
}

/// The deterministic rule table. Rules are ordered by priority and the first
/// match wins; the final rule always matches, so this policy cannot fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicToolPolicy;

impl HeuristicToolPolicy {
    /// Infallible form of [`ToolPolicy::select`].
    pub fn apply(&self, topics: &TopicScores, incident: &Incident) -> ToolDecision {
        let restart = topics.score("restart_candidate");
        if restart >= RESTART_MIN && incident.ticket_open() {
            return ToolDecision {
                tool: ToolKind::Restart,
                confidence: restart,
                reason: "restart_candidate strong and ticket open".into(),
            };
        }

        let notify = topics.score("notification_required");
        if notify >= NOTIFY_MIN {
            return ToolDecision {
                tool: ToolKind::NotifyTeam,
                confidence: notify,
                reason: "notification_required strong".into(),
            };
        }

        let availability = topics.score("availability");
        if incident.is_high_impact() && availability >= AVAILABILITY_CRITICAL {
            return ToolDecision {
                tool: ToolKind::NotifyTeam,
                confidence: availability,
                reason: "high impact + availability signal".into(),
            };
        }

        let diagnostics = topics.score("diagnostics");
        if diagnostics >= DIAGNOSTICS_MIN {
            return ToolDecision {
                tool: ToolKind::Diagnostics,
                confidence: diagnostics,
                reason: "diagnostics indicated".into(),
            };
        }

        ToolDecision {
            tool: ToolKind::LogWorkNote,
            confidence: topics.score("incident_management").max(WORK_NOTE_FLOOR),
            reason: "fallback to work note".into(),
        }
    }
}

#[async_trait]
impl ToolPolicy for HeuristicToolPolicy {
    async fn select(
        &self,
        topics: &TopicScores,
        incident: &Incident,
    ) -> Result<ToolDecision, PolicyError> {
        Ok(self.apply(topics, incident))
    }
}

/// Decorator that tries a primary policy and degrades to the rule table on
/// any error, so tool selection never fails the run.
pub struct ToolWithFallback<P> {
    primary: P,
    fallback: HeuristicToolPolicy,
}

impl<P: ToolPolicy> ToolWithFallback<P> {
    pub fn new(primary: P) -> Self {
        Self {
            primary,
            fallback: HeuristicToolPolicy,
        }
    }
}

#[async_trait]
impl<P: ToolPolicy> ToolPolicy for ToolWithFallback<P> {
    async fn select(
        &self,
        topics: &TopicScores,
        incident: &Incident,
    ) -> Result<ToolDecision, PolicyError> {
        match self.primary.select(topics, incident).await {
            Ok(decision) => Ok(decision),
            Err(err) => {
                warn!(error = %err, "tool policy failed, using heuristic rules");
                self.fallback.select(topics, incident).await
            }
        }
    }
}
