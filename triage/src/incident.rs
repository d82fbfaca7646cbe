//! Incident input records as received from the upstream ticket system.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Impact band carried on the incident, using the ticket system's numeric
/// codes (1 = high, 3 = low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Impact {
    High = 1,
    Medium = 2,
    Low = 3,
}

impl Impact {
    pub fn is_high(self) -> bool {
        matches!(self, Impact::High)
    }
}

impl TryFrom<u8> for Impact {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Impact::High),
            2 => Ok(Impact::Medium),
            3 => Ok(Impact::Low),
            other => Err(format!("unknown impact code {other}, expected 1..=3")),
        }
    }
}

impl From<Impact> for u8 {
    fn from(impact: Impact) -> u8 {
        impact as u8
    }
}

impl std::fmt::Display for Impact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Impact::High => "high",
            Impact::Medium => "medium",
            Impact::Low => "low",
        };
        write!(f, "{label}")
    }
}

/// Ticket lifecycle state. Wire names match the ticket system verbatim,
/// including the space in "in progress".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    New,
    #[serde(rename = "in progress")]
    InProgress,
    Resolved,
    Closed,
}

impl TicketState {
    pub fn is_closed(self) -> bool {
        matches!(self, TicketState::Resolved | TicketState::Closed)
    }
}

impl std::fmt::Display for TicketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            TicketState::New => "new",
            TicketState::InProgress => "in progress",
            TicketState::Resolved => "resolved",
            TicketState::Closed => "closed",
        };
        write!(f, "{label}")
    }
}

/// A single incident to triage. Immutable input to a pipeline run; stages
/// read it but never write it back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub short_description: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub impact: Option<Impact>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<TicketState>,
}

impl Incident {
    /// A ticket with no recorded state counts as open.
    pub fn ticket_open(&self) -> bool {
        self.state.map_or(true, |s| !s.is_closed())
    }

    pub fn is_high_impact(&self) -> bool {
        self.impact.map_or(false, Impact::is_high)
    }
}
