//! Prompt catalog for the scoring and decision oracles.
//!
//! Every prompt demands a strict JSON reply; the lenient parsing on the
//! other side lives in [`crate::oracle`]. Builders return the static system
//! prompt plus the formatted user prompt.

use std::collections::BTreeSet;

use triage::{Incident, TopicScores, ToolKind};

/// Which slice of the ontology a scoring request covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreScope {
    /// First pass over the raw incident.
    Observation,
    /// Re-scoring focused on root-cause signals.
    RootCause,
    /// Re-scoring focused on dependencies and coordination context.
    EntityGraph,
}

const OBSERVATION_SYSTEM: &str = r#"You are the entry consultant of an incident triage pipeline.
Score how strongly each topic applies to the incident.

Ontology (preferred names, case-insensitive):
["availability","latency","auth","database","network","config","capacity",
 "diagnostics","dependency","deployment","incident_management","restart_candidate","notification_required"]

Prefer the known topics you are given; add a NEW topic name only when nothing
in the ontology fits.

STRICT OUTPUT FORMAT:
Reply with ONLY one flat JSON object mapping topic names to scores in [0,1].
No prose, no markdown, no nested keys, no extra fields. Reply {} when nothing applies."#;

const ROOT_CAUSE_SYSTEM: &str = r#"You are the root-cause consultant of an incident triage pipeline.
Re-score ONLY the topics most relevant to the failure's root cause.

Ontology (use only these names, case-insensitive):
["availability","latency","auth","database","network","config","capacity",
 "diagnostics","dependency","deployment","incident_management","restart_candidate","notification_required"]

You MAY add an ontology topic that is clearly implied by the incident even if
it was not scored before.

STRICT OUTPUT FORMAT:
Reply with ONLY one flat JSON object mapping topic names to scores in [0,1].
No prose, no markdown, no nested keys, no extra fields."#;

const ENTITY_GRAPH_SYSTEM: &str = r#"You are the entity-graph consultant of an incident triage pipeline.
Re-score the topics describing dependencies, release coordination and
operational context around the incident.

Focus topics:
["dependency","deployment","incident_management","database","network","config",
 "notification_required","diagnostics"]

You MAY add a focus topic that is clearly implied even if it was not scored
before.

STRICT OUTPUT FORMAT:
Reply with ONLY one flat JSON object mapping topic names to scores in [0,1].
No prose, no markdown, no nested keys, no extra fields."#;

const ROUTING_SYSTEM: &str = r#"You are the router of an incident triage pipeline. Choose ONE analysis path.

Policy, applied to the topic scores you are given:
1) rc_score = max score among root-cause topics
   ["availability","latency","auth","database","network","config","capacity","diagnostics"] (0 if none).
2) eg_score = max score among entity-graph topics
   ["dependency","deployment","incident_management","restart_candidate","notification_required"] (0 if none).
3) With ROUTE_MIN = 0.50 and MARGIN = 0.10:
   - rc_score < ROUTE_MIN and eg_score < ROUTE_MIN: route = "entity_graph", reason = "weak signals"
   - rc_score > eg_score + MARGIN: route = "root_cause"
   - eg_score > rc_score + MARGIN: route = "entity_graph"
   - otherwise (tie): route = "entity_graph"
4) confidence = rc_score when route is "root_cause", eg_score otherwise.

Reply with ONLY a JSON object shaped exactly like:
{"route": "root_cause" | "entity_graph",
 "reason": "<short reason>",
 "confidence": <float 0..1>,
 "rc_score": <float 0..1>,
 "eg_score": <float 0..1>,
 "rc_top": "<topic or null>",
 "eg_top": "<topic or null>"}
No prose, no markdown, no extra fields."#;

const TOOL_SYSTEM: &str = r#"You are the tool decider of an incident triage pipeline. Pick exactly ONE
remediation tool for the incident, given its topic scores.

Reply with ONLY a JSON object shaped exactly like:
{"tool_name": "<one of the available tools>",
 "confidence": <float 0..1>,
 "reason": "<short reason>",
 "directive_text": "<one sentence directive for the tool>"}
No prose, no markdown, no extra fields."#;

/// System and user prompt for a scoring request.
pub fn scoring_prompt(
    scope: ScoreScope,
    incident: &Incident,
    vocabulary: &BTreeSet<String>,
) -> (&'static str, String) {
    let system = match scope {
        ScoreScope::Observation => OBSERVATION_SYSTEM,
        ScoreScope::RootCause => ROOT_CAUSE_SYSTEM,
        ScoreScope::EntityGraph => ENTITY_GRAPH_SYSTEM,
    };
    let known = if vocabulary.is_empty() {
        "(none yet)".to_string()
    } else {
        vocabulary
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    };
    let user = format!(
        "Incident JSON:\n{}\n\nKnown topics so far:\n{}",
        incident_json(incident),
        known
    );
    (system, user)
}

/// System and user prompt for a routing decision.
pub fn routing_prompt(topics: &TopicScores) -> (&'static str, String) {
    let user = format!("Topics:\n{}", topics_json(topics));
    (ROUTING_SYSTEM, user)
}

/// System and user prompt for a tool decision.
pub fn tool_prompt(incident: &Incident, topics: &TopicScores) -> (&'static str, String) {
    let tools = ToolKind::ALL
        .iter()
        .map(|tool| tool.name())
        .collect::<Vec<_>>()
        .join(", ");
    let user = format!(
        "Incident JSON:\n{}\n\nTopics:\n{}\n\nAvailable tools: {}",
        incident_json(incident),
        topics_json(topics),
        tools
    );
    (TOOL_SYSTEM, user)
}

fn incident_json(incident: &Incident) -> String {
    serde_json::to_string_pretty(incident).unwrap_or_else(|_| format!("{{\"id\": \"{}\"}}", incident.id))
}

fn topics_json(topics: &TopicScores) -> String {
    serde_json::to_string(topics).unwrap_or_else(|_| "{}".into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn incident() -> Incident {
        Incident {
            id: "INC42".into(),
            created_at: Utc::now(),
            short_description: "db down".into(),
            description: "orders db refusing connections".into(),
            service: Some("orders-db".into()),
            impact: None,
            state: None,
        }
    }

    #[test]
    fn test_scoring_prompt_embeds_incident_and_vocabulary() {
        let vocabulary = BTreeSet::from(["latency".to_string(), "database".to_string()]);
        let (system, user) = scoring_prompt(ScoreScope::Observation, &incident(), &vocabulary);
        assert!(system.contains("flat JSON object"));
        assert!(user.contains("INC42"));
        assert!(user.contains("database, latency"));
    }

    #[test]
    fn test_scoring_prompt_handles_empty_vocabulary() {
        let (_, user) = scoring_prompt(ScoreScope::RootCause, &incident(), &BTreeSet::new());
        assert!(user.contains("(none yet)"));
    }

    #[test]
    fn test_routing_prompt_names_both_routes() {
        let topics: TopicScores = [("availability", 0.8)].into_iter().collect();
        let (system, user) = routing_prompt(&topics);
        assert!(system.contains(r#""root_cause""#));
        assert!(system.contains(r#""entity_graph""#));
        assert!(user.contains("availability"));
    }

    #[test]
    fn test_tool_prompt_lists_every_tool() {
        let topics: TopicScores = [("diagnostics", 0.7)].into_iter().collect();
        let (_, user) = tool_prompt(&incident(), &topics);
        for tool in ToolKind::ALL {
            assert!(user.contains(tool.name()));
        }
    }
}
