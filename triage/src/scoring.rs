//! Topic-score maps and the two macro-groups used for routing.
//!
//! Every score map in the system goes through [`TopicScores`], which owns the
//! normalization rules: topic names are trimmed and lower-cased, scores are
//! clamped to `[0, 1]`. Raw oracle output enters through
//! [`TopicScores::from_json`], which coerces leniently and drops what it
//! cannot read instead of failing the stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Topics that signal a root-cause analysis path.
pub const ROOT_CAUSE_TOPICS: &[&str] = &[
    "availability",
    "latency",
    "auth",
    "database",
    "network",
    "config",
    "capacity",
    "diagnostics",
];

/// Topics that signal an entity-graph (context building) path.
pub const ENTITY_GRAPH_TOPICS: &[&str] = &[
    "dependency",
    "deployment",
    "incident_management",
    "restart_candidate",
    "notification_required",
];

/// Normalized topic-name to score mapping.
///
/// Keys are always trimmed and lower-cased, values always in `[0, 1]`; both
/// are enforced on every insert, so two maps can be merged without
/// re-validating.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, f64>")]
pub struct TopicScores(BTreeMap<String, f64>);

impl TopicScores {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a map from a raw oracle reply. Anything that is not a JSON
    /// object yields an empty map; within an object, numbers and numeric
    /// strings are kept (clamped), every other value is skipped.
    pub fn from_json(value: &Value) -> Self {
        let mut scores = Self::new();
        let Value::Object(map) = value else {
            return scores;
        };
        for (name, raw) in map {
            let score = match raw {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            };
            if let Some(score) = score {
                scores.insert(name, score);
            }
        }
        scores
    }

    /// Inserts one score under the normalized name. Non-finite scores and
    /// names that are empty after trimming are dropped; on a name collision
    /// the higher score wins.
    pub fn insert(&mut self, name: &str, score: f64) {
        let Some(key) = normalize(name) else {
            return;
        };
        if !score.is_finite() {
            return;
        }
        let clamped = score.clamp(0.0, 1.0);
        let slot = self.0.entry(key).or_insert(0.0);
        if clamped > *slot {
            *slot = clamped;
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        normalize(name).and_then(|key| self.0.get(&key).copied())
    }

    /// Score under the normalized name, 0.0 when absent.
    pub fn score(&self, name: &str) -> f64 {
        self.get(name).unwrap_or(0.0)
    }

    /// Max-union with a newer map: every key from both sides survives and
    /// keeps the higher of its two scores. Never regresses a score.
    pub fn merge(&self, newer: &TopicScores) -> TopicScores {
        let mut out = self.0.clone();
        for (name, &score) in &newer.0 {
            let slot = out.entry(name.clone()).or_insert(0.0);
            if score > *slot {
                *slot = score;
            }
        }
        TopicScores(out)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(name, &score)| (name.as_str(), score))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<BTreeMap<String, f64>> for TopicScores {
    fn from(raw: BTreeMap<String, f64>) -> Self {
        let mut scores = Self::new();
        for (name, score) in raw {
            scores.insert(&name, score);
        }
        scores
    }
}

impl<S: AsRef<str>> FromIterator<(S, f64)> for TopicScores {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        let mut scores = Self::new();
        for (name, score) in iter {
            scores.insert(name.as_ref(), score);
        }
        scores
    }
}

fn normalize(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// Per-group maxima over a score map, used by the router.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroGroupScores {
    pub root_cause: f64,
    pub entity_graph: f64,
    pub top_root_cause: Option<String>,
    pub top_entity: Option<String>,
}

/// Classifies a score map into the two macro-groups and extracts each
/// group's maximum plus the topic that achieves it. `top_*` is `None`
/// exactly when no topic of that group is present in the map; ties keep the
/// earliest topic in the group's declaration order.
pub fn group_scores(topics: &TopicScores) -> MacroGroupScores {
    let (root_cause, top_root_cause) = group_max(topics, ROOT_CAUSE_TOPICS);
    let (entity_graph, top_entity) = group_max(topics, ENTITY_GRAPH_TOPICS);
    MacroGroupScores {
        root_cause,
        entity_graph,
        top_root_cause,
        top_entity,
    }
}

fn group_max(topics: &TopicScores, group: &[&str]) -> (f64, Option<String>) {
    let mut best: Option<(&str, f64)> = None;
    for &name in group {
        if let Some(score) = topics.get(name) {
            match best {
                Some((_, current)) if score <= current => {}
                _ => best = Some((name, score)),
            }
        }
    }
    match best {
        Some((name, score)) => (score, Some(name.to_string())),
        None => (0.0, None),
    }
}
