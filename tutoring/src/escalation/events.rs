//! Interaction events and learner profiles — the decision engine's inputs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::policy::Strategy;

/// Kind of learner interaction.
///
/// Unknown kinds coming from persisted history deserialize to [`Other`]
/// rather than failing — the engine degrades to safe defaults instead of
/// raising on malformed records.
///
/// [`Other`]: EventKind::Other
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A failed attempt (wrong answer, failed execution check).
    Error,
    /// A successful or neutral execution of the learner's work.
    Execution,
    /// The learner viewed a hint.
    HintView,
    /// The learner viewed a full explanation.
    ExplanationView,
    /// Any event kind the engine does not reason about.
    #[serde(other)]
    Other,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Execution => write!(f, "execution"),
            Self::HintView => write!(f, "hint_view"),
            Self::ExplanationView => write!(f, "explanation_view"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// A single recorded learner interaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionEvent {
    /// Unique event id.
    pub id: String,
    /// Learner this event belongs to.
    pub learner_id: String,
    /// Problem the event occurred on, if any.
    pub problem_id: Option<String>,
    /// When the event happened.
    pub timestamp: DateTime<Utc>,
    /// What kind of interaction this was.
    pub kind: EventKind,
    /// Error subtype id, present on error events that were classified.
    pub error_subtype_id: Option<String>,
    /// Hint level shown, present on hint_view events.
    pub hint_level: Option<u32>,
}

impl InteractionEvent {
    /// Create an event with no subtype or hint level.
    pub fn new(
        id: impl Into<String>,
        learner_id: impl Into<String>,
        problem_id: Option<&str>,
        timestamp: DateTime<Utc>,
        kind: EventKind,
    ) -> Self {
        Self {
            id: id.into(),
            learner_id: learner_id.into(),
            problem_id: problem_id.map(str::to_string),
            timestamp,
            kind,
            error_subtype_id: None,
            hint_level: None,
        }
    }

    /// Attach an error subtype id.
    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.error_subtype_id = Some(subtype.into());
        self
    }

    /// Attach a hint level.
    pub fn with_hint_level(mut self, level: u32) -> Self {
        self.hint_level = Some(level);
        self
    }
}

/// Learner profile carrying the active guidance strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LearnerProfile {
    /// Learner id.
    pub id: String,
    /// Currently assigned strategy.
    pub current_strategy: Strategy,
}

impl LearnerProfile {
    /// Create a profile with the given strategy.
    pub fn new(id: impl Into<String>, current_strategy: Strategy) -> Self {
        Self {
            id: id.into(),
            current_strategy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_kind_display() {
        assert_eq!(EventKind::Error.to_string(), "error");
        assert_eq!(EventKind::HintView.to_string(), "hint_view");
        assert_eq!(EventKind::ExplanationView.to_string(), "explanation_view");
    }

    #[test]
    fn test_unknown_event_kind_degrades_to_other() {
        let kind: EventKind = serde_json::from_str("\"scroll\"").unwrap();
        assert_eq!(kind, EventKind::Other);
    }

    #[test]
    fn test_event_builders() {
        let e = InteractionEvent::new("e1", "learner-1", Some("p1"), Utc::now(), EventKind::Error)
            .with_subtype("off-by-one")
            .with_hint_level(2);
        assert_eq!(e.error_subtype_id.as_deref(), Some("off-by-one"));
        assert_eq!(e.hint_level, Some(2));
        assert_eq!(e.problem_id.as_deref(), Some("p1"));
    }

    #[test]
    fn test_event_serde_roundtrip() {
        let e = InteractionEvent::new("e1", "l1", Some("p1"), Utc::now(), EventKind::HintView)
            .with_hint_level(1);
        let json = serde_json::to_string(&e).unwrap();
        assert!(json.contains("\"hint_view\""));
        let parsed: InteractionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.kind, EventKind::HintView);
        assert_eq!(parsed.id, "e1");
    }
}
