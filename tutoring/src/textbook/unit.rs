//! Durable instructional units and their provenance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What kind of unit this is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitType {
    Explanation,
    Summary,
}

impl std::fmt::Display for UnitType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Explanation => write!(f, "explanation"),
            Self::Summary => write!(f, "summary"),
        }
    }
}

/// Lifecycle status within a learner's textbook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// The canonical unit for its concept set and type.
    Primary,
    /// A kept competitor that did not win primacy.
    Alternative,
    /// Superseded. Terminal, never re-promoted.
    Archived,
}

impl std::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::Alternative => write!(f, "alternative"),
            Self::Archived => write!(f, "archived"),
        }
    }
}

/// Why a unit came from fallback synthesis instead of the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    /// Generator output was used as-is.
    #[default]
    None,
    /// Generation was disabled for deterministic replay.
    ReplayMode,
    /// Generator text could not be parsed.
    ParseFailure,
    /// Generator call failed or timed out.
    LlmError,
}

impl std::fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::ReplayMode => write!(f, "replay_mode"),
            Self::ParseFailure => write!(f, "parse_failure"),
            Self::LlmError => write!(f, "llm_error"),
        }
    }
}

/// One retrieved PDF passage citation carried in provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfCitation {
    pub doc_id: String,
    pub chunk_id: String,
    pub page: u32,
    pub score: f64,
}

/// How a unit's content came to be.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Provenance {
    /// Generator model, absent for pure-fallback units.
    pub model: Option<String>,
    /// Generator parameters as invoked.
    pub params: Option<Value>,
    /// Prompt template that produced the content.
    pub template_id: Option<String>,
    /// Deterministic input hash (`fnv1a32:{8-hex}`).
    pub input_hash: Option<String>,
    /// Source ids the retrieval layer supplied.
    pub retrieved_source_ids: Vec<String>,
    /// Passage citations, at most one per chunk id.
    pub retrieved_pdf_citations: Vec<PdfCitation>,
    /// Interaction ids that triggered (re-)generation, deduplicated in order.
    pub triggering_interaction_ids: Vec<String>,
    /// Parse strategy that accepted the generator output.
    pub parse_mode: Option<String>,
    /// Parse attempts across all candidates.
    pub parse_attempts: u32,
    /// Why fallback was used, if it was.
    pub fallback_reason: FallbackReason,
}

/// One entry in a unit's merge history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateHistoryEntry {
    pub updated_at: DateTime<Utc>,
    /// Revision number this merge produced.
    pub revision: u32,
    /// Input hash of the draft that was merged in.
    pub input_hash: Option<String>,
}

/// A durable unit in a learner's personal textbook.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstructionalUnit {
    pub id: String,
    pub concept_ids: Vec<String>,
    pub unit_type: UnitType,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub common_mistakes: Vec<String>,
    pub minimal_example: Option<String>,
    /// Source ids cited by the content itself.
    pub source_ref_ids: Vec<String>,
    /// Interaction ids whose events contributed source material.
    pub source_interaction_ids: Vec<String>,
    /// Interaction ids that caused this unit to be created.
    pub created_from_interaction_ids: Vec<String>,
    pub provenance: Provenance,
    pub quality_score: f64,
    pub status: UnitStatus,
    pub revision_count: u32,
    pub update_history: Vec<UpdateHistoryEntry>,
    pub archived_reason: Option<String>,
    pub archived_at: Option<DateTime<Utc>>,
    /// Id of the unit that superseded this one.
    pub archived_by_unit_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Content destined for the textbook, before reconciliation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitDraft {
    pub concept_ids: Vec<String>,
    pub unit_type: UnitType,
    pub title: String,
    pub content: String,
    pub summary: Option<String>,
    pub common_mistakes: Vec<String>,
    pub minimal_example: Option<String>,
    pub source_ref_ids: Vec<String>,
    pub source_interaction_ids: Vec<String>,
    pub created_from_interaction_ids: Vec<String>,
    pub provenance: Provenance,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_type_serde_snake_case() {
        assert_eq!(
            serde_json::to_string(&UnitType::Explanation).unwrap(),
            "\"explanation\""
        );
        let t: UnitType = serde_json::from_str("\"summary\"").unwrap();
        assert_eq!(t, UnitType::Summary);
    }

    #[test]
    fn test_fallback_reason_default_and_display() {
        assert_eq!(FallbackReason::default(), FallbackReason::None);
        assert_eq!(FallbackReason::ReplayMode.to_string(), "replay_mode");
        assert_eq!(FallbackReason::LlmError.to_string(), "llm_error");
    }

    #[test]
    fn test_status_display_matches_wire_names() {
        for (status, name) in [
            (UnitStatus::Primary, "primary"),
            (UnitStatus::Alternative, "alternative"),
            (UnitStatus::Archived, "archived"),
        ] {
            assert_eq!(status.to_string(), name);
            assert_eq!(
                serde_json::to_string(&status).unwrap(),
                format!("\"{name}\"")
            );
        }
    }
}
