//! Retrieval bundle — read-only input to the synthesis pipeline.
//!
//! The bundle is assembled upstream (vector search, engagement logs) and
//! handed in whole. The pipeline never fetches; it only consumes. The one
//! subtlety is hashing: triggering interaction ids vary per call even when
//! the teaching content would be identical, so they are excluded from the
//! stable projection used for the cache key.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One retrieved PDF passage with its relevance score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdfPassage {
    pub doc_id: String,
    pub chunk_id: String,
    pub page: u32,
    pub text: String,
    pub score: f64,
}

/// The engagement-log record the content should be grounded on.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingAnchor {
    /// Id of the anchoring interaction, `int_` prefixed.
    pub anchor_id: Option<String>,
    pub problem_title: Option<String>,
    pub error_subtype: Option<String>,
    /// Short description of what the anchor shows.
    pub summary: Option<String>,
    /// Code or worked-example snippet from the anchor.
    pub snippet: Option<String>,
}

/// Everything retrieval supplies for one synthesis call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalBundle {
    /// All source ids the pipeline is allowed to cite.
    pub retrieved_source_ids: Vec<String>,
    pub pdf_passages: Vec<PdfPassage>,
    pub grounding_anchor: Option<GroundingAnchor>,
    /// Concept ids the retrieval layer believes are involved.
    pub concept_candidates: Vec<String>,
    /// Hints the learner has already seen, in order.
    pub hint_history: Vec<String>,
    /// Interaction ids that triggered this call. Ephemeral; excluded from
    /// the stable projection.
    pub triggering_interaction_ids: Vec<String>,
}

impl RetrievalBundle {
    /// The hashable view of this bundle.
    ///
    /// Two calls that would produce the same content must project to the
    /// same value, so per-call ids stay out.
    pub fn stable_projection(&self) -> Value {
        json!({
            "retrieved_source_ids": self.retrieved_source_ids,
            "pdf_passages": self.pdf_passages,
            "grounding_anchor": self.grounding_anchor,
            "concept_candidates": self.concept_candidates,
            "hint_history": self.hint_history,
        })
    }
}
