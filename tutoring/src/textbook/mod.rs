//! Personal textbook — durable units reconciled by quality.
//!
//! Aggregated explanations become long-lived units in a learner's textbook.
//! New content never clobbers old content blindly: drafts merge into an
//! existing unit up to a revision ceiling, and structurally distinct units
//! compete for primacy on a completeness-weighted quality score. Archival is
//! terminal and the collection is append-only.

pub mod reconcile;
pub mod unit;

pub use reconcile::{
    compete, dedupe_key, quality_score, upsert, CompetitionAction, UpsertOutcome, MAX_REVISIONS,
};
pub use unit::{
    FallbackReason, InstructionalUnit, PdfCitation, Provenance, UnitDraft, UnitStatus, UnitType,
    UpdateHistoryEntry,
};
