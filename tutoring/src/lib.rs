//! Adaptive Tutoring Core
//!
//! Deterministic decision and content machinery for an adaptive tutor:
//! - Escalation ladder deciding hint vs explanation vs textbook aggregation
//! - Bit-reproducible replay of historical decision traces
//! - Canonical FNV-1a input hashing for cache idempotence
//! - Robust JSON extraction from unreliable generator output
//! - Generator-free fallback content synthesis
//! - Quality-scored textbook reconciliation
//!
//! Everything here is pure and synchronous. No network, no clock reads, no
//! randomness on decision paths; the wall clock and all tunables arrive as
//! explicit arguments. The async generation pipeline lives in the companion
//! `tutor-synthesis` crate and builds entirely on these primitives.

pub mod escalation;
pub mod extraction;
pub mod fallback;
pub mod hashing;
pub mod textbook;

// Re-export key decision types
pub use escalation::{
    hint_lookup_key, replay_decisions, AdaptiveDecision, AutoEscalationMode, DecisionContext,
    DecisionRule, EscalationPolicy, EventKind, GuidanceAction, InteractionEvent, LearnerProfile,
    ReplayPoint, Strategy, StrategyThresholds, POLICY_SEMANTICS_VERSION, POLICY_VERSION,
};

// Re-export hashing helpers
pub use hashing::{create_input_hash, fnv1a_32, stable_hash, stable_stringify, HASH_PREFIX};

// Re-export extraction types
pub use extraction::{
    extract_unit, ExtractedUnit, ExtractionFailure, ExtractionOutcome, ExtractionTelemetry,
    ParseMode, NOT_FOUND_PLACEHOLDER,
};

// Re-export fallback synthesis types
pub use fallback::{synthesize_fallback, FallbackContext, REMEDIATION_STEPS};

// Re-export textbook types
pub use textbook::{
    compete, dedupe_key, quality_score, upsert, CompetitionAction, FallbackReason,
    InstructionalUnit, PdfCitation, Provenance, UnitDraft, UnitStatus, UnitType, UpsertOutcome,
    MAX_REVISIONS,
};
