//! Escalation Ladder — deterministic guidance decisions for a learner.
//!
//! Routes a struggling learner through staged guidance levels based on their
//! interaction history. This is a pure decision ladder with no LLM calls —
//! the wall clock and the policy are explicit inputs, so every decision can
//! be replayed bit-for-bit.
//!
//! ```text
//! show_hint
//!     │
//!     ├─ no errors yet → stay on hints (progressive levels 1..4)
//!     ├─ Nth hint viewed, no explanation since → show_explanation
//!     ├─ error threshold met (strategy ladder) → show_explanation
//!     │
//!     ▼
//! show_explanation
//!     │
//!     ├─ error count at aggregation threshold → add_to_textbook
//!     ├─ >10 minutes on one problem → add_to_textbook
//!     │
//!     ▼
//! add_to_textbook — durable unit, reconciled by quality
//! ```

pub mod engine;
pub mod events;
pub mod policy;
pub mod replay;

pub use engine::{
    hint_lookup_key, AdaptiveDecision, DecisionContext, DecisionRule, GuidanceAction,
};
pub use events::{EventKind, InteractionEvent, LearnerProfile};
pub use policy::{
    AutoEscalationMode, EscalationPolicy, Strategy, StrategyThresholds, POLICY_SEMANTICS_VERSION,
    POLICY_VERSION,
};
pub use replay::{replay_decisions, ReplayPoint};
