//! Escalation policy — strategies, thresholds, and tunables.
//!
//! The policy object is stateless and explicitly instantiated; callers pass
//! it by reference into every decision so that replays under a historical
//! policy stay possible. All methods are pure.

use serde::{Deserialize, Serialize};

/// Version of the policy parameter set. Bump on any threshold change.
pub const POLICY_VERSION: &str = "1.2.0";

/// Version of the decision-ladder semantics. Bump when the rule ordering or
/// rule meaning changes, independent of parameter values.
pub const POLICY_SEMANTICS_VERSION: &str = "ladder.v2-or-aggregation";

/// Guidance strategy assigned to a learner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Never escalate or aggregate — hints only.
    HintOnly,
    /// Conservative escalation (5 errors) and aggregation (8 errors).
    AdaptiveLow,
    /// Balanced escalation (3 errors) and aggregation (6 errors).
    AdaptiveMedium,
    /// Aggressive escalation (2 errors) and aggregation (4 errors).
    AdaptiveHigh,
}

impl Strategy {
    /// The fixed threshold pair for this strategy.
    ///
    /// `None` means infinite — the corresponding rung of the ladder can never
    /// fire. The ladder invariant `escalate <= aggregate` holds for every
    /// strategy.
    pub fn thresholds(&self) -> StrategyThresholds {
        match self {
            Self::HintOnly => StrategyThresholds {
                escalate: None,
                aggregate: None,
            },
            Self::AdaptiveLow => StrategyThresholds {
                escalate: Some(5),
                aggregate: Some(8),
            },
            Self::AdaptiveMedium => StrategyThresholds {
                escalate: Some(3),
                aggregate: Some(6),
            },
            Self::AdaptiveHigh => StrategyThresholds {
                escalate: Some(2),
                aggregate: Some(4),
            },
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HintOnly => write!(f, "hint-only"),
            Self::AdaptiveLow => write!(f, "adaptive-low"),
            Self::AdaptiveMedium => write!(f, "adaptive-medium"),
            Self::AdaptiveHigh => write!(f, "adaptive-high"),
        }
    }
}

/// Error-count thresholds for a strategy. `None` = infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyThresholds {
    /// Errors needed before escalating to a full explanation.
    pub escalate: Option<u32>,
    /// Errors needed before aggregating into the textbook.
    pub aggregate: Option<u32>,
}

/// How hint-count auto-escalation interacts with the error threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AutoEscalationMode {
    /// Escalate as soon as the hint threshold is crossed.
    AlwaysAfterHintThreshold,
    /// Escalate only when the error threshold is also met.
    ThresholdGated,
}

impl std::fmt::Display for AutoEscalationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlwaysAfterHintThreshold => write!(f, "always-after-hint-threshold"),
            Self::ThresholdGated => write!(f, "threshold-gated"),
        }
    }
}

/// Tunable parameters for the decision ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationPolicy {
    /// Nth hint_view that becomes the auto-escalation threshold hint.
    pub hint_threshold: u32,
    /// Minimum retry count before the error threshold can fire.
    pub retry_floor: u32,
    /// Session duration above which aggregation fires regardless of errors.
    pub time_spent_aggregation_ms: i64,
    /// Hint levels are capped at this value.
    pub max_hint_level: u32,
    /// How many recent error subtypes the decision context carries.
    pub recent_error_window: usize,
    /// Auto-escalation gating mode.
    pub auto_escalation_mode: AutoEscalationMode,
    /// Parameter-set version stamped onto replay points.
    pub policy_version: String,
    /// Semantics version stamped onto replay points.
    pub policy_semantics_version: String,
}

impl Default for EscalationPolicy {
    fn default() -> Self {
        Self {
            hint_threshold: 3,
            retry_floor: 2,
            time_spent_aggregation_ms: 600_000,
            max_hint_level: 3,
            recent_error_window: 5,
            auto_escalation_mode: AutoEscalationMode::ThresholdGated,
            policy_version: POLICY_VERSION.to_string(),
            policy_semantics_version: POLICY_SEMANTICS_VERSION.to_string(),
        }
    }
}
