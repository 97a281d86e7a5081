//! Decision ladder — pure function from interaction history to guidance.
//!
//! All decisions are deterministic: the wall clock is threaded in as an
//! explicit `now`, the policy is passed by reference, and no rule consults
//! anything outside the provided history. The engine never returns an error —
//! blank identifiers and malformed events degrade to documented safe
//! defaults.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::events::{EventKind, InteractionEvent, LearnerProfile};
use super::policy::{AutoEscalationMode, EscalationPolicy, Strategy};

/// Guidance the tutor should present next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuidanceAction {
    /// Show the next progressive hint.
    ShowHint,
    /// Escalate to a full generated explanation.
    ShowExplanation,
    /// Aggregate the learning into a durable textbook unit.
    AddToTextbook,
}

impl std::fmt::Display for GuidanceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ShowHint => write!(f, "show_hint"),
            Self::ShowExplanation => write!(f, "show_explanation"),
            Self::AddToTextbook => write!(f, "add_to_textbook"),
        }
    }
}

/// Which rung of the ladder produced the decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionRule {
    /// No errors on this problem yet.
    NoErrorsShowHint,
    /// Hint threshold crossed without a subsequent explanation view.
    AutoEscalationAfterHints,
    /// Error-count escalation threshold met.
    EscalationThresholdMet,
    /// Error-count or time-spent aggregation threshold met.
    AggregationThresholdMet,
    /// Default rung: next hint in the progression.
    ProgressiveHint,
}

impl std::fmt::Display for DecisionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoErrorsShowHint => write!(f, "no-errors-show-hint"),
            Self::AutoEscalationAfterHints => write!(f, "auto-escalation-after-hints"),
            Self::EscalationThresholdMet => write!(f, "escalation-threshold-met"),
            Self::AggregationThresholdMet => write!(f, "aggregation-threshold-met"),
            Self::ProgressiveHint => write!(f, "progressive-hint"),
        }
    }
}

/// Snapshot of the history features the ladder evaluated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecisionContext {
    /// Errors recorded on this problem.
    pub error_count: u32,
    /// Retries — max(0, error_count - 1).
    pub retry_count: u32,
    /// Milliseconds between the first problem event and `now`.
    pub time_spent_ms: i64,
    /// Hint level that would be displayed next (capped progression).
    pub current_hint_level: u32,
    /// Last N error subtype ids, most recent last.
    pub recent_errors: Vec<String>,
}

/// Output of one ladder evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdaptiveDecision {
    /// The `now` the decision was made at.
    pub timestamp: DateTime<Utc>,
    /// Learner the decision applies to.
    pub learner_id: String,
    /// History features the ladder saw.
    pub context: DecisionContext,
    /// Guidance to present.
    pub decision: GuidanceAction,
    /// Rung that fired.
    pub rule_fired: DecisionRule,
    /// Interaction id that triggered an auto-escalation, when one did.
    pub trigger_event_id: Option<String>,
    /// Human-readable explanation of the decision.
    pub reasoning: String,
}

/// Auto-escalation features computed from the hint trail.
struct AutoEscalationState {
    should_escalate: bool,
    trigger_event_id: Option<String>,
}

impl EscalationPolicy {
    /// Evaluate the decision ladder for one problem.
    ///
    /// Evaluation order:
    /// 1. zero errors → `show_hint` (no-errors-show-hint)
    /// 2. auto-escalation after the Nth un-answered hint
    /// 3. error escalation threshold
    /// 4. aggregation threshold (error count OR time spent)
    /// 5. progressive hint
    pub fn decide(
        &self,
        learner_id: &str,
        strategy: Strategy,
        history: &[InteractionEvent],
        problem_id: &str,
        now: DateTime<Utc>,
    ) -> AdaptiveDecision {
        let learner_id = safe_identifier(learner_id);
        let events = problem_events(history, problem_id);

        let error_count = events.iter().filter(|e| e.kind == EventKind::Error).count() as u32;
        let retry_count = error_count.saturating_sub(1);
        let hint_views = events
            .iter()
            .filter(|e| e.kind == EventKind::HintView)
            .count() as u32;
        let time_spent_ms = events
            .first()
            .map(|e| (now - e.timestamp).num_milliseconds().max(0))
            .unwrap_or(0);

        let recent_errors: Vec<String> = {
            let subtypes: Vec<String> = events
                .iter()
                .filter(|e| e.kind == EventKind::Error)
                .filter_map(|e| e.error_subtype_id.clone())
                .collect();
            let start = subtypes.len().saturating_sub(self.recent_error_window);
            subtypes[start..].to_vec()
        };

        let context = DecisionContext {
            error_count,
            retry_count,
            time_spent_ms,
            current_hint_level: hint_views.min(self.max_hint_level) + 1,
            recent_errors,
        };

        let finish = |decision, rule_fired, trigger_event_id, reasoning: String| {
            let decided = AdaptiveDecision {
                timestamp: now,
                learner_id: learner_id.clone(),
                context: context.clone(),
                decision,
                rule_fired,
                trigger_event_id,
                reasoning,
            };
            tracing::debug!(
                learner = %decided.learner_id,
                problem = problem_id,
                decision = %decided.decision,
                rule = %decided.rule_fired,
                errors = decided.context.error_count,
                "decision ladder evaluated"
            );
            decided
        };

        // Rung 1: nothing has gone wrong yet.
        if error_count == 0 {
            return finish(
                GuidanceAction::ShowHint,
                DecisionRule::NoErrorsShowHint,
                None,
                "no errors recorded on this problem — offering a hint".to_string(),
            );
        }

        let thresholds = strategy.thresholds();
        let threshold_met = thresholds
            .escalate
            .map(|t| error_count >= t)
            .unwrap_or(false)
            && retry_count >= self.retry_floor;

        let auto = self.auto_escalation_state(&events, hint_views);

        // Rung 2: the learner has burned through the hint ladder without an
        // explanation — escalate (gated by the error threshold unless the
        // mode says otherwise).
        if thresholds.escalate.is_some()
            && auto.should_escalate
            && (self.auto_escalation_mode == AutoEscalationMode::AlwaysAfterHintThreshold
                || threshold_met)
        {
            return finish(
                GuidanceAction::ShowExplanation,
                DecisionRule::AutoEscalationAfterHints,
                auto.trigger_event_id,
                format!(
                    "{hint_views} hints viewed (threshold {}) with no explanation since — escalating",
                    self.hint_threshold
                ),
            );
        }

        // Rung 3: plain error-count escalation.
        if threshold_met {
            return finish(
                GuidanceAction::ShowExplanation,
                DecisionRule::EscalationThresholdMet,
                None,
                format!(
                    "{error_count} errors with {retry_count} retries meets the {} escalation threshold",
                    strategy
                ),
            );
        }

        // Rung 4: aggregation, by error volume OR session duration.
        let aggregate_by_errors = thresholds
            .aggregate
            .map(|t| error_count >= t)
            .unwrap_or(false);
        let aggregate_by_time = time_spent_ms > self.time_spent_aggregation_ms;
        if aggregate_by_errors || aggregate_by_time {
            let reasoning = if aggregate_by_errors {
                format!("{error_count} errors meets the aggregation threshold")
            } else {
                format!(
                    "{time_spent_ms}ms on this problem exceeds {}ms",
                    self.time_spent_aggregation_ms
                )
            };
            return finish(
                GuidanceAction::AddToTextbook,
                DecisionRule::AggregationThresholdMet,
                None,
                reasoning,
            );
        }

        // Rung 5: keep walking the hint progression.
        let level = hint_views.min(self.max_hint_level) + 1;
        finish(
            GuidanceAction::ShowHint,
            DecisionRule::ProgressiveHint,
            None,
            format!("progressing to hint level {level}"),
        )
    }

    /// Evaluate the decision ladder under a learner profile's assigned
    /// strategy.
    pub fn decide_for(
        &self,
        profile: &LearnerProfile,
        history: &[InteractionEvent],
        problem_id: &str,
        now: DateTime<Utc>,
    ) -> AdaptiveDecision {
        self.decide(
            &profile.id,
            profile.current_strategy,
            history,
            problem_id,
            now,
        )
    }

    /// Compute the auto-escalation features for a problem's event trail.
    ///
    /// The Nth hint_view (N = `hint_threshold`) is the "threshold hint".
    /// Escalation is due when that hint exists and no explanation_view
    /// occurred at or after it. The trigger is the most recent error at or
    /// after the threshold hint, falling back to the threshold hint itself.
    fn auto_escalation_state(
        &self,
        events: &[&InteractionEvent],
        hint_views: u32,
    ) -> AutoEscalationState {
        if hint_views < self.hint_threshold {
            return AutoEscalationState {
                should_escalate: false,
                trigger_event_id: None,
            };
        }

        let threshold_hint = events
            .iter()
            .filter(|e| e.kind == EventKind::HintView)
            .nth(self.hint_threshold.saturating_sub(1) as usize);
        let threshold_hint = match threshold_hint {
            Some(hint) => hint,
            None => {
                return AutoEscalationState {
                    should_escalate: false,
                    trigger_event_id: None,
                }
            }
        };

        let explained_since = events.iter().any(|e| {
            e.kind == EventKind::ExplanationView && e.timestamp >= threshold_hint.timestamp
        });
        if explained_since {
            return AutoEscalationState {
                should_escalate: false,
                trigger_event_id: None,
            };
        }

        let trigger = events
            .iter()
            .filter(|e| e.kind == EventKind::Error && e.timestamp >= threshold_hint.timestamp)
            .next_back()
            .map(|e| e.id.clone())
            .unwrap_or_else(|| threshold_hint.id.clone());

        AutoEscalationState {
            should_escalate: true,
            trigger_event_id: Some(trigger),
        }
    }
}

/// Build the deterministic lookup key that pins hint selection for a
/// (learner, problem, subtype, level) tuple. Repeated calls with the same
/// tuple always resolve the same grounding content.
pub fn hint_lookup_key(
    learner_id: &str,
    problem_id: &str,
    error_subtype: Option<&str>,
    level: u32,
) -> String {
    let subtype = error_subtype
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string());
    format!(
        "{}|{}|{}|L{}",
        safe_identifier(learner_id),
        safe_identifier(problem_id),
        subtype,
        level.max(1)
    )
}

/// Problem-scoped events sorted ascending by timestamp, ties broken by event
/// id so equal-timestamp traces stay deterministic.
fn problem_events<'a>(
    history: &'a [InteractionEvent],
    problem_id: &str,
) -> Vec<&'a InteractionEvent> {
    let mut events: Vec<&InteractionEvent> = history
        .iter()
        .filter(|e| e.problem_id.as_deref() == Some(problem_id))
        .collect();
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
    events
}

/// Blank identifiers degrade to "unknown" instead of producing broken keys.
fn safe_identifier(id: &str) -> String {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}
