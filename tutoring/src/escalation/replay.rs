//! Deterministic replay — re-evaluate a historical trace under a policy.
//!
//! Replay filters a learner's history down to the event kinds the ladder
//! reasons about, then re-runs the full decision function over every growing
//! prefix. Each point is stamped with the policy and semantics versions so
//! audits can tell which ruleset produced which decision. Output is
//! bit-reproducible for the same trace and policy parameters.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::engine::AdaptiveDecision;
use super::events::{EventKind, InteractionEvent};
use super::policy::{EscalationPolicy, Strategy};

/// One replayed decision point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayPoint {
    /// Zero-based prefix index.
    pub index: usize,
    /// Id of the last event in the prefix.
    pub event_id: String,
    /// Timestamp of the last event in the prefix (used as `now`).
    pub timestamp: DateTime<Utc>,
    /// The decision the ladder produced for this prefix.
    pub decision: AdaptiveDecision,
    /// Policy parameter-set version in force for the replay.
    pub policy_version: String,
    /// Ladder semantics version in force for the replay.
    pub policy_semantics_version: String,
}

/// Re-run the decision ladder over every growing prefix of a problem trace.
///
/// Only `execution`, `error`, `hint_view`, and `explanation_view` events
/// carrying the problem id participate. Events are sorted ascending by
/// timestamp with event id as a stable tie-break, and each prefix is decided
/// with `now` pinned to the prefix's last event timestamp — no wall-clock
/// reads anywhere.
pub fn replay_decisions(
    learner_id: &str,
    strategy: Strategy,
    history: &[InteractionEvent],
    problem_id: &str,
    policy: &EscalationPolicy,
) -> Vec<ReplayPoint> {
    let mut trace: Vec<&InteractionEvent> = history
        .iter()
        .filter(|e| e.problem_id.as_deref() == Some(problem_id))
        .filter(|e| {
            matches!(
                e.kind,
                EventKind::Execution
                    | EventKind::Error
                    | EventKind::HintView
                    | EventKind::ExplanationView
            )
        })
        .collect();
    trace.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));

    let mut points = Vec::with_capacity(trace.len());
    let mut prefix: Vec<InteractionEvent> = Vec::with_capacity(trace.len());

    for (index, event) in trace.iter().enumerate() {
        prefix.push((*event).clone());
        let decision = policy.decide(learner_id, strategy, &prefix, problem_id, event.timestamp);
        points.push(ReplayPoint {
            index,
            event_id: event.id.clone(),
            timestamp: event.timestamp,
            decision,
            policy_version: policy.policy_version.clone(),
            policy_semantics_version: policy.policy_semantics_version.clone(),
        });
    }

    tracing::debug!(
        learner = learner_id,
        problem = problem_id,
        points = points.len(),
        policy = %policy.policy_version,
        "trace replayed"
    );
    points
}
