//! Integration tests for the decision ladder and replay
//!
//! Walks a full learner journey through the ladder (hints, escalation,
//! aggregation) and validates that offline replay reproduces exactly what
//! the live decisions were.

use chrono::{DateTime, Duration, TimeZone, Utc};
use tutoring::{
    replay_decisions, EscalationPolicy, EventKind, GuidanceAction, InteractionEvent, Strategy,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 4, 10, 14, 0, 0).unwrap()
}

fn event(id: &str, kind: EventKind, offset_s: i64) -> InteractionEvent {
    InteractionEvent::new(
        id,
        "learner-7",
        Some("prob-42"),
        base_time() + Duration::seconds(offset_s),
        kind,
    )
}

/// A journey that starts clean, accumulates errors, and ends aggregated.
fn struggling_journey() -> Vec<InteractionEvent> {
    vec![
        event("e01", EventKind::Execution, 0),
        event("e02", EventKind::Error, 30).with_subtype("off-by-one"),
        event("e03", EventKind::HintView, 60).with_hint_level(1),
        event("e04", EventKind::Error, 120).with_subtype("off-by-one"),
        event("e05", EventKind::Error, 180).with_subtype("bad-bound"),
        event("e06", EventKind::ExplanationView, 240),
        event("e07", EventKind::Error, 300).with_subtype("off-by-one"),
        event("e08", EventKind::Error, 360).with_subtype("bad-bound"),
        event("e09", EventKind::Error, 420).with_subtype("off-by-one"),
    ]
}

/// Test: the journey climbs the full ladder.
#[test]
fn test_journey_climbs_the_ladder() {
    init_tracing();
    let policy = EscalationPolicy::default();
    let history = struggling_journey();

    // Before any errors: stay on hints.
    let early = policy.decide(
        "learner-7",
        Strategy::AdaptiveMedium,
        &history[..1],
        "prob-42",
        base_time() + Duration::seconds(10),
    );
    assert_eq!(early.decision, GuidanceAction::ShowHint);

    // Three errors with two retries: escalate.
    let mid = policy.decide(
        "learner-7",
        Strategy::AdaptiveMedium,
        &history[..5],
        "prob-42",
        base_time() + Duration::seconds(200),
    );
    assert_eq!(mid.decision, GuidanceAction::ShowExplanation);

    // One error, but eleven minutes on the problem: aggregate.
    let late = policy.decide(
        "learner-7",
        Strategy::AdaptiveMedium,
        &history[..2],
        "prob-42",
        base_time() + Duration::seconds(660),
    );
    assert_eq!(late.decision, GuidanceAction::AddToTextbook);
}

/// Test: replay over the full trace matches live prefix decisions.
#[test]
fn test_replay_matches_live_decisions() {
    init_tracing();
    let policy = EscalationPolicy::default();
    let history = struggling_journey();

    let points = replay_decisions(
        "learner-7",
        Strategy::AdaptiveMedium,
        &history,
        "prob-42",
        &policy,
    );
    assert_eq!(points.len(), history.len());

    for (i, point) in points.iter().enumerate() {
        let live = policy.decide(
            "learner-7",
            Strategy::AdaptiveMedium,
            &history[..=i],
            "prob-42",
            history[i].timestamp,
        );
        assert_eq!(
            serde_json::to_string(&point.decision).unwrap(),
            serde_json::to_string(&live).unwrap(),
            "replay diverged at prefix {i}"
        );
    }
}

/// Test: hint-only learners never leave the hint rung.
#[test]
fn test_hint_only_strategy_never_escalates() {
    let policy = EscalationPolicy::default();
    let points = replay_decisions(
        "learner-7",
        Strategy::HintOnly,
        &struggling_journey(),
        "prob-42",
        &policy,
    );
    assert!(points
        .iter()
        .all(|p| p.decision.decision == GuidanceAction::ShowHint));
}

/// Test: long dwell time aggregates even without the error threshold.
#[test]
fn test_time_spent_aggregation() {
    let policy = EscalationPolicy::default();
    let history = vec![
        event("e01", EventKind::Execution, 0),
        event("e02", EventKind::Error, 30).with_subtype("off-by-one"),
        event("e03", EventKind::Error, 500).with_subtype("off-by-one"),
    ];
    // Eleven minutes on one problem.
    let decision = policy.decide(
        "learner-7",
        Strategy::AdaptiveLow,
        &history,
        "prob-42",
        base_time() + Duration::seconds(660),
    );
    assert_eq!(decision.decision, GuidanceAction::AddToTextbook);
}

/// Test: two replays of a shuffled trace agree byte-for-byte.
#[test]
fn test_replay_deterministic_under_input_order() {
    let policy = EscalationPolicy::default();
    let ordered = struggling_journey();
    let mut shuffled = ordered.clone();
    shuffled.swap(0, 8);
    shuffled.swap(2, 5);

    let a = replay_decisions(
        "learner-7",
        Strategy::AdaptiveHigh,
        &ordered,
        "prob-42",
        &policy,
    );
    let b = replay_decisions(
        "learner-7",
        Strategy::AdaptiveHigh,
        &shuffled,
        "prob-42",
        &policy,
    );
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}
