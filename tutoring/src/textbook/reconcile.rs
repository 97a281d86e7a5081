//! Textbook reconciliation — merge, score, and compete.
//!
//! Reconciliation is pure read-modify-write over a learner's unit collection.
//! Callers hold a write lock (or CAS loop) around it; nothing here locks.
//! Units are only ever appended or archived, never deleted, so the history of
//! a learner's textbook is fully reconstructible.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::unit::{InstructionalUnit, UnitDraft, UnitStatus, UnitType, UpdateHistoryEntry};

/// Merge ceiling. A unit that has absorbed this many revisions stops
/// accepting merges and forces a fresh unit instead.
pub const MAX_REVISIONS: u32 = 10;

/// Quality margin above which a new unit replaces the primary outright.
const REPLACE_MARGIN: f64 = 0.2;

/// Quality band within which old and new are considered equivalent.
const KEEP_BOTH_BAND: f64 = 0.1;

/// What `upsert` did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action", content = "unit_id")]
pub enum UpsertOutcome {
    /// The draft was merged into an existing unit.
    Merged(String),
    /// A fresh unit was created.
    Created(String),
}

impl UpsertOutcome {
    /// Id of the unit that now holds the draft's content.
    pub fn unit_id(&self) -> &str {
        match self {
            Self::Merged(id) | Self::Created(id) => id,
        }
    }
}

/// What `compete` did with the new unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompetitionAction {
    /// No primary existed; the new unit was promoted.
    Promote,
    /// The new unit clearly beat the primary, which was archived.
    Replace,
    /// Quality was equivalent; both kept, old stays primary.
    KeepBoth,
    /// The new unit lost; kept as an alternative.
    MarkAlternative,
}

impl std::fmt::Display for CompetitionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Promote => write!(f, "promote"),
            Self::Replace => write!(f, "replace"),
            Self::KeepBoth => write!(f, "keep_both"),
            Self::MarkAlternative => write!(f, "mark_alternative"),
        }
    }
}

/// Canonical identity of a unit within a textbook.
///
/// Lowercased concept ids, sorted, joined by `,`, then `::` and the type.
pub fn dedupe_key(concept_ids: &[String], unit_type: UnitType) -> String {
    let mut ids: Vec<String> = concept_ids.iter().map(|c| c.to_lowercase()).collect();
    ids.sort();
    format!("{}::{}", ids.join(","), unit_type)
}

/// Completeness-weighted quality in [0, 1], rounded to 3 decimals.
///
/// Source coverage saturates at 5 unique ids and carries 40% of the weight;
/// summary, minimal example, and common mistakes carry 20% each.
pub fn quality_score(unit: &InstructionalUnit) -> f64 {
    let unique_sources: HashSet<&str> = unit
        .source_ref_ids
        .iter()
        .chain(unit.provenance.retrieved_source_ids.iter())
        .map(String::as_str)
        .collect();
    let source_part = (unique_sources.len() as f64 / 5.0).min(1.0) * 0.4;

    let has = |opt: &Option<String>| opt.as_deref().is_some_and(|s| !s.trim().is_empty());
    let summary_part = if has(&unit.summary) { 0.2 } else { 0.0 };
    let example_part = if has(&unit.minimal_example) { 0.2 } else { 0.0 };
    let mistakes_part = if unit.common_mistakes.iter().any(|m| !m.trim().is_empty()) {
        0.2
    } else {
        0.0
    };

    let raw = source_part + summary_part + example_part + mistakes_part;
    (raw * 1000.0).round() / 1000.0
}

/// Merge a draft into a matching unit, or create a fresh one.
///
/// A match is the first non-archived unit with the same dedupe key whose
/// revision count is still below [`MAX_REVISIONS`]. Merging unions the id
/// lists, overwrites the content fields, bumps the revision, appends a
/// history entry, and rescores. Once the ceiling is hit a new unit is
/// created even on a key match.
pub fn upsert(
    units: &mut Vec<InstructionalUnit>,
    draft: UnitDraft,
    now: DateTime<Utc>,
) -> UpsertOutcome {
    let key = dedupe_key(&draft.concept_ids, draft.unit_type);
    let target = units.iter_mut().find(|u| {
        u.status != UnitStatus::Archived
            && dedupe_key(&u.concept_ids, u.unit_type) == key
            && u.revision_count < MAX_REVISIONS
    });

    match target {
        Some(unit) => {
            union_into(&mut unit.source_interaction_ids, &draft.source_interaction_ids);
            union_into(
                &mut unit.created_from_interaction_ids,
                &draft.created_from_interaction_ids,
            );
            union_into(&mut unit.source_ref_ids, &draft.source_ref_ids);

            unit.title = draft.title;
            unit.content = draft.content;
            unit.summary = draft.summary;
            unit.common_mistakes = draft.common_mistakes;
            unit.minimal_example = draft.minimal_example;
            unit.provenance = draft.provenance;

            unit.revision_count += 1;
            unit.update_history.push(UpdateHistoryEntry {
                updated_at: now,
                revision: unit.revision_count,
                input_hash: unit.provenance.input_hash.clone(),
            });
            unit.updated_at = now;
            unit.quality_score = quality_score(unit);

            tracing::debug!(
                unit = %unit.id,
                revision = unit.revision_count,
                quality = unit.quality_score,
                "unit merged"
            );
            UpsertOutcome::Merged(unit.id.clone())
        }
        None => {
            let mut unit = InstructionalUnit {
                id: Uuid::new_v4().to_string(),
                concept_ids: draft.concept_ids,
                unit_type: draft.unit_type,
                title: draft.title,
                content: draft.content,
                summary: draft.summary,
                common_mistakes: draft.common_mistakes,
                minimal_example: draft.minimal_example,
                source_ref_ids: draft.source_ref_ids,
                source_interaction_ids: draft.source_interaction_ids,
                created_from_interaction_ids: draft.created_from_interaction_ids,
                provenance: draft.provenance,
                quality_score: 0.0,
                status: UnitStatus::Alternative,
                revision_count: 0,
                update_history: Vec::new(),
                archived_reason: None,
                archived_at: None,
                archived_by_unit_id: None,
                created_at: now,
                updated_at: now,
            };
            unit.quality_score = quality_score(&unit);
            let id = unit.id.clone();
            tracing::debug!(unit = %id, quality = unit.quality_score, "unit created");
            units.push(unit);
            UpsertOutcome::Created(id)
        }
    }
}

/// Let a unit compete for primacy within its dedupe key.
///
/// At most one primary exists per key. Primacy identity is the full dedupe
/// key (sorted lowercased concept set + type), the same identity `upsert`
/// merges on: units sharing one concept id but differing in concept set
/// compete in separate keys and may each hold primacy. The loser is never
/// deleted; a beaten
/// primary is archived with reason `superseded` and a pointer to its
/// successor. Archived units never re-enter competition.
pub fn compete(
    units: &mut [InstructionalUnit],
    new_unit_id: &str,
    now: DateTime<Utc>,
) -> Option<CompetitionAction> {
    let new_idx = units.iter().position(|u| u.id == new_unit_id)?;
    let key = dedupe_key(&units[new_idx].concept_ids, units[new_idx].unit_type);

    let primary_idx = units.iter().position(|u| {
        u.id != new_unit_id
            && u.status == UnitStatus::Primary
            && dedupe_key(&u.concept_ids, u.unit_type) == key
    });

    let action = match primary_idx {
        None => {
            units[new_idx].status = UnitStatus::Primary;
            CompetitionAction::Promote
        }
        Some(old_idx) => {
            let diff = units[new_idx].quality_score - units[old_idx].quality_score;
            if diff > REPLACE_MARGIN {
                let new_id = units[new_idx].id.clone();
                let old = &mut units[old_idx];
                old.status = UnitStatus::Archived;
                old.archived_reason = Some("superseded".to_string());
                old.archived_at = Some(now);
                old.archived_by_unit_id = Some(new_id);
                old.updated_at = now;
                units[new_idx].status = UnitStatus::Primary;
                CompetitionAction::Replace
            } else if diff.abs() <= KEEP_BOTH_BAND {
                units[new_idx].status = UnitStatus::Alternative;
                CompetitionAction::KeepBoth
            } else {
                units[new_idx].status = UnitStatus::Alternative;
                CompetitionAction::MarkAlternative
            }
        }
    };
    units[new_idx].updated_at = now;

    tracing::info!(
        unit = %units[new_idx].id,
        %action,
        quality = units[new_idx].quality_score,
        "competition resolved"
    );
    Some(action)
}

/// Append items not already present, preserving first-seen order.
fn union_into(target: &mut Vec<String>, additions: &[String]) {
    for item in additions {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::textbook::unit::Provenance;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn draft(concepts: &[&str]) -> UnitDraft {
        UnitDraft {
            concept_ids: concepts.iter().map(|s| s.to_string()).collect(),
            unit_type: UnitType::Explanation,
            title: "T".to_string(),
            content: "C".to_string(),
            summary: None,
            common_mistakes: Vec::new(),
            minimal_example: None,
            source_ref_ids: vec!["s1".to_string()],
            source_interaction_ids: vec!["i1".to_string()],
            created_from_interaction_ids: vec!["i1".to_string()],
            provenance: Provenance::default(),
        }
    }

    fn rich_draft(concepts: &[&str]) -> UnitDraft {
        UnitDraft {
            summary: Some("summary".to_string()),
            common_mistakes: vec!["mistake".to_string()],
            minimal_example: Some("example".to_string()),
            source_ref_ids: (1..=5).map(|i| format!("s{i}")).collect(),
            ..draft(concepts)
        }
    }

    #[test]
    fn test_dedupe_key_normalizes() {
        let key = dedupe_key(
            &["Loops".to_string(), "arrays".to_string()],
            UnitType::Explanation,
        );
        assert_eq!(key, "arrays,loops::explanation");
        let reordered = dedupe_key(
            &["arrays".to_string(), "LOOPS".to_string()],
            UnitType::Explanation,
        );
        assert_eq!(key, reordered);
    }

    #[test]
    fn test_dedupe_key_distinguishes_type() {
        let a = dedupe_key(&["c".to_string()], UnitType::Explanation);
        let b = dedupe_key(&["c".to_string()], UnitType::Summary);
        assert_ne!(a, b);
    }

    #[test]
    fn test_quality_score_full() {
        let mut units = Vec::new();
        let outcome = upsert(&mut units, rich_draft(&["c"]), now());
        let unit = units
            .iter()
            .find(|u| u.id == outcome.unit_id())
            .unwrap();
        assert_eq!(unit.quality_score, 1.0);
    }

    #[test]
    fn test_quality_score_empty() {
        let mut units = Vec::new();
        let mut d = draft(&["c"]);
        d.source_ref_ids = Vec::new();
        d.source_interaction_ids = Vec::new();
        upsert(&mut units, d, now());
        assert_eq!(units[0].quality_score, 0.0);
    }

    #[test]
    fn test_quality_counts_unique_sources_across_provenance() {
        let mut units = Vec::new();
        let mut d = draft(&["c"]);
        d.source_ref_ids = vec!["a".to_string(), "b".to_string()];
        d.provenance.retrieved_source_ids = vec!["b".to_string(), "c".to_string()];
        upsert(&mut units, d, now());
        // 3 unique of 5 → 0.24.
        assert_eq!(units[0].quality_score, 0.24);
    }

    #[test]
    fn test_upsert_creates_then_merges() {
        let mut units = Vec::new();
        let first = upsert(&mut units, draft(&["c"]), now());
        assert!(matches!(first, UpsertOutcome::Created(_)));

        let mut second_draft = draft(&["c"]);
        second_draft.title = "T2".to_string();
        second_draft.source_interaction_ids = vec!["i2".to_string()];
        let second = upsert(&mut units, second_draft, now());
        assert!(matches!(second, UpsertOutcome::Merged(_)));

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].title, "T2");
        assert_eq!(units[0].revision_count, 1);
        assert_eq!(units[0].source_interaction_ids, vec!["i1", "i2"]);
        assert_eq!(units[0].update_history.len(), 1);
    }

    #[test]
    fn test_upsert_ignores_archived_match() {
        let mut units = Vec::new();
        upsert(&mut units, draft(&["c"]), now());
        units[0].status = UnitStatus::Archived;
        let outcome = upsert(&mut units, draft(&["c"]), now());
        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(units.len(), 2);
    }

    #[test]
    fn test_revision_ceiling_forces_fresh_unit() {
        let mut units = Vec::new();
        upsert(&mut units, draft(&["c"]), now());
        // Ten merges reach the ceiling; the eleventh upsert creates anew.
        for _ in 0..10 {
            let outcome = upsert(&mut units, draft(&["c"]), now());
            assert!(matches!(outcome, UpsertOutcome::Merged(_)));
        }
        assert_eq!(units[0].revision_count, MAX_REVISIONS);

        let outcome = upsert(&mut units, draft(&["c"]), now());
        assert!(matches!(outcome, UpsertOutcome::Created(_)));
        assert_eq!(units.len(), 2);
        assert_eq!(units[1].revision_count, 0);
    }

    #[test]
    fn test_compete_promotes_when_no_primary() {
        let mut units = Vec::new();
        let outcome = upsert(&mut units, draft(&["c"]), now());
        let action = compete(&mut units, outcome.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::Promote));
        assert_eq!(units[0].status, UnitStatus::Primary);
    }

    #[test]
    fn test_compete_replace_archives_old_primary() {
        let mut units = Vec::new();
        let old = upsert(&mut units, draft(&["c"]), now());
        compete(&mut units, old.unit_id(), now());
        let old_score = units[0].quality_score;

        let new = upsert(&mut units, rich_draft(&["c2"]), now());
        // Force the same key by aligning concepts after creation.
        let new_idx = units.iter().position(|u| u.id == new.unit_id()).unwrap();
        units[new_idx].concept_ids = vec!["c".to_string()];
        assert!(units[new_idx].quality_score - old_score > 0.2);

        let action = compete(&mut units, new.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::Replace));
        assert_eq!(units[0].status, UnitStatus::Archived);
        assert_eq!(units[0].archived_reason.as_deref(), Some("superseded"));
        assert_eq!(
            units[0].archived_by_unit_id.as_deref(),
            Some(new.unit_id())
        );
        assert_eq!(units[new_idx].status, UnitStatus::Primary);
    }

    #[test]
    fn test_compete_keep_both_within_band() {
        let mut units = Vec::new();
        let old = upsert(&mut units, draft(&["c"]), now());
        compete(&mut units, old.unit_id(), now());

        let new = upsert(&mut units, draft(&["d"]), now());
        let new_idx = units.iter().position(|u| u.id == new.unit_id()).unwrap();
        units[new_idx].concept_ids = vec!["c".to_string()];
        units[new_idx].quality_score = units[0].quality_score + 0.05;

        let action = compete(&mut units, new.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::KeepBoth));
        assert_eq!(units[0].status, UnitStatus::Primary);
        assert_eq!(units[new_idx].status, UnitStatus::Alternative);
    }

    #[test]
    fn test_compete_mark_alternative_when_clearly_worse() {
        let mut units = Vec::new();
        let old = upsert(&mut units, rich_draft(&["c"]), now());
        compete(&mut units, old.unit_id(), now());

        let new = upsert(&mut units, draft(&["d"]), now());
        let new_idx = units.iter().position(|u| u.id == new.unit_id()).unwrap();
        units[new_idx].concept_ids = vec!["c".to_string()];
        units[new_idx].quality_score = units[0].quality_score - 0.3;

        let action = compete(&mut units, new.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::MarkAlternative));
        assert_eq!(units[0].status, UnitStatus::Primary);
        assert_eq!(units[new_idx].status, UnitStatus::Alternative);
    }

    #[test]
    fn test_compete_diff_between_band_and_margin_marks_alternative() {
        let mut units = Vec::new();
        let old = upsert(&mut units, draft(&["c"]), now());
        compete(&mut units, old.unit_id(), now());

        let new = upsert(&mut units, draft(&["d"]), now());
        let new_idx = units.iter().position(|u| u.id == new.unit_id()).unwrap();
        units[new_idx].concept_ids = vec!["c".to_string()];
        units[new_idx].quality_score = units[0].quality_score + 0.15;

        // Better, but not by enough to replace.
        let action = compete(&mut units, new.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::MarkAlternative));
        assert_eq!(units[0].status, UnitStatus::Primary);
    }

    #[test]
    fn test_archived_never_competes_again() {
        let mut units = Vec::new();
        let old = upsert(&mut units, draft(&["c"]), now());
        compete(&mut units, old.unit_id(), now());
        units[0].status = UnitStatus::Archived;

        let new = upsert(&mut units, draft(&["c"]), now());
        let action = compete(&mut units, new.unit_id(), now());
        // The archived unit is invisible; the new one takes primacy.
        assert_eq!(action, Some(CompetitionAction::Promote));
        assert_eq!(units[0].status, UnitStatus::Archived);
    }

    #[test]
    fn test_at_most_one_primary_per_key() {
        let mut units = Vec::new();
        for _ in 0..4 {
            let outcome = upsert(&mut units, rich_draft(&["c"]), now());
            compete(&mut units, outcome.unit_id(), now());
        }
        let primaries = units
            .iter()
            .filter(|u| u.status == UnitStatus::Primary)
            .count();
        assert_eq!(primaries, 1);
    }

    #[test]
    fn test_primacy_scoped_to_full_concept_set() {
        let mut units = Vec::new();
        let narrow = upsert(&mut units, draft(&["c"]), now());
        compete(&mut units, narrow.unit_id(), now());

        // Shares concept "c" but carries a different concept set, so it
        // competes under its own key and wins its own primacy.
        let wide = upsert(&mut units, draft(&["c", "d"]), now());
        let action = compete(&mut units, wide.unit_id(), now());
        assert_eq!(action, Some(CompetitionAction::Promote));
        let primaries = units
            .iter()
            .filter(|u| u.status == UnitStatus::Primary)
            .count();
        assert_eq!(primaries, 2);
    }

    #[test]
    fn test_compete_unknown_id_is_none() {
        let mut units = Vec::new();
        assert_eq!(compete(&mut units, "missing", now()), None);
    }
}
