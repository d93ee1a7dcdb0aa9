use super::common::*;
use crate::rules::catalog::ScoreFilter;
use crate::rules::domain::{ScoreDraft, ScoreId, ScorePatch, ScoreStatus};
use crate::rules::{ErrorKind, RuleError};

#[test]
fn publishing_overlapping_rule_fails_without_state_change() {
    let fixture = fixture();
    let existing = active_score(&fixture, bonus_draft(Some(date(2023, 1, 1)), None), &[]);
    let candidate = fixture
        .catalog
        .create_score(bonus_draft(Some(date(2024, 1, 1)), None))
        .expect("draft");

    match fixture.catalog.publish(&candidate.id) {
        Err(RuleError::Validation(message)) => assert_eq!(message, "overlapping active rule"),
        other => panic!("expected overlap validation error, got {other:?}"),
    }

    assert_eq!(
        fixture.catalog.score(&candidate.id).expect("candidate").status,
        ScoreStatus::Draft
    );
    assert_eq!(
        fixture.catalog.score(&existing.id).expect("existing").status,
        ScoreStatus::Active
    );
}

#[test]
fn publishing_disjoint_rule_supersedes_active_sibling() {
    let fixture = fixture();
    let first = active_score(
        &fixture,
        bonus_draft(Some(date(2023, 1, 1)), Some(date(2023, 12, 31))),
        &[],
    );
    let second = fixture
        .catalog
        .create_score(bonus_draft(Some(date(2024, 1, 1)), None))
        .expect("draft");

    let outcome = fixture.catalog.publish(&second.id).expect("published");
    assert!(!outcome.already_active);
    assert_eq!(outcome.superseded, vec![first.id.clone()]);
    assert_eq!(outcome.score.status, ScoreStatus::Active);
    assert_eq!(
        fixture.catalog.score(&first.id).expect("first").status,
        ScoreStatus::Superseded
    );
}

#[test]
fn families_are_keyed_by_name_and_normalized_category() {
    let fixture = fixture();
    active_score(&fixture, bonus_draft(None, None), &[]);

    let other_category = fixture
        .catalog
        .create_score(ScoreDraft::new("bonus", "5").with_category("staff"))
        .expect("draft");
    fixture
        .catalog
        .publish(&other_category.id)
        .expect("different category does not conflict");

    active_score(&fixture, ScoreDraft::new("overtime", "1"), &[]);
    let blank_category = fixture
        .catalog
        .create_score(ScoreDraft::new("overtime", "2").with_category(""))
        .expect("draft");
    let err = fixture.catalog.publish(&blank_category.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[test]
fn publish_only_moves_forward() {
    let fixture = fixture();
    let first = active_score(
        &fixture,
        bonus_draft(None, Some(date(2023, 12, 31))),
        &[],
    );
    let again = fixture.catalog.publish(&first.id).expect("idempotent");
    assert!(again.already_active);
    assert!(again.superseded.is_empty());

    active_score(&fixture, bonus_draft(Some(date(2024, 1, 1)), None), &[]);
    let err = fixture.catalog.publish(&first.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(
        fixture.catalog.score(&first.id).expect("first").status,
        ScoreStatus::Superseded
    );
}

#[test]
fn publishing_unknown_score_is_not_found() {
    let fixture = fixture();
    let err = fixture
        .catalog
        .publish(&ScoreId("score-missing".into()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[test]
fn at_most_one_active_rule_per_family_after_publishes() {
    let fixture = fixture();
    let windows = [
        (Some(date(2020, 1, 1)), Some(date(2020, 12, 31))),
        (Some(date(2021, 1, 1)), Some(date(2021, 12, 31))),
        (Some(date(2021, 6, 1)), None),
        (Some(date(2022, 1, 1)), None),
    ];
    for (from, to) in windows {
        let draft = fixture
            .catalog
            .create_score(bonus_draft(from, to))
            .expect("draft");
        let _ = fixture.catalog.publish(&draft.id);
    }

    let active = fixture
        .catalog
        .list_scores(&ScoreFilter {
            category: Some("nurse".into()),
            status: Some(ScoreStatus::Active),
        })
        .expect("active");
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].validity.from, Some(date(2022, 1, 1)));
}

#[test]
fn active_score_cannot_be_renamed_onto_an_overlapping_family() {
    let fixture = fixture();
    let moved = active_score(&fixture, bonus_draft(None, None), &[]);
    let resident = active_score(
        &fixture,
        ScoreDraft::new("bonus2", "7").with_category("nurse"),
        &[],
    );

    let err = fixture
        .catalog
        .update_score(
            &moved.id,
            ScorePatch {
                name: Some("bonus2".into()),
                ..ScorePatch::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.to_string(), "validation failed: overlapping active rule");
    assert_eq!(fixture.catalog.score(&moved.id).expect("moved").name, "bonus");

    let active = fixture
        .catalog
        .list_scores(&ScoreFilter {
            category: Some("nurse".into()),
            status: Some(ScoreStatus::Active),
        })
        .expect("active");
    let ids: Vec<_> = active.iter().map(|score| score.id.clone()).collect();
    assert_eq!(ids, vec![moved.id, resident.id]);
}

#[test]
fn active_validity_edits_are_checked_against_siblings() {
    let fixture = fixture();
    let earlier = active_score(
        &fixture,
        bonus_draft(Some(date(2023, 1, 1)), Some(date(2023, 12, 31))),
        &[],
    );
    let later = active_score(&fixture, bonus_draft(Some(date(2024, 1, 1)), None), &[]);
    assert_eq!(
        fixture.catalog.score(&earlier.id).expect("earlier").status,
        ScoreStatus::Superseded
    );

    let widened = ScorePatch {
        valid_from: Some(date(2022, 1, 1)),
        ..ScorePatch::default()
    };
    fixture
        .catalog
        .update_score(&later.id, widened)
        .expect("superseded siblings do not conflict");

    let other = active_score(
        &fixture,
        ScoreDraft::new("bonus", "3").with_category("staff"),
        &[],
    );
    let err = fixture
        .catalog
        .update_score(
            &other.id,
            ScorePatch {
                category: Some(" nurse ".into()),
                ..ScorePatch::default()
            },
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let formula_only = ScorePatch {
        formula: Some("999".into()),
        ..ScorePatch::default()
    };
    let updated = fixture
        .catalog
        .update_score(&later.id, formula_only)
        .expect("non-family edits stay allowed");
    assert_eq!(updated.status, ScoreStatus::Active);
}
