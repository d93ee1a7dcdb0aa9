//! Score lifecycle: `draft -> active -> superseded`, never backwards.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::{Score, ScoreId, ScoreStatus};
use super::error::RuleError;
use super::repository::CatalogTables;

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishOutcome {
    pub score: Score,
    /// Active siblings of the same `(name, category)` moved to superseded.
    pub superseded: Vec<ScoreId>,
    /// The score was already active; nothing changed.
    pub already_active: bool,
}

/// Active scores of the candidate's family, other than the candidate, whose validity overlaps it.
pub fn overlapping_active<'a>(candidate: &Score, scores: &'a [Score]) -> Vec<&'a Score> {
    scores
        .iter()
        .filter(|other| {
            other.id != candidate.id
                && other.status == ScoreStatus::Active
                && other.same_family(candidate)
                && other.validity.overlaps(&candidate.validity)
        })
        .collect()
}

pub(crate) fn publish_in<T: CatalogTables>(
    tables: &mut T,
    id: &ScoreId,
) -> Result<PublishOutcome, RuleError> {
    let mut score = tables
        .score(id)
        .ok_or_else(|| RuleError::not_found("score", id.0.clone()))?;

    match score.status {
        ScoreStatus::Active => {
            return Ok(PublishOutcome {
                score,
                superseded: Vec::new(),
                already_active: true,
            })
        }
        ScoreStatus::Superseded => {
            return Err(RuleError::validation(format!(
                "score `{}` is superseded and cannot be published again",
                id.0
            )))
        }
        ScoreStatus::Draft => {}
    }

    let scores = tables.scores();
    let overlapping = overlapping_active(&score, &scores);
    if !overlapping.is_empty() {
        info!(
            score = %id.0,
            conflicts = ?overlapping.iter().map(|other| other.id.0.as_str()).collect::<Vec<_>>(),
            "publish rejected"
        );
        return Err(RuleError::validation("overlapping active rule"));
    }

    let mut superseded = Vec::new();
    for mut sibling in scores {
        if sibling.id != score.id
            && sibling.status == ScoreStatus::Active
            && sibling.same_family(&score)
        {
            sibling.status = ScoreStatus::Superseded;
            superseded.push(sibling.id.clone());
            tables.put_score(sibling);
        }
    }

    score.status = ScoreStatus::Active;
    tables.put_score(score.clone());
    info!(score = %id.0, name = %score.name, superseded = superseded.len(), "score published");

    Ok(PublishOutcome {
        score,
        superseded,
        already_active: false,
    })
}
