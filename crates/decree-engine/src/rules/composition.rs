//! Decision-table cells and the compact composition string used at the storage boundary.
//!
//! A composition is `entry("," entry)*` with `entry = factId ":" payload`. The payload is either
//! `min||max` (a range cell, either side may be blank) or a bare enumerated option id. Older rows
//! were written as a JSON object `{factId: {min, max}}`; those are still read but never written.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::attributes::{AttributeId, AttributeOptionId, ValueSnapshot};
use super::domain::RuleNature;
use super::error::RuleError;

const RANGE_SEPARATOR: &str = "||";
const ENTRY_SEPARATOR: char = ',';
const FACT_SEPARATOR: char = ':';

/// Numeric range; `None` bounds are unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RangeCell {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeCell {
    pub const fn blank() -> Self {
        Self {
            min: None,
            max: None,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| min <= value) && self.max.map_or(true, |max| value <= max)
    }
}

/// Reference to one enumerated option of a fact attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptionCell {
    pub id: String,
}

/// One input cell of a decision-table row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Cell {
    Range(RangeCell),
    Option(OptionCell),
}

impl Cell {
    pub fn range(min: Option<f64>, max: Option<f64>) -> Self {
        Cell::Range(RangeCell { min, max })
    }

    pub fn option(id: impl Into<String>) -> Self {
        Cell::Option(OptionCell { id: id.into() })
    }

    pub fn is_range(&self) -> bool {
        matches!(self, Cell::Range(_))
    }
}

/// Input cells of a decision-table row keyed by fact attribute.
pub type Composition = BTreeMap<AttributeId, Cell>;

/// Decode a stored composition. Unreadable input yields an empty composition.
pub fn decode(raw: &str) -> Composition {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Composition::new();
    }

    if trimmed.starts_with('{') {
        if let Some(cells) = decode_legacy_json(trimmed) {
            return cells;
        }
    }

    match decode_grammar(trimmed) {
        Some(cells) => cells,
        None => {
            warn!(composition = raw, "unreadable composition treated as empty");
            Composition::new()
        }
    }
}

/// Encode cells in the string grammar.
pub fn encode(cells: &Composition) -> String {
    cells
        .iter()
        .map(|(fact, cell)| match cell {
            Cell::Range(range) => format!(
                "{}{FACT_SEPARATOR}{}{RANGE_SEPARATOR}{}",
                fact.0,
                encode_bound(range.min),
                encode_bound(range.max)
            ),
            Cell::Option(option) => format!("{}{FACT_SEPARATOR}{}", fact.0, option.id),
        })
        .collect::<Vec<_>>()
        .join(&ENTRY_SEPARATOR.to_string())
}

fn encode_bound(bound: Option<f64>) -> String {
    bound.map(|value| value.to_string()).unwrap_or_default()
}

fn decode_grammar(raw: &str) -> Option<Composition> {
    let mut cells = Composition::new();
    for entry in raw.split(ENTRY_SEPARATOR) {
        let (fact, payload) = entry.trim().split_once(FACT_SEPARATOR)?;
        let fact = fact.trim();
        if !is_token(fact) {
            return None;
        }

        let payload = payload.trim();
        let cell = match payload.split_once(RANGE_SEPARATOR) {
            Some((min, max)) => Cell::range(parse_bound(min)?, parse_bound(max)?),
            None if is_token(payload) => Cell::option(payload),
            None => return None,
        };
        cells.insert(AttributeId(fact.to_string()), cell);
    }
    Some(cells)
}

fn decode_legacy_json(raw: &str) -> Option<Composition> {
    let serde_json::Value::Object(object) = serde_json::from_str::<serde_json::Value>(raw).ok()?
    else {
        return None;
    };

    let mut cells = Composition::new();
    for (fact, bounds) in object {
        let serde_json::Value::Object(bounds) = bounds else {
            return None;
        };
        let min = json_bound(bounds.get("min"))?;
        let max = json_bound(bounds.get("max"))?;
        cells.insert(AttributeId(fact), Cell::range(min, max));
    }
    Some(cells)
}

/// `Some(None)` is a blank bound; `None` is unreadable.
fn json_bound(value: Option<&serde_json::Value>) -> Option<Option<f64>> {
    match value {
        None | Some(serde_json::Value::Null) => Some(None),
        Some(serde_json::Value::Number(number)) => number.as_f64().map(Some),
        Some(serde_json::Value::String(text)) => parse_bound(text),
        Some(_) => None,
    }
}

fn parse_bound(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Some(None);
    }
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .map(Some)
}

/// Characters allowed in fact ids and option ids so the grammar stays unambiguous.
pub(crate) fn is_token(raw: &str) -> bool {
    !raw.is_empty()
        && raw
            .chars()
            .all(|ch| ch.is_alphanumeric() || matches!(ch, '_' | '-' | '.'))
}

/// Reject cells that the string grammar could not represent faithfully.
pub(crate) fn check_encodable(cells: &Composition) -> Result<(), RuleError> {
    for (fact, cell) in cells {
        if !is_token(&fact.0) {
            return Err(RuleError::validation(format!(
                "fact id `{}` contains reserved characters",
                fact.0
            )));
        }
        match cell {
            Cell::Option(option) if !is_token(&option.id) => {
                return Err(RuleError::validation(format!(
                    "option id `{}` contains reserved characters",
                    option.id
                )));
            }
            Cell::Range(range) => {
                let finite = |bound: Option<f64>| bound.map_or(true, f64::is_finite);
                if !finite(range.min) || !finite(range.max) {
                    return Err(RuleError::validation(format!(
                        "range for fact `{}` must use finite bounds",
                        fact.0
                    )));
                }
                if let (Some(min), Some(max)) = (range.min, range.max) {
                    if min > max {
                        return Err(RuleError::validation(format!(
                            "range for fact `{}` has min {min} greater than max {max}",
                            fact.0
                        )));
                    }
                }
            }
            Cell::Option(_) => {}
        }
    }
    Ok(())
}

/// Pre-populate decision rows for a table over the given facts.
///
/// Combination tables get one row per element of the cross product of every fact's options.
/// Condition tables get a single blank range row.
pub fn generate_rows(
    nature: RuleNature,
    facts: &[(AttributeId, Vec<AttributeOptionId>)],
) -> Result<Vec<Composition>, RuleError> {
    if facts.is_empty() {
        return Err(RuleError::validation(
            "decision table has no linked facts to generate rows from",
        ));
    }

    match nature {
        RuleNature::Condition => Ok(vec![facts
            .iter()
            .map(|(fact, _)| (fact.clone(), Cell::Range(RangeCell::blank())))
            .collect()]),
        RuleNature::Combination => {
            if let Some((fact, _)) = facts.iter().find(|(_, options)| options.is_empty()) {
                return Err(RuleError::validation(format!(
                    "fact `{}` has no options to combine",
                    fact.0
                )));
            }

            let mut rows = vec![Composition::new()];
            for (fact, options) in facts {
                let mut expanded = Vec::with_capacity(rows.len() * options.len());
                for row in &rows {
                    for option in options {
                        let mut next = row.clone();
                        next.insert(fact.clone(), Cell::option(option.0.clone()));
                        expanded.push(next);
                    }
                }
                rows = expanded;
            }
            Ok(rows)
        }
    }
}

/// Whether every cell of the row accepts the record's current value for its fact.
pub fn row_matches(cells: &Composition, current: &ValueSnapshot) -> bool {
    cells.iter().all(|(fact, cell)| {
        let Some(value) = current.get(fact) else {
            return false;
        };
        match cell {
            Cell::Range(range) => value
                .as_number()
                .map_or(false, |number| range.contains(number)),
            Cell::Option(option) => value.as_text().as_deref() == Some(option.id.as_str()),
        }
    })
}
