use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::attributes::AttributeId;
use super::composition::Composition;

/// Identifier wrapper for variables.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct VariableId(pub String);

/// Identifier wrapper for scores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ScoreId(pub String);

/// Identifier wrapper for decision-table rows (variable and score options alike).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OptionRowId(pub String);

/// Whether a rule produces an absolute value or a percentage ("vop").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Value,
    Percent,
}

/// Whether a rule's decision table matches ranges or enumerated options ("som").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleNature {
    Condition,
    Combination,
}

/// Publication state of a score. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreStatus {
    Superseded,
    Active,
    Draft,
}

/// Closed validity window; `None` on either side means unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Validity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<NaiveDate>,
}

impl Validity {
    pub const fn unbounded() -> Self {
        Self {
            from: None,
            to: None,
        }
    }

    pub const fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        Self { from, to }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| from <= date) && self.to.map_or(true, |to| date <= to)
    }

    /// Intervals overlap when the later start is not after the earlier end.
    pub fn overlaps(&self, other: &Validity) -> bool {
        let starts_before_other_ends = match (self.from, other.to) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        let other_starts_before_end = match (other.from, self.to) {
            (Some(start), Some(end)) => start <= end,
            _ => true,
        };
        starts_before_other_ends && other_starts_before_end
    }

    pub fn is_ordered(&self) -> bool {
        match (self.from, self.to) {
            (Some(from), Some(to)) => from <= to,
            _ => true,
        }
    }
}

/// Numeric bounds and default shared by variables and scores.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ValueBounds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<f64>,
}

impl ValueBounds {
    pub fn is_consistent(&self) -> bool {
        if let (Some(min), Some(max)) = (self.min, self.max) {
            if min > max {
                return false;
            }
        }
        match self.default {
            Some(value) => {
                self.min.map_or(true, |min| value >= min)
                    && self.max.map_or(true, |max| value <= max)
            }
            None => true,
        }
    }
}

/// Input to the simulation context, resolved through a decision table of facts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: RuleKind,
    pub nature: RuleNature,
    #[serde(default)]
    pub bounds: ValueBounds,
    #[serde(default)]
    pub validity: Validity,
}

/// Fields supplied when creating a variable; the catalog assigns the identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub kind: RuleKind,
    pub nature: RuleNature,
    #[serde(default)]
    pub bounds: ValueBounds,
    #[serde(default)]
    pub validity: Validity,
}

impl VariableDraft {
    pub fn new(name: impl Into<String>, kind: RuleKind, nature: RuleNature) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            kind,
            nature,
            bounds: ValueBounds::default(),
            validity: Validity::unbounded(),
        }
    }

    pub(crate) fn into_variable(self, id: VariableId) -> Variable {
        Variable {
            id,
            name: self.name,
            description: self.description,
            kind: self.kind,
            nature: self.nature,
            bounds: self.bounds,
            validity: self.validity,
        }
    }
}

/// Partial update for a variable. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariablePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub kind: Option<RuleKind>,
    pub nature: Option<RuleNature>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub value_default: Option<f64>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl VariablePatch {
    pub(crate) fn apply(self, variable: &mut Variable) {
        if let Some(name) = self.name {
            variable.name = name;
        }
        if let Some(description) = self.description {
            variable.description = description;
        }
        if let Some(kind) = self.kind {
            variable.kind = kind;
        }
        if let Some(nature) = self.nature {
            variable.nature = nature;
        }
        if let Some(min) = self.value_min {
            variable.bounds.min = Some(min);
        }
        if let Some(max) = self.value_max {
            variable.bounds.max = Some(max);
        }
        if let Some(default) = self.value_default {
            variable.bounds.default = Some(default);
        }
        if let Some(from) = self.valid_from {
            variable.validity.from = Some(from);
        }
        if let Some(to) = self.valid_to {
            variable.validity.to = Some(to);
        }
    }
}

/// One decision-table row of a variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableOption {
    pub id: OptionRowId,
    pub variable_id: VariableId,
    pub cells: Composition,
    pub value: String,
}

/// Scoring formula that yields one decree line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub id: ScoreId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_set_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    pub formula: String,
    pub kind: RuleKind,
    pub nature: RuleNature,
    #[serde(default)]
    pub bounds: ValueBounds,
    #[serde(default)]
    pub validity: Validity,
    pub status: ScoreStatus,
}

impl Score {
    /// Category with `None` and `""` treated as the same bucket.
    pub fn category_key(&self) -> &str {
        normalized_category(self.category.as_deref())
    }

    pub fn same_family(&self, other: &Score) -> bool {
        self.name == other.name && self.category_key() == other.category_key()
    }
}

pub(crate) fn normalized_category(category: Option<&str>) -> &str {
    category.map(str::trim).unwrap_or("")
}

/// Fields supplied when creating a score; new scores always start as drafts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreDraft {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub rule_set_id: Option<String>,
    #[serde(default)]
    pub condition: Option<String>,
    pub formula: String,
    pub kind: RuleKind,
    pub nature: RuleNature,
    #[serde(default)]
    pub bounds: ValueBounds,
    #[serde(default)]
    pub validity: Validity,
}

impl ScoreDraft {
    pub fn new(name: impl Into<String>, formula: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            category: None,
            rule_set_id: None,
            condition: None,
            formula: formula.into(),
            kind: RuleKind::Value,
            nature: RuleNature::Condition,
            bounds: ValueBounds::default(),
            validity: Validity::unbounded(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub(crate) fn into_score(self, id: ScoreId) -> Score {
        Score {
            id,
            name: self.name,
            description: self.description,
            category: self.category,
            rule_set_id: self.rule_set_id,
            condition: self.condition,
            formula: self.formula,
            kind: self.kind,
            nature: self.nature,
            bounds: self.bounds,
            validity: self.validity,
            status: ScoreStatus::Draft,
        }
    }
}

/// Partial update for a score. Status is only changed by publishing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScorePatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub rule_set_id: Option<String>,
    pub condition: Option<String>,
    pub formula: Option<String>,
    pub kind: Option<RuleKind>,
    pub nature: Option<RuleNature>,
    pub value_min: Option<f64>,
    pub value_max: Option<f64>,
    pub value_default: Option<f64>,
    pub valid_from: Option<NaiveDate>,
    pub valid_to: Option<NaiveDate>,
}

impl ScorePatch {
    pub(crate) fn apply(self, score: &mut Score) {
        if let Some(name) = self.name {
            score.name = name;
        }
        if let Some(description) = self.description {
            score.description = description;
        }
        if let Some(category) = self.category {
            score.category = Some(category);
        }
        if let Some(rule_set_id) = self.rule_set_id {
            score.rule_set_id = Some(rule_set_id);
        }
        if let Some(condition) = self.condition {
            score.condition = Some(condition);
        }
        if let Some(formula) = self.formula {
            score.formula = formula;
        }
        if let Some(kind) = self.kind {
            score.kind = kind;
        }
        if let Some(nature) = self.nature {
            score.nature = nature;
        }
        if let Some(min) = self.value_min {
            score.bounds.min = Some(min);
        }
        if let Some(max) = self.value_max {
            score.bounds.max = Some(max);
        }
        if let Some(default) = self.value_default {
            score.bounds.default = Some(default);
        }
        if let Some(from) = self.valid_from {
            score.validity.from = Some(from);
        }
        if let Some(to) = self.valid_to {
            score.validity.to = Some(to);
        }
    }
}

/// One decision-table row of a score; cells are numeric ranges only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreOption {
    pub id: OptionRowId,
    pub score_id: ScoreId,
    pub cells: Composition,
    pub value: f64,
}

/// Decision-table row supplied to `replace_*_options`; the catalog assigns row ids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRowInput<V> {
    pub cells: Composition,
    pub value: V,
}

/// Link from a variable to a fact attribute it reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactLink {
    pub variable_id: VariableId,
    pub attribute_id: AttributeId,
}

/// Link from a score to a variable that feeds its evaluation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreVariableLink {
    pub score_id: ScoreId,
    pub variable_id: VariableId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
    }

    #[test]
    fn open_bounds_behave_as_infinity() {
        let open = Validity::unbounded();
        let from_2024 = Validity::new(Some(date(2024, 1, 1)), None);
        let until_2022 = Validity::new(None, Some(date(2022, 12, 31)));

        assert!(open.overlaps(&from_2024));
        assert!(from_2024.overlaps(&open));
        assert!(!from_2024.overlaps(&until_2022));
        assert!(!until_2022.overlaps(&from_2024));
        assert!(open.contains(date(1990, 5, 5)));
    }

    #[test]
    fn touching_intervals_overlap_on_shared_day() {
        let first = Validity::new(Some(date(2023, 1, 1)), Some(date(2023, 12, 31)));
        let second = Validity::new(Some(date(2023, 12, 31)), None);
        let third = Validity::new(Some(date(2024, 1, 1)), None);

        assert!(first.overlaps(&second));
        assert!(!first.overlaps(&third));
    }

    #[test]
    fn category_key_treats_missing_and_blank_alike() {
        let mut score = ScoreDraft::new("bonus", "1").into_score(ScoreId("s-1".into()));
        assert_eq!(score.category_key(), "");
        score.category = Some(String::new());
        assert_eq!(score.category_key(), "");
        score.category = Some("nurse".into());
        assert_eq!(score.category_key(), "nurse");
    }

    #[test]
    fn bounds_reject_default_outside_range() {
        let bounds = ValueBounds {
            min: Some(1.0),
            max: Some(5.0),
            default: Some(9.0),
        };
        assert!(!bounds.is_consistent());
        assert!(ValueBounds::default().is_consistent());
    }
}
