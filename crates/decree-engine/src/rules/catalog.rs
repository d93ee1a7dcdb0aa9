use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::attributes::{AttributeId, ValueSnapshot};
use super::cascade::{cascade_score, cascade_variable, CascadeReport};
use super::composition::{check_encodable, generate_rows, row_matches, Cell, Composition};
use super::domain::{
    OptionRowId, OptionRowInput, RuleNature, Score, ScoreDraft, ScoreId, ScoreOption, ScorePatch,
    ScoreStatus, ValueBounds, Validity, Variable, VariableDraft, VariableId, VariableOption,
    VariablePatch,
};
use super::error::RuleError;
use super::expression::{normalize_identifier, parse, ExpressionError};
use super::publish::{overlapping_active, publish_in, PublishOutcome};
use super::repository::{AttributeTables, CatalogTables, IdGenerator, RuleStore};
use super::simulation::variable_alias;

/// Listing filter for scores. A blank category counts as no filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreFilter {
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub status: Option<ScoreStatus>,
}

impl ScoreFilter {
    pub fn matches(&self, score: &Score) -> bool {
        let category_ok = match self.category.as_deref().map(str::trim) {
            Some(category) if !category.is_empty() => score.category_key() == category,
            _ => true,
        };
        category_ok && self.status.map_or(true, |status| score.status == status)
    }
}

/// Which expression of a score failed to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionField {
    Condition,
    Formula,
}

/// A score expression the parser rejects.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionIssue {
    pub score_id: ScoreId,
    pub score_name: String,
    pub field: ExpressionField,
    pub expression: String,
    pub error: ExpressionError,
}

/// Variables, scores, their decision tables, and their links.
pub struct RuleCatalog<S, G> {
    store: Arc<S>,
    ids: Arc<G>,
}

impl<S, G> RuleCatalog<S, G>
where
    S: RuleStore + 'static,
    G: IdGenerator + 'static,
{
    pub fn new(store: Arc<S>, ids: Arc<G>) -> Self {
        Self { store, ids }
    }

    pub fn create_variable(&self, draft: VariableDraft) -> Result<Variable, RuleError> {
        let variable = draft.into_variable(VariableId(self.ids.next_id("variable")));
        check_scalars(&variable.name, &variable.bounds, &variable.validity)?;
        self.store.transaction(move |tables| {
            if tables.variable(&variable.id).is_some() {
                return Err(already_exists("variable", &variable.id.0));
            }
            tables.put_variable(variable.clone());
            info!(variable = %variable.id.0, name = %variable.name, "variable created");
            Ok(variable)
        })
    }

    pub fn update_variable(
        &self,
        id: &VariableId,
        patch: VariablePatch,
    ) -> Result<Variable, RuleError> {
        self.store.transaction(|tables| {
            let mut variable = load_variable(tables, id)?;
            patch.apply(&mut variable);
            check_scalars(&variable.name, &variable.bounds, &variable.validity)?;
            tables.put_variable(variable.clone());
            Ok(variable)
        })
    }

    /// Remove the variable after its fact links, options, and score links.
    pub fn delete_variable(&self, id: &VariableId) -> Result<CascadeReport, RuleError> {
        self.store.transaction(|tables| {
            load_variable(tables, id)?;
            let report = cascade_variable(tables, id);
            tables.remove_variable(id);
            info!(variable = %id.0, ?report, "variable deleted");
            Ok(report)
        })
    }

    pub fn variable(&self, id: &VariableId) -> Result<Variable, RuleError> {
        self.store.read(|tables| load_variable(tables, id))?
    }

    /// Variables ordered by name.
    pub fn list_variables(&self) -> Result<Vec<Variable>, RuleError> {
        Ok(self.store.read(|tables| tables.variables())?)
    }

    /// Full replace of the facts a variable's decision table reads.
    pub fn set_facts(
        &self,
        variable: &VariableId,
        attributes: &[AttributeId],
    ) -> Result<Vec<AttributeId>, RuleError> {
        let attributes = dedupe(attributes);
        self.store.transaction(move |tables| {
            load_variable(tables, variable)?;
            for attribute in &attributes {
                if tables.attribute(attribute).is_none() {
                    return Err(RuleError::not_found("attribute", attribute.0.clone()));
                }
            }
            tables.clear_fact_links(variable);
            for attribute in &attributes {
                tables.insert_fact_link(variable, attribute);
            }
            debug!(variable = %variable.0, facts = attributes.len(), "facts replaced");
            Ok(attributes)
        })
    }

    pub fn facts(&self, variable: &VariableId) -> Result<Vec<AttributeId>, RuleError> {
        self.store.read(|tables| {
            load_variable(tables, variable)?;
            Ok(tables.fact_links(variable))
        })?
    }

    /// Full replace of a variable's decision table.
    pub fn replace_variable_options(
        &self,
        variable: &VariableId,
        rows: Vec<OptionRowInput<String>>,
    ) -> Result<Vec<VariableOption>, RuleError> {
        let rows: Vec<VariableOption> = rows
            .into_iter()
            .map(|row| VariableOption {
                id: OptionRowId(self.ids.next_id("vopt")),
                variable_id: variable.clone(),
                cells: row.cells,
                value: row.value,
            })
            .collect();

        self.store.transaction(move |tables| {
            let owner = load_variable(tables, variable)?;
            let facts = tables.fact_links(variable);
            for row in &rows {
                check_variable_row(tables, &owner, &facts, &row.cells)?;
            }
            tables.clear_variable_options(variable);
            for row in &rows {
                tables.insert_variable_option(row.clone());
            }
            debug!(variable = %variable.0, rows = rows.len(), "variable options replaced");
            Ok(rows)
        })
    }

    pub fn variable_options(&self, variable: &VariableId) -> Result<Vec<VariableOption>, RuleError> {
        self.store.read(|tables| {
            load_variable(tables, variable)?;
            Ok(tables.variable_options(variable))
        })?
    }

    /// Pre-populate the decision table from the linked facts.
    ///
    /// Combination tables are replaced with one row per combination of fact options; condition
    /// tables gain one blank range row per call. Generated rows carry the variable's default.
    pub fn generate_variable_options(
        &self,
        variable: &VariableId,
    ) -> Result<Vec<VariableOption>, RuleError> {
        self.store.transaction(|tables| {
            let owner = load_variable(tables, variable)?;
            let facts: Vec<_> = tables
                .fact_links(variable)
                .into_iter()
                .map(|fact| {
                    let options = tables
                        .attribute_options(&fact)
                        .into_iter()
                        .map(|option| option.id)
                        .collect();
                    (fact, options)
                })
                .collect();

            let compositions = generate_rows(owner.nature, &facts)?;
            if owner.nature == RuleNature::Combination {
                tables.clear_variable_options(variable);
            }

            let value = owner
                .bounds
                .default
                .map(|default| default.to_string())
                .unwrap_or_default();
            for cells in compositions {
                check_encodable(&cells)?;
                tables.insert_variable_option(VariableOption {
                    id: OptionRowId(self.ids.next_id("vopt")),
                    variable_id: variable.clone(),
                    cells,
                    value: value.clone(),
                });
            }
            Ok(tables.variable_options(variable))
        })
    }

    pub fn create_score(&self, draft: ScoreDraft) -> Result<Score, RuleError> {
        let score = draft.into_score(ScoreId(self.ids.next_id("score")));
        check_score(&score)?;
        self.store.transaction(move |tables| {
            if tables.score(&score.id).is_some() {
                return Err(already_exists("score", &score.id.0));
            }
            tables.put_score(score.clone());
            info!(score = %score.id.0, name = %score.name, "score created");
            Ok(score)
        })
    }

    /// Field-level update. Status is untouched; publishing is the only way to change it.
    ///
    /// An active score may not be moved onto the validity of another active score of its
    /// (possibly renamed) family.
    pub fn update_score(&self, id: &ScoreId, patch: ScorePatch) -> Result<Score, RuleError> {
        self.store.transaction(|tables| {
            let mut score = load_score(tables, id)?;
            patch.apply(&mut score);
            check_score(&score)?;
            if score.status == ScoreStatus::Active {
                let scores = tables.scores();
                if !overlapping_active(&score, &scores).is_empty() {
                    return Err(RuleError::validation("overlapping active rule"));
                }
            }
            tables.put_score(score.clone());
            Ok(score)
        })
    }

    /// Remove the score after its variable links, options, and archived decree values.
    pub fn delete_score(&self, id: &ScoreId) -> Result<CascadeReport, RuleError> {
        self.store.transaction(|tables| {
            load_score(tables, id)?;
            let report = cascade_score(tables, id);
            tables.remove_score(id);
            info!(score = %id.0, ?report, "score deleted");
            Ok(report)
        })
    }

    pub fn score(&self, id: &ScoreId) -> Result<Score, RuleError> {
        self.store.read(|tables| load_score(tables, id))?
    }

    /// Scores ordered by name, then id.
    pub fn list_scores(&self, filter: &ScoreFilter) -> Result<Vec<Score>, RuleError> {
        Ok(self.store.read(|tables| {
            tables
                .scores()
                .into_iter()
                .filter(|score| filter.matches(score))
                .collect()
        })?)
    }

    /// Full replace of the variables feeding the score's evaluation context.
    pub fn set_linked_variables(
        &self,
        score: &ScoreId,
        variables: &[VariableId],
    ) -> Result<Vec<VariableId>, RuleError> {
        let variables = dedupe(variables);
        self.store.transaction(move |tables| {
            load_score(tables, score)?;
            for variable in &variables {
                load_variable(tables, variable)?;
            }
            tables.clear_score_variables(score);
            for variable in &variables {
                tables.insert_score_variable(score, variable);
            }
            debug!(score = %score.0, variables = variables.len(), "score variables replaced");
            Ok(variables)
        })
    }

    pub fn linked_variables(&self, score: &ScoreId) -> Result<Vec<VariableId>, RuleError> {
        self.store.read(|tables| {
            load_score(tables, score)?;
            Ok(tables.score_variables(score))
        })?
    }

    /// Full replace of a score's decision table; every cell must be a numeric range.
    pub fn replace_score_options(
        &self,
        score: &ScoreId,
        rows: Vec<OptionRowInput<f64>>,
    ) -> Result<Vec<ScoreOption>, RuleError> {
        let rows: Vec<ScoreOption> = rows
            .into_iter()
            .map(|row| ScoreOption {
                id: OptionRowId(self.ids.next_id("sopt")),
                score_id: score.clone(),
                cells: row.cells,
                value: row.value,
            })
            .collect();

        for row in &rows {
            check_encodable(&row.cells)?;
            if let Some((fact, _)) = row.cells.iter().find(|(_, cell)| !cell.is_range()) {
                return Err(RuleError::validation(format!(
                    "score option cell for `{}` must be a range",
                    fact.0
                )));
            }
            if !row.value.is_finite() {
                return Err(RuleError::validation("score option value must be finite"));
            }
        }

        self.store.transaction(move |tables| {
            load_score(tables, score)?;
            tables.clear_score_options(score);
            for row in &rows {
                tables.insert_score_option(row.clone());
            }
            Ok(rows)
        })
    }

    pub fn score_options(&self, score: &ScoreId) -> Result<Vec<ScoreOption>, RuleError> {
        self.store.read(|tables| {
            load_score(tables, score)?;
            Ok(tables.score_options(score))
        })?
    }

    /// Copy a score's fields and variable links into a new draft. Options are not copied.
    pub fn duplicate(&self, id: &ScoreId) -> Result<Score, RuleError> {
        let copy_id = ScoreId(self.ids.next_id("score"));
        self.store.transaction(move |tables| {
            let source = load_score(tables, id)?;
            if tables.score(&copy_id).is_some() {
                return Err(already_exists("score", &copy_id.0));
            }
            let copy = Score {
                id: copy_id,
                status: ScoreStatus::Draft,
                ..source
            };
            tables.put_score(copy.clone());
            for variable in tables.score_variables(id) {
                tables.insert_score_variable(&copy.id, &variable);
            }
            info!(source = %id.0, copy = %copy.id.0, "score duplicated");
            Ok(copy)
        })
    }

    /// Activate a draft, superseding active siblings; rejected when an active sibling overlaps.
    pub fn publish(&self, id: &ScoreId) -> Result<PublishOutcome, RuleError> {
        self.store.transaction(|tables| publish_in(tables, id))
    }

    /// Report every score condition or formula that fails to parse or reads a name none of the
    /// score's linked variables binds.
    pub fn check_expressions(&self) -> Result<Vec<ExpressionIssue>, RuleError> {
        let scores = self.store.read(|tables| {
            tables
                .scores()
                .into_iter()
                .map(|score| {
                    let bound: BTreeSet<String> = tables
                        .score_variables(&score.id)
                        .iter()
                        .filter_map(|id| tables.variable(id))
                        .flat_map(|variable| {
                            [normalize_identifier(&variable.name), variable_alias(&variable)]
                        })
                        .filter(|name| !name.is_empty())
                        .collect();
                    (score, bound)
                })
                .collect::<Vec<_>>()
        })?;
        let mut issues = Vec::new();
        for (score, bound) in scores {
            let condition = score
                .condition
                .as_deref()
                .filter(|condition| !condition.trim().is_empty());
            let expressions = condition
                .map(|condition| (ExpressionField::Condition, condition.to_string()))
                .into_iter()
                .chain(std::iter::once((ExpressionField::Formula, score.formula.clone())));
            for (field, expression) in expressions {
                let failure = match parse(&expression) {
                    Ok(parsed) => parsed.first_unbound(&bound),
                    Err(error) => Some(error),
                };
                if let Some(error) = failure {
                    issues.push(ExpressionIssue {
                        score_id: score.id.clone(),
                        score_name: score.name.clone(),
                        field,
                        expression,
                        error,
                    });
                }
            }
        }
        Ok(issues)
    }
}

/// Look the variable up in its decision table for one record.
///
/// The first row whose cells all accept the record's values wins. Rows with a blank value and
/// records matching no row fall back to the variable's default.
pub fn lookup_value(
    variable: &Variable,
    options: &[VariableOption],
    current: &ValueSnapshot,
) -> Result<Option<f64>, RuleError> {
    let matched = options
        .iter()
        .find(|option| !option.cells.is_empty() && row_matches(&option.cells, current));
    let Some(option) = matched else {
        return Ok(variable.bounds.default);
    };

    let raw = option.value.trim();
    if raw.is_empty() {
        return Ok(variable.bounds.default);
    }
    raw.parse::<f64>().map(Some).map_err(|_| {
        RuleError::validation(format!(
            "option value `{raw}` of variable `{}` is not numeric",
            variable.name
        ))
    })
}

pub(crate) fn already_exists(entity: &str, id: &str) -> RuleError {
    RuleError::validation(format!("{entity} `{id}` already exists"))
}

fn load_variable<T: CatalogTables>(tables: &T, id: &VariableId) -> Result<Variable, RuleError> {
    tables
        .variable(id)
        .ok_or_else(|| RuleError::not_found("variable", id.0.clone()))
}

fn load_score<T: CatalogTables>(tables: &T, id: &ScoreId) -> Result<Score, RuleError> {
    tables
        .score(id)
        .ok_or_else(|| RuleError::not_found("score", id.0.clone()))
}

fn check_scalars(name: &str, bounds: &ValueBounds, validity: &Validity) -> Result<(), RuleError> {
    if name.trim().is_empty() {
        return Err(RuleError::validation("name is required"));
    }
    if !bounds.is_consistent() {
        return Err(RuleError::validation(format!(
            "`{name}` has inconsistent min/max/default values"
        )));
    }
    if !validity.is_ordered() {
        return Err(RuleError::validation(format!(
            "`{name}` is valid from a date after its end"
        )));
    }
    Ok(())
}

fn check_score(score: &Score) -> Result<(), RuleError> {
    check_scalars(&score.name, &score.bounds, &score.validity)?;
    if score.formula.trim().is_empty() {
        return Err(RuleError::validation(format!(
            "score `{}` needs a formula",
            score.name
        )));
    }
    Ok(())
}

fn check_variable_row<T: AttributeTables>(
    tables: &T,
    owner: &Variable,
    facts: &[AttributeId],
    cells: &Composition,
) -> Result<(), RuleError> {
    check_encodable(cells)?;
    for (fact, cell) in cells {
        if !facts.contains(fact) {
            return Err(RuleError::validation(format!(
                "`{}` is not a fact of variable `{}`",
                fact.0, owner.name
            )));
        }
        match (owner.nature, cell) {
            (RuleNature::Condition, Cell::Range(_)) => {}
            (RuleNature::Combination, Cell::Option(option)) => {
                let known = tables
                    .attribute_options(fact)
                    .iter()
                    .any(|candidate| candidate.id.0 == option.id);
                if !known {
                    return Err(RuleError::validation(format!(
                        "`{}` is not an option of fact `{}`",
                        option.id, fact.0
                    )));
                }
            }
            (RuleNature::Condition, Cell::Option(_)) => {
                return Err(RuleError::validation(format!(
                    "condition variable `{}` needs range cells",
                    owner.name
                )))
            }
            (RuleNature::Combination, Cell::Range(_)) => {
                return Err(RuleError::validation(format!(
                    "combination variable `{}` needs option cells",
                    owner.name
                )))
            }
        }
    }
    Ok(())
}

fn dedupe<T: Clone + Ord>(ids: &[T]) -> Vec<T> {
    let mut seen = BTreeSet::new();
    ids.iter()
        .filter(|id| seen.insert((*id).clone()))
        .cloned()
        .collect()
}
