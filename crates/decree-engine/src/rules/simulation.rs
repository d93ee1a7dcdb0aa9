//! Decree simulation: select active scores for a date, evaluate guards and formulas over the
//! variable context, apply manual overrides, and keep a per-score trace.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::attributes::EntityId;
use super::catalog::lookup_value;
use super::domain::{Score, ScoreId, ScoreStatus, Variable};
use super::error::RuleError;
use super::expression::{normalize_identifier, parse, EvalContext};
use super::repository::{CatalogTables, DecreeSink, DecreeTarget, RuleStore, ValueSnapshotProvider};
use crate::config::EngineConfig;

/// Caller-supplied replacement for one score's computed value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualOverride {
    pub item_id: ScoreId,
    pub value: f64,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationRequest {
    pub effective_date: NaiveDate,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub variable_values: BTreeMap<String, f64>,
    #[serde(default)]
    pub manual_overrides: Vec<ManualOverride>,
}

impl SimulationRequest {
    pub fn new(effective_date: NaiveDate) -> Self {
        Self {
            effective_date,
            category: None,
            variable_values: BTreeMap::new(),
            manual_overrides: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.variable_values.insert(name.into(), value);
        self
    }

    pub fn with_override(mut self, item_id: ScoreId, value: f64, reason: impl Into<String>) -> Self {
        self.manual_overrides.push(ManualOverride {
            item_id,
            value,
            reason: reason.into(),
        });
        self
    }
}

/// One decree line item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationItem {
    pub score_id: ScoreId,
    pub score_name: String,
    pub formula: String,
    pub value: f64,
    pub trace: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub items: Vec<SimulationItem>,
    pub total: f64,
}

/// Runs simulations against the catalog held by the store.
pub struct SimulationEngine<S> {
    store: Arc<S>,
    override_reason_min_chars: usize,
}

impl<S> SimulationEngine<S>
where
    S: RuleStore + 'static,
{
    pub fn new(store: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            store,
            override_reason_min_chars: config.override_reason_min_chars.max(1),
        }
    }

    /// Evaluate every applicable score. Any evaluation failure aborts the whole run.
    pub fn simulate(&self, request: &SimulationRequest) -> Result<SimulationResult, RuleError> {
        self.check_overrides(&request.manual_overrides)?;

        let mut context = EvalContext::new();
        for (name, value) in &request.variable_values {
            let normalized = normalize_identifier(name);
            if normalized.is_empty() {
                debug!(input = %name, "ignoring variable name without identifier characters");
                continue;
            }
            context.set(normalized, *value);
        }

        let candidates = self.store.read(|tables| {
            tables
                .scores()
                .into_iter()
                .filter(|score| is_candidate(score, request))
                .map(|score| {
                    let variables: Vec<Variable> = tables
                        .score_variables(&score.id)
                        .iter()
                        .filter_map(|id| tables.variable(id))
                        .collect();
                    (score, variables)
                })
                .collect::<Vec<_>>()
        })?;

        let mut result = SimulationResult::default();
        for (score, variables) in candidates {
            if let Some(item) = evaluate_score(&score, &variables, &mut context, request)? {
                result.total += item.value;
                result.items.push(item);
            }
        }

        info!(
            effective_date = %request.effective_date,
            items = result.items.len(),
            total = result.total,
            "simulation finished"
        );
        Ok(result)
    }

    /// Simulation input for a record: every variable valid at `date` looked up in its decision
    /// table. Variables without a match or default are left out.
    pub fn record_variable_values<P>(
        &self,
        provider: &P,
        entity: &EntityId,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, f64>, RuleError>
    where
        P: ValueSnapshotProvider + ?Sized,
    {
        let current = provider.values(entity, Some(date))?;
        let tables = self.store.read(|tables| {
            tables
                .variables()
                .into_iter()
                .filter(|variable| variable.validity.contains(date))
                .map(|variable| {
                    let options = tables.variable_options(&variable.id);
                    (variable, options)
                })
                .collect::<Vec<_>>()
        })?;

        let mut values = BTreeMap::new();
        for (variable, options) in tables {
            if let Some(value) = lookup_value(&variable, &options, &current)? {
                values.insert(variable.name.clone(), value);
            }
        }
        Ok(values)
    }

    /// Simulate, then hand the result to the archival sink. Sink failures are logged only.
    pub fn simulate_and_archive<D>(
        &self,
        request: &SimulationRequest,
        target: &DecreeTarget,
        sink: &D,
    ) -> Result<SimulationResult, RuleError>
    where
        D: DecreeSink + ?Sized,
    {
        let result = self.simulate(request)?;
        if let Err(err) = sink.archive(target, &result) {
            warn!(person = %target.person_id.0, error = %err, "decree archival failed");
        }
        Ok(result)
    }

    fn check_overrides(&self, overrides: &[ManualOverride]) -> Result<(), RuleError> {
        for manual in overrides {
            if manual.reason.trim().chars().count() < self.override_reason_min_chars {
                return Err(RuleError::validation(format!(
                    "override for `{}` needs a reason of at least {} characters",
                    manual.item_id.0, self.override_reason_min_chars
                )));
            }
            if !manual.value.is_finite() {
                return Err(RuleError::validation(format!(
                    "override for `{}` must be a finite number",
                    manual.item_id.0
                )));
            }
        }
        Ok(())
    }
}

fn is_candidate(score: &Score, request: &SimulationRequest) -> bool {
    if score.status != ScoreStatus::Active || !score.validity.contains(request.effective_date) {
        return false;
    }
    match request.category.as_deref().map(str::trim) {
        Some(category) if !category.is_empty() => score.category_key() == category,
        _ => true,
    }
}

/// Stable alias every linked variable is bound under, whatever its display name.
pub fn variable_alias(variable: &Variable) -> String {
    format!("var_{}", normalize_identifier(&variable.id.0))
}

fn evaluate_score(
    score: &Score,
    variables: &[Variable],
    context: &mut EvalContext,
    request: &SimulationRequest,
) -> Result<Option<SimulationItem>, RuleError> {
    let mut trace = Vec::new();

    for variable in variables {
        let alias = variable_alias(variable);
        let normalized = normalize_identifier(&variable.name);
        let name = if normalized.is_empty() {
            alias.clone()
        } else {
            normalized
        };

        let value = match context.get(&name) {
            Some(value) => {
                trace.push(format!("Variable {name} = {value}"));
                value
            }
            None => {
                context.set(name.clone(), 0.0);
                trace.push(format!("Variable {name} missing, defaulting to 0"));
                0.0
            }
        };
        context.set(alias, value);
    }

    if let Some(condition) = score
        .condition
        .as_deref()
        .filter(|condition| !condition.trim().is_empty())
    {
        let passed = parse(condition)
            .and_then(|expr| expr.evaluate_bool(context))
            .map_err(|err| RuleError::evaluation(condition, err))?;
        trace.push(format!("Condition \"{condition}\" => {passed}"));
        if !passed {
            debug!(score = %score.id.0, "condition not met, score skipped");
            return Ok(None);
        }
    }

    let mut value = parse(&score.formula)
        .and_then(|expr| expr.evaluate(context))
        .map_err(|err| RuleError::evaluation(score.formula.clone(), err))?;
    trace.push(format!("Formula \"{}\" => {value}", score.formula));

    if let Some(manual) = request
        .manual_overrides
        .iter()
        .rev()
        .find(|manual| manual.item_id == score.id)
    {
        value = manual.value;
        trace.push(format!(
            "Manual override applied: {} ({})",
            manual.value,
            manual.reason.trim()
        ));
    }

    Ok(Some(SimulationItem {
        score_id: score.id.clone(),
        score_name: score.name.clone(),
        formula: score.formula.clone(),
        value,
        trace,
    }))
}
