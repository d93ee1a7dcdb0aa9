//! In-process store: whole-transaction copy-on-write over plain tables, with JSON snapshots.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::attributes::{
    AttributeChange, AttributeDefinition, AttributeId, AttributeOption, AttributeValue, EntityId,
    MemberId,
};
use super::composition::{decode, encode};
use super::domain::{
    FactLink, OptionRowId, Score, ScoreId, ScoreOption, ScoreVariableLink, Variable, VariableId,
    VariableOption,
};
use super::error::RuleError;
use super::repository::{
    AttributeTables, CatalogTables, DecreeSink, DecreeTarget, RepositoryError, RuleStore,
    SinkError,
};
use super::simulation::SimulationResult;

/// Decision-table row as persisted: the composition is kept in its string form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredOptionRow {
    pub id: OptionRowId,
    pub owner_id: String,
    pub composition: String,
    pub value: String,
}

/// Archived value of one score within one decree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecreeValueRow {
    pub decree_id: String,
    pub person_id: EntityId,
    pub effective_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hokm_type_id: Option<String>,
    pub score_id: ScoreId,
    pub value: f64,
}

/// Every table of the catalog. Serializes as the catalog snapshot document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryTables {
    #[serde(default)]
    pub attributes: BTreeMap<AttributeId, AttributeDefinition>,
    #[serde(default)]
    pub attribute_options: Vec<AttributeOption>,
    #[serde(default)]
    pub attribute_values: Vec<AttributeValue>,
    #[serde(default)]
    pub change_log: Vec<AttributeChange>,
    #[serde(default)]
    pub variables: BTreeMap<VariableId, Variable>,
    #[serde(default)]
    pub fact_links: Vec<FactLink>,
    #[serde(default)]
    pub variable_options: Vec<StoredOptionRow>,
    #[serde(default)]
    pub scores: BTreeMap<ScoreId, Score>,
    #[serde(default)]
    pub score_variables: Vec<ScoreVariableLink>,
    #[serde(default)]
    pub score_options: Vec<StoredOptionRow>,
    #[serde(default)]
    pub decree_values: Vec<DecreeValueRow>,
    /// Number of the last archived decree, kept even when its rows are gone.
    #[serde(default)]
    pub decree_sequence: u64,
}

impl MemoryTables {
    /// Largest numeric suffix among generated identities (`score-000042` -> 42).
    pub fn highest_sequence(&self) -> u64 {
        let catalog_ids = self
            .attributes
            .keys()
            .map(|id| id.0.as_str())
            .chain(self.attribute_options.iter().map(|option| option.id.0.as_str()))
            .chain(self.variables.keys().map(|id| id.0.as_str()))
            .chain(self.variable_options.iter().map(|row| row.id.0.as_str()))
            .chain(self.scores.keys().map(|id| id.0.as_str()))
            .chain(self.score_options.iter().map(|row| row.id.0.as_str()));
        catalog_ids.filter_map(sequence_suffix).max().unwrap_or(0)
    }

    fn next_decree_number(&mut self) -> u64 {
        let archived = self
            .decree_values
            .iter()
            .filter_map(|row| sequence_suffix(&row.decree_id))
            .max()
            .unwrap_or(0);
        self.decree_sequence = self.decree_sequence.max(archived) + 1;
        self.decree_sequence
    }
}

fn sequence_suffix(id: &str) -> Option<u64> {
    let (_, suffix) = id.rsplit_once('-')?;
    if suffix.is_empty() || !suffix.bytes().all(|byte| byte.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

fn retain_counting<T>(rows: &mut Vec<T>, keep: impl FnMut(&T) -> bool) -> usize {
    let before = rows.len();
    rows.retain(keep);
    before - rows.len()
}

fn same_member(left: Option<&MemberId>, right: Option<&MemberId>) -> bool {
    left == right
}

impl CatalogTables for MemoryTables {
    fn variable(&self, id: &VariableId) -> Option<Variable> {
        self.variables.get(id).cloned()
    }

    fn variables(&self) -> Vec<Variable> {
        let mut variables: Vec<_> = self.variables.values().cloned().collect();
        variables.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        variables
    }

    fn put_variable(&mut self, variable: Variable) {
        self.variables.insert(variable.id.clone(), variable);
    }

    fn remove_variable(&mut self, id: &VariableId) -> bool {
        self.variables.remove(id).is_some()
    }

    fn fact_links(&self, variable: &VariableId) -> Vec<AttributeId> {
        self.fact_links
            .iter()
            .filter(|link| &link.variable_id == variable)
            .map(|link| link.attribute_id.clone())
            .collect()
    }

    fn insert_fact_link(&mut self, variable: &VariableId, attribute: &AttributeId) {
        self.fact_links.push(FactLink {
            variable_id: variable.clone(),
            attribute_id: attribute.clone(),
        });
    }

    fn clear_fact_links(&mut self, variable: &VariableId) -> usize {
        retain_counting(&mut self.fact_links, |link| &link.variable_id != variable)
    }

    fn clear_fact_links_to(&mut self, attribute: &AttributeId) -> usize {
        retain_counting(&mut self.fact_links, |link| &link.attribute_id != attribute)
    }

    fn variable_options(&self, variable: &VariableId) -> Vec<VariableOption> {
        self.variable_options
            .iter()
            .filter(|row| row.owner_id == variable.0)
            .map(|row| VariableOption {
                id: row.id.clone(),
                variable_id: variable.clone(),
                cells: decode(&row.composition),
                value: row.value.clone(),
            })
            .collect()
    }

    fn insert_variable_option(&mut self, option: VariableOption) {
        self.variable_options.push(StoredOptionRow {
            id: option.id,
            owner_id: option.variable_id.0,
            composition: encode(&option.cells),
            value: option.value,
        });
    }

    fn clear_variable_options(&mut self, variable: &VariableId) -> usize {
        retain_counting(&mut self.variable_options, |row| row.owner_id != variable.0)
    }

    fn score(&self, id: &ScoreId) -> Option<Score> {
        self.scores.get(id).cloned()
    }

    fn scores(&self) -> Vec<Score> {
        let mut scores: Vec<_> = self.scores.values().cloned().collect();
        scores.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        scores
    }

    fn put_score(&mut self, score: Score) {
        self.scores.insert(score.id.clone(), score);
    }

    fn remove_score(&mut self, id: &ScoreId) -> bool {
        self.scores.remove(id).is_some()
    }

    fn score_variables(&self, score: &ScoreId) -> Vec<VariableId> {
        self.score_variables
            .iter()
            .filter(|link| &link.score_id == score)
            .map(|link| link.variable_id.clone())
            .collect()
    }

    fn insert_score_variable(&mut self, score: &ScoreId, variable: &VariableId) {
        self.score_variables.push(ScoreVariableLink {
            score_id: score.clone(),
            variable_id: variable.clone(),
        });
    }

    fn clear_score_variables(&mut self, score: &ScoreId) -> usize {
        retain_counting(&mut self.score_variables, |link| &link.score_id != score)
    }

    fn clear_variable_scores(&mut self, variable: &VariableId) -> usize {
        retain_counting(&mut self.score_variables, |link| {
            &link.variable_id != variable
        })
    }

    fn score_options(&self, score: &ScoreId) -> Vec<ScoreOption> {
        self.score_options
            .iter()
            .filter(|row| row.owner_id == score.0)
            .filter_map(|row| match row.value.trim().parse::<f64>() {
                Ok(value) => Some(ScoreOption {
                    id: row.id.clone(),
                    score_id: score.clone(),
                    cells: decode(&row.composition),
                    value,
                }),
                Err(_) => {
                    warn!(row = %row.id.0, value = %row.value, "skipping score option with non-numeric value");
                    None
                }
            })
            .collect()
    }

    fn insert_score_option(&mut self, option: ScoreOption) {
        self.score_options.push(StoredOptionRow {
            id: option.id,
            owner_id: option.score_id.0,
            composition: encode(&option.cells),
            value: option.value.to_string(),
        });
    }

    fn clear_score_options(&mut self, score: &ScoreId) -> usize {
        retain_counting(&mut self.score_options, |row| row.owner_id != score.0)
    }

    fn clear_decree_values(&mut self, score: &ScoreId) -> usize {
        retain_counting(&mut self.decree_values, |row| &row.score_id != score)
    }
}

impl AttributeTables for MemoryTables {
    fn attribute(&self, id: &AttributeId) -> Option<AttributeDefinition> {
        self.attributes.get(id).cloned()
    }

    fn attributes(&self) -> Vec<AttributeDefinition> {
        self.attributes.values().cloned().collect()
    }

    fn put_attribute(&mut self, definition: AttributeDefinition) {
        self.attributes.insert(definition.id.clone(), definition);
    }

    fn remove_attribute(&mut self, id: &AttributeId) -> bool {
        self.attributes.remove(id).is_some()
    }

    fn clear_dependents(&mut self, id: &AttributeId) -> usize {
        let mut cleared = 0;
        for definition in self.attributes.values_mut() {
            let depends_on_id = definition
                .depends_on
                .as_ref()
                .map_or(false, |dependency| &dependency.attribute_id == id);
            if depends_on_id {
                definition.depends_on = None;
                cleared += 1;
            }
        }
        cleared
    }

    fn attribute_options(&self, attribute: &AttributeId) -> Vec<AttributeOption> {
        self.attribute_options
            .iter()
            .filter(|option| &option.attribute_id == attribute)
            .cloned()
            .collect()
    }

    fn insert_attribute_option(&mut self, option: AttributeOption) {
        self.attribute_options.push(option);
    }

    fn clear_attribute_options(&mut self, attribute: &AttributeId) -> usize {
        retain_counting(&mut self.attribute_options, |option| {
            &option.attribute_id != attribute
        })
    }

    fn attribute_value(
        &self,
        entity: &EntityId,
        attribute: &AttributeId,
        member: Option<&MemberId>,
    ) -> Option<AttributeValue> {
        self.attribute_values
            .iter()
            .find(|row| {
                &row.entity_id == entity
                    && &row.attribute_id == attribute
                    && same_member(row.member_id.as_ref(), member)
            })
            .cloned()
    }

    fn entity_values(&self, entity: &EntityId, member: Option<&MemberId>) -> Vec<AttributeValue> {
        self.attribute_values
            .iter()
            .filter(|row| &row.entity_id == entity && same_member(row.member_id.as_ref(), member))
            .cloned()
            .collect()
    }

    fn delete_attribute_value(
        &mut self,
        entity: &EntityId,
        attribute: &AttributeId,
        member: Option<&MemberId>,
    ) -> bool {
        retain_counting(&mut self.attribute_values, |row| {
            !(&row.entity_id == entity
                && &row.attribute_id == attribute
                && same_member(row.member_id.as_ref(), member))
        }) > 0
    }

    fn insert_attribute_value(&mut self, value: AttributeValue) {
        self.attribute_values.push(value);
    }

    fn clear_attribute_values(&mut self, attribute: &AttributeId) -> usize {
        retain_counting(&mut self.attribute_values, |row| {
            &row.attribute_id != attribute
        })
    }

    fn append_change(&mut self, change: AttributeChange) {
        self.change_log.push(change);
    }

    fn change_log(&self, entity: &EntityId) -> Vec<AttributeChange> {
        self.change_log
            .iter()
            .filter(|change| &change.entity_id == entity)
            .cloned()
            .collect()
    }
}

/// Mutex-guarded tables. The lock is held for the whole transaction, so writers are serialized
/// and a failed closure leaves the committed tables untouched.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    tables: Mutex<MemoryTables>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tables(tables: MemoryTables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    pub fn from_reader(reader: impl Read) -> Result<Self, RepositoryError> {
        let tables: MemoryTables = serde_json::from_reader(reader)
            .map_err(|err| RepositoryError::Snapshot(err.to_string()))?;
        Ok(Self::from_tables(tables))
    }

    pub fn load(path: &Path) -> Result<Self, RepositoryError> {
        let file = File::open(path).map_err(|err| {
            RepositoryError::Snapshot(format!("{}: {err}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Largest sequential suffix already used by the catalog; see [`MemoryTables::highest_sequence`].
    pub fn highest_sequence(&self) -> Result<u64, RepositoryError> {
        self.read(MemoryTables::highest_sequence)
    }

    /// Copy of the committed tables.
    pub fn snapshot(&self) -> Result<MemoryTables, RepositoryError> {
        self.read(Clone::clone)
    }

    pub fn write_to(&self, writer: impl Write) -> Result<(), RepositoryError> {
        let tables = self.snapshot()?;
        serde_json::to_writer_pretty(writer, &tables)
            .map_err(|err| RepositoryError::Snapshot(err.to_string()))
    }

    pub fn save(&self, path: &Path) -> Result<(), RepositoryError> {
        let file = File::create(path).map_err(|err| {
            RepositoryError::Snapshot(format!("{}: {err}", path.display()))
        })?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer
            .flush()
            .map_err(|err| RepositoryError::Snapshot(err.to_string()))
    }

    fn poisoned() -> RepositoryError {
        RepositoryError::Unavailable("rule store mutex poisoned".to_string())
    }
}

impl RuleStore for MemoryRuleStore {
    type Tables = MemoryTables;

    fn read<T>(&self, f: impl FnOnce(&Self::Tables) -> T) -> Result<T, RepositoryError> {
        let guard = self.tables.lock().map_err(|_| Self::poisoned())?;
        Ok(f(&guard))
    }

    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Self::Tables) -> Result<T, RuleError>,
    ) -> Result<T, RuleError> {
        let mut guard = self.tables.lock().map_err(|_| Self::poisoned())?;
        let mut working = guard.clone();
        let outcome = f(&mut working)?;
        *guard = working;
        Ok(outcome)
    }
}

impl DecreeSink for MemoryRuleStore {
    fn archive(&self, target: &DecreeTarget, result: &SimulationResult) -> Result<(), SinkError> {
        let mut guard = self
            .tables
            .lock()
            .map_err(|_| SinkError::Unavailable("rule store mutex poisoned".to_string()))?;
        let sequence = guard.next_decree_number();
        let decree_id = format!("decree-{sequence:06}");
        for item in &result.items {
            guard.decree_values.push(DecreeValueRow {
                decree_id: decree_id.clone(),
                person_id: target.person_id.clone(),
                effective_date: target.effective_date,
                hokm_type_id: target.hokm_type_id.clone(),
                score_id: item.score_id.clone(),
                value: item.value,
            });
        }
        Ok(())
    }
}
