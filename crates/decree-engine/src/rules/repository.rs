use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::attributes::{
    AttributeChange, AttributeDefinition, AttributeId, AttributeOption, AttributeValue, EntityId,
    MemberId, ValueSnapshot,
};
use super::domain::{Score, ScoreId, ScoreOption, Variable, VariableId, VariableOption};
use super::error::RuleError;
use super::simulation::SimulationResult;

/// Rule catalog tables visible inside a transaction.
pub trait CatalogTables {
    fn variable(&self, id: &VariableId) -> Option<Variable>;
    fn variables(&self) -> Vec<Variable>;
    fn put_variable(&mut self, variable: Variable);
    fn remove_variable(&mut self, id: &VariableId) -> bool;

    fn fact_links(&self, variable: &VariableId) -> Vec<AttributeId>;
    fn insert_fact_link(&mut self, variable: &VariableId, attribute: &AttributeId);
    fn clear_fact_links(&mut self, variable: &VariableId) -> usize;
    fn clear_fact_links_to(&mut self, attribute: &AttributeId) -> usize;

    fn variable_options(&self, variable: &VariableId) -> Vec<VariableOption>;
    fn insert_variable_option(&mut self, option: VariableOption);
    fn clear_variable_options(&mut self, variable: &VariableId) -> usize;

    fn score(&self, id: &ScoreId) -> Option<Score>;
    fn scores(&self) -> Vec<Score>;
    fn put_score(&mut self, score: Score);
    fn remove_score(&mut self, id: &ScoreId) -> bool;

    fn score_variables(&self, score: &ScoreId) -> Vec<VariableId>;
    fn insert_score_variable(&mut self, score: &ScoreId, variable: &VariableId);
    fn clear_score_variables(&mut self, score: &ScoreId) -> usize;
    fn clear_variable_scores(&mut self, variable: &VariableId) -> usize;

    fn score_options(&self, score: &ScoreId) -> Vec<ScoreOption>;
    fn insert_score_option(&mut self, option: ScoreOption);
    fn clear_score_options(&mut self, score: &ScoreId) -> usize;

    /// Archived per-decree value rows produced for the score.
    fn clear_decree_values(&mut self, score: &ScoreId) -> usize;
}

/// Attribute definitions, values, and the change log visible inside a transaction.
///
/// The change log can only be appended to and read.
pub trait AttributeTables {
    fn attribute(&self, id: &AttributeId) -> Option<AttributeDefinition>;
    fn attributes(&self) -> Vec<AttributeDefinition>;
    fn put_attribute(&mut self, definition: AttributeDefinition);
    fn remove_attribute(&mut self, id: &AttributeId) -> bool;
    /// Drop the dependency edge of every attribute that depends on `id`.
    fn clear_dependents(&mut self, id: &AttributeId) -> usize;

    fn attribute_options(&self, attribute: &AttributeId) -> Vec<AttributeOption>;
    fn insert_attribute_option(&mut self, option: AttributeOption);
    fn clear_attribute_options(&mut self, attribute: &AttributeId) -> usize;

    fn attribute_value(
        &self,
        entity: &EntityId,
        attribute: &AttributeId,
        member: Option<&MemberId>,
    ) -> Option<AttributeValue>;
    fn entity_values(&self, entity: &EntityId, member: Option<&MemberId>) -> Vec<AttributeValue>;
    fn delete_attribute_value(
        &mut self,
        entity: &EntityId,
        attribute: &AttributeId,
        member: Option<&MemberId>,
    ) -> bool;
    fn insert_attribute_value(&mut self, value: AttributeValue);
    fn clear_attribute_values(&mut self, attribute: &AttributeId) -> usize;

    fn append_change(&mut self, change: AttributeChange);
    fn change_log(&self, entity: &EntityId) -> Vec<AttributeChange>;
}

/// Storage abstraction so the services can be exercised in isolation.
///
/// `transaction` must apply every write made by the closure atomically, or none of them when
/// the closure fails, and must serialize concurrent transactions.
pub trait RuleStore: Send + Sync {
    type Tables: CatalogTables + AttributeTables;

    fn read<T>(&self, f: impl FnOnce(&Self::Tables) -> T) -> Result<T, RepositoryError>;

    fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Self::Tables) -> Result<T, RuleError>,
    ) -> Result<T, RuleError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("repository unavailable: {0}")]
    Unavailable(String),
    #[error("snapshot could not be read or written: {0}")]
    Snapshot(String),
}

/// Injected identity generation.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self, prefix: &'static str) -> String;
}

/// Supplies the current attribute values of a record.
pub trait ValueSnapshotProvider {
    fn values(
        &self,
        entity: &EntityId,
        as_of: Option<NaiveDate>,
    ) -> Result<ValueSnapshot, RuleError>;
}

/// Whom a simulated decree belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecreeTarget {
    pub person_id: EntityId,
    pub effective_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hokm_type_id: Option<String>,
}

/// Outbound archival hook for finished simulations.
pub trait DecreeSink: Send + Sync {
    fn archive(&self, target: &DecreeTarget, result: &SimulationResult) -> Result<(), SinkError>;
}

/// Archival failure.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    #[error("decree sink unavailable: {0}")]
    Unavailable(String),
}
