//! Rule definition and simulation engine.

pub mod attributes;
pub mod cascade;
pub mod catalog;
pub mod composition;
pub mod domain;
pub mod error;
pub mod expression;
pub mod ids;
pub mod memory;
pub mod publish;
pub mod repository;
pub mod simulation;

#[cfg(test)]
mod tests;

pub use attributes::{AttributeService, FieldView, ValueWrite};
pub use catalog::{ExpressionField, ExpressionIssue, RuleCatalog, ScoreFilter};
pub use composition::{Cell, Composition};
pub use domain::{
    RuleKind, RuleNature, Score, ScoreDraft, ScoreId, ScoreStatus, Validity, Variable,
    VariableDraft, VariableId,
};
pub use error::{ErrorKind, RuleError};
pub use ids::{generator_for, SequentialIdGenerator, UuidIdGenerator};
pub use memory::MemoryRuleStore;
pub use publish::PublishOutcome;
pub use repository::{DecreeSink, DecreeTarget, IdGenerator, RuleStore, ValueSnapshotProvider};
pub use simulation::{ManualOverride, SimulationEngine, SimulationRequest, SimulationResult};
