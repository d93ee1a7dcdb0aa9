use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::config::EngineConfig;
use crate::rules::attributes::{
    AttributeDefinition, AttributeDraft, AttributeId, AttributeOptionInput, AttributeService,
    DataType, EntityId, TypedValue, ValueWrite,
};
use crate::rules::composition::{Cell, Composition};
use crate::rules::domain::{
    OptionRowInput, RuleKind, RuleNature, Score, ScoreDraft, Validity, Variable, VariableDraft,
};
use crate::rules::ids::SequentialIdGenerator;
use crate::rules::memory::MemoryRuleStore;
use crate::rules::repository::{DecreeSink, DecreeTarget, SinkError};
use crate::rules::simulation::{SimulationEngine, SimulationResult};
use crate::rules::RuleCatalog;

pub(super) struct Fixture {
    pub(super) store: Arc<MemoryRuleStore>,
    pub(super) attributes: AttributeService<MemoryRuleStore, SequentialIdGenerator>,
    pub(super) catalog: RuleCatalog<MemoryRuleStore, SequentialIdGenerator>,
    pub(super) engine: SimulationEngine<MemoryRuleStore>,
}

pub(super) fn fixture() -> Fixture {
    let store = Arc::new(MemoryRuleStore::new());
    let ids = Arc::new(SequentialIdGenerator::default());
    Fixture {
        attributes: AttributeService::new(store.clone(), ids.clone()),
        catalog: RuleCatalog::new(store.clone(), ids),
        engine: SimulationEngine::new(store.clone(), &EngineConfig::default()),
        store,
    }
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn person(id: &str) -> EntityId {
    EntityId(id.to_string())
}

pub(super) fn text(value: &str) -> TypedValue {
    TypedValue::Str(value.to_string())
}

pub(super) fn write(
    fixture: &Fixture,
    entity: &EntityId,
    attribute: &AttributeId,
    value: TypedValue,
) -> Result<(), crate::rules::RuleError> {
    fixture
        .attributes
        .write_value(ValueWrite::new(
            entity.clone(),
            attribute.clone(),
            value,
            "hr-admin",
        ))
        .map(|_| ())
}

pub(super) fn string_attribute(fixture: &Fixture, name: &str) -> AttributeDefinition {
    fixture
        .attributes
        .create_attribute(AttributeDraft::new(name, DataType::String))
        .expect("attribute created")
}

/// `rank` attribute with enumerated options `A` and `B`.
pub(super) fn rank_attribute(fixture: &Fixture) -> AttributeDefinition {
    let rank = string_attribute(fixture, "rank");
    fixture
        .attributes
        .set_attribute_options(
            &rank.id,
            vec![
                AttributeOptionInput::with_id("A", "Rank A"),
                AttributeOptionInput::with_id("B", "Rank B"),
            ],
        )
        .expect("rank options set");
    rank
}

pub(super) fn cells(entries: &[(&AttributeId, Cell)]) -> Composition {
    entries
        .iter()
        .map(|(fact, cell)| ((*fact).clone(), cell.clone()))
        .collect()
}

/// `baseScore` combination variable over `rank`: `A -> 1`, `B -> 2`.
pub(super) fn base_score_variable(fixture: &Fixture, rank: &AttributeDefinition) -> Variable {
    let variable = fixture
        .catalog
        .create_variable(VariableDraft::new(
            "baseScore",
            RuleKind::Value,
            RuleNature::Combination,
        ))
        .expect("variable created");
    fixture
        .catalog
        .set_facts(&variable.id, &[rank.id.clone()])
        .expect("facts linked");
    fixture
        .catalog
        .replace_variable_options(
            &variable.id,
            vec![
                OptionRowInput {
                    cells: cells(&[(&rank.id, Cell::option("A"))]),
                    value: "1".to_string(),
                },
                OptionRowInput {
                    cells: cells(&[(&rank.id, Cell::option("B"))]),
                    value: "2".to_string(),
                },
            ],
        )
        .expect("options replaced");
    variable
}

/// Create a score from the draft, link the variables, and publish it.
pub(super) fn active_score(fixture: &Fixture, draft: ScoreDraft, variables: &[&Variable]) -> Score {
    let score = fixture.catalog.create_score(draft).expect("score created");
    let ids: Vec<_> = variables.iter().map(|variable| variable.id.clone()).collect();
    fixture
        .catalog
        .set_linked_variables(&score.id, &ids)
        .expect("variables linked");
    fixture
        .catalog
        .publish(&score.id)
        .expect("score published")
        .score
}

pub(super) fn bonus_draft(from: Option<NaiveDate>, to: Option<NaiveDate>) -> ScoreDraft {
    ScoreDraft::new("bonus", "100")
        .with_category("nurse")
        .with_validity(Validity::new(from, to))
}

pub(super) fn target(person_id: &str, effective_date: NaiveDate) -> DecreeTarget {
    DecreeTarget {
        person_id: person(person_id),
        effective_date,
        hokm_type_id: None,
    }
}

#[derive(Default)]
pub(super) struct RecordingSink {
    archived: Mutex<Vec<(DecreeTarget, SimulationResult)>>,
}

impl RecordingSink {
    pub(super) fn archived(&self) -> Vec<(DecreeTarget, SimulationResult)> {
        self.archived.lock().expect("sink lock").clone()
    }
}

impl DecreeSink for RecordingSink {
    fn archive(&self, target: &DecreeTarget, result: &SimulationResult) -> Result<(), SinkError> {
        self.archived
            .lock()
            .expect("sink lock")
            .push((target.clone(), result.clone()));
        Ok(())
    }
}

pub(super) struct FailingSink;

impl DecreeSink for FailingSink {
    fn archive(&self, _target: &DecreeTarget, _result: &SimulationResult) -> Result<(), SinkError> {
        Err(SinkError::Unavailable("archive offline".to_string()))
    }
}

pub(super) fn values(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), *value))
        .collect()
}
