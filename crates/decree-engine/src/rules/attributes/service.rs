use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::dependency::{find_cycle, hidden, satisfied, visible_snapshot};
use super::validation::{validate_rules, validate_value};
use super::{
    AttributeChange, AttributeDefinition, AttributeDraft, AttributeId, AttributeOption,
    AttributeOptionId, AttributeOptionInput, AttributePatch, AttributeValue, EntityId, MemberId,
    TypedValue, ValueSnapshot,
};
use crate::rules::cascade::{cascade_attribute, CascadeReport};
use crate::rules::catalog::already_exists;
use crate::rules::composition::is_token;
use crate::rules::error::RuleError;
use crate::rules::repository::{AttributeTables, IdGenerator, RuleStore, ValueSnapshotProvider};

/// Parameters of a single value write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValueWrite {
    pub entity_id: EntityId,
    #[serde(default)]
    pub member_id: Option<MemberId>,
    pub attribute_id: AttributeId,
    pub value: TypedValue,
    #[serde(default)]
    pub valid_from: Option<NaiveDate>,
    #[serde(default)]
    pub valid_to: Option<NaiveDate>,
    pub actor: String,
}

impl ValueWrite {
    pub fn new(
        entity_id: EntityId,
        attribute_id: AttributeId,
        value: TypedValue,
        actor: impl Into<String>,
    ) -> Self {
        Self {
            entity_id,
            member_id: None,
            attribute_id,
            value,
            valid_from: None,
            valid_to: None,
            actor: actor.into(),
        }
    }

    pub fn for_member(mut self, member_id: MemberId) -> Self {
        self.member_id = Some(member_id);
        self
    }

    pub fn valid_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.valid_from = from;
        self.valid_to = to;
        self
    }
}

/// One attribute of a record as a form would render it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldView {
    pub attribute: AttributeDefinition,
    /// Stored value, falling back to the declared default. Always `None` when hidden.
    pub value: Option<TypedValue>,
    pub hidden: bool,
    pub editable: bool,
}

/// Attribute definitions, options, and per-record values.
pub struct AttributeService<S, G> {
    store: Arc<S>,
    ids: Arc<G>,
}

impl<S, G> AttributeService<S, G>
where
    S: RuleStore + 'static,
    G: IdGenerator + 'static,
{
    pub fn new(store: Arc<S>, ids: Arc<G>) -> Self {
        Self { store, ids }
    }

    pub fn create_attribute(&self, draft: AttributeDraft) -> Result<AttributeDefinition, RuleError> {
        let definition = draft.into_definition(AttributeId(self.ids.next_id("attr")));
        self.store.transaction(move |tables| {
            if tables.attribute(&definition.id).is_some() {
                return Err(already_exists("attribute", &definition.id.0));
            }
            check_definition(tables, &definition)?;
            tables.put_attribute(definition.clone());
            info!(attribute = %definition.id, name = %definition.name, "attribute created");
            Ok(definition)
        })
    }

    pub fn update_attribute(
        &self,
        id: &AttributeId,
        patch: AttributePatch,
    ) -> Result<AttributeDefinition, RuleError> {
        self.store.transaction(|tables| {
            let mut definition = tables
                .attribute(id)
                .ok_or_else(|| RuleError::not_found("attribute", id.0.clone()))?;
            patch.apply(&mut definition);
            check_definition(tables, &definition)?;
            tables.put_attribute(definition.clone());
            Ok(definition)
        })
    }

    /// Delete the definition after its dependency edges, fact links, options, and values.
    pub fn delete_attribute(&self, id: &AttributeId) -> Result<CascadeReport, RuleError> {
        self.store.transaction(|tables| {
            if tables.attribute(id).is_none() {
                return Err(RuleError::not_found("attribute", id.0.clone()));
            }
            let report = cascade_attribute(tables, id);
            tables.remove_attribute(id);
            info!(attribute = %id, ?report, "attribute deleted");
            Ok(report)
        })
    }

    pub fn attribute(&self, id: &AttributeId) -> Result<AttributeDefinition, RuleError> {
        self.store
            .read(|tables| tables.attribute(id))?
            .ok_or_else(|| RuleError::not_found("attribute", id.0.clone()))
    }

    /// Definitions ordered by name.
    pub fn list_attributes(&self) -> Result<Vec<AttributeDefinition>, RuleError> {
        let mut definitions = self.store.read(|tables| tables.attributes())?;
        definitions.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(definitions)
    }

    /// Full replace of the attribute's enumerated options.
    pub fn set_attribute_options(
        &self,
        attribute: &AttributeId,
        options: Vec<AttributeOptionInput>,
    ) -> Result<Vec<AttributeOption>, RuleError> {
        let options: Vec<AttributeOption> = options
            .into_iter()
            .map(|input| AttributeOption {
                id: input
                    .id
                    .unwrap_or_else(|| AttributeOptionId(self.ids.next_id("opt"))),
                attribute_id: attribute.clone(),
                label: input.label,
            })
            .collect();

        let mut seen = BTreeSet::new();
        for option in &options {
            if !is_token(&option.id.0) {
                return Err(RuleError::validation(format!(
                    "option id `{}` contains reserved characters",
                    option.id.0
                )));
            }
            if !seen.insert(option.id.clone()) {
                return Err(RuleError::validation(format!(
                    "option id `{}` is listed twice",
                    option.id.0
                )));
            }
        }

        self.store.transaction(move |tables| {
            if tables.attribute(attribute).is_none() {
                return Err(RuleError::not_found("attribute", attribute.0.clone()));
            }
            tables.clear_attribute_options(attribute);
            for option in &options {
                tables.insert_attribute_option(option.clone());
            }
            Ok(options)
        })
    }

    pub fn attribute_options(
        &self,
        attribute: &AttributeId,
    ) -> Result<Vec<AttributeOption>, RuleError> {
        Ok(self.store.read(|tables| tables.attribute_options(attribute))?)
    }

    /// Upsert a value as delete-then-insert, logging the change when it differs from the prior
    /// stored value.
    pub fn write_value(&self, write: ValueWrite) -> Result<AttributeValue, RuleError> {
        self.store.transaction(move |tables| {
            let definition = tables
                .attribute(&write.attribute_id)
                .ok_or_else(|| RuleError::not_found("attribute", write.attribute_id.0.clone()))?;

            if !definition.is_editable || !definition.is_visible {
                return Err(RuleError::ReadOnlyAttribute {
                    attribute: definition.name.clone(),
                });
            }

            let stored = snapshot_of(tables, &write.entity_id, write.member_id.as_ref(), None);
            let current = visible_snapshot(&tables.attributes(), &stored);
            if !satisfied(&definition, &current) {
                return Err(RuleError::DependencyUnsatisfied {
                    attribute: definition.name.clone(),
                });
            }

            let options = tables.attribute_options(&definition.id);
            validate_value(&definition, &write.value, &options)?;

            if let (Some(from), Some(to)) = (write.valid_from, write.valid_to) {
                if from > to {
                    return Err(RuleError::validation(format!(
                        "value of `{}` is valid from {from} after {to}",
                        definition.name
                    )));
                }
            }

            let option_id = match &write.value {
                TypedValue::Str(text) if !options.is_empty() => {
                    Some(AttributeOptionId(text.clone()))
                }
                _ => None,
            };

            let prior = tables.attribute_value(
                &write.entity_id,
                &write.attribute_id,
                write.member_id.as_ref(),
            );
            tables.delete_attribute_value(
                &write.entity_id,
                &write.attribute_id,
                write.member_id.as_ref(),
            );

            let now = Utc::now();
            let stored = AttributeValue {
                entity_id: write.entity_id.clone(),
                member_id: write.member_id.clone(),
                attribute_id: write.attribute_id.clone(),
                value: write.value.clone(),
                option_id,
                valid_from: write.valid_from,
                valid_to: write.valid_to,
                updated_by: write.actor.clone(),
                updated_at: now,
            };
            tables.insert_attribute_value(stored.clone());

            let old_value = prior.map(|row| row.value);
            if old_value.as_ref() != Some(&write.value) {
                tables.append_change(AttributeChange {
                    attribute_id: write.attribute_id.clone(),
                    entity_id: write.entity_id.clone(),
                    member_id: write.member_id.clone(),
                    old_value,
                    new_value: write.value.clone(),
                    changed_by: write.actor.clone(),
                    changed_at: now,
                });
                debug!(attribute = %write.attribute_id, entity = %write.entity_id.0, "attribute value changed");
            }

            Ok(stored)
        })
    }

    /// Stored values of a record, hidden ones included, restricted to rows valid at `as_of`.
    pub fn raw_values(
        &self,
        entity: &EntityId,
        member: Option<&MemberId>,
        as_of: Option<NaiveDate>,
    ) -> Result<ValueSnapshot, RuleError> {
        Ok(self
            .store
            .read(|tables| snapshot_of(tables, entity, member, as_of))?)
    }

    /// Values downstream consumers may read: defaults fill missing values and hidden attributes
    /// are dropped.
    pub fn current_values(
        &self,
        entity: &EntityId,
        member: Option<&MemberId>,
        as_of: Option<NaiveDate>,
    ) -> Result<ValueSnapshot, RuleError> {
        let fields = self.record_view(entity, member, as_of)?;
        Ok(fields
            .into_iter()
            .filter_map(|field| field.value.map(|value| (field.attribute.id, value)))
            .collect())
    }

    /// Every attribute of the record with its visibility and editability resolved.
    pub fn record_view(
        &self,
        entity: &EntityId,
        member: Option<&MemberId>,
        as_of: Option<NaiveDate>,
    ) -> Result<Vec<FieldView>, RuleError> {
        let (definitions, stored) = self.store.read(|tables| {
            (
                tables.attributes(),
                snapshot_of(tables, entity, member, as_of),
            )
        })?;
        let current = visible_snapshot(&definitions, &stored);

        let mut fields: Vec<FieldView> = definitions
            .into_iter()
            .map(|attribute| {
                let is_hidden = hidden(&attribute, &current);
                let value = if is_hidden {
                    None
                } else {
                    current
                        .get(&attribute.id)
                        .cloned()
                        .or_else(|| attribute.default_value.clone())
                };
                FieldView {
                    editable: !is_hidden && attribute.is_editable,
                    hidden: is_hidden,
                    value,
                    attribute,
                }
            })
            .collect();
        fields.sort_by(|a, b| a.attribute.name.cmp(&b.attribute.name));
        Ok(fields)
    }

    /// Audit entries of the record in write order.
    pub fn change_log(&self, entity: &EntityId) -> Result<Vec<AttributeChange>, RuleError> {
        Ok(self.store.read(|tables| tables.change_log(entity))?)
    }
}

impl<S, G> ValueSnapshotProvider for AttributeService<S, G>
where
    S: RuleStore + 'static,
    G: IdGenerator + 'static,
{
    fn values(
        &self,
        entity: &EntityId,
        as_of: Option<NaiveDate>,
    ) -> Result<ValueSnapshot, RuleError> {
        self.current_values(entity, None, as_of)
    }
}

fn snapshot_of<T: AttributeTables>(
    tables: &T,
    entity: &EntityId,
    member: Option<&MemberId>,
    as_of: Option<NaiveDate>,
) -> ValueSnapshot {
    tables
        .entity_values(entity, member)
        .into_iter()
        .filter(|row| row.is_current(as_of))
        .map(|row| (row.attribute_id, row.value))
        .collect()
}

fn check_definition<T: AttributeTables>(
    tables: &T,
    definition: &AttributeDefinition,
) -> Result<(), RuleError> {
    if definition.name.trim().is_empty() {
        return Err(RuleError::validation("attribute name is required"));
    }
    validate_rules(definition)?;

    let Some(dependency) = &definition.depends_on else {
        return Ok(());
    };
    if dependency.attribute_id == definition.id {
        return Err(RuleError::validation(format!(
            "`{}` cannot depend on itself",
            definition.name
        )));
    }
    if tables.attribute(&dependency.attribute_id).is_none() {
        return Err(RuleError::not_found(
            "attribute",
            dependency.attribute_id.0.clone(),
        ));
    }

    let definitions: BTreeMap<AttributeId, AttributeDefinition> = tables
        .attributes()
        .into_iter()
        .map(|existing| (existing.id.clone(), existing))
        .collect();
    if let Some(chain) = find_cycle(&definition.id, &dependency.attribute_id, &definitions) {
        let chain: Vec<&str> = chain.iter().map(|id| id.0.as_str()).collect();
        return Err(RuleError::validation(format!(
            "dependency cycle: {}",
            chain.join(" -> ")
        )));
    }
    Ok(())
}
