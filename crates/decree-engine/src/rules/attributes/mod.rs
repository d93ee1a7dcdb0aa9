//! Dynamically defined personnel attributes: definitions, typed values, visibility
//! dependencies, and the append-only change log.

pub mod dependency;
pub mod service;
pub(crate) mod validation;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

pub use dependency::{hidden, satisfied, visible_snapshot};
pub use service::{AttributeService, FieldView, ValueWrite};

/// Identifier wrapper for attribute definitions.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeId(pub String);

/// Identifier wrapper for enumerated attribute options.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AttributeOptionId(pub String);

/// Personnel record (or any other entity) owning attribute values.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

/// Household/family member of an entity; absent means the entity itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MemberId(pub String);

impl fmt::Display for AttributeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Declared storage type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    String,
    Real,
    Date,
    Bool,
    Json,
}

impl DataType {
    pub const fn label(self) -> &'static str {
        match self {
            DataType::String => "string",
            DataType::Real => "real",
            DataType::Date => "date",
            DataType::Bool => "bool",
            DataType::Json => "json",
        }
    }
}

/// A stored attribute value, tagged with the column it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum TypedValue {
    Str(String),
    Num(f64),
    Date(NaiveDate),
    Bool(bool),
    Json(serde_json::Value),
}

impl TypedValue {
    pub const fn data_type(&self) -> DataType {
        match self {
            TypedValue::Str(_) => DataType::String,
            TypedValue::Num(_) => DataType::Real,
            TypedValue::Date(_) => DataType::Date,
            TypedValue::Bool(_) => DataType::Bool,
            TypedValue::Json(_) => DataType::Json,
        }
    }

    /// JSON null is the only stored value that counts as "no value".
    pub fn is_null(&self) -> bool {
        matches!(self, TypedValue::Json(serde_json::Value::Null))
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            TypedValue::Num(value) => Some(*value),
            TypedValue::Bool(flag) => Some(if *flag { 1.0 } else { 0.0 }),
            TypedValue::Str(text) => text.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text form used when matching enumerated option ids.
    pub fn as_text(&self) -> Option<String> {
        match self {
            TypedValue::Str(text) => Some(text.clone()),
            TypedValue::Num(value) => Some(value.to_string()),
            TypedValue::Bool(flag) => Some(flag.to_string()),
            TypedValue::Date(date) => Some(date.format("%Y-%m-%d").to_string()),
            TypedValue::Json(_) => None,
        }
    }

    /// Lenient conversion from an untyped JSON scalar.
    pub fn from_json(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(text) => TypedValue::Str(text),
            serde_json::Value::Bool(flag) => TypedValue::Bool(flag),
            serde_json::Value::Number(number) => match number.as_f64() {
                Some(value) => TypedValue::Num(value),
                None => TypedValue::Json(serde_json::Value::Number(number)),
            },
            other => TypedValue::Json(other),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            TypedValue::Str(text) => serde_json::Value::String(text.clone()),
            TypedValue::Num(value) => serde_json::Number::from_f64(*value)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            TypedValue::Date(date) => {
                serde_json::Value::String(date.format("%Y-%m-%d").to_string())
            }
            TypedValue::Bool(flag) => serde_json::Value::Bool(*flag),
            TypedValue::Json(value) => value.clone(),
        }
    }
}

impl fmt::Display for TypedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypedValue::Str(text) => f.write_str(text),
            TypedValue::Num(value) => write!(f, "{value}"),
            TypedValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            TypedValue::Bool(flag) => write!(f, "{flag}"),
            TypedValue::Json(value) => write!(f, "{value}"),
        }
    }
}

/// Condition attached to an attribute's dependency.
///
/// Serialized in the legacy object shapes `{"equals": v}`, `{"in": [..]}` and
/// `{"notEquals": v}`. Any other shape reads back as [`DependencyCondition::Present`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "serde_json::Value", into = "serde_json::Value")]
pub enum DependencyCondition {
    Equals(TypedValue),
    In(Vec<TypedValue>),
    NotEquals(TypedValue),
    /// Satisfied by any non-null dependency value.
    Present,
}

impl From<serde_json::Value> for DependencyCondition {
    fn from(value: serde_json::Value) -> Self {
        let serde_json::Value::Object(mut object) = value else {
            return DependencyCondition::Present;
        };
        if let Some(expected) = object.remove("equals") {
            return DependencyCondition::Equals(TypedValue::from_json(expected));
        }
        if let Some(serde_json::Value::Array(values)) = object.remove("in") {
            return DependencyCondition::In(values.into_iter().map(TypedValue::from_json).collect());
        }
        if let Some(expected) = object.remove("notEquals") {
            return DependencyCondition::NotEquals(TypedValue::from_json(expected));
        }
        DependencyCondition::Present
    }
}

impl From<DependencyCondition> for serde_json::Value {
    fn from(condition: DependencyCondition) -> Self {
        match condition {
            DependencyCondition::Equals(value) => serde_json::json!({ "equals": value.to_json() }),
            DependencyCondition::In(values) => serde_json::json!({
                "in": values.iter().map(TypedValue::to_json).collect::<Vec<_>>()
            }),
            DependencyCondition::NotEquals(value) => {
                serde_json::json!({ "notEquals": value.to_json() })
            }
            DependencyCondition::Present => serde_json::json!({}),
        }
    }
}

/// Declarative validation applied to value writes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRules {
    #[serde(default)]
    pub required: bool,
    /// Lower bound: numeric value for reals, character count for strings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Optional dependency of one attribute on another attribute's current value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDependency {
    pub attribute_id: AttributeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<DependencyCondition>,
}

/// Metadata describing one dynamically defined attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDefinition {
    pub id: AttributeId,
    #[serde(default)]
    pub kind_id: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub data_type: DataType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<TypedValue>,
    #[serde(default)]
    pub validation: ValidationRules,
    pub is_visible: bool,
    pub is_editable: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depends_on: Option<AttributeDependency>,
}

/// Fields supplied when defining an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeDraft {
    #[serde(default)]
    pub kind_id: Option<String>,
    #[serde(default)]
    pub context_id: Option<String>,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub category: Option<String>,
    pub data_type: DataType,
    #[serde(default)]
    pub default_value: Option<TypedValue>,
    #[serde(default)]
    pub validation: ValidationRules,
    pub is_visible: bool,
    pub is_editable: bool,
    #[serde(default)]
    pub is_system: bool,
    #[serde(default)]
    pub depends_on: Option<AttributeDependency>,
}

impl AttributeDraft {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let name = name.into();
        Self {
            kind_id: None,
            context_id: None,
            display_name: name.clone(),
            name,
            category: None,
            data_type,
            default_value: None,
            validation: ValidationRules::default(),
            is_visible: true,
            is_editable: true,
            is_system: false,
            depends_on: None,
        }
    }

    pub fn depending_on(
        mut self,
        attribute_id: AttributeId,
        condition: Option<DependencyCondition>,
    ) -> Self {
        self.depends_on = Some(AttributeDependency {
            attribute_id,
            condition,
        });
        self
    }

    pub(crate) fn into_definition(self, id: AttributeId) -> AttributeDefinition {
        AttributeDefinition {
            id,
            kind_id: self.kind_id,
            context_id: self.context_id,
            name: self.name,
            display_name: self.display_name,
            category: self.category,
            data_type: self.data_type,
            default_value: self.default_value,
            validation: self.validation,
            is_visible: self.is_visible,
            is_editable: self.is_editable,
            is_system: self.is_system,
            depends_on: self.depends_on,
        }
    }
}

/// Partial update for an attribute definition; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttributePatch {
    pub display_name: Option<String>,
    pub category: Option<String>,
    pub default_value: Option<TypedValue>,
    pub validation: Option<ValidationRules>,
    pub is_visible: Option<bool>,
    pub is_editable: Option<bool>,
    pub depends_on: Option<AttributeDependency>,
}

impl AttributePatch {
    pub(crate) fn apply(self, definition: &mut AttributeDefinition) {
        if let Some(display_name) = self.display_name {
            definition.display_name = display_name;
        }
        if let Some(category) = self.category {
            definition.category = Some(category);
        }
        if let Some(default_value) = self.default_value {
            definition.default_value = Some(default_value);
        }
        if let Some(validation) = self.validation {
            definition.validation = validation;
        }
        if let Some(is_visible) = self.is_visible {
            definition.is_visible = is_visible;
        }
        if let Some(is_editable) = self.is_editable {
            definition.is_editable = is_editable;
        }
        if let Some(depends_on) = self.depends_on {
            definition.depends_on = Some(depends_on);
        }
    }
}

/// Enumerated choice of an attribute; fact option cells reference these ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub id: AttributeOptionId,
    pub attribute_id: AttributeId,
    pub label: String,
}

/// Option supplied when replacing an attribute's options; a missing id is generated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeOptionInput {
    #[serde(default)]
    pub id: Option<AttributeOptionId>,
    pub label: String,
}

impl AttributeOptionInput {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            id: None,
            label: label.into(),
        }
    }

    pub fn with_id(id: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            id: Some(AttributeOptionId(id.into())),
            label: label.into(),
        }
    }
}

/// One EAV row. At most one row exists per `(entity, attribute, member)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeValue {
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    pub attribute_id: AttributeId,
    pub value: TypedValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub option_id: Option<AttributeOptionId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_from: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_to: Option<NaiveDate>,
    pub updated_by: String,
    pub updated_at: DateTime<Utc>,
}

impl AttributeValue {
    pub fn is_current(&self, as_of: Option<NaiveDate>) -> bool {
        match as_of {
            Some(date) => {
                self.valid_from.map_or(true, |from| from <= date)
                    && self.valid_to.map_or(true, |to| date <= to)
            }
            None => true,
        }
    }
}

/// Immutable audit entry describing one value change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeChange {
    pub attribute_id: AttributeId,
    pub entity_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_id: Option<MemberId>,
    pub old_value: Option<TypedValue>,
    pub new_value: TypedValue,
    pub changed_by: String,
    pub changed_at: DateTime<Utc>,
}

/// Current values of one record keyed by attribute.
pub type ValueSnapshot = BTreeMap<AttributeId, TypedValue>;
