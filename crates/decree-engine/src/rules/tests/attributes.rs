use super::common::*;
use crate::rules::attributes::{
    AttributeDraft, AttributeId, AttributePatch, DataType, DependencyCondition, TypedValue,
    ValidationRules, ValueWrite,
};
use crate::rules::cascade::CascadeStep;
use crate::rules::domain::{RuleKind, RuleNature, VariableDraft};
use crate::rules::RuleError;

fn marital_and_spouse(fixture: &Fixture) -> (AttributeId, AttributeId) {
    let marital = string_attribute(fixture, "marital_status");
    let spouse = fixture
        .attributes
        .create_attribute(
            AttributeDraft::new("spouse_name", DataType::String).depending_on(
                marital.id.clone(),
                Some(DependencyCondition::Equals(text("married"))),
            ),
        )
        .expect("dependent attribute created");
    (marital.id, spouse.id)
}

#[test]
fn writing_the_same_value_twice_logs_once() {
    let fixture = fixture();
    let name = string_attribute(&fixture, "first_name");
    let employee = person("emp-1");

    write(&fixture, &employee, &name.id, text("Sara")).expect("first write");
    write(&fixture, &employee, &name.id, text("Sara")).expect("second write");

    let tables = fixture.store.snapshot().expect("snapshot");
    assert_eq!(tables.attribute_values.len(), 1);
    let log = fixture.attributes.change_log(&employee).expect("log");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].old_value, None);
}

#[test]
fn changed_value_logs_prior_value() {
    let fixture = fixture();
    let name = string_attribute(&fixture, "first_name");
    let employee = person("emp-1");

    write(&fixture, &employee, &name.id, text("Sara")).expect("first write");
    write(&fixture, &employee, &name.id, text("Sarah")).expect("second write");

    let log = fixture.attributes.change_log(&employee).expect("log");
    assert_eq!(log.len(), 2);
    assert_eq!(log[1].old_value, Some(text("Sara")));
    assert_eq!(log[1].new_value, text("Sarah"));
    assert_eq!(log[1].changed_by, "hr-admin");

    let current = fixture
        .attributes
        .raw_values(&employee, None, None)
        .expect("values");
    assert_eq!(current.get(&name.id), Some(&text("Sarah")));
}

#[test]
fn write_to_unsatisfied_dependency_is_rejected() {
    let fixture = fixture();
    let (marital, spouse) = marital_and_spouse(&fixture);
    let employee = person("emp-2");

    match write(&fixture, &employee, &spouse, text("Reza")) {
        Err(RuleError::DependencyUnsatisfied { attribute }) => {
            assert_eq!(attribute, "spouse_name")
        }
        other => panic!("expected dependency error, got {other:?}"),
    }

    write(&fixture, &employee, &marital, text("married")).expect("marital written");
    write(&fixture, &employee, &spouse, text("Reza")).expect("spouse accepted once married");
}

#[test]
fn read_only_and_invisible_attributes_reject_writes() {
    let fixture = fixture();
    let mut locked = AttributeDraft::new("national_code", DataType::String);
    locked.is_editable = false;
    let locked = fixture
        .attributes
        .create_attribute(locked)
        .expect("locked attribute");
    let mut internal = AttributeDraft::new("internal_note", DataType::String);
    internal.is_visible = false;
    let internal = fixture
        .attributes
        .create_attribute(internal)
        .expect("internal attribute");
    let employee = person("emp-3");

    for attribute in [&locked.id, &internal.id] {
        match write(&fixture, &employee, attribute, text("x")) {
            Err(RuleError::ReadOnlyAttribute { .. }) => {}
            other => panic!("expected read-only error, got {other:?}"),
        }
    }
}

#[test]
fn unknown_attribute_is_not_found() {
    let fixture = fixture();
    let err = write(
        &fixture,
        &person("emp-4"),
        &AttributeId("missing".into()),
        text("x"),
    )
    .unwrap_err();
    assert_eq!(err.kind(), crate::rules::ErrorKind::NotFound);
}

#[test]
fn value_must_match_declared_type_and_rules() {
    let fixture = fixture();
    let mut years = AttributeDraft::new("service_years", DataType::Real);
    years.validation = ValidationRules {
        min: Some(0.0),
        max: Some(40.0),
        ..ValidationRules::default()
    };
    let years = fixture.attributes.create_attribute(years).expect("created");
    let employee = person("emp-5");

    let mismatch = write(&fixture, &employee, &years.id, text("12")).unwrap_err();
    assert_eq!(mismatch.kind(), crate::rules::ErrorKind::Validation);
    let too_large = write(&fixture, &employee, &years.id, TypedValue::Num(41.0)).unwrap_err();
    assert_eq!(too_large.kind(), crate::rules::ErrorKind::Validation);
    write(&fixture, &employee, &years.id, TypedValue::Num(12.0)).expect("in range");
}

#[test]
fn enumerated_attribute_requires_known_option_id() {
    let fixture = fixture();
    let rank = rank_attribute(&fixture);
    let employee = person("emp-6");

    assert!(write(&fixture, &employee, &rank.id, text("C")).is_err());
    let stored = fixture
        .attributes
        .write_value(ValueWrite::new(employee.clone(), rank.id.clone(), text("B"), "hr-admin"))
        .expect("known option accepted");
    assert_eq!(stored.option_id.map(|id| id.0), Some("B".to_string()));
}

#[test]
fn dependency_cycles_are_rejected() {
    let fixture = fixture();
    let (marital, spouse) = marital_and_spouse(&fixture);

    let patch = AttributePatch {
        depends_on: Some(crate::rules::attributes::AttributeDependency {
            attribute_id: spouse.clone(),
            condition: None,
        }),
        ..AttributePatch::default()
    };
    let err = fixture
        .attributes
        .update_attribute(&marital, patch)
        .unwrap_err();
    assert!(err.to_string().contains("dependency cycle"), "{err}");
}

#[test]
fn dependency_must_reference_existing_attribute() {
    let fixture = fixture();
    let draft = AttributeDraft::new("child_school", DataType::String)
        .depending_on(AttributeId("ghost".into()), None);
    let err = fixture.attributes.create_attribute(draft).unwrap_err();
    assert_eq!(err.kind(), crate::rules::ErrorKind::NotFound);
}

#[test]
fn record_view_hides_values_behind_unsatisfied_dependency() {
    let fixture = fixture();
    let (marital, spouse) = marital_and_spouse(&fixture);
    let employee = person("emp-7");

    write(&fixture, &employee, &marital, text("married")).expect("married");
    write(&fixture, &employee, &spouse, text("Reza")).expect("spouse");
    write(&fixture, &employee, &marital, text("single")).expect("single");

    let view = fixture
        .attributes
        .record_view(&employee, None, None)
        .expect("view");
    let spouse_field = view
        .iter()
        .find(|field| field.attribute.id == spouse)
        .expect("spouse field present");
    assert!(spouse_field.hidden);
    assert!(!spouse_field.editable);
    assert_eq!(spouse_field.value, None);

    let current = fixture
        .attributes
        .current_values(&employee, None, None)
        .expect("current values");
    assert!(!current.contains_key(&spouse));
    assert_eq!(current.get(&marital), Some(&text("single")));
}

#[test]
fn snapshots_honour_value_validity() {
    let fixture = fixture();
    let grade = string_attribute(&fixture, "grade");
    let employee = person("emp-8");
    fixture
        .attributes
        .write_value(
            ValueWrite::new(employee.clone(), grade.id.clone(), text("G3"), "hr-admin")
                .valid_between(Some(date(2024, 1, 1)), Some(date(2024, 12, 31))),
        )
        .expect("dated value");

    let inside = fixture
        .attributes
        .raw_values(&employee, None, Some(date(2024, 6, 1)))
        .expect("values");
    let outside = fixture
        .attributes
        .raw_values(&employee, None, Some(date(2025, 6, 1)))
        .expect("values");
    assert_eq!(inside.get(&grade.id), Some(&text("G3")));
    assert!(outside.is_empty());
}

#[test]
fn deleting_attribute_cascades_to_dependents_links_and_values() {
    let fixture = fixture();
    let (marital, spouse) = marital_and_spouse(&fixture);
    let employee = person("emp-9");
    write(&fixture, &employee, &marital, text("married")).expect("value");

    let variable = fixture
        .catalog
        .create_variable(VariableDraft::new(
            "familyAllowance",
            RuleKind::Value,
            RuleNature::Condition,
        ))
        .expect("variable");
    fixture
        .catalog
        .set_facts(&variable.id, &[marital.clone()])
        .expect("facts");

    let report = fixture
        .attributes
        .delete_attribute(&marital)
        .expect("deleted");
    assert_eq!(
        report,
        vec![
            (CascadeStep::DependencyEdges, 1),
            (CascadeStep::FactLinksToAttribute, 1),
            (CascadeStep::AttributeOptions, 0),
            (CascadeStep::AttributeValues, 1),
        ]
    );

    let spouse_definition = fixture.attributes.attribute(&spouse).expect("spouse kept");
    assert_eq!(spouse_definition.depends_on, None);
    assert!(fixture.catalog.facts(&variable.id).expect("facts").is_empty());
    assert!(fixture.attributes.attribute(&marital).is_err());
}

#[test]
fn change_log_survives_attribute_deletion() {
    let fixture = fixture();
    let name = string_attribute(&fixture, "nickname");
    let employee = person("emp-10");
    write(&fixture, &employee, &name.id, text("Ali")).expect("value");

    fixture.attributes.delete_attribute(&name.id).expect("deleted");
    assert_eq!(fixture.attributes.change_log(&employee).expect("log").len(), 1);
}

#[test]
fn hidden_attributes_do_not_satisfy_their_dependents() {
    let fixture = fixture();
    let employed = string_attribute(&fixture, "employed");
    let marital = fixture
        .attributes
        .create_attribute(
            AttributeDraft::new("marital_status", DataType::String)
                .depending_on(employed.id.clone(), Some(DependencyCondition::Equals(text("yes")))),
        )
        .expect("marital");
    let spouse = fixture
        .attributes
        .create_attribute(
            AttributeDraft::new("spouse_name", DataType::String).depending_on(
                marital.id.clone(),
                Some(DependencyCondition::Equals(text("married"))),
            ),
        )
        .expect("spouse");
    let employee = person("emp-9");

    write(&fixture, &employee, &employed.id, text("yes")).expect("employed");
    write(&fixture, &employee, &marital.id, text("married")).expect("marital");
    write(&fixture, &employee, &spouse.id, text("Reza")).expect("spouse");
    write(&fixture, &employee, &employed.id, text("no")).expect("no longer employed");

    let current = fixture
        .attributes
        .current_values(&employee, None, None)
        .expect("current");
    assert_eq!(current.get(&employed.id), Some(&text("no")));
    assert!(!current.contains_key(&marital.id));
    assert!(!current.contains_key(&spouse.id));

    let view = fixture
        .attributes
        .record_view(&employee, None, None)
        .expect("view");
    let spouse_field = view
        .iter()
        .find(|field| field.attribute.id == spouse.id)
        .expect("spouse field");
    assert!(spouse_field.hidden);
    assert!(!spouse_field.editable);

    match write(&fixture, &employee, &spouse.id, text("Ali")) {
        Err(RuleError::DependencyUnsatisfied { attribute }) => assert_eq!(attribute, "spouse_name"),
        other => panic!("expected dependency error, got {other:?}"),
    }

    let raw = fixture
        .attributes
        .raw_values(&employee, None, None)
        .expect("raw");
    assert_eq!(raw.get(&spouse.id), Some(&text("Reza")));
}

#[test]
fn restarted_sequence_cannot_replace_an_attribute() {
    let fixture = fixture();
    let first = string_attribute(&fixture, "first_name");
    let restarted = crate::rules::AttributeService::new(
        fixture.store.clone(),
        std::sync::Arc::new(crate::rules::SequentialIdGenerator::default()),
    );
    match restarted.create_attribute(AttributeDraft::new("last_name", DataType::String)) {
        Err(RuleError::Validation(message)) => assert!(message.contains("already exists"), "{message}"),
        other => panic!("expected validation error, got {other:?}"),
    }
    assert_eq!(
        fixture.attributes.attribute(&first.id).expect("kept").name,
        "first_name"
    );
}
