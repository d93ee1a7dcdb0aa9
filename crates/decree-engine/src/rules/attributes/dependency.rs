use std::collections::{BTreeMap, BTreeSet};

use super::{AttributeDefinition, AttributeId, DependencyCondition, ValueSnapshot};

/// Whether the attribute's dependency holds for the given record snapshot.
///
/// An attribute without a dependency is always satisfied. A dependency whose value is absent or
/// null is never satisfied.
pub fn satisfied(attribute: &AttributeDefinition, current: &ValueSnapshot) -> bool {
    let Some(dependency) = &attribute.depends_on else {
        return true;
    };

    let Some(value) = current.get(&dependency.attribute_id) else {
        return false;
    };
    if value.is_null() {
        return false;
    }

    match &dependency.condition {
        Some(DependencyCondition::Equals(expected)) => value == expected,
        Some(DependencyCondition::In(candidates)) => candidates.contains(value),
        Some(DependencyCondition::NotEquals(expected)) => value != expected,
        Some(DependencyCondition::Present) | None => true,
    }
}

/// Hidden attributes are neither editable nor surfaced as the record's current value.
pub fn hidden(attribute: &AttributeDefinition, current: &ValueSnapshot) -> bool {
    !attribute.is_visible || !satisfied(attribute, current)
}

/// The record's values with every hidden attribute removed, repeated until stable so that a
/// hidden attribute never satisfies the attributes depending on it.
pub fn visible_snapshot(
    definitions: &[AttributeDefinition],
    stored: &ValueSnapshot,
) -> ValueSnapshot {
    let mut current = stored.clone();
    loop {
        let newly_hidden: Vec<AttributeId> = definitions
            .iter()
            .filter(|definition| current.contains_key(&definition.id) && hidden(definition, &current))
            .map(|definition| definition.id.clone())
            .collect();
        if newly_hidden.is_empty() {
            return current;
        }
        for id in newly_hidden {
            current.remove(&id);
        }
    }
}

/// Returns the dependency chain that loops back to `start`, if declaring `start -> target`
/// would close a cycle.
pub(crate) fn find_cycle(
    start: &AttributeId,
    target: &AttributeId,
    definitions: &BTreeMap<AttributeId, AttributeDefinition>,
) -> Option<Vec<AttributeId>> {
    let mut chain = vec![start.clone()];
    let mut seen = BTreeSet::new();
    let mut cursor = Some(target.clone());

    while let Some(current) = cursor {
        chain.push(current.clone());
        if &current == start {
            return Some(chain);
        }
        if !seen.insert(current.clone()) {
            return None;
        }
        cursor = definitions
            .get(&current)
            .and_then(|definition| definition.depends_on.as_ref())
            .map(|dependency| dependency.attribute_id.clone());
    }

    None
}
