//! Ordered cleanup of dependent rows, run inside the delete transaction before the root row goes.

use super::attributes::AttributeId;
use super::domain::{ScoreId, VariableId};
use super::repository::{AttributeTables, CatalogTables};

/// One dependent-table cleanup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CascadeStep {
    FactLinks,
    VariableOptions,
    ScoreVariableLinks,
    ScoreOptions,
    DecreeValues,
    DependencyEdges,
    FactLinksToAttribute,
    AttributeOptions,
    AttributeValues,
}

pub const VARIABLE_CASCADE: &[CascadeStep] = &[
    CascadeStep::FactLinks,
    CascadeStep::VariableOptions,
    CascadeStep::ScoreVariableLinks,
];

pub const SCORE_CASCADE: &[CascadeStep] = &[
    CascadeStep::ScoreVariableLinks,
    CascadeStep::ScoreOptions,
    CascadeStep::DecreeValues,
];

pub const ATTRIBUTE_CASCADE: &[CascadeStep] = &[
    CascadeStep::DependencyEdges,
    CascadeStep::FactLinksToAttribute,
    CascadeStep::AttributeOptions,
    CascadeStep::AttributeValues,
];

/// Rows removed per step, in plan order.
pub type CascadeReport = Vec<(CascadeStep, usize)>;

pub(crate) fn cascade_variable<T: CatalogTables>(tables: &mut T, id: &VariableId) -> CascadeReport {
    VARIABLE_CASCADE
        .iter()
        .map(|step| {
            let removed = match step {
                CascadeStep::FactLinks => tables.clear_fact_links(id),
                CascadeStep::VariableOptions => tables.clear_variable_options(id),
                CascadeStep::ScoreVariableLinks => tables.clear_variable_scores(id),
                _ => 0,
            };
            (*step, removed)
        })
        .collect()
}

pub(crate) fn cascade_score<T: CatalogTables>(tables: &mut T, id: &ScoreId) -> CascadeReport {
    SCORE_CASCADE
        .iter()
        .map(|step| {
            let removed = match step {
                CascadeStep::ScoreVariableLinks => tables.clear_score_variables(id),
                CascadeStep::ScoreOptions => tables.clear_score_options(id),
                CascadeStep::DecreeValues => tables.clear_decree_values(id),
                _ => 0,
            };
            (*step, removed)
        })
        .collect()
}

pub(crate) fn cascade_attribute<T: CatalogTables + AttributeTables>(
    tables: &mut T,
    id: &AttributeId,
) -> CascadeReport {
    ATTRIBUTE_CASCADE
        .iter()
        .map(|step| {
            let removed = match step {
                CascadeStep::DependencyEdges => tables.clear_dependents(id),
                CascadeStep::FactLinksToAttribute => tables.clear_fact_links_to(id),
                CascadeStep::AttributeOptions => tables.clear_attribute_options(id),
                CascadeStep::AttributeValues => tables.clear_attribute_values(id),
                _ => 0,
            };
            (*step, removed)
        })
        .collect()
}
