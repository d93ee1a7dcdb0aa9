//! Payroll decree rule engine: dynamic attributes, variable/score decision tables, publishing,
//! and simulation of decree line items.

pub mod config;
pub mod error;
pub mod rules;
pub mod telemetry;
