use regex::Regex;

use super::{AttributeDefinition, AttributeOption, DataType, TypedValue, ValidationRules};
use crate::rules::error::RuleError;

/// Check a candidate value against the attribute's declared type and validation rules.
pub(crate) fn validate_value(
    definition: &AttributeDefinition,
    value: &TypedValue,
    options: &[AttributeOption],
) -> Result<(), RuleError> {
    let name = &definition.name;

    if value.is_null() {
        if definition.validation.required {
            return Err(RuleError::validation(format!("`{name}` is required")));
        }
        return Ok(());
    }

    if value.data_type() != definition.data_type {
        return Err(RuleError::validation(format!(
            "`{name}` expects a {} value, got {}",
            definition.data_type.label(),
            value.data_type().label()
        )));
    }

    let rules = &definition.validation;
    match value {
        TypedValue::Str(text) => {
            if rules.required && text.trim().is_empty() {
                return Err(RuleError::validation(format!("`{name}` is required")));
            }
            let length = text.chars().count() as f64;
            check_bounds(name, "length", length, rules)?;
            if let Some(pattern) = &rules.pattern {
                let regex = compile_pattern(name, pattern)?;
                if !regex.is_match(text) {
                    return Err(RuleError::validation(format!(
                        "`{name}` does not match pattern `{pattern}`"
                    )));
                }
            }
            if let Some(allowed) = &rules.options {
                if !allowed.iter().any(|candidate| candidate == text) {
                    return Err(RuleError::validation(format!(
                        "`{name}` must be one of [{}]",
                        allowed.join(", ")
                    )));
                }
            }
            if !options.is_empty() && !options.iter().any(|option| option.id.0 == *text) {
                return Err(RuleError::validation(format!(
                    "`{text}` is not an option of `{name}`"
                )));
            }
        }
        TypedValue::Num(number) => {
            if !number.is_finite() {
                return Err(RuleError::validation(format!(
                    "`{name}` must be a finite number"
                )));
            }
            check_bounds(name, "value", *number, rules)?;
        }
        TypedValue::Date(_) | TypedValue::Bool(_) | TypedValue::Json(_) => {}
    }

    Ok(())
}

/// Check the rules themselves when a definition is saved.
pub(crate) fn validate_rules(definition: &AttributeDefinition) -> Result<(), RuleError> {
    let rules = &definition.validation;
    if let (Some(min), Some(max)) = (rules.min, rules.max) {
        if min > max {
            return Err(RuleError::validation(format!(
                "`{}` has min {min} greater than max {max}",
                definition.name
            )));
        }
    }
    if let Some(pattern) = &rules.pattern {
        if definition.data_type != DataType::String {
            return Err(RuleError::validation(format!(
                "`{}` declares a pattern but is not a string attribute",
                definition.name
            )));
        }
        compile_pattern(&definition.name, pattern)?;
    }
    if let Some(default) = &definition.default_value {
        validate_value(definition, default, &[])?;
    }
    Ok(())
}

fn check_bounds(
    name: &str,
    measure: &str,
    actual: f64,
    rules: &ValidationRules,
) -> Result<(), RuleError> {
    if let Some(min) = rules.min {
        if actual < min {
            return Err(RuleError::validation(format!(
                "`{name}` {measure} {actual} is below minimum {min}"
            )));
        }
    }
    if let Some(max) = rules.max {
        if actual > max {
            return Err(RuleError::validation(format!(
                "`{name}` {measure} {actual} exceeds maximum {max}"
            )));
        }
    }
    Ok(())
}

fn compile_pattern(name: &str, pattern: &str) -> Result<Regex, RuleError> {
    Regex::new(pattern).map_err(|err| {
        RuleError::validation(format!("`{name}` has an invalid pattern `{pattern}`: {err}"))
    })
}
