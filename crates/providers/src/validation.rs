//! Fail-fast payload checks shared by the adapters.
//!
//! All helpers treat a missing or `null` field as "not provided" and only
//! reject values that are present and out of bounds.

use genjob_core::job::JobError;
use serde_json::Value;

fn present<'a>(payload: &'a Value, field: &str) -> Option<&'a Value> {
    payload.get(field).filter(|v| !v.is_null())
}

/// Render a scalar as text so `5` and `"5"` compare equal.
fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// A numeric field, when present, must lie in `[min, max]`.
pub(crate) fn number_in_range(
    payload: &Value,
    field: &str,
    min: f64,
    max: f64,
) -> Result<(), JobError> {
    let Some(value) = present(payload, field) else {
        return Ok(());
    };
    let number = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n >= min && n <= max => Ok(()),
        Some(n) => Err(JobError::validation(format!(
            "'{field}' must be between {min} and {max}, got {n}"
        ))),
        None => Err(JobError::validation(format!("'{field}' must be a number"))),
    }
}

/// A scalar field, when present, must be one of `allowed`.
pub(crate) fn one_of(payload: &Value, field: &str, allowed: &[&str]) -> Result<(), JobError> {
    let Some(value) = present(payload, field) else {
        return Ok(());
    };
    match as_text(value) {
        Some(text) if allowed.contains(&text.as_str()) => Ok(()),
        _ => Err(JobError::validation(format!(
            "Invalid '{field}' value {value}. Must be one of: {}",
            allowed.join(", ")
        ))),
    }
}

/// A string field, when present, must not exceed `max` characters.
pub(crate) fn max_chars(payload: &Value, field: &str, max: usize) -> Result<(), JobError> {
    match present(payload, field) {
        None => Ok(()),
        Some(Value::String(s)) if s.chars().count() <= max => Ok(()),
        Some(Value::String(_)) => Err(JobError::validation(format!(
            "'{field}' must be at most {max} characters"
        ))),
        Some(_) => Err(JobError::validation(format!("'{field}' must be a string"))),
    }
}

/// At least one of `fields` must be present and non-empty.
pub(crate) fn require_any(payload: &Value, fields: &[&str]) -> Result<(), JobError> {
    let found = fields.iter().any(|f| match present(payload, f) {
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(_) => true,
        None => false,
    });
    if found {
        Ok(())
    } else if fields.len() == 1 {
        Err(JobError::validation(format!("'{}' is required", fields[0])))
    } else {
        Err(JobError::validation(format!(
            "One of {} is required",
            fields.join(", ")
        )))
    }
}

/// A field group is "used" when any of its fields is present.
pub(crate) struct ExclusiveGroup<'a> {
    pub name: &'a str,
    pub fields: &'a [&'a str],
}

/// No two groups may be used together.
pub(crate) fn mutually_exclusive(
    payload: &Value,
    groups: &[ExclusiveGroup<'_>],
) -> Result<(), JobError> {
    let used: Vec<&str> = groups
        .iter()
        .filter(|g| g.fields.iter().any(|f| present(payload, f).is_some()))
        .map(|g| g.name)
        .collect();
    if used.len() > 1 {
        return Err(JobError::validation(format!(
            "{} cannot be combined",
            used.join(" and ")
        )));
    }
    Ok(())
}
