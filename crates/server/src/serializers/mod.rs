//! Wire representations for goals, tasks and resources.
//!
//! Request payloads deserialize loosely (every field optional) and are then
//! validated into a set of changes, collecting one list of messages per
//! field. The same changes type serves create (`partial = false`), full
//! replacement (`partial = false`, omitted optional fields keep their value)
//! and partial update (`partial = true`).

pub mod goal;
pub mod resource;
pub mod task;

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};

pub use goal::GoalPayload;
pub use resource::ResourcePayload;
pub use task::TaskPayload;

pub const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NULL: &str = "This field may not be null.";

/// Offset-less datetimes are read as UTC.
const NAIVE_DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Field name to messages, rendered as `{"title": ["This field is required."]}`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[cfg(test)]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Invalid(self))
        }
    }
}

/// Keeps "absent" and "explicit null" apart: absent stays `None` through
/// `#[serde(default)]`, null becomes `Some(None)`.
pub fn nullable<'de, D, T>(deserializer: D) -> std::result::Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Unwraps a present value of a field that does not accept null.
fn non_null<T>(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<T>>,
) -> Option<T> {
    match value? {
        Some(value) => Some(value),
        None => {
            errors.add(field, NULL);
            None
        }
    }
}

/// A required, non-blank text field, trimmed.
fn required_text(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<String>>,
    partial: bool,
    max_len: usize,
) -> Option<String> {
    if value.is_none() && !partial {
        errors.add(field, REQUIRED);
    }
    let value = non_null(errors, field, value)?;

    let value = value.trim();
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }
    check_length(errors, field, value, max_len)
}

/// An optional text field where blank is a legal value.
fn blank_text(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<String>>,
    max_len: Option<usize>,
) -> Option<String> {
    let value = non_null(errors, field, value)?;
    let value = value.trim();
    match max_len {
        Some(max_len) => check_length(errors, field, value, max_len),
        None => Some(value.to_string()),
    }
}

fn check_length(
    errors: &mut FieldErrors,
    field: &'static str,
    value: &str,
    max_len: usize,
) -> Option<String> {
    if value.chars().count() > max_len {
        errors.add(
            field,
            format!("Ensure this field has no more than {max_len} characters."),
        );
        return None;
    }
    Some(value.to_string())
}

/// A field restricted to a fixed set of values.
fn choice<C: std::str::FromStr>(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<String>>,
) -> Option<C> {
    let value = non_null(errors, field, value)?;
    match value.parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            errors.add(field, format!("\"{value}\" is not a valid choice."));
            None
        }
    }
}

/// `YYYY-MM-DD`; null or an empty string clears the date.
fn nullable_date(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<String>>,
) -> Option<Option<String>> {
    let value = value?;
    let Some(raw) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Some(None);
    };

    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(Some(date.format("%Y-%m-%d").to_string())),
        Err(_) => {
            errors.add(
                field,
                "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.",
            );
            None
        }
    }
}

/// The `goal` a task or resource hangs off, trimmed. Required on create and
/// replace; blank counts as null. Existence and ownership are checked later.
fn goal_reference(
    errors: &mut FieldErrors,
    value: Option<Option<String>>,
    partial: bool,
) -> Option<String> {
    if value.is_none() && !partial {
        errors.add("goal", REQUIRED);
    }
    let value = value.map(|goal| goal.map(|g| g.trim().to_string()).filter(|g| !g.is_empty()));
    non_null(errors, "goal", value)
}

/// An ISO 8601 datetime normalized to UTC, offset-less values taken as UTC;
/// null or an empty string clears it.
fn nullable_datetime(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<String>>,
) -> Option<Option<String>> {
    let value = value?;
    let Some(raw) = value.as_deref().map(str::trim).filter(|v| !v.is_empty()) else {
        return Some(None);
    };

    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NAIVE_DATETIME_FORMATS
                .iter()
                .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
                .map(|at| at.and_utc())
        });

    match parsed {
        Some(at) => Some(Some(at.to_rfc3339_opts(SecondsFormat::Micros, true))),
        None => {
            errors.add(
                field,
                "Datetime has wrong format. Use one of these formats instead: \
                 YYYY-MM-DDThh:mm[:ss[.uuuuuu]][+HH:MM|-HH:MM|Z].",
            );
            None
        }
    }
}

/// A 32-bit integer given as a JSON number or numeric string, integral
/// floats included; null or an empty string clears it.
fn nullable_integer(
    errors: &mut FieldErrors,
    field: &'static str,
    value: Option<Option<Value>>,
) -> Option<Option<i32>> {
    let value = value?;
    let parsed = match &value {
        None => return Some(None),
        Some(Value::String(s)) if s.trim().is_empty() => return Some(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        Some(Value::Number(n)) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Some(_) => None,
    };

    let Some(parsed) = parsed else {
        errors.add(field, "A valid integer is required.");
        return None;
    };

    match i32::try_from(parsed) {
        Ok(v) => Some(Some(v)),
        Err(_) if parsed > 0 => {
            errors.add(
                field,
                format!("Ensure this value is less than or equal to {}.", i32::MAX),
            );
            None
        }
        Err(_) => {
            errors.add(
                field,
                format!("Ensure this value is greater than or equal to {}.", i32::MIN),
            );
            None
        }
    }
}

fn integral(value: f64) -> Option<i64> {
    // Out-of-range values saturate, which the i32 bounds check then rejects
    (value.is_finite() && value.fract() == 0.0).then_some(value as i64)
}
