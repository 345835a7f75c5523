//! Field-level typing for snapshot records.
//!
//! Everything here is soft-fail: a bad field yields a [`FieldParseError`] that
//! the caller replaces with a default. Nothing in this module drops a record.

use anyhow::Result;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use polars::prelude::*;
use serde_json::{Map, Value};

use crate::error::FieldParseError;
use crate::models::{CleanedRecord, columns};

/// Canonical text form written for normalized timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y/%m/%d %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%Y%m%d"];

/// Parse an embedded JSON object, undoing the doubled-quote escaping that
/// CSV round trips leave behind (`{""a"": 1}`).
pub fn parse_embedded_document(raw: &str) -> Result<Map<String, Value>, FieldParseError> {
    let collapsed = raw.replace("\"\"", "\"");

    let parsed = serde_json::from_str::<Value>(collapsed.trim())
        .or_else(|_| serde_json::from_str::<Value>(raw.trim()))
        .map_err(|e| FieldParseError::Document(e.to_string()))?;

    match parsed {
        Value::Object(map) => Ok(map),
        other => Err(FieldParseError::Document(format!(
            "expected an object, found {}",
            json_kind(&other)
        ))),
    }
}

/// Total version of [`parse_embedded_document`]: absent or malformed input
/// becomes an empty document.
pub fn tolerant_document(raw: Option<&str>) -> Map<String, Value> {
    raw.and_then(|s| parse_embedded_document(s).ok())
        .unwrap_or_default()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

pub fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, FieldParseError> {
    let trimmed = raw.trim();

    for format in DATETIME_FORMATS {
        if let Ok(ts) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(ts);
        }
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.naive_utc());
    }

    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            if let Some(ts) = date.and_hms_opt(0, 0, 0) {
                return Ok(ts);
            }
        }
    }

    Err(FieldParseError::Timestamp(trimmed.to_string()))
}

/// Canonical text for a timestamp, or `None` when it does not parse.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    parse_timestamp(raw)
        .ok()
        .map(|ts| ts.format(TIMESTAMP_FORMAT).to_string())
}

pub fn parse_number(raw: &str) -> Result<f64, FieldParseError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .ok_or_else(|| FieldParseError::Numeric(raw.to_string()))
}

/// Numeric coercion for JSON values: numbers and numeric strings.
pub fn number_from_value(value: &Value) -> Result<f64, FieldParseError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| FieldParseError::Numeric(n.to_string())),
        Value::String(s) => parse_number(s),
        other => Err(FieldParseError::Numeric(other.to_string())),
    }
}

/// Integer coercion for JSON values; fractional values truncate toward zero.
pub fn integer_from_value(value: &Value) -> Result<i64, FieldParseError> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f.trunc() as i64))
            .ok_or_else(|| FieldParseError::Numeric(n.to_string())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .or_else(|_| parse_number(s).map(|f| f.trunc() as i64))
            .map_err(|_| FieldParseError::Numeric(s.clone())),
        other => Err(FieldParseError::Numeric(other.to_string())),
    }
}

pub fn is_truthy(raw: Option<&str>) -> bool {
    let Some(raw) = raw else {
        return false;
    };

    let value = raw.trim().to_lowercase();
    match value.as_str() {
        "true" | "t" | "yes" | "y" => true,
        "false" | "f" | "no" | "n" | "" => false,
        other => other.parse::<f64>().map(|f| f != 0.0).unwrap_or(false),
    }
}

/// Column values rendered as text, whatever the stored dtype.
pub fn text_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<String>>> {
    let column = df.column(name)?.cast(&DataType::String)?;
    Ok(column
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Column values as f64; values that do not cast become `None`.
pub fn float_column(df: &DataFrame, name: &str) -> PolarsResult<Vec<Option<f64>>> {
    let column = df.column(name)?.cast(&DataType::Float64)?;
    Ok(column.f64()?.into_iter().collect())
}

/// Row views over a cleaned shard. Columns the shard lacks read as `None`,
/// except `id`, which must be present.
pub fn cleaned_records(df: &DataFrame) -> Result<Vec<CleanedRecord>> {
    let optional = |name: &str| -> PolarsResult<Vec<Option<String>>> {
        if df.column(name).is_ok() {
            text_column(df, name)
        } else {
            Ok(vec![None; df.height()])
        }
    };

    let ids = text_column(df, columns::ID)?;
    let fullnames = optional(columns::FULLNAME)?;
    let ages = optional(columns::AGE)?;
    let incomes = optional(columns::INCOME)?;
    let actives = optional(columns::IS_ACTIVE)?;
    let purchases = optional(columns::PURCHASE_HISTORY)?;
    let logins = optional(columns::LOGIN_HISTORY)?;

    let records = ids
        .into_iter()
        .zip(fullnames)
        .zip(ages)
        .zip(incomes)
        .zip(actives)
        .zip(purchases)
        .zip(logins)
        .map(
            |((((((id, fullname), age), income), is_active), purchase_history), login_history)| {
                CleanedRecord {
                    id: id.unwrap_or_default(),
                    fullname: fullname.unwrap_or_default(),
                    age,
                    income,
                    is_active,
                    purchase_history,
                    login_history,
                }
            },
        )
        .collect();

    Ok(records)
}
