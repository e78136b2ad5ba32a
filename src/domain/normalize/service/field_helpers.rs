use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::domain::common::model::{Provider, RawRecord, ResourceCostRecord};
use crate::errors::SchemaError;

/// Looks up `path` as a flat key first, then as a dotted walk through nested objects.
pub fn lookup<'a>(raw: &'a RawRecord, path: &str) -> Option<&'a Value> {
    if let Some(v) = raw.get(path) {
        return Some(v);
    }

    let mut parts = path.split('.');
    let mut current = raw.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

/// Non-empty string value at `path`. Numbers are accepted and rendered as text.
pub fn optional_str(raw: &RawRecord, path: &str) -> Option<String> {
    match lookup(raw, path)? {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                None
            } else {
                Some(s.to_string())
            }
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn required_str(raw: &RawRecord, provider: Provider, path: &str) -> Result<String, SchemaError> {
    optional_str(raw, path).ok_or_else(|| SchemaError::missing(provider, path))
}

/// First present field among `paths`; error names the first candidate.
pub fn required_str_any(
    raw: &RawRecord,
    provider: Provider,
    paths: &[&str],
) -> Result<String, SchemaError> {
    paths
        .iter()
        .find_map(|p| optional_str(raw, p))
        .ok_or_else(|| SchemaError::missing(provider, paths[0]))
}

pub fn required_amount(raw: &RawRecord, provider: Provider, path: &str) -> Result<Decimal, SchemaError> {
    let value = lookup(raw, path).ok_or_else(|| SchemaError::missing(provider, path))?;

    let text = match value {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => return Err(SchemaError::missing(provider, path)),
        Value::String(_) => return Err(SchemaError::missing(provider, path)),
        other => {
            return Err(SchemaError::malformed(
                provider,
                path,
                format!("expected a number, got {}", other),
            ))
        }
    };

    parse_decimal(&text).ok_or_else(|| {
        SchemaError::malformed(provider, path, format!("'{}' is not a decimal amount", text))
    })
}

/// Exact decimal parse; also accepts scientific notation such as `2.4e-06`.
pub fn parse_decimal(text: &str) -> Option<Decimal> {
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

pub fn required_timestamp(
    raw: &RawRecord,
    provider: Provider,
    path: &str,
) -> Result<DateTime<Utc>, SchemaError> {
    let text = required_str(raw, provider, path)?;
    parse_timestamp(&text).ok_or_else(|| {
        SchemaError::malformed(provider, path, format!("'{}' is not a valid timestamp", text))
    })
}

/// Accepts RFC 3339, `YYYY-MM-DD HH:MM:SS[+offset]`, `YYYY-MM-DDTHH:MM:SS` and
/// bare dates. Values without an offset are taken as UTC.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%:z") {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%MZ"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub fn required_currency(raw: &RawRecord, provider: Provider, path: &str) -> Result<String, SchemaError> {
    let code = required_str(raw, provider, path)?;
    if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(SchemaError::malformed(
            provider,
            path,
            format!("'{}' is not an ISO 4217 code", code),
        ));
    }
    Ok(code.to_ascii_uppercase())
}

/// Compact text form of a JSON value for a tag; `None` for null and empty strings.
pub fn tag_value(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

/// Copies every field not listed in `known` into `tags` as `<prefix>:<path>`.
/// Nested objects are flattened with dotted paths.
pub fn preserve_extras(
    raw: &RawRecord,
    provider: Provider,
    known: &[&str],
    tags: &mut BTreeMap<String, String>,
) {
    for (key, value) in raw {
        collect_extra(provider, key, value, known, tags);
    }
}

fn collect_extra(
    provider: Provider,
    path: &str,
    value: &Value,
    known: &[&str],
    tags: &mut BTreeMap<String, String>,
) {
    if known.contains(&path) {
        return;
    }

    if let Value::Object(map) = value {
        for (key, child) in map {
            let child_path = format!("{}.{}", path, key);
            collect_extra(provider, &child_path, child, known, tags);
        }
        return;
    }

    if let Some(v) = tag_value(value) {
        tags.insert(format!("{}:{}", provider.tag_prefix(), path), v);
    }
}

/// Final invariant checks shared by every provider.
pub fn check_invariants(record: ResourceCostRecord) -> Result<ResourceCostRecord, SchemaError> {
    if record.period_start > record.period_end {
        return Err(SchemaError::malformed(
            record.provider,
            "period",
            format!(
                "start {} is after end {}",
                record.period_start.to_rfc3339(),
                record.period_end.to_rfc3339()
            ),
        ));
    }

    if record.amount.is_sign_negative() && !record.amount.is_zero() && !record.is_credit {
        return Err(SchemaError::malformed(
            record.provider,
            "amount",
            format!("negative amount {} without credit marker", record.amount),
        ));
    }

    Ok(record)
}
