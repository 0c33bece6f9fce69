//! Lenient accessors over decoded JSON objects.
//!
//! Registries disagree on how they encode numbers and which fields they
//! emit, so values are read field by field. Absent or null fields read as
//! `None` or as empty collections.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::error::{RegistryError, RegistryResult};

/// A decoded JSON object.
pub type JsonObject = Map<String, Value>;

/// Decode `json`, which must hold a JSON object.
pub fn parse_object(json: &str) -> RegistryResult<JsonObject> {
    serde_json::from_str(json).map_err(|err| RegistryError::parse(json, err))
}

/// Decode `json` bytes, which must hold a JSON object.
pub fn parse_object_slice(json: &[u8]) -> RegistryResult<JsonObject> {
    serde_json::from_slice(json)
        .map_err(|err| RegistryError::parse(&String::from_utf8_lossy(json), err))
}

/// Read a number, widening floats and parsing numeric strings.
pub fn as_long(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_u64().and_then(|n| i64::try_from(n).ok()))
            .or_else(|| number.as_f64().map(|n| n as i64)),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Read a number that fits in 32 bits.
pub fn as_integer(value: Option<&Value>) -> Option<i32> {
    as_long(value).and_then(|n| i32::try_from(n).ok())
}

/// Read a boolean, also accepting `"true"` and `"false"` strings.
pub fn as_boolean(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    }
}

/// Read an RFC 3339 timestamp, or epoch milliseconds.
pub fn as_instant(value: Option<&Value>) -> Option<DateTime<Utc>> {
    match value? {
        Value::String(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|instant| instant.with_timezone(&Utc)),
        number @ Value::Number(_) => DateTime::from_timestamp_millis(as_long(Some(number))?),
        _ => None,
    }
}

/// Read a string field.
pub fn string(object: &JsonObject, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_owned)
}

/// Read a list of strings, skipping non-string entries.
pub fn strings(object: &JsonObject, key: &str) -> Vec<String> {
    object
        .get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Read a map of strings, such as annotations.
pub fn string_map(object: &JsonObject, key: &str) -> BTreeMap<String, String> {
    object
        .get(key)
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_owned())))
                .collect()
        })
        .unwrap_or_default()
}

/// Read a nested object.
pub fn object<'a>(object: &'a JsonObject, key: &str) -> Option<&'a JsonObject> {
    object.get(key).and_then(Value::as_object)
}

/// Read the first element of a list, whatever its type.
pub fn first<'a>(object: &'a JsonObject, key: &str) -> Option<&'a Value> {
    object.get(key).and_then(Value::as_array)?.first()
}

/// Read a list of objects, skipping entries that are not objects.
pub fn objects<'a>(object: &'a JsonObject, key: &str) -> impl Iterator<Item = &'a JsonObject> {
    object
        .get(key)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
}
