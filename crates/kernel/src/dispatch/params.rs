// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shape validation for dynamically typed request params.
//!
//! Params arrive as open JSON maps; every handler states its shape through
//! these helpers so rejections carry a uniform `PARAM_VALIDATION` code.

use serde_json::{Map, Value};

use fk_core::ErrorCode;

use crate::dispatch::DispatchError;

fn invalid(message: String) -> DispatchError {
    DispatchError::new(ErrorCode::ParamValidation, message)
}

/// Params must be an object (or absent, treated as empty).
pub fn object(params: &Option<Value>) -> Result<Map<String, Value>, DispatchError> {
    match params {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(invalid(format!("params must be an object, got {other}"))),
    }
}

pub fn required_str<'a>(obj: &'a Map<String, Value>, key: &str) -> Result<&'a str, DispatchError> {
    match obj.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s),
        Some(Value::String(_)) => Err(invalid(format!("{key} must not be empty"))),
        Some(other) => Err(invalid(format!("{key} must be a string, got {other}"))),
        None => Err(invalid(format!("{key} is required"))),
    }
}

pub fn optional_str<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
) -> Result<Option<&'a str>, DispatchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(other) => Err(invalid(format!("{key} must be a string, got {other}"))),
    }
}

pub fn required_bool(obj: &Map<String, Value>, key: &str) -> Result<bool, DispatchError> {
    match obj.get(key) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(format!("{key} must be a boolean, got {other}"))),
        None => Err(invalid(format!("{key} is required"))),
    }
}

pub fn optional_bool(obj: &Map<String, Value>, key: &str) -> Result<Option<bool>, DispatchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(other) => Err(invalid(format!("{key} must be a boolean, got {other}"))),
    }
}

pub fn optional_u64(obj: &Map<String, Value>, key: &str) -> Result<Option<u64>, DispatchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(Some)
            .ok_or_else(|| invalid(format!("{key} must be a non-negative integer"))),
        Some(other) => Err(invalid(format!("{key} must be an integer, got {other}"))),
    }
}

pub fn optional_object(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Map<String, Value>, DispatchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(map)) => Ok(map.clone()),
        Some(other) => Err(invalid(format!("{key} must be an object, got {other}"))),
    }
}

pub fn optional_str_array(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Option<Vec<String>>, DispatchError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| {
                v.as_str()
                    .map(String::from)
                    .ok_or_else(|| invalid(format!("{key} must contain only strings")))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(other) => Err(invalid(format!("{key} must be an array, got {other}"))),
    }
}

pub fn required_str_array(
    obj: &Map<String, Value>,
    key: &str,
) -> Result<Vec<String>, DispatchError> {
    optional_str_array(obj, key)?.ok_or_else(|| invalid(format!("{key} is required")))
}

/// A string restricted to a known set of values.
pub fn enumerated<'a>(
    obj: &'a Map<String, Value>,
    key: &str,
    allowed: &[&str],
) -> Result<&'a str, DispatchError> {
    let value = required_str(obj, key)?;
    if allowed.contains(&value) {
        Ok(value)
    } else {
        Err(invalid(format!("{key} must be one of {allowed:?}, got {value:?}")))
    }
}

#[cfg(test)]
#[path = "params_tests.rs"]
mod tests;
