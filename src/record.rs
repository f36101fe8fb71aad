//! Records and primary keys
//!
//! A record is an arbitrary JSON object. A key is the subset of JSON values
//! the store can order and compare: integers, reals and strings.

use crate::{Error, Result};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A stored record: field name to JSON value.
pub type Record = serde_json::Map<String, Value>;

/// Primary or index key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Key {
    /// Convert a JSON value into a key. Integral reals normalise to integers.
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    return Ok(Key::Integer(i));
                }
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                        Ok(Key::Integer(f as i64))
                    }
                    Some(f) if f.is_finite() => Ok(Key::Real(f)),
                    _ => Err(Error::InvalidKey(format!("{} is not a valid key", n))),
                }
            }
            Value::String(s) => Ok(Key::Text(s.clone())),
            other => Err(Error::InvalidKey(format!("{} is not a valid key", other))),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Key::Integer(i) => Value::from(*i),
            Key::Real(f) => Value::from(*f),
            Key::Text(s) => Value::String(s.clone()),
        }
    }

    /// Numeric value of the key, used by the key generator
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Key::Integer(i) => Some(*i as f64),
            Key::Real(f) => Some(*f),
            Key::Text(_) => None,
        }
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Integer(value)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Text(value.to_string())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Text(value)
    }
}

impl std::str::FromStr for Key {
    type Err = Error;

    /// Numbers parse as numeric keys, anything else is a text key
    fn from_str(s: &str) -> Result<Self> {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Key::Integer(i));
        }
        match s.parse::<f64>() {
            Ok(f) if f.is_finite() => Key::from_json(&Value::from(f)),
            _ => Ok(Key::Text(s.to_string())),
        }
    }
}

impl std::fmt::Display for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Key::Integer(i) => write!(f, "{}", i),
            Key::Real(r) => write!(f, "{}", r),
            Key::Text(s) => write!(f, "{}", s),
        }
    }
}

impl ToSql for Key {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Key::Integer(i) => ToSqlOutput::from(*i),
            Key::Real(f) => ToSqlOutput::from(*f),
            Key::Text(s) => ToSqlOutput::from(s.as_str()),
        })
    }
}

impl FromSql for Key {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(i) => Ok(Key::Integer(i)),
            ValueRef::Real(f) => Ok(Key::Real(f)),
            ValueRef::Text(bytes) => std::str::from_utf8(bytes)
                .map(|s| Key::Text(s.to_string()))
                .map_err(|e| FromSqlError::Other(Box::new(e))),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}

/// Read the value at a dotted field path
pub fn value_at<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = record.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Write a value at a dotted field path, creating intermediate objects
pub fn set_value_at(record: &mut Record, path: &str, value: Value) -> Result<()> {
    let (parents, leaf) = match path.rsplit_once('.') {
        Some((parents, leaf)) => (Some(parents), leaf),
        None => (None, path),
    };

    let mut target = record;
    if let Some(parents) = parents {
        for segment in parents.split('.') {
            let slot = target
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Record::new()));
            target = slot.as_object_mut().ok_or_else(|| {
                Error::InvalidKey(format!("cannot assign key at '{}': '{}' is not an object", path, segment))
            })?;
        }
    }
    target.insert(leaf.to_string(), value);
    Ok(())
}

/// Remove the value at a dotted field path, returning it
pub fn remove_value_at(record: &mut Record, path: &str) -> Option<Value> {
    match path.rsplit_once('.') {
        None => record.remove(path),
        Some((parents, leaf)) => {
            let mut target = record;
            for segment in parents.split('.') {
                target = target.get_mut(segment)?.as_object_mut()?;
            }
            target.remove(leaf)
        }
    }
}

/// SQLite JSON path literal for a dotted field path, e.g. `'$."a"."b"'`
pub fn json_path_literal(path: &str) -> String {
    let mut literal = String::from("'$");
    for segment in path.split('.') {
        literal.push_str(".\"");
        literal.push_str(&segment.replace('"', "\\\"").replace('\'', "''"));
        literal.push('"');
    }
    literal.push('\'');
    literal
}

/// Scalar SQL value for a JSON value. Booleans become 0/1 and nested
/// structures their JSON text, matching what `json_extract` yields.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(value.to_string()),
    }
}
