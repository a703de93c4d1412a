//! Entity identifiers and the conversions between SQL and JSON values.

use std::fmt;

use phc_fields::JoinKey;
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A primary id: numeric for customers and orders, a reference for articles.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyValue {
    Int(i64),
    Text(String),
}

impl KeyValue {
    /// Read an id back from a stored column.
    pub fn from_sql(value: SqlValue) -> Option<Self> {
        match value {
            SqlValue::Integer(i) => Some(Self::Int(i)),
            SqlValue::Text(s) => Some(Self::Text(s)),
            _ => None,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Int(i) => Value::from(*i),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(i) => write!(f, "{i}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for KeyValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for KeyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for KeyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl ToSql for KeyValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            Self::Int(i) => i.to_sql(),
            Self::Text(s) => s.to_sql(),
        }
    }
}

/// Both identifiers of an existing entity.
///
/// Legacy rows may lack a stamp; a blank stamp is held as `None` so it can
/// never match companion rows keyed by an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKey {
    pub id: KeyValue,
    pub stamp: Option<String>,
}

impl EntityKey {
    pub fn new(id: impl Into<KeyValue>, stamp: impl Into<String>) -> Self {
        Self::with_stamp(id, Some(stamp.into()))
    }

    pub fn with_stamp(id: impl Into<KeyValue>, stamp: Option<String>) -> Self {
        Self {
            id: id.into(),
            stamp: stamp.filter(|s| !s.trim().is_empty()),
        }
    }

    /// The identifier an external row is joined on, if the entity has one.
    pub fn join_value(&self, join_key: JoinKey) -> Option<KeyValue> {
        match join_key {
            JoinKey::Id => Some(self.id.clone()),
            JoinKey::Stamp => self.stamp.clone().map(KeyValue::Text),
        }
    }
}

/// Bind a caller-supplied JSON value to a host column.
pub fn json_to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

/// Render a host column value as JSON.
pub fn sql_to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::from(i),
        SqlValue::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(bytes) => Value::String(String::from_utf8_lossy(&bytes).into_owned()),
    }
}

/// String form of a base column value for conflict checks and messages.
pub(crate) fn display_json(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_value_picks_identifier() {
        let key = EntityKey::new(12, "abc123");
        assert_eq!(key.join_value(JoinKey::Id), Some(KeyValue::Int(12)));
        assert_eq!(
            key.join_value(JoinKey::Stamp),
            Some(KeyValue::Text("abc123".into()))
        );
    }

    #[test]
    fn blank_stamp_has_no_join_value() {
        for stamp in ["", "   "] {
            let key = EntityKey::new(50, stamp);
            assert_eq!(key.stamp, None);
            assert_eq!(key.join_value(JoinKey::Stamp), None);
            assert_eq!(key.join_value(JoinKey::Id), Some(KeyValue::Int(50)));
        }
        assert_eq!(EntityKey::with_stamp(50, None).join_value(JoinKey::Stamp), None);
    }

    #[test]
    fn key_value_is_untagged() {
        assert_eq!(serde_json::to_value(KeyValue::Int(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::from_value::<KeyValue>(json!("ART-001")).unwrap(),
            KeyValue::Text("ART-001".into())
        );
    }

    #[test]
    fn json_sql_conversions() {
        assert_eq!(json_to_sql(&json!(true)), SqlValue::Integer(1));
        assert_eq!(json_to_sql(&json!(7)), SqlValue::Integer(7));
        assert_eq!(json_to_sql(&json!(1.5)), SqlValue::Real(1.5));
        assert_eq!(json_to_sql(&json!({"a": 1})), SqlValue::Text("{\"a\":1}".into()));
        assert_eq!(sql_to_json(SqlValue::Integer(7)), json!(7));
        assert_eq!(sql_to_json(SqlValue::Null), Value::Null);
    }
}
