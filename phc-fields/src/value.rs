//! Submitted and canonical field values.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{DataType, ValueKind};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const DATETIME_INPUT_FORMATS: [&str; 3] =
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// A custom field value as submitted by a caller.
///
/// The declared type is informative only. Coercion always follows the
/// definition's data type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldValue {
    #[serde(rename = "codigo")]
    pub code: String,
    #[serde(rename = "tipo", default, skip_serializing_if = "Option::is_none")]
    pub declared_type: Option<String>,
    #[serde(rename = "valor", default)]
    pub value: Value,
}

impl FieldValue {
    pub fn new(code: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            code: code.into(),
            declared_type: None,
            value: value.into(),
        }
    }

    pub fn with_declared_type(mut self, declared_type: impl Into<String>) -> Self {
        self.declared_type = Some(declared_type.into());
        self
    }
}

/// Canonical form of a validated value.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    Text(String),
    /// Integral numbers, kept exact
    Integer(i64),
    Number(f64),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Boolean(bool),
    Json(Value),
}

impl TypedValue {
    /// Coerce a submitted JSON value into the shape required by `data_type`.
    ///
    /// Returns `None` when the value cannot take that shape. Null and the
    /// empty string coerce to [`TypedValue::Null`] for every type.
    pub fn coerce(data_type: DataType, value: &Value) -> Option<Self> {
        if is_blank(value) {
            return Some(Self::Null);
        }

        match data_type.value_kind() {
            ValueKind::Text => string_form(value).map(Self::Text),
            ValueKind::Number => match value {
                Value::Number(n) => match n.as_i64() {
                    Some(i) => Some(Self::Integer(i)),
                    None => n.as_f64().and_then(Self::from_f64),
                },
                Value::String(s) => parse_number(s),
                _ => None,
            },
            ValueKind::Boolean => match value {
                Value::Bool(b) => Some(Self::Boolean(*b)),
                Value::String(s) => parse_bool(s).map(Self::Boolean),
                _ => None,
            },
            ValueKind::Date => value.as_str().and_then(parse_date).map(Self::Date),
            ValueKind::DateTime => value.as_str().and_then(parse_datetime).map(Self::DateTime),
            ValueKind::Json => match value {
                Value::String(s) => serde_json::from_str(s).ok().map(Self::Json),
                other => Some(Self::Json(other.clone())),
            },
        }
    }

    /// Interpret a stored column value for a field of `data_type`.
    ///
    /// Host columns are not guaranteed to hold the shape the definition
    /// declares, so anything that does not fit is surfaced as text.
    pub fn from_stored(data_type: DataType, stored: SqlValue) -> Self {
        let kind = data_type.value_kind();
        match stored {
            SqlValue::Null => Self::Null,
            SqlValue::Integer(i) => match kind {
                ValueKind::Number => Self::Integer(i),
                ValueKind::Boolean => Self::Boolean(i != 0),
                ValueKind::Json => Self::Json(Value::from(i)),
                _ => Self::Text(i.to_string()),
            },
            SqlValue::Real(f) => match kind {
                ValueKind::Number => Self::from_f64(f).unwrap_or(Self::Text(f.to_string())),
                ValueKind::Boolean => Self::Boolean(f != 0.0),
                _ => Self::Text(f.to_string()),
            },
            SqlValue::Text(s) => Self::from_stored_text(kind, s),
            SqlValue::Blob(bytes) => {
                Self::from_stored_text(kind, String::from_utf8_lossy(&bytes).into_owned())
            }
        }
    }

    fn from_stored_text(kind: ValueKind, s: String) -> Self {
        let parsed = match kind {
            ValueKind::Text => None,
            ValueKind::Number => parse_number(&s),
            ValueKind::Boolean => parse_bool(&s)
                .or_else(|| match s.trim() {
                    "1" => Some(true),
                    "0" => Some(false),
                    _ => None,
                })
                .map(Self::Boolean),
            ValueKind::Date => parse_date(&s).map(Self::Date),
            ValueKind::DateTime => parse_datetime(&s).map(Self::DateTime),
            ValueKind::Json => serde_json::from_str(&s).ok().map(Self::Json),
        };
        parsed.unwrap_or(Self::Text(s))
    }

    /// A finite float, narrowed to [`TypedValue::Integer`] when it is integral
    /// and within `i64` range.
    fn from_f64(f: f64) -> Option<Self> {
        if !f.is_finite() {
            return None;
        }
        Some(match integral_i64(f) {
            Some(i) => Self::Integer(i),
            None => Self::Number(f),
        })
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Canonical JSON rendering.
    ///
    /// Integral numbers render as JSON integers, so `24` reads back as `24`.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Text(s) => Value::String(s.clone()),
            Self::Integer(i) => Value::from(*i),
            Self::Number(n) => number_to_json(*n),
            Self::Date(d) => Value::String(d.format(DATE_FORMAT).to_string()),
            Self::DateTime(dt) => Value::String(dt.format(DATETIME_FORMAT).to_string()),
            Self::Boolean(b) => Value::Bool(*b),
            Self::Json(v) => v.clone(),
        }
    }

    fn to_sql_value(&self) -> SqlValue {
        match self {
            Self::Null => SqlValue::Null,
            Self::Text(s) => SqlValue::Text(s.clone()),
            Self::Integer(i) => SqlValue::Integer(*i),
            Self::Number(n) => match integral_i64(*n) {
                Some(i) => SqlValue::Integer(i),
                None => SqlValue::Real(*n),
            },
            Self::Date(d) => SqlValue::Text(d.format(DATE_FORMAT).to_string()),
            Self::DateTime(dt) => SqlValue::Text(dt.format(DATETIME_FORMAT).to_string()),
            Self::Boolean(b) => SqlValue::Integer(i64::from(*b)),
            Self::Json(v) => SqlValue::Text(v.to_string()),
        }
    }
}

impl ToSql for TypedValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_sql_value()))
    }
}

/// Null and the empty string both mean "no value".
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// The string a pattern is matched against.
pub fn string_form(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

fn number_to_json(n: f64) -> Value {
    match integral_i64(n) {
        Some(i) => Value::from(i),
        None => serde_json::Number::from_f64(n)
            .map(Value::Number)
            .unwrap_or(Value::Null),
    }
}

/// `f` as an `i64` when it has no fractional part and fits.
fn integral_i64(f: f64) -> Option<i64> {
    // i64::MAX as f64 rounds up to 2^63, hence the strict upper bound
    let in_range = f >= i64::MIN as f64 && f < i64::MAX as f64;
    (f.is_finite() && f.fract() == 0.0 && in_range).then(|| f as i64)
}

/// Integers parse exactly, anything else as a finite float.
fn parse_number(s: &str) -> Option<TypedValue> {
    let s = s.trim();
    match s.parse::<i64>() {
        Ok(i) => Some(TypedValue::Integer(i)),
        Err(_) => s.parse::<f64>().ok().and_then(TypedValue::from_f64),
    }
}

/// Only the exact literals `true` and `false`.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Accepts a bare date or any accepted datetime form (time dropped).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .ok()
        .or_else(|| parse_datetime(s).map(|dt| dt.date()))
}

/// Accepts `YYYY-MM-DD HH:MM:SS`, ISO `T`-separated forms with optional
/// fraction, RFC 3339 (normalized to UTC) and a bare date (midnight).
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    DATETIME_INPUT_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.naive_utc())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(s, DATE_FORMAT)
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_value_uses_host_names() {
        let fv: FieldValue =
            serde_json::from_value(json!({"codigo": "garantia_meses", "tipo": "number", "valor": 24}))
                .unwrap();
        assert_eq!(fv.code, "garantia_meses");
        assert_eq!(fv.declared_type.as_deref(), Some("number"));
        assert_eq!(fv.value, json!(24));

        let missing: FieldValue = serde_json::from_value(json!({"codigo": "x"})).unwrap();
        assert!(missing.value.is_null());
    }

    #[test]
    fn blank_values_coerce_to_null() {
        for t in DataType::ALL {
            assert_eq!(TypedValue::coerce(t, &json!(null)), Some(TypedValue::Null));
            assert_eq!(TypedValue::coerce(t, &json!("")), Some(TypedValue::Null));
        }
    }

    #[test]
    fn numbers_accept_numeric_strings() {
        assert_eq!(
            TypedValue::coerce(DataType::Number, &json!("24")),
            Some(TypedValue::Integer(24))
        );
        assert_eq!(
            TypedValue::coerce(DataType::Decimal, &json!(1.5)),
            Some(TypedValue::Number(1.5))
        );
        assert_eq!(TypedValue::coerce(DataType::Number, &json!("abc")), None);
        assert_eq!(TypedValue::coerce(DataType::Number, &json!("NaN")), None);
        assert_eq!(TypedValue::coerce(DataType::Number, &json!(true)), None);
    }

    #[test]
    fn integral_numbers_render_as_integers() {
        assert_eq!(TypedValue::Number(24.0).to_json(), json!(24));
        assert_eq!(TypedValue::Number(2.5).to_json(), json!(2.5));
        assert_eq!(TypedValue::Number(1.0e17).to_json(), json!(100_000_000_000_000_000_i64));
    }

    #[test]
    fn large_integers_stay_exact() {
        let big = 9_007_199_254_740_993_i64;
        let typed = TypedValue::coerce(DataType::Number, &json!(big)).unwrap();
        assert_eq!(typed, TypedValue::Integer(big));
        assert_eq!(typed.to_sql_value(), SqlValue::Integer(big));
        assert_eq!(
            TypedValue::from_stored(DataType::Number, SqlValue::Integer(big)).to_json(),
            json!(big)
        );
        assert_eq!(
            TypedValue::coerce(DataType::Number, &json!("9007199254740993")),
            Some(TypedValue::Integer(big))
        );
        assert_eq!(TypedValue::Number(24.0).to_sql_value(), SqlValue::Integer(24));
    }

    #[test]
    fn booleans_are_strict() {
        assert_eq!(
            TypedValue::coerce(DataType::Boolean, &json!("true")),
            Some(TypedValue::Boolean(true))
        );
        assert_eq!(
            TypedValue::coerce(DataType::Boolean, &json!("false")),
            Some(TypedValue::Boolean(false))
        );
        assert_eq!(TypedValue::coerce(DataType::Boolean, &json!("TRUE")), None);
        assert_eq!(TypedValue::coerce(DataType::Boolean, &json!("False")), None);
        assert_eq!(TypedValue::coerce(DataType::Boolean, &json!(" true ")), None);
        assert_eq!(TypedValue::coerce(DataType::Boolean, &json!("yes")), None);
        assert_eq!(TypedValue::coerce(DataType::Boolean, &json!(1)), None);
    }

    #[test]
    fn dates_accept_several_forms() {
        let d = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert_eq!(
            TypedValue::coerce(DataType::Date, &json!("2024-03-09")),
            Some(TypedValue::Date(d))
        );
        assert_eq!(
            TypedValue::coerce(DataType::Date, &json!("2024-03-09T10:00:00")),
            Some(TypedValue::Date(d))
        );
        let dt = TypedValue::coerce(DataType::Datetime, &json!("2024-03-09T10:30:00Z")).unwrap();
        assert_eq!(dt.to_json(), json!("2024-03-09 10:30:00"));
        assert_eq!(TypedValue::coerce(DataType::Date, &json!("09/03/2024")), None);
        assert_eq!(TypedValue::coerce(DataType::Date, &json!(20240309)), None);
    }

    #[test]
    fn json_accepts_structures_and_json_strings() {
        assert_eq!(
            TypedValue::coerce(DataType::Json, &json!({"a": 1})),
            Some(TypedValue::Json(json!({"a": 1})))
        );
        assert_eq!(
            TypedValue::coerce(DataType::Json, &json!("[1,2]")),
            Some(TypedValue::Json(json!([1, 2])))
        );
        assert_eq!(TypedValue::coerce(DataType::Json, &json!("{oops")), None);
    }

    #[test]
    fn text_accepts_anything() {
        assert_eq!(
            TypedValue::coerce(DataType::Email, &json!(42)),
            Some(TypedValue::Text("42".into()))
        );
    }

    #[test]
    fn stored_values_read_back_canonically() {
        assert_eq!(
            TypedValue::from_stored(DataType::Number, SqlValue::Real(24.0)).to_json(),
            json!(24)
        );
        assert_eq!(
            TypedValue::from_stored(DataType::Boolean, SqlValue::Integer(1)),
            TypedValue::Boolean(true)
        );
        assert_eq!(
            TypedValue::from_stored(DataType::Json, SqlValue::Text("{\"a\":1}".into())),
            TypedValue::Json(json!({"a": 1}))
        );
        assert_eq!(
            TypedValue::from_stored(DataType::Number, SqlValue::Text("n/a".into())),
            TypedValue::Text("n/a".into())
        );
    }

    #[test]
    fn sql_binding_shapes() {
        assert_eq!(TypedValue::Boolean(true).to_sql_value(), SqlValue::Integer(1));
        assert_eq!(
            TypedValue::Date(NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()).to_sql_value(),
            SqlValue::Text("2024-01-02".into())
        );
        assert_eq!(
            TypedValue::Json(json!([1])).to_sql_value(),
            SqlValue::Text("[1]".into())
        );
    }
}
