//! Runtime values
//!
//! This module defines `DbValue`, the untyped slot every scanned column and every
//! bound argument travels through, plus the conversion traits implemented for the
//! Rust types a model may declare.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::errors::ValueError;
use crate::sql::FieldKind;

/// A single column value
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
    Json(serde_json::Value),
}

/// Column name to value mapping returned by the map builder
pub type RowMap = HashMap<String, DbValue>;

impl DbValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DbValue::Null)
    }

    /// True for the zero value of the variant (`0`, `""`, `false`, epoch, empty bytes)
    pub fn is_zero(&self) -> bool {
        match self {
            DbValue::Null => true,
            DbValue::Bool(b) => !b,
            DbValue::Int(i) => *i == 0,
            DbValue::Float(f) => *f == 0.0,
            DbValue::Text(s) => s.is_empty(),
            DbValue::Bytes(b) => b.is_empty(),
            DbValue::Time(t) => t.timestamp() == 0,
            DbValue::Json(v) => v.is_null(),
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            DbValue::Null => "null",
            DbValue::Bool(_) => "bool",
            DbValue::Int(_) => "integer",
            DbValue::Float(_) => "float",
            DbValue::Text(_) => "text",
            DbValue::Bytes(_) => "bytes",
            DbValue::Time(_) => "time",
            DbValue::Json(_) => "json",
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            DbValue::Int(i) => Some(*i),
            DbValue::Bool(b) => Some(i64::from(*b)),
            DbValue::Float(f) => Some(*f as i64),
            DbValue::Text(s) => s.trim().parse().ok(),
            DbValue::Time(t) => Some(t.timestamp()),
            DbValue::Json(serde_json::Value::Number(n)) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DbValue::Float(f) => Some(*f),
            DbValue::Int(i) => Some(*i as f64),
            DbValue::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            DbValue::Text(s) => s.trim().parse().ok(),
            DbValue::Json(serde_json::Value::Number(n)) => n.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            DbValue::Bool(b) => Some(*b),
            DbValue::Int(i) => Some(*i != 0),
            DbValue::Float(f) => Some(*f != 0.0),
            DbValue::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "1" | "yes" => Some(true),
                "false" | "f" | "0" | "no" | "" => Some(false),
                _ => None,
            },
            DbValue::Json(serde_json::Value::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            DbValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Convert to the JSON form used in bus payloads. Times become Unix seconds.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DbValue::Null => serde_json::Value::Null,
            DbValue::Bool(b) => serde_json::Value::Bool(*b),
            DbValue::Int(i) => serde_json::Value::from(*i),
            DbValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            DbValue::Text(s) => serde_json::Value::String(s.clone()),
            DbValue::Bytes(b) => serde_json::Value::Array(
                b.iter().map(|byte| serde_json::Value::from(*byte)).collect(),
            ),
            DbValue::Time(t) => serde_json::Value::from(t.timestamp()),
            DbValue::Json(v) => v.clone(),
        }
    }

    /// Best-effort conversion from an untyped JSON value
    pub fn from_json(value: serde_json::Value) -> DbValue {
        match value {
            serde_json::Value::Null => DbValue::Null,
            serde_json::Value::Bool(b) => DbValue::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => DbValue::Int(i),
                None => n.as_f64().map(DbValue::Float).unwrap_or(DbValue::Null),
            },
            serde_json::Value::String(s) => DbValue::Text(s),
            other => DbValue::Json(other),
        }
    }

    /// Coerce the value into the representation of a declared column kind
    pub fn coerce(self, kind: FieldKind) -> Result<DbValue, ValueError> {
        if self.is_null() {
            return Ok(DbValue::Null);
        }
        let mismatch = |expected: &'static str, value: &DbValue| ValueError::TypeMismatch {
            expected,
            found: format!("{} ({})", value.type_name(), value),
        };

        match kind {
            FieldKind::Integer => self
                .as_i64()
                .map(DbValue::Int)
                .ok_or_else(|| mismatch("integer", &self)),
            FieldKind::Float => self
                .as_f64()
                .map(DbValue::Float)
                .ok_or_else(|| mismatch("float", &self)),
            FieldKind::Bool => self
                .as_bool()
                .map(DbValue::Bool)
                .ok_or_else(|| mismatch("bool", &self)),
            FieldKind::Text => Ok(match self {
                DbValue::Text(s) => DbValue::Text(s),
                DbValue::Bytes(b) => DbValue::Text(String::from_utf8_lossy(&b).into_owned()),
                DbValue::Json(serde_json::Value::String(s)) => DbValue::Text(s),
                other => DbValue::Text(other.to_string()),
            }),
            FieldKind::Bytes => match self {
                DbValue::Bytes(b) => Ok(DbValue::Bytes(b)),
                DbValue::Text(s) => Ok(DbValue::Bytes(s.into_bytes())),
                DbValue::Json(serde_json::Value::Array(items)) => items
                    .iter()
                    .map(|item| item.as_u64().and_then(|n| u8::try_from(n).ok()))
                    .collect::<Option<Vec<u8>>>()
                    .map(DbValue::Bytes)
                    .ok_or(ValueError::TypeMismatch {
                        expected: "bytes",
                        found: "json array".to_string(),
                    }),
                other => Err(mismatch("bytes", &other)),
            },
            FieldKind::Time => match self {
                DbValue::Time(t) => Ok(DbValue::Time(t)),
                DbValue::Text(s) => match DateTime::parse_from_rfc3339(&s) {
                    Ok(dt) => Ok(DbValue::Time(dt.with_timezone(&Utc))),
                    Err(_) => s
                        .trim()
                        .parse::<i64>()
                        .ok()
                        .and_then(unix_seconds)
                        .map(DbValue::Time)
                        .ok_or_else(|| mismatch("time", &DbValue::Text(s.clone()))),
                },
                other => other
                    .as_i64()
                    .and_then(unix_seconds)
                    .map(DbValue::Time)
                    .ok_or_else(|| mismatch("time", &other)),
            },
            FieldKind::Json | FieldKind::Slice | FieldKind::Struct => Ok(match self {
                DbValue::Json(v) => DbValue::Json(v),
                DbValue::Text(s) => match serde_json::from_str(&s) {
                    Ok(v) => DbValue::Json(v),
                    Err(_) => DbValue::Json(serde_json::Value::String(s)),
                },
                other => DbValue::Json(other.to_json()),
            }),
        }
    }
}

fn unix_seconds(secs: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0).single()
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbValue::Null => write!(f, "NULL"),
            DbValue::Bool(b) => write!(f, "{}", b),
            DbValue::Int(i) => write!(f, "{}", i),
            DbValue::Float(v) => write!(f, "{}", v),
            DbValue::Text(s) => write!(f, "{}", s),
            DbValue::Bytes(b) => write!(f, "{}", String::from_utf8_lossy(b)),
            DbValue::Time(t) => write!(f, "{}", t.timestamp()),
            DbValue::Json(v) => write!(f, "{}", v),
        }
    }
}

/// An ordered result row
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[String]>,
    values: Vec<DbValue>,
}

impl Row {
    pub fn new(columns: Arc<[String]>, values: Vec<DbValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DbValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    /// Value of the first column, used to group nested result sets
    pub fn first(&self) -> Option<&DbValue> {
        self.values.first()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_map(&self) -> RowMap {
        self.columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect()
    }

    pub fn into_map(self) -> RowMap {
        self.columns.iter().cloned().zip(self.values).collect()
    }
}

/// Conversion of a Rust value into a bindable `DbValue`
pub trait ToDbValue {
    fn to_db_value(&self) -> DbValue;
}

/// Conversion of a scanned `DbValue` back into a Rust value.
///
/// `NULL` maps to the zero value of non-optional types.
pub trait FromDbValue: Sized {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError>;
}

/// Column kind of a Rust type, used when a model derives its schema descriptor
pub trait SqlKind {
    const KIND: FieldKind;
    const NULLABLE: bool = false;
}

fn mismatch(expected: &'static str, value: &DbValue) -> ValueError {
    ValueError::TypeMismatch {
        expected,
        found: value.type_name().to_string(),
    }
}

macro_rules! impl_integer {
    ($($t:ty),*) => {
        $(
            impl ToDbValue for $t {
                fn to_db_value(&self) -> DbValue {
                    DbValue::Int(*self as i64)
                }
            }

            impl FromDbValue for $t {
                fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
                    if value.is_null() {
                        return Ok(0);
                    }
                    value
                        .as_i64()
                        .and_then(|i| <$t>::try_from(i).ok())
                        .ok_or_else(|| mismatch(stringify!($t), value))
                }
            }

            impl SqlKind for $t {
                const KIND: FieldKind = FieldKind::Integer;
            }
        )*
    };
}

impl_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

macro_rules! impl_float {
    ($($t:ty),*) => {
        $(
            impl ToDbValue for $t {
                fn to_db_value(&self) -> DbValue {
                    DbValue::Float(*self as f64)
                }
            }

            impl FromDbValue for $t {
                fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
                    if value.is_null() {
                        return Ok(0.0);
                    }
                    value
                        .as_f64()
                        .map(|f| f as $t)
                        .ok_or_else(|| mismatch(stringify!($t), value))
                }
            }

            impl SqlKind for $t {
                const KIND: FieldKind = FieldKind::Float;
            }
        )*
    };
}

impl_float!(f32, f64);

impl ToDbValue for bool {
    fn to_db_value(&self) -> DbValue {
        DbValue::Bool(*self)
    }
}

impl FromDbValue for bool {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        if value.is_null() {
            return Ok(false);
        }
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl SqlKind for bool {
    const KIND: FieldKind = FieldKind::Bool;
}

impl ToDbValue for str {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.to_string())
    }
}

impl ToDbValue for String {
    fn to_db_value(&self) -> DbValue {
        DbValue::Text(self.clone())
    }
}

impl FromDbValue for String {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        Ok(match value {
            DbValue::Null => String::new(),
            DbValue::Text(s) => s.clone(),
            DbValue::Json(serde_json::Value::String(s)) => s.clone(),
            other => other.to_string(),
        })
    }
}

impl SqlKind for String {
    const KIND: FieldKind = FieldKind::Text;
}

impl ToDbValue for Vec<u8> {
    fn to_db_value(&self) -> DbValue {
        DbValue::Bytes(self.clone())
    }
}

impl ToDbValue for [u8] {
    fn to_db_value(&self) -> DbValue {
        DbValue::Bytes(self.to_vec())
    }
}

impl FromDbValue for Vec<u8> {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        match value {
            DbValue::Null => Ok(Vec::new()),
            DbValue::Bytes(b) => Ok(b.clone()),
            DbValue::Text(s) => Ok(s.clone().into_bytes()),
            other => Err(mismatch("bytes", other)),
        }
    }
}

impl SqlKind for Vec<u8> {
    const KIND: FieldKind = FieldKind::Bytes;
}

impl ToDbValue for DateTime<Utc> {
    fn to_db_value(&self) -> DbValue {
        DbValue::Time(*self)
    }
}

impl FromDbValue for DateTime<Utc> {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        match value.clone().coerce(FieldKind::Time)? {
            DbValue::Time(t) => Ok(t),
            _ => Ok(DateTime::<Utc>::default()),
        }
    }
}

impl SqlKind for DateTime<Utc> {
    const KIND: FieldKind = FieldKind::Time;
}

impl ToDbValue for NaiveDateTime {
    fn to_db_value(&self) -> DbValue {
        DbValue::Time(Utc.from_utc_datetime(self))
    }
}

impl FromDbValue for NaiveDateTime {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        DateTime::<Utc>::from_db_value(value).map(|t| t.naive_utc())
    }
}

impl SqlKind for NaiveDateTime {
    const KIND: FieldKind = FieldKind::Time;
}

impl ToDbValue for serde_json::Value {
    fn to_db_value(&self) -> DbValue {
        DbValue::Json(self.clone())
    }
}

impl FromDbValue for serde_json::Value {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        match value.clone().coerce(FieldKind::Json)? {
            DbValue::Json(v) => Ok(v),
            _ => Ok(serde_json::Value::Null),
        }
    }
}

impl SqlKind for serde_json::Value {
    const KIND: FieldKind = FieldKind::Json;
}

impl<T: ToDbValue> ToDbValue for Option<T> {
    fn to_db_value(&self) -> DbValue {
        match self {
            Some(v) => v.to_db_value(),
            None => DbValue::Null,
        }
    }
}

impl<T: FromDbValue> FromDbValue for Option<T> {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_db_value(value).map(Some)
    }
}

impl<T: SqlKind> SqlKind for Option<T> {
    const KIND: FieldKind = T::KIND;
    const NULLABLE: bool = true;
}

impl<T: ToDbValue + ?Sized> ToDbValue for &T {
    fn to_db_value(&self) -> DbValue {
        (**self).to_db_value()
    }
}

impl ToDbValue for DbValue {
    fn to_db_value(&self) -> DbValue {
        self.clone()
    }
}

impl FromDbValue for DbValue {
    fn from_db_value(value: &DbValue) -> Result<Self, ValueError> {
        Ok(value.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_maps_to_zero_values() {
        assert_eq!(i64::from_db_value(&DbValue::Null).unwrap(), 0);
        assert_eq!(String::from_db_value(&DbValue::Null).unwrap(), "");
        assert!(!bool::from_db_value(&DbValue::Null).unwrap());
        assert_eq!(Option::<i32>::from_db_value(&DbValue::Null).unwrap(), None);
        assert_eq!(
            DateTime::<Utc>::from_db_value(&DbValue::Null)
                .unwrap()
                .timestamp(),
            0
        );
    }

    #[test]
    fn test_integer_backed_bool_and_time() {
        assert!(bool::from_db_value(&DbValue::Int(1)).unwrap());
        assert!(!bool::from_db_value(&DbValue::Int(0)).unwrap());
        let t = DateTime::<Utc>::from_db_value(&DbValue::Int(1_700_000_000)).unwrap();
        assert_eq!(t.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_integer_overflow_is_a_mismatch() {
        let err = u8::from_db_value(&DbValue::Int(300)).unwrap_err();
        assert!(matches!(err, ValueError::TypeMismatch { .. }));
    }

    #[test]
    fn test_coerce_json_payload_values() {
        let pk = DbValue::from_json(serde_json::json!(7))
            .coerce(FieldKind::Text)
            .unwrap();
        assert_eq!(pk, DbValue::Text("7".into()));

        let flag = DbValue::from_json(serde_json::json!(true))
            .coerce(FieldKind::Integer)
            .unwrap();
        assert_eq!(flag, DbValue::Int(1));

        let bytes = DbValue::Bytes(vec![1, 2, 3]).to_json();
        assert_eq!(
            DbValue::from_json(bytes).coerce(FieldKind::Bytes).unwrap(),
            DbValue::Bytes(vec![1, 2, 3])
        );
    }

    #[test]
    fn test_row_lookup_preserves_order() {
        let columns: Arc<[String]> = vec!["id".to_string(), "name".to_string()].into();
        let row = Row::new(columns, vec![DbValue::Int(1), DbValue::Text("x".into())]);
        assert_eq!(row.first(), Some(&DbValue::Int(1)));
        assert_eq!(row.get("name"), Some(&DbValue::Text("x".into())));
        assert_eq!(row.to_map().len(), 2);
    }

    #[test]
    fn test_args_macro_converts_references() {
        let name = String::from("bob");
        let values = crate::args![name, 3_i32, true, None::<i64>];
        assert_eq!(
            values,
            vec![
                DbValue::Text("bob".into()),
                DbValue::Int(3),
                DbValue::Bool(true),
                DbValue::Null
            ]
        );
    }
}
