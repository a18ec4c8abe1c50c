//! Serialization utilities
//!
//! This module converts any serde-serializable struct into a column mapping,
//! used by `insert_serialized` on the map builder.

use crate::errors::ValueError;
use crate::value::{DbValue, RowMap};
use serde::Serialize;

/// Convert serializable data to a column→value mapping.
///
/// RFC 3339 strings become time values; nested objects and arrays stay JSON.
pub fn to_row_map<T: Serialize>(data: &T) -> Result<RowMap, ValueError> {
    let serde_json::Value::Object(map) = serde_json::to_value(data)? else {
        return Err(ValueError::NotAnObject);
    };

    let mut row = RowMap::with_capacity(map.len());
    for (key, value) in map {
        let db_value = match value {
            serde_json::Value::String(s) => match chrono::DateTime::parse_from_rfc3339(&s) {
                Ok(dt) => DbValue::Time(dt.with_timezone(&chrono::Utc)),
                Err(_) => DbValue::Text(s),
            },
            other => DbValue::from_json(other),
        };
        row.insert(key, db_value);
    }
    Ok(row)
}
