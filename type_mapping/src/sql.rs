//! SQL type conversion utilities
//!
//! This module handles the mapping between declared column kinds and the
//! physical column types of each dialect.

use serde::{Deserialize, Serialize};

use crate::dialect::Dialect;
use crate::tags::ColumnTags;

/// Declared kind of a model field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Integer,
    Bool,
    Text,
    Bytes,
    Float,
    Time,
    Json,
    /// A sequence of non-byte values. Never materialized as a column.
    Slice,
    /// A nested struct other than time. Never materialized as a column.
    Struct,
}

impl FieldKind {
    /// Whether values of this kind live in a single column
    pub fn is_scalar(&self) -> bool {
        !matches!(self, FieldKind::Slice | FieldKind::Struct)
    }

    /// Infer the kind from a physical type reported by the backend
    pub fn from_physical(physical: &str) -> FieldKind {
        let t = physical.to_ascii_lowercase();
        if t.contains("bool") {
            FieldKind::Bool
        } else if t.contains("int") || t == "serial" || t == "bigserial" {
            FieldKind::Integer
        } else if t.contains("json") {
            FieldKind::Json
        } else if t.contains("char") || t.contains("text") || t.contains("clob") {
            FieldKind::Text
        } else if t.contains("blob") || t.contains("binary") || t.contains("bytea") || t.starts_with("bit") {
            FieldKind::Bytes
        } else if t.contains("real")
            || t.contains("floa")
            || t.contains("doub")
            || t.contains("dec")
            || t.contains("numeric")
        {
            FieldKind::Float
        } else if t.contains("date") || t.contains("time") {
            FieldKind::Time
        } else {
            FieldKind::Text
        }
    }
}

fn json_type(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "TEXT",
        Dialect::Postgres | Dialect::Cockroach => "JSONB",
        Dialect::Mysql | Dialect::Maria => "JSON",
    }
}

/// Physical column type for a declared kind.
///
/// Auto-increment primary keys are rendered by the DDL assembler since their
/// syntax spans the type and the constraint.
pub fn column_type(kind: FieldKind, tags: &ColumnTags, dialect: Dialect) -> String {
    match kind {
        FieldKind::Integer | FieldKind::Bool => "INTEGER".to_string(),
        FieldKind::Float => "DECIMAL(10,5)".to_string(),
        FieldKind::Time => "BIGINT".to_string(),
        FieldKind::Text => {
            if tags.json {
                json_type(dialect).to_string()
            } else if tags.text {
                "TEXT".to_string()
            } else {
                format!("VARCHAR({})", tags.size.unwrap_or(255))
            }
        }
        FieldKind::Json | FieldKind::Slice | FieldKind::Struct => {
            if tags.text {
                "TEXT".to_string()
            } else {
                json_type(dialect).to_string()
            }
        }
        FieldKind::Bytes => match (tags.size, dialect) {
            (_, Dialect::Sqlite) => "BLOB".to_string(),
            (Some(n), Dialect::Postgres | Dialect::Cockroach) => format!("BIT VARYING({})", n),
            (None, Dialect::Postgres | Dialect::Cockroach) => "BYTEA".to_string(),
            (Some(n), Dialect::Mysql | Dialect::Maria) => format!("VARBINARY({})", n),
            (None, Dialect::Mysql | Dialect::Maria) => "BLOB".to_string(),
        },
    }
}

/// Default expression seeding a time column with the current Unix time
pub fn time_default(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "(strftime('%s','now'))",
        Dialect::Postgres | Dialect::Cockroach => "extract(epoch from now())",
        Dialect::Mysql | Dialect::Maria => "0",
    }
}

/// Expression producing the current Unix time inside triggers
pub fn now_expression(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite => "strftime('%s','now')",
        Dialect::Postgres | Dialect::Cockroach => "extract(epoch from now())",
        Dialect::Mysql | Dialect::Maria => "UNIX_TIMESTAMP()",
    }
}

/// Implicit CHECK constraint a kind carries (booleans are stored as 0/1)
pub fn kind_check(kind: FieldKind, quoted_column: &str) -> Option<String> {
    match kind {
        FieldKind::Bool => Some(format!("CHECK ({} IN (0,1))", quoted_column)),
        _ => None,
    }
}

/// Whether a physical type must be cast to a portable type when read back
pub fn needs_read_cast(physical: &str, dialect: Dialect) -> bool {
    let t = physical.to_ascii_lowercase();
    match dialect {
        Dialect::Sqlite => false,
        Dialect::Postgres | Dialect::Cockroach => {
            t.contains("json")
                || t.starts_with("numeric")
                || t.starts_with("decimal")
                || t.starts_with("bit")
                || t.starts_with("varbit")
        }
        Dialect::Mysql | Dialect::Maria => {
            t.starts_with("decimal") || t.starts_with("numeric") || t.starts_with("json")
        }
    }
}

/// Projection entry reading a column as a portable type, when one is needed
pub fn read_cast(quoted_column: &str, physical: &str, dialect: Dialect) -> Option<String> {
    if !needs_read_cast(physical, dialect) {
        return None;
    }
    let t = physical.to_ascii_lowercase();
    let expr = match dialect {
        Dialect::Postgres | Dialect::Cockroach => {
            if t.starts_with("numeric") || t.starts_with("decimal") {
                format!("CAST({} AS DOUBLE PRECISION)", quoted_column)
            } else {
                format!("CAST({} AS TEXT)", quoted_column)
            }
        }
        Dialect::Mysql | Dialect::Maria => {
            if t.starts_with("json") {
                format!("CAST({} AS CHAR)", quoted_column)
            } else {
                format!("({} + 0E0)", quoted_column)
            }
        }
        Dialect::Sqlite => return None,
    };
    Some(format!("{} AS {}", expr, quoted_column))
}

/// Convert a field or struct name to snake_case
pub fn to_snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = if i > 0 { Some(chars[i - 1]) } else { None };
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let boundary = match prev {
                Some(p) => {
                    p.is_lowercase() || p.is_ascii_digit() || (p.is_uppercase() && next_is_lower)
                }
                None => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(*c);
        }
    }
    out
}
