//! Live schema introspection
//!
//! Catalog queries cast their text columns so the `Any` driver can decode
//! them on every backend.

use type_mapping::{DbValue, Dialect};

use super::{Database, Table};
use crate::errors::DbError;
use crate::exec::{fetch_rows, ExecOptions};

/// Bookkeeping table holding serialized descriptors
pub const TABLES_INFOS: &str = "_tables_infos";
/// Bookkeeping table fed by change triggers
pub const TRIGGERS_QUEUE: &str = "_triggers_queue";

/// Whether a table is internal bookkeeping rather than user data
pub fn is_bookkeeping(table: &str) -> bool {
    table == TABLES_INFOS || table == TRIGGERS_QUEUE || table.starts_with("sqlite_")
}

/// A column as reported by the backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveColumn {
    pub name: String,
    pub physical: String,
    pub pk: bool,
}

fn text(value: Option<&DbValue>) -> String {
    match value {
        Some(DbValue::Text(s)) => s.clone(),
        Some(DbValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Names of every table in the database
pub async fn list_tables(db: &Database) -> Result<Vec<String>, DbError> {
    let sql = match db.dialect {
        Dialect::Sqlite => {
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name"
        }
        Dialect::Postgres => {
            "SELECT tablename::TEXT AS name FROM pg_catalog.pg_tables WHERE schemaname NOT IN ('pg_catalog', 'information_schema') ORDER BY tablename"
        }
        Dialect::Cockroach => {
            "SELECT table_name::TEXT AS name FROM information_schema.tables WHERE table_schema = 'public' ORDER BY table_name"
        }
        Dialect::Mysql | Dialect::Maria => {
            "SELECT CAST(table_name AS CHAR) AS name FROM information_schema.tables WHERE table_schema = DATABASE() ORDER BY table_name"
        }
    };
    let rows = fetch_rows(db, sql, &[], ExecOptions::default()).await?;
    Ok(rows.iter().map(|r| text(r.first())).collect())
}

/// Columns of one table in ordinal order. Empty when the table is absent.
pub async fn columns(db: &Database, table: &str) -> Result<Vec<LiveColumn>, DbError> {
    let arg = [DbValue::Text(table.to_string())];
    match db.dialect {
        Dialect::Sqlite => {
            let rows = fetch_rows(
                db,
                "SELECT name, type, pk FROM pragma_table_info($1)",
                &arg,
                ExecOptions::default(),
            )
            .await?;
            Ok(rows
                .iter()
                .map(|r| LiveColumn {
                    name: text(r.get("name")),
                    physical: text(r.get("type")),
                    pk: r.get("pk").and_then(DbValue::as_i64).unwrap_or(0) > 0,
                })
                .collect())
        }
        Dialect::Postgres | Dialect::Cockroach => {
            let rows = fetch_rows(
                db,
                "SELECT column_name::TEXT AS name, data_type::TEXT AS type FROM information_schema.columns \
                 WHERE table_name = $1 AND table_schema = current_schema() ORDER BY ordinal_position",
                &arg,
                ExecOptions::default(),
            )
            .await?;
            let pk_rows = fetch_rows(
                db,
                "SELECT kcu.column_name::TEXT AS name FROM information_schema.table_constraints tc \
                 JOIN information_schema.key_column_usage kcu \
                 ON tc.constraint_name = kcu.constraint_name AND tc.table_name = kcu.table_name \
                 WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_name = $1",
                &arg,
                ExecOptions::default(),
            )
            .await?;
            let pks: Vec<String> = pk_rows.iter().map(|r| text(r.first())).collect();
            Ok(rows
                .iter()
                .map(|r| {
                    let name = text(r.get("name"));
                    LiveColumn {
                        pk: pks.contains(&name),
                        physical: text(r.get("type")),
                        name,
                    }
                })
                .collect())
        }
        Dialect::Mysql | Dialect::Maria => {
            let rows = fetch_rows(
                db,
                "SELECT CAST(column_name AS CHAR) AS name, CAST(column_type AS CHAR) AS type, \
                 CAST(column_key AS CHAR) AS col_key FROM information_schema.columns \
                 WHERE table_schema = DATABASE() AND table_name = ? ORDER BY ordinal_position",
                &arg,
                ExecOptions::default(),
            )
            .await?;
            Ok(rows
                .iter()
                .map(|r| LiveColumn {
                    name: text(r.get("name")),
                    physical: text(r.get("type")),
                    pk: text(r.get("col_key")) == "PRI",
                })
                .collect())
        }
    }
}

/// Stored descriptor from `_tables_infos`, if the bookkeeping table has one
pub async fn stored_descriptor(db: &Database, table: &str) -> Result<Option<Table>, DbError> {
    let tables = list_tables(db).await?;
    if !tables.iter().any(|t| t == TABLES_INFOS) {
        return Ok(None);
    }
    let sql = type_mapping::adapt_placeholders(
        &format!(
            "SELECT descriptor FROM {} WHERE name = ?",
            db.quote(TABLES_INFOS)
        ),
        db.dialect,
    );
    let rows = fetch_rows(
        db,
        &sql,
        &[DbValue::Text(table.to_string())],
        ExecOptions::default(),
    )
    .await?;
    let Some(raw) = rows.first().map(|r| text(r.first())) else {
        return Ok(None);
    };
    match serde_json::from_str::<Table>(&raw) {
        Ok(descriptor) => Ok(Some(descriptor)),
        Err(e) => {
            tracing::warn!(table = %table, error = %e, "ignoring unreadable table descriptor");
            Ok(None)
        }
    }
}

/// Load a descriptor for a table that exists in the backend
pub async fn load_table(db: &Database, table: &str) -> Result<Option<Table>, DbError> {
    let live = columns(db, table).await?;
    if live.is_empty() {
        return Ok(None);
    }

    if let Some(mut stored) = stored_descriptor(db, table).await? {
        for column in &live {
            stored
                .types
                .insert(column.name.clone(), column.physical.clone());
        }
        return Ok(Some(stored));
    }

    let pairs: Vec<(String, String)> = live
        .iter()
        .map(|c| (c.name.clone(), c.physical.clone()))
        .collect();
    let pk = live.iter().find(|c| c.pk).map(|c| c.name.as_str());
    Ok(Some(Table::from_live(table, &pairs, pk)))
}
