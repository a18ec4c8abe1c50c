//! `_triggers_queue` consumption
//!
//! Change triggers append one row per insert, update and delete. Consumers
//! take rows in id order, which removes them; rows nobody takes are pruned
//! once older than the configured retention.

use std::time::Duration;

use store_object::exec::{execute, fetch_rows, ExecOptions};
use store_object::registry::introspect::TRIGGERS_QUEUE;
use store_object::Database;
use type_mapping::{adapt_placeholders, DbValue};

use super::Migrator;
use crate::errors::SyncHausError;

/// One row change recorded by a change trigger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedChange {
    pub id: i64,
    pub table: String,
    /// `insert`, `update` or `delete`
    pub operation: String,
    /// Primary key of the changed row, as text
    pub row_pk: String,
    /// Unix seconds
    pub created_at: i64,
}

fn text(value: Option<&DbValue>) -> String {
    match value {
        Some(DbValue::Text(s)) => s.clone(),
        Some(DbValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl Migrator {
    /// Remove and return up to `limit` queued changes, oldest first
    pub async fn take_changes(
        &self,
        database: &str,
        limit: i64,
    ) -> Result<Vec<QueuedChange>, SyncHausError> {
        let db = self.ctx.database(database)?;
        self.ensure_bookkeeping(&db).await?;
        let queue = db.quote(TRIGGERS_QUEUE);

        let select = adapt_placeholders(
            &format!(
                "SELECT id, table_name, operation, row_pk, created_at FROM {} ORDER BY id LIMIT ?",
                queue
            ),
            db.dialect,
        );
        let rows = fetch_rows(&db, &select, &[DbValue::Int(limit.max(1))], ExecOptions::default())
            .await?;
        let changes: Vec<QueuedChange> = rows
            .iter()
            .map(|row| QueuedChange {
                id: row.get("id").and_then(DbValue::as_i64).unwrap_or_default(),
                table: text(row.get("table_name")),
                operation: text(row.get("operation")),
                row_pk: text(row.get("row_pk")),
                created_at: row
                    .get("created_at")
                    .and_then(DbValue::as_i64)
                    .unwrap_or_default(),
            })
            .collect();

        if let Some(last) = changes.last() {
            let delete = adapt_placeholders(
                &format!("DELETE FROM {} WHERE id <= ?", queue),
                db.dialect,
            );
            execute(&db, &delete, &[DbValue::Int(last.id)], ExecOptions::default()).await?;
        }
        Ok(changes)
    }

    /// Delete queued changes at least `max_age` old; returns how many went
    pub async fn prune_changes(
        &self,
        database: &str,
        max_age: Duration,
    ) -> Result<u64, SyncHausError> {
        let db = self.ctx.database(database)?;
        Ok(prune(&db, max_age).await?)
    }
}

pub(crate) async fn prune(db: &Database, max_age: Duration) -> Result<u64, store_object::DbError> {
    let age = i64::try_from(max_age.as_secs()).unwrap_or(i64::MAX);
    let cutoff = chrono::Utc::now().timestamp().saturating_sub(age);
    let delete = adapt_placeholders(
        &format!("DELETE FROM {} WHERE created_at <= ?", db.quote(TRIGGERS_QUEUE)),
        db.dialect,
    );
    let done = execute(db, &delete, &[DbValue::Int(cutoff)], ExecOptions::default()).await?;
    Ok(done.rows_affected)
}
