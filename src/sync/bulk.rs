//! Initial snapshot transfer
//!
//! Every user table is streamed to a peer in primary-key order, one page per
//! `sync_data` message, pausing between full pages.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use signal_system::MessageBus;
use store_object::registry::introspect::is_bookkeeping;
use store_object::{DbContext, MapBuilder, Table};

use super::message::{row_to_json, SyncMessage};
use crate::errors::SyncHausError;

/// Where and how a snapshot is pushed
pub struct BulkPush<'a> {
    pub ctx: &'a Arc<DbContext>,
    pub bus: &'a Arc<dyn MessageBus>,
    pub database: &'a str,
    pub from: &'a str,
    pub target: &'a str,
    pub topic: &'a str,
    pub secure: bool,
    pub page_size: i64,
    pub page_delay: Duration,
    pub cancel: &'a CancellationToken,
}

/// Order tables so that referenced tables come before the ones pointing at
/// them. Cycles and self references keep their input order.
pub fn dependency_order(tables: Vec<Arc<Table>>) -> Vec<Arc<Table>> {
    let names: HashSet<String> = tables.iter().map(|t| t.name.clone()).collect();
    let mut placed: HashSet<String> = HashSet::new();
    let mut ordered = Vec::with_capacity(tables.len());
    let mut pending = tables;

    while !pending.is_empty() {
        let (ready, blocked): (Vec<_>, Vec<_>) = pending.into_iter().partition(|t| {
            t.foreign_keys.iter().all(|fk| {
                fk.to_table == t.name || !names.contains(&fk.to_table) || placed.contains(&fk.to_table)
            })
        });
        if ready.is_empty() {
            ordered.extend(blocked);
            break;
        }
        for table in &ready {
            placed.insert(table.name.clone());
        }
        ordered.extend(ready);
        pending = blocked;
    }
    ordered
}

/// User tables of a database, parents first
pub async fn user_tables(ctx: &DbContext, database: &str) -> Result<Vec<Arc<Table>>, SyncHausError> {
    let mut tables = Vec::new();
    for name in ctx.get_all_tables(database).await? {
        if is_bookkeeping(&name) {
            continue;
        }
        tables.push(ctx.get_table(&name, database).await?);
    }
    Ok(dependency_order(tables))
}

impl BulkPush<'_> {
    /// Push every table; returns the number of pages sent.
    pub async fn run(&self) -> Result<usize, SyncHausError> {
        let mut pages = 0;
        for table in user_tables(self.ctx, self.database).await? {
            pages += self.push_table(&table).await?;
            if self.cancel.is_cancelled() {
                break;
            }
        }
        tracing::info!(target_node = %self.target, pages, "bulk sync sent");
        Ok(pages)
    }

    async fn push_table(&self, table: &Table) -> Result<usize, SyncHausError> {
        let page_size = self.page_size.max(1);
        let mut page = 1;
        let mut sent = 0;
        loop {
            let rows = MapBuilder::new(self.ctx.clone(), &table.name)
                .database(self.database)
                .order_by(&[table.pk.as_str()])
                .limit(page_size)
                .page(page)
                .no_cache()
                .all()
                .await;
            let rows = match rows {
                Ok(rows) => rows,
                Err(e) if e.is_no_data() => break,
                Err(e) => return Err(e.into()),
            };
            let full = rows.len() as i64 >= page_size;

            let message = SyncMessage::SyncData {
                from: self.from.to_string(),
                table: table.name.clone(),
                page,
                rows: rows.iter().map(row_to_json).collect(),
            };
            self.bus
                .publish_to(self.target, self.topic, message.to_message()?, self.secure)
                .await?;
            sent += 1;
            tracing::debug!(table = %table.name, page, rows = rows.len(), "sync page sent");

            if !full {
                break;
            }
            page += 1;
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.page_delay) => {}
            }
        }
        Ok(sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store_object::TableSchema;
    use type_mapping::{Dialect, FieldKind};

    fn table(name: &str, parent: Option<&str>) -> Arc<Table> {
        let mut schema = TableSchema::new(name).column("id", FieldKind::Integer, &["pk", "autoinc"]);
        if let Some(parent) = parent {
            let fk = format!("fk:{}.id", parent);
            schema = schema.column("parent_id", FieldKind::Integer, &[fk.as_str()]);
        }
        Arc::new(Table::from_schema(&schema, Dialect::Sqlite).unwrap())
    }

    #[test]
    fn test_parents_first() {
        let ordered = dependency_order(vec![
            table("comments", Some("posts")),
            table("posts", Some("users")),
            table("users", None),
        ]);
        let names: Vec<&str> = ordered.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["users", "posts", "comments"]);
    }

    #[test]
    fn test_self_reference_and_external_parent() {
        let ordered = dependency_order(vec![
            table("tree", Some("tree")),
            table("orders", Some("customers")),
        ]);
        assert_eq!(ordered.len(), 2);
        assert_eq!(ordered[0].name, "tree");
    }
}
