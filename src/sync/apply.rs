//! Applying replicated rows
//!
//! A received row is written as an upsert keyed by primary key, so delivering
//! the same message twice leaves the table unchanged.

use std::sync::Arc;

use store_object::{DbContext, DbError, MapBuilder, Table};
use type_mapping::{adapt_value, DbValue, RowMap};

use super::message::{row_from_json, JsonRow};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    Inserted,
    Updated,
    Unchanged,
}

fn normalize(table: &Table, column: &str, value: &DbValue) -> DbValue {
    match value.clone().coerce(table.kind(column)) {
        Ok(v) => adapt_value(v),
        Err(_) => adapt_value(value.clone()),
    }
}

/// Insert the row, or update the columns that differ from the stored one.
pub async fn upsert(
    ctx: &Arc<DbContext>,
    database: &str,
    table_name: &str,
    data: &JsonRow,
) -> Result<Applied, DbError> {
    let table = ctx.get_table(table_name, database).await?;
    let row = row_from_json(&table, data)?;
    let pk = match row.get(&table.pk) {
        Some(v) if !v.is_null() => v.clone(),
        _ => {
            return Err(DbError::decode(
                &table.pk,
                format!("replicated row for '{}' carries no primary key", table.name),
            ))
        }
    };

    let existing = MapBuilder::new(ctx.clone(), &table.name)
        .database(database)
        .filter(&format!("{} = ?", table.pk), vec![pk.clone()])
        .no_cache()
        .one()
        .await;
    let existing: RowMap = match existing {
        Ok(row) => row,
        Err(e) if e.is_no_data() => {
            MapBuilder::new(ctx.clone(), &table.name)
                .database(database)
                .insert(row)
                .await?;
            return Ok(Applied::Inserted);
        }
        Err(e) => return Err(e),
    };

    let mut columns = Vec::new();
    let mut values = Vec::new();
    for (column, value) in &row {
        if column == &table.pk {
            continue;
        }
        let stored = existing
            .get(column)
            .map(|v| normalize(&table, column, v))
            .unwrap_or(DbValue::Null);
        let incoming = normalize(&table, column, value);
        if stored != incoming {
            columns.push(column.as_str());
            values.push(value.clone());
        }
    }
    if columns.is_empty() {
        return Ok(Applied::Unchanged);
    }

    tracing::trace!(table = %table.name, columns = ?columns, "updating replicated row");
    MapBuilder::new(ctx.clone(), &table.name)
        .database(database)
        .filter(&format!("{} = ?", table.pk), vec![pk])
        .set(&columns.join(","), values)
        .await?;
    Ok(Applied::Updated)
}

/// Delete the row with the given primary key value
pub async fn remove(
    ctx: &Arc<DbContext>,
    database: &str,
    table_name: &str,
    data: &JsonRow,
) -> Result<u64, DbError> {
    let table = ctx.get_table(table_name, database).await?;
    let row = row_from_json(&table, data)?;
    let Some(pk) = row.get(&table.pk).filter(|v| !v.is_null()).cloned() else {
        return Ok(0);
    };
    MapBuilder::new(ctx.clone(), &table.name)
        .database(database)
        .filter(&format!("{} = ?", table.pk), vec![pk])
        .delete()
        .await
}
