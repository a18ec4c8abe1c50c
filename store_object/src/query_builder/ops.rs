//! Statement execution shared by both builders
//!
//! Every mutation follows the same tail: run the statement, fire hooks with one
//! [`HookData`] per affected row, invalidate the row caches, then publish the
//! invalidation on the cache topic.

use std::sync::Arc;

use cache_system::{CacheKey, InvalidationKind};
use signal_system::{EventType, HookData};
use type_mapping::{adapt_concat_len, adapt_set, read_cast, DbValue, Dialect, Row, RowMap};

use crate::context::DbContext;
use crate::errors::DbError;
use crate::exec::{execute, fetch_rows, ExecOptions};
use crate::query_builder::filter::QueryFilter;
use crate::query_builder::state::{finalize, QueryState};
use crate::registry::introspect::TABLES_INFOS;
use crate::registry::{Database, Table};

/// Result of an INSERT
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub rows_affected: u64,
    /// Generated primary key, when the backend reports one
    pub last_insert_id: Option<i64>,
}

/// A SELECT ready to run
#[derive(Debug)]
pub(crate) struct Prepared {
    pub db: Arc<Database>,
    pub sql: String,
    pub args: Vec<DbValue>,
    pub key: CacheKey,
}

pub(crate) fn options<'a>(ctx: &'a DbContext, state: &'a QueryState) -> ExecOptions<'a> {
    ctx.exec_options(state.cancel.as_ref(), state.debug)
}

fn resolve(ctx: &DbContext, state: &QueryState) -> Result<Arc<Database>, DbError> {
    ctx.database(&state.database)
}

/// `*`, or an explicit projection when some column needs a read cast
pub(crate) fn projection(db: &Database, table: Option<&Table>) -> String {
    let Some(table) = table else {
        return "*".to_string();
    };
    if db.dialect == Dialect::Sqlite {
        return "*".to_string();
    }
    let mut casted = false;
    let columns: Vec<String> = table
        .columns
        .iter()
        .map(|c| {
            let quoted = db.quote(c);
            let physical = table.types.get(c).map(String::as_str).unwrap_or("");
            match read_cast(&quoted, physical, db.dialect) {
                Some(cast) => {
                    casted = true;
                    cast
                }
                None => quoted,
            }
        })
        .collect();
    if casted {
        columns.join(", ")
    } else {
        "*".to_string()
    }
}

/// Descriptor used for projections. SQLite never needs one.
async fn read_descriptor(ctx: &DbContext, db: &Database, table: &str) -> Option<Arc<Table>> {
    if let Some(t) = db.table(table) {
        return Some(t);
    }
    if db.dialect == Dialect::Sqlite {
        return None;
    }
    ctx.get_table(table, &db.name).await.ok()
}

pub(crate) async fn prepare_select(
    ctx: &DbContext,
    state: &QueryState,
) -> Result<Prepared, DbError> {
    let db = resolve(ctx, state)?;
    let descriptor = if state.raw_query.is_none() && state.selected.is_empty() {
        read_descriptor(ctx, &db, &state.table).await
    } else {
        None
    };
    let (canonical, args) = state.build_select(db.dialect, &projection(&db, descriptor.as_deref()));
    let key = state.cache_key(&db.name, &canonical, &args);
    let (sql, args) = finalize(&canonical, args, db.dialect);
    Ok(Prepared { db, sql, args, key })
}

pub(crate) async fn run_select(
    ctx: &DbContext,
    state: &QueryState,
    prepared: &Prepared,
) -> Result<Vec<Row>, DbError> {
    fetch_rows(&prepared.db, &prepared.sql, &prepared.args, options(ctx, state)).await
}

pub(crate) async fn count(ctx: &DbContext, state: &QueryState) -> Result<i64, DbError> {
    let db = resolve(ctx, state)?;
    let (canonical, args) = state.build_count(db.dialect);
    let (sql, args) = finalize(&canonical, args, db.dialect);
    let rows = fetch_rows(&db, &sql, &args, options(ctx, state)).await?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(DbValue::as_i64)
        .unwrap_or(0))
}

/// Rows matching the builder's WHERE clause, used to build hook payloads
async fn matching_rows(
    ctx: &DbContext,
    state: &QueryState,
    db: &Database,
    table: &Table,
) -> Result<Vec<RowMap>, DbError> {
    let mut select = state.clone();
    select.selected.clear();
    select.order_by.clear();
    select.pagination = Default::default();
    select.raw_query = None;
    let (canonical, args) = select.build_select(db.dialect, &projection(db, Some(table)));
    let (sql, args) = finalize(&canonical, args, db.dialect);
    let rows = fetch_rows(db, &sql, &args, options(ctx, state)).await?;
    Ok(rows.into_iter().map(Row::into_map).collect())
}

async fn rows_by_pk(
    ctx: &DbContext,
    state: &QueryState,
    db: &Database,
    table: &Table,
    pks: &[DbValue],
) -> Result<Vec<RowMap>, DbError> {
    if pks.is_empty() {
        return Ok(Vec::new());
    }
    let mut select = QueryState::new(&table.name);
    select.database = db.name.clone();
    select.cancel = state.cancel.clone();
    select.debug = state.debug;
    select.filter_by(QueryFilter::in_values(&table.pk, pks));
    matching_rows(ctx, &select, db, table).await
}

fn column_placeholder(db: &Database, table: &Table, column: &str) -> &'static str {
    let is_json = table
        .types
        .get(column)
        .is_some_and(|t| t.to_ascii_lowercase().contains("json"));
    if is_json && db.dialect.is_postgres_family() {
        "CAST(? AS JSONB)"
    } else {
        "?"
    }
}

/// Values kept for an INSERT: known columns only, coerced to their declared kind.
///
/// A zero primary key and zero `now` columns are left to the backend default.
fn insert_columns(
    table: &Table,
    values: impl IntoIterator<Item = (String, DbValue)>,
) -> Result<Vec<(String, DbValue)>, DbError> {
    let mut kept = Vec::new();
    for (column, value) in values {
        if !table.has_column(&column) || table.has_tag(&column, "-") {
            tracing::trace!(table = %table.name, column = %column, "skipping unknown column");
            continue;
        }
        if column == table.pk && (value.is_zero() || value.is_null()) {
            continue;
        }
        if table.has_tag(&column, "now") && (value.is_zero() || value.is_null()) {
            continue;
        }
        let value = value.coerce(table.kind(&column))?;
        kept.push((column, value));
    }
    kept.sort_by_key(|(c, _)| table.columns.iter().position(|x| x == c));
    Ok(kept)
}

pub(crate) async fn insert(
    ctx: &DbContext,
    state: &QueryState,
    values: Vec<(String, DbValue)>,
) -> Result<InsertOutcome, DbError> {
    let db = resolve(ctx, state)?;
    let table = ctx.get_table(&state.table, &db.name).await?;
    let columns = insert_columns(&table, values)?;

    let mut sql = if columns.is_empty() {
        match db.dialect {
            Dialect::Mysql | Dialect::Maria => format!("INSERT INTO {} () VALUES ()", table.name),
            _ => format!("INSERT INTO {} DEFAULT VALUES", table.name),
        }
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table.name,
            columns
                .iter()
                .map(|(c, _)| c.as_str())
                .collect::<Vec<_>>()
                .join(", "),
            columns
                .iter()
                .map(|(c, _)| column_placeholder(&db, &table, c))
                .collect::<Vec<_>>()
                .join(", ")
        )
    };
    // the Any driver reports no insert id for SQLite, so the key is read back
    let returning = !db.dialect.is_mysql_family();
    if returning {
        sql.push_str(&format!(" RETURNING {}", table.pk));
    }

    let args: Vec<DbValue> = columns.iter().map(|(_, v)| v.clone()).collect();
    let (sql, args) = finalize(&sql, args, db.dialect);
    let outcome = if returning {
        let rows = fetch_rows(&db, &sql, &args, options(ctx, state)).await?;
        InsertOutcome {
            rows_affected: rows.len() as u64,
            last_insert_id: rows.first().and_then(|r| r.first()).and_then(DbValue::as_i64),
        }
    } else {
        let done = execute(&db, &sql, &args, options(ctx, state)).await?;
        InsertOutcome {
            rows_affected: done.rows_affected,
            last_insert_id: done.last_insert_id,
        }
    };

    let mut data: RowMap = columns.into_iter().collect();
    let pk_value = match data.get(&table.pk) {
        Some(v) => Some(v.clone()),
        None => outcome.last_insert_id.map(DbValue::Int),
    };
    let mut hooks = Vec::new();
    if ctx.signals.has_callbacks(EventType::Create) {
        if let Some(pk) = pk_value {
            let stored = rows_by_pk(ctx, state, &db, &table, std::slice::from_ref(&pk)).await?;
            match stored.into_iter().next() {
                Some(row) => data = row,
                None => {
                    data.insert(table.pk.clone(), pk);
                }
            }
        }
        hooks.push(HookData::new(EventType::Create, &db.name, &table.name, &table.pk).with_data(data));
    }
    ctx.after_mutation(InvalidationKind::Create, &db.name, &table.name, &hooks);
    Ok(outcome)
}

pub(crate) async fn set(
    ctx: &DbContext,
    state: &QueryState,
    assignment: &str,
    set_args: Vec<DbValue>,
) -> Result<u64, DbError> {
    if !state.has_where() {
        return Err(DbError::MissingWhere("set"));
    }
    let db = resolve(ctx, state)?;
    let table = ctx.get_table(&state.table, &db.name).await?;
    let with_hooks = ctx.signals.has_callbacks(EventType::Update);

    let old_rows = if with_hooks {
        matching_rows(ctx, state, &db, &table).await?
    } else {
        Vec::new()
    };

    let (clause, where_args) = state.where_clause(db.dialect);
    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table.name,
        adapt_concat_len(&adapt_set(assignment), db.dialect),
        clause
    );
    let mut args = set_args;
    args.extend(where_args);
    let (sql, args) = finalize(&sql, args, db.dialect);
    let done = execute(&db, &sql, &args, options(ctx, state)).await?;

    let mut hooks = Vec::with_capacity(old_rows.len());
    if with_hooks {
        let pks: Vec<DbValue> = old_rows
            .iter()
            .filter_map(|r| r.get(&table.pk).cloned())
            .collect();
        let new_rows = rows_by_pk(ctx, state, &db, &table, &pks).await?;
        for old in old_rows {
            let new = new_rows
                .iter()
                .find(|n| n.get(&table.pk) == old.get(&table.pk))
                .cloned()
                .unwrap_or_default();
            hooks.push(
                HookData::new(EventType::Update, &db.name, &table.name, &table.pk)
                    .with_data(new)
                    .with_old(old),
            );
        }
    }
    ctx.after_mutation(InvalidationKind::Update, &db.name, &table.name, &hooks);
    Ok(done.rows_affected)
}

pub(crate) async fn delete(ctx: &DbContext, state: &QueryState) -> Result<u64, DbError> {
    if !state.has_where() {
        return Err(DbError::MissingWhere("delete"));
    }
    let db = resolve(ctx, state)?;
    let table = ctx.get_table(&state.table, &db.name).await?;

    let removed = if ctx.signals.has_callbacks(EventType::Delete) {
        matching_rows(ctx, state, &db, &table).await?
    } else {
        Vec::new()
    };

    let (clause, args) = state.where_clause(db.dialect);
    let sql = format!("DELETE FROM {} WHERE {}", table.name, clause);
    let (sql, args) = finalize(&sql, args, db.dialect);
    let done = execute(&db, &sql, &args, options(ctx, state)).await?;

    let hooks: Vec<HookData> = removed
        .into_iter()
        .map(|row| HookData::new(EventType::Delete, &db.name, &table.name, &table.pk).with_data(row))
        .collect();
    ctx.after_mutation(InvalidationKind::Delete, &db.name, &table.name, &hooks);
    Ok(done.rows_affected)
}

pub(crate) async fn drop_table(ctx: &DbContext, state: &QueryState) -> Result<u64, DbError> {
    let db = resolve(ctx, state)?;
    let pk = db
        .table(&state.table)
        .map(|t| t.pk.clone())
        .unwrap_or_else(|| "id".to_string());

    let sql = format!("DROP TABLE IF EXISTS {}", db.quote(&state.table));
    let done = execute(&db, &sql, &[], options(ctx, state)).await?;
    db.remove_table(&state.table);

    let forget = finalize(
        &format!("DELETE FROM {} WHERE name = ?", db.quote(TABLES_INFOS)),
        vec![DbValue::Text(state.table.clone())],
        db.dialect,
    );
    if let Err(e) = execute(&db, &forget.0, &forget.1, ExecOptions::default()).await {
        tracing::debug!(table = %state.table, error = %e, "no stored descriptor to forget");
    }

    let hooks = [HookData::new(EventType::Drop, &db.name, &state.table, &pk)];
    ctx.after_mutation(InvalidationKind::Drop, &db.name, &state.table, &hooks);
    Ok(done.rows_affected)
}
