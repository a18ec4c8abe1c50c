//! Statement execution over the `Any` driver
//!
//! Arguments are bound from [`DbValue`] after portable adaptation, rows are
//! scanned into untyped slots, and every statement is recorded as a trace.

use sqlx::any::{AnyArguments, AnyRow};
use sqlx::query::Query;
use sqlx::{Any, Column, Executor as _, Row as _, TypeInfo, ValueRef};
use futures::stream::{BoxStream, StreamExt};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use type_mapping::{adapt_args, DbValue, Dialect, Row};

use crate::errors::DbError;
use crate::registry::Database;
use crate::trace::{QueryTrace, TraceRecorder};

/// Per-call execution settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions<'a> {
    pub cancel: Option<&'a CancellationToken>,
    pub debug: bool,
    pub traces: Option<&'a TraceRecorder>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
    pub last_insert_id: Option<i64>,
}

pub(crate) fn bind_all<'q>(sql: &'q str, args: &[DbValue]) -> Query<'q, Any, AnyArguments<'q>> {
    let mut query = sqlx::query(sql);
    for arg in adapt_args(args) {
        query = match arg {
            DbValue::Null => query.bind(None::<String>),
            DbValue::Bool(b) => query.bind(i64::from(b)),
            DbValue::Int(i) => query.bind(i),
            DbValue::Float(f) => query.bind(f),
            DbValue::Text(s) => query.bind(s),
            DbValue::Bytes(b) => query.bind(b),
            DbValue::Time(t) => query.bind(t.timestamp()),
            DbValue::Json(v) => query.bind(v.to_string()),
        };
    }
    query
}

/// Scan one `AnyRow` into a [`Row`] sharing the column list
pub(crate) fn scan_row(
    row: &AnyRow,
    columns: &Arc<[String]>,
    dialect: Dialect,
) -> Result<Row, DbError> {
    let mut values = Vec::with_capacity(columns.len());
    for (i, column) in columns.iter().enumerate() {
        let raw = row
            .try_get_raw(i)
            .map_err(|e| DbError::decode(column, e))?;
        if raw.is_null() {
            values.push(DbValue::Null);
            continue;
        }
        let type_name = raw.type_info().name().to_string();
        let decode = |e: sqlx::Error| DbError::decode(column, e);
        let value = match type_name.as_str() {
            "BOOLEAN" => DbValue::Bool(row.try_get::<bool, _>(i).map_err(decode)?),
            "SMALLINT" => DbValue::Int(i64::from(row.try_get::<i16, _>(i).map_err(decode)?)),
            "INTEGER" => DbValue::Int(i64::from(row.try_get::<i32, _>(i).map_err(decode)?)),
            "BIGINT" => DbValue::Int(row.try_get::<i64, _>(i).map_err(decode)?),
            "REAL" => DbValue::Float(f64::from(row.try_get::<f32, _>(i).map_err(decode)?)),
            "DOUBLE" => DbValue::Float(row.try_get::<f64, _>(i).map_err(decode)?),
            "BLOB" => {
                let bytes = row.try_get::<Vec<u8>, _>(i).map_err(decode)?;
                if dialect.is_mysql_family() {
                    DbValue::Text(String::from_utf8_lossy(&bytes).into_owned())
                } else {
                    DbValue::Bytes(bytes)
                }
            }
            _ => DbValue::Text(row.try_get::<String, _>(i).map_err(decode)?),
        };
        values.push(value);
    }
    Ok(Row::new(columns.clone(), values))
}

fn column_names(row: &AnyRow) -> Arc<[String]> {
    row.columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect::<Vec<_>>()
        .into()
}

/// Race a backend call against the cancellation token
async fn cancellable<F, T>(fut: F, cancel: Option<&CancellationToken>) -> Result<T, DbError>
where
    F: Future<Output = Result<T, DbError>>,
{
    match cancel {
        Some(token) => {
            tokio::select! {
                _ = token.cancelled() => Err(DbError::Cancelled),
                result = fut => result,
            }
        }
        None => fut.await,
    }
}

fn record(
    opts: &ExecOptions<'_>,
    db: &Database,
    sql: &str,
    args: &[DbValue],
    started: Instant,
    error: Option<&DbError>,
) {
    if opts.debug {
        tracing::debug!(database = %db.name, statement = %sql, args = ?args, "query");
    }
    if let Some(traces) = opts.traces {
        traces.record(QueryTrace {
            database: db.name.clone(),
            statement: sql.to_string(),
            args: args.to_vec(),
            duration: started.elapsed(),
            error: error.map(|e| e.to_string()),
            at: chrono::Utc::now(),
        });
    }
}

/// Run a SELECT and scan every row
pub async fn fetch_rows(
    db: &Database,
    sql: &str,
    args: &[DbValue],
    opts: ExecOptions<'_>,
) -> Result<Vec<Row>, DbError> {
    let started = Instant::now();
    let fut = async {
        let rows = bind_all(sql, args)
            .fetch_all(&db.pool)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        let Some(first) = rows.first() else {
            return Ok(Vec::new());
        };
        let columns = column_names(first);
        rows.iter()
            .map(|r| scan_row(r, &columns, db.dialect))
            .collect::<Result<Vec<_>, _>>()
    };
    let result = cancellable(fut, opts.cancel).await;
    record(&opts, db, sql, args, started, result.as_ref().err());
    result
}

/// Run an INSERT/UPDATE/DELETE
pub async fn execute(
    db: &Database,
    sql: &str,
    args: &[DbValue],
    opts: ExecOptions<'_>,
) -> Result<ExecResult, DbError> {
    let started = Instant::now();
    let fut = async {
        let done = bind_all(sql, args)
            .execute(&db.pool)
            .await
            .map_err(|e| DbError::query(sql, e))?;
        Ok(ExecResult {
            rows_affected: done.rows_affected(),
            last_insert_id: done.last_insert_id(),
        })
    };
    let result = cancellable(fut, opts.cancel).await;
    record(&opts, db, sql, args, started, result.as_ref().err());
    result
}

/// Run DDL statements in order on a single pooled connection. The first
/// failure stops the batch; earlier statements stay applied.
pub async fn execute_raw_batch(db: &Database, statements: &[String]) -> Result<(), DbError> {
    let mut conn = db
        .pool
        .acquire()
        .await
        .map_err(|e| DbError::connection(&db.name, e))?;
    if db.dialect == Dialect::Sqlite {
        // a catalog read reloads a schema another connection has changed
        conn.execute(sqlx::raw_sql("SELECT count(*) FROM sqlite_master"))
            .await
            .map_err(|e| DbError::query("SELECT count(*) FROM sqlite_master", e))?;
    }
    for statement in statements {
        tracing::debug!(database = %db.name, statement = %statement, "ddl");
        conn.execute(sqlx::raw_sql(statement))
            .await
            .map_err(|e| DbError::migration(statement, e))?;
    }
    Ok(())
}

/// Stream rows without buffering the whole result
pub fn stream_rows<'a>(
    db: &'a Database,
    sql: &'a str,
    args: &[DbValue],
) -> BoxStream<'a, Result<Row, DbError>> {
    let mut columns: Option<Arc<[String]>> = None;
    let dialect = db.dialect;
    bind_all(sql, args)
        .fetch(&db.pool)
        .map(move |row| {
            let row = row.map_err(|e| DbError::query(sql, e))?;
            let cols = columns.get_or_insert_with(|| column_names(&row)).clone();
            scan_row(&row, &cols, dialect)
        })
        .boxed()
}
