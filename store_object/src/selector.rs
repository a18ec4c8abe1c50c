//! Free-form typed querying
//!
//! A [`Selector`] runs caller-written SQL and fills records, mappings or a
//! channel. Results go through the generic query cache keyed by database,
//! statement and arguments.

use futures::TryStreamExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use cache_system::CacheKey;
use type_mapping::{adapt_concat_len, adapt_named, DbValue, Row, RowMap};

use crate::context::DbContext;
use crate::errors::DbError;
use crate::exec::{fetch_rows, stream_rows};
use crate::query_builder::state::finalize;
use crate::traits::{Model, Nested};

#[derive(Debug, Clone)]
pub struct Selector {
    ctx: Arc<DbContext>,
    database: String,
    statement: String,
    args: Vec<DbValue>,
    debug: bool,
    no_cache: bool,
    cancel: Option<CancellationToken>,
}

impl Selector {
    pub fn new(ctx: Arc<DbContext>) -> Self {
        Self {
            ctx,
            database: String::new(),
            statement: String::new(),
            args: Vec::new(),
            debug: false,
            no_cache: false,
            cancel: None,
        }
    }

    pub fn database(mut self, name: &str) -> Self {
        self.database = name.to_string();
        self
    }

    /// Statement with positional `?` arguments
    pub fn query(mut self, sql: &str, args: Vec<DbValue>) -> Self {
        self.statement = sql.to_string();
        self.args = args;
        self
    }

    /// Statement with `:name` parameters
    pub fn named(mut self, sql: &str, params: &HashMap<String, DbValue>) -> Result<Self, DbError> {
        let (statement, args) = adapt_named(sql, params)?;
        self.statement = statement;
        self.args = args;
        Ok(self)
    }

    pub fn debug(mut self) -> Self {
        self.debug = true;
        self
    }

    pub fn no_cache(mut self) -> Self {
        self.no_cache = true;
        self
    }

    pub fn context(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    async fn rows(&self) -> Result<Arc<Vec<Row>>, DbError> {
        let db = self.ctx.database(&self.database)?;
        let canonical = adapt_concat_len(&self.statement, db.dialect);

        let mut key = CacheKey::new(&db.name, "").with_args(&self.args);
        key.raw_query = canonical.clone();
        if !self.no_cache {
            if let Some(rows) = self.ctx.cache.get_query(&key) {
                return Ok(rows);
            }
        }

        let (sql, args) = finalize(&canonical, self.args.clone(), db.dialect);
        let opts = self.ctx.exec_options(self.cancel.as_ref(), self.debug);
        let rows = Arc::new(fetch_rows(&db, &sql, &args, opts).await?);
        if !self.no_cache {
            self.ctx.cache.put_query(key, rows.clone());
        }
        Ok(rows)
    }

    /// Rows as mappings
    pub async fn maps(self) -> Result<Vec<RowMap>, DbError> {
        Ok(self.rows().await?.iter().map(Row::to_map).collect())
    }

    /// Rows as records of `T`
    pub async fn records<T: Model>(self) -> Result<Vec<T>, DbError> {
        self.rows()
            .await?
            .iter()
            .map(|row| T::from_row(&row.to_map()))
            .collect()
    }

    /// Parents with their children collected from consecutive rows sharing the
    /// first column.
    pub async fn nested<T: Nested>(self) -> Result<Vec<T>, DbError> {
        let rows = self.rows().await?;
        let mut out: Vec<T> = Vec::new();
        let mut current: Option<DbValue> = None;

        for row in rows.iter() {
            let map = row.to_map();
            let head = row.first().cloned().unwrap_or(DbValue::Null);
            if current.as_ref() != Some(&head) {
                out.push(T::from_row(&map)?);
                current = Some(head);
            }
            let child = T::Child::from_row(&map)?;
            if let Some(parent) = out.last_mut() {
                parent.push_child(child);
            }
        }
        Ok(out)
    }

    /// Stream records into a channel without buffering the result set.
    ///
    /// Stops early when the receiver is dropped. Returns the number of records sent.
    pub async fn send<T: Model>(self, tx: mpsc::Sender<T>) -> Result<usize, DbError> {
        let db = self.ctx.database(&self.database)?;
        let canonical = adapt_concat_len(&self.statement, db.dialect);
        let (sql, args) = finalize(&canonical, self.args.clone(), db.dialect);
        if self.debug || self.ctx.settings.debug {
            tracing::debug!(database = %db.name, statement = %sql, args = ?args, "query");
        }

        let mut stream = stream_rows(&db, &sql, &args);
        let mut sent = 0;
        loop {
            let next = match &self.cancel {
                Some(token) => tokio::select! {
                    _ = token.cancelled() => return Err(DbError::Cancelled),
                    next = stream.try_next() => next?,
                },
                None => stream.try_next().await?,
            };
            let Some(row) = next else { break };
            let record = T::from_row(&row.into_map())?;
            if tx.send(record).await.is_err() {
                break;
            }
            sent += 1;
        }
        Ok(sent)
    }
}
