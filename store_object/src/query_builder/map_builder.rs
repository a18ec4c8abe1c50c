//! Builder yielding column mappings

use serde::Serialize;
use std::sync::Arc;

use type_mapping::{to_row_map, DbValue, Row, RowMap};

use crate::context::DbContext;
use crate::errors::DbError;
use crate::query_builder::ops::{self, InsertOutcome};
use crate::query_builder::state::QueryState;

/// Fluent builder over one table returning `column -> value` mappings
///
/// ```rust,ignore
/// let rows = engine
///     .table("users")
///     .filter("email,age", args!["a@b", 30])
///     .order_by(&["-created"])
///     .all()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct MapBuilder {
    ctx: Arc<DbContext>,
    state: QueryState,
}

impl MapBuilder {
    pub fn new(ctx: Arc<DbContext>, table: &str) -> Self {
        let mut state = QueryState::new(table);
        state.per_page = ctx.settings.pagination_per;
        Self { ctx, state }
    }

    builder_surface!();

    /// Every matching row. Fails with [`DbError::NoData`] when empty.
    pub async fn all(self) -> Result<Vec<RowMap>, DbError> {
        let prepared = ops::prepare_select(&self.ctx, &self.state).await?;
        if !self.state.no_cache {
            if let Some(rows) = self.ctx.cache.get_maps(&prepared.key) {
                return Ok(rows.as_ref().clone());
            }
        }

        let rows: Vec<RowMap> = ops::run_select(&self.ctx, &self.state, &prepared)
            .await?
            .into_iter()
            .map(Row::into_map)
            .collect();
        if rows.is_empty() {
            return Err(DbError::NoData);
        }
        if !self.state.no_cache {
            self.ctx.cache.put_maps(prepared.key, Arc::new(rows.clone()));
        }
        Ok(rows)
    }

    /// First matching row, with an implicit `LIMIT 1`
    pub async fn one(mut self) -> Result<RowMap, DbError> {
        if self.state.raw_query.is_none() {
            self.state.pagination.limit = Some(1);
        }
        let prepared = ops::prepare_select(&self.ctx, &self.state).await?;
        if !self.state.no_cache {
            if let Some(row) = self.ctx.cache.get_map(&prepared.key) {
                return Ok(row.as_ref().clone());
            }
        }

        let row = ops::run_select(&self.ctx, &self.state, &prepared)
            .await?
            .into_iter()
            .next()
            .map(Row::into_map)
            .ok_or(DbError::NoData)?;
        if !self.state.no_cache {
            self.ctx.cache.put_map(prepared.key, Arc::new(row.clone()));
        }
        Ok(row)
    }

    /// Insert one row from `column -> value` pairs
    pub async fn insert<I, K>(self, values: I) -> Result<InsertOutcome, DbError>
    where
        I: IntoIterator<Item = (K, DbValue)>,
        K: Into<String>,
    {
        let values = values.into_iter().map(|(k, v)| (k.into(), v)).collect();
        ops::insert(&self.ctx, &self.state, values).await
    }

    /// Insert one row from any serializable struct or map
    pub async fn insert_serialized<T: Serialize>(self, data: &T) -> Result<InsertOutcome, DbError> {
        let row = to_row_map(data)?;
        self.insert(row).await
    }
}
