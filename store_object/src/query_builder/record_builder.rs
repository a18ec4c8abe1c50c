//! Builder yielding typed records

use std::marker::PhantomData;
use std::sync::Arc;

use type_mapping::{DbValue, Row};

use crate::context::DbContext;
use crate::errors::DbError;
use crate::query_builder::ops::{self, InsertOutcome};
use crate::query_builder::state::QueryState;
use crate::traits::Model;

/// Fluent builder over the table bound to `T`
#[derive(Debug)]
pub struct RecordBuilder<T: Model> {
    ctx: Arc<DbContext>,
    state: QueryState,
    _model: PhantomData<fn() -> T>,
}

impl<T: Model> Clone for RecordBuilder<T> {
    fn clone(&self) -> Self {
        Self {
            ctx: self.ctx.clone(),
            state: self.state.clone(),
            _model: PhantomData,
        }
    }
}

fn decode<T: Model>(rows: Vec<Row>) -> Result<Vec<T>, DbError> {
    rows.into_iter()
        .map(|row| T::from_row(&row.into_map()))
        .collect()
}

impl<T: Model + Clone> RecordBuilder<T> {
    /// Builder over `T`'s table, in the database the model was migrated into
    pub fn new(ctx: Arc<DbContext>) -> Self {
        let mut state = QueryState::new(T::table_name());
        state.per_page = ctx.settings.pagination_per;
        state.database = ctx.model_database::<T>();
        Self {
            ctx,
            state,
            _model: PhantomData,
        }
    }

    builder_surface!();

    /// Every matching record. Fails with [`DbError::NoData`] when empty.
    pub async fn all(self) -> Result<Vec<T>, DbError> {
        let prepared = ops::prepare_select(&self.ctx, &self.state).await?;
        if !self.state.no_cache {
            if let Some(records) = self.ctx.cache.get_records::<T>(&prepared.key) {
                return Ok(records.as_ref().clone());
            }
        }

        let records = decode::<T>(ops::run_select(&self.ctx, &self.state, &prepared).await?)?;
        if records.is_empty() {
            return Err(DbError::NoData);
        }
        if !self.state.no_cache {
            self.ctx
                .cache
                .put_records(prepared.key, Arc::new(records.clone()));
        }
        Ok(records)
    }

    /// First matching record, with an implicit `LIMIT 1`
    pub async fn one(mut self) -> Result<T, DbError> {
        if self.state.raw_query.is_none() {
            self.state.pagination.limit = Some(1);
        }
        let prepared = ops::prepare_select(&self.ctx, &self.state).await?;
        if !self.state.no_cache {
            if let Some(record) = self.ctx.cache.get_record::<T>(&prepared.key) {
                return Ok(record.as_ref().clone());
            }
        }

        let record = decode::<T>(ops::run_select(&self.ctx, &self.state, &prepared).await?)?
            .into_iter()
            .next()
            .ok_or(DbError::NoData)?;
        if !self.state.no_cache {
            self.ctx
                .cache
                .put_record(prepared.key, Arc::new(record.clone()));
        }
        Ok(record)
    }

    /// Insert a record. A zero auto-increment key is left to the backend and
    /// skipped fields are never written.
    pub async fn insert(self, record: &T) -> Result<InsertOutcome, DbError> {
        let values: Vec<(String, DbValue)> = record
            .to_values()
            .into_iter()
            .map(|(column, value)| (column.to_string(), value))
            .collect();
        ops::insert(&self.ctx, &self.state, values).await
    }
}
