//! Query builders
//!
//! [`MapBuilder`] yields column mappings and [`RecordBuilder`] yields typed
//! records. Both share one composition surface over [`QueryState`]; statements
//! are composed in canonical form and adapted to the dialect just before
//! execution.

/// Composition methods shared by both builders. Each method records itself in
/// the state's call trace.
macro_rules! builder_surface {
    () => {
        /// Select the backing database
        pub fn database(mut self, name: &str) -> Self {
            self.state.database(name);
            self
        }

        /// Projection
        pub fn select(mut self, columns: &[&str]) -> Self {
            self.state.select(columns);
            self
        }

        /// Conjunctive WHERE clause. A clause without operators is field sugar:
        /// `"email,age"` becomes `t.email = ? AND t.age = ?`, `|` separates OR.
        pub fn filter(mut self, clause: &str, args: Vec<type_mapping::DbValue>) -> Self {
            self.state.filter(clause, args);
            self
        }

        /// Alias of [`filter`](Self::filter)
        pub fn r#where(self, clause: &str, args: Vec<type_mapping::DbValue>) -> Self {
            self.filter(clause, args)
        }

        /// Structured condition
        pub fn filter_by(mut self, filter: $crate::query_builder::QueryFilter) -> Self {
            self.state.filter_by(filter);
            self
        }

        /// Replace the whole statement; limit and ordering no longer apply
        pub fn query(mut self, raw: &str, args: Vec<type_mapping::DbValue>) -> Self {
            self.state.query(raw, args);
            self
        }

        pub fn limit(mut self, n: i64) -> Self {
            self.state.limit(n);
            self
        }

        /// 1-based page; `OFFSET = (page - 1) * limit`
        pub fn page(mut self, n: i64) -> Self {
            self.state.page(n);
            self
        }

        /// `+name` or `name` sorts ascending, `-name` descending
        pub fn order_by(mut self, fields: &[&str]) -> Self {
            self.state.order_by(fields);
            self
        }

        /// Cancellation for the terminal operation
        pub fn context(mut self, token: tokio_util::sync::CancellationToken) -> Self {
            self.state.trace.push("context");
            self.state.cancel = Some(token);
            self
        }

        /// Log the final statement and its arguments
        pub fn debug(mut self) -> Self {
            self.state.trace.push("debug");
            self.state.debug = true;
            self
        }

        /// Bypass the read cache for this call
        pub fn no_cache(mut self) -> Self {
            self.state.trace.push("no_cache");
            self.state.no_cache = true;
            self
        }

        /// Builder calls made so far, in order
        pub fn call_trace(&self) -> &[&'static str] {
            &self.state.trace
        }

        pub fn state(&self) -> &$crate::query_builder::QueryState {
            &self.state
        }

        /// Number of matching rows
        pub async fn count(self) -> Result<i64, $crate::errors::DbError> {
            $crate::query_builder::ops::count(&self.ctx, &self.state).await
        }

        /// Execute UPDATE; requires a WHERE clause. `"name,age"` expands to
        /// `name = ?, age = ?`.
        pub async fn set(
            self,
            assignment: &str,
            args: Vec<type_mapping::DbValue>,
        ) -> Result<u64, $crate::errors::DbError> {
            $crate::query_builder::ops::set(&self.ctx, &self.state, assignment, args).await
        }

        /// Execute DELETE; requires a WHERE clause
        pub async fn delete(self) -> Result<u64, $crate::errors::DbError> {
            $crate::query_builder::ops::delete(&self.ctx, &self.state).await
        }

        /// Execute DROP TABLE
        pub async fn drop(self) -> Result<u64, $crate::errors::DbError> {
            $crate::query_builder::ops::drop_table(&self.ctx, &self.state).await
        }
    };
}

pub mod filter;
pub mod map_builder;
pub(crate) mod ops;
pub mod ordering;
pub mod pagination;
pub mod record_builder;
pub mod sql_generation;
pub mod state;

#[cfg(test)]
mod tests;

pub use filter::{FilterValue, LogicalOperator, QueryCondition, QueryFilter, QueryOperator};
pub use map_builder::MapBuilder;
pub use ops::InsertOutcome;
pub use ordering::SortOrder;
pub use pagination::Pagination;
pub use record_builder::RecordBuilder;
pub use sql_generation::SqlGenerator;
pub use state::{Condition, QueryState};
