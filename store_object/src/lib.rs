//! Store Object - registry, query builders and execution for synchaus
//!
//! This crate holds the schema registry of connected databases, the shared
//! [`DbContext`], the fluent [`MapBuilder`] / [`RecordBuilder`] query builders,
//! the free-form [`Selector`] and the `Model` binding used by `#[derive(Model)]`.

extern crate self as store_object;

pub mod context;
pub mod errors;
pub mod exec;
pub mod prelude;
pub mod query_builder;
pub mod registry;
pub mod selector;
pub mod trace;
pub mod traits;
pub mod validation;

pub use context::{ContextSettings, DbContext};
pub use errors::DbError;
pub use exec::{ExecOptions, ExecResult};
pub use query_builder::{
    InsertOutcome, MapBuilder, QueryFilter, QueryOperator, QueryState, RecordBuilder, SortOrder,
};
pub use registry::{Database, ForeignKey, PoolLimits, Registry, Table};
pub use selector::Selector;
pub use trace::{QueryTrace, TraceRecorder};
pub use traits::{FieldSpec, Model, Nested, TableSchema};
pub use validation::{ValidatedFieldName, ValidatedTableName, ValidationError};

pub use table_derive::{model, Model};
pub use type_mapping::{args, DbValue, FieldKind, FromDbValue, Row, RowMap, SqlKind, ToDbValue};
