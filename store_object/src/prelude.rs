//! Convenience re-exports for common store-object usage

// Builders
pub use crate::query_builder::{InsertOutcome, MapBuilder, QueryFilter, RecordBuilder, SortOrder};
pub use crate::selector::Selector;

// Model binding
pub use crate::traits::{FieldSpec, Model, Nested, TableSchema};
pub use table_derive::{model, Model};

// Errors
pub use crate::errors::DbError;
pub use crate::validation::ValidationError;

// Values
pub use type_mapping::{args, DbValue, Dialect, FieldKind, RowMap};

pub use async_trait::async_trait;
pub use serde::{Deserialize, Serialize};
