//! Unified type mapping between Rust values and the supported SQL dialects
//!
//! This crate provides the runtime value type, the dialect adapter that rewrites
//! canonical SQL fragments for each backend, the per-dialect column type table and
//! the column tag parser shared by the migrator and the query builders.

pub mod adapter;
pub mod dialect;
pub mod errors;
pub mod serialize;
pub mod sql;
pub mod tags;
pub mod value;

pub use adapter::{
    adapt_args, adapt_concat_len, adapt_named, adapt_placeholders, adapt_set, adapt_value,
    adapt_where, inline_nulls, quote_identifier,
};
pub use dialect::Dialect;
pub use errors::{DialectError, ValueError};
pub use serialize::to_row_map;
pub use sql::{
    column_type, kind_check, needs_read_cast, now_expression, read_cast, time_default,
    to_snake_case, FieldKind,
};
pub use tags::{ColumnTags, DefaultValue, FkAction, ForeignKeySpec};
pub use value::{DbValue, FromDbValue, Row, RowMap, SqlKind, ToDbValue};

/// Build a `Vec<DbValue>` from heterogeneous Rust values.
///
/// ```rust
/// use type_mapping::{args, DbValue};
///
/// let values = args!["a@b", 30];
/// assert_eq!(values, vec![DbValue::Text("a@b".into()), DbValue::Int(30)]);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::DbValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        vec![$($crate::ToDbValue::to_db_value(&$value)),+]
    };
}
