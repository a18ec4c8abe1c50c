//! Traits for model binding

pub mod model;

pub use model::{FieldSpec, Model, Nested, TableSchema};
