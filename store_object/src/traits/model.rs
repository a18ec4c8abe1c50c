//! Model descriptors
//!
//! A model is any type that can describe its columns and convert itself to and
//! from a column mapping. `#[derive(Model)]` implements this trait; types that
//! cannot use the derive build a [`TableSchema`] by hand instead.

use serde::{Deserialize, Serialize};

use type_mapping::{DbValue, FieldKind, RowMap};

use crate::errors::DbError;

/// One declared field: column name, kind and tag atoms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
    pub nullable: bool,
    pub tags: Vec<String>,
}

impl FieldSpec {
    pub fn new(name: &str, kind: FieldKind, nullable: bool, tags: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            nullable,
            tags: tags.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Explicit table description: a name plus ordered fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    pub fields: Vec<FieldSpec>,
}

impl TableSchema {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            fields: Vec::new(),
        }
    }

    pub fn from_fields(name: &str, fields: Vec<FieldSpec>) -> Self {
        Self {
            name: name.to_string(),
            fields,
        }
    }

    pub fn column(mut self, name: &str, kind: FieldKind, tags: &[&str]) -> Self {
        self.fields.push(FieldSpec::new(name, kind, false, tags));
        self
    }

    pub fn nullable_column(mut self, name: &str, kind: FieldKind, tags: &[&str]) -> Self {
        self.fields.push(FieldSpec::new(name, kind, true, tags));
        self
    }
}

/// A type bound to a table
pub trait Model: Sized + Send + Sync + 'static {
    fn table_name() -> &'static str;

    fn fields() -> Vec<FieldSpec>;

    /// Stored column values in declared order
    fn to_values(&self) -> Vec<(&'static str, DbValue)>;

    /// Build a record from a scanned row. Missing columns take their zero value.
    fn from_row(row: &RowMap) -> Result<Self, DbError>;

    fn schema() -> TableSchema {
        TableSchema::from_fields(Self::table_name(), Self::fields())
    }
}

/// A parent record hydrated from a joined result set.
///
/// Consecutive rows sharing the first column collapse into one parent; every
/// row also yields a child pushed onto that parent.
pub trait Nested: Model {
    type Child: Model;

    fn push_child(&mut self, child: Self::Child);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_builder_keeps_order() {
        let schema = TableSchema::new("users")
            .column("id", FieldKind::Integer, &["pk", "autoinc"])
            .column("email", FieldKind::Text, &["unique"])
            .nullable_column("bio", FieldKind::Text, &["text"]);

        let names: Vec<_> = schema.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["id", "email", "bio"]);
        assert!(schema.fields[0].has_tag("autoinc"));
        assert!(schema.fields[2].nullable);
    }
}
