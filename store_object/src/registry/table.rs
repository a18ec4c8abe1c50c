//! Table descriptors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use type_mapping::{
    column_type, to_snake_case, ColumnTags, Dialect, FieldKind, FkAction, ForeignKeySpec,
};

use crate::errors::DbError;
use crate::traits::{FieldSpec, TableSchema};
use crate::validation::{validate_field_name, validate_table_name};

/// Directional relation between two columns
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub from_field: String,
    pub to_table: String,
    pub to_field: String,
    pub unique: bool,
    pub on_delete: FkAction,
    pub on_update: FkAction,
}

/// Canonical description of one relation in one database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    pub pk: String,
    /// Column names in declared order
    pub columns: Vec<String>,
    /// Column to physical type
    pub types: HashMap<String, String>,
    /// Column to declared kind
    pub model_types: HashMap<String, FieldKind>,
    /// Column to tag atoms
    pub tags: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,
    /// Fields tagged `-`/`skip`; live columns of that name are left alone
    #[serde(default)]
    pub skipped: Vec<String>,
}

impl Table {
    /// Build a descriptor from a declared schema.
    ///
    /// Names are converted to snake_case; skipped and non-scalar fields are
    /// dropped. Without a `pk`/`autoinc` field an existing `id` field becomes the
    /// key, otherwise an integer `id` is synthesized at the head.
    pub fn from_schema(schema: &TableSchema, dialect: Dialect) -> Result<Table, DbError> {
        let name = to_snake_case(&schema.name);
        validate_table_name(&name)?;

        let mut fields: Vec<FieldSpec> = Vec::with_capacity(schema.fields.len() + 1);
        let mut skipped = Vec::new();
        for field in &schema.fields {
            if field.has_tag("-") || field.has_tag("skip") {
                skipped.push(to_snake_case(&field.name));
                continue;
            }
            if !field.kind.is_scalar() {
                continue;
            }
            let mut field = field.clone();
            field.name = to_snake_case(&field.name);
            validate_field_name(&field.name)?;
            ColumnTags::parse(&field.tags)?;
            fields.push(field);
        }

        let declared_pk = fields
            .iter()
            .position(|f| f.has_tag("pk") || f.has_tag("autoinc"));
        let pk_index = match declared_pk {
            Some(i) => i,
            None => match fields.iter().position(|f| f.name == "id") {
                Some(i) => {
                    let field = &mut fields[i];
                    field.tags.push("pk".to_string());
                    if field.kind == FieldKind::Integer {
                        field.tags.push("autoinc".to_string());
                    }
                    i
                }
                None => {
                    fields.insert(
                        0,
                        FieldSpec::new("id", FieldKind::Integer, false, &["pk", "autoinc"]),
                    );
                    0
                }
            },
        };

        let mut table = Table {
            name,
            pk: fields[pk_index].name.clone(),
            columns: Vec::with_capacity(fields.len()),
            types: HashMap::new(),
            model_types: HashMap::new(),
            tags: HashMap::new(),
            foreign_keys: Vec::new(),
            skipped,
        };

        for field in fields {
            let tags = ColumnTags::parse(&field.tags)?;
            table
                .types
                .insert(field.name.clone(), column_type(field.kind, &tags, dialect));
            table.model_types.insert(field.name.clone(), field.kind);
            if let Some(ForeignKeySpec {
                table: to_table,
                column,
                on_delete,
                on_update,
            }) = tags.fk
            {
                table.foreign_keys.push(ForeignKey {
                    from_field: field.name.clone(),
                    to_table,
                    to_field: column,
                    unique: tags.unique,
                    on_delete,
                    on_update,
                });
            }
            table.tags.insert(field.name.clone(), field.tags);
            table.columns.push(field.name);
        }

        Ok(table)
    }

    /// Descriptor for a table discovered in the backend without a model
    pub fn from_live(name: &str, columns: &[(String, String)], pk: Option<&str>) -> Table {
        let pk = pk
            .map(str::to_string)
            .or_else(|| columns.iter().find(|(c, _)| c == "id").map(|(c, _)| c.clone()))
            .or_else(|| columns.first().map(|(c, _)| c.clone()))
            .unwrap_or_else(|| "id".to_string());

        let mut table = Table {
            name: name.to_string(),
            pk: pk.clone(),
            columns: Vec::with_capacity(columns.len()),
            types: HashMap::new(),
            model_types: HashMap::new(),
            tags: HashMap::new(),
            foreign_keys: Vec::new(),
            skipped: Vec::new(),
        };
        for (column, physical) in columns {
            table.columns.push(column.clone());
            table.types.insert(column.clone(), physical.clone());
            table
                .model_types
                .insert(column.clone(), FieldKind::from_physical(physical));
            let tags = if *column == pk {
                vec!["pk".to_string()]
            } else {
                Vec::new()
            };
            table.tags.insert(column.clone(), tags);
        }
        table
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn is_skipped(&self, column: &str) -> bool {
        self.skipped.iter().any(|c| c == column)
    }

    pub fn column_tags(&self, column: &str) -> ColumnTags {
        self.tags
            .get(column)
            .and_then(|t| ColumnTags::parse(t).ok())
            .unwrap_or_default()
    }

    pub fn has_tag(&self, column: &str, tag: &str) -> bool {
        self.tags
            .get(column)
            .is_some_and(|tags| tags.iter().any(|t| t == tag))
    }

    /// Declared kind, falling back to the physical type
    pub fn kind(&self, column: &str) -> FieldKind {
        self.model_types.get(column).copied().unwrap_or_else(|| {
            self.types
                .get(column)
                .map(|t| FieldKind::from_physical(t))
                .unwrap_or(FieldKind::Text)
        })
    }

    pub fn pk_kind(&self) -> FieldKind {
        self.kind(&self.pk)
    }

    pub fn is_autoinc(&self, column: &str) -> bool {
        self.has_tag(column, "autoinc")
    }

    /// Columns carrying the `update` tag
    pub fn update_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| self.has_tag(c, "update"))
            .map(String::as_str)
            .collect()
    }

    /// Re-derive physical types for another dialect
    pub fn for_dialect(&self, dialect: Dialect) -> Table {
        let mut table = self.clone();
        for column in &self.columns {
            let tags = self.column_tags(column);
            table
                .types
                .insert(column.clone(), column_type(self.kind(column), &tags, dialect));
        }
        table
    }

    /// The declared schema this descriptor was built from
    pub fn to_schema(&self) -> TableSchema {
        let fields = self
            .columns
            .iter()
            .map(|c| FieldSpec {
                name: c.clone(),
                kind: self.kind(c),
                nullable: false,
                tags: self.tags.get(c).cloned().unwrap_or_default(),
            })
            .chain(
                self.skipped
                    .iter()
                    .map(|c| FieldSpec::new(c, FieldKind::Text, true, &["-"])),
            )
            .collect();
        TableSchema::from_fields(&self.name, fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_synthesizes_id_at_head() {
        let schema = TableSchema::new("Posts")
            .column("title", FieldKind::Text, &[])
            .column("body", FieldKind::Text, &["text"]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        assert_eq!(table.name, "posts");
        assert_eq!(table.pk, "id");
        assert_eq!(table.columns, vec!["id", "title", "body"]);
        assert!(table.is_autoinc("id"));
        assert_eq!(table.types["title"], "VARCHAR(255)");
        assert_eq!(table.types["body"], "TEXT");
    }

    #[test]
    fn test_existing_id_is_promoted() {
        let schema = TableSchema::new("t")
            .column("name", FieldKind::Text, &[])
            .column("id", FieldKind::Integer, &[]);
        let table = Table::from_schema(&schema, Dialect::Postgres).unwrap();

        assert_eq!(table.pk, "id");
        assert_eq!(table.columns, vec!["name", "id"]);
        assert!(table.has_tag("id", "pk"));
    }

    #[test]
    fn test_skipped_and_slice_fields_dropped() {
        let schema = TableSchema::new("users")
            .column("id", FieldKind::Integer, &["pk"])
            .column("password", FieldKind::Text, &["-"])
            .column("posts", FieldKind::Slice, &[])
            .column("address", FieldKind::Struct, &[])
            .column("isAdmin", FieldKind::Bool, &["default:false"]);
        let table = Table::from_schema(&schema, Dialect::Mysql).unwrap();

        assert_eq!(table.columns, vec!["id", "is_admin"]);
        assert!(!table.is_autoinc("id"));
        assert!(table.is_skipped("password"));
        assert!(!table.is_skipped("posts"));

        let again = Table::from_schema(&table.to_schema(), Dialect::Mysql).unwrap();
        assert_eq!(again.skipped, vec!["password"]);
        assert!(!again.has_column("password"));
    }

    #[test]
    fn test_foreign_keys_collected() {
        let schema = TableSchema::new("posts")
            .column("id", FieldKind::Integer, &["pk", "autoinc"])
            .column("user_id", FieldKind::Integer, &["fk:users.id:cascade", "unique"]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        assert_eq!(
            table.foreign_keys,
            vec![ForeignKey {
                from_field: "user_id".into(),
                to_table: "users".into(),
                to_field: "id".into(),
                unique: true,
                on_delete: FkAction::Cascade,
                on_update: FkAction::NoAction,
            }]
        );
    }

    #[test]
    fn test_invalid_tag_is_an_error() {
        let schema = TableSchema::new("t").column("x", FieldKind::Text, &["bogus"]);
        assert!(Table::from_schema(&schema, Dialect::Sqlite).is_err());
    }

    #[test]
    fn test_descriptor_round_trips_through_json() {
        let schema = TableSchema::new("t")
            .column("id", FieldKind::Integer, &["pk", "autoinc"])
            .column("price", FieldKind::Float, &[]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();
        let json = serde_json::to_string(&table).unwrap();
        let back: Table = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }

    #[test]
    fn test_from_live_picks_pk() {
        let columns = vec![
            ("uid".to_string(), "INTEGER".to_string()),
            ("name".to_string(), "TEXT".to_string()),
        ];
        let table = Table::from_live("legacy", &columns, Some("uid"));
        assert_eq!(table.pk, "uid");
        assert_eq!(table.kind("uid"), FieldKind::Integer);

        let table = Table::from_live("legacy", &columns, None);
        assert_eq!(table.pk, "uid");
    }
}
