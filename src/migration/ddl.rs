//! DDL assembly
//!
//! Pure functions turning a [`Table`] descriptor into dialect specific
//! statements. Nothing here touches a connection, so the same code serves the
//! migrator and the dry run sent to joining nodes.

use store_object::registry::introspect::{TABLES_INFOS, TRIGGERS_QUEUE};
use store_object::{Table, TableSchema};
use type_mapping::{
    column_type, kind_check, now_expression, time_default, ColumnTags, DefaultValue, Dialect,
    FieldKind,
};

/// A secondary index derived from column tags
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDef {
    pub name: String,
    pub unique: bool,
    /// Comma separated key expressions
    pub expr: String,
}

fn q(name: &str, dialect: Dialect) -> String {
    dialect.quote_identifier(name)
}

fn autoinc_pk(column: &str, dialect: Dialect) -> String {
    let quoted = q(column, dialect);
    match dialect {
        Dialect::Sqlite => format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quoted),
        Dialect::Postgres | Dialect::Cockroach => format!("{} SERIAL PRIMARY KEY", quoted),
        Dialect::Mysql | Dialect::Maria => format!("{} INTEGER PRIMARY KEY AUTO_INCREMENT", quoted),
    }
}

fn zero_literal(kind: FieldKind) -> Option<&'static str> {
    match kind {
        FieldKind::Integer | FieldKind::Bool | FieldKind::Float | FieldKind::Time => Some("0"),
        FieldKind::Text => Some("''"),
        _ => None,
    }
}

fn quote_literal(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', "''"))
}

fn blob_like(physical: &str) -> bool {
    let t = physical.to_ascii_lowercase();
    t.contains("text") || t.contains("json") || t.contains("blob")
}

/// Literal or expression for the DEFAULT clause of a column, if it has one.
///
/// `altering` restricts the result to constants, which SQLite requires for
/// `ADD COLUMN`.
fn default_clause(
    kind: FieldKind,
    tags: &ColumnTags,
    physical: &str,
    dialect: Dialect,
    altering: bool,
) -> Option<String> {
    if dialect.is_mysql_family() && blob_like(physical) {
        return None;
    }

    let value = match &tags.default {
        Some(DefaultValue::Zero) => zero_literal(kind).map(str::to_string),
        Some(DefaultValue::Value(v)) => Some(match kind {
            FieldKind::Bool => match v.to_ascii_lowercase().as_str() {
                "true" | "1" | "t" | "yes" => "1".to_string(),
                _ => "0".to_string(),
            },
            FieldKind::Integer | FieldKind::Float | FieldKind::Time => {
                if v.parse::<f64>().is_ok() || v.starts_with('(') {
                    v.clone()
                } else {
                    quote_literal(v)
                }
            }
            _ => {
                if v.starts_with('(') {
                    v.clone()
                } else {
                    quote_literal(v)
                }
            }
        }),
        None if kind == FieldKind::Time => {
            if tags.now {
                Some(time_default(dialect).to_string())
            } else {
                Some("0".to_string())
            }
        }
        None if altering && tags.notnull => zero_literal(kind).map(str::to_string),
        None => None,
    };

    match value {
        Some(v) if altering && dialect == Dialect::Sqlite && v.starts_with('(') => {
            Some("0".to_string())
        }
        other => other,
    }
}

fn definition(table: &Table, column: &str, dialect: Dialect, altering: bool) -> String {
    let quoted = q(column, dialect);
    let tags = table.column_tags(column);
    let kind = table.kind(column);
    let physical = table
        .types
        .get(column)
        .cloned()
        .unwrap_or_else(|| column_type(kind, &tags, dialect));

    if column == table.pk {
        if tags.autoinc && kind == FieldKind::Integer {
            return autoinc_pk(column, dialect);
        }
        return format!("{} {} PRIMARY KEY", quoted, physical);
    }

    let mut def = format!("{} {}", quoted, physical);
    if let Some(expr) = &tags.generated {
        let storage = if altering && dialect == Dialect::Sqlite {
            "VIRTUAL"
        } else {
            "STORED"
        };
        def.push_str(&format!(" GENERATED ALWAYS AS ({}) {}", expr, storage));
        return def;
    }
    if tags.notnull {
        def.push_str(" NOT NULL");
    }
    if tags.unique && !(altering && dialect == Dialect::Sqlite) {
        def.push_str(" UNIQUE");
    }
    if let Some(value) = default_clause(kind, &tags, &physical, dialect, altering) {
        def.push_str(&format!(" DEFAULT {}", value));
    }
    if let Some(check) = kind_check(kind, &quoted) {
        def.push(' ');
        def.push_str(&check);
    }
    if let Some(expr) = &tags.check {
        def.push_str(&format!(" CHECK ({})", expr));
    }
    def
}

/// Column definition as used inside CREATE TABLE
pub fn column_definition(table: &Table, column: &str, dialect: Dialect) -> String {
    definition(table, column, dialect, false)
}

fn foreign_key_clauses(table: &Table, dialect: Dialect) -> Vec<String> {
    table
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {} ON UPDATE {}",
                q(&fk.from_field, dialect),
                q(&fk.to_table, dialect),
                q(&fk.to_field, dialect),
                fk.on_delete.to_sql(),
                fk.on_update.to_sql()
            )
        })
        .collect()
}

/// `CREATE TABLE IF NOT EXISTS` with columns in declared order followed by
/// foreign key clauses
pub fn create_table(table: &Table, dialect: Dialect) -> String {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_definition(table, c, dialect))
        .collect();
    parts.extend(foreign_key_clauses(table, dialect));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        q(&table.name, dialect),
        parts.join(", ")
    )
}

fn lowered(column: &str, dialect: Dialect) -> String {
    let expr = format!("LOWER({})", q(column, dialect));
    if dialect.is_mysql_family() {
        format!("({})", expr)
    } else {
        expr
    }
}

/// Indexes requested by `index`, `-index`, `iunique`, `mindex` and `uindex` tags
pub fn indexes(table: &Table, dialect: Dialect) -> Vec<IndexDef> {
    let mut out = Vec::new();
    for column in &table.columns {
        let tags = table.column_tags(column);
        let quoted = q(column, dialect);

        if tags.index || tags.desc_index {
            out.push(IndexDef {
                name: format!("idx_{}_{}", table.name, column),
                unique: false,
                expr: if tags.desc_index {
                    format!("{} DESC", quoted)
                } else {
                    quoted.clone()
                },
            });
        }
        if tags.iunique {
            out.push(IndexDef {
                name: format!("uidx_{}_{}", table.name, column),
                unique: true,
                expr: lowered(column, dialect),
            });
        }
        if !tags.mindex.is_empty() {
            let mut columns = vec![column.clone()];
            columns.extend(tags.mindex.iter().cloned());
            out.push(IndexDef {
                name: format!("idx_{}_{}", table.name, columns.join("_")),
                unique: false,
                expr: columns
                    .iter()
                    .map(|c| q(c, dialect))
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
        if !tags.uindex.is_empty() {
            let mut columns = vec![column.clone()];
            columns.extend(tags.uindex.iter().cloned());
            out.push(IndexDef {
                name: format!("uidx_{}_{}", table.name, columns.join("_")),
                unique: true,
                expr: columns
                    .iter()
                    .map(|c| {
                        if tags.uindex_ci {
                            lowered(c, dialect)
                        } else {
                            q(c, dialect)
                        }
                    })
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }
    }
    out
}

/// CREATE INDEX statement. MySQL has no `IF NOT EXISTS` here; the migrator
/// checks `information_schema.statistics` first.
pub fn index_statement(table: &str, index: &IndexDef, dialect: Dialect) -> String {
    let unique = if index.unique { "UNIQUE " } else { "" };
    let guard = if dialect.is_mysql_family() {
        ""
    } else {
        "IF NOT EXISTS "
    };
    format!(
        "CREATE {}INDEX {}{} ON {} ({})",
        unique,
        guard,
        index.name,
        q(table, dialect),
        index.expr
    )
}

/// Statements adding one column, plus the unique index SQLite cannot declare inline
pub fn add_column(table: &Table, column: &str, dialect: Dialect) -> Vec<String> {
    let mut out = vec![format!(
        "ALTER TABLE {} ADD COLUMN {}",
        q(&table.name, dialect),
        definition(table, column, dialect, true)
    )];
    if dialect == Dialect::Sqlite && table.column_tags(column).unique {
        out.push(index_statement(
            &table.name,
            &IndexDef {
                name: format!("uidx_{}_{}", table.name, column),
                unique: true,
                expr: q(column, dialect),
            },
            dialect,
        ));
    }
    out
}

pub fn drop_column(table: &str, column: &str, dialect: Dialect) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {}",
        q(table, dialect),
        q(column, dialect)
    )
}

pub fn rename_column(table: &str, from: &str, to: &str, dialect: Dialect) -> String {
    format!(
        "ALTER TABLE {} RENAME COLUMN {} TO {}",
        q(table, dialect),
        q(from, dialect),
        q(to, dialect)
    )
}

/// SQLite column removal: copy the kept columns into `<table>_temp`, drop the
/// original and rename. Returned as one script so it runs on one connection
/// with foreign key enforcement suspended.
///
/// `preserved` lists undeclared live columns `(name, physical type)` that are
/// carried over untouched.
pub fn sqlite_rewrite(table: &Table, keep: &[String], preserved: &[(String, String)]) -> String {
    let dialect = Dialect::Sqlite;
    let temp_name = format!("{}_temp", table.name);
    let mut temp = table.clone();
    temp.name = temp_name.clone();
    for (column, physical) in preserved {
        temp.columns.push(column.clone());
        temp.types.insert(column.clone(), physical.clone());
        temp.model_types
            .insert(column.clone(), FieldKind::from_physical(physical));
        temp.tags.insert(column.clone(), Vec::new());
    }

    let columns = keep
        .iter()
        .chain(preserved.iter().map(|(c, _)| c))
        .map(|c| q(c, dialect))
        .collect::<Vec<_>>()
        .join(", ");
    [
        "PRAGMA foreign_keys = OFF".to_string(),
        format!("DROP TABLE IF EXISTS {}", q(&temp_name, dialect)),
        create_table(&temp, dialect),
        format!(
            "INSERT INTO {} ({}) SELECT {} FROM {}",
            q(&temp_name, dialect),
            columns,
            columns,
            q(&table.name, dialect)
        ),
        format!("DROP TABLE {}", q(&table.name, dialect)),
        format!(
            "ALTER TABLE {} RENAME TO {}",
            q(&temp_name, dialect),
            q(&table.name, dialect)
        ),
        "PRAGMA foreign_keys = ON".to_string(),
    ]
    .join(";\n")
}

/// Triggers keeping `update` tagged columns on the current Unix time. On
/// MySQL the insert trigger also seeds `now` columns left at zero.
pub fn time_triggers(table: &Table, dialect: Dialect) -> Vec<String> {
    let update_columns = table.update_columns();
    let qt = q(&table.name, dialect);
    let trigger = format!("{}_update_trig", table.name);
    let now = now_expression(dialect);

    match dialect {
        Dialect::Sqlite => {
            if update_columns.is_empty() {
                return Vec::new();
            }
            let sets = update_columns
                .iter()
                .map(|c| format!("{} = {}", q(c, dialect), now))
                .collect::<Vec<_>>()
                .join(", ");
            vec![
                format!("DROP TRIGGER IF EXISTS {}", trigger),
                format!(
                    "CREATE TRIGGER IF NOT EXISTS {} AFTER UPDATE ON {} FOR EACH ROW BEGIN UPDATE {} SET {} WHERE {} = NEW.{}; END",
                    trigger,
                    qt,
                    qt,
                    sets,
                    q(&table.pk, dialect),
                    q(&table.pk, dialect)
                ),
            ]
        }
        Dialect::Postgres | Dialect::Cockroach => {
            if update_columns.is_empty() {
                return Vec::new();
            }
            let function = format!("{}_updated_at_trig", table.name);
            let sets = update_columns
                .iter()
                .map(|c| format!("NEW.{} = {};", q(c, dialect), now))
                .collect::<Vec<_>>()
                .join(" ");
            vec![
                format!(
                    "CREATE OR REPLACE FUNCTION {}() RETURNS TRIGGER AS $$ BEGIN {} RETURN NEW; END; $$ LANGUAGE plpgsql",
                    function, sets
                ),
                format!("DROP TRIGGER IF EXISTS {} ON {}", trigger, qt),
                format!(
                    "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW EXECUTE FUNCTION {}()",
                    trigger, qt, function
                ),
            ]
        }
        Dialect::Mysql | Dialect::Maria => {
            let now_columns: Vec<&str> = table
                .columns
                .iter()
                .filter(|c| table.has_tag(c, "now") && table.kind(c) == FieldKind::Time)
                .map(String::as_str)
                .collect();
            let mut out = Vec::new();

            let mut insert_sets: Vec<String> = now_columns
                .iter()
                .filter(|c| !update_columns.contains(c))
                .map(|c| {
                    let quoted = q(c, dialect);
                    format!(
                        "NEW.{} = IF(NEW.{} IS NULL OR NEW.{} = 0, {}, NEW.{})",
                        quoted, quoted, quoted, now, quoted
                    )
                })
                .collect();
            insert_sets.extend(
                update_columns
                    .iter()
                    .map(|c| format!("NEW.{} = {}", q(c, dialect), now)),
            );
            let insert_trigger = format!("{}_insert_trig", table.name);
            if !insert_sets.is_empty() {
                out.push(format!("DROP TRIGGER IF EXISTS {}", insert_trigger));
                out.push(format!(
                    "CREATE TRIGGER {} BEFORE INSERT ON {} FOR EACH ROW SET {}",
                    insert_trigger,
                    qt,
                    insert_sets.join(", ")
                ));
            }
            if !update_columns.is_empty() {
                let sets = update_columns
                    .iter()
                    .map(|c| format!("NEW.{} = {}", q(c, dialect), now))
                    .collect::<Vec<_>>()
                    .join(", ");
                out.push(format!("DROP TRIGGER IF EXISTS {}", trigger));
                out.push(format!(
                    "CREATE TRIGGER {} BEFORE UPDATE ON {} FOR EACH ROW SET {}",
                    trigger, qt, sets
                ));
            }
            out
        }
    }
}

/// Bookkeeping table fed by change triggers
pub fn triggers_queue_table(dialect: Dialect) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({}, table_name VARCHAR(255), operation VARCHAR(16), row_pk TEXT, created_at BIGINT)",
        q(TRIGGERS_QUEUE, dialect),
        autoinc_pk("id", dialect)
    )
}

/// Bookkeeping table holding serialized descriptors
pub fn tables_infos_table(dialect: Dialect) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (name VARCHAR(255) PRIMARY KEY, pk VARCHAR(255), descriptor TEXT)",
        q(TABLES_INFOS, dialect)
    )
}

/// `<table>_changes_trig` triggers recording every row change in `_triggers_queue`
pub fn change_triggers(table: &Table, dialect: Dialect) -> Vec<String> {
    let qt = q(&table.name, dialect);
    let queue = q(TRIGGERS_QUEUE, dialect);
    let pk = q(&table.pk, dialect);
    let base = format!("{}_changes_trig", table.name);
    let now = now_expression(dialect);

    match dialect {
        Dialect::Postgres | Dialect::Cockroach => vec![
            format!(
                "CREATE OR REPLACE FUNCTION {base}() RETURNS TRIGGER AS $$ BEGIN \
                 IF TG_OP = 'DELETE' THEN \
                 INSERT INTO {queue} (table_name, operation, row_pk, created_at) VALUES (TG_TABLE_NAME, 'delete', OLD.{pk}::TEXT, {now}); \
                 RETURN OLD; END IF; \
                 INSERT INTO {queue} (table_name, operation, row_pk, created_at) VALUES (TG_TABLE_NAME, lower(TG_OP), NEW.{pk}::TEXT, {now}); \
                 RETURN NEW; END; $$ LANGUAGE plpgsql"
            ),
            format!("DROP TRIGGER IF EXISTS {} ON {}", base, qt),
            format!(
                "CREATE TRIGGER {base} AFTER INSERT OR UPDATE OR DELETE ON {qt} FOR EACH ROW EXECUTE FUNCTION {base}()"
            ),
        ],
        Dialect::Sqlite | Dialect::Mysql | Dialect::Maria => {
            let mut out = Vec::new();
            for (event, row) in [("insert", "NEW"), ("update", "NEW"), ("delete", "OLD")] {
                let name = format!("{}_{}", base, event);
                let pk_text = if dialect == Dialect::Sqlite {
                    format!("CAST({}.{} AS TEXT)", row, pk)
                } else {
                    format!("CAST({}.{} AS CHAR)", row, pk)
                };
                let insert = format!(
                    "INSERT INTO {} (table_name, operation, row_pk, created_at) VALUES ('{}', '{}', {}, {})",
                    queue, table.name, event, pk_text, now
                );
                out.push(format!("DROP TRIGGER IF EXISTS {}", name));
                out.push(if dialect == Dialect::Sqlite {
                    format!(
                        "CREATE TRIGGER IF NOT EXISTS {} AFTER {} ON {} FOR EACH ROW BEGIN {}; END",
                        name,
                        event.to_ascii_uppercase(),
                        qt,
                        insert
                    )
                } else {
                    format!(
                        "CREATE TRIGGER {} AFTER {} ON {} FOR EACH ROW {}",
                        name,
                        event.to_ascii_uppercase(),
                        qt,
                        insert
                    )
                });
            }
            out
        }
    }
}

/// Everything needed to create `table` from nothing: the table, its indexes
/// and its triggers. Used for dry runs against another dialect.
pub fn plan_create(table: &Table, dialect: Dialect, with_change_triggers: bool) -> Vec<String> {
    let table = table.for_dialect(dialect);
    let mut out = vec![create_table(&table, dialect)];
    out.extend(
        indexes(&table, dialect)
            .iter()
            .map(|i| index_statement(&table.name, i, dialect)),
    );
    out.extend(time_triggers(&table, dialect));
    if with_change_triggers {
        out.extend(change_triggers(&table, dialect));
    }
    out
}

/// Link table `m2m_<a>_<b>` with cascading keys to both sides
pub fn many_to_many_schema(a: &str, b: &str) -> TableSchema {
    let a_column = format!("{}_id", a);
    let b_column = if a == b {
        format!("{}_ref_id", b)
    } else {
        format!("{}_id", b)
    };
    let a_fk = format!("fk:{}.id:cascade:cascade", a);
    let b_fk = format!("fk:{}.id:cascade:cascade", b);

    TableSchema::new(&format!("m2m_{}_{}", a, b))
        .column("id", FieldKind::Integer, &["pk", "autoinc"])
        .column(&a_column, FieldKind::Integer, &[a_fk.as_str(), "index"])
        .column(&b_column, FieldKind::Integer, &[b_fk.as_str(), "index"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users(dialect: Dialect) -> Table {
        let schema = TableSchema::new("users")
            .column("id", FieldKind::Integer, &["pk", "autoinc"])
            .column("email", FieldKind::Text, &["unique", "size:120"])
            .column("password", FieldKind::Text, &[])
            .column("is_admin", FieldKind::Bool, &["default:false"]);
        Table::from_schema(&schema, dialect).unwrap()
    }

    #[test]
    fn test_create_table_sqlite() {
        let sql = create_table(&users(Dialect::Sqlite), Dialect::Sqlite);
        assert_eq!(
            sql,
            "CREATE TABLE IF NOT EXISTS `users` (`id` INTEGER PRIMARY KEY AUTOINCREMENT, \
             `email` VARCHAR(120) UNIQUE, `password` VARCHAR(255), \
             `is_admin` INTEGER DEFAULT 0 CHECK (`is_admin` IN (0,1)))"
        );
    }

    #[test]
    fn test_autoinc_pk_per_dialect() {
        let pg = create_table(&users(Dialect::Postgres), Dialect::Postgres);
        assert!(pg.starts_with("CREATE TABLE IF NOT EXISTS \"users\" (\"id\" SERIAL PRIMARY KEY"));
        let my = create_table(&users(Dialect::Mysql), Dialect::Mysql);
        assert!(my.contains("`id` INTEGER PRIMARY KEY AUTO_INCREMENT"));
    }

    #[test]
    fn test_time_defaults() {
        let schema = TableSchema::new("events")
            .column("created", FieldKind::Time, &["now"])
            .column("seen", FieldKind::Time, &[]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        assert_eq!(
            column_definition(&table, "created", Dialect::Sqlite),
            "`created` BIGINT DEFAULT (strftime('%s','now'))"
        );
        assert_eq!(
            column_definition(&table, "seen", Dialect::Sqlite),
            "`seen` BIGINT DEFAULT 0"
        );
        let pg = table.for_dialect(Dialect::Postgres);
        assert_eq!(
            column_definition(&pg, "created", Dialect::Postgres),
            "\"created\" BIGINT DEFAULT extract(epoch from now())"
        );
    }

    #[test]
    fn test_mysql_skips_text_defaults() {
        let schema = TableSchema::new("notes").column("body", FieldKind::Text, &["text", "default:none"]);
        let table = Table::from_schema(&schema, Dialect::Mysql).unwrap();
        assert_eq!(column_definition(&table, "body", Dialect::Mysql), "`body` TEXT");
        let sqlite = table.for_dialect(Dialect::Sqlite);
        assert_eq!(
            column_definition(&sqlite, "body", Dialect::Sqlite),
            "`body` TEXT DEFAULT 'none'"
        );
    }

    #[test]
    fn test_foreign_key_clause() {
        let schema = TableSchema::new("posts")
            .column("user_id", FieldKind::Integer, &["fk:users.id:cascade:set-null"]);
        let table = Table::from_schema(&schema, Dialect::Postgres).unwrap();
        let sql = create_table(&table, Dialect::Postgres);
        assert!(sql.ends_with(
            "FOREIGN KEY (\"user_id\") REFERENCES \"users\"(\"id\") ON DELETE CASCADE ON UPDATE SET NULL)"
        ));
    }

    #[test]
    fn test_indexes_from_tags() {
        let schema = TableSchema::new("posts")
            .column("slug", FieldKind::Text, &["iunique"])
            .column("created", FieldKind::Time, &["-index"])
            .column("author", FieldKind::Integer, &["mindex:created"])
            .column("title", FieldKind::Text, &["uindex:Iauthor"]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();
        let statements: Vec<String> = indexes(&table, Dialect::Sqlite)
            .iter()
            .map(|i| index_statement(&table.name, i, Dialect::Sqlite))
            .collect();

        assert_eq!(
            statements,
            vec![
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_posts_slug ON `posts` (LOWER(`slug`))",
                "CREATE INDEX IF NOT EXISTS idx_posts_created ON `posts` (`created` DESC)",
                "CREATE INDEX IF NOT EXISTS idx_posts_author_created ON `posts` (`author`, `created`)",
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_posts_title_author ON `posts` (LOWER(`title`), LOWER(`author`))",
            ]
        );
    }

    #[test]
    fn test_mysql_functional_index() {
        let schema = TableSchema::new("u").column("email", FieldKind::Text, &["iunique"]);
        let table = Table::from_schema(&schema, Dialect::Mysql).unwrap();
        let index = &indexes(&table, Dialect::Mysql)[0];
        assert_eq!(
            index_statement("u", index, Dialect::Mysql),
            "CREATE UNIQUE INDEX uidx_u_email ON `u` ((LOWER(`email`)))"
        );
    }

    #[test]
    fn test_sqlite_add_column_is_constant() {
        let schema = TableSchema::new("users")
            .column("email", FieldKind::Text, &["unique"])
            .column("touched", FieldKind::Time, &["now"]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        assert_eq!(
            add_column(&table, "email", Dialect::Sqlite),
            vec![
                "ALTER TABLE `users` ADD COLUMN `email` VARCHAR(255)".to_string(),
                "CREATE UNIQUE INDEX IF NOT EXISTS uidx_users_email ON `users` (`email`)".to_string(),
            ]
        );
        assert_eq!(
            add_column(&table, "touched", Dialect::Sqlite),
            vec!["ALTER TABLE `users` ADD COLUMN `touched` BIGINT DEFAULT 0".to_string()]
        );
    }

    #[test]
    fn test_add_bool_column_with_default() {
        let table = users(Dialect::Sqlite);
        assert_eq!(
            add_column(&table, "is_admin", Dialect::Sqlite),
            vec![
                "ALTER TABLE `users` ADD COLUMN `is_admin` INTEGER DEFAULT 0 CHECK (`is_admin` IN (0,1))"
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_sqlite_update_trigger() {
        let schema = TableSchema::new("docs").column("updated", FieldKind::Time, &["update"]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();
        let triggers = time_triggers(&table, Dialect::Sqlite);
        assert_eq!(triggers[0], "DROP TRIGGER IF EXISTS docs_update_trig");
        assert_eq!(
            triggers[1],
            "CREATE TRIGGER IF NOT EXISTS docs_update_trig AFTER UPDATE ON `docs` FOR EACH ROW BEGIN \
             UPDATE `docs` SET `updated` = strftime('%s','now') WHERE `id` = NEW.`id`; END"
        );
    }

    #[test]
    fn test_postgres_update_trigger() {
        let schema = TableSchema::new("docs").column("updated", FieldKind::Time, &["update"]);
        let table = Table::from_schema(&schema, Dialect::Postgres).unwrap();
        let triggers = time_triggers(&table, Dialect::Postgres);
        assert_eq!(triggers.len(), 3);
        assert!(triggers[0].contains("NEW.\"updated\" = extract(epoch from now());"));
        assert_eq!(
            triggers[2],
            "CREATE TRIGGER docs_update_trig BEFORE UPDATE ON \"docs\" FOR EACH ROW EXECUTE FUNCTION docs_updated_at_trig()"
        );
    }

    #[test]
    fn test_mysql_triggers_cover_insert_and_update() {
        let schema = TableSchema::new("docs")
            .column("created", FieldKind::Time, &["now"])
            .column("updated", FieldKind::Time, &["update"]);
        let table = Table::from_schema(&schema, Dialect::Mysql).unwrap();
        let triggers = time_triggers(&table, Dialect::Mysql);
        assert_eq!(triggers.len(), 4);
        assert!(triggers[1].starts_with("CREATE TRIGGER docs_insert_trig BEFORE INSERT ON `docs`"));
        assert!(triggers[1].contains("NEW.`updated` = UNIX_TIMESTAMP()"));
        assert_eq!(
            triggers[3],
            "CREATE TRIGGER docs_update_trig BEFORE UPDATE ON `docs` FOR EACH ROW SET NEW.`updated` = UNIX_TIMESTAMP()"
        );
    }

    #[test]
    fn test_no_time_triggers_without_tags() {
        let table = users(Dialect::Sqlite);
        assert!(time_triggers(&table, Dialect::Sqlite).is_empty());
        assert!(time_triggers(&table, Dialect::Mysql).is_empty());
    }

    #[test]
    fn test_change_triggers_sqlite() {
        let triggers = change_triggers(&users(Dialect::Sqlite), Dialect::Sqlite);
        assert_eq!(triggers.len(), 6);
        assert_eq!(
            triggers[5],
            "CREATE TRIGGER IF NOT EXISTS users_changes_trig_delete AFTER DELETE ON `users` FOR EACH ROW BEGIN \
             INSERT INTO `_triggers_queue` (table_name, operation, row_pk, created_at) \
             VALUES ('users', 'delete', CAST(OLD.`id` AS TEXT), strftime('%s','now')); END"
        );
    }

    #[test]
    fn test_sqlite_rewrite_script() {
        let table = users(Dialect::Sqlite);
        let script = sqlite_rewrite(&table, &["id".to_string(), "email".to_string()], &[]);
        let statements: Vec<&str> = script.split(";\n").collect();
        assert_eq!(statements.len(), 7);
        assert!(statements[2].starts_with("CREATE TABLE IF NOT EXISTS `users_temp`"));
        assert_eq!(
            statements[3],
            "INSERT INTO `users_temp` (`id`, `email`) SELECT `id`, `email` FROM `users`"
        );
        assert_eq!(statements[5], "ALTER TABLE `users_temp` RENAME TO `users`");
    }

    #[test]
    fn test_plan_create_targets_other_dialect() {
        let table = users(Dialect::Sqlite);
        let plan = plan_create(&table, Dialect::Postgres, false);
        assert_eq!(plan.len(), 1);
        assert!(plan[0].contains("\"id\" SERIAL PRIMARY KEY"));
        assert!(plan[0].contains("\"email\" VARCHAR(120) UNIQUE"));
    }

    #[test]
    fn test_many_to_many_schema() {
        let table =
            Table::from_schema(&many_to_many_schema("users", "groups"), Dialect::Sqlite).unwrap();
        assert_eq!(table.name, "m2m_users_groups");
        assert_eq!(table.columns, vec!["id", "users_id", "groups_id"]);
        assert_eq!(table.foreign_keys.len(), 2);
        assert!(create_table(&table, Dialect::Sqlite).contains(
            "FOREIGN KEY (`groups_id`) REFERENCES `groups`(`id`) ON DELETE CASCADE ON UPDATE CASCADE"
        ));
    }
}
