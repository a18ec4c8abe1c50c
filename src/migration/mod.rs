//! Schema migrator
//!
//! Reconciles a declared [`TableSchema`] with the live table. Missing tables
//! are created; missing columns are added; surplus and renamed columns are
//! handled according to [`MigrationMode`]. Every successful migration stores
//! the descriptor in `_tables_infos` and links it into the registry.

pub mod ddl;
pub mod files;
pub mod queue;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use config::{MigrationConfig, MigrationMode};
use store_object::exec::{execute, execute_raw_batch, fetch_rows, ExecOptions};
use store_object::registry::introspect::{self, TABLES_INFOS};
use store_object::{Database, DbContext, DbError, Table, TableSchema};
use type_mapping::{adapt_placeholders, DbValue, Dialect};

use crate::errors::SyncHausError;

pub use ddl::{many_to_many_schema, plan_create, IndexDef};
pub use queue::QueuedChange;

/// Column level difference between a descriptor and the live table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Drift {
    /// Declared but absent
    pub missing: Vec<String>,
    /// Live but no longer declared
    pub extra: Vec<String>,
    /// `(old, new)` pairs
    pub renames: Vec<(String, String)>,
}

impl Drift {
    pub fn is_empty(&self) -> bool {
        self.missing.is_empty() && self.extra.is_empty() && self.renames.is_empty()
    }

    /// Whether applying the drift loses or moves data
    pub fn is_destructive(&self) -> bool {
        !self.extra.is_empty() || !self.renames.is_empty()
    }

    fn describe(&self) -> String {
        let mut parts = Vec::new();
        if !self.missing.is_empty() {
            parts.push(format!("missing [{}]", self.missing.join(", ")));
        }
        if !self.extra.is_empty() {
            parts.push(format!("extra [{}]", self.extra.join(", ")));
        }
        for (old, new) in &self.renames {
            parts.push(format!("rename {} -> {}", old, new));
        }
        parts.join("; ")
    }
}

/// Compare declared columns with live ones. The primary key is never part of
/// the drift. With as many missing as extra columns, pairs are treated as
/// renames: a single pair always, otherwise names where one prefixes the
/// other. `update` columns are never renamed since their trigger is bound to
/// the name.
pub fn diff(table: &Table, live: &[String]) -> Drift {
    let mut missing: Vec<String> = table
        .columns
        .iter()
        .filter(|c| **c != table.pk && !live.contains(c))
        .cloned()
        .collect();
    let mut extra: Vec<String> = live
        .iter()
        .filter(|c| **c != table.pk && !table.has_column(c) && !table.is_skipped(c))
        .cloned()
        .collect();

    let mut renames: Vec<(String, String)> = Vec::new();
    if !missing.is_empty() && missing.len() == extra.len() {
        if missing.len() == 1 {
            if !table.has_tag(&missing[0], "update") {
                renames.push((extra[0].clone(), missing[0].clone()));
            }
        } else {
            for new in &missing {
                if table.has_tag(new, "update") {
                    continue;
                }
                let candidate = extra.iter().find(|old| {
                    !renames.iter().any(|(o, _)| o == *old)
                        && (old.starts_with(new.as_str()) || new.starts_with(old.as_str()))
                });
                if let Some(old) = candidate {
                    renames.push((old.clone(), new.clone()));
                }
            }
        }
        missing.retain(|m| !renames.iter().any(|(_, n)| n == m));
        extra.retain(|e| !renames.iter().any(|(o, _)| o == e));
    }

    Drift {
        missing,
        extra,
        renames,
    }
}

/// What one migration did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    pub database: String,
    pub table: String,
    /// The table did not exist and was created
    pub created: bool,
    /// Statements executed, excluding indexes and triggers
    pub applied: Vec<String>,
    /// File holding destructive statements left for an operator
    pub generated: Option<PathBuf>,
}

pub struct Migrator {
    ctx: Arc<DbContext>,
    config: MigrationConfig,
}

impl Migrator {
    pub fn new(ctx: Arc<DbContext>, config: MigrationConfig) -> Self {
        Self { ctx, config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Reconcile `schema` with the live table in `database` ("" for the default)
    pub async fn migrate(
        &self,
        database: &str,
        schema: &TableSchema,
    ) -> Result<MigrationReport, SyncHausError> {
        let db = self.ctx.database(database)?;
        let table = Table::from_schema(schema, db.dialect)?;
        self.ensure_bookkeeping(&db).await?;

        let live = introspect::columns(&db, &table.name).await?;
        let mut report = MigrationReport {
            database: db.name.clone(),
            table: table.name.clone(),
            ..Default::default()
        };

        if live.is_empty() {
            let create = ddl::create_table(&table, db.dialect);
            self.run_batch(&db, std::slice::from_ref(&create)).await?;
            report.created = true;
            report.applied.push(create);
        } else {
            let preserved: Vec<(String, String)> = live
                .iter()
                .filter(|c| table.is_skipped(&c.name))
                .map(|c| (c.name.clone(), c.physical.clone()))
                .collect();
            let live_names: Vec<String> = live.into_iter().map(|c| c.name).collect();
            let drift = diff(&table, &live_names);
            if !drift.is_empty() {
                self.reconcile(&db, &table, &live_names, &preserved, &drift, &mut report)
                    .await?;
            }
        }

        self.ensure_indexes(&db, &table).await?;
        self.install_triggers(&db, &table).await?;
        self.store_descriptor(&db, &table).await?;
        self.ctx.link_model(&db.name, schema)?;
        self.ctx.cache.forget_table(&db.name, &table.name);

        tracing::info!(
            database = %db.name,
            table = %table.name,
            created = report.created,
            statements = report.applied.len(),
            "table migrated"
        );
        Ok(report)
    }

    async fn reconcile(
        &self,
        db: &Database,
        table: &Table,
        live: &[String],
        preserved: &[(String, String)],
        drift: &Drift,
        report: &mut MigrationReport,
    ) -> Result<(), SyncHausError> {
        if self.config.mode == MigrationMode::FailOnDrift {
            return Err(SyncHausError::Drift {
                table: table.name.clone(),
                details: drift.describe(),
            });
        }

        let additive: Vec<String> = drift
            .missing
            .iter()
            .flat_map(|c| ddl::add_column(table, c, db.dialect))
            .collect();

        let mut destructive: Vec<String> = drift
            .renames
            .iter()
            .map(|(old, new)| ddl::rename_column(&table.name, old, new, db.dialect))
            .collect();
        if !drift.extra.is_empty() {
            if db.dialect == Dialect::Sqlite {
                let keep: Vec<String> = table
                    .columns
                    .iter()
                    .filter(|c| {
                        live.contains(c)
                            || drift.missing.contains(c)
                            || drift.renames.iter().any(|(_, new)| new == *c)
                    })
                    .cloned()
                    .collect();
                destructive.push(ddl::sqlite_rewrite(table, &keep, preserved));
            } else {
                destructive.extend(
                    drift
                        .extra
                        .iter()
                        .map(|c| ddl::drop_column(&table.name, c, db.dialect)),
                );
            }
        }

        self.run_batch(db, &additive).await?;
        report.applied.extend(additive);

        if destructive.is_empty() {
            return Ok(());
        }
        match self.config.mode {
            MigrationMode::GenerateFiles => {
                let path =
                    files::write_migration(&self.config.folder, &db.name, &table.name, &destructive)?;
                tracing::warn!(
                    table = %table.name,
                    path = %path.display(),
                    "destructive changes written for review"
                );
                report.generated = Some(path);
            }
            _ => {
                self.run_batch(db, &destructive).await?;
                report.applied.extend(destructive);
            }
        }
        Ok(())
    }

    /// Create the link table `m2m_<a>_<b>`. Idempotent.
    pub async fn many_to_many(
        &self,
        database: &str,
        a: &str,
        b: &str,
    ) -> Result<MigrationReport, SyncHausError> {
        self.migrate(database, &ddl::many_to_many_schema(a, b)).await
    }

    /// Migrate from a stored descriptor rather than a model
    pub async fn migrate_descriptor(
        &self,
        database: &str,
        table: &Table,
    ) -> Result<MigrationReport, SyncHausError> {
        self.migrate(database, &table.to_schema()).await
    }

    /// Run statements produced elsewhere, such as a peer's dry run
    pub async fn apply_statements(
        &self,
        database: &str,
        statements: &[String],
    ) -> Result<(), SyncHausError> {
        let db = self.ctx.database(database)?;
        self.ensure_bookkeeping(&db).await?;
        self.run_batch(&db, statements).await?;
        Ok(())
    }

    /// Install a descriptor received from a peer: persist it, put it in the
    /// registry and add the change triggers.
    pub async fn register_descriptor(
        &self,
        database: &str,
        table: &Table,
    ) -> Result<Arc<Table>, SyncHausError> {
        let db = self.ctx.database(database)?;
        let table = table.for_dialect(db.dialect);
        self.ensure_bookkeeping(&db).await?;
        if self.config.change_triggers {
            self.run_batch(&db, &ddl::change_triggers(&table, db.dialect))
                .await?;
        }
        self.store_descriptor(&db, &table).await?;
        let linked = db.put_table(table);
        self.ctx.registry.bind_model(&linked.name, &db.name);
        self.ctx.cache.forget_table(&db.name, &linked.name);
        Ok(linked)
    }

    async fn ensure_bookkeeping(&self, db: &Database) -> Result<(), DbError> {
        self.run_batch(
            db,
            &[
                ddl::tables_infos_table(db.dialect),
                ddl::triggers_queue_table(db.dialect),
            ],
        )
        .await
    }

    async fn install_triggers(&self, db: &Database, table: &Table) -> Result<(), DbError> {
        let mut triggers = ddl::time_triggers(table, db.dialect);
        if self.config.change_triggers {
            triggers.extend(ddl::change_triggers(table, db.dialect));
        }
        self.run_batch(db, &triggers).await
    }

    async fn ensure_indexes(&self, db: &Database, table: &Table) -> Result<(), DbError> {
        for index in ddl::indexes(table, db.dialect) {
            if db.dialect.is_mysql_family() && index_exists(db, &table.name, &index.name).await? {
                continue;
            }
            let statement = ddl::index_statement(&table.name, &index, db.dialect);
            self.run_batch(db, std::slice::from_ref(&statement)).await?;
        }
        Ok(())
    }

    async fn store_descriptor(&self, db: &Database, table: &Table) -> Result<(), DbError> {
        let descriptor =
            serde_json::to_string(table).map_err(|e| DbError::migration(TABLES_INFOS, e))?;
        let quoted = db.quote(TABLES_INFOS);

        let delete = adapt_placeholders(
            &format!("DELETE FROM {} WHERE name = ?", quoted),
            db.dialect,
        );
        execute(
            db,
            &delete,
            &[DbValue::Text(table.name.clone())],
            ExecOptions::default(),
        )
        .await?;

        let insert = adapt_placeholders(
            &format!("INSERT INTO {} (name, pk, descriptor) VALUES (?, ?, ?)", quoted),
            db.dialect,
        );
        execute(
            db,
            &insert,
            &[
                DbValue::Text(table.name.clone()),
                DbValue::Text(table.pk.clone()),
                DbValue::Text(descriptor),
            ],
            ExecOptions::default(),
        )
        .await?;
        Ok(())
    }

    /// Execute statements in order under the batch deadline. The first failure
    /// stops the batch; earlier statements stay applied.
    async fn run_batch(&self, db: &Database, statements: &[String]) -> Result<(), DbError> {
        if statements.is_empty() {
            return Ok(());
        }
        let deadline = Duration::from_secs(self.config.ddl_timeout_seconds.max(1));
        tokio::time::timeout(deadline, execute_raw_batch(db, statements))
            .await
            .map_err(|_| DbError::Timeout(deadline))?
    }
}

async fn index_exists(db: &Database, table: &str, index: &str) -> Result<bool, DbError> {
    let rows = fetch_rows(
        db,
        "SELECT COUNT(*) FROM information_schema.statistics \
         WHERE table_schema = DATABASE() AND table_name = ? AND index_name = ?",
        &[
            DbValue::Text(table.to_string()),
            DbValue::Text(index.to_string()),
        ],
        ExecOptions::default(),
    )
    .await?;
    Ok(rows
        .first()
        .and_then(|r| r.first())
        .and_then(DbValue::as_i64)
        .unwrap_or(0)
        > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use type_mapping::FieldKind;

    fn table(columns: &[&str]) -> Table {
        let mut schema = TableSchema::new("users").column("id", FieldKind::Integer, &["pk"]);
        for name in columns {
            schema = schema.column(name, FieldKind::Text, &[]);
        }
        Table::from_schema(&schema, Dialect::Sqlite).unwrap()
    }

    fn live(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_no_drift() {
        let t = table(&["email", "password"]);
        assert!(diff(&t, &live(&["id", "email", "password"])).is_empty());
    }

    #[test]
    fn test_missing_column() {
        let t = table(&["email", "is_admin"]);
        let drift = diff(&t, &live(&["id", "email"]));
        assert_eq!(drift.missing, vec!["is_admin"]);
        assert!(!drift.is_destructive());
    }

    #[test]
    fn test_extra_column() {
        let t = table(&["email"]);
        let drift = diff(&t, &live(&["id", "email", "legacy"]));
        assert_eq!(drift.extra, vec!["legacy"]);
        assert!(drift.missing.is_empty());
        assert!(drift.is_destructive());
    }

    #[test]
    fn test_skipped_live_column_is_not_extra() {
        let schema = TableSchema::new("users")
            .column("id", FieldKind::Integer, &["pk"])
            .column("email", FieldKind::Text, &[])
            .column("secret", FieldKind::Text, &["-"])
            .column("nickname", FieldKind::Text, &[]);
        let t = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        let drift = diff(&t, &live(&["id", "email", "secret"]));
        assert!(drift.extra.is_empty());
        assert!(drift.renames.is_empty());
        assert_eq!(drift.missing, vec!["nickname"]);
    }

    #[test]
    fn test_single_pair_is_rename() {
        let t = table(&["email", "nickname"]);
        let drift = diff(&t, &live(&["id", "email", "handle"]));
        assert_eq!(drift.renames, vec![("handle".to_string(), "nickname".to_string())]);
        assert!(drift.missing.is_empty());
        assert!(drift.extra.is_empty());
    }

    #[test]
    fn test_prefix_pairs_are_renames() {
        let t = table(&["name_full", "zip"]);
        let drift = diff(&t, &live(&["id", "name", "postcode"]));
        assert_eq!(drift.renames, vec![("name".to_string(), "name_full".to_string())]);
        assert_eq!(drift.missing, vec!["zip"]);
        assert_eq!(drift.extra, vec!["postcode"]);
    }

    #[test]
    fn test_update_column_is_never_renamed() {
        let schema = TableSchema::new("users").column("touched", FieldKind::Time, &["update"]);
        let t = Table::from_schema(&schema, Dialect::Sqlite).unwrap();
        let drift = diff(&t, &live(&["id", "modified"]));
        assert!(drift.renames.is_empty());
        assert_eq!(drift.missing, vec!["touched"]);
        assert_eq!(drift.extra, vec!["modified"]);
    }

    #[test]
    fn test_drift_description() {
        let drift = Drift {
            missing: vec!["a".into()],
            extra: vec!["b".into()],
            renames: vec![("c".into(), "d".into())],
        };
        assert_eq!(drift.describe(), "missing [a]; extra [b]; rename c -> d");
    }
}
