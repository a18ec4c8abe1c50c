//! Generated migration files
//!
//! In `generate-files` mode destructive changes are written here for an
//! operator to review and apply.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name `<timestamp>_<database>_<table>.sql`
pub fn migration_file_name(database: &str, table: &str) -> String {
    format!(
        "{}_{}_{}.sql",
        chrono::Utc::now().format("%Y%m%d%H%M%S"),
        database,
        table
    )
}

/// Write the statements to a new file under `folder`, creating the folder.
pub fn write_migration(
    folder: impl AsRef<Path>,
    database: &str,
    table: &str,
    statements: &[String],
) -> std::io::Result<PathBuf> {
    let folder = folder.as_ref();
    fs::create_dir_all(folder)?;
    let path = folder.join(migration_file_name(database, table));

    let mut file = fs::File::create(&path)?;
    writeln!(
        file,
        "-- {}.{} generated {}",
        database,
        table,
        chrono::Utc::now().to_rfc3339()
    )?;
    for statement in statements {
        writeln!(file, "{};", statement.trim_end_matches(';'))?;
    }
    tracing::info!(path = %path.display(), statements = statements.len(), "migration file written");
    Ok(path)
}
