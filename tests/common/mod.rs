//! Shared setup for integration tests: file-backed SQLite databases in a
//! temporary directory, engines on a private or shared in-memory bus.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use synchaus::prelude::*;
use tempfile::TempDir;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn sqlite_dsn(dir: &TempDir, name: &str) -> String {
    format!(
        "sqlite://{}?mode=rwc",
        dir.path().join(format!("{}.db", name)).display()
    )
}

pub fn config(dir: &TempDir, databases: &[&str]) -> AppConfig {
    let mut config = AppConfig::default();
    config.migration.folder = dir.path().join("migrations").display().to_string();
    for name in databases {
        config
            .databases
            .push(DatabaseConfig::new(name, "sqlite", &sqlite_dsn(dir, name)));
    }
    config
}

/// Engine on a private bus with one SQLite database per name; the first is
/// the default.
pub async fn engine(dir: &TempDir, databases: &[&str]) -> Arc<Engine> {
    init_tracing();
    Engine::connect(config(dir, databases))
        .await
        .expect("engine should connect")
}

/// Sync settings fast enough for tests
pub fn sync_config(address: &str) -> SyncConfig {
    SyncConfig {
        enabled: true,
        address: address.to_string(),
        secure: false,
        heartbeat_seconds: 1,
        page_size: 50,
        page_delay_ms: 10,
        dashboard_topic: None,
    }
}

/// Engine attached to `hub` under `address`, with its own database file and
/// a running synchronizer.
pub async fn node(hub: &InMemoryHub, dir: &TempDir, address: &str) -> Arc<Engine> {
    node_with(hub, dir, address, sync_config(address)).await
}

pub async fn node_with(hub: &InMemoryHub, dir: &TempDir, address: &str, sync: SyncConfig) -> Arc<Engine> {
    init_tracing();
    let mut config = config(dir, &[]);
    config.sync = sync;
    let engine = Engine::new(config, hub.bus(address)).expect("engine should start");
    engine
        .register_database(&DatabaseConfig::new(
            address,
            "sqlite",
            &sqlite_dsn(dir, address),
        ))
        .await
        .expect("database should register");
    engine.start_sync().expect("synchronizer should start");
    engine
}

pub const WAIT: Duration = Duration::from_secs(5);
const POLL: Duration = Duration::from_millis(50);

/// Poll `check` until it returns true or `timeout` elapses
pub async fn eventually<F>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Wait until `table` holds exactly `expected` rows
pub async fn wait_for_count(engine: &Engine, table: &str, expected: i64) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if count(engine, table).await == expected {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

/// Whether `table` exists in the default database
pub async fn table_exists(engine: &Engine, table: &str) -> bool {
    engine
        .get_all_columns_types(table, "")
        .await
        .map(|types| !types.is_empty())
        .unwrap_or(false)
}

/// Wait until `table` exists, or no longer exists when `present` is false
pub async fn wait_for_table(engine: &Engine, table: &str, present: bool) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        if table_exists(engine, table).await == present {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(POLL).await;
    }
}

pub fn accounts_schema() -> TableSchema {
    TableSchema::new("accounts")
        .column("id", FieldKind::Integer, &["pk", "autoinc"])
        .column("email", FieldKind::Text, &["unique", "size:120"])
        .nullable_column("nickname", FieldKind::Text, &[])
}

/// Rows in `table`, bypassing the result cache. Zero when the table is empty
/// or missing.
pub async fn count(engine: &Engine, table: &str) -> i64 {
    engine.table(table).no_cache().count().await.unwrap_or(0)
}
