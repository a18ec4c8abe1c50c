//! Registered databases

use sqlx::AnyPool;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use config::DatabaseConfig;
use type_mapping::Dialect;

use super::table::Table;

/// Connection pool limits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolLimits {
    pub max_open: u32,
    pub max_idle: u32,
    pub max_lifetime: Duration,
    pub max_idle_time: Duration,
}

impl Default for PoolLimits {
    fn default() -> Self {
        Self {
            max_open: 20,
            max_idle: 7,
            max_lifetime: Duration::from_secs(3600),
            max_idle_time: Duration::from_secs(3600),
        }
    }
}

impl From<&DatabaseConfig> for PoolLimits {
    fn from(config: &DatabaseConfig) -> Self {
        Self {
            max_open: config.max_open,
            max_idle: config.max_idle,
            max_lifetime: Duration::from_secs(config.max_lifetime_seconds),
            max_idle_time: Duration::from_secs(config.max_idle_time_seconds),
        }
    }
}

/// A named connection to one backend and the tables known in it
pub struct Database {
    pub name: String,
    pub dialect: Dialect,
    pub pool: AnyPool,
    pub limits: PoolLimits,
    tables: RwLock<Vec<Arc<Table>>>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("dialect", &self.dialect)
            .field("limits", &self.limits)
            .field("tables", &self.table_names())
            .finish()
    }
}

impl Database {
    pub fn new(name: &str, dialect: Dialect, pool: AnyPool, limits: PoolLimits) -> Self {
        Self {
            name: name.to_string(),
            dialect,
            pool,
            limits,
            tables: RwLock::new(Vec::new()),
        }
    }

    pub fn tables(&self) -> Vec<Arc<Table>> {
        self.tables.read().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables
            .read()
            .map(|t| t.iter().map(|t| t.name.clone()).collect())
            .unwrap_or_default()
    }

    pub fn table(&self, name: &str) -> Option<Arc<Table>> {
        self.tables
            .read()
            .ok()?
            .iter()
            .find(|t| t.name == name)
            .cloned()
    }

    /// Insert or replace a descriptor, keeping registration order
    pub fn put_table(&self, table: Table) -> Arc<Table> {
        let table = Arc::new(table);
        if let Ok(mut tables) = self.tables.write() {
            match tables.iter().position(|t| t.name == table.name) {
                Some(i) => tables[i] = table.clone(),
                None => tables.push(table.clone()),
            }
        }
        table
    }

    pub fn remove_table(&self, name: &str) -> bool {
        let Ok(mut tables) = self.tables.write() else {
            return false;
        };
        let before = tables.len();
        tables.retain(|t| t.name != name);
        tables.len() != before
    }

    pub fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }
}
