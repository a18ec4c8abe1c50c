//! Schema registry
//!
//! Process state of registered databases and their tables. Lookups read an
//! atomically published snapshot; registration is serialized by a mutex and
//! publishes a new snapshot.

mod database;
pub mod introspect;
mod table;

pub use database::{Database, PoolLimits};
pub use table::{ForeignKey, Table};

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use crate::errors::DbError;

#[derive(Debug, Default)]
struct Snapshot {
    databases: Vec<Arc<Database>>,
    default: Option<String>,
}

#[derive(Debug, Default)]
pub struct Registry {
    snapshot: RwLock<Arc<Snapshot>>,
    write_lock: Mutex<()>,
    models: RwLock<HashMap<String, String>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> Arc<Snapshot> {
        self.snapshot
            .read()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    fn publish(&self, snapshot: Snapshot) {
        if let Ok(mut current) = self.snapshot.write() {
            *current = Arc::new(snapshot);
        }
    }

    /// Append a database. The first one registered becomes the default.
    pub fn register(&self, database: Database) -> Result<Arc<Database>, DbError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DbError::NotFound("registry lock poisoned".into()))?;
        let current = self.current();
        if current.databases.iter().any(|d| d.name == database.name) {
            return Err(DbError::AlreadyRegistered(database.name.clone()));
        }

        let database = Arc::new(database);
        let mut databases = current.databases.clone();
        databases.push(database.clone());
        let default = current
            .default
            .clone()
            .or_else(|| Some(database.name.clone()));
        self.publish(Snapshot { databases, default });
        Ok(database)
    }

    /// Named database, or the default when `name` is empty
    pub fn database(&self, name: &str) -> Result<Arc<Database>, DbError> {
        let snapshot = self.current();
        let wanted = if name.is_empty() {
            snapshot
                .default
                .clone()
                .ok_or_else(|| DbError::NotFound("no database registered".into()))?
        } else {
            name.to_string()
        };
        snapshot
            .databases
            .iter()
            .find(|d| d.name == wanted)
            .cloned()
            .ok_or_else(|| DbError::NotFound(format!("database '{}'", wanted)))
    }

    pub fn databases(&self) -> Vec<Arc<Database>> {
        self.current().databases.clone()
    }

    pub fn default_name(&self) -> Option<String> {
        self.current().default.clone()
    }

    pub fn set_default(&self, name: &str) -> Result<(), DbError> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| DbError::NotFound("registry lock poisoned".into()))?;
        let current = self.current();
        if !current.databases.iter().any(|d| d.name == name) {
            return Err(DbError::NotFound(format!("database '{}'", name)));
        }
        self.publish(Snapshot {
            databases: current.databases.clone(),
            default: Some(name.to_string()),
        });
        Ok(())
    }

    /// Remove every database, returning them so their pools can be closed
    pub fn drain(&self) -> Vec<Arc<Database>> {
        let Ok(_guard) = self.write_lock.lock() else {
            return Vec::new();
        };
        let current = self.current();
        self.publish(Snapshot::default());
        current.databases.clone()
    }

    /// Remember which database a model's table lives in
    pub fn bind_model(&self, table: &str, database: &str) {
        if let Ok(mut models) = self.models.write() {
            models.insert(table.to_string(), database.to_string());
        }
    }

    pub fn model_database(&self, table: &str) -> Option<String> {
        self.models.read().ok()?.get(table).cloned()
    }
}
