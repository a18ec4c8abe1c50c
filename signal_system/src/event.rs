//! Mutation event types and definitions
//!
//! This module defines the payload delivered to hook callbacks after a
//! successful mutation.

use serde::{Deserialize, Serialize};
use std::fmt;
use type_mapping::RowMap;

/// Kind of mutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Create,
    Update,
    Delete,
    Drop,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Create => "create",
            EventType::Update => "update",
            EventType::Delete => "delete",
            EventType::Drop => "drop",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data handed to hooks: one instance per affected row
#[derive(Debug, Clone, PartialEq)]
pub struct HookData {
    pub kind: EventType,
    pub database: String,
    pub table: String,
    /// Name of the primary key column
    pub pk: String,
    /// Row after the mutation (the removed row for deletes, empty for drops)
    pub data: RowMap,
    /// Row before an update
    pub old: Option<RowMap>,
}

impl HookData {
    pub fn new(kind: EventType, database: &str, table: &str, pk: &str) -> Self {
        Self {
            kind,
            database: database.to_string(),
            table: table.to_string(),
            pk: pk.to_string(),
            data: RowMap::new(),
            old: None,
        }
    }

    pub fn with_data(mut self, data: RowMap) -> Self {
        self.data = data;
        self
    }

    pub fn with_old(mut self, old: RowMap) -> Self {
        self.old = Some(old);
        self
    }

    /// Primary key value of the row, if present in the payload
    pub fn pk_value(&self) -> Option<&type_mapping::DbValue> {
        self.data.get(&self.pk)
    }
}
