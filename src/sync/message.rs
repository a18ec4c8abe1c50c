//! Replication wire format
//!
//! Every message is a JSON object discriminated by `mtype`. Rows travel as
//! `column -> value` objects; receivers coerce values to their own column kinds.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use signal_system::{BusError, BusMessage};
use store_object::{DbError, Table};
use type_mapping::{DbValue, Dialect, RowMap};

/// A row as carried on the bus
pub type JsonRow = serde_json::Map<String, Value>;

/// What a node announces about itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeInfo {
    pub id: String,
    pub address: String,
    pub dialect: Dialect,
    /// User tables present on the node
    #[serde(default)]
    pub tables: Vec<String>,
    #[serde(default)]
    pub secure: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mtype")]
pub enum SyncMessage {
    #[serde(rename = "ping")]
    Ping { from: String },

    #[serde(rename = "pong")]
    Pong { from: String },

    #[serde(rename = "addNode")]
    AddNode(NodeInfo),

    #[serde(rename = "node_info")]
    NodeInfo(NodeInfo),

    /// DDL for tables the joiner lacks, plus their descriptors
    #[serde(rename = "migrate")]
    Migrate {
        from: String,
        statements: Vec<String>,
        tables: Vec<Table>,
    },

    #[serde(rename = "initsync")]
    InitSync { from: String },

    #[serde(rename = "sync_data")]
    SyncData {
        from: String,
        table: String,
        page: i64,
        rows: Vec<JsonRow>,
    },

    #[serde(rename = "insert_rec")]
    InsertRec {
        from: String,
        table: String,
        pk: String,
        data: JsonRow,
    },

    #[serde(rename = "update_rec")]
    UpdateRec {
        from: String,
        table: String,
        pk: String,
        data: JsonRow,
        #[serde(default)]
        old: Option<JsonRow>,
    },

    #[serde(rename = "delete_rec")]
    DeleteRec {
        from: String,
        table: String,
        pk: String,
        data: JsonRow,
    },

    #[serde(rename = "drop_table")]
    DropTable { from: String, table: String },

    #[serde(rename = "node_offline")]
    NodeOffline { from: String },

    #[serde(rename = "restart_node")]
    RestartNode { from: String },
}

impl SyncMessage {
    /// Address of the node that sent the message
    pub fn sender(&self) -> &str {
        match self {
            SyncMessage::AddNode(info) | SyncMessage::NodeInfo(info) => &info.address,
            SyncMessage::Ping { from }
            | SyncMessage::Pong { from }
            | SyncMessage::Migrate { from, .. }
            | SyncMessage::InitSync { from }
            | SyncMessage::SyncData { from, .. }
            | SyncMessage::InsertRec { from, .. }
            | SyncMessage::UpdateRec { from, .. }
            | SyncMessage::DeleteRec { from, .. }
            | SyncMessage::DropTable { from, .. }
            | SyncMessage::NodeOffline { from }
            | SyncMessage::RestartNode { from } => from,
        }
    }

    /// The `mtype` discriminator
    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::Ping { .. } => "ping",
            SyncMessage::Pong { .. } => "pong",
            SyncMessage::AddNode(_) => "addNode",
            SyncMessage::NodeInfo(_) => "node_info",
            SyncMessage::Migrate { .. } => "migrate",
            SyncMessage::InitSync { .. } => "initsync",
            SyncMessage::SyncData { .. } => "sync_data",
            SyncMessage::InsertRec { .. } => "insert_rec",
            SyncMessage::UpdateRec { .. } => "update_rec",
            SyncMessage::DeleteRec { .. } => "delete_rec",
            SyncMessage::DropTable { .. } => "drop_table",
            SyncMessage::NodeOffline { .. } => "node_offline",
            SyncMessage::RestartNode { .. } => "restart_node",
        }
    }

    /// Whether the message changes rows or schema on the receiver
    pub fn is_data(&self) -> bool {
        matches!(
            self,
            SyncMessage::SyncData { .. }
                | SyncMessage::InsertRec { .. }
                | SyncMessage::UpdateRec { .. }
                | SyncMessage::DeleteRec { .. }
                | SyncMessage::DropTable { .. }
        )
    }

    pub fn to_message(&self) -> Result<BusMessage, BusError> {
        match serde_json::to_value(self).map_err(|e| BusError::Encode(e.to_string()))? {
            Value::Object(map) => Ok(map),
            other => Err(BusError::Encode(format!("not an object: {}", other))),
        }
    }

    pub fn from_message(message: BusMessage) -> Result<Self, BusError> {
        serde_json::from_value(Value::Object(message)).map_err(|e| BusError::Encode(e.to_string()))
    }
}

/// Encode a row for the bus
pub fn row_to_json(row: &RowMap) -> JsonRow {
    row.iter()
        .map(|(column, value)| (column.clone(), value.to_json()))
        .collect()
}

/// Decode a received row against the local descriptor. Columns the table
/// does not know, and skipped columns, are dropped.
pub fn row_from_json(table: &Table, data: &JsonRow) -> Result<RowMap, DbError> {
    let mut row = RowMap::with_capacity(data.len());
    for (column, value) in data {
        if !table.has_column(column) || table.has_tag(column, "-") {
            continue;
        }
        let value = DbValue::from_json(value.clone()).coerce(table.kind(column))?;
        row.insert(column.clone(), value);
    }
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use store_object::TableSchema;
    use type_mapping::FieldKind;

    #[test]
    fn test_discriminator_names() {
        let message = SyncMessage::InsertRec {
            from: "a".into(),
            table: "t".into(),
            pk: "id".into(),
            data: JsonRow::new(),
        };
        let encoded = message.to_message().unwrap();
        assert_eq!(encoded["mtype"], json!("insert_rec"));
        assert_eq!(SyncMessage::from_message(encoded).unwrap(), message);

        let join = SyncMessage::AddNode(NodeInfo {
            id: "n1".into(),
            address: "b".into(),
            dialect: Dialect::Sqlite,
            tables: vec!["t".into()],
            secure: false,
        });
        let encoded = join.to_message().unwrap();
        assert_eq!(encoded["mtype"], json!("addNode"));
        assert_eq!(encoded["dialect"], json!("sqlite"));
        assert_eq!(join.sender(), "b");
    }

    #[test]
    fn test_unknown_mtype_is_rejected() {
        let mut message = BusMessage::new();
        message.insert("mtype".into(), json!("gossip"));
        assert!(SyncMessage::from_message(message).is_err());
    }

    #[test]
    fn test_row_decoding_follows_local_kinds() {
        let schema = TableSchema::new("t")
            .column("id", FieldKind::Integer, &["pk"])
            .column("active", FieldKind::Bool, &[])
            .column("secret", FieldKind::Text, &[]);
        let table = Table::from_schema(&schema, Dialect::Sqlite).unwrap();

        let data: JsonRow = serde_json::from_value(json!({
            "id": 7, "active": 1, "secret": "x", "unknown": true
        }))
        .unwrap();
        let row = row_from_json(&table, &data).unwrap();
        assert_eq!(row.len(), 3);
        assert_eq!(row["id"], DbValue::Int(7));
        assert_eq!(row["active"], DbValue::Bool(true));
    }
}
