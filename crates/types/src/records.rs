//! Table and tablet metadata records.
//!
//! These are the values stored in the catalog's `metadata` column, serialized
//! as JSON so the column stays a valid UTF-8 string. The record structure is
//! versioned implicitly through optional fields: decoding tolerates older
//! encodings and the tablet record carries an in-memory upgrade for the
//! deprecated partition-bound fields.

use serde::{Deserialize, Serialize};

use crate::quorum::RaftPeer;
use crate::schema::Schema;
use crate::TableId;

/// Lifecycle state of a user table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableState {
    /// Created but not yet serving.
    Preparing,
    /// Serving reads and writes.
    Running,
    /// Deleted; retained until its tablets are reaped.
    Removed,
}

/// Lifecycle state of a tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabletState {
    /// Known to the catalog but not yet sent to any server.
    Preparing,
    /// Creation dispatched to tablet servers.
    Creating,
    /// Serving.
    Running,
    /// Superseded by other tablets.
    Replaced,
    /// Deleted.
    Deleted,
}

/// The partition a tablet covers, as encoded range bounds.
///
/// An empty start key means unbounded below; an empty end key means unbounded
/// above.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionBounds {
    /// Inclusive encoded start key.
    pub start_key: Vec<u8>,
    /// Exclusive encoded end key.
    pub end_key: Vec<u8>,
}

/// Metadata record for a user table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    /// Display name, unique among live tables.
    pub name: String,
    /// Monotonic schema version.
    pub version: u32,
    /// The table's column schema.
    pub schema: Schema,
    /// Lifecycle state.
    pub state: TableState,
}

/// Metadata record for a tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletRecord {
    /// The table this tablet belongs to.
    pub table_id: TableId,
    /// Partition bounds. Populated on every record handed out by the catalog;
    /// may be absent in older on-disk encodings that used the deprecated key
    /// fields below.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<PartitionBounds>,
    /// Deprecated encoding of the partition start key. Never present on
    /// records handed out by the catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_start_key: Option<Vec<u8>>,
    /// Deprecated encoding of the partition end key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deprecated_end_key: Option<Vec<u8>>,
    /// The replica set last recorded for this tablet.
    #[serde(default)]
    pub replicas: Vec<RaftPeer>,
    /// Lifecycle state.
    pub state: TabletState,
}

impl TabletRecord {
    /// Migrates the deprecated start/end-key fields into `partition`.
    ///
    /// Older encodings stored the bounds directly; newer ones store a
    /// partition record. After this call `partition` is always populated and
    /// the deprecated fields are cleared. Idempotent.
    pub fn upgrade_deprecated_partition(&mut self) {
        if self.partition.is_none() {
            self.partition = Some(PartitionBounds {
                start_key: self.deprecated_start_key.take().unwrap_or_default(),
                end_key: self.deprecated_end_key.take().unwrap_or_default(),
            });
        }
        self.deprecated_start_key = None;
        self.deprecated_end_key = None;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use crate::schema::DataType;

    use super::*;

    fn sample_schema() -> Schema {
        Schema::builder()
            .add_key_column("id", DataType::String)
            .unwrap()
            .add_column("val", DataType::Int64)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_table_record_json_roundtrip() {
        let record = TableRecord {
            name: "orders".to_string(),
            version: 3,
            schema: sample_schema(),
            state: TableState::Running,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TableRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_tablet_record_json_roundtrip() {
        let record = TabletRecord {
            table_id: "table-1".to_string(),
            partition: Some(PartitionBounds { start_key: vec![1, 2], end_key: vec![3, 4] }),
            deprecated_start_key: None,
            deprecated_end_key: None,
            replicas: vec![],
            state: TabletState::Running,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: TabletRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(record, back);
    }

    #[test]
    fn test_upgrade_moves_deprecated_keys() {
        let mut record = TabletRecord {
            table_id: "table-1".to_string(),
            partition: None,
            deprecated_start_key: Some(vec![0x10]),
            deprecated_end_key: Some(vec![0x20]),
            replicas: vec![],
            state: TabletState::Creating,
        };
        record.upgrade_deprecated_partition();
        assert_eq!(
            record.partition,
            Some(PartitionBounds { start_key: vec![0x10], end_key: vec![0x20] })
        );
        assert!(record.deprecated_start_key.is_none());
        assert!(record.deprecated_end_key.is_none());
    }

    #[test]
    fn test_upgrade_preserves_existing_partition() {
        let bounds = PartitionBounds { start_key: vec![1], end_key: vec![2] };
        let mut record = TabletRecord {
            table_id: "table-1".to_string(),
            partition: Some(bounds.clone()),
            deprecated_start_key: Some(vec![9]),
            deprecated_end_key: Some(vec![9]),
            replicas: vec![],
            state: TabletState::Running,
        };
        record.upgrade_deprecated_partition();
        assert_eq!(record.partition, Some(bounds));
        assert!(record.deprecated_start_key.is_none());
        assert!(record.deprecated_end_key.is_none());
    }

    #[test]
    fn test_old_encoding_without_partition_field_decodes() {
        // An encoding written before the partition record existed.
        let json = r#"{
            "table_id": "table-1",
            "deprecated_start_key": [1],
            "deprecated_end_key": [2],
            "state": "Running"
        }"#;
        let mut record: TabletRecord = serde_json::from_str(json).unwrap();
        assert!(record.partition.is_none());
        record.upgrade_deprecated_partition();
        assert_eq!(
            record.partition,
            Some(PartitionBounds { start_key: vec![1], end_key: vec![2] })
        );
    }
}
