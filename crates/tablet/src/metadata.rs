//! Tablet superblock: the per-tablet metadata persisted outside the row
//! store.
//!
//! The superblock records the tablet's schema, partition schema, the
//! partition it covers, and its data lifecycle state. It must round-trip
//! exactly: the catalog compares the loaded schema bit-for-bit against the
//! canonical one and treats any difference as corruption.

use serde::{Deserialize, Serialize};

use strata_types::{Error, PartitionBounds, Result, Schema, TableId, TabletId};

use crate::fs::FsManager;

/// Data lifecycle state of a tablet replica.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabletDataState {
    /// Fully present and usable.
    Ready,
    /// Data removed, tombstone retained for consensus safety.
    Tombstoned,
}

/// How a table's rows are mapped onto tablets.
///
/// The catalog only ever uses the default: range partitioning over the full
/// primary key with no hashing. Split keys are encoded primary-key prefixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSchema {}

impl PartitionSchema {
    /// Produces the partitions for the given sorted split keys.
    ///
    /// `n` splits produce `n + 1` contiguous partitions covering the whole
    /// key space. An empty split set produces exactly one unbounded
    /// partition.
    pub fn create_partitions(&self, split_keys: &[Vec<u8>]) -> Result<Vec<PartitionBounds>> {
        let mut sorted = split_keys.to_vec();
        sorted.sort();
        sorted.dedup();
        if sorted.len() != split_keys.len() {
            return Err(Error::invalid_argument("duplicate split keys"));
        }

        let mut partitions = Vec::with_capacity(sorted.len() + 1);
        let mut start: Vec<u8> = Vec::new();
        for split in sorted {
            partitions.push(PartitionBounds { start_key: start.clone(), end_key: split.clone() });
            start = split;
        }
        partitions.push(PartitionBounds { start_key: start, end_key: Vec::new() });
        Ok(partitions)
    }
}

/// The persisted superblock of one tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabletMetadata {
    /// The tablet's id.
    pub tablet_id: TabletId,
    /// The owning table's id.
    pub table_id: TableId,
    /// The owning table's name.
    pub table_name: String,
    /// The tablet's schema.
    pub schema: Schema,
    /// The table's partition schema.
    pub partition_schema: PartitionSchema,
    /// The partition this tablet covers.
    pub partition: PartitionBounds,
    /// Data lifecycle state.
    pub data_state: TabletDataState,
}

impl TabletMetadata {
    /// Creates and persists a fresh superblock.
    ///
    /// Fails with `IllegalState` if a superblock for `tablet_id` already
    /// exists: tablets are created exactly once.
    #[allow(clippy::too_many_arguments)]
    pub fn create_new(
        fs: &FsManager,
        tablet_id: impl Into<TabletId>,
        table_id: impl Into<TableId>,
        table_name: impl Into<String>,
        schema: Schema,
        partition_schema: PartitionSchema,
        partition: PartitionBounds,
        data_state: TabletDataState,
    ) -> Result<Self> {
        let tablet_id = tablet_id.into();
        let path = fs.tablet_metadata_path(&tablet_id);
        if path.exists() {
            return Err(Error::illegal_state(format!(
                "tablet metadata for {tablet_id} already exists"
            )));
        }

        let metadata = Self {
            tablet_id,
            table_id: table_id.into(),
            table_name: table_name.into(),
            schema,
            partition_schema,
            partition,
            data_state,
        };
        FsManager::write_json(&path, &metadata)?;
        tracing::info!(tablet_id = %metadata.tablet_id, "created tablet metadata");
        Ok(metadata)
    }

    /// Loads the superblock for `tablet_id`.
    ///
    /// Returns a structured `NotFound` when no superblock exists, so callers
    /// can distinguish a fresh deployment from a damaged one.
    pub fn load(fs: &FsManager, tablet_id: &str) -> Result<Self> {
        let path = fs.tablet_metadata_path(tablet_id);
        let metadata: Self = FsManager::read_json(&path)?;
        if metadata.tablet_id != tablet_id {
            return Err(Error::corruption(format!(
                "tablet metadata at {} names tablet {}, expected {tablet_id}",
                path.display(),
                metadata.tablet_id
            )));
        }
        Ok(metadata)
    }

    /// Persists the current state over the existing superblock.
    pub fn flush(&self, fs: &FsManager) -> Result<()> {
        FsManager::write_json(&fs.tablet_metadata_path(&self.tablet_id), self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use strata_types::DataType;
    use tempfile::tempdir;

    use super::*;

    fn sample_schema() -> Schema {
        Schema::builder()
            .add_key_column("entry_type", DataType::Int8)
            .unwrap()
            .add_key_column("entry_id", DataType::String)
            .unwrap()
            .add_column("metadata", DataType::String)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_empty_split_set_yields_one_partition() {
        let partitions = PartitionSchema::default().create_partitions(&[]).unwrap();
        assert_eq!(partitions.len(), 1);
        assert!(partitions[0].start_key.is_empty());
        assert!(partitions[0].end_key.is_empty());
    }

    #[test]
    fn test_splits_yield_contiguous_partitions() {
        let partitions = PartitionSchema::default()
            .create_partitions(&[vec![0x50], vec![0x20]])
            .unwrap();
        assert_eq!(partitions.len(), 3);
        assert_eq!(partitions[0].end_key, vec![0x20]);
        assert_eq!(partitions[1].start_key, vec![0x20]);
        assert_eq!(partitions[1].end_key, vec![0x50]);
        assert_eq!(partitions[2].start_key, vec![0x50]);
        assert!(partitions[2].end_key.is_empty());
    }

    #[test]
    fn test_duplicate_splits_rejected() {
        let result = PartitionSchema::default().create_partitions(&[vec![1], vec![1]]);
        assert!(result.unwrap_err().is_invalid_argument());
    }

    #[test]
    fn test_create_load_roundtrip() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");

        let created = TabletMetadata::create_new(
            &fs,
            "00000000000000000000000000000000",
            "sys.catalog",
            "sys.catalog",
            sample_schema(),
            PartitionSchema::default(),
            PartitionBounds::default(),
            TabletDataState::Ready,
        )
        .expect("create");

        let loaded =
            TabletMetadata::load(&fs, "00000000000000000000000000000000").expect("load");
        assert_eq!(created, loaded);
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");

        let make = |fs: &FsManager| {
            TabletMetadata::create_new(
                fs,
                "t1",
                "table-1",
                "t",
                sample_schema(),
                PartitionSchema::default(),
                PartitionBounds::default(),
                TabletDataState::Ready,
            )
        };
        make(&fs).expect("first create");
        assert!(make(&fs).expect_err("second create").is_illegal_state());
    }

    #[test]
    fn test_load_missing_is_not_found() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let err = TabletMetadata::load(&fs, "missing").expect_err("load should fail");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_load_garbage_is_corruption() {
        let dir = tempdir().expect("create temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        std::fs::write(fs.tablet_metadata_path("bad"), "{not json").expect("write garbage");
        let err = TabletMetadata::load(&fs, "bad").expect_err("load should fail");
        assert!(err.is_corruption());
    }
}
