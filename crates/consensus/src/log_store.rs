//! Raft storage for the catalog tablet, backed by redb.
//!
//! The log half (entries, vote, purge watermark) lives in its own database
//! under the master's `wal/` directory. The state-machine half is the
//! catalog row store itself: committed write requests are applied to it, and
//! the applied position travels with the rows in the same transaction as an
//! opaque marker, so a crash can never separate the data from its log
//! position.
//!
//! OpenRaft 0.9 seals the v2 storage traits; this implements the deprecated
//! but non-sealed `RaftStorage`, split into log storage and state machine by
//! `openraft::storage::Adaptor` at raft construction time.

use std::fmt::Debug;
use std::io::Cursor;
use std::ops::RangeBounds;
use std::path::Path;
use std::sync::Arc;

use openraft::storage::{LogState, RaftLogReader, RaftSnapshotBuilder, Snapshot};
use openraft::{
    BasicNode, Entry, EntryPayload, LogId, OptionalSend, RaftStorage, SnapshotMeta, StorageError,
    StoredMembership, Vote,
};
use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};
use serde::{Deserialize, Serialize};

use strata_tablet::{CatalogRow, TabletStore, WriteResponse};
use strata_types::{decode, encode, PeerUuid};

use crate::type_config::CatalogTypeConfig;

/// Table storing raft log entries, keyed by log index.
const LOG_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("raft_log");

/// Table storing raft metadata.
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("raft_meta");

const KEY_VOTE: &str = "vote";
const KEY_LAST_PURGED: &str = "last_purged";

/// The applied position persisted alongside the tablet rows.
///
/// Stored opaquely in the row store so the tablet layer stays independent of
/// consensus types.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppliedMarker {
    /// Last applied log id.
    pub last_applied: Option<LogId<PeerUuid>>,
    /// Last applied membership.
    pub membership: StoredMembership<PeerUuid, BasicNode>,
}

impl AppliedMarker {
    fn read_from(tablet: &TabletStore) -> Result<Self, StorageError<PeerUuid>> {
        match tablet.applied_marker() {
            Some(bytes) => decode(&bytes).map_err(|e| to_serde_error(&e)),
            None => Ok(Self::default()),
        }
    }

    fn to_bytes(&self) -> Result<Vec<u8>, StorageError<PeerUuid>> {
        encode(self).map_err(|e| to_serde_error(&e))
    }
}

/// Contents of a catalog tablet snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CatalogSnapshot {
    marker: AppliedMarker,
    rows: Vec<CatalogRow>,
}

/// Combined raft storage: redb log plus the catalog row store as the state
/// machine.
pub struct CatalogLogStore {
    db: Arc<Database>,
    tablet: Arc<TabletStore>,
    vote_cache: RwLock<Option<Vote<PeerUuid>>>,
    last_purged_cache: RwLock<Option<LogId<PeerUuid>>>,
}

impl CatalogLogStore {
    /// Opens (creating if necessary) the log store at `path`, bound to the
    /// row store committed entries are applied into.
    pub fn open(
        path: impl AsRef<Path>,
        tablet: Arc<TabletStore>,
    ) -> Result<Self, StorageError<PeerUuid>> {
        let db = Database::create(path.as_ref()).map_err(|e| to_storage_error(&e))?;

        let write_txn = db.begin_write().map_err(|e| to_storage_error(&e))?;
        {
            let _log = write_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;
            let _meta = write_txn.open_table(META_TABLE).map_err(|e| to_storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| to_storage_error(&e))?;

        let store = Self {
            db: Arc::new(db),
            tablet,
            vote_cache: RwLock::new(None),
            last_purged_cache: RwLock::new(None),
        };
        store.load_caches()?;
        Ok(store)
    }

    fn load_caches(&self) -> Result<(), StorageError<PeerUuid>> {
        let read_txn = self.db.begin_read().map_err(|e| to_storage_error(&e))?;
        let meta = read_txn.open_table(META_TABLE).map_err(|e| to_storage_error(&e))?;

        if let Some(vote_data) = meta.get(KEY_VOTE).map_err(|e| to_storage_error(&e))? {
            let vote: Vote<PeerUuid> =
                decode(vote_data.value()).map_err(|e| to_serde_error(&e))?;
            *self.vote_cache.write() = Some(vote);
        }
        if let Some(purged_data) = meta.get(KEY_LAST_PURGED).map_err(|e| to_storage_error(&e))? {
            let purged: LogId<PeerUuid> =
                decode(purged_data.value()).map_err(|e| to_serde_error(&e))?;
            *self.last_purged_cache.write() = Some(purged);
        }
        Ok(())
    }

    /// The id of the last entry in the log, if any.
    pub fn last_log_id(&self) -> Result<Option<LogId<PeerUuid>>, StorageError<PeerUuid>> {
        Ok(self.last_entry()?.map(|e| e.log_id))
    }

    /// The last applied log id recorded in the row store.
    pub fn last_applied(&self) -> Result<Option<LogId<PeerUuid>>, StorageError<PeerUuid>> {
        Ok(AppliedMarker::read_from(&self.tablet)?.last_applied)
    }

    fn last_entry(&self) -> Result<Option<Entry<CatalogTypeConfig>>, StorageError<PeerUuid>> {
        let read_txn = self.db.begin_read().map_err(|e| to_storage_error(&e))?;
        let log = read_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;

        let last = log.last().map_err(|e| to_storage_error(&e))?;
        if let Some(result) = last {
            let (_, entry_data) = result;
            let entry: Entry<CatalogTypeConfig> =
                decode(entry_data.value()).map_err(|e| to_serde_error(&e))?;
            Ok(Some(entry))
        } else {
            Ok(None)
        }
    }

    fn build_snapshot_data(&self) -> Result<CatalogSnapshot, StorageError<PeerUuid>> {
        let marker = AppliedMarker::read_from(&self.tablet)?;
        let rows = self.tablet.export_rows().map_err(|e| to_storage_error(&e))?;
        Ok(CatalogSnapshot { marker, rows })
    }
}

impl RaftLogReader<CatalogTypeConfig> for CatalogLogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry<CatalogTypeConfig>>, StorageError<PeerUuid>> {
        let read_txn = self.db.begin_read().map_err(|e| to_storage_error(&e))?;
        let log = read_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;

        let mut entries = Vec::new();
        for result in log.range(range).map_err(|e| to_storage_error(&e))? {
            let (_, entry_data) = result.map_err(|e| to_storage_error(&e))?;
            let entry: Entry<CatalogTypeConfig> =
                decode(entry_data.value()).map_err(|e| to_serde_error(&e))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

/// Snapshot builder over a frozen copy of the row store contents.
pub struct CatalogSnapshotBuilder {
    snapshot: CatalogSnapshot,
}

impl RaftSnapshotBuilder<CatalogTypeConfig> for CatalogSnapshotBuilder {
    async fn build_snapshot(
        &mut self,
    ) -> Result<Snapshot<CatalogTypeConfig>, StorageError<PeerUuid>> {
        let data = encode(&self.snapshot).map_err(|e| to_serde_error(&e))?;

        let snapshot_id = format!(
            "snapshot-{}-{}",
            self.snapshot.marker.last_applied.as_ref().map(|l| l.index).unwrap_or(0),
            chrono::Utc::now().timestamp()
        );

        Ok(Snapshot {
            meta: SnapshotMeta {
                last_log_id: self.snapshot.marker.last_applied,
                last_membership: self.snapshot.marker.membership.clone(),
                snapshot_id,
            },
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

#[allow(deprecated)]
impl RaftStorage<CatalogTypeConfig> for CatalogLogStore {
    type LogReader = Self;
    type SnapshotBuilder = CatalogSnapshotBuilder;

    async fn get_log_state(
        &mut self,
    ) -> Result<LogState<CatalogTypeConfig>, StorageError<PeerUuid>> {
        let last_purged = *self.last_purged_cache.read();
        let last_log_id = self.last_log_id()?;
        Ok(LogState { last_purged_log_id: last_purged, last_log_id })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        Self {
            db: Arc::clone(&self.db),
            tablet: Arc::clone(&self.tablet),
            vote_cache: RwLock::new(*self.vote_cache.read()),
            last_purged_cache: RwLock::new(*self.last_purged_cache.read()),
        }
    }

    async fn save_vote(&mut self, vote: &Vote<PeerUuid>) -> Result<(), StorageError<PeerUuid>> {
        let vote_data = encode(vote).map_err(|e| to_serde_error(&e))?;

        let write_txn = self.db.begin_write().map_err(|e| to_storage_error(&e))?;
        {
            let mut meta = write_txn.open_table(META_TABLE).map_err(|e| to_storage_error(&e))?;
            meta.insert(KEY_VOTE, vote_data.as_slice()).map_err(|e| to_storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| to_storage_error(&e))?;

        *self.vote_cache.write() = Some(*vote);
        Ok(())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote<PeerUuid>>, StorageError<PeerUuid>> {
        Ok(*self.vote_cache.read())
    }

    async fn append_to_log<I>(&mut self, entries: I) -> Result<(), StorageError<PeerUuid>>
    where
        I: IntoIterator<Item = Entry<CatalogTypeConfig>> + OptionalSend,
    {
        let write_txn = self.db.begin_write().map_err(|e| to_storage_error(&e))?;
        {
            let mut log = write_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;
            for entry in entries {
                let index = entry.log_id.index;
                let entry_data = encode(&entry).map_err(|e| to_serde_error(&e))?;
                log.insert(index, entry_data.as_slice()).map_err(|e| to_storage_error(&e))?;
            }
        }
        write_txn.commit().map_err(|e| to_storage_error(&e))?;
        Ok(())
    }

    async fn delete_conflict_logs_since(
        &mut self,
        log_id: LogId<PeerUuid>,
    ) -> Result<(), StorageError<PeerUuid>> {
        let write_txn = self.db.begin_write().map_err(|e| to_storage_error(&e))?;
        {
            let mut log = write_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;
            let keys_to_remove: Vec<u64> = log
                .range(log_id.index..)
                .map_err(|e| to_storage_error(&e))?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| to_storage_error(&e))?;
            for key in keys_to_remove {
                log.remove(key).map_err(|e| to_storage_error(&e))?;
            }
        }
        write_txn.commit().map_err(|e| to_storage_error(&e))?;
        Ok(())
    }

    async fn purge_logs_upto(
        &mut self,
        log_id: LogId<PeerUuid>,
    ) -> Result<(), StorageError<PeerUuid>> {
        let write_txn = self.db.begin_write().map_err(|e| to_storage_error(&e))?;
        {
            let mut log = write_txn.open_table(LOG_TABLE).map_err(|e| to_storage_error(&e))?;
            let mut meta = write_txn.open_table(META_TABLE).map_err(|e| to_storage_error(&e))?;

            let keys_to_remove: Vec<u64> = log
                .range(..=log_id.index)
                .map_err(|e| to_storage_error(&e))?
                .map(|r| r.map(|(k, _)| k.value()))
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| to_storage_error(&e))?;
            for key in keys_to_remove {
                log.remove(key).map_err(|e| to_storage_error(&e))?;
            }

            let purged_data = encode(&log_id).map_err(|e| to_serde_error(&e))?;
            meta.insert(KEY_LAST_PURGED, purged_data.as_slice())
                .map_err(|e| to_storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| to_storage_error(&e))?;

        *self.last_purged_cache.write() = Some(log_id);
        Ok(())
    }

    async fn last_applied_state(
        &mut self,
    ) -> Result<
        (Option<LogId<PeerUuid>>, StoredMembership<PeerUuid, BasicNode>),
        StorageError<PeerUuid>,
    > {
        let marker = AppliedMarker::read_from(&self.tablet)?;
        Ok((marker.last_applied, marker.membership))
    }

    async fn apply_to_state_machine(
        &mut self,
        entries: &[Entry<CatalogTypeConfig>],
    ) -> Result<Vec<WriteResponse>, StorageError<PeerUuid>> {
        let mut responses = Vec::with_capacity(entries.len());
        let mut marker = AppliedMarker::read_from(&self.tablet)?;

        for entry in entries {
            marker.last_applied = Some(entry.log_id);

            let response = match &entry.payload {
                EntryPayload::Blank => {
                    self.tablet
                        .set_applied_marker(&marker.to_bytes()?)
                        .map_err(|e| to_storage_error(&e))?;
                    WriteResponse::default()
                }
                EntryPayload::Normal(request) => self
                    .tablet
                    .apply_write(&marker.to_bytes()?, request)
                    .map_err(|e| to_storage_error(&e))?,
                EntryPayload::Membership(membership) => {
                    marker.membership =
                        StoredMembership::new(Some(entry.log_id), membership.clone());
                    self.tablet
                        .set_applied_marker(&marker.to_bytes()?)
                        .map_err(|e| to_storage_error(&e))?;
                    WriteResponse::default()
                }
            };
            responses.push(response);
        }

        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        let snapshot = self
            .build_snapshot_data()
            .unwrap_or_else(|_| CatalogSnapshot { marker: AppliedMarker::default(), rows: vec![] });
        CatalogSnapshotBuilder { snapshot }
    }

    async fn begin_receiving_snapshot(
        &mut self,
    ) -> Result<Box<Cursor<Vec<u8>>>, StorageError<PeerUuid>> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        _meta: &SnapshotMeta<PeerUuid, BasicNode>,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError<PeerUuid>> {
        let data = snapshot.into_inner();
        let incoming: CatalogSnapshot = decode(&data).map_err(|e| to_serde_error(&e))?;

        self.tablet
            .restore(&incoming.marker.to_bytes()?, &incoming.rows)
            .map_err(|e| to_storage_error(&e))?;
        Ok(())
    }

    async fn get_current_snapshot(
        &mut self,
    ) -> Result<Option<Snapshot<CatalogTypeConfig>>, StorageError<PeerUuid>> {
        let snapshot = self.build_snapshot_data()?;
        if snapshot.marker.last_applied.is_none() {
            return Ok(None);
        }

        let data = encode(&snapshot).map_err(|e| to_serde_error(&e))?;
        let snapshot_id = format!(
            "snapshot-{}-{}",
            snapshot.marker.last_applied.as_ref().map(|l| l.index).unwrap_or(0),
            chrono::Utc::now().timestamp()
        );

        Ok(Some(Snapshot {
            meta: SnapshotMeta {
                last_log_id: snapshot.marker.last_applied,
                last_membership: snapshot.marker.membership.clone(),
                snapshot_id,
            },
            snapshot: Box::new(Cursor::new(data)),
        }))
    }
}

fn to_storage_error<E: std::fmt::Display>(e: &E) -> StorageError<PeerUuid> {
    StorageError::from_io_error(
        openraft::ErrorSubject::Store,
        openraft::ErrorVerb::Write,
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
    )
}

fn to_serde_error<E: std::fmt::Display>(e: &E) -> StorageError<PeerUuid> {
    StorageError::from_io_error(
        openraft::ErrorSubject::Store,
        openraft::ErrorVerb::Read,
        std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()),
    )
}
