//! Consensus metadata persistence.
//!
//! Each master keeps, per tablet, a small metadata file recording the
//! current term and the committed quorum configuration. It is written once
//! at catalog creation and re-read (and verified) at every load; once
//! consensus is running the consensus engine evolves the membership through
//! its own log.

use serde::{Deserialize, Serialize};

use strata_tablet::FsManager;
use strata_types::{Error, PeerUuid, RaftConfig, Result, ResultExt, TabletId};

/// Persisted consensus metadata for one tablet on one master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMetadata {
    /// The tablet this metadata belongs to.
    pub tablet_id: TabletId,
    /// The master that wrote this file.
    pub peer_uuid: PeerUuid,
    /// The current term.
    pub current_term: u64,
    /// The committed quorum configuration.
    pub committed_config: RaftConfig,
}

impl ConsensusMetadata {
    /// Creates and persists fresh consensus metadata.
    ///
    /// Fails with `IllegalState` if metadata for the tablet already exists.
    pub fn create(
        fs: &FsManager,
        tablet_id: impl Into<TabletId>,
        peer_uuid: PeerUuid,
        committed_config: RaftConfig,
        current_term: u64,
    ) -> Result<Self> {
        let tablet_id = tablet_id.into();
        let path = fs.consensus_metadata_path(&tablet_id);
        if path.exists() {
            return Err(Error::illegal_state(format!(
                "consensus metadata for tablet {tablet_id} already exists"
            )));
        }
        let meta = Self { tablet_id, peer_uuid, current_term, committed_config };
        meta.flush(fs)?;
        tracing::info!(
            tablet_id = %meta.tablet_id,
            peer_uuid = %meta.peer_uuid,
            term = meta.current_term,
            "created consensus metadata"
        );
        Ok(meta)
    }

    /// Loads the consensus metadata for `tablet_id`, verifying it belongs to
    /// `peer_uuid`.
    pub fn load(fs: &FsManager, tablet_id: &str, peer_uuid: PeerUuid) -> Result<Self> {
        let path = fs.consensus_metadata_path(tablet_id);
        let meta: Self = FsManager::read_json(&path)
            .prepend(format!("Unable to load consensus metadata for tablet {tablet_id}"))?;
        if meta.tablet_id != tablet_id {
            return Err(Error::corruption(format!(
                "consensus metadata at {} names tablet {}, expected {tablet_id}",
                path.display(),
                meta.tablet_id
            )));
        }
        if meta.peer_uuid != peer_uuid {
            return Err(Error::corruption(format!(
                "consensus metadata for tablet {tablet_id} belongs to peer {}, \
                 but this master is {peer_uuid}",
                meta.peer_uuid
            )));
        }
        Ok(meta)
    }

    /// Persists the current state.
    pub fn flush(&self, fs: &FsManager) -> Result<()> {
        FsManager::write_json(&fs.consensus_metadata_path(&self.tablet_id), self)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use strata_types::{HostPort, RaftPeer, MINIMUM_TERM};
    use tempfile::tempdir;
    use uuid::Uuid;

    use super::*;

    fn sample_config(uuid: PeerUuid) -> RaftConfig {
        RaftConfig {
            local: false,
            opid_index: strata_types::OPID_INDEX_UNKNOWN,
            peers: vec![RaftPeer::voter(uuid, HostPort::new("m1", 7051))],
        }
    }

    #[test]
    fn test_create_load_roundtrip() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let uuid = fs.uuid();

        let created =
            ConsensusMetadata::create(&fs, "t1", uuid, sample_config(uuid), MINIMUM_TERM)
                .expect("create");
        let loaded = ConsensusMetadata::load(&fs, "t1", uuid).expect("load");
        assert_eq!(created, loaded);
        assert_eq!(loaded.current_term, MINIMUM_TERM);
    }

    #[test]
    fn test_create_twice_fails() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let uuid = fs.uuid();

        ConsensusMetadata::create(&fs, "t1", uuid, sample_config(uuid), 0).expect("first");
        let err = ConsensusMetadata::create(&fs, "t1", uuid, sample_config(uuid), 0)
            .expect_err("second");
        assert!(err.is_illegal_state());
    }

    #[test]
    fn test_load_missing_is_not_found_with_context() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let err = ConsensusMetadata::load(&fs, "ghost", fs.uuid()).expect_err("load");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Unable to load consensus metadata for tablet ghost"));
    }

    #[test]
    fn test_load_with_wrong_peer_uuid_is_corruption() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let uuid = fs.uuid();
        ConsensusMetadata::create(&fs, "t1", uuid, sample_config(uuid), 0).expect("create");

        let err = ConsensusMetadata::load(&fs, "t1", Uuid::new_v4()).expect_err("load");
        assert!(err.is_corruption());
    }
}
