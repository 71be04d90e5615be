//! The catalog tablet peer.
//!
//! A tablet peer binds one tablet's row store, raft log, and raft instance
//! together on one master. Lifecycle: construct, mark bootstrapping, run the
//! bootstrap collaborator to open the stores, `init`, then `start` to bring
//! up consensus. State-change notifications flow to the owner through a
//! plain callback value; there are no back-references from consensus into
//! the catalog.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use openraft::error::{ClientWriteError, InitializeError, RaftError};
use openraft::storage::Adaptor;
use openraft::{BasicNode, LogId, Raft};
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;

use strata_tablet::{
    CompactTabletOp, FsManager, MaintenanceManager, TabletMetadata, TabletStore, WriteRequest,
    WriteResponse,
};
use strata_types::{
    ConsensusState, Error, MemberType, PeerUuid, RaftConfig, RaftPeer, RaftRole, Result, TabletId,
    OPID_INDEX_UNKNOWN,
};

use crate::log_store::CatalogLogStore;
use crate::network::GrpcRaftNetworkFactory;
use crate::quorum::consensus_role;
use crate::registry::RaftRegistry;
use crate::type_config::CatalogTypeConfig;

/// Callback invoked with `(tablet_id, reason)` whenever the tablet's
/// consensus state changes. Invoked from consensus threads; must be
/// thread-safe.
pub type StateChangeCallback = Arc<dyn Fn(&str, &str) + Send + Sync>;

/// What log replay found on disk, reported by the bootstrap collaborator.
#[derive(Debug, Clone, Default)]
pub struct ConsensusBootstrapInfo {
    /// Id of the last entry in the raft log.
    pub last_log_id: Option<LogId<PeerUuid>>,
    /// Id of the last entry applied to the row store.
    pub last_applied: Option<LogId<PeerUuid>>,
}

/// Opens the tablet's row store and raft log and reports the replay state.
pub fn bootstrap_tablet(
    metadata: &TabletMetadata,
    fs: &FsManager,
) -> Result<(Arc<TabletStore>, CatalogLogStore, ConsensusBootstrapInfo)> {
    let tablet = Arc::new(TabletStore::open(
        fs.tablet_data_path(&metadata.tablet_id),
        metadata.tablet_id.clone(),
        metadata.schema.clone(),
    )?);
    let log = CatalogLogStore::open(fs.wal_path(&metadata.tablet_id), Arc::clone(&tablet))
        .map_err(|e| Error::runtime_error(format!("unable to open raft log: {e}")))?;

    let info = ConsensusBootstrapInfo {
        last_log_id: log
            .last_log_id()
            .map_err(|e| Error::corruption(format!("unable to read raft log: {e}")))?,
        last_applied: log
            .last_applied()
            .map_err(|e| Error::corruption(format!("unable to read applied state: {e}")))?,
    };
    tracing::info!(
        tablet_id = %metadata.tablet_id,
        last_log_index = info.last_log_id.map(|l| l.index),
        last_applied_index = info.last_applied.map(|l| l.index),
        "tablet bootstrap complete"
    );
    Ok((tablet, log, info))
}

/// Lifecycle state of a tablet peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TabletPeerState {
    /// Constructed, nothing opened yet.
    NotStarted,
    /// Replaying on-disk state.
    Bootstrapping,
    /// Consensus running.
    Running,
    /// Torn down.
    Shutdown,
}

/// One master's replica of the catalog tablet.
pub struct TabletPeer {
    tablet_id: TabletId,
    local_peer: RaftPeer,
    registry: Arc<RaftRegistry>,
    state_change_cb: StateChangeCallback,
    state: RwLock<TabletPeerState>,
    tablet: RwLock<Option<Arc<TabletStore>>>,
    // Held between init and start, when the raft instance takes ownership.
    log: Mutex<Option<CatalogLogStore>>,
    raft: RwLock<Option<Raft<CatalogTypeConfig>>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl TabletPeer {
    /// Creates a peer for `tablet_id` with this master's identity.
    pub fn new(
        tablet_id: impl Into<TabletId>,
        local_peer: RaftPeer,
        registry: Arc<RaftRegistry>,
        state_change_cb: StateChangeCallback,
    ) -> Self {
        Self {
            tablet_id: tablet_id.into(),
            local_peer,
            registry,
            state_change_cb,
            state: RwLock::new(TabletPeerState::NotStarted),
            tablet: RwLock::new(None),
            log: Mutex::new(None),
            raft: RwLock::new(None),
            watcher: Mutex::new(None),
        }
    }

    /// The tablet this peer replicates.
    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// This master's permanent UUID.
    pub fn permanent_uuid(&self) -> PeerUuid {
        self.local_peer.permanent_uuid.unwrap_or_default()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TabletPeerState {
        *self.state.read()
    }

    /// Marks the peer as replaying on-disk state.
    pub fn set_bootstrapping(&self) {
        *self.state.write() = TabletPeerState::Bootstrapping;
    }

    /// Binds the opened stores to the peer.
    pub fn init(&self, tablet: Arc<TabletStore>, log: CatalogLogStore) -> Result<()> {
        if self.state() != TabletPeerState::Bootstrapping {
            return Err(Error::illegal_state(format!(
                "tablet peer for {} is not bootstrapping",
                self.tablet_id
            )));
        }
        *self.tablet.write() = Some(tablet);
        *self.log.lock() = Some(log);
        Ok(())
    }

    /// Starts consensus.
    ///
    /// Builds the raft instance over the stores bound by `init`. When the
    /// log is empty (a freshly created tablet), initializes membership from
    /// the persisted committed configuration; otherwise the log already
    /// carries the membership.
    pub async fn start(
        &self,
        bootstrap_info: &ConsensusBootstrapInfo,
        committed_config: &RaftConfig,
    ) -> Result<()> {
        let log_store = self.log.lock().take().ok_or_else(|| {
            Error::illegal_state(format!("tablet peer for {} was not initialized", self.tablet_id))
        })?;

        let raft_config = Arc::new(openraft::Config {
            cluster_name: format!("catalog-{}", self.tablet_id),
            heartbeat_interval: 150,
            election_timeout_min: 300,
            election_timeout_max: 600,
            ..Default::default()
        });

        let network = GrpcRaftNetworkFactory::new(self.tablet_id.clone());
        let (log_storage, state_machine) = Adaptor::new(log_store);

        let raft = Raft::<CatalogTypeConfig>::new(
            self.permanent_uuid(),
            raft_config,
            network,
            log_storage,
            state_machine,
        )
        .await
        .map_err(|e| Error::runtime_error(format!("unable to create raft instance: {e}")))?;

        if bootstrap_info.last_log_id.is_none() {
            let mut members: BTreeMap<PeerUuid, BasicNode> = BTreeMap::new();
            for peer in &committed_config.peers {
                let uuid = peer.permanent_uuid.ok_or_else(|| {
                    Error::invalid_argument(format!(
                        "committed configuration peer {} has no UUID",
                        peer.describe()
                    ))
                })?;
                let addr = peer
                    .last_known_addr
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_default();
                members.insert(uuid, BasicNode { addr });
            }
            match raft.initialize(members).await {
                Ok(()) => {
                    tracing::info!(tablet_id = %self.tablet_id, "initialized consensus membership");
                }
                Err(RaftError::APIError(InitializeError::NotAllowed(_))) => {
                    // Another start already initialized this log.
                    tracing::warn!(tablet_id = %self.tablet_id, "consensus membership already initialized");
                }
                Err(e) => {
                    return Err(Error::runtime_error(format!(
                        "unable to initialize consensus membership: {e}"
                    )));
                }
            }
        }

        self.registry.register(self.tablet_id.clone(), raft.clone());
        self.spawn_state_watcher(&raft);
        *self.raft.write() = Some(raft);
        *self.state.write() = TabletPeerState::Running;

        (self.state_change_cb)(&self.tablet_id, "consensus started");
        Ok(())
    }

    fn spawn_state_watcher(&self, raft: &Raft<CatalogTypeConfig>) {
        let mut rx = raft.metrics();
        let cb = Arc::clone(&self.state_change_cb);
        let tablet_id = self.tablet_id.clone();

        let handle = tokio::spawn(async move {
            let initial = rx.borrow().clone();
            let mut last_term = initial.current_term;
            let mut last_leader = initial.current_leader;
            let mut last_membership_log_id = initial.membership_config.log_id().clone();

            while rx.changed().await.is_ok() {
                let metrics = rx.borrow().clone();
                let membership_log_id = metrics.membership_config.log_id().clone();

                let reason = if metrics.current_leader != last_leader {
                    Some("new leader")
                } else if metrics.current_term != last_term {
                    Some("term changed")
                } else if membership_log_id != last_membership_log_id {
                    Some("config changed")
                } else {
                    None
                };

                last_term = metrics.current_term;
                last_leader = metrics.current_leader;
                last_membership_log_id = membership_log_id;

                if let Some(reason) = reason {
                    cb(&tablet_id, reason);
                }
            }
            tracing::debug!(tablet_id = %tablet_id, "state watcher stopped");
        });
        *self.watcher.lock() = Some(handle);
    }

    /// Registers this tablet's maintenance work with `manager`.
    pub fn register_maintenance_ops(&self, manager: &dyn MaintenanceManager) -> Result<()> {
        let tablet = self.tablet()?;
        manager.register(Arc::new(CompactTabletOp::new(&self.tablet_id, tablet)));
        Ok(())
    }

    /// The row store, once bootstrapped.
    pub fn tablet(&self) -> Result<Arc<TabletStore>> {
        self.tablet.read().clone().ok_or_else(|| {
            Error::illegal_state(format!("tablet peer for {} has no tablet", self.tablet_id))
        })
    }

    /// The raft handle, while running.
    pub fn raft(&self) -> Option<Raft<CatalogTypeConfig>> {
        self.raft.read().clone()
    }

    /// Snapshot of the latest committed consensus state.
    pub fn consensus_state(&self) -> Result<ConsensusState> {
        let raft = self.raft().ok_or_else(|| {
            Error::service_unavailable(format!(
                "consensus for tablet {} is not running",
                self.tablet_id
            ))
        })?;

        let metrics = raft.metrics().borrow().clone();
        let membership = metrics.membership_config;
        let voters: std::collections::BTreeSet<PeerUuid> =
            membership.membership().voter_ids().collect();

        let mut peers = Vec::new();
        for (uuid, node) in membership.nodes() {
            peers.push(RaftPeer {
                permanent_uuid: Some(*uuid),
                last_known_addr: node.addr.parse().ok(),
                member_type: if voters.contains(uuid) {
                    MemberType::Voter
                } else {
                    MemberType::NonVoter
                },
            });
        }
        let opid_index = match membership.log_id() {
            Some(log_id) => log_id.index as i64,
            None => OPID_INDEX_UNKNOWN,
        };

        Ok(ConsensusState {
            term: metrics.current_term,
            leader_uuid: metrics.current_leader,
            config: RaftConfig { local: false, opid_index, peers },
        })
    }

    /// This master's role in the latest committed state.
    pub fn role(&self) -> Result<RaftRole> {
        let cstate = self.consensus_state()?;
        Ok(consensus_role(&self.permanent_uuid(), &cstate))
    }

    /// Blocks until consensus reports an elected leader, or `timeout`.
    pub async fn wait_until_consensus_running(&self, timeout: Duration) -> Result<()> {
        let raft = self.raft().ok_or_else(|| {
            Error::service_unavailable(format!(
                "consensus for tablet {} is not running",
                self.tablet_id
            ))
        })?;

        raft.wait(Some(timeout))
            .metrics(|m| m.current_leader.is_some(), "consensus running")
            .await
            .map_err(|e| match e {
                openraft::metrics::WaitError::Timeout(_, _) => {
                    Error::timed_out(format!("consensus for tablet {} not ready", self.tablet_id))
                }
                openraft::metrics::WaitError::ShuttingDown => {
                    Error::illegal_state("consensus is shutting down")
                }
            })?;
        Ok(())
    }

    /// Submits a write through consensus and waits for it to be applied
    /// locally.
    pub async fn submit_write(&self, request: WriteRequest) -> Result<WriteResponse> {
        let raft = self.raft().ok_or_else(|| {
            Error::service_unavailable(format!(
                "consensus for tablet {} is not running",
                self.tablet_id
            ))
        })?;

        match raft.client_write(request).await {
            Ok(response) => Ok(response.data),
            Err(RaftError::APIError(ClientWriteError::ForwardToLeader(forward))) => {
                Err(Error::illegal_state(format!(
                    "not the leader for tablet {}; current leader is {:?}",
                    self.tablet_id, forward.leader_id
                )))
            }
            Err(RaftError::APIError(e)) => {
                Err(Error::runtime_error(format!("consensus rejected write: {e}")))
            }
            Err(RaftError::Fatal(e)) => {
                Err(Error::runtime_error(format!("consensus fatal error: {e}")))
            }
        }
    }

    /// Tears the peer down: stops the watcher, shuts down consensus, and
    /// unregisters from the RPC dispatch registry.
    pub async fn shutdown(&self) {
        *self.state.write() = TabletPeerState::Shutdown;

        if let Some(handle) = self.watcher.lock().take() {
            handle.abort();
        }
        let raft = self.raft.write().take();
        if let Some(raft) = raft {
            if let Err(e) = raft.shutdown().await {
                tracing::warn!(tablet_id = %self.tablet_id, error = %e, "raft shutdown reported an error");
            }
        }
        self.registry.unregister(&self.tablet_id);
        tracing::info!(tablet_id = %self.tablet_id, "tablet peer shut down");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use strata_tablet::{PartitionSchema, TabletDataState};
    use strata_types::{HostPort, PartitionBounds, Schema};
    use tempfile::tempdir;

    use super::*;

    fn catalog_schema() -> Schema {
        Schema::builder()
            .add_key_column("entry_type", strata_types::DataType::Int8)
            .unwrap()
            .add_key_column("entry_id", strata_types::DataType::String)
            .unwrap()
            .add_column("metadata", strata_types::DataType::String)
            .unwrap()
            .build()
            .unwrap()
    }

    fn make_metadata(fs: &FsManager) -> TabletMetadata {
        TabletMetadata::create_new(
            fs,
            "tablet-0",
            "sys.catalog",
            "sys.catalog",
            catalog_schema(),
            PartitionSchema::default(),
            PartitionBounds::default(),
            TabletDataState::Ready,
        )
        .expect("create metadata")
    }

    #[tokio::test]
    async fn test_bootstrap_reports_empty_state_for_fresh_tablet() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let metadata = make_metadata(&fs);

        let (_tablet, _log, info) = bootstrap_tablet(&metadata, &fs).expect("bootstrap");
        assert!(info.last_log_id.is_none());
        assert!(info.last_applied.is_none());
    }

    #[tokio::test]
    async fn test_peer_lifecycle_single_node() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let metadata = make_metadata(&fs);
        let uuid = fs.uuid();

        let registry = Arc::new(RaftRegistry::new());
        let peer = TabletPeer::new(
            "tablet-0",
            RaftPeer::voter(uuid, HostPort::new("127.0.0.1", 0)),
            Arc::clone(&registry),
            Arc::new(|_, _| {}),
        );
        assert_eq!(peer.state(), TabletPeerState::NotStarted);

        peer.set_bootstrapping();
        let (tablet, log, info) = bootstrap_tablet(&metadata, &fs).expect("bootstrap");
        peer.init(tablet, log).expect("init");

        let config = RaftConfig::new_local(uuid, None);
        peer.start(&info, &config).await.expect("start");
        assert_eq!(peer.state(), TabletPeerState::Running);
        assert!(registry.get("tablet-0").is_some());

        peer.wait_until_consensus_running(Duration::from_secs(5)).await.expect("running");
        assert_eq!(peer.role().expect("role"), RaftRole::Leader);

        peer.shutdown().await;
        assert_eq!(peer.state(), TabletPeerState::Shutdown);
        assert!(registry.get("tablet-0").is_none());
        assert!(peer.consensus_state().unwrap_err().is_service_unavailable());
    }

    #[tokio::test]
    async fn test_init_requires_bootstrapping_state() {
        let dir = tempdir().expect("temp dir");
        let fs = FsManager::open(dir.path()).expect("open fs");
        let metadata = make_metadata(&fs);
        let (tablet, log, _info) = bootstrap_tablet(&metadata, &fs).expect("bootstrap");

        let peer = TabletPeer::new(
            "tablet-0",
            RaftPeer::voter(fs.uuid(), HostPort::new("127.0.0.1", 0)),
            Arc::new(RaftRegistry::new()),
            Arc::new(|_, _| {}),
        );
        let err = peer.init(tablet, log).unwrap_err();
        assert!(err.is_illegal_state());
    }
}
