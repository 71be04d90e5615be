//! The system catalog itself.
//!
//! `SysCatalog` owns the catalog tablet peer and the sequential apply queue
//! through which every mutation travels. Mutations are leader-gated and
//! synchronous: `write` blocks until the batch has been replicated by the
//! quorum and applied to the local row store, so a caller that got `Ok` can
//! immediately re-read its own writes through the visitors.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use strata_consensus::{
    bootstrap_tablet, consensus_role, create_distributed_config, verify_loaded_config,
    ConsensusMetadata, PeerResolver, RaftRegistry, StateChangeCallback, TabletPeer,
};
use strata_tablet::{
    ColumnPredicate, FsManager, MaintenanceManager, PartitionSchema, ScanSpec, TabletDataState,
    TabletMetadata, Value, WriteRequest, WriteResponse,
};
use strata_types::{
    CatalogEntryType, Error, MasterOptions, RaftConfig, RaftPeer, RaftRole, Result, ResultExt,
    Schema, TableId, TableRecord, TabletId, TabletRecord, CATALOG_TABLET_ID, MINIMUM_TERM,
};

use crate::codec;
use crate::fault;
use crate::metrics;
use crate::schema::{catalog_schema, CATALOG_COL_TYPE, CATALOG_TABLE_ID, CATALOG_TABLE_NAME};

/// Invoked when this master becomes the catalog tablet's leader.
///
/// Called from consensus threads; must be thread-safe and reentrancy-aware.
/// A non-OK return while the catalog is still live is fatal to the process.
pub type ElectedLeaderCallback = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// An insert or update of one table's record.
#[derive(Debug, Clone)]
pub struct TableMutation {
    /// The table's id.
    pub table_id: TableId,
    /// The record to write.
    pub record: TableRecord,
}

/// An insert or update of one tablet's record.
#[derive(Debug, Clone)]
pub struct TabletMutation {
    /// The tablet's id.
    pub tablet_id: TabletId,
    /// The record to write.
    pub record: TabletRecord,
}

/// A batched catalog mutation.
///
/// Within one write, row operations are applied in a fixed order: table add,
/// table update, table delete, then tablet adds, updates, deletes. The
/// ordering is part of the contract; a batch that touches one key twice
/// observes it.
#[derive(Debug, Clone, Default)]
pub struct Actions {
    /// Table to insert.
    pub table_to_add: Option<TableMutation>,
    /// Table to update.
    pub table_to_update: Option<TableMutation>,
    /// Table row to delete.
    pub table_to_delete: Option<TableId>,
    /// Tablets to insert.
    pub tablets_to_add: Vec<TabletMutation>,
    /// Tablets to update.
    pub tablets_to_update: Vec<TabletMutation>,
    /// Tablet rows to delete.
    pub tablets_to_delete: Vec<TabletId>,
}

/// Construction-time wiring for [`SysCatalog`].
#[derive(bon::Builder)]
#[builder(on(_, required))]
pub struct SysCatalogContext {
    /// Master startup options.
    pub options: MasterOptions,
    /// Raft dispatch registry shared with the peer RPC server.
    pub registry: Arc<RaftRegistry>,
    /// Resolver used to discover peer UUIDs at create time.
    pub peer_resolver: Arc<dyn PeerResolver>,
    /// Invoked when this master is elected catalog leader.
    pub leader_cb: ElectedLeaderCallback,
    /// Receives the catalog tablet's maintenance ops.
    pub maintenance_manager: Arc<dyn MaintenanceManager>,
}

struct ApplyOp {
    request: WriteRequest,
    done: oneshot::Sender<Result<WriteResponse>>,
}

struct CatalogInner {
    options: MasterOptions,
    registry: Arc<RaftRegistry>,
    peer_resolver: Arc<dyn PeerResolver>,
    leader_cb: ElectedLeaderCallback,
    maintenance_manager: Arc<dyn MaintenanceManager>,
    tablet_peer: RwLock<Option<Arc<TabletPeer>>>,
    schema: RwLock<Option<Schema>>,
    key_schema: RwLock<Option<Schema>>,
    apply_tx: Mutex<Option<mpsc::Sender<ApplyOp>>>,
    apply_worker: Mutex<Option<JoinHandle<()>>>,
    shut_down: AtomicBool,
}

/// The master system catalog.
pub struct SysCatalog {
    inner: Arc<CatalogInner>,
}

impl SysCatalog {
    /// Creates an unopened catalog. Call [`SysCatalog::create_new`] or
    /// [`SysCatalog::load`] next.
    pub fn new(context: SysCatalogContext) -> Self {
        Self {
            inner: Arc::new(CatalogInner {
                options: context.options,
                registry: context.registry,
                peer_resolver: context.peer_resolver,
                leader_cb: context.leader_cb,
                maintenance_manager: context.maintenance_manager,
                tablet_peer: RwLock::new(None),
                schema: RwLock::new(None),
                key_schema: RwLock::new(None),
                apply_tx: Mutex::new(None),
                apply_worker: Mutex::new(None),
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    /// First-time initialization: persists the catalog tablet's metadata and
    /// the initial quorum, then stands the tablet up.
    pub async fn create_new(&self, fs: &FsManager) -> Result<()> {
        let schema = catalog_schema();
        let partition_schema = PartitionSchema::default();
        let mut partitions = partition_schema.create_partitions(&[])?;
        debug_assert_eq!(1, partitions.len());
        let partition = partitions
            .pop()
            .ok_or_else(|| Error::illegal_state("empty split set produced no partitions"))?;

        let metadata = TabletMetadata::create_new(
            fs,
            CATALOG_TABLET_ID,
            CATALOG_TABLE_ID,
            CATALOG_TABLE_NAME,
            schema,
            partition_schema,
            partition,
            TabletDataState::Ready,
        )?;

        let config = if self.inner.options.is_distributed() {
            create_distributed_config(&self.inner.options, self.inner.peer_resolver.as_ref())
                .await
                .prepend("Failed to create new distributed quorum config")?
        } else {
            RaftConfig::new_local(fs.uuid(), self.inner.options.advertised_rpc_addr.clone())
        };

        ConsensusMetadata::create(fs, CATALOG_TABLET_ID, fs.uuid(), config.clone(), MINIMUM_TERM)
            .prepend(format!(
                "Unable to persist consensus metadata for tablet {CATALOG_TABLET_ID}"
            ))?;

        self.setup_tablet(fs, metadata, config).await
    }

    /// Restart path: loads and verifies the persisted state, then stands the
    /// tablet up.
    pub async fn load(&self, fs: &FsManager) -> Result<()> {
        let metadata = TabletMetadata::load(fs, CATALOG_TABLET_ID)?;

        if metadata.schema != catalog_schema() {
            return Err(Error::corruption(format!(
                "Unexpected schema for catalog tablet: {:?}",
                metadata.schema
            )));
        }

        let cmeta = ConsensusMetadata::load(fs, CATALOG_TABLET_ID, fs.uuid())?;
        if self.inner.options.is_distributed() {
            tracing::info!("Verifying existing consensus state");
            verify_loaded_config(&cmeta.committed_config, &self.inner.options)?;
        }
        self.setup_tablet(fs, metadata, cmeta.committed_config).await
    }

    async fn setup_tablet(
        &self,
        fs: &FsManager,
        metadata: TabletMetadata,
        committed_config: RaftConfig,
    ) -> Result<()> {
        let local_peer = self.init_local_peer(fs);

        let weak = Arc::downgrade(&self.inner);
        let state_cb: StateChangeCallback = Arc::new(move |tablet_id, reason| {
            if let Some(inner) = weak.upgrade() {
                inner.state_changed(tablet_id, reason);
            }
        });

        let peer = Arc::new(TabletPeer::new(
            metadata.tablet_id.clone(),
            local_peer,
            Arc::clone(&self.inner.registry),
            state_cb,
        ));
        *self.inner.tablet_peer.write() = Some(Arc::clone(&peer));

        peer.set_bootstrapping();
        let (tablet, log, bootstrap_info) =
            bootstrap_tablet(&metadata, fs).prepend("Failed to bootstrap catalog tablet")?;

        peer.init(tablet, log).prepend("Failed to Init() tablet peer")?;
        peer.start(&bootstrap_info, &committed_config)
            .await
            .prepend("Failed to Start() tablet peer")?;

        peer.register_maintenance_ops(self.inner.maintenance_manager.as_ref())
            .prepend("Failed to register maintenance ops")?;

        *self.inner.schema.write() = Some(metadata.schema.clone());
        *self.inner.key_schema.write() = Some(metadata.schema.key_projection());

        self.start_apply_worker(peer);
        Ok(())
    }

    fn init_local_peer(&self, fs: &FsManager) -> RaftPeer {
        RaftPeer {
            permanent_uuid: Some(fs.uuid()),
            last_known_addr: self.inner.options.advertised_rpc_addr.clone(),
            member_type: strata_types::MemberType::Voter,
        }
    }

    fn start_apply_worker(&self, peer: Arc<TabletPeer>) {
        let (tx, mut rx) = mpsc::channel::<ApplyOp>(64);
        let handle = tokio::spawn(async move {
            // One op at a time: catalog writes are serialized on purpose.
            while let Some(op) = rx.recv().await {
                let result = peer.submit_write(op.request).await;
                let _ = op.done.send(result);
            }
        });
        *self.inner.apply_tx.lock() = Some(tx);
        *self.inner.apply_worker.lock() = Some(handle);
    }

    /// Blocks until the catalog tablet's consensus reports a leader.
    ///
    /// Timed-out polls are retried indefinitely with a progress log line; the
    /// caller bounds the total wait externally. Any other error returns.
    pub async fn wait_until_running(&self) -> Result<()> {
        let peer = self.tablet_peer()?;
        let mut seconds_waited = 0u64;
        loop {
            let status = peer.wait_until_consensus_running(Duration::from_secs(1)).await;
            seconds_waited += 1;
            match status {
                Ok(()) => {
                    tracing::info!(
                        "{}configured and running, proceeding with master startup.",
                        self.log_prefix()
                    );
                    return Ok(());
                }
                Err(e) if e.is_timed_out() => {
                    tracing::info!(
                        "{}not online yet (have been trying for {seconds_waited} seconds)",
                        self.log_prefix()
                    );
                    continue;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Applies a batched mutation through consensus and waits for it.
    pub async fn write(&self, actions: &Actions) -> Result<()> {
        let schema = self.schema()?;
        let mut req = WriteRequest::new(CATALOG_TABLET_ID, schema);

        if let Some(mutation) = &actions.table_to_add {
            codec::req_add_table(&mut req, &mutation.table_id, &mutation.record)?;
        }
        if let Some(mutation) = &actions.table_to_update {
            codec::req_update_table(&mut req, &mutation.table_id, &mutation.record)?;
        }
        if let Some(table_id) = &actions.table_to_delete {
            codec::req_delete_table(&mut req, table_id)?;
        }

        let adds: Vec<(TabletId, TabletRecord)> = actions
            .tablets_to_add
            .iter()
            .map(|m| (m.tablet_id.clone(), m.record.clone()))
            .collect();
        codec::req_add_tablets(&mut req, &adds)?;
        let updates: Vec<(TabletId, TabletRecord)> = actions
            .tablets_to_update
            .iter()
            .map(|m| (m.tablet_id.clone(), m.record.clone()))
            .collect();
        codec::req_update_tablets(&mut req, &updates)?;
        codec::req_delete_tablets(&mut req, &actions.tablets_to_delete)?;

        self.sync_write(req).await
    }

    /// Submits one write request and blocks until it is replicated and
    /// applied, converting response errors to statuses.
    async fn sync_write(&self, request: WriteRequest) -> Result<()> {
        fault::maybe_fail_write()?;

        let started = Instant::now();
        let result = self.sync_write_inner(request).await;
        metrics::record_write(started.elapsed(), result.is_ok());
        result
    }

    async fn sync_write_inner(&self, request: WriteRequest) -> Result<()> {
        let apply_tx = self
            .inner
            .apply_tx
            .lock()
            .clone()
            .ok_or_else(|| Error::illegal_state("catalog is not running"))?;

        let (done_tx, done_rx) = oneshot::channel();
        apply_tx
            .send(ApplyOp { request, done: done_tx })
            .await
            .map_err(|_| Error::illegal_state("catalog apply queue is stopped"))?;

        // The single-shot latch: resolved by the apply worker once the write
        // has been replicated and applied locally.
        let response = done_rx
            .await
            .map_err(|_| Error::runtime_error("catalog apply worker went away"))??;

        if let Some(error) = response.error {
            return Err(error.into_error());
        }
        if !response.per_row_errors.is_empty() {
            for row_error in &response.per_row_errors {
                tracing::warn!(
                    row = row_error.row_index,
                    error = %row_error.message,
                    "row failed to write"
                );
            }
            return Err(Error::corruption("One or more rows failed to write"));
        }
        Ok(())
    }

    /// Invokes `visitor` once per table entry.
    ///
    /// Visitors must not mutate the catalog; the scan observes a snapshot
    /// taken at initiation.
    pub fn visit_tables<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, TableRecord) -> Result<()>,
    {
        let mut rows = 0u64;
        let result = self.visit_rows(CatalogEntryType::Table, |row| {
            let record = codec::decode_table_row(row)?;
            rows += 1;
            visitor(&row.entry_id, record)
        });
        metrics::record_visit_rows("table", rows);
        result
    }

    /// Invokes `visitor` once per tablet entry, with the owning table id.
    ///
    /// Every record handed out has its `partition` populated; the deprecated
    /// bound fields are upgraded during decode.
    pub fn visit_tablets<F>(&self, mut visitor: F) -> Result<()>
    where
        F: FnMut(&str, &str, TabletRecord) -> Result<()>,
    {
        let mut rows = 0u64;
        let result = self.visit_rows(CatalogEntryType::Tablet, |row| {
            let record = codec::decode_tablet_row(row)?;
            rows += 1;
            let table_id = record.table_id.clone();
            visitor(&table_id, &row.entry_id, record)
        });
        metrics::record_visit_rows("tablet", rows);
        result
    }

    fn visit_rows<F>(&self, entry_type: CatalogEntryType, mut per_row: F) -> Result<()>
    where
        F: FnMut(&strata_tablet::CatalogRow) -> Result<()>,
    {
        let peer = self.tablet_peer()?;
        let tablet = peer.tablet()?;

        let mut spec = ScanSpec::new();
        spec.add_predicate(ColumnPredicate::Equality {
            column: CATALOG_COL_TYPE.to_string(),
            value: Value::Int8(entry_type.as_i8()),
        });

        let mut iter = tablet.new_row_iterator(spec)?;
        while let Some(block) = iter.next_block()? {
            for row in &block {
                per_row(row)?;
            }
        }
        Ok(())
    }

    /// The canonical schema, once the tablet is set up.
    pub fn schema(&self) -> Result<Schema> {
        self.inner
            .schema
            .read()
            .clone()
            .ok_or_else(|| Error::illegal_state("catalog is not running"))
    }

    /// The key-only projection of the canonical schema.
    pub fn key_schema(&self) -> Result<Schema> {
        self.inner
            .key_schema
            .read()
            .clone()
            .ok_or_else(|| Error::illegal_state("catalog is not running"))
    }

    /// This master's role for the catalog tablet.
    pub fn role(&self) -> Result<RaftRole> {
        self.tablet_peer()?.role()
    }

    /// Orderly teardown: stops the apply queue, then the tablet peer.
    pub async fn shutdown(&self) {
        self.inner.shut_down.store(true, Ordering::SeqCst);

        *self.inner.apply_tx.lock() = None;
        let worker = self.inner.apply_worker.lock().take();
        if let Some(worker) = worker {
            let _ = worker.await;
        }

        let peer = self.inner.tablet_peer.read().clone();
        if let Some(peer) = peer {
            peer.shutdown().await;
        }
        tracing::info!("{}shut down", self.log_prefix());
    }

    /// True once [`SysCatalog::shutdown`] has begun.
    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    fn tablet_peer(&self) -> Result<Arc<TabletPeer>> {
        self.inner
            .tablet_peer
            .read()
            .clone()
            .ok_or_else(|| Error::illegal_state("catalog tablet is not set up"))
    }

    fn log_prefix(&self) -> String {
        let peer = self.inner.tablet_peer.read().clone();
        match peer {
            Some(peer) => {
                format!("T {} P {} [{}]: ", peer.tablet_id(), peer.permanent_uuid(), CATALOG_TABLE_NAME)
            }
            None => format!("[{CATALOG_TABLE_NAME}]: "),
        }
    }
}

impl CatalogInner {
    /// Handles a consensus state-change notification.
    fn state_changed(self: Arc<Self>, tablet_id: &str, reason: &str) {
        let peer = match self.tablet_peer.read().clone() {
            Some(peer) => peer,
            None => return,
        };
        // A notification for any other tablet is a wiring bug.
        assert_eq!(
            tablet_id,
            peer.tablet_id(),
            "state change notification for unexpected tablet"
        );

        let cstate = match peer.consensus_state() {
            Ok(cstate) => cstate,
            Err(e) => {
                tracing::warn!(
                    tablet_id = %tablet_id,
                    reason = %reason,
                    error = %e,
                    "received notification of tablet state change but tablet no longer running"
                );
                return;
            }
        };

        tracing::info!(
            tablet_id = %tablet_id,
            reason = %reason,
            term = cstate.term,
            leader = ?cstate.leader_uuid,
            "catalog tablet state changed"
        );

        let role = consensus_role(&peer.permanent_uuid(), &cstate);
        tracing::info!(tablet_id = %tablet_id, role = %role, "this master's current role");
        metrics::set_is_leader(role == RaftRole::Leader);

        if role == RaftRole::Leader {
            if let Err(e) = (self.leader_cb)() {
                if self.shut_down.load(Ordering::SeqCst) {
                    tracing::warn!(error = %e, "elected-leader callback failed during shutdown");
                } else {
                    // A live catalog whose leader hook failed cannot safely
                    // keep serving; this replica's view has diverged from its
                    // leadership.
                    tracing::error!(error = %e, "elected-leader callback failed; aborting");
                    std::process::abort();
                }
            }
        }
    }
}
