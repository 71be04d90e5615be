//! A multi-master test cluster wired over loopback gRPC.
//!
//! Each master gets its own data directory, raft registry, peer RPC server
//! on an ephemeral loopback port, and system catalog. The cluster drives the
//! same startup sequence a real master does: server first (so peers can
//! discover this master's UUID), then catalog creation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use strata_catalog::{SysCatalog, SysCatalogContext};
use strata_consensus::{NodeIdentity, PeerServer, RaftRegistry, RpcPeerResolver};
use strata_tablet::{FsManager, MaintenanceRegistry};
use strata_types::{HostPort, MasterOptions, RaftRole, Result};

use crate::test_dir::TestDir;

/// One master of a [`TestCluster`].
pub struct TestMaster {
    /// Position within the cluster.
    pub index: usize,
    /// The master's filesystem manager.
    pub fs: FsManager,
    /// The loopback address of the master's peer server.
    pub addr: HostPort,
    /// The raft dispatch registry shared with the peer server.
    pub registry: Arc<RaftRegistry>,
    /// The master's system catalog.
    pub catalog: Arc<SysCatalog>,
    /// Number of times the elected-leader callback has fired.
    pub leader_callbacks: Arc<AtomicUsize>,
    shutdown_tx: watch::Sender<bool>,
    server_task: JoinHandle<Result<()>>,
}

impl TestMaster {
    /// True when this master currently leads the catalog tablet.
    pub fn is_leader(&self) -> bool {
        matches!(self.catalog.role(), Ok(RaftRole::Leader))
    }

    /// Shuts the catalog down and loads a fresh one with `master_addresses`.
    ///
    /// On success the fresh catalog replaces the old one; on failure the
    /// master is left without a running catalog, which is exactly the state
    /// a refused restart leaves a real master in.
    pub async fn restart_catalog(&mut self, master_addresses: Vec<HostPort>) -> Result<()> {
        self.catalog.shutdown().await;

        let options = MasterOptions {
            master_addresses,
            advertised_rpc_addr: Some(self.addr.clone()),
        };
        let catalog =
            make_catalog(options, Arc::clone(&self.registry), Arc::clone(&self.leader_callbacks));
        catalog.load(&self.fs).await?;
        self.catalog = catalog;
        Ok(())
    }

    /// Stops the peer server.
    pub async fn stop_server(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.server_task.await;
    }
}

/// Builds a catalog with the standard test wiring.
pub(crate) fn make_catalog(
    options: MasterOptions,
    registry: Arc<RaftRegistry>,
    leader_callbacks: Arc<AtomicUsize>,
) -> Arc<SysCatalog> {
    let counter = Arc::clone(&leader_callbacks);
    Arc::new(SysCatalog::new(
        SysCatalogContext::builder()
            .options(options)
            .registry(registry)
            .peer_resolver(Arc::new(RpcPeerResolver::new()))
            .leader_cb(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }))
            .maintenance_manager(Arc::new(MaintenanceRegistry::new()))
            .build(),
    ))
}

/// A cluster of masters sharing one catalog quorum.
pub struct TestCluster {
    /// Root directory holding every master's data directory.
    pub root: TestDir,
    /// The masters, in configuration order.
    pub masters: Vec<TestMaster>,
}

impl TestCluster {
    /// Stands up `num_masters` masters and creates the catalog on each.
    ///
    /// A single master runs in local (unreplicated) mode; more than one runs
    /// distributed with peer UUID discovery over loopback gRPC.
    pub async fn new(num_masters: usize) -> Self {
        let root = TestDir::new();

        // Servers come up first so UUID discovery can reach every peer.
        let mut partial: Vec<(FsManager, HostPort, Arc<RaftRegistry>, watch::Sender<bool>, JoinHandle<Result<()>>)> =
            Vec::new();
        for index in 0..num_masters {
            let fs = FsManager::open(root.join(format!("master-{index}")))
                .expect("open fs manager");
            let registry = Arc::new(RaftRegistry::new());
            let (shutdown_tx, shutdown_rx) = watch::channel(false);

            let server = PeerServer::bind(
                "127.0.0.1:0".parse().expect("loopback addr"),
                Arc::clone(&registry),
                shutdown_rx,
            )
            .await
            .expect("bind peer server");
            let addr = HostPort::new("127.0.0.1", server.local_addr().port());

            let identity =
                NodeIdentity { permanent_uuid: fs.uuid(), rpc_addr: addr.clone() };
            let server_task = tokio::spawn(server.serve(identity));

            partial.push((fs, addr, registry, shutdown_tx, server_task));
        }

        let master_addresses: Vec<HostPort> =
            partial.iter().map(|(_, addr, _, _, _)| addr.clone()).collect();

        let mut masters = Vec::new();
        for (index, (fs, addr, registry, shutdown_tx, server_task)) in
            partial.into_iter().enumerate()
        {
            let options = MasterOptions {
                master_addresses: if num_masters > 1 {
                    master_addresses.clone()
                } else {
                    Vec::new()
                },
                advertised_rpc_addr: Some(addr.clone()),
            };
            let leader_callbacks = Arc::new(AtomicUsize::new(0));
            let catalog =
                make_catalog(options, Arc::clone(&registry), Arc::clone(&leader_callbacks));
            catalog.create_new(&fs).await.expect("create catalog");

            masters.push(TestMaster {
                index,
                fs,
                addr,
                registry,
                catalog,
                leader_callbacks,
                shutdown_tx,
                server_task,
            });
        }

        Self { root, masters }
    }

    /// The configured master addresses, in order.
    pub fn master_addresses(&self) -> Vec<HostPort> {
        self.masters.iter().map(|m| m.addr.clone()).collect()
    }

    /// Waits until every master's catalog reports a running consensus.
    pub async fn wait_all_running(&self, timeout: Duration) {
        for master in &self.masters {
            tokio::time::timeout(timeout, master.catalog.wait_until_running())
                .await
                .expect("catalog did not come up in time")
                .expect("wait_until_running failed");
        }
    }

    /// Waits until some master is leader and returns its index.
    pub async fn wait_for_leader(&self, timeout: Duration) -> usize {
        crate::assert_eventually(timeout, "a catalog leader is elected", || {
            let elected = self.leader().is_some();
            async move { elected }
        })
        .await;
        self.leader().map(|m| m.index).expect("leader just observed")
    }

    /// The current leader, if any.
    pub fn leader(&self) -> Option<&TestMaster> {
        self.masters.iter().find(|m| m.is_leader())
    }

    /// The current followers.
    pub fn followers(&self) -> Vec<&TestMaster> {
        self.masters.iter().filter(|m| !m.is_leader()).collect()
    }

    /// Shuts down every catalog, then every server.
    pub async fn shutdown(self) {
        for master in &self.masters {
            master.catalog.shutdown().await;
        }
        for master in self.masters {
            master.stop_server().await;
        }
    }
}
