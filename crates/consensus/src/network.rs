//! Raft network transport over the inter-master peer service.
//!
//! Implements openraft's `RaftNetwork` for outgoing vote, append-entries,
//! and install-snapshot RPCs. Connections are created on demand and cached
//! per target peer; any transport failure is reported to openraft as
//! `Unreachable` so replication backs off and retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use openraft::error::{Fatal, RPCError, RaftError, ReplicationClosed, StreamingError, Unreachable};
use openraft::network::{RPCOption, RaftNetwork, RaftNetworkFactory};
use openraft::raft::{
    AppendEntriesRequest, AppendEntriesResponse, InstallSnapshotRequest, InstallSnapshotResponse,
    SnapshotResponse, VoteRequest, VoteResponse,
};
use openraft::{BasicNode, Snapshot, Vote};
use parking_lot::RwLock;
use tonic::transport::Channel;

use strata_types::{decode, encode, PeerUuid, TabletId};

use crate::rpc::peer_service_client::PeerServiceClient;
use crate::rpc::ConsensusPayload;
use crate::type_config::CatalogTypeConfig;

/// Error type for network operations.
#[derive(Debug, Clone)]
pub struct NetworkError(String);

impl std::fmt::Display for NetworkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NetworkError: {}", self.0)
    }
}

impl std::error::Error for NetworkError {}

/// Shared client cache for one raft group's outgoing connections.
#[derive(Clone, Default)]
struct ClientPool {
    clients: Arc<RwLock<HashMap<PeerUuid, PeerServiceClient<Channel>>>>,
}

impl ClientPool {
    async fn get_client(
        &self,
        target: PeerUuid,
        node: &BasicNode,
    ) -> Result<PeerServiceClient<Channel>, NetworkError> {
        if let Some(client) = self.clients.read().get(&target).cloned() {
            return Ok(client);
        }

        let endpoint = format!("http://{}", node.addr);
        let client = PeerServiceClient::connect(endpoint)
            .await
            .map_err(|e| NetworkError(format!("connection to {} failed: {e}", node.addr)))?;
        self.clients.write().insert(target, client.clone());
        Ok(client)
    }

    fn evict(&self, target: &PeerUuid) {
        self.clients.write().remove(target);
    }
}

/// Factory for per-peer raft network connections.
pub struct GrpcRaftNetworkFactory {
    tablet_id: TabletId,
    pool: ClientPool,
}

impl GrpcRaftNetworkFactory {
    /// Creates a factory for the raft group of `tablet_id`.
    pub fn new(tablet_id: impl Into<TabletId>) -> Self {
        Self { tablet_id: tablet_id.into(), pool: ClientPool::default() }
    }
}

impl RaftNetworkFactory<CatalogTypeConfig> for GrpcRaftNetworkFactory {
    type Network = GrpcRaftNetworkConnection;

    async fn new_client(&mut self, target: PeerUuid, node: &BasicNode) -> Self::Network {
        GrpcRaftNetworkConnection {
            tablet_id: self.tablet_id.clone(),
            target,
            node: node.clone(),
            pool: self.pool.clone(),
        }
    }
}

/// A connection to one raft peer.
pub struct GrpcRaftNetworkConnection {
    tablet_id: TabletId,
    target: PeerUuid,
    node: BasicNode,
    pool: ClientPool,
}

impl GrpcRaftNetworkConnection {
    fn payload<T: serde::Serialize>(&self, message: &T) -> Result<ConsensusPayload, NetworkError> {
        let body =
            encode(message).map_err(|e| NetworkError(format!("encode failed: {e}")))?;
        Ok(ConsensusPayload { tablet_id: self.tablet_id.clone(), body })
    }

    fn unreachable<E: std::error::Error + 'static>(&self, e: E) -> Unreachable {
        self.pool.evict(&self.target);
        Unreachable::new(&e)
    }
}

impl RaftNetwork<CatalogTypeConfig> for GrpcRaftNetworkConnection {
    async fn vote(
        &mut self,
        rpc: VoteRequest<PeerUuid>,
        _option: RPCOption,
    ) -> Result<VoteResponse<PeerUuid>, RPCError<PeerUuid, BasicNode, RaftError<PeerUuid>>> {
        let mut client = self
            .pool
            .get_client(self.target, &self.node)
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        let request = self.payload(&rpc).map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;
        let response = client
            .vote(request)
            .await
            .map_err(|e| RPCError::Unreachable(self.unreachable(e)))?
            .into_inner();

        decode(&response.body).map_err(|e| {
            RPCError::Unreachable(Unreachable::new(&NetworkError(format!(
                "decode vote response failed: {e}"
            ))))
        })
    }

    async fn append_entries(
        &mut self,
        rpc: AppendEntriesRequest<CatalogTypeConfig>,
        _option: RPCOption,
    ) -> Result<
        AppendEntriesResponse<PeerUuid>,
        RPCError<PeerUuid, BasicNode, RaftError<PeerUuid>>,
    > {
        let mut client = self
            .pool
            .get_client(self.target, &self.node)
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        let request = self.payload(&rpc).map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;
        let response = client
            .append_entries(request)
            .await
            .map_err(|e| RPCError::Unreachable(self.unreachable(e)))?
            .into_inner();

        decode(&response.body).map_err(|e| {
            RPCError::Unreachable(Unreachable::new(&NetworkError(format!(
                "decode append-entries response failed: {e}"
            ))))
        })
    }

    async fn install_snapshot(
        &mut self,
        rpc: InstallSnapshotRequest<CatalogTypeConfig>,
        _option: RPCOption,
    ) -> Result<
        InstallSnapshotResponse<PeerUuid>,
        RPCError<
            PeerUuid,
            BasicNode,
            RaftError<PeerUuid, openraft::error::InstallSnapshotError>,
        >,
    > {
        let mut client = self
            .pool
            .get_client(self.target, &self.node)
            .await
            .map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;

        let request = self.payload(&rpc).map_err(|e| RPCError::Unreachable(Unreachable::new(&e)))?;
        let response = client
            .install_snapshot(request)
            .await
            .map_err(|e| RPCError::Unreachable(self.unreachable(e)))?
            .into_inner();

        decode(&response.body).map_err(|e| {
            RPCError::Unreachable(Unreachable::new(&NetworkError(format!(
                "decode install-snapshot response failed: {e}"
            ))))
        })
    }

    async fn full_snapshot(
        &mut self,
        vote: Vote<PeerUuid>,
        snapshot: Snapshot<CatalogTypeConfig>,
        cancel: impl Future<Output = ReplicationClosed> + Send + 'static,
        option: RPCOption,
    ) -> Result<SnapshotResponse<PeerUuid>, StreamingError<CatalogTypeConfig, Fatal<PeerUuid>>>
    {
        // Chunked transfer over the unary install-snapshot RPC.
        use openraft::network::snapshot_transport::{Chunked, SnapshotTransport};

        Chunked::send_snapshot(self, vote, snapshot, cancel, option).await
    }
}
