//! Peer UUID discovery.
//!
//! A distributed catalog is configured with peer addresses only; the stable
//! identity of each peer is its permanent UUID, obtained by asking the peer
//! itself. The resolver seam keeps the catalog core independent of the RPC
//! stack; the production implementation speaks the inter-master peer
//! service.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use tonic::transport::Channel;
use uuid::Uuid;

use strata_types::{Error, HostPort, PeerUuid, RaftPeer, Result, ResultExt};

use crate::rpc::peer_service_client::PeerServiceClient;
use crate::rpc::GetNodeInstanceRequest;

/// This master's identity as advertised to its peers.
#[derive(Debug, Clone)]
pub struct NodeIdentity {
    /// The master's permanent UUID (from its filesystem instance).
    pub permanent_uuid: PeerUuid,
    /// The RPC address the master advertises.
    pub rpc_addr: HostPort,
}

/// Resolves a peer's permanent UUID from its network address.
#[async_trait]
pub trait PeerResolver: Send + Sync {
    /// Asks the peer at `addr` for its permanent UUID.
    async fn resolve_peer_uuid(&self, addr: &HostPort) -> Result<PeerUuid>;
}

/// Fills in a peer's missing permanent UUID by RPC to its address.
pub async fn set_permanent_uuid_for_peer(
    resolver: &dyn PeerResolver,
    peer: &mut RaftPeer,
) -> Result<()> {
    let addr = peer.last_known_addr.clone().ok_or_else(|| {
        Error::invalid_argument(format!("peer {} has no address to resolve", peer.describe()))
    })?;
    let uuid = resolver
        .resolve_peer_uuid(&addr)
        .await
        .prepend(format!("Unable to resolve UUID for peer {addr}"))?;
    peer.permanent_uuid = Some(uuid);
    Ok(())
}

/// [`PeerResolver`] that calls `GetNodeInstance` on the peer service.
///
/// Connections are created on demand and cached per address.
#[derive(Default)]
pub struct RpcPeerResolver {
    clients: RwLock<HashMap<HostPort, PeerServiceClient<Channel>>>,
}

impl RpcPeerResolver {
    /// Creates a resolver with an empty connection cache.
    pub fn new() -> Self {
        Self::default()
    }

    async fn client(&self, addr: &HostPort) -> Result<PeerServiceClient<Channel>> {
        if let Some(client) = self.clients.read().get(addr).cloned() {
            return Ok(client);
        }
        let client = PeerServiceClient::connect(format!("http://{addr}"))
            .await
            .map_err(|e| Error::service_unavailable(format!("connection to {addr} failed: {e}")))?;
        self.clients.write().insert(addr.clone(), client.clone());
        Ok(client)
    }
}

#[async_trait]
impl PeerResolver for RpcPeerResolver {
    async fn resolve_peer_uuid(&self, addr: &HostPort) -> Result<PeerUuid> {
        let mut client = self.client(addr).await?;
        let response = client
            .get_node_instance(GetNodeInstanceRequest {})
            .await
            .map_err(|e| {
                Error::service_unavailable(format!("GetNodeInstance to {addr} failed: {e}"))
            })?
            .into_inner();

        let uuid = Uuid::parse_str(&response.permanent_uuid).map_err(|e| {
            Error::corruption(format!(
                "peer {addr} reported malformed UUID {:?}: {e}",
                response.permanent_uuid
            ))
        })?;
        tracing::info!(peer = %addr, uuid = %uuid, "resolved peer UUID");
        Ok(uuid)
    }
}
