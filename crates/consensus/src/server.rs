//! The per-master peer RPC server.
//!
//! Serves the inter-master peer service for one master: identity discovery
//! plus raft transport for every registered tablet. The server is owned by
//! the surrounding master, not by the catalog; it is started before the
//! catalog is created so peers can resolve this master's UUID, and raft RPCs
//! for tablets that have not been set up yet are answered with
//! `unavailable`.

use std::net::SocketAddr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::{Request, Response, Status};

use strata_types::{decode, encode, Error, Result};

use crate::discovery::NodeIdentity;
use crate::registry::RaftRegistry;
use crate::rpc::peer_service_server::{PeerService, PeerServiceServer};
use crate::rpc::{ConsensusPayload, GetNodeInstanceRequest, GetNodeInstanceResponse};
use crate::type_config::CatalogTypeConfig;

/// Handler behind the peer service: answers discovery from the master's
/// identity and dispatches raft RPCs through the registry.
pub struct PeerServiceHandler {
    identity: NodeIdentity,
    registry: Arc<RaftRegistry>,
}

impl PeerServiceHandler {
    /// Creates a handler for this master.
    pub fn new(identity: NodeIdentity, registry: Arc<RaftRegistry>) -> Self {
        Self { identity, registry }
    }

    fn raft_for(
        &self,
        tablet_id: &str,
    ) -> std::result::Result<openraft::Raft<CatalogTypeConfig>, Status> {
        self.registry.get(tablet_id).ok_or_else(|| {
            Status::unavailable(format!("no raft instance registered for tablet {tablet_id}"))
        })
    }
}

fn decode_body<T: DeserializeOwned>(payload: &ConsensusPayload) -> std::result::Result<T, Status> {
    decode(&payload.body)
        .map_err(|e| Status::invalid_argument(format!("malformed raft payload: {e}")))
}

fn encode_body<T: Serialize>(
    tablet_id: String,
    value: &T,
) -> std::result::Result<Response<ConsensusPayload>, Status> {
    let body =
        encode(value).map_err(|e| Status::internal(format!("encode response failed: {e}")))?;
    Ok(Response::new(ConsensusPayload { tablet_id, body }))
}

#[tonic::async_trait]
impl PeerService for PeerServiceHandler {
    async fn get_node_instance(
        &self,
        _request: Request<GetNodeInstanceRequest>,
    ) -> std::result::Result<Response<GetNodeInstanceResponse>, Status> {
        Ok(Response::new(GetNodeInstanceResponse {
            permanent_uuid: self.identity.permanent_uuid.to_string(),
            rpc_addr: self.identity.rpc_addr.to_string(),
        }))
    }

    async fn vote(
        &self,
        request: Request<ConsensusPayload>,
    ) -> std::result::Result<Response<ConsensusPayload>, Status> {
        let payload = request.into_inner();
        let raft = self.raft_for(&payload.tablet_id)?;
        let vote_request = decode_body(&payload)?;

        let response = raft
            .vote(vote_request)
            .await
            .map_err(|e| Status::internal(format!("vote failed: {e}")))?;
        encode_body(payload.tablet_id, &response)
    }

    async fn append_entries(
        &self,
        request: Request<ConsensusPayload>,
    ) -> std::result::Result<Response<ConsensusPayload>, Status> {
        let payload = request.into_inner();
        let raft = self.raft_for(&payload.tablet_id)?;
        let append_request = decode_body(&payload)?;

        let response = raft
            .append_entries(append_request)
            .await
            .map_err(|e| Status::internal(format!("append-entries failed: {e}")))?;
        encode_body(payload.tablet_id, &response)
    }

    async fn install_snapshot(
        &self,
        request: Request<ConsensusPayload>,
    ) -> std::result::Result<Response<ConsensusPayload>, Status> {
        let payload = request.into_inner();
        let raft = self.raft_for(&payload.tablet_id)?;
        let snapshot_request = decode_body(&payload)?;

        let response = raft
            .install_snapshot(snapshot_request)
            .await
            .map_err(|e| Status::internal(format!("install-snapshot failed: {e}")))?;
        encode_body(payload.tablet_id, &response)
    }
}

/// A bound, not-yet-serving peer RPC server.
///
/// Binding and serving are split so the caller can learn the bound port
/// (ephemeral binds) before constructing the identity it advertises.
pub struct PeerServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    registry: Arc<RaftRegistry>,
    shutdown_rx: watch::Receiver<bool>,
}

impl PeerServer {
    /// Binds the server to `bind_addr` (use port 0 for an ephemeral port).
    pub async fn bind(
        bind_addr: SocketAddr,
        registry: Arc<RaftRegistry>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> Result<Self> {
        let listener = TcpListener::bind(bind_addr).await.map_err(|source| Error::Io {
            message: format!("unable to bind peer server to {bind_addr}"),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| Error::Io {
            message: "unable to read bound address".to_string(),
            source,
        })?;
        Ok(Self { listener, local_addr, registry, shutdown_rx })
    }

    /// The address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serves as `identity` until the shutdown signal flips to `true`.
    pub async fn serve(self, identity: NodeIdentity) -> Result<()> {
        let mut shutdown_rx = self.shutdown_rx;
        let local_addr = self.local_addr;
        let handler = PeerServiceHandler::new(identity, self.registry);
        tracing::info!(addr = %local_addr, "peer server serving");

        tonic::transport::Server::builder()
            .add_service(PeerServiceServer::new(handler))
            .serve_with_incoming_shutdown(TcpListenerStream::new(self.listener), async move {
                while !*shutdown_rx.borrow() {
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                tracing::info!(addr = %local_addr, "peer server shutting down");
            })
            .await
            .map_err(|e| Error::runtime_error(format!("peer server failed: {e}")))
    }
}
