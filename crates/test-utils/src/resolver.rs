//! Table-driven peer UUID resolution for tests.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use strata_consensus::PeerResolver;
use strata_types::{Error, HostPort, PeerUuid, Result};

/// A [`PeerResolver`] answering from a fixed table.
///
/// Unknown addresses fail with `ServiceUnavailable`, which exercises the
/// same propagation path a dead peer would.
#[derive(Default)]
pub struct StaticPeerResolver {
    peers: RwLock<HashMap<HostPort, PeerUuid>>,
}

impl StaticPeerResolver {
    /// Creates an empty resolver.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the UUID served for `addr`.
    pub fn insert(&self, addr: HostPort, uuid: PeerUuid) {
        self.peers.write().insert(addr, uuid);
    }
}

#[async_trait]
impl PeerResolver for StaticPeerResolver {
    async fn resolve_peer_uuid(&self, addr: &HostPort) -> Result<PeerUuid> {
        self.peers
            .read()
            .get(addr)
            .copied()
            .ok_or_else(|| Error::service_unavailable(format!("no peer at {addr}")))
    }
}
