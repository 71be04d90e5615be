//! Registry of running raft instances, keyed by tablet id.
//!
//! The peer RPC server is started before any tablet is set up, so incoming
//! raft RPCs are dispatched through this registry: a tablet peer registers
//! its raft handle when it starts and unregisters at shutdown. RPCs for an
//! unregistered tablet are answered with `unavailable`.

use std::collections::HashMap;

use openraft::Raft;
use parking_lot::RwLock;

use strata_types::TabletId;

use crate::type_config::CatalogTypeConfig;

/// Maps tablet ids to their running raft instances.
#[derive(Default)]
pub struct RaftRegistry {
    rafts: RwLock<HashMap<TabletId, Raft<CatalogTypeConfig>>>,
}

impl RaftRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the raft instance serving `tablet_id`.
    pub fn register(&self, tablet_id: impl Into<TabletId>, raft: Raft<CatalogTypeConfig>) {
        let tablet_id = tablet_id.into();
        tracing::info!(tablet_id = %tablet_id, "registered raft instance");
        self.rafts.write().insert(tablet_id, raft);
    }

    /// Removes the raft instance serving `tablet_id`.
    pub fn unregister(&self, tablet_id: &str) {
        if self.rafts.write().remove(tablet_id).is_some() {
            tracing::info!(tablet_id = %tablet_id, "unregistered raft instance");
        }
    }

    /// The raft instance serving `tablet_id`, if registered.
    pub fn get(&self, tablet_id: &str) -> Option<Raft<CatalogTypeConfig>> {
        self.rafts.read().get(tablet_id).cloned()
    }
}
