//! OpenRaft type configuration for the catalog tablet.
//!
//! Node ids are the peers' permanent UUIDs, so consensus identity and
//! catalog identity are the same value. Application data is the tablet write
//! request; the response is the per-row outcome the write path hands back to
//! the caller.

use std::io::Cursor;

use openraft::impls::OneshotResponder;
use openraft::BasicNode;

use strata_tablet::{WriteRequest, WriteResponse};
use strata_types::PeerUuid;

openraft::declare_raft_types!(
    /// Catalog tablet raft type configuration.
    pub CatalogTypeConfig:
        D = WriteRequest,
        R = WriteResponse,
        NodeId = PeerUuid,
        Node = BasicNode,
        Entry = openraft::Entry<CatalogTypeConfig>,
        SnapshotData = Cursor<Vec<u8>>,
        AsyncRuntime = openraft::TokioRuntime,
        Responder = OneshotResponder<CatalogTypeConfig>
);
