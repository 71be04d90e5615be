//! Consensus layer for the catalog tablet.
//!
//! This crate provides:
//! - consensus metadata persistence ([`meta`])
//! - quorum construction and verification ([`quorum`])
//! - peer UUID discovery over the inter-master RPC service ([`discovery`])
//! - the OpenRaft type configuration and redb log store ([`type_config`],
//!   [`log_store`])
//! - the gRPC transport for raft RPCs ([`rpc`], [`network`])
//! - the tablet peer lifecycle ([`peer`]) and the per-master RPC server
//!   ([`server`])
//!
//! OpenRaft 0.9 has sealed v2 storage traits; like the rest of the stack we
//! use the deprecated but non-sealed `RaftStorage` trait through
//! `openraft::storage::Adaptor`.

#![deny(unsafe_code)]
// gRPC handlers return tonic::Status by value - standard for tonic services
#![allow(clippy::result_large_err)]

pub mod discovery;
pub mod log_store;
pub mod meta;
pub mod network;
pub mod peer;
pub mod quorum;
pub mod registry;
pub mod rpc;
pub mod server;
pub mod type_config;

pub use discovery::{set_permanent_uuid_for_peer, NodeIdentity, PeerResolver, RpcPeerResolver};
pub use log_store::{AppliedMarker, CatalogLogStore};
pub use meta::ConsensusMetadata;
pub use network::GrpcRaftNetworkFactory;
pub use peer::{
    bootstrap_tablet, ConsensusBootstrapInfo, StateChangeCallback, TabletPeer, TabletPeerState,
};
pub use quorum::{
    consensus_role, create_distributed_config, verify_loaded_config, verify_raft_config,
};
pub use registry::RaftRegistry;
pub use server::PeerServer;
pub use type_config::CatalogTypeConfig;
