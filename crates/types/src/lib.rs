//! Shared types for the strata master system catalog.
//!
//! This crate holds the vocabulary used across the catalog workspace:
//! - the unified status-style error type ([`Error`])
//! - serialization helpers ([`codec`])
//! - catalog entry types and identifiers ([`entry`])
//! - table and tablet metadata records ([`records`])
//! - the column schema model ([`schema`])
//! - quorum and peer configuration types ([`quorum`])
//! - network addresses and master startup options

#![deny(unsafe_code)]

pub mod codec;
pub mod entry;
pub mod error;
pub mod host_port;
pub mod options;
pub mod quorum;
pub mod records;
pub mod schema;

pub use codec::{decode, encode};
pub use entry::{CatalogEntryType, TableId, TabletId, CATALOG_TABLET_ID};
pub use error::{Error, Result, ResultExt};
pub use host_port::HostPort;
pub use options::MasterOptions;
pub use quorum::{
    ConsensusState, MemberType, PeerUuid, RaftConfig, RaftPeer, RaftRole, MINIMUM_TERM,
    OPID_INDEX_UNKNOWN,
};
pub use records::{PartitionBounds, TableRecord, TableState, TabletRecord, TabletState};
pub use schema::{ColumnSchema, DataType, Schema, SchemaBuilder};
