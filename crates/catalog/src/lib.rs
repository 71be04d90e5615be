//! The master system catalog.
//!
//! A single, strongly consistent, replicated table recording the
//! authoritative set of user tables and their tablets. The catalog is hosted
//! as one special tablet with a fixed id, replicated across the cluster's
//! masters by a raft quorum; exactly one master leads it at a time and the
//! surrounding master learns about leadership through an injected callback.
//!
//! Entry points:
//! - [`SysCatalog::create_new`] for first-ever boot,
//!   [`SysCatalog::load`] for every restart
//! - [`SysCatalog::write`] for leader-gated, replicated mutation
//! - [`SysCatalog::visit_tables`] / [`SysCatalog::visit_tablets`] for
//!   enumeration

#![deny(unsafe_code)]

pub mod codec;
pub mod fault;
mod metrics;
pub mod schema;
mod sys_catalog;

pub use codec::{decode_table_row, decode_tablet_row};
pub use fault::{fail_during_write, set_fail_during_write, INJECTED_FAILURE_MSG};
pub use schema::{
    catalog_key_schema, catalog_schema, CATALOG_COL_ID, CATALOG_COL_METADATA, CATALOG_COL_TYPE,
    CATALOG_TABLE_ID, CATALOG_TABLE_NAME,
};
pub use sys_catalog::{
    Actions, ElectedLeaderCallback, SysCatalog, SysCatalogContext, TableMutation, TabletMutation,
};
