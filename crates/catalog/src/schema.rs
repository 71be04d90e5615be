//! The fixed catalog schema.
//!
//! One row per catalog entry:
//!
//! ```text
//! (entry_type, entry_id) -> metadata
//! ```
//!
//! `entry_type` says whether the row is a table or a tablet. It leads the
//! compound key so a scan restricted to one entry type is a key-prefix scan.
//! `entry_id` is a table id or tablet id; for tablet entries the owning
//! table id lives inside the metadata record itself.
//!
//! The schema never changes. A different schema on disk is corruption, not
//! a migration opportunity.

use strata_types::{DataType, Schema};

/// Name of the `entry_type` key column.
pub const CATALOG_COL_TYPE: &str = "entry_type";

/// Name of the `entry_id` key column.
pub const CATALOG_COL_ID: &str = "entry_id";

/// Name of the `metadata` value column.
pub const CATALOG_COL_METADATA: &str = "metadata";

/// The catalog's own table name.
pub const CATALOG_TABLE_NAME: &str = "sys.catalog";

/// The catalog's own table id.
pub const CATALOG_TABLE_ID: &str = "sys.catalog";

/// Builds the canonical catalog schema.
pub fn catalog_schema() -> Schema {
    Schema::builder()
        .add_key_column(CATALOG_COL_TYPE, DataType::Int8)
        .and_then(|b| b.add_key_column(CATALOG_COL_ID, DataType::String))
        .and_then(|b| b.add_column(CATALOG_COL_METADATA, DataType::String))
        .and_then(|b| b.build())
        .expect("catalog schema definition is statically valid")
}

/// The key-only projection of the catalog schema.
pub fn catalog_key_schema() -> Schema {
    catalog_schema().key_projection()
}
