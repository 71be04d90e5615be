//! Catalog entry types and identifiers.
//!
//! The catalog tablet holds one row per entry. The entry type is the leading
//! component of the compound key so a scan restricted to one type is a prefix
//! scan rather than a full-table filter.

use serde::{Deserialize, Serialize};

/// The fixed, well-known id of the catalog tablet: 32 ASCII zeros.
pub const CATALOG_TABLET_ID: &str = "00000000000000000000000000000000";

/// Identifier of a user table.
pub type TableId = String;

/// Identifier of a tablet.
pub type TabletId = String;

/// The kind of a catalog entry.
///
/// Stored as the `entry_type` key column (8-bit signed integer). The zero
/// value is reserved so an uninitialized cell is never a valid entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum CatalogEntryType {
    /// A user table; `entry_id` is the table id.
    Table = 1,
    /// A tablet; `entry_id` is the tablet id. The owning table id is stored
    /// inside the metadata record.
    Tablet = 2,
}

impl CatalogEntryType {
    /// The on-disk key value for this entry type.
    pub fn as_i8(self) -> i8 {
        self as i8
    }

    /// Parses an on-disk key value.
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            1 => Some(CatalogEntryType::Table),
            2 => Some(CatalogEntryType::Tablet),
            _ => None,
        }
    }
}
