//! Row codec: catalog records to and from row operations.
//!
//! Table and tablet records are serialized to JSON in the `metadata` column.
//! Encoding builds insert/update/delete row operations against the canonical
//! schema (deletes carry key cells only). Decoding parses the metadata blob
//! back, tagging corruption errors with the offending id; tablet rows
//! additionally upgrade the deprecated partition-bound fields before the
//! record is handed to a visitor.

use strata_tablet::{CatalogRow, PartialRow, RowOperationKind, WriteRequest};
use strata_types::{
    CatalogEntryType, Error, Result, Schema, TableId, TableRecord, TabletId, TabletRecord,
};

use crate::schema::{CATALOG_COL_ID, CATALOG_COL_METADATA, CATALOG_COL_TYPE};

fn serialize_record<T: serde::Serialize>(kind: &str, id: &str, record: &T) -> Result<String> {
    serde_json::to_string(record).map_err(|e| {
        Error::corruption(format!("Unable to serialize metadata for {kind} {id}: {e}"))
    })
}

fn key_row(schema: &Schema, entry_type: CatalogEntryType, entry_id: &str) -> Result<PartialRow> {
    let mut row = PartialRow::new(schema);
    row.set_int8(CATALOG_COL_TYPE, entry_type.as_i8())?;
    row.set_string(CATALOG_COL_ID, entry_id)?;
    Ok(row)
}

fn full_row(
    schema: &Schema,
    entry_type: CatalogEntryType,
    entry_id: &str,
    metadata: String,
) -> Result<PartialRow> {
    let mut row = key_row(schema, entry_type, entry_id)?;
    row.set_string(CATALOG_COL_METADATA, metadata)?;
    Ok(row)
}

/// Appends an insert of a table record.
pub fn req_add_table(req: &mut WriteRequest, table_id: &TableId, record: &TableRecord) -> Result<()> {
    let metadata = serialize_record("table", table_id, record)?;
    let row = full_row(&req.schema, CatalogEntryType::Table, table_id, metadata)?;
    req.add(RowOperationKind::Insert, row);
    Ok(())
}

/// Appends an update of a table record.
pub fn req_update_table(
    req: &mut WriteRequest,
    table_id: &TableId,
    record: &TableRecord,
) -> Result<()> {
    let metadata = serialize_record("table", table_id, record)?;
    let row = full_row(&req.schema, CatalogEntryType::Table, table_id, metadata)?;
    req.add(RowOperationKind::Update, row);
    Ok(())
}

/// Appends a delete of a table row. Key cells only.
pub fn req_delete_table(req: &mut WriteRequest, table_id: &TableId) -> Result<()> {
    let row = key_row(&req.schema, CatalogEntryType::Table, table_id)?;
    req.add(RowOperationKind::Delete, row);
    Ok(())
}

/// Appends inserts of tablet records.
pub fn req_add_tablets(
    req: &mut WriteRequest,
    tablets: &[(TabletId, TabletRecord)],
) -> Result<()> {
    for (tablet_id, record) in tablets {
        let metadata = serialize_record("tablet", tablet_id, record)?;
        let row = full_row(&req.schema, CatalogEntryType::Tablet, tablet_id, metadata)?;
        req.add(RowOperationKind::Insert, row);
    }
    Ok(())
}

/// Appends updates of tablet records.
pub fn req_update_tablets(
    req: &mut WriteRequest,
    tablets: &[(TabletId, TabletRecord)],
) -> Result<()> {
    for (tablet_id, record) in tablets {
        let metadata = serialize_record("tablet", tablet_id, record)?;
        let row = full_row(&req.schema, CatalogEntryType::Tablet, tablet_id, metadata)?;
        req.add(RowOperationKind::Update, row);
    }
    Ok(())
}

/// Appends deletes of tablet rows. Key cells only.
pub fn req_delete_tablets(req: &mut WriteRequest, tablet_ids: &[TabletId]) -> Result<()> {
    for tablet_id in tablet_ids {
        let row = key_row(&req.schema, CatalogEntryType::Tablet, tablet_id)?;
        req.add(RowOperationKind::Delete, row);
    }
    Ok(())
}

/// Decodes a table row's metadata record.
pub fn decode_table_row(row: &CatalogRow) -> Result<TableRecord> {
    serde_json::from_str(&row.metadata).map_err(|e| {
        Error::corruption(format!(
            "Unable to parse metadata field for table {}: {e}",
            row.entry_id
        ))
    })
}

/// Decodes a tablet row's metadata record.
///
/// Upgrades the deprecated start/end-key fields to the `partition` record
/// and clears them before handing the record back.
pub fn decode_tablet_row(row: &CatalogRow) -> Result<TabletRecord> {
    let mut record: TabletRecord = serde_json::from_str(&row.metadata).map_err(|e| {
        Error::corruption(format!(
            "Unable to parse metadata field for tablet {}: {e}",
            row.entry_id
        ))
    })?;
    record.upgrade_deprecated_partition();
    Ok(record)
}
