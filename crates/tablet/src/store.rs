//! The redb-backed catalog row store.
//!
//! The store is the state machine side of the catalog tablet: committed
//! write requests are applied here, in commit order, by the consensus layer.
//! Rows live in one ordered table keyed by `(entry_type, entry_id)`; a small
//! metadata table tracks the opaque applied marker the consensus layer uses
//! to resume after a restart.
//!
//! Apply semantics: each row operation in a batch succeeds or fails
//! independently. Failed rows are reported through per-row errors; rows that
//! succeeded are NOT rolled back, and the batch (including the applied
//! marker) commits in a single transaction either way.

use std::path::Path;

use parking_lot::RwLock;
use redb::{Database, ReadableTable, TableDefinition};

use strata_types::{CatalogEntryType, Result, Schema, TabletId};

use crate::iterator::{
    storage_error, CatalogRow, ColumnPredicate, RowIter, ScanSpec, DEFAULT_ROW_BLOCK_SIZE,
};
use crate::row::{
    PerRowError, RowOperation, RowOperationKind, Value, WriteError, WriteErrorCode, WriteRequest,
    WriteResponse,
};

/// Table of catalog rows: `(entry_type, entry_id) -> metadata`.
const ROWS_TABLE: TableDefinition<(i8, &str), &str> = TableDefinition::new("catalog_rows");

/// Table of store-level metadata.
const STATE_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("tablet_state");

/// Key of the opaque applied marker inside [`STATE_TABLE`].
const KEY_APPLIED_MARKER: &str = "applied_marker";

/// The catalog tablet's row store.
pub struct TabletStore {
    db: RwLock<Database>,
    tablet_id: TabletId,
    schema: Schema,
    applied_cache: RwLock<Option<Vec<u8>>>,
}

impl TabletStore {
    /// Opens (creating if necessary) the row store at `path`.
    ///
    /// `tablet_id` and `schema` pin the identity and layout every incoming
    /// write request is checked against.
    pub fn open(path: impl AsRef<Path>, tablet_id: impl Into<TabletId>, schema: Schema) -> Result<Self> {
        let db = Database::create(path.as_ref()).map_err(|e| storage_error(&e))?;

        let write_txn = db.begin_write().map_err(|e| storage_error(&e))?;
        {
            let _rows = write_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
            let _state = write_txn.open_table(STATE_TABLE).map_err(|e| storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| storage_error(&e))?;

        let store = Self {
            db: RwLock::new(db),
            tablet_id: tablet_id.into(),
            schema,
            applied_cache: RwLock::new(None),
        };
        store.load_applied_cache()?;
        Ok(store)
    }

    fn load_applied_cache(&self) -> Result<()> {
        let db = self.db.read();
        let read_txn = db.begin_read().map_err(|e| storage_error(&e))?;
        let state = read_txn.open_table(STATE_TABLE).map_err(|e| storage_error(&e))?;
        if let Some(marker) = state.get(KEY_APPLIED_MARKER).map_err(|e| storage_error(&e))? {
            *self.applied_cache.write() = Some(marker.value().to_vec());
        }
        Ok(())
    }

    /// The tablet this store belongs to.
    pub fn tablet_id(&self) -> &str {
        &self.tablet_id
    }

    /// The schema writes are validated against.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The opaque applied marker persisted by the last apply, if any.
    pub fn applied_marker(&self) -> Option<Vec<u8>> {
        self.applied_cache.read().clone()
    }

    /// Applies a committed write request and advances the applied marker in
    /// the same transaction.
    pub fn apply_write(&self, marker: &[u8], req: &WriteRequest) -> Result<WriteResponse> {
        if req.tablet_id != self.tablet_id {
            // The batch is rejected wholesale, but the marker still advances:
            // this entry is consumed.
            self.set_applied_marker(marker)?;
            return Ok(WriteResponse {
                error: Some(WriteError {
                    code: WriteErrorCode::WrongTablet,
                    message: format!(
                        "request for tablet {} sent to tablet {}",
                        req.tablet_id, self.tablet_id
                    ),
                }),
                per_row_errors: Vec::new(),
            });
        }
        if req.schema != self.schema {
            self.set_applied_marker(marker)?;
            return Ok(WriteResponse {
                error: Some(WriteError {
                    code: WriteErrorCode::MismatchedSchema,
                    message: "request schema does not match tablet schema".to_string(),
                }),
                per_row_errors: Vec::new(),
            });
        }

        let mut per_row_errors = Vec::new();
        let db = self.db.read();
        let write_txn = db.begin_write().map_err(|e| storage_error(&e))?;
        {
            let mut rows = write_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
            for (row_index, op) in req.operations.iter().enumerate() {
                if let Err(message) = apply_row_op(&mut rows, op) {
                    per_row_errors.push(PerRowError { row_index, message });
                }
            }

            let mut state = write_txn.open_table(STATE_TABLE).map_err(|e| storage_error(&e))?;
            state.insert(KEY_APPLIED_MARKER, marker).map_err(|e| storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| storage_error(&e))?;
        *self.applied_cache.write() = Some(marker.to_vec());

        Ok(WriteResponse { error: None, per_row_errors })
    }

    /// Advances the applied marker without touching any rows (blank and
    /// membership log entries).
    pub fn set_applied_marker(&self, marker: &[u8]) -> Result<()> {
        let db = self.db.read();
        let write_txn = db.begin_write().map_err(|e| storage_error(&e))?;
        {
            let mut state = write_txn.open_table(STATE_TABLE).map_err(|e| storage_error(&e))?;
            state.insert(KEY_APPLIED_MARKER, marker).map_err(|e| storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| storage_error(&e))?;
        *self.applied_cache.write() = Some(marker.to_vec());
        Ok(())
    }

    /// Reads one row's metadata cell.
    pub fn get(&self, entry_type: i8, entry_id: &str) -> Result<Option<String>> {
        let db = self.db.read();
        let read_txn = db.begin_read().map_err(|e| storage_error(&e))?;
        let rows = read_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
        let value = rows.get((entry_type, entry_id)).map_err(|e| storage_error(&e))?;
        Ok(value.map(|v| v.value().to_string()))
    }

    /// Number of rows in the store.
    pub fn row_count(&self) -> Result<u64> {
        let db = self.db.read();
        let read_txn = db.begin_read().map_err(|e| storage_error(&e))?;
        let rows = read_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
        let mut count = 0u64;
        for item in rows.iter().map_err(|e| storage_error(&e))? {
            item.map_err(|e| storage_error(&e))?;
            count += 1;
        }
        Ok(count)
    }

    /// Opens a block-based row iterator over a consistent snapshot.
    pub fn new_row_iterator(&self, spec: ScanSpec) -> Result<RowIter> {
        for predicate in spec.predicates() {
            let ColumnPredicate::Equality { column, .. } = predicate;
            if self.schema.find_column(column).is_none() {
                return Err(strata_types::Error::invalid_argument(format!(
                    "scan predicate names unknown column {column:?}"
                )));
            }
        }
        let db = self.db.read();
        let read_txn = db.begin_read().map_err(|e| storage_error(&e))?;
        let table = read_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
        Ok(RowIter::new(table, spec, DEFAULT_ROW_BLOCK_SIZE))
    }

    /// Materializes every row, in key order. Used for snapshot transfer.
    pub fn export_rows(&self) -> Result<Vec<CatalogRow>> {
        let db = self.db.read();
        let read_txn = db.begin_read().map_err(|e| storage_error(&e))?;
        let rows = read_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
        let mut out = Vec::new();
        for item in rows.iter().map_err(|e| storage_error(&e))? {
            let (key, value) = item.map_err(|e| storage_error(&e))?;
            let (entry_type, entry_id) = key.value();
            out.push(CatalogRow {
                entry_type,
                entry_id: entry_id.to_string(),
                metadata: value.value().to_string(),
            });
        }
        Ok(out)
    }

    /// Replaces the entire row set and applied marker. Used for snapshot
    /// installation.
    pub fn restore(&self, marker: &[u8], new_rows: &[CatalogRow]) -> Result<()> {
        let db = self.db.read();
        let write_txn = db.begin_write().map_err(|e| storage_error(&e))?;
        {
            // redb has no truncate; dropping and reopening the table clears it.
            write_txn.delete_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
            let mut rows = write_txn.open_table(ROWS_TABLE).map_err(|e| storage_error(&e))?;
            for row in new_rows {
                rows.insert((row.entry_type, row.entry_id.as_str()), row.metadata.as_str())
                    .map_err(|e| storage_error(&e))?;
            }
            let mut state = write_txn.open_table(STATE_TABLE).map_err(|e| storage_error(&e))?;
            state.insert(KEY_APPLIED_MARKER, marker).map_err(|e| storage_error(&e))?;
        }
        write_txn.commit().map_err(|e| storage_error(&e))?;
        *self.applied_cache.write() = Some(marker.to_vec());
        tracing::info!(tablet_id = %self.tablet_id, rows = new_rows.len(), "restored row store from snapshot");
        Ok(())
    }

    /// Compacts the underlying database file. Returns true if anything was
    /// reclaimed.
    pub fn compact(&self) -> Result<bool> {
        let mut db = self.db.write();
        db.compact().map_err(|e| storage_error(&e))
    }
}

/// Applies one row operation; an `Err` is the per-row error message.
fn apply_row_op(
    rows: &mut redb::Table<'_, (i8, &str), &str>,
    op: &RowOperation,
) -> std::result::Result<(), String> {
    let entry_type = match op.cells.first() {
        Some(Some(Value::Int8(t))) => *t,
        _ => return Err("entry_type key cell missing or mistyped".to_string()),
    };
    if CatalogEntryType::from_i8(entry_type).is_none() {
        return Err(format!("unknown entry type {entry_type}"));
    }
    let entry_id = match op.cells.get(1) {
        Some(Some(Value::String(id))) => id.as_str(),
        _ => return Err("entry_id key cell missing or mistyped".to_string()),
    };
    if entry_id.is_empty() {
        return Err("empty entry id".to_string());
    }

    let key = (entry_type, entry_id);
    match op.kind {
        RowOperationKind::Insert => {
            let metadata = require_metadata(op)?;
            let existing = rows.get(key).map_err(|e| e.to_string())?.is_some();
            if existing {
                return Err(format!("key already present: ({entry_type}, {entry_id})"));
            }
            rows.insert(key, metadata).map_err(|e| e.to_string())?;
            Ok(())
        }
        RowOperationKind::Update => {
            let metadata = require_metadata(op)?;
            let existing = rows.get(key).map_err(|e| e.to_string())?.is_some();
            if !existing {
                return Err(format!("key not found: ({entry_type}, {entry_id})"));
            }
            rows.insert(key, metadata).map_err(|e| e.to_string())?;
            Ok(())
        }
        RowOperationKind::Delete => {
            let removed = rows.remove(key).map_err(|e| e.to_string())?.is_some();
            if !removed {
                return Err(format!("key not found: ({entry_type}, {entry_id})"));
            }
            Ok(())
        }
    }
}

fn require_metadata(op: &RowOperation) -> std::result::Result<&str, String> {
    match op.cells.get(2) {
        Some(Some(Value::String(metadata))) => Ok(metadata.as_str()),
        _ => Err("metadata cell missing or mistyped".to_string()),
    }
}
