//! Partial rows, row operations, and the write request/response types.
//!
//! A write against the catalog tablet is a batch of row operations encoded
//! against the canonical schema. The request travels through consensus as
//! application data; the response carries either a request-level error or a
//! list of per-row errors with the affected row indexes.

use serde::{Deserialize, Serialize};

use strata_types::{DataType, Error, Result, Schema, TabletId};

/// A typed cell value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// 8-bit signed integer.
    Int8(i8),
    /// 64-bit signed integer.
    Int64(i64),
    /// UTF-8 string.
    String(String),
    /// Raw bytes.
    Binary(Vec<u8>),
}

impl Value {
    /// The data type of this value.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Int8(_) => DataType::Int8,
            Value::Int64(_) => DataType::Int64,
            Value::String(_) => DataType::String,
            Value::Binary(_) => DataType::Binary,
        }
    }
}

/// A row under construction, with cells set by column name and checked
/// against the schema.
#[derive(Debug, Clone)]
pub struct PartialRow {
    schema: Schema,
    cells: Vec<Option<Value>>,
}

impl PartialRow {
    /// Creates an empty row for `schema`.
    pub fn new(schema: &Schema) -> Self {
        Self { schema: schema.clone(), cells: vec![None; schema.num_columns()] }
    }

    /// Sets an `Int8` cell.
    pub fn set_int8(&mut self, column: &str, value: i8) -> Result<()> {
        self.set(column, Value::Int8(value))
    }

    /// Sets an `Int64` cell.
    pub fn set_int64(&mut self, column: &str, value: i64) -> Result<()> {
        self.set(column, Value::Int64(value))
    }

    /// Sets a `String` cell.
    pub fn set_string(&mut self, column: &str, value: impl Into<String>) -> Result<()> {
        self.set(column, Value::String(value.into()))
    }

    /// Sets a `Binary` cell.
    pub fn set_binary(&mut self, column: &str, value: impl Into<Vec<u8>>) -> Result<()> {
        self.set(column, Value::Binary(value.into()))
    }

    fn set(&mut self, column: &str, value: Value) -> Result<()> {
        let idx = self
            .schema
            .find_column(column)
            .ok_or_else(|| Error::invalid_argument(format!("no column named {column:?}")))?;
        let expected = self.schema.column(idx).data_type;
        if value.data_type() != expected {
            return Err(Error::invalid_argument(format!(
                "column {column:?} expects {expected:?}, got {:?}",
                value.data_type()
            )));
        }
        self.cells[idx] = Some(value);
        Ok(())
    }

    /// The cell at column index `idx`, if set.
    pub fn cell(&self, idx: usize) -> Option<&Value> {
        self.cells.get(idx).and_then(|c| c.as_ref())
    }

    /// Consumes the row into its cells, in schema column order.
    pub fn into_cells(self) -> Vec<Option<Value>> {
        self.cells
    }
}

/// The kind of a row operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RowOperationKind {
    /// Insert a new row; fails per-row if the key is already present.
    Insert,
    /// Update an existing row; fails per-row if the key is absent.
    Update,
    /// Delete an existing row; fails per-row if the key is absent. Carries
    /// key cells only.
    Delete,
}

/// One encoded row operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowOperation {
    /// What to do with the row.
    pub kind: RowOperationKind,
    /// Cells in schema column order; unset cells are `None`.
    pub cells: Vec<Option<Value>>,
}

/// A batched write addressed to one tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteRequest {
    /// The target tablet.
    pub tablet_id: TabletId,
    /// The schema the operations are encoded against.
    pub schema: Schema,
    /// Row operations, applied in order.
    pub operations: Vec<RowOperation>,
}

impl WriteRequest {
    /// Creates an empty write request.
    pub fn new(tablet_id: impl Into<TabletId>, schema: Schema) -> Self {
        Self { tablet_id: tablet_id.into(), schema, operations: Vec::new() }
    }

    /// Appends one row operation.
    pub fn add(&mut self, kind: RowOperationKind, row: PartialRow) {
        self.operations.push(RowOperation { kind, cells: row.into_cells() });
    }
}

/// Request-level error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteErrorCode {
    /// The request's schema does not match the tablet's schema.
    MismatchedSchema,
    /// The request addressed a different tablet.
    WrongTablet,
    /// The tablet is not accepting writes.
    NotRunning,
}

/// A request-level error: the whole batch was rejected before any row was
/// applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteError {
    /// Machine-readable code.
    pub code: WriteErrorCode,
    /// Human-readable description.
    pub message: String,
}

impl WriteError {
    /// Converts into the catalog's status type.
    pub fn into_error(self) -> Error {
        match self.code {
            WriteErrorCode::MismatchedSchema => Error::corruption(self.message),
            WriteErrorCode::WrongTablet => Error::invalid_argument(self.message),
            WriteErrorCode::NotRunning => Error::illegal_state(self.message),
        }
    }
}

/// An error affecting a single row of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PerRowError {
    /// Index of the row operation within the request.
    pub row_index: usize,
    /// What went wrong with that row.
    pub message: String,
}

/// The outcome of applying a [`WriteRequest`].
///
/// An absent `error` with a non-empty `per_row_errors` means the batch was
/// partially applied: failed rows were skipped, successful rows were not
/// rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteResponse {
    /// Request-level error; the batch had no effect.
    pub error: Option<WriteError>,
    /// Errors for individual rows.
    pub per_row_errors: Vec<PerRowError>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn catalog_like_schema() -> Schema {
        Schema::builder()
            .add_key_column("entry_type", DataType::Int8)
            .unwrap()
            .add_key_column("entry_id", DataType::String)
            .unwrap()
            .add_column("metadata", DataType::String)
            .unwrap()
            .build()
            .unwrap()
    }

    #[test]
    fn test_partial_row_set_and_read() {
        let schema = catalog_like_schema();
        let mut row = PartialRow::new(&schema);
        row.set_int8("entry_type", 1).unwrap();
        row.set_string("entry_id", "table-1").unwrap();
        row.set_string("metadata", "{}").unwrap();

        assert_eq!(row.cell(0), Some(&Value::Int8(1)));
        assert_eq!(row.cell(1), Some(&Value::String("table-1".to_string())));
        assert_eq!(row.cell(2), Some(&Value::String("{}".to_string())));
    }

    #[test]
    fn test_partial_row_rejects_unknown_column() {
        let schema = catalog_like_schema();
        let mut row = PartialRow::new(&schema);
        let err = row.set_string("no_such_column", "x").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_partial_row_rejects_wrong_type() {
        let schema = catalog_like_schema();
        let mut row = PartialRow::new(&schema);
        let err = row.set_string("entry_type", "not an int").unwrap_err();
        assert!(err.is_invalid_argument());
    }

    #[test]
    fn test_write_request_preserves_operation_order() {
        let schema = catalog_like_schema();
        let mut req = WriteRequest::new("t".to_string(), schema.clone());

        let mut insert = PartialRow::new(&schema);
        insert.set_int8("entry_type", 1).unwrap();
        insert.set_string("entry_id", "a").unwrap();
        insert.set_string("metadata", "{}").unwrap();
        req.add(RowOperationKind::Insert, insert);

        let mut delete = PartialRow::new(&schema);
        delete.set_int8("entry_type", 1).unwrap();
        delete.set_string("entry_id", "a").unwrap();
        req.add(RowOperationKind::Delete, delete);

        assert_eq!(req.operations.len(), 2);
        assert_eq!(req.operations[0].kind, RowOperationKind::Insert);
        assert_eq!(req.operations[1].kind, RowOperationKind::Delete);
        // Delete carries key cells only.
        assert_eq!(req.operations[1].cells[2], None);
    }

    #[test]
    fn test_write_request_postcard_roundtrip() {
        let schema = catalog_like_schema();
        let mut req = WriteRequest::new("t".to_string(), schema.clone());
        let mut row = PartialRow::new(&schema);
        row.set_int8("entry_type", 2).unwrap();
        row.set_string("entry_id", "tablet-9").unwrap();
        row.set_string("metadata", "{\"x\":1}").unwrap();
        req.add(RowOperationKind::Update, row);

        let bytes = strata_types::encode(&req).unwrap();
        let back: WriteRequest = strata_types::decode(&bytes).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn test_write_error_status_mapping() {
        let err = WriteError {
            code: WriteErrorCode::MismatchedSchema,
            message: "schema drift".to_string(),
        };
        assert!(err.into_error().is_corruption());

        let err =
            WriteError { code: WriteErrorCode::NotRunning, message: "shutting down".to_string() };
        assert!(err.into_error().is_illegal_state());
    }
}
