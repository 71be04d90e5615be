//! Block-based row iteration over the catalog row store.
//!
//! Scans process rows in fixed-size blocks rather than one at a time; the
//! iterator owns its read snapshot, so a scan observes a consistent view of
//! the store regardless of concurrent writes. An equality predicate on the
//! leading `entry_type` key column narrows the scan to a key-range prefix;
//! predicates on other columns are applied per row.

use std::ops::Bound;

use redb::{ReadOnlyTable, ReadableTable};

use strata_types::{Error, Result};

use crate::row::Value;

/// Number of rows fetched per block.
pub const DEFAULT_ROW_BLOCK_SIZE: usize = 512;

/// A single-column predicate.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnPredicate {
    /// Keep rows whose cell in `column` equals `value`.
    Equality {
        /// Column name.
        column: String,
        /// Value to compare against.
        value: Value,
    },
}

/// A scan specification: the conjunction of its predicates.
#[derive(Debug, Clone, Default)]
pub struct ScanSpec {
    predicates: Vec<ColumnPredicate>,
}

impl ScanSpec {
    /// Creates an empty spec matching every row.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a predicate.
    pub fn add_predicate(&mut self, predicate: ColumnPredicate) {
        self.predicates.push(predicate);
    }

    /// The predicates in this spec.
    pub fn predicates(&self) -> &[ColumnPredicate] {
        &self.predicates
    }

    /// The `entry_type` value pinned by an equality predicate, if any.
    pub(crate) fn entry_type_bound(&self) -> Option<i8> {
        self.predicates.iter().find_map(|p| match p {
            ColumnPredicate::Equality { column, value: Value::Int8(v) }
                if column == "entry_type" =>
            {
                Some(*v)
            }
            _ => None,
        })
    }

    /// Whether `row` satisfies every predicate.
    pub(crate) fn matches(&self, row: &CatalogRow) -> bool {
        self.predicates.iter().all(|p| match p {
            ColumnPredicate::Equality { column, value } => match column.as_str() {
                "entry_type" => *value == Value::Int8(row.entry_type),
                "entry_id" => *value == Value::String(row.entry_id.clone()),
                "metadata" => *value == Value::String(row.metadata.clone()),
                _ => false,
            },
        })
    }
}

/// One materialized row of the catalog tablet.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct CatalogRow {
    /// The `entry_type` key cell.
    pub entry_type: i8,
    /// The `entry_id` key cell.
    pub entry_id: String,
    /// The `metadata` value cell.
    pub metadata: String,
}

/// A block-based iterator over catalog rows.
///
/// Produced by the row store; holds its own read snapshot. Rows come out in
/// key order.
#[derive(Debug)]
pub struct RowIter {
    table: ReadOnlyTable<(i8, &'static str), &'static str>,
    spec: ScanSpec,
    block_size: usize,
    cursor: Option<(i8, String)>,
    done: bool,
}

impl RowIter {
    pub(crate) fn new(
        table: ReadOnlyTable<(i8, &'static str), &'static str>,
        spec: ScanSpec,
        block_size: usize,
    ) -> Self {
        Self { table, spec, block_size, cursor: None, done: false }
    }

    /// Fetches the next block of up to `block_size` selected rows.
    ///
    /// Returns `None` when the scan is exhausted.
    pub fn next_block(&mut self) -> Result<Option<Vec<CatalogRow>>> {
        if self.done {
            return Ok(None);
        }

        let type_bound = self.spec.entry_type_bound();
        let cursor = self.cursor.clone();
        let lower: Bound<(i8, &str)> = match &cursor {
            Some((entry_type, entry_id)) => Bound::Excluded((*entry_type, entry_id.as_str())),
            None => match type_bound {
                Some(t) => Bound::Included((t, "")),
                None => Bound::Unbounded,
            },
        };

        let mut rows = Vec::with_capacity(self.block_size);
        let range = self
            .table
            .range::<(i8, &str)>((lower, Bound::Unbounded))
            .map_err(|e| storage_error(&e))?;
        for item in range {
            let (key, value) = item.map_err(|e| storage_error(&e))?;
            let (entry_type, entry_id) = key.value();
            if let Some(t) = type_bound {
                if entry_type != t {
                    self.done = true;
                    break;
                }
            }
            self.cursor = Some((entry_type, entry_id.to_string()));
            let row = CatalogRow {
                entry_type,
                entry_id: entry_id.to_string(),
                metadata: value.value().to_string(),
            };
            if self.spec.matches(&row) {
                rows.push(row);
                if rows.len() >= self.block_size {
                    break;
                }
            }
        }

        if rows.is_empty() {
            self.done = true;
            Ok(None)
        } else {
            Ok(Some(rows))
        }
    }
}

pub(crate) fn storage_error<E: std::fmt::Display>(e: &E) -> Error {
    Error::runtime_error(format!("storage engine error: {e}"))
}
