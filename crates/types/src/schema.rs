//! Column schema model.
//!
//! A schema is an ordered list of columns whose leading run forms the
//! compound primary key. Schemas are value types: equality is structural and
//! is what the catalog uses to detect on-disk drift.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// The data type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    /// 8-bit signed integer.
    Int8,
    /// 64-bit signed integer.
    Int64,
    /// UTF-8 string.
    String,
    /// Raw bytes.
    Binary,
}

/// A single column of a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    /// Column name, unique within the schema.
    pub name: String,
    /// Data type of the column's cells.
    pub data_type: DataType,
    /// Whether cells may be null.
    pub is_nullable: bool,
}

impl ColumnSchema {
    /// Creates a non-nullable column.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, is_nullable: false }
    }

    /// Creates a nullable column.
    pub fn nullable(name: impl Into<String>, data_type: DataType) -> Self {
        Self { name: name.into(), data_type, is_nullable: true }
    }
}

/// An ordered column schema with a key prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
}

impl Schema {
    /// Starts building a schema.
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    /// All columns, key columns first.
    pub fn columns(&self) -> &[ColumnSchema] {
        &self.columns
    }

    /// Number of leading key columns.
    pub fn num_key_columns(&self) -> usize {
        self.num_key_columns
    }

    /// Total number of columns.
    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    /// Index of the named column, if present.
    pub fn find_column(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// The column at `idx`.
    ///
    /// # Panics
    ///
    /// Panics if `idx` is out of range.
    pub fn column(&self, idx: usize) -> &ColumnSchema {
        &self.columns[idx]
    }

    /// True if `idx` addresses a key column.
    pub fn is_key_column(&self, idx: usize) -> bool {
        idx < self.num_key_columns
    }

    /// A schema containing only the key columns.
    pub fn key_projection(&self) -> Schema {
        Schema {
            columns: self.columns[..self.num_key_columns].to_vec(),
            num_key_columns: self.num_key_columns,
        }
    }
}

/// Builder for [`Schema`].
///
/// Key columns must be added before value columns; both kinds reject
/// duplicate names.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    columns: Vec<ColumnSchema>,
    num_key_columns: usize,
    sealed_keys: bool,
}

impl SchemaBuilder {
    /// Appends a non-nullable key column.
    pub fn add_key_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        if self.sealed_keys {
            return Err(Error::invalid_argument(format!(
                "key column {name:?} added after value columns"
            )));
        }
        self.check_duplicate(&name)?;
        self.columns.push(ColumnSchema::new(name, data_type));
        self.num_key_columns += 1;
        Ok(self)
    }

    /// Appends a non-nullable value column.
    pub fn add_column(mut self, name: impl Into<String>, data_type: DataType) -> Result<Self> {
        let name = name.into();
        self.check_duplicate(&name)?;
        self.sealed_keys = true;
        self.columns.push(ColumnSchema::new(name, data_type));
        Ok(self)
    }

    /// Appends a nullable value column.
    pub fn add_nullable_column(
        mut self,
        name: impl Into<String>,
        data_type: DataType,
    ) -> Result<Self> {
        let name = name.into();
        self.check_duplicate(&name)?;
        self.sealed_keys = true;
        self.columns.push(ColumnSchema::nullable(name, data_type));
        Ok(self)
    }

    /// Finalizes the schema.
    pub fn build(self) -> Result<Schema> {
        if self.num_key_columns == 0 {
            return Err(Error::invalid_argument("schema has no key columns"));
        }
        Ok(Schema { columns: self.columns, num_key_columns: self.num_key_columns })
    }

    fn check_duplicate(&self, name: &str) -> Result<()> {
        if self.columns.iter().any(|c| c.name == name) {
            return Err(Error::invalid_argument(format!("duplicate column name {name:?}")));
        }
        Ok(())
    }
}
