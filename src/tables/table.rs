//! Table definitions.

use super::{TableColumnDefinition, TableGraphError};
use std::fmt;

/// One database table with its columns in ordinal order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDefinition {
    table_name: String,
    columns: Vec<TableColumnDefinition>,
}

impl TableDefinition {
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
        }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Append a column. The column must belong to this table and must not
    /// already exist.
    pub fn add_column(&mut self, column: TableColumnDefinition) -> Result<(), TableGraphError> {
        if column.table_name() != self.table_name {
            return Err(TableGraphError::UnknownColumn {
                table: self.table_name.clone(),
                column: format!("{}.{}", column.table_name(), column.column_name()),
            });
        }
        if self.column(column.column_name()).is_some() {
            return Err(TableGraphError::DuplicateColumn {
                table: self.table_name.clone(),
                column: column.column_name().to_string(),
            });
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&TableColumnDefinition> {
        self.columns.iter().find(|c| c.column_name() == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut TableColumnDefinition> {
        self.columns.iter_mut().find(|c| c.column_name() == name)
    }

    pub fn columns(&self) -> &[TableColumnDefinition] {
        &self.columns
    }

    pub fn primary_key_columns(&self) -> impl Iterator<Item = &TableColumnDefinition> {
        self.columns.iter().filter(|c| c.is_primary_key())
    }
}

impl fmt::Display for TableDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_name)
    }
}
