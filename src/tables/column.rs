//! Column definitions and their foreign-key connections.

use super::TableGraphError;
use std::collections::BTreeSet;
use std::fmt;

/// Marker for "no primary key value known"
pub const UNKNOWN_PRIMARY_KEY: i64 = -1;

/// Address of a column in another table
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

/// One column of a [`TableDefinition`](super::TableDefinition)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableColumnDefinition {
    table_name: String,
    column_name: String,
    data_type_name: String,
    primary_key: bool,
    largest_primary_key: i64,

    /// Foreign-key columns referencing this column
    connections: BTreeSet<ColumnRef>,
}

impl TableColumnDefinition {
    pub fn new(
        table_name: impl Into<String>,
        column_name: impl Into<String>,
        data_type_name: impl Into<String>,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            column_name: column_name.into(),
            data_type_name: data_type_name.into(),
            primary_key: false,
            largest_primary_key: UNKNOWN_PRIMARY_KEY,
            connections: BTreeSet::new(),
        }
    }

    /// Builder-style variant of [`set_primary_key`](Self::set_primary_key)
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub fn column_name(&self) -> &str {
        &self.column_name
    }

    pub fn data_type_name(&self) -> &str {
        &self.data_type_name
    }

    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    pub fn set_primary_key(&mut self, primary_key: bool) {
        self.primary_key = primary_key;
    }

    /// Largest value seen in this primary-key column, `-1` if unknown
    pub fn largest_primary_key(&self) -> i64 {
        self.largest_primary_key
    }

    pub fn set_largest_primary_key(&mut self, value: i64) {
        self.largest_primary_key = value;
    }

    /// Address of this column
    pub fn column_ref(&self) -> ColumnRef {
        ColumnRef::new(self.table_name.clone(), self.column_name.clone())
    }

    /// Register a foreign-key column referencing this column.
    ///
    /// Returns `false` if the connection was already known. Only primary-key
    /// columns may hold connections.
    pub fn add_connection(&mut self, referencing: ColumnRef) -> Result<bool, TableGraphError> {
        if !self.primary_key {
            return Err(TableGraphError::NotPrimaryKey {
                table: self.table_name.clone(),
                column: self.column_name.clone(),
            });
        }
        Ok(self.connections.insert(referencing))
    }

    /// Foreign-key columns referencing this column, ordered by table and column
    pub fn connections(&self) -> impl Iterator<Item = &ColumnRef> {
        self.connections.iter()
    }

    pub fn has_connections(&self) -> bool {
        !self.connections.is_empty()
    }
}

impl fmt::Display for TableColumnDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.table_name, self.column_name, self.data_type_name)?;
        if self.primary_key {
            write!(f, " PK")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_appears_once() {
        let mut id = TableColumnDefinition::new("samples", "id", "bigint").primary_key();
        let fk = ColumnRef::new("data_sets", "samp_id");

        assert!(id.add_connection(fk.clone()).unwrap());
        assert!(!id.add_connection(fk.clone()).unwrap());

        let connections: Vec<_> = id.connections().collect();
        assert_eq!(connections, vec![&fk]);
    }

    #[test]
    fn test_connection_on_non_primary_key_fails() {
        let mut code = TableColumnDefinition::new("samples", "code", "varchar");
        let result = code.add_connection(ColumnRef::new("data_sets", "samp_code"));

        assert!(matches!(result, Err(TableGraphError::NotPrimaryKey { .. })));
        assert!(!code.has_connections());
    }

    #[test]
    fn test_largest_primary_key_defaults_to_unknown() {
        let mut id = TableColumnDefinition::new("samples", "id", "bigint").primary_key();
        assert_eq!(id.largest_primary_key(), UNKNOWN_PRIMARY_KEY);
        id.set_largest_primary_key(42);
        assert_eq!(id.largest_primary_key(), 42);
    }
}
