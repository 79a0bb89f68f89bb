//! Database definitions and dependency traversal.

use super::{ColumnRef, TableDefinition, TableGraphError};
use std::collections::{BTreeMap, BTreeSet};

/// All tables of one database, keyed and sorted by table name
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabaseDefinition {
    tables: BTreeMap<String, TableDefinition>,
}

impl DatabaseDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table, replacing any table with the same name
    pub fn add_table(&mut self, table: TableDefinition) {
        self.tables.insert(table.table_name().to_string(), table);
    }

    pub fn table(&self, name: &str) -> Option<&TableDefinition> {
        self.tables.get(name)
    }

    pub fn table_mut(&mut self, name: &str) -> Option<&mut TableDefinition> {
        self.tables.get_mut(name)
    }

    /// Tables in name order
    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Wire the primary-key column `pk_table.pk_column` to the foreign-key
    /// column `fk_table.fk_column` that references it.
    pub fn connect(
        &mut self,
        pk_table: &str,
        pk_column: &str,
        fk_table: &str,
        fk_column: &str,
    ) -> Result<(), TableGraphError> {
        let referencing = self
            .table(fk_table)
            .ok_or_else(|| TableGraphError::UnknownTable {
                table: fk_table.to_string(),
            })?
            .column(fk_column)
            .ok_or_else(|| TableGraphError::UnknownColumn {
                table: fk_table.to_string(),
                column: fk_column.to_string(),
            })?
            .column_ref();

        let column = self
            .tables
            .get_mut(pk_table)
            .ok_or_else(|| TableGraphError::UnknownTable {
                table: pk_table.to_string(),
            })?
            .column_mut(pk_column)
            .ok_or_else(|| TableGraphError::UnknownColumn {
                table: pk_table.to_string(),
                column: pk_column.to_string(),
            })?;

        column.add_connection(referencing)?;
        Ok(())
    }

    /// All tables that transitively depend on any of `roots`.
    ///
    /// Follows primary key -> referencing foreign key -> owning table edges
    /// depth-first. The roots are marked visited up front and are never part
    /// of the result, even when a cycle leads back to them. The result is
    /// ordered by table name.
    pub fn tables_depending_on(
        &self,
        roots: &[&str],
    ) -> Result<Vec<&TableDefinition>, TableGraphError> {
        let mut visited: BTreeSet<&str> = BTreeSet::new();
        let mut stack: Vec<&TableDefinition> = Vec::with_capacity(roots.len());
        for name in roots {
            let table = self.table(name).ok_or_else(|| TableGraphError::UnknownTable {
                table: name.to_string(),
            })?;
            visited.insert(table.table_name());
            stack.push(table);
        }

        let mut result: BTreeMap<&str, &TableDefinition> = BTreeMap::new();
        while let Some(table) = stack.pop() {
            for referencing in Self::referencing_columns(table) {
                let Some(dependent) = self.tables.get(&referencing.table) else {
                    continue;
                };
                if visited.insert(dependent.table_name()) {
                    result.insert(dependent.table_name(), dependent);
                    stack.push(dependent);
                }
            }
        }

        Ok(result.into_values().collect())
    }

    fn referencing_columns(table: &TableDefinition) -> impl Iterator<Item = &ColumnRef> {
        table
            .primary_key_columns()
            .flat_map(|column| column.connections())
    }
}
