//! # Table Dependency Graph
//!
//! A [`DatabaseDefinition`] is a snapshot of a database's tables, columns
//! and foreign-key relationships, built once per introspection call.
//!
//! Edges run from a primary-key column to every foreign-key column that
//! references it. The graph may contain cycles (self references, mutually
//! referencing tables); traversal keeps a visited set so it always
//! terminates.
//!
//! The graph is assembled with `&mut` methods while introspecting and is
//! only read afterwards.

pub mod column;
pub mod database;
pub mod table;

pub use column::{ColumnRef, TableColumnDefinition};
pub use database::DatabaseDefinition;
pub use table::TableDefinition;

use thiserror::Error;

/// Misuse of the table graph
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TableGraphError {
    #[error("Unknown table '{table}'")]
    UnknownTable { table: String },

    #[error("Unknown column '{column}' in table '{table}'")]
    UnknownColumn { table: String, column: String },

    #[error("Column '{column}' of table '{table}' is not a primary key and cannot hold connections")]
    NotPrimaryKey { table: String, column: String },

    #[error("Table '{table}' already has a column '{column}'")]
    DuplicateColumn { table: String, column: String },
}
