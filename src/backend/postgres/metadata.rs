//! Table graph introspection through `information_schema`.

use super::connection::map_sqlx_error;
use crate::core::DbResult;
use crate::tables::{DatabaseDefinition, TableColumnDefinition, TableDefinition};
use pg_escape::quote_identifier;
use sqlx::postgres::PgConnection;
use tracing::debug;

const COLUMNS_SQL: &str = "\
SELECT c.table_name::text, c.column_name::text, c.data_type::text
FROM information_schema.columns c
JOIN information_schema.tables t
  ON t.table_schema = c.table_schema AND t.table_name = c.table_name
WHERE c.table_schema = current_schema() AND t.table_type = 'BASE TABLE'
ORDER BY c.table_name, c.ordinal_position";

const PRIMARY_KEYS_SQL: &str = "\
SELECT kcu.table_name::text, kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name
WHERE tc.constraint_type = 'PRIMARY KEY' AND tc.table_schema = current_schema()";

const FOREIGN_KEYS_SQL: &str = "\
SELECT ccu.table_name::text, ccu.column_name::text, kcu.table_name::text, kcu.column_name::text
FROM information_schema.table_constraints tc
JOIN information_schema.key_column_usage kcu
  ON kcu.constraint_schema = tc.constraint_schema AND kcu.constraint_name = tc.constraint_name
JOIN information_schema.constraint_column_usage ccu
  ON ccu.constraint_schema = tc.constraint_schema AND ccu.constraint_name = tc.constraint_name
WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema()";

/// Column types whose maximum value is collected
const INTEGER_TYPES: [&str; 3] = ["smallint", "integer", "bigint"];

/// `(table, column, data type)`
pub type ColumnRow = (String, String, String);
/// `(table, column)`
pub type PrimaryKeyRow = (String, String);
/// `(pk table, pk column, fk table, fk column)`
pub type ForeignKeyRow = (String, String, String, String);

/// Assemble the table graph from catalog rows
pub fn build_definition(
    columns: Vec<ColumnRow>,
    primary_keys: &[PrimaryKeyRow],
    foreign_keys: &[ForeignKeyRow],
) -> DatabaseDefinition {
    let mut definition = DatabaseDefinition::new();
    for (table, column, data_type) in columns {
        if definition.table(&table).is_none() {
            definition.add_table(TableDefinition::new(table.clone()));
        }
        if let Some(table_definition) = definition.table_mut(&table) {
            let column = TableColumnDefinition::new(table.clone(), column, data_type);
            if let Err(e) = table_definition.add_column(column) {
                debug!(error = %e, "skipping column");
            }
        }
    }

    for (table, column) in primary_keys {
        match definition
            .table_mut(table)
            .and_then(|t| t.column_mut(column))
        {
            Some(column) => column.set_primary_key(true),
            None => debug!(table = %table, column = %column, "primary key on unknown column"),
        }
    }

    for (pk_table, pk_column, fk_table, fk_column) in foreign_keys {
        if let Err(e) = definition.connect(pk_table, pk_column, fk_table, fk_column) {
            debug!(error = %e, "skipping foreign key {}.{}", fk_table, fk_column);
        }
    }

    definition
}

/// Read tables, keys and foreign keys of the connected database
pub async fn introspect(connection: &mut PgConnection) -> DbResult<DatabaseDefinition> {
    let columns: Vec<ColumnRow> = sqlx::query_as(COLUMNS_SQL)
        .fetch_all(&mut *connection)
        .await
        .map_err(map_sqlx_error)?;
    let primary_keys: Vec<PrimaryKeyRow> = sqlx::query_as(PRIMARY_KEYS_SQL)
        .fetch_all(&mut *connection)
        .await
        .map_err(map_sqlx_error)?;
    let foreign_keys: Vec<ForeignKeyRow> = sqlx::query_as(FOREIGN_KEYS_SQL)
        .fetch_all(&mut *connection)
        .await
        .map_err(map_sqlx_error)?;

    let mut definition = build_definition(columns, &primary_keys, &foreign_keys);

    for (table, column) in &primary_keys {
        let is_integer = definition
            .table(table)
            .and_then(|t| t.column(column))
            .map(|c| INTEGER_TYPES.iter().any(|t| *t == c.data_type_name()))
            .unwrap_or(false);
        if !is_integer {
            continue;
        }

        let sql = format!(
            "SELECT MAX({})::bigint FROM {}",
            quote_identifier(column),
            quote_identifier(table)
        );
        let (largest,): (Option<i64>,) = sqlx::query_as(&sql)
            .fetch_one(&mut *connection)
            .await
            .map_err(map_sqlx_error)?;
        if let (Some(largest), Some(column)) = (
            largest,
            definition
                .table_mut(table)
                .and_then(|t| t.column_mut(column)),
        ) {
            column.set_largest_primary_key(largest);
        }
    }

    debug!(tables = definition.len(), "introspected database");
    Ok(definition)
}
