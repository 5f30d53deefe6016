//! Metric table DDL and the label registry.
//!
//! Functions here never open a transaction themselves; the caller decides the
//! transaction boundary.

use ::duckdb::{Connection, OptionalExt};
use ferrofactor_core::{MetricLabel, MetricTable, TableName};
use serde::Serialize;
use tracing::{debug, info};

use crate::migrations::{MIGRATIONS_TABLE, REGISTRY_TABLE};
use crate::WarehouseError;

/// Result of [`crate::Warehouse::ensure_table`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EnsureOutcome {
    Created,
    /// Existed, dropped and created again because overwrite was requested.
    Recreated,
    /// Existed and overwrite was not requested; nothing changed.
    AlreadyExists,
}

impl EnsureOutcome {
    /// Whether a fresh empty table now exists.
    pub fn created(self) -> bool {
        !matches!(self, Self::AlreadyExists)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DropOutcome {
    Dropped,
    NotFound,
}

/// Any table with this unqualified name exists, in any namespace.
///
/// Comparison is exact, so `Price` and `price` are different names here.
pub(crate) fn table_exists(connection: &Connection, name: &TableName) -> Result<bool, WarehouseError> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_name = ?",
        [name.unqualified()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// The table exists at exactly `namespace.table`.
pub(crate) fn relation_exists(
    connection: &Connection,
    name: &TableName,
) -> Result<bool, WarehouseError> {
    let count: i64 = connection.query_row(
        "SELECT COUNT(*) FROM information_schema.tables WHERE table_schema = ? AND table_name = ?",
        [name.namespace(), name.unqualified()],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

/// Bookkeeping relations can never be created or dropped as metric tables.
fn reject_reserved(name: &TableName) -> Result<(), WarehouseError> {
    let table = name.unqualified();
    if [REGISTRY_TABLE, MIGRATIONS_TABLE]
        .iter()
        .any(|reserved| table.eq_ignore_ascii_case(reserved))
    {
        return Err(WarehouseError::QueryRejected(format!(
            "{table} is reserved for warehouse bookkeeping"
        )));
    }
    Ok(())
}

pub(crate) fn ensure_table(
    connection: &Connection,
    table: &MetricTable,
    overwrite: bool,
) -> Result<EnsureOutcome, WarehouseError> {
    reject_reserved(&table.name)?;
    let outcome = if table_exists(connection, &table.name)? {
        if !overwrite {
            info!(table = %table.name, "table already exists, not created");
            return Ok(EnsureOutcome::AlreadyExists);
        }
        connection.execute_batch(&format!("DROP TABLE IF EXISTS {}", table.name.quoted()))?;
        EnsureOutcome::Recreated
    } else {
        EnsureOutcome::Created
    };

    if let Some(namespace) = table.name.explicit_namespace() {
        connection.execute_batch(&format!("CREATE SCHEMA IF NOT EXISTS \"{namespace}\""))?;
    }
    connection.execute_batch(&create_table_sql(&table.name))?;
    register(connection, table)?;

    info!(
        table = %table.name,
        metric_label = %table.metric_label,
        ?outcome,
        "metric table ready"
    );
    Ok(outcome)
}

pub(crate) fn drop_table(
    connection: &Connection,
    name: &TableName,
) -> Result<DropOutcome, WarehouseError> {
    reject_reserved(name)?;
    if !relation_exists(connection, name)? {
        debug!(table = %name, "drop requested for missing table");
        return Ok(DropOutcome::NotFound);
    }

    connection.execute_batch(&format!("DROP TABLE {}", name.quoted()))?;
    connection.execute(
        "DELETE FROM ferrofactor_registry WHERE table_schema = ? AND table_name = ?",
        [name.namespace(), name.unqualified()],
    )?;
    info!(table = %name, "metric table dropped");
    Ok(DropOutcome::Dropped)
}

/// Label recorded for the table at creation, if it was created through the registry.
pub(crate) fn registered_label(
    connection: &Connection,
    name: &TableName,
) -> Result<Option<MetricLabel>, WarehouseError> {
    let label: Option<String> = connection
        .query_row(
            "SELECT metric_label FROM ferrofactor_registry WHERE table_schema = ? AND table_name = ?",
            [name.namespace(), name.unqualified()],
            |row| row.get(0),
        )
        .optional()?;

    match label {
        Some(label) => Ok(Some(MetricLabel::parse(&label)?)),
        None => Ok(None),
    }
}

/// The association used for writes: the registered label, else the bare table name.
pub(crate) fn resolve_metric_table(
    connection: &Connection,
    name: &TableName,
) -> Result<MetricTable, WarehouseError> {
    Ok(match registered_label(connection, name)? {
        Some(label) => MetricTable::new(name.clone(), label),
        None => MetricTable::self_labelled(name.clone()),
    })
}

fn register(connection: &Connection, table: &MetricTable) -> Result<(), WarehouseError> {
    connection.execute(
        "INSERT OR REPLACE INTO ferrofactor_registry (table_schema, table_name, metric_label) \
         VALUES (?, ?, ?)",
        [
            table.name.namespace(),
            table.name.unqualified(),
            table.metric_label.as_str(),
        ],
    )?;
    Ok(())
}

fn create_table_sql(name: &TableName) -> String {
    format!(
        "CREATE TABLE {} (\
            timestamp TIMESTAMP NOT NULL, \
            entity_code VARCHAR(20) NOT NULL, \
            metric_name VARCHAR(100) NOT NULL, \
            value DOUBLE, \
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP, \
            PRIMARY KEY (timestamp, entity_code, metric_name)\
        )",
        name.quoted()
    )
}
