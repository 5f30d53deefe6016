//! Catalog introspection, descriptive statistics and predicate deletes.

use ::duckdb::{params_from_iter, Connection};
use ferrofactor_core::{TableName, Timestamp};
use serde::Serialize;
use tracing::info;

use crate::filter::ScanFilter;
use crate::migrations::{MIGRATIONS_TABLE, REGISTRY_TABLE};
use crate::schema::{registered_label, relation_exists};
use crate::WarehouseError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub table: String,
    pub metric_label: Option<String>,
    pub columns: Vec<ColumnInfo>,
    pub row_count: u64,
}

/// Descriptive statistics of one entity's stored values.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityStatistics {
    pub entity_code: String,
    pub count: u64,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub p25: Option<f64>,
    pub median: Option<f64>,
    pub p75: Option<f64>,
    pub max: Option<f64>,
}

/// Base tables in `namespace`, bookkeeping tables excluded.
pub(crate) fn list_tables(
    connection: &Connection,
    namespace: &str,
) -> Result<Vec<String>, WarehouseError> {
    let mut statement = connection.prepare(
        "SELECT table_name FROM information_schema.tables \
         WHERE table_schema = ? AND table_type = 'BASE TABLE' \
         AND table_name NOT IN (?, ?) \
         ORDER BY table_name",
    )?;
    let tables = statement
        .query_map([namespace, REGISTRY_TABLE, MIGRATIONS_TABLE], |row| {
            row.get::<_, String>(0)
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(tables)
}

pub(crate) fn table_info(
    connection: &Connection,
    table: &TableName,
) -> Result<Option<TableInfo>, WarehouseError> {
    if !relation_exists(connection, table)? {
        return Ok(None);
    }

    let mut statement = connection.prepare(
        "SELECT column_name, data_type, is_nullable FROM information_schema.columns \
         WHERE table_schema = ? AND table_name = ? ORDER BY ordinal_position",
    )?;
    let columns = statement
        .query_map([table.namespace(), table.unqualified()], |row| {
            let nullable: String = row.get(2)?;
            Ok(ColumnInfo {
                name: row.get(0)?,
                data_type: row.get(1)?,
                nullable: nullable.eq_ignore_ascii_case("YES"),
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let row_count: i64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.quoted()),
        [],
        |row| row.get(0),
    )?;
    let metric_label = registered_label(connection, table)?.map(|label| label.to_string());

    Ok(Some(TableInfo {
        table: table.to_string(),
        metric_label,
        columns,
        row_count: u64::try_from(row_count).unwrap_or_default(),
    }))
}

pub(crate) fn statistics(
    connection: &Connection,
    table: &TableName,
    filter: &ScanFilter,
) -> Result<Option<Vec<EntityStatistics>>, WarehouseError> {
    if !relation_exists(connection, table)? {
        return Ok(None);
    }

    let (clause, params) = filter.where_clause(&["value IS NOT NULL"]);
    let sql = format!(
        "SELECT entity_code, COUNT(value), AVG(value), STDDEV_SAMP(value), MIN(value), \
         quantile_cont(value, 0.25), quantile_cont(value, 0.5), quantile_cont(value, 0.75), \
         MAX(value) \
         FROM {}{clause} GROUP BY entity_code ORDER BY entity_code",
        table.quoted()
    );

    let mut statement = connection.prepare(&sql)?;
    let stats = statement
        .query_map(params_from_iter(params), |row| {
            let count: i64 = row.get(1)?;
            Ok(EntityStatistics {
                entity_code: row.get(0)?,
                count: u64::try_from(count).unwrap_or_default(),
                mean: row.get(2)?,
                std: row.get(3)?,
                min: row.get(4)?,
                p25: row.get(5)?,
                median: row.get(6)?,
                p75: row.get(7)?,
                max: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Some(stats))
}

/// Delete matching rows. The caller owns the transaction.
pub(crate) fn delete_rows(
    connection: &Connection,
    table: &TableName,
    filter: &ScanFilter,
) -> Result<Option<usize>, WarehouseError> {
    if filter.is_empty() {
        return Err(WarehouseError::EmptyPredicate);
    }
    if !relation_exists(connection, table)? {
        return Ok(None);
    }

    let (clause, params) = filter.where_clause(&[]);
    let deleted = connection.execute(
        &format!("DELETE FROM {}{clause}", table.quoted()),
        params_from_iter(params),
    )?;
    info!(table = %table, deleted, "rows deleted");
    Ok(Some(deleted))
}

/// Latest stored timestamp, `None` for an empty table.
pub(crate) fn max_timestamp(
    connection: &Connection,
    table: &TableName,
) -> Result<Option<Timestamp>, WarehouseError> {
    let latest: Option<String> = connection.query_row(
        &format!("SELECT CAST(MAX(timestamp) AS VARCHAR) FROM {}", table.quoted()),
        [],
        |row| row.get(0),
    )?;
    Ok(latest.map(|raw| Timestamp::parse(&raw)).transpose()?)
}
