//! Wide reconstruction: filtered long scan, ordered, pivoted back to a matrix.

use ::duckdb::{params_from_iter, Connection};
use ferrofactor_core::{EntityCode, TableName, Timestamp, WideFrame};
use serde::Serialize;
use tracing::debug;

use crate::filter::ScanFilter;
use crate::schema::relation_exists;
use crate::WarehouseError;

/// How a read limit is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "rows", rename_all = "snake_case")]
pub enum RowLimit {
    /// At most `n` timestamps in the pivoted frame.
    WideRows(usize),
    /// At most `n` long rows scanned before the pivot. Entities that fall
    /// outside the scanned rows show up as missing cells.
    SourceRows(usize),
}

impl RowLimit {
    fn rows(self) -> usize {
        match self {
            Self::WideRows(rows) | Self::SourceRows(rows) => rows,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadRequest {
    pub table: TableName,
    pub filter: ScanFilter,
    pub limit: Option<RowLimit>,
}

impl ReadRequest {
    pub fn new(table: TableName) -> Self {
        Self {
            table,
            filter: ScanFilter::default(),
            limit: None,
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn limit(mut self, limit: RowLimit) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// `Ok(None)` when the table is missing or nothing matches the filter.
pub(crate) fn read_wide(
    connection: &Connection,
    request: &ReadRequest,
) -> Result<Option<WideFrame>, WarehouseError> {
    if let Some(limit) = request.limit {
        if limit.rows() == 0 {
            return Err(WarehouseError::QueryRejected(String::from(
                "limit must be greater than zero",
            )));
        }
    }
    if !relation_exists(connection, &request.table)? {
        debug!(table = %request.table, "read of missing table");
        return Ok(None);
    }

    let (clause, params) = request.filter.where_clause(&[]);
    let mut sql = format!(
        "SELECT CAST(timestamp AS VARCHAR), entity_code, value FROM {}{clause} \
         ORDER BY timestamp, entity_code",
        request.table.quoted()
    );
    if let Some(RowLimit::SourceRows(rows)) = request.limit {
        sql.push_str(&format!(" LIMIT {rows}"));
    }

    let rows = scan_rows(connection, &sql, params)?;
    if rows.is_empty() {
        debug!(table = %request.table, "read matched no rows");
        return Ok(None);
    }

    let mut frame = WideFrame::pivot(rows)?;
    if let Some(RowLimit::WideRows(rows)) = request.limit {
        frame.truncate_rows(rows);
    }

    let (rows, columns) = frame.shape();
    debug!(table = %request.table, rows, columns, "reconstructed wide frame");
    Ok(Some(frame))
}

type ScannedRow = (Timestamp, EntityCode, Option<f64>);

fn scan_rows(
    connection: &Connection,
    sql: &str,
    params: Vec<::duckdb::types::Value>,
) -> Result<Vec<ScannedRow>, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    let raw = statement
        .query_map(params_from_iter(params), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<f64>>(2)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(raw.len());
    for (timestamp, code, value) in raw {
        rows.push((Timestamp::parse(&timestamp)?, EntityCode::parse(&code)?, value));
    }
    Ok(rows)
}
