//! Multifactor join: one labelled long result across several metric tables.
//!
//! Each table contributes its own `metric_name` as the label. Per-table scans
//! carry the same pushed-down filter and are combined with `UNION ALL`, so a
//! `(date, code)` pair appears once per metric that has it.

use ::duckdb::types::Value;
use ::duckdb::{params_from_iter, Connection};
use ferrofactor_core::{EntityCode, MetricFrame, MetricRow, TableName, Timestamp};
use serde::Serialize;
use tracing::{debug, warn};

use crate::filter::ScanFilter;
use crate::schema::relation_exists;
use crate::WarehouseError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinRequest {
    pub tables: Vec<TableName>,
    pub filter: ScanFilter,
}

impl JoinRequest {
    pub fn new(tables: impl IntoIterator<Item = TableName>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
            filter: ScanFilter::default(),
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: ScanFilter) -> Self {
        self.filter = filter;
        self
    }
}

/// Join result with the two empty cases kept apart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "rows", rename_all = "snake_case")]
pub enum JoinOutcome {
    Rows(MetricFrame),
    /// None of the requested tables exist.
    NoValidTables,
    /// At least one table exists but no non-null row matched the filter.
    NoMatchingRows,
}

impl JoinOutcome {
    /// The frame, or `None` for either empty case.
    pub fn into_frame(self) -> Option<MetricFrame> {
        match self {
            Self::Rows(frame) => Some(frame),
            Self::NoValidTables | Self::NoMatchingRows => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        !matches!(self, Self::Rows(_))
    }
}

pub(crate) fn join_metrics(
    connection: &Connection,
    request: &JoinRequest,
) -> Result<JoinOutcome, WarehouseError> {
    let mut valid: Vec<&TableName> = Vec::with_capacity(request.tables.len());
    for table in &request.tables {
        if valid.contains(&table) {
            continue;
        }
        if relation_exists(connection, table)? {
            valid.push(table);
        } else {
            warn!(table = %table, "metric table not found, skipped from join");
        }
    }

    if valid.is_empty() {
        warn!(requested = request.tables.len(), "no valid tables to join");
        return Ok(JoinOutcome::NoValidTables);
    }

    let (sql, params) = union_sql(&valid, &request.filter);
    let rows = scan_metric_rows(connection, &sql, params)?;
    if rows.is_empty() {
        debug!(tables = valid.len(), "join matched no rows");
        return Ok(JoinOutcome::NoMatchingRows);
    }

    debug!(tables = valid.len(), rows = rows.len(), "multifactor join complete");
    Ok(JoinOutcome::Rows(MetricFrame::new(rows)))
}

fn union_sql(tables: &[&TableName], filter: &ScanFilter) -> (String, Vec<Value>) {
    let mut scans = Vec::with_capacity(tables.len());
    let mut params = Vec::new();
    for table in tables {
        let (clause, table_params) = filter.where_clause(&["value IS NOT NULL"]);
        scans.push(format!(
            "SELECT timestamp, entity_code, metric_name, value FROM {}{clause}",
            table.quoted()
        ));
        params.extend(table_params);
    }

    let sql = format!(
        "SELECT CAST(timestamp AS VARCHAR) AS date, entity_code AS code, \
         metric_name AS metric_label, value \
         FROM ({}) AS combined \
         ORDER BY timestamp, entity_code, metric_name",
        scans.join(" UNION ALL ")
    );
    (sql, params)
}

fn scan_metric_rows(
    connection: &Connection,
    sql: &str,
    params: Vec<Value>,
) -> Result<Vec<MetricRow>, WarehouseError> {
    let mut statement = connection.prepare(sql)?;
    let raw = statement
        .query_map(params_from_iter(params), |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, f64>(3)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(raw.len());
    for (date, code, metric_label, value) in raw {
        rows.push(MetricRow {
            date: Timestamp::parse(&date)?,
            code: EntityCode::parse(&code)?,
            metric_label,
            value,
        });
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_repeats_the_filter_for_every_table() {
        let first = TableName::parse("px").expect("name");
        let second = TableName::parse("factors.pb").expect("name");
        let filter = ScanFilter::default().entities([EntityCode::parse("A").expect("code")]);

        let (sql, params) = union_sql(&[&first, &second], &filter);
        assert_eq!(params.len(), 2);
        assert_eq!(sql.matches("value IS NOT NULL AND entity_code IN (?)").count(), 2);
        assert!(sql.contains("FROM \"factors\".\"pb\""));
        assert!(sql.contains(" UNION ALL "));
        assert!(sql.ends_with("ORDER BY timestamp, entity_code, metric_name"));
    }

    #[test]
    fn both_empty_outcomes_collapse_to_none() {
        assert!(JoinOutcome::NoValidTables.into_frame().is_none());
        assert!(JoinOutcome::NoMatchingRows.into_frame().is_none());
        assert!(JoinOutcome::NoMatchingRows.is_empty());
    }
}
