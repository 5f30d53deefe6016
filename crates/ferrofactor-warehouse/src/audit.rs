//! Data-quality audit over a stored metric table.
//!
//! An audit never fails. Hard problems go to `issues`, soft ones to
//! `warnings`, and a failing sub-check is recorded as an issue while the
//! remaining checks still run.

use std::collections::BTreeMap;

use ::duckdb::Connection;
use ferrofactor_core::{TableName, Timestamp};
use serde::Serialize;
use time::Duration;
use tracing::{debug, warn};

use crate::reconstruct::{read_wide, ReadRequest};
use crate::schema::relation_exists;
use crate::WarehouseError;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuditThresholds {
    /// Fraction of missing cells above which a column is flagged.
    pub null_rate: f64,
    pub check_duplicates: bool,
    pub check_continuity: bool,
    /// Largest step between consecutive timestamps not reported as a gap.
    pub max_gap: Duration,
}

impl Default for AuditThresholds {
    fn default() -> Self {
        Self {
            null_rate: 0.10,
            check_duplicates: true,
            check_continuity: true,
            max_gap: Duration::days(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DateGap {
    pub previous: Timestamp,
    pub next: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QualitySummary {
    /// Missing fraction per entity column of the wide view.
    pub null_rates: BTreeMap<String, f64>,
    pub duplicate_rows: u64,
    pub date_gaps: Vec<DateGap>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QualityReport {
    pub table_name: String,
    pub total_rows: u64,
    pub issues: Vec<String>,
    pub warnings: Vec<String>,
    pub summary: QualitySummary,
}

impl QualityReport {
    fn new(table: &TableName) -> Self {
        Self {
            table_name: table.to_string(),
            total_rows: 0,
            issues: Vec::new(),
            warnings: Vec::new(),
            summary: QualitySummary::default(),
        }
    }

    /// Report for an audit that could not reach the database at all.
    pub(crate) fn unavailable(table: &TableName, error: &WarehouseError) -> Self {
        let mut report = Self::new(table);
        report.issue(format!("database unavailable: {error}"));
        report
    }

    /// No issues and no warnings.
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty() && self.warnings.is_empty()
    }

    fn issue(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!(table = %self.table_name, issue = %message, "quality issue");
        self.issues.push(message);
    }

    fn warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        debug!(table = %self.table_name, warning = %message, "quality warning");
        self.warnings.push(message);
    }
}

pub(crate) fn audit(
    connection: &Connection,
    table: &TableName,
    thresholds: &AuditThresholds,
) -> QualityReport {
    let mut report = QualityReport::new(table);

    match relation_exists(connection, table) {
        Ok(true) => {}
        Ok(false) => {
            report.issue("table not found");
            return report;
        }
        Err(error) => {
            report.issue(format!("existence check failed: {error}"));
            return report;
        }
    }

    match count_rows(connection, table) {
        Ok(0) => {
            report.issue("table is empty");
            return report;
        }
        Ok(rows) => report.total_rows = rows,
        Err(error) => report.issue(format!("row count failed: {error}")),
    }

    match null_rates(connection, table) {
        Ok(rates) => {
            for (code, rate) in &rates {
                if *rate > thresholds.null_rate {
                    report.warning(format!(
                        "column {code} null rate {:.1}% exceeds {:.1}%",
                        rate * 100.0,
                        thresholds.null_rate * 100.0
                    ));
                }
            }
            report.summary.null_rates = rates;
        }
        Err(error) => report.issue(format!("null rate check failed: {error}")),
    }

    if thresholds.check_duplicates {
        match duplicate_rows(connection, table) {
            Ok(0) => {}
            Ok(duplicates) => {
                report.summary.duplicate_rows = duplicates;
                report.warning(format!(
                    "{duplicates} rows share a (timestamp, entity_code) pair"
                ));
            }
            Err(error) => report.issue(format!("duplicate check failed: {error}")),
        }
    }

    if thresholds.check_continuity {
        match date_gaps(connection, table, thresholds.max_gap) {
            Ok(gaps) => {
                if !gaps.is_empty() {
                    report.warning(format!(
                        "{} gaps longer than {} in the time axis",
                        gaps.len(),
                        describe_gap(thresholds.max_gap)
                    ));
                }
                report.summary.date_gaps = gaps;
            }
            Err(error) => report.issue(format!("continuity check failed: {error}")),
        }
    }

    debug!(
        table = %report.table_name,
        issues = report.issues.len(),
        warnings = report.warnings.len(),
        "audit complete"
    );
    report
}

fn count_rows(connection: &Connection, table: &TableName) -> Result<u64, WarehouseError> {
    let rows: i64 = connection.query_row(
        &format!("SELECT COUNT(*) FROM {}", table.quoted()),
        [],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(rows).unwrap_or_default())
}

fn null_rates(
    connection: &Connection,
    table: &TableName,
) -> Result<BTreeMap<String, f64>, WarehouseError> {
    let mut rates = BTreeMap::new();
    let Some(frame) = read_wide(connection, &ReadRequest::new(table.clone()))? else {
        return Ok(rates);
    };

    let (rows, _) = frame.shape();
    for code in frame.columns() {
        let missing = frame.null_count(code.as_str()).unwrap_or_default();
        rates.insert(code.to_string(), missing as f64 / rows as f64);
    }
    Ok(rates)
}

fn duplicate_rows(connection: &Connection, table: &TableName) -> Result<u64, WarehouseError> {
    let duplicates: i64 = connection.query_row(
        &format!(
            "SELECT CAST(COALESCE(SUM(n - 1), 0) AS BIGINT) FROM (\
                SELECT COUNT(*) AS n FROM {} GROUP BY timestamp, entity_code HAVING COUNT(*) > 1\
            ) AS repeated",
            table.quoted()
        ),
        [],
        |row| row.get(0),
    )?;
    Ok(u64::try_from(duplicates).unwrap_or_default())
}

fn date_gaps(
    connection: &Connection,
    table: &TableName,
    max_gap: Duration,
) -> Result<Vec<DateGap>, WarehouseError> {
    let max_gap_us = i64::try_from(max_gap.whole_microseconds()).unwrap_or(i64::MAX);
    let sql = format!(
        "SELECT CAST(previous AS VARCHAR), CAST(ts AS VARCHAR) FROM (\
            SELECT ts, LAG(ts) OVER (ORDER BY ts) AS previous \
            FROM (SELECT DISTINCT timestamp AS ts FROM {})\
        ) AS steps \
        WHERE previous IS NOT NULL AND date_diff('microsecond', previous, ts) > ? \
        ORDER BY ts",
        table.quoted()
    );

    let mut statement = connection.prepare(&sql)?;
    let raw = statement
        .query_map([max_gap_us], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut gaps = Vec::with_capacity(raw.len());
    for (previous, next) in raw {
        gaps.push(DateGap {
            previous: Timestamp::parse(&previous)?,
            next: Timestamp::parse(&next)?,
        });
    }
    Ok(gaps)
}

fn describe_gap(gap: Duration) -> String {
    if gap.whole_days() >= 1 && gap == Duration::days(gap.whole_days()) {
        let days = gap.whole_days();
        if days == 1 {
            String::from("1 day")
        } else {
            format!("{days} days")
        }
    } else {
        format!("{} seconds", gap.whole_seconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_thresholds_flag_ten_percent_and_one_day() {
        let thresholds = AuditThresholds::default();
        assert!((thresholds.null_rate - 0.10).abs() < f64::EPSILON);
        assert_eq!(thresholds.max_gap, Duration::days(1));
        assert!(thresholds.check_duplicates && thresholds.check_continuity);
    }

    #[test]
    fn gap_descriptions_prefer_days() {
        assert_eq!(describe_gap(Duration::days(1)), "1 day");
        assert_eq!(describe_gap(Duration::days(3)), "3 days");
        assert_eq!(describe_gap(Duration::hours(2)), "7200 seconds");
    }

    #[test]
    fn missing_table_is_an_issue_not_an_error() {
        let connection = Connection::open_in_memory().expect("in-memory duckdb");
        let report = audit(
            &connection,
            &TableName::parse("ghost").expect("name"),
            &AuditThresholds::default(),
        );
        assert_eq!(report.issues, vec![String::from("table not found")]);
        assert!(!report.is_clean());
    }
}
