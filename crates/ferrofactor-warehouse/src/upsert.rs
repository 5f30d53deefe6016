//! Upsert engine.
//!
//! Rows without a value are dropped, repeated keys inside one frame are
//! collapsed according to the conflict policy, and the remainder is sent as
//! multi-row parameterised `INSERT` statements. Collapsing first keeps batch
//! boundaries invisible: a key reaches the engine at most once per call.

use std::collections::{BTreeMap, HashMap};

use ::duckdb::types::Value;
use ::duckdb::{params_from_iter, Connection};
use ferrofactor_core::{ConflictPolicy, EntityCode, LongFrame, MetricTable, TableName, Timestamp};
use serde::Serialize;
use time::Duration;
use tracing::debug;

use crate::WarehouseError;

/// What a single write did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub table: String,
    pub metric_label: String,
    pub policy: ConflictPolicy,
    /// Rows handed in by the caller.
    pub submitted: usize,
    /// Rows sent to storage after filtering and collapsing.
    pub written: usize,
    pub skipped_null: usize,
    /// Rows folded into another row with the same key.
    pub collapsed: usize,
}

impl WriteSummary {
    pub fn is_noop(&self) -> bool {
        self.written == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WriteOutcome {
    Written(WriteSummary),
    /// The target table does not exist; nothing was created or written.
    TableMissing,
}

impl WriteOutcome {
    pub fn summary(&self) -> Option<&WriteSummary> {
        match self {
            Self::Written(summary) => Some(summary),
            Self::TableMissing => None,
        }
    }

    pub fn written(&self) -> usize {
        self.summary().map_or(0, |summary| summary.written)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PreparedRow {
    pub timestamp: Timestamp,
    pub entity_code: EntityCode,
    pub value: f64,
}

#[derive(Debug, Default)]
pub(crate) struct PreparedRows {
    pub rows: Vec<PreparedRow>,
    pub skipped_null: usize,
    pub collapsed: usize,
}

/// Drop missing and non-finite values and collapse repeated `(timestamp, entity_code)` keys.
///
/// `Update` keeps the last value seen for a key, `Ignore` the first, and
/// `Error` refuses the whole frame.
pub(crate) fn prepare_rows(
    frame: &LongFrame,
    policy: ConflictPolicy,
    table: &TableName,
) -> Result<PreparedRows, WarehouseError> {
    let mut prepared = PreparedRows::default();
    let mut positions: HashMap<(Timestamp, &EntityCode), usize> = HashMap::new();

    for row in frame.rows() {
        let Some(value) = row.value.filter(|value| value.is_finite()) else {
            prepared.skipped_null += 1;
            continue;
        };

        match positions.get(&(row.timestamp, &row.entity_code)) {
            Some(&position) => match policy {
                ConflictPolicy::Update => {
                    prepared.rows[position].value = value;
                    prepared.collapsed += 1;
                }
                ConflictPolicy::Ignore => prepared.collapsed += 1,
                ConflictPolicy::Error => {
                    return Err(WarehouseError::ConstraintViolation {
                        table: table.to_string(),
                        detail: format!(
                            "key ({}, {}) appears more than once in the submitted rows",
                            row.timestamp, row.entity_code
                        ),
                    });
                }
            },
            None => {
                positions.insert((row.timestamp, &row.entity_code), prepared.rows.len());
                prepared.rows.push(PreparedRow {
                    timestamp: row.timestamp,
                    entity_code: row.entity_code.clone(),
                    value,
                });
            }
        }
    }

    Ok(prepared)
}

/// Prepare and write a frame. The caller owns the transaction.
pub(crate) fn write_frame(
    connection: &Connection,
    table: &MetricTable,
    frame: &LongFrame,
    policy: ConflictPolicy,
    batch_size: usize,
) -> Result<WriteSummary, WarehouseError> {
    let prepared = prepare_rows(frame, policy, &table.name)?;
    let mut summary = WriteSummary {
        table: table.name.to_string(),
        metric_label: table.metric_label.to_string(),
        policy,
        submitted: frame.len(),
        written: 0,
        skipped_null: prepared.skipped_null,
        collapsed: prepared.collapsed,
    };

    if prepared.rows.is_empty() {
        debug!(table = %table.name, submitted = frame.len(), "no non-null rows to write");
        return Ok(summary);
    }

    log_progress(&table.name, &prepared.rows);
    summary.written = write_rows(connection, table, &prepared.rows, policy, batch_size)?;
    debug!(
        table = %table.name,
        written = summary.written,
        skipped_null = summary.skipped_null,
        collapsed = summary.collapsed,
        %policy,
        "rows written"
    );
    Ok(summary)
}

fn write_rows(
    connection: &Connection,
    table: &MetricTable,
    rows: &[PreparedRow],
    policy: ConflictPolicy,
    batch_size: usize,
) -> Result<usize, WarehouseError> {
    let batch_size = batch_size.max(1);
    let label = table.metric_label.as_str();

    for (batch, chunk) in rows.chunks(batch_size).enumerate() {
        let sql = insert_sql(&table.name, chunk.len(), policy);
        let mut params = Vec::with_capacity(chunk.len() * 4);
        for row in chunk {
            params.push(Value::Text(row.timestamp.to_sql_string()));
            params.push(Value::Text(row.entity_code.as_str().to_owned()));
            params.push(Value::Text(label.to_owned()));
            params.push(Value::Double(row.value));
        }

        connection
            .execute(&sql, params_from_iter(params))
            .map_err(|error| classify_write_error(error, &table.name))?;
        debug!(table = %table.name, batch, rows = chunk.len(), "batch written");
    }

    Ok(rows.len())
}

fn insert_sql(table: &TableName, rows: usize, policy: ConflictPolicy) -> String {
    let placeholders = vec!["(CAST(? AS TIMESTAMP), ?, ?, ?)"; rows].join(", ");
    format!(
        "INSERT INTO {} (timestamp, entity_code, metric_name, value) VALUES {placeholders}{}",
        table.quoted(),
        conflict_clause(policy)
    )
}

fn conflict_clause(policy: ConflictPolicy) -> &'static str {
    match policy {
        ConflictPolicy::Update => {
            " ON CONFLICT (timestamp, entity_code, metric_name) DO UPDATE SET value = EXCLUDED.value"
        }
        ConflictPolicy::Ignore => " ON CONFLICT (timestamp, entity_code, metric_name) DO NOTHING",
        ConflictPolicy::Error => "",
    }
}

fn classify_write_error(error: ::duckdb::Error, table: &TableName) -> WarehouseError {
    let message = error.to_string();
    if is_constraint_violation(&message) {
        WarehouseError::ConstraintViolation {
            table: table.to_string(),
            detail: message,
        }
    } else {
        WarehouseError::DuckDb(error)
    }
}

fn is_constraint_violation(message: &str) -> bool {
    message.contains("Constraint Error")
        || message.contains("Duplicate key")
        || message.contains("violates primary key")
}

/// Bucket width for progress events, chosen from the span of the data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BucketGranularity {
    Monthly,
    Weekly,
    Daily,
    Hourly,
}

impl BucketGranularity {
    pub(crate) fn for_span(span: Duration) -> Self {
        if span > Duration::days(365) {
            Self::Monthly
        } else if span > Duration::days(30) {
            Self::Weekly
        } else if span > Duration::days(1) {
            Self::Daily
        } else {
            Self::Hourly
        }
    }

    pub(crate) fn label(self, timestamp: Timestamp) -> String {
        let date = timestamp.date();
        match self {
            Self::Monthly => format!("{}-{:02}", date.year(), u8::from(date.month())),
            Self::Weekly => {
                let (year, week, _) = date.to_iso_week_date();
                format!("{year}-W{week:02}")
            }
            Self::Daily => date.to_string(),
            Self::Hourly => format!("{date} {:02}:00", timestamp.hour()),
        }
    }
}

/// Row counts per time bucket, in bucket order.
pub(crate) fn progress_buckets(rows: &[PreparedRow]) -> BTreeMap<String, usize> {
    let mut buckets = BTreeMap::new();
    let Some(first) = rows.iter().map(|row| row.timestamp).min() else {
        return buckets;
    };
    let last = rows.iter().map(|row| row.timestamp).max().unwrap_or(first);
    let granularity = BucketGranularity::for_span(last.duration_since(first));

    for row in rows {
        *buckets.entry(granularity.label(row.timestamp)).or_insert(0) += 1;
    }
    buckets
}

fn log_progress(table: &TableName, rows: &[PreparedRow]) {
    if !tracing::enabled!(tracing::Level::DEBUG) {
        return;
    }
    for (bucket, count) in progress_buckets(rows) {
        debug!(table = %table, %bucket, rows = count, "write progress");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).expect("timestamp")
    }

    fn code(raw: &str) -> EntityCode {
        EntityCode::parse(raw).expect("code")
    }

    fn table() -> TableName {
        TableName::parse("px").expect("table")
    }

    fn frame_with_repeat() -> LongFrame {
        let mut frame = LongFrame::default();
        frame.push(ts("2024-01-02"), code("A"), Some(1.0));
        frame.push(ts("2024-01-02"), code("B"), None);
        frame.push(ts("2024-01-02"), code("A"), Some(2.0));
        frame
    }

    #[test]
    fn update_keeps_the_last_value_for_a_repeated_key() {
        let prepared =
            prepare_rows(&frame_with_repeat(), ConflictPolicy::Update, &table()).expect("prepare");
        assert_eq!(prepared.rows.len(), 1);
        assert_eq!(prepared.rows[0].value, 2.0);
        assert_eq!(prepared.skipped_null, 1);
        assert_eq!(prepared.collapsed, 1);
    }

    #[test]
    fn ignore_keeps_the_first_value_for_a_repeated_key() {
        let prepared =
            prepare_rows(&frame_with_repeat(), ConflictPolicy::Ignore, &table()).expect("prepare");
        assert_eq!(prepared.rows.len(), 1);
        assert_eq!(prepared.rows[0].value, 1.0);
    }

    #[test]
    fn error_policy_rejects_a_repeated_key_before_storage() {
        let error = prepare_rows(&frame_with_repeat(), ConflictPolicy::Error, &table())
            .expect_err("must fail");
        assert!(matches!(error, WarehouseError::ConstraintViolation { .. }));
    }

    #[test]
    fn insert_sql_carries_the_policy_clause() {
        let update = insert_sql(&table(), 2, ConflictPolicy::Update);
        assert!(update.starts_with("INSERT INTO \"px\""));
        assert!(update.contains("), (CAST"));
        assert!(update.ends_with("DO UPDATE SET value = EXCLUDED.value"));
        assert!(insert_sql(&table(), 1, ConflictPolicy::Ignore).ends_with("DO NOTHING"));
        assert!(!insert_sql(&table(), 1, ConflictPolicy::Error).contains("ON CONFLICT"));
    }

    #[test]
    fn bucket_granularity_follows_the_span() {
        assert_eq!(
            BucketGranularity::for_span(Duration::days(400)),
            BucketGranularity::Monthly
        );
        assert_eq!(
            BucketGranularity::for_span(Duration::days(60)),
            BucketGranularity::Weekly
        );
        assert_eq!(
            BucketGranularity::for_span(Duration::days(5)),
            BucketGranularity::Daily
        );
        assert_eq!(
            BucketGranularity::for_span(Duration::hours(6)),
            BucketGranularity::Hourly
        );
    }

    #[test]
    fn progress_buckets_count_rows_per_day() {
        let rows: Vec<PreparedRow> = ["2024-01-01", "2024-01-01", "2024-01-03"]
            .iter()
            .map(|raw| PreparedRow {
                timestamp: ts(raw),
                entity_code: code("A"),
                value: 1.0,
            })
            .collect();

        let buckets = progress_buckets(&rows);
        assert_eq!(buckets.get("2024-01-01"), Some(&2));
        assert_eq!(buckets.get("2024-01-03"), Some(&1));
    }

    #[test]
    fn constraint_messages_are_recognised() {
        assert!(is_constraint_violation(
            "Constraint Error: Duplicate key \"timestamp: 2024-01-02 00:00:00\" violates primary key constraint"
        ));
        assert!(!is_constraint_violation("Catalog Error: Table with name px does not exist"));
    }
}
