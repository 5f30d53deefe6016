//! Behavior-driven tests for multifactor joins
//!
//! A join labels every row with the metric it came from, so the tests look
//! at labels, cardinality and filtering rather than at SQL.

use ferrofactor_core::{
    ColumnMap, ConflictPolicy, EntityCode, MetricTable, TableName, Timestamp,
};
use ferrofactor_warehouse::{
    JoinOutcome, JoinRequest, ScanFilter, Warehouse, WarehouseConfig,
};
use tempfile::{tempdir, TempDir};

fn ts(raw: &str) -> Timestamp {
    Timestamp::parse(raw).expect("timestamp")
}

fn code(raw: &str) -> EntityCode {
    EntityCode::parse(raw).expect("entity code")
}

fn name(raw: &str) -> TableName {
    TableName::parse(raw).expect("table name")
}

fn days(count: usize) -> Vec<String> {
    (1..=count).map(|day| format!("2024-01-{day:02}")).collect()
}

/// Warehouse with `px` (label "close", 3x2, one null) and `pb` (label
/// "book", 2x1 on entity A only).
fn seeded(temp: &TempDir) -> Warehouse {
    let mut warehouse =
        Warehouse::open(WarehouseConfig::at_home(temp.path().join("ferrofactor-home")))
            .expect("warehouse open");

    warehouse
        .create_table(
            &MetricTable::parse("px", Some("close")).expect("table"),
            Some(
                ColumnMap::new(days(3))
                    .with_column("A", vec![Some(10.0), Some(11.0), Some(12.0)])
                    .with_column("B", vec![Some(20.0), None, Some(22.0)])
                    .into(),
            ),
            false,
            ConflictPolicy::Update,
        )
        .expect("create px");
    warehouse
        .create_table(
            &MetricTable::parse("pb", Some("book")).expect("table"),
            Some(
                ColumnMap::new(days(2))
                    .with_column("A", vec![Some(1.5), Some(1.6)])
                    .into(),
            ),
            false,
            ConflictPolicy::Update,
        )
        .expect("create pb");
    warehouse
}

fn stored_rows(warehouse: &mut Warehouse, table: &str) -> usize {
    let rows = warehouse
        .table_info(&name(table))
        .expect("info")
        .expect("exists")
        .row_count;
    usize::try_from(rows).expect("row count fits")
}

#[test]
fn when_user_joins_two_metrics_every_stored_value_appears_once_with_its_label() {
    // Given: Two metric tables with different labels
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);

    // When: Both are joined without a filter
    let frame = warehouse
        .join_metrics(&JoinRequest::new([name("px"), name("pb")]))
        .expect("join")
        .into_frame()
        .expect("rows present");

    // Then: Row count is the sum of the stored non-null rows
    let expected = stored_rows(&mut warehouse, "px") + stored_rows(&mut warehouse, "pb");
    assert_eq!(frame.len(), expected);
    assert_eq!(frame.len(), 7);

    // And: Labels come from the tables' registry entries
    assert_eq!(
        frame.metric_labels().into_iter().collect::<Vec<_>>(),
        vec!["book", "close"]
    );
    assert_eq!(frame.for_metric("book").count(), 2);
}

#[test]
fn when_user_joins_metrics_rows_are_ordered_by_date_code_then_label() {
    // Given: Two overlapping tables
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);

    // When: They are joined
    let frame = warehouse
        .join_metrics(&JoinRequest::new([name("px"), name("pb")]))
        .expect("join")
        .into_frame()
        .expect("rows present");

    // Then: The first rows are day 1 / A with book before close, then day 1 / B
    let head: Vec<(Timestamp, &str, &str)> = frame
        .rows()
        .iter()
        .take(3)
        .map(|row| (row.date, row.code.as_str(), row.metric_label.as_str()))
        .collect();
    assert_eq!(
        head,
        vec![
            (ts("2024-01-01"), "A", "book"),
            (ts("2024-01-01"), "A", "close"),
            (ts("2024-01-01"), "B", "close"),
        ]
    );
}

#[test]
fn when_user_filters_a_join_the_filter_applies_to_every_table() {
    // Given: Two metric tables spanning three days
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);

    // When: The join is limited to entity A from day 2 onward
    let request = JoinRequest::new([name("px"), name("pb")]).filter(
        ScanFilter::default()
            .start(ts("2024-01-02"))
            .entities([code("A")]),
    );
    let frame = warehouse
        .join_metrics(&request)
        .expect("join")
        .into_frame()
        .expect("rows present");

    // Then: Only A rows on days 2 and 3 remain, from both tables
    assert_eq!(frame.len(), 3);
    assert!(frame.codes().into_iter().all(|entity| entity.as_str() == "A"));
    assert!(frame.rows().iter().all(|row| row.date >= ts("2024-01-02")));
}

#[test]
fn when_some_requested_tables_are_missing_the_rest_still_join() {
    // Given: One real table and one name that does not exist
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);

    // When: Both are requested, the real one twice
    let frame = warehouse
        .join_metrics(&JoinRequest::new([name("pb"), name("ghost"), name("pb")]))
        .expect("join")
        .into_frame()
        .expect("rows present");

    // Then: The missing table is skipped and duplicates are not double counted
    assert_eq!(frame.len(), 2);
    assert_eq!(
        frame.metric_labels().into_iter().collect::<Vec<_>>(),
        vec!["book"]
    );
}

#[test]
fn when_nothing_can_be_joined_the_two_empty_cases_stay_distinct() {
    // Given: A seeded warehouse
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);

    // When: Only missing tables are requested
    let no_tables = warehouse
        .join_metrics(&JoinRequest::new([name("ghost"), name("phantom")]))
        .expect("join");

    // Then: The outcome says no table was valid
    assert_eq!(no_tables, JoinOutcome::NoValidTables);

    // When: A real table is filtered down to nothing
    let no_rows = warehouse
        .join_metrics(
            &JoinRequest::new([name("px")])
                .filter(ScanFilter::default().start(ts("2030-01-01"))),
        )
        .expect("join");

    // Then: The outcome says rows were missing, not tables
    assert_eq!(no_rows, JoinOutcome::NoMatchingRows);
    assert!(no_rows.into_frame().is_none());
}

#[test]
fn when_tables_live_in_a_namespace_they_join_with_plain_tables() {
    // Given: A namespaced table next to a plain one
    let temp = tempdir().expect("tempdir");
    let mut warehouse = seeded(&temp);
    warehouse
        .create_table(
            &MetricTable::parse("factors.momentum", None).expect("table"),
            Some(
                ColumnMap::new(days(1))
                    .with_column("A", vec![Some(0.25)])
                    .into(),
            ),
            false,
            ConflictPolicy::Update,
        )
        .expect("create namespaced table");

    // When: It is joined with the plain table
    let frame = warehouse
        .join_metrics(&JoinRequest::new([name("factors.momentum"), name("pb")]))
        .expect("join")
        .into_frame()
        .expect("rows present");

    // Then: The namespaced table is labelled with its unqualified name
    assert_eq!(
        frame.metric_labels().into_iter().collect::<Vec<_>>(),
        vec!["book", "momentum"]
    );
    assert_eq!(frame.len(), 3);
}
