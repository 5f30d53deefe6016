//! In-memory frame shapes.
//!
//! | Type | Shape |
//! |------|-------|
//! | [`WideFrame`] | time index × entity columns, nullable cells |
//! | [`LongFrame`] | `(timestamp, entity_code, value)` rows |
//! | [`MetricFrame`] | `(date, code, metric_label, value)` rows from a multifactor join |

use std::collections::{BTreeMap, BTreeSet, HashSet};

use serde::Serialize;

use crate::{DataFormatError, EntityCode, JoinKind, Timestamp};

/// Matrix keyed by a strictly increasing time index and unique entity columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WideFrame {
    index: Vec<Timestamp>,
    columns: Vec<EntityCode>,
    #[serde(rename = "data")]
    cells: Vec<Vec<Option<f64>>>,
}

impl WideFrame {
    /// Build a frame from row-major cells.
    ///
    /// Fails when the shape is inconsistent, the index is not strictly
    /// increasing, or a column label repeats.
    pub fn new(
        index: Vec<Timestamp>,
        columns: Vec<EntityCode>,
        cells: Vec<Vec<Option<f64>>>,
    ) -> Result<Self, DataFormatError> {
        if cells.len() != index.len() {
            return Err(DataFormatError::RaggedRow {
                row: cells.len().min(index.len()),
                expected: index.len(),
                found: cells.len(),
            });
        }
        for (row, values) in cells.iter().enumerate() {
            if values.len() != columns.len() {
                return Err(DataFormatError::RaggedRow {
                    row,
                    expected: columns.len(),
                    found: values.len(),
                });
            }
        }
        for pair in index.windows(2) {
            if pair[0] == pair[1] {
                return Err(DataFormatError::DuplicateTimestamp {
                    value: pair[0].to_string(),
                });
            }
            if pair[0] > pair[1] {
                return Err(DataFormatError::UnsortedIndex);
            }
        }
        let mut seen = HashSet::with_capacity(columns.len());
        for column in &columns {
            if !seen.insert(column) {
                return Err(DataFormatError::DuplicateColumn {
                    name: column.to_string(),
                });
            }
        }

        let cells = cells
            .into_iter()
            .map(|row| row.into_iter().map(present).collect())
            .collect();

        Ok(Self {
            index,
            columns,
            cells,
        })
    }

    /// Pivot long rows into a frame with sorted index and sorted columns.
    ///
    /// Entities without a value at some timestamp become missing cells.
    pub fn pivot<I>(rows: I) -> Result<Self, DataFormatError>
    where
        I: IntoIterator<Item = (Timestamp, EntityCode, Option<f64>)>,
    {
        let mut grid: BTreeMap<Timestamp, BTreeMap<EntityCode, Option<f64>>> = BTreeMap::new();
        let mut columns = BTreeSet::new();

        for (timestamp, entity, value) in rows {
            columns.insert(entity.clone());
            let row = grid.entry(timestamp).or_default();
            if row.insert(entity.clone(), present(value)).is_some() {
                return Err(DataFormatError::DuplicateCell {
                    timestamp: timestamp.to_string(),
                    entity: entity.to_string(),
                });
            }
        }

        let columns: Vec<EntityCode> = columns.into_iter().collect();
        let mut index = Vec::with_capacity(grid.len());
        let mut cells = Vec::with_capacity(grid.len());
        for (timestamp, row) in grid {
            index.push(timestamp);
            cells.push(
                columns
                    .iter()
                    .map(|column| row.get(column).copied().flatten())
                    .collect(),
            );
        }

        Ok(Self {
            index,
            columns,
            cells,
        })
    }

    pub fn index(&self) -> &[Timestamp] {
        &self.index
    }

    pub fn columns(&self) -> &[EntityCode] {
        &self.columns
    }

    /// `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        (self.index.len(), self.columns.len())
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty() || self.columns.is_empty()
    }

    pub fn rows(&self) -> impl Iterator<Item = (Timestamp, &[Option<f64>])> + '_ {
        self.index
            .iter()
            .copied()
            .zip(self.cells.iter().map(Vec::as_slice))
    }

    /// Value at `(timestamp, code)`, `None` when absent or missing.
    pub fn get(&self, timestamp: Timestamp, code: &str) -> Option<f64> {
        let row = self.index.binary_search(&timestamp).ok()?;
        let column = self.column_position(code)?;
        self.cells[row][column]
    }

    pub fn column(&self, code: &str) -> Option<Vec<Option<f64>>> {
        let column = self.column_position(code)?;
        Some(self.cells.iter().map(|row| row[column]).collect())
    }

    /// Number of missing cells in a column.
    pub fn null_count(&self, code: &str) -> Option<usize> {
        let column = self.column_position(code)?;
        Some(self.cells.iter().filter(|row| row[column].is_none()).count())
    }

    /// Keep only the first `rows` timestamps.
    pub fn truncate_rows(&mut self, rows: usize) {
        self.index.truncate(rows);
        self.cells.truncate(rows);
    }

    /// Stack entity columns into rows, timestamp-major, keeping missing cells.
    pub fn to_long(&self) -> LongFrame {
        let mut rows = Vec::with_capacity(self.index.len() * self.columns.len());
        for (timestamp, values) in self.rows() {
            for (entity_code, value) in self.columns.iter().zip(values) {
                rows.push(LongRow {
                    timestamp,
                    entity_code: entity_code.clone(),
                    value: *value,
                });
            }
        }
        LongFrame { rows }
    }

    /// Align two frames on their time index.
    ///
    /// Columns of `self` come first. A code present on both sides becomes
    /// `<code>_x` and `<code>_y`. Timestamps missing from one side give
    /// missing cells for that side's columns.
    pub fn merge(&self, right: &Self, kind: JoinKind) -> Result<Self, DataFormatError> {
        let index: Vec<Timestamp> = match kind {
            JoinKind::Left => self.index.clone(),
            JoinKind::Right => right.index.clone(),
            JoinKind::Inner => self
                .index
                .iter()
                .copied()
                .filter(|timestamp| right.index.binary_search(timestamp).is_ok())
                .collect(),
            JoinKind::Outer => self
                .index
                .iter()
                .chain(&right.index)
                .copied()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };

        let shared: HashSet<&EntityCode> = self
            .columns
            .iter()
            .filter(|code| right.columns.contains(code))
            .collect();
        let suffixed = |code: &EntityCode, suffix: &str| {
            if shared.contains(code) {
                EntityCode::parse(&format!("{code}_{suffix}"))
            } else {
                Ok(code.clone())
            }
        };
        let mut columns = Vec::with_capacity(self.columns.len() + right.columns.len());
        for code in &self.columns {
            columns.push(suffixed(code, "x")?);
        }
        for code in &right.columns {
            columns.push(suffixed(code, "y")?);
        }

        let cells = index
            .iter()
            .map(|timestamp| {
                let mut row = self.row_or_missing(*timestamp);
                row.extend(right.row_or_missing(*timestamp));
                row
            })
            .collect();

        Self::new(index, columns, cells)
    }

    fn row_or_missing(&self, timestamp: Timestamp) -> Vec<Option<f64>> {
        match self.index.binary_search(&timestamp) {
            Ok(row) => self.cells[row].clone(),
            Err(_) => vec![None; self.columns.len()],
        }
    }

    fn column_position(&self, code: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.as_str() == code)
    }
}

/// NaN and infinities count as missing values.
fn present(value: Option<f64>) -> Option<f64> {
    value.filter(|value| value.is_finite())
}

/// One long-form observation; a missing value survives until write time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LongRow {
    pub timestamp: Timestamp,
    pub entity_code: EntityCode,
    pub value: Option<f64>,
}

/// Ordered long-form observations, not necessarily unique or sorted.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LongFrame {
    rows: Vec<LongRow>,
}

impl LongFrame {
    pub fn new(rows: Vec<LongRow>) -> Self {
        rows.into_iter().collect()
    }

    pub fn push(&mut self, timestamp: Timestamp, entity_code: EntityCode, value: Option<f64>) {
        self.rows.push(LongRow {
            timestamp,
            entity_code,
            value: present(value),
        });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[LongRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<LongRow> {
        self.rows
    }

    pub fn non_null_count(&self) -> usize {
        self.rows.iter().filter(|row| row.value.is_some()).count()
    }

    /// Stable sort by timestamp; rows sharing a timestamp keep their order.
    pub fn sort_by_timestamp(&mut self) {
        self.rows.sort_by_key(|row| row.timestamp);
    }

    /// Drop every row at or before `cutoff`.
    pub fn retain_after(&mut self, cutoff: Timestamp) {
        self.rows.retain(|row| row.timestamp > cutoff);
    }
}

impl FromIterator<LongRow> for LongFrame {
    fn from_iter<T: IntoIterator<Item = LongRow>>(iter: T) -> Self {
        Self {
            rows: iter
                .into_iter()
                .map(|row| LongRow {
                    value: present(row.value),
                    ..row
                })
                .collect(),
        }
    }
}

/// A labelled observation produced by a multifactor join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRow {
    pub date: Timestamp,
    pub code: EntityCode,
    pub metric_label: String,
    pub value: f64,
}

/// Long-format result spanning several metric tables, ordered by
/// `(date, code, metric_label)`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct MetricFrame {
    rows: Vec<MetricRow>,
}

impl MetricFrame {
    pub fn new(rows: Vec<MetricRow>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[MetricRow] {
        &self.rows
    }

    pub fn metric_labels(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|row| row.metric_label.as_str()).collect()
    }

    pub fn codes(&self) -> BTreeSet<&EntityCode> {
        self.rows.iter().map(|row| &row.code).collect()
    }

    /// Rows carrying one metric label.
    pub fn for_metric<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a MetricRow> + 'a {
        self.rows.iter().filter(move |row| row.metric_label == label)
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

    #[test]
    fn new_rejects_unsorted_or_duplicated_index() {
        let err = WideFrame::new(
            vec![ts("2024-01-02"), ts("2024-01-01")],
            vec![code("A")],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        )
        .expect_err("unsorted");
        assert!(matches!(err, DataFormatError::UnsortedIndex));

        let err = WideFrame::new(
            vec![ts("2024-01-01"), ts("2024-01-01")],
            vec![code("A")],
            vec![vec![Some(1.0)], vec![Some(2.0)]],
        )
        .expect_err("duplicate");
        assert!(matches!(err, DataFormatError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn new_rejects_ragged_rows_and_repeated_columns() {
        let err = WideFrame::new(
            vec![ts("2024-01-01")],
            vec![code("A"), code("B")],
            vec![vec![Some(1.0)]],
        )
        .expect_err("ragged");
        assert!(matches!(err, DataFormatError::RaggedRow { row: 0, .. }));

        let err = WideFrame::new(
            vec![ts("2024-01-01")],
            vec![code("A"), code("A")],
            vec![vec![Some(1.0), Some(2.0)]],
        )
        .expect_err("repeated");
        assert!(matches!(err, DataFormatError::DuplicateColumn { .. }));
    }

    #[test]
    fn pivot_sorts_rows_and_columns_and_fills_gaps() {
        let frame = WideFrame::pivot(vec![
            (ts("2024-01-02"), code("B"), Some(4.0)),
            (ts("2024-01-01"), code("B"), Some(2.0)),
            (ts("2024-01-01"), code("A"), Some(1.0)),
        ])
        .expect("pivot");

        assert_eq!(frame.shape(), (2, 2));
        assert_eq!(frame.columns(), &[code("A"), code("B")]);
        assert_eq!(frame.get(ts("2024-01-02"), "A"), None);
        assert_eq!(frame.get(ts("2024-01-02"), "B"), Some(4.0));
        assert_eq!(frame.null_count("A"), Some(1));
    }

    #[test]
    fn pivot_rejects_duplicate_cells() {
        let err = WideFrame::pivot(vec![
            (ts("2024-01-01"), code("A"), Some(1.0)),
            (ts("2024-01-01"), code("A"), Some(2.0)),
        ])
        .expect_err("duplicate");
        assert!(matches!(err, DataFormatError::DuplicateCell { .. }));
    }

    #[test]
    fn to_long_keeps_missing_cells_in_timestamp_major_order() {
        let frame = WideFrame::new(
            vec![ts("2024-01-01"), ts("2024-01-02")],
            vec![code("B"), code("A")],
            vec![vec![Some(1.0), None], vec![Some(3.0), Some(4.0)]],
        )
        .expect("frame");

        let long = frame.to_long();
        assert_eq!(long.len(), 4);
        assert_eq!(long.non_null_count(), 3);
        assert_eq!(long.rows()[0].entity_code, code("B"));
        assert_eq!(long.rows()[1].value, None);
    }

    #[test]
    fn non_finite_values_become_missing_cells() {
        let frame = WideFrame::new(
            vec![ts("2024-01-01")],
            vec![code("A"), code("B")],
            vec![vec![Some(f64::NAN), Some(f64::INFINITY)]],
        )
        .expect("frame");
        assert_eq!(frame.null_count("A"), Some(1));
        assert_eq!(frame.null_count("B"), Some(1));

        let pivoted = WideFrame::pivot(vec![(ts("2024-01-01"), code("A"), Some(f64::NAN))])
            .expect("pivot");
        assert_eq!(pivoted.null_count("A"), Some(1));

        let mut long = LongFrame::new(vec![LongRow {
            timestamp: ts("2024-01-01"),
            entity_code: code("A"),
            value: Some(f64::NAN),
        }]);
        long.push(ts("2024-01-02"), code("A"), Some(f64::NEG_INFINITY));
        long.push(ts("2024-01-03"), code("A"), Some(1.5));
        assert_eq!(long.non_null_count(), 1);
    }

    fn sides() -> (WideFrame, WideFrame) {
        let left = WideFrame::new(
            vec![ts("2024-01-01"), ts("2024-01-02")],
            vec![code("A"), code("B")],
            vec![vec![Some(1.0), Some(10.0)], vec![Some(2.0), Some(20.0)]],
        )
        .expect("left");
        let right = WideFrame::new(
            vec![ts("2024-01-02"), ts("2024-01-03")],
            vec![code("A"), code("C")],
            vec![vec![Some(200.0), Some(7.0)], vec![Some(300.0), None]],
        )
        .expect("right");
        (left, right)
    }

    #[test]
    fn merge_suffixes_shared_codes_and_keeps_left_columns_first() {
        let (left, right) = sides();
        let merged = left.merge(&right, JoinKind::Inner).expect("merge");

        assert_eq!(merged.columns(), &[code("A_x"), code("B"), code("A_y"), code("C")]);
        assert_eq!(merged.index(), &[ts("2024-01-02")]);
        assert_eq!(merged.get(ts("2024-01-02"), "A_x"), Some(2.0));
        assert_eq!(merged.get(ts("2024-01-02"), "A_y"), Some(200.0));
    }

    #[test]
    fn merge_kind_decides_which_timestamps_survive() {
        let (left, right) = sides();

        let merged = left.merge(&right, JoinKind::Left).expect("left");
        assert_eq!(merged.index(), &[ts("2024-01-01"), ts("2024-01-02")]);
        assert_eq!(merged.get(ts("2024-01-01"), "C"), None);
        assert_eq!(merged.get(ts("2024-01-01"), "B"), Some(10.0));

        let merged = left.merge(&right, JoinKind::Right).expect("right");
        assert_eq!(merged.index(), &[ts("2024-01-02"), ts("2024-01-03")]);
        assert_eq!(merged.get(ts("2024-01-03"), "A_x"), None);
        assert_eq!(merged.get(ts("2024-01-03"), "A_y"), Some(300.0));

        let merged = left.merge(&right, JoinKind::Outer).expect("outer");
        assert_eq!(merged.shape(), (3, 4));
        assert_eq!(merged.null_count("B"), Some(1));
        assert_eq!(merged.null_count("C"), Some(2));
    }

    #[test]
    fn merge_fails_when_a_suffixed_code_is_too_long() {
        let long_code = "X".repeat(crate::MAX_ENTITY_CODE_LEN);
        let one = WideFrame::new(
            vec![ts("2024-01-01")],
            vec![code(&long_code)],
            vec![vec![Some(1.0)]],
        )
        .expect("frame");

        let err = one.merge(&one, JoinKind::Inner).expect_err("too long");
        assert!(matches!(err, DataFormatError::Validation(_)));
    }
}
