//! Tabular normalization: caller input in, canonical frames out.
//!
//! Every accepted input shape is one variant of [`TabularSource`], resolved
//! once here. Downstream code only ever sees a [`WideFrame`] or a
//! [`LongFrame`] with a parsed, ascending time axis.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use tracing::debug;

use crate::loader::{FileLoader, TabularLoader};
use crate::{DataFormatError, EntityCode, LongFrame, Timestamp, WideFrame};

/// Unparsed wide table: time labels × column labels, row-major cells.
///
/// Column labels may repeat; they are disambiguated during normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub index: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<f64>>>,
}

/// Ordered mapping of column label to a cell sequence aligned with `index`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    pub index: Vec<String>,
    pub columns: Vec<(String, Vec<Option<f64>>)>,
}

impl ColumnMap {
    pub fn new(index: Vec<String>) -> Self {
        Self {
            index,
            columns: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_column(mut self, name: impl Into<String>, cells: Vec<Option<f64>>) -> Self {
        self.columns.push((name.into(), cells));
        self
    }
}

/// Already-long input: a time label per row plus `code` and `value` columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LongTabular {
    pub index: Vec<String>,
    pub codes: Vec<String>,
    pub values: Vec<Option<f64>>,
}

/// Every input shape the normalizer accepts.
#[derive(Debug, Clone, PartialEq)]
pub enum TabularSource {
    Wide(RawTable),
    Columns(ColumnMap),
    Long(LongTabular),
    Path(PathBuf),
}

impl TabularSource {
    /// Short human description for logs and batch reports.
    pub fn describe(&self) -> String {
        match self {
            Self::Wide(table) => format!("wide table {}x{}", table.index.len(), table.columns.len()),
            Self::Columns(map) => format!("column map with {} keys", map.columns.len()),
            Self::Long(table) => format!("long table with {} rows", table.index.len()),
            Self::Path(path) => format!("file {}", path.display()),
        }
    }
}

impl From<RawTable> for TabularSource {
    fn from(value: RawTable) -> Self {
        Self::Wide(value)
    }
}

impl From<ColumnMap> for TabularSource {
    fn from(value: ColumnMap) -> Self {
        Self::Columns(value)
    }
}

impl From<LongTabular> for TabularSource {
    fn from(value: LongTabular) -> Self {
        Self::Long(value)
    }
}

impl From<PathBuf> for TabularSource {
    fn from(value: PathBuf) -> Self {
        Self::Path(value)
    }
}

/// Pure transform from [`TabularSource`] to canonical frames.
pub struct Normalizer {
    loader: Box<dyn TabularLoader + Send + Sync>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_loader(FileLoader)
    }
}

impl std::fmt::Debug for Normalizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer").finish_non_exhaustive()
    }
}

impl Normalizer {
    pub fn with_loader(loader: impl TabularLoader + Send + Sync + 'static) -> Self {
        Self {
            loader: Box::new(loader),
        }
    }

    /// Normalize into a wide frame sorted ascending by timestamp.
    pub fn to_wide(&self, source: TabularSource) -> Result<WideFrame, DataFormatError> {
        let frame = match source {
            TabularSource::Wide(table) => raw_to_wide(table)?,
            TabularSource::Columns(map) => raw_to_wide(columns_to_raw(map)?)?,
            TabularSource::Path(path) => raw_to_wide(self.loader.load(&path)?)?,
            TabularSource::Long(table) => {
                let long = long_to_frame(table)?;
                WideFrame::pivot(
                    long.into_rows()
                        .into_iter()
                        .map(|row| (row.timestamp, row.entity_code, row.value)),
                )?
            }
        };

        let (rows, columns) = frame.shape();
        debug!(rows, columns, "normalized tabular input to wide form");
        Ok(frame)
    }

    /// Normalize into long rows sorted ascending by timestamp.
    ///
    /// Missing cells are kept; they are only dropped at write time.
    pub fn to_long(&self, source: TabularSource) -> Result<LongFrame, DataFormatError> {
        let frame = match source {
            TabularSource::Long(table) => long_to_frame(table)?,
            other => self.to_wide(other)?.to_long(),
        };

        debug!(
            rows = frame.len(),
            non_null = frame.non_null_count(),
            "normalized tabular input to long form"
        );
        Ok(frame)
    }
}

/// Rename repeated labels: the first occurrence keeps its name, later ones get
/// `_1`, `_2`, … in order of appearance. Generated names never reuse a label
/// that is already present.
pub fn disambiguate_columns(names: &[String]) -> Vec<String> {
    let trimmed: Vec<&str> = names.iter().map(|name| name.trim()).collect();
    let mut taken: HashSet<String> = trimmed.iter().map(|name| (*name).to_owned()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut counters: HashMap<&str, usize> = HashMap::new();
    let mut output = Vec::with_capacity(names.len());

    for name in trimmed {
        if seen.insert(name.to_owned()) {
            output.push(name.to_owned());
            continue;
        }

        let counter = counters.entry(name).or_insert(0);
        let candidate = loop {
            *counter += 1;
            let candidate = format!("{name}_{counter}");
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(candidate.clone());
        seen.insert(candidate.clone());
        output.push(candidate);
    }

    output
}

fn columns_to_raw(map: ColumnMap) -> Result<RawTable, DataFormatError> {
    let expected = map.index.len();
    for (name, cells) in &map.columns {
        if cells.len() != expected {
            return Err(DataFormatError::RaggedColumn {
                column: name.clone(),
                expected,
                found: cells.len(),
            });
        }
    }

    let rows = (0..expected)
        .map(|row| map.columns.iter().map(|(_, cells)| cells[row]).collect())
        .collect();

    Ok(RawTable {
        index: map.index,
        columns: map.columns.into_iter().map(|(name, _)| name).collect(),
        rows,
    })
}

fn raw_to_wide(table: RawTable) -> Result<WideFrame, DataFormatError> {
    if table.rows.len() != table.index.len() {
        return Err(DataFormatError::RaggedColumn {
            column: String::from("<index>"),
            expected: table.index.len(),
            found: table.rows.len(),
        });
    }
    for (row, cells) in table.rows.iter().enumerate() {
        if cells.len() != table.columns.len() {
            return Err(DataFormatError::RaggedRow {
                row,
                expected: table.columns.len(),
                found: cells.len(),
            });
        }
    }

    let renamed = disambiguate_columns(&table.columns);
    if renamed != table.columns {
        debug!(columns = ?renamed, "disambiguated repeated column labels");
    }
    let columns = renamed
        .iter()
        .map(|name| EntityCode::parse(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = Vec::with_capacity(table.rows.len());
    for (row, (label, cells)) in table.index.iter().zip(table.rows).enumerate() {
        rows.push((parse_time(row, label)?, cells));
    }
    rows.sort_by_key(|(timestamp, _)| *timestamp);

    let (index, cells): (Vec<Timestamp>, Vec<Vec<Option<f64>>>) = rows.into_iter().unzip();
    WideFrame::new(index, columns, cells)
}

fn long_to_frame(table: LongTabular) -> Result<LongFrame, DataFormatError> {
    let expected = table.index.len();
    for (column, found) in [("code", table.codes.len()), ("value", table.values.len())] {
        if found != expected {
            return Err(DataFormatError::RaggedColumn {
                column: column.to_owned(),
                expected,
                found,
            });
        }
    }

    let mut frame = LongFrame::default();
    for (row, ((label, code), value)) in table
        .index
        .iter()
        .zip(&table.codes)
        .zip(table.values)
        .enumerate()
    {
        frame.push(parse_time(row, label)?, EntityCode::parse(code)?, value);
    }
    frame.sort_by_timestamp();
    Ok(frame)
}

fn parse_time(row: usize, label: &str) -> Result<Timestamp, DataFormatError> {
    Timestamp::parse(label).map_err(|_| DataFormatError::UnparseableTimestamp {
        row,
        value: label.to_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|label| (*label).to_owned()).collect()
    }

    #[test]
    fn repeated_columns_get_numeric_suffixes_in_order() {
        assert_eq!(
            disambiguate_columns(&labels(&["A", "A", "B"])),
            labels(&["A", "A_1", "B"])
        );
        assert_eq!(
            disambiguate_columns(&labels(&["A", "B", "A", "A"])),
            labels(&["A", "B", "A_1", "A_2"])
        );
    }

    #[test]
    fn generated_suffix_skips_existing_labels() {
        assert_eq!(
            disambiguate_columns(&labels(&["A", "A_1", "A"])),
            labels(&["A", "A_1", "A_2"])
        );
    }

    #[test]
    fn wide_input_is_sorted_by_time_and_disambiguated() {
        let source = TabularSource::Wide(RawTable {
            index: labels(&["2024-01-03", "2024-01-02"]),
            columns: labels(&["A", "A", "B"]),
            rows: vec![
                vec![Some(3.0), Some(30.0), None],
                vec![Some(2.0), Some(20.0), Some(200.0)],
            ],
        });

        let frame = Normalizer::default().to_wide(source).expect("normalize");
        let columns: Vec<&str> = frame.columns().iter().map(EntityCode::as_str).collect();
        assert_eq!(columns, vec!["A", "A_1", "B"]);
        assert_eq!(frame.index()[0].to_string(), "2024-01-02 00:00:00");
        assert_eq!(frame.column("A_1"), Some(vec![Some(20.0), Some(30.0)]));
    }

    #[test]
    fn unparseable_time_axis_is_a_format_error() {
        let source = TabularSource::Wide(RawTable {
            index: labels(&["2024-01-02", "not a date"]),
            columns: labels(&["A"]),
            rows: vec![vec![Some(1.0)], vec![Some(2.0)]],
        });

        let err = Normalizer::default().to_wide(source).expect_err("must fail");
        assert!(matches!(
            err,
            DataFormatError::UnparseableTimestamp { row: 1, .. }
        ));
    }

    #[test]
    fn duplicate_time_labels_are_rejected() {
        let source = TabularSource::Wide(RawTable {
            index: labels(&["2024-01-02", "20240102"]),
            columns: labels(&["A"]),
            rows: vec![vec![Some(1.0)], vec![Some(2.0)]],
        });

        let err = Normalizer::default().to_wide(source).expect_err("must fail");
        assert!(matches!(err, DataFormatError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn column_map_must_align_with_index() {
        let map = ColumnMap::new(labels(&["2024-01-02", "2024-01-03"]))
            .with_column("A", vec![Some(1.0), Some(2.0)])
            .with_column("B", vec![Some(1.0)]);

        let err = Normalizer::default()
            .to_wide(TabularSource::Columns(map))
            .expect_err("must fail");
        assert!(matches!(err, DataFormatError::RaggedColumn { ref column, .. } if column == "B"));
    }

    #[test]
    fn wide_to_long_keeps_nulls() {
        let map = ColumnMap::new(labels(&["2024-01-02", "2024-01-03"]))
            .with_column("A", vec![Some(1.0), None])
            .with_column("B", vec![Some(3.0), Some(4.0)]);

        let long = Normalizer::default()
            .to_long(TabularSource::Columns(map))
            .expect("normalize");
        assert_eq!(long.len(), 4);
        assert_eq!(long.non_null_count(), 3);
    }

    #[test]
    fn long_input_is_stably_sorted_by_time() {
        let source = TabularSource::Long(LongTabular {
            index: labels(&["2024-01-03", "2024-01-02", "2024-01-02"]),
            codes: labels(&["A", "B", "A"]),
            values: vec![Some(3.0), Some(2.0), Some(1.0)],
        });

        let long = Normalizer::default().to_long(source).expect("normalize");
        let codes: Vec<&str> = long
            .rows()
            .iter()
            .map(|row| row.entity_code.as_str())
            .collect();
        assert_eq!(codes, vec!["B", "A", "A"]);
    }

    #[test]
    fn long_input_pivots_to_wide() {
        let source = TabularSource::Long(LongTabular {
            index: labels(&["2024-01-02", "2024-01-02", "2024-01-03"]),
            codes: labels(&["B", "A", "A"]),
            values: vec![Some(2.0), Some(1.0), Some(3.0)],
        });

        let frame = Normalizer::default().to_wide(source).expect("normalize");
        assert_eq!(frame.shape(), (2, 2));
        assert_eq!(frame.column("B"), Some(vec![Some(2.0), None]));
    }

    struct FixedLoader;

    impl TabularLoader for FixedLoader {
        fn load(&self, _path: &std::path::Path) -> Result<RawTable, DataFormatError> {
            Ok(RawTable {
                index: labels(&["2024-01-02"]),
                columns: labels(&["X"]),
                rows: vec![vec![Some(9.0)]],
            })
        }
    }

    #[test]
    fn path_sources_go_through_the_injected_loader() {
        let normalizer = Normalizer::with_loader(FixedLoader);
        let frame = normalizer
            .to_wide(TabularSource::Path(PathBuf::from("anything.parquet")))
            .expect("normalize");
        assert_eq!(frame.column("X"), Some(vec![Some(9.0)]));
    }
}
