//! File loading collaborator for path-based tabular sources.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde_json::{Map, Value};
use tracing::debug;

use crate::normalize::RawTable;
use crate::DataFormatError;

/// Turns a file reference into an unparsed wide table.
pub trait TabularLoader {
    fn load(&self, path: &Path) -> Result<RawTable, DataFormatError>;
}

/// Loader for `.csv` and column-oriented `.json` files.
///
/// CSV: the first column holds the time axis, the header row names the
/// entities. JSON: `{ "<code>": { "<timestamp>": value | null } }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

impl TabularLoader for FileLoader {
    fn load(&self, path: &Path) -> Result<RawTable, DataFormatError> {
        let extension = path
            .extension()
            .and_then(|extension| extension.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let table = match extension.as_str() {
            "csv" => load_csv(path)?,
            "json" => load_json(path)?,
            _ => return Err(DataFormatError::UnsupportedFormat { extension }),
        };

        debug!(
            path = %path.display(),
            rows = table.index.len(),
            columns = table.columns.len(),
            "loaded tabular file"
        );
        Ok(table)
    }
}

fn load_csv(path: &Path) -> Result<RawTable, DataFormatError> {
    let file = File::open(path)?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(BufReader::new(file));

    let headers = reader.headers()?.clone();
    if headers.is_empty() {
        return Err(DataFormatError::MissingIndex);
    }
    let columns: Vec<String> = headers.iter().skip(1).map(str::to_owned).collect();

    let mut index = Vec::new();
    let mut rows = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record?;
        let mut fields = record.iter();
        let label = fields.next().unwrap_or_default().to_owned();

        let mut cells = Vec::with_capacity(columns.len());
        for (column, raw) in columns.iter().zip(fields) {
            cells.push(parse_cell(raw).ok_or_else(|| DataFormatError::UnparseableValue {
                row,
                column: column.clone(),
                value: raw.to_owned(),
            })?);
        }
        index.push(label);
        rows.push(cells);
    }

    Ok(RawTable {
        index,
        columns,
        rows,
    })
}

fn load_json(path: &Path) -> Result<RawTable, DataFormatError> {
    let file = File::open(path)?;
    let document: Value = serde_json::from_reader(BufReader::new(file))?;
    let Value::Object(columns) = document else {
        return Err(DataFormatError::NotTabular(String::from(
            "top-level value is not an object",
        )));
    };

    let mut index: Vec<String> = Vec::new();
    let mut parsed: Vec<(String, Map<String, Value>)> = Vec::with_capacity(columns.len());
    for (name, cells) in columns {
        let Value::Object(cells) = cells else {
            return Err(DataFormatError::NotTabular(format!(
                "column '{name}' is not an object keyed by timestamp"
            )));
        };
        for key in cells.keys() {
            if !index.contains(key) {
                index.push(key.clone());
            }
        }
        parsed.push((name, cells));
    }

    let mut rows = Vec::with_capacity(index.len());
    for (row, label) in index.iter().enumerate() {
        let mut cells = Vec::with_capacity(parsed.len());
        for (name, column) in &parsed {
            let cell = match column.get(label) {
                None | Some(Value::Null) => None,
                Some(Value::Number(number)) => number.as_f64(),
                Some(Value::String(text)) => {
                    parse_cell(text).ok_or_else(|| DataFormatError::UnparseableValue {
                        row,
                        column: name.clone(),
                        value: text.clone(),
                    })?
                }
                Some(other) => {
                    return Err(DataFormatError::UnparseableValue {
                        row,
                        column: name.clone(),
                        value: other.to_string(),
                    })
                }
            };
            cells.push(cell);
        }
        rows.push(cells);
    }

    Ok(RawTable {
        index,
        columns: parsed.into_iter().map(|(name, _)| name).collect(),
        rows,
    })
}

/// `Some(None)` for a missing marker, `None` when the text is not a number.
fn parse_cell(raw: &str) -> Option<Option<f64>> {
    let trimmed = raw.trim();
    if trimmed.is_empty()
        || ["nan", "null", "na", "none"]
            .iter()
            .any(|marker| trimmed.eq_ignore_ascii_case(marker))
    {
        return Some(None);
    }
    let value: f64 = trimmed.parse().ok()?;
    Some(value.is_finite().then_some(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn loads_csv_with_index_column_and_missing_markers() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("close.csv");
        fs::write(
            &path,
            "datetime,AAPL,MSFT\n2024-01-02,185.6,370.9\n2024-01-03,,NaN\n",
        )
        .expect("write csv");

        let table = FileLoader.load(&path).expect("load");
        assert_eq!(table.columns, vec!["AAPL", "MSFT"]);
        assert_eq!(table.index, vec!["2024-01-02", "2024-01-03"]);
        assert_eq!(table.rows[0], vec![Some(185.6), Some(370.9)]);
        assert_eq!(table.rows[1], vec![None, None]);
    }

    #[test]
    fn reports_non_numeric_csv_cells() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("bad.csv");
        fs::write(&path, "datetime,AAPL\n2024-01-02,abc\n").expect("write csv");

        let err = FileLoader.load(&path).expect_err("must fail");
        assert!(matches!(err, DataFormatError::UnparseableValue { row: 0, .. }));
    }

    #[test]
    fn loads_column_oriented_json() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("pb.json");
        fs::write(
            &path,
            r#"{"AAPL": {"2024-01-02": 45.1, "2024-01-03": null}, "MSFT": {"2024-01-03": 12.0}}"#,
        )
        .expect("write json");

        let table = FileLoader.load(&path).expect("load");
        assert_eq!(table.columns, vec!["AAPL", "MSFT"]);
        assert_eq!(table.index, vec!["2024-01-02", "2024-01-03"]);
        assert_eq!(table.rows[0], vec![Some(45.1), None]);
        assert_eq!(table.rows[1], vec![None, Some(12.0)]);
    }

    #[test]
    fn rejects_unknown_extensions_and_missing_files() {
        let temp = tempdir().expect("tempdir");
        let err = FileLoader
            .load(&temp.path().join("data.xlsx"))
            .expect_err("unsupported");
        assert!(matches!(err, DataFormatError::UnsupportedFormat { .. }));

        let err = FileLoader
            .load(&temp.path().join("missing.csv"))
            .expect_err("missing");
        assert!(matches!(err, DataFormatError::Io(_)));
    }
}
