//! Time-range and entity predicates pushed down into metric-table scans.

use ::duckdb::types::Value;
use ferrofactor_core::{EntityCode, Timestamp};
use serde::Serialize;

/// Inclusive time bounds plus an optional entity allow-list.
///
/// An empty allow-list means "every entity".
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScanFilter {
    pub start: Option<Timestamp>,
    pub end: Option<Timestamp>,
    pub entity_codes: Vec<EntityCode>,
}

impl ScanFilter {
    #[must_use]
    pub fn start(mut self, start: Timestamp) -> Self {
        self.start = Some(start);
        self
    }

    #[must_use]
    pub fn end(mut self, end: Timestamp) -> Self {
        self.end = Some(end);
        self
    }

    #[must_use]
    pub fn entities(mut self, codes: impl IntoIterator<Item = EntityCode>) -> Self {
        self.entity_codes.extend(codes);
        self
    }

    /// True when no condition is set.
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none() && self.entity_codes.is_empty()
    }

    /// SQL conditions, each using positional parameters, and their values in order.
    pub(crate) fn conditions(&self) -> (Vec<String>, Vec<Value>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(start) = self.start {
            conditions.push(String::from("timestamp >= CAST(? AS TIMESTAMP)"));
            params.push(Value::Text(start.to_sql_string()));
        }
        if let Some(end) = self.end {
            conditions.push(String::from("timestamp <= CAST(? AS TIMESTAMP)"));
            params.push(Value::Text(end.to_sql_string()));
        }
        if !self.entity_codes.is_empty() {
            let placeholders = vec!["?"; self.entity_codes.len()].join(", ");
            conditions.push(format!("entity_code IN ({placeholders})"));
            params.extend(
                self.entity_codes
                    .iter()
                    .map(|code| Value::Text(code.as_str().to_owned())),
            );
        }

        (conditions, params)
    }

    /// `WHERE ...` clause (or an empty string) with extra leading conditions.
    pub(crate) fn where_clause(&self, extra: &[&str]) -> (String, Vec<Value>) {
        let (mut conditions, params) = self.conditions();
        for (position, condition) in extra.iter().enumerate() {
            conditions.insert(position, (*condition).to_owned());
        }

        if conditions.is_empty() {
            (String::new(), params)
        } else {
            (format!(" WHERE {}", conditions.join(" AND ")), params)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(raw: &str) -> Timestamp {
        Timestamp::parse(raw).expect("timestamp")
    }

    #[test]
    fn empty_filter_renders_no_clause() {
        let (clause, params) = ScanFilter::default().where_clause(&[]);
        assert!(clause.is_empty());
        assert!(params.is_empty());
        assert!(ScanFilter::default().is_empty());
    }

    #[test]
    fn bounds_and_codes_render_in_parameter_order() {
        let filter = ScanFilter::default()
            .start(ts("2024-01-01"))
            .end(ts("2024-01-31"))
            .entities([
                EntityCode::parse("AAPL").expect("code"),
                EntityCode::parse("MSFT").expect("code"),
            ]);

        let (clause, params) = filter.where_clause(&["value IS NOT NULL"]);
        assert_eq!(
            clause,
            " WHERE value IS NOT NULL AND timestamp >= CAST(? AS TIMESTAMP) \
             AND timestamp <= CAST(? AS TIMESTAMP) AND entity_code IN (?, ?)"
        );
        assert_eq!(params.len(), 4);
        assert_eq!(params[0], Value::Text(String::from("2024-01-01 00:00:00")));
        assert_eq!(params[3], Value::Text(String::from("MSFT")));
    }
}
