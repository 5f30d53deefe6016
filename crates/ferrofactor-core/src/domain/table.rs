use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

use crate::ValidationError;

pub const MAX_IDENTIFIER_LEN: usize = 63;
pub const MAX_METRIC_LABEL_LEN: usize = 100;

/// Namespace used when a table name carries no prefix.
pub const DEFAULT_NAMESPACE: &str = "main";

/// Validated `[namespace.]table` identifier of a metric table.
///
/// Both parts are restricted to `[A-Za-z_][A-Za-z0-9_]*` so that they can be
/// double-quoted into SQL without escaping.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TableName {
    namespace: Option<String>,
    table: String,
}

impl TableName {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyTableName);
        }

        let mut parts = trimmed.split('.');
        let first = parts.next().unwrap_or_default();
        let second = parts.next();
        if parts.next().is_some() {
            return Err(ValidationError::TableNameTooManyParts {
                value: trimmed.to_owned(),
            });
        }

        let (namespace, table) = match second {
            Some(table) => (Some(validate_identifier(first)?), validate_identifier(table)?),
            None => (None, validate_identifier(first)?),
        };

        Ok(Self { namespace, table })
    }

    /// The bare table identifier, ignoring any namespace prefix.
    pub fn unqualified(&self) -> &str {
        &self.table
    }

    pub fn explicit_namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    /// Namespace the table lives in, `main` when none was given.
    pub fn namespace(&self) -> &str {
        self.namespace.as_deref().unwrap_or(DEFAULT_NAMESPACE)
    }

    /// SQL form with every part double-quoted.
    pub fn quoted(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("\"{namespace}\".\"{}\"", self.table),
            None => format!("\"{}\"", self.table),
        }
    }
}

impl Display for TableName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{namespace}.{}", self.table),
            None => f.write_str(&self.table),
        }
    }
}

impl TryFrom<String> for TableName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl TryFrom<&str> for TableName {
    type Error = ValidationError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<TableName> for String {
    fn from(value: TableName) -> Self {
        value.to_string()
    }
}

fn validate_identifier(value: &str) -> Result<String, ValidationError> {
    let invalid = || ValidationError::InvalidIdentifier {
        value: value.to_owned(),
        max: MAX_IDENTIFIER_LEN,
    };

    let mut chars = value.chars();
    let Some(first) = chars.next() else {
        return Err(invalid());
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err(invalid());
    }
    if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(invalid());
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(invalid());
    }

    Ok(value.to_owned())
}

/// Name of the quantity a metric table stores, e.g. `pb_ratio`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MetricLabel(String);

impl MetricLabel {
    pub fn parse(input: &str) -> Result<Self, ValidationError> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(ValidationError::EmptyMetricLabel);
        }

        let len = trimmed.chars().count();
        if len > MAX_METRIC_LABEL_LEN {
            return Err(ValidationError::MetricLabelTooLong {
                len,
                max: MAX_METRIC_LABEL_LEN,
            });
        }

        if let Some(index) = trimmed.chars().position(char::is_control) {
            return Err(ValidationError::MetricLabelControlChar { index });
        }

        Ok(Self(trimmed.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for MetricLabel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for MetricLabel {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MetricLabel> for String {
    fn from(value: MetricLabel) -> Self {
        value.0
    }
}

/// A stored metric relation and the label written into its `metric_name` column.
///
/// The label is fixed when the table is created and never derived again from
/// the table name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricTable {
    pub name: TableName,
    pub metric_label: MetricLabel,
}

impl MetricTable {
    pub fn new(name: TableName, metric_label: MetricLabel) -> Self {
        Self { name, metric_label }
    }

    /// Table whose label is its own unqualified name.
    pub fn self_labelled(name: TableName) -> Self {
        let metric_label = MetricLabel(name.unqualified().to_owned());
        Self { name, metric_label }
    }

    /// Parse a table name and an optional explicit label.
    pub fn parse(name: &str, metric_label: Option<&str>) -> Result<Self, ValidationError> {
        let name = TableName::parse(name)?;
        match metric_label {
            Some(label) => Ok(Self::new(name, MetricLabel::parse(label)?)),
            None => Ok(Self::self_labelled(name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_namespace_from_table() {
        let name = TableName::parse("factors.pb_ratio").expect("qualified");
        assert_eq!(name.unqualified(), "pb_ratio");
        assert_eq!(name.namespace(), "factors");
        assert_eq!(name.quoted(), "\"factors\".\"pb_ratio\"");
        assert_eq!(name.to_string(), "factors.pb_ratio");

        let bare = TableName::parse("px").expect("bare");
        assert_eq!(bare.namespace(), DEFAULT_NAMESPACE);
        assert_eq!(bare.explicit_namespace(), None);
        assert_eq!(bare.quoted(), "\"px\"");
    }

    #[test]
    fn rejects_identifiers_that_would_need_escaping() {
        for raw in ["px; DROP TABLE x", "1px", "a.b.c", "px\"", ".px", "px."] {
            assert!(TableName::parse(raw).is_err(), "{raw} should be rejected");
        }
    }

    #[test]
    fn self_labelled_table_uses_bare_name() {
        let table = MetricTable::parse("fundamental.pe_ttm", None).expect("table");
        assert_eq!(table.metric_label.as_str(), "pe_ttm");

        let explicit = MetricTable::parse("price_close", Some("close")).expect("table");
        assert_eq!(explicit.metric_label.as_str(), "close");
    }
}
