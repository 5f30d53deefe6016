use thiserror::Error;

/// Identifier and contract errors exposed by `ferrofactor-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("entity code cannot be empty")]
    EmptyEntityCode,
    #[error("entity code length {len} exceeds max {max}")]
    EntityCodeTooLong { len: usize, max: usize },
    #[error("entity code contains a control character at index {index}")]
    EntityCodeControlChar { index: usize },

    #[error("metric label cannot be empty")]
    EmptyMetricLabel,
    #[error("metric label length {len} exceeds max {max}")]
    MetricLabelTooLong { len: usize, max: usize },
    #[error("metric label contains a control character at index {index}")]
    MetricLabelControlChar { index: usize },

    #[error("table name cannot be empty")]
    EmptyTableName,
    #[error("table name '{value}' has more than one namespace separator")]
    TableNameTooManyParts { value: String },
    #[error("identifier '{value}' must match [A-Za-z_][A-Za-z0-9_]* and be at most {max} characters")]
    InvalidIdentifier { value: String, max: usize },

    #[error("timestamp is not recognised: '{value}'")]
    InvalidTimestamp { value: String },

    #[error("invalid conflict policy '{value}', expected one of update, ignore, error")]
    InvalidConflictPolicy { value: String },

    #[error("invalid join kind '{value}', expected one of inner, left, right, outer")]
    InvalidJoinKind { value: String },

    #[error("request_id must be at least 8 characters")]
    InvalidRequestId,
    #[error("schema_version must match vMAJOR.MINOR.PATCH: '{value}'")]
    InvalidSchemaVersion { value: String },
    #[error("error code cannot be empty")]
    EmptyErrorCode,
    #[error("error message cannot be empty")]
    EmptyErrorMessage,
}

/// Failures while turning caller input into a canonical frame.
#[derive(Debug, Error)]
pub enum DataFormatError {
    #[error("row {row}: cannot convert '{value}' to a timestamp")]
    UnparseableTimestamp { row: usize, value: String },

    #[error("duplicate timestamp '{value}' in the time axis")]
    DuplicateTimestamp { value: String },

    #[error("duplicate cell for timestamp '{timestamp}' and entity '{entity}'")]
    DuplicateCell { timestamp: String, entity: String },

    #[error("duplicate column '{name}'")]
    DuplicateColumn { name: String },

    #[error("column '{column}' has {found} values but the index has {expected}")]
    RaggedColumn {
        column: String,
        expected: usize,
        found: usize,
    },

    #[error("row {row} has {found} cells but the frame has {expected} columns")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("row {row}, column '{column}': cannot parse '{value}' as a number")]
    UnparseableValue {
        row: usize,
        column: String,
        value: String,
    },

    #[error("time axis must be strictly increasing")]
    UnsortedIndex,

    #[error("input has no time axis column")]
    MissingIndex,

    #[error("unsupported file format '{extension}', expected csv or json")]
    UnsupportedFormat { extension: String },

    #[error("json input must be an object of columns: {0}")]
    NotTabular(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
