use ferrofactor_warehouse::WarehouseError;
use thiserror::Error;

/// CLI-level error categories mapped to exit codes.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Validation(#[from] ferrofactor_core::ValidationError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("strict mode failed: warnings={warning_count}, errors={error_count}")]
    StrictModeViolation {
        warning_count: usize,
        error_count: usize,
    },

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Validation(_)
            | Self::Argument(_)
            | Self::Warehouse(
                WarehouseError::Validation(_)
                | WarehouseError::DataFormat(_)
                | WarehouseError::EmptyPredicate
                | WarehouseError::QueryRejected(_),
            ) => 2,
            Self::StrictModeViolation { .. } => 5,
            Self::Warehouse(_) | Self::Serialization(_) | Self::Io(_) => 10,
        }
    }
}
