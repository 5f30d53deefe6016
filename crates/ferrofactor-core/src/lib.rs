//! # Ferrofactor Core
//!
//! Domain types and pure transforms shared by the ferrofactor warehouse and CLI.
//!
//! ## Overview
//!
//! Metric data arrives as a wide matrix (time × entity) and is persisted as a
//! long relation `(timestamp, entity_code, metric_name, value)`. This crate owns
//! everything about that translation that does not touch the database:
//!
//! - **Validated identifiers** for entity codes, table names and metric labels
//! - **Frames**: [`WideFrame`], [`LongFrame`] and the multifactor [`MetricFrame`]
//! - **Tabular normalization** of matrices, column maps, long tables and files
//! - **Response envelope** used by the CLI
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`domain`] | Timestamps, identifiers, conflict policy, join kind |
//! | [`frame`] | Wide, long and metric frames |
//! | [`normalize`] | [`TabularSource`] → canonical frames |
//! | [`loader`] | CSV/JSON file loading collaborator |
//! | [`envelope`] | CLI response envelope |
//! | [`error`] | Validation and data-format errors |
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrofactor_core::{ColumnMap, Normalizer, TabularSource};
//!
//! let source = ColumnMap::new(vec!["2024-01-02".into(), "2024-01-03".into()])
//!     .with_column("AAPL", vec![Some(185.6), None])
//!     .with_column("AAPL", vec![Some(1.0), Some(2.0)]);
//!
//! let frame = Normalizer::default().to_wide(TabularSource::Columns(source))?;
//! assert_eq!(frame.shape(), (2, 2));
//! assert!(frame.column("AAPL_1").is_some());
//! # Ok::<(), ferrofactor_core::DataFormatError>(())
//! ```

pub mod domain;
pub mod envelope;
pub mod error;
pub mod frame;
pub mod loader;
pub mod normalize;

pub use domain::{
    ConflictPolicy, EntityCode, JoinKind, MetricLabel, MetricTable, TableName, Timestamp,
    DEFAULT_NAMESPACE, MAX_ENTITY_CODE_LEN, MAX_IDENTIFIER_LEN, MAX_METRIC_LABEL_LEN,
};
pub use envelope::{Envelope, EnvelopeError, EnvelopeMeta};
pub use error::{CoreError, DataFormatError, ValidationError};
pub use frame::{LongFrame, LongRow, MetricFrame, MetricRow, WideFrame};
pub use loader::{FileLoader, TabularLoader};
pub use normalize::{
    disambiguate_columns, ColumnMap, LongTabular, Normalizer, RawTable, TabularSource,
};
