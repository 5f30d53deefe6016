//! # Ferrofactor Warehouse
//!
//! DuckDB-backed storage for wide/long metric tables.
//!
//! ## Overview
//!
//! Each metric lives in its own table holding long rows
//! `(timestamp, entity_code, metric_name, value)` keyed by all three key
//! columns. This crate translates between that layout and the wide matrices
//! callers work with.
//!
//! ### Features
//!
//! - **Schema management**: idempotent create, overwrite, drop, label registry
//! - **Upserts**: batched parameterised writes under `update`, `ignore` or `error`
//! - **Wide reads**: filtered scans pivoted back to time × entity frames
//! - **Multifactor joins**: labelled long results across many tables
//! - **Quality audits**: null rates, duplicate keys, time-axis gaps
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ferrofactor_core::{ColumnMap, ConflictPolicy, MetricTable, TableName};
//! use ferrofactor_warehouse::{ReadRequest, Warehouse, WarehouseConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut warehouse = Warehouse::open(WarehouseConfig::default())?;
//!
//!     let close = ColumnMap::new(vec!["2024-01-02".into(), "2024-01-03".into()])
//!         .with_column("AAPL", vec![Some(185.6), Some(184.3)])
//!         .with_column("MSFT", vec![Some(370.9), None]);
//!     let table = MetricTable::parse("price_close", Some("close"))?;
//!     warehouse.create_table(&table, Some(close.into()), false, ConflictPolicy::Update)?;
//!
//!     let frame = warehouse.read(&ReadRequest::new(TableName::parse("price_close")?))?;
//!     println!("{:?}", frame.map(|frame| frame.shape()));
//!     Ok(())
//! }
//! ```
//!
//! ## Logging
//!
//! Operations emit `tracing` events and spans and never install a subscriber;
//! the embedding application decides where they go.
//!
//! ## Tables
//!
//! | Table | Description |
//! |-------|-------------|
//! | `schema_migrations` | Applied migration versions |
//! | `ferrofactor_registry` | Metric table → metric label |
//! | any other base table | One metric table per metric |

pub mod audit;
pub mod catalog;
pub mod filter;
pub mod migrations;
pub mod multifactor;
pub mod reconstruct;
pub mod schema;
pub mod session;
pub mod upsert;

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use ::duckdb::Connection;
use ferrofactor_core::{
    ConflictPolicy, DataFormatError, JoinKind, MetricTable, Normalizer, TableName, TabularSource,
    ValidationError, WideFrame, DEFAULT_NAMESPACE,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use audit::{AuditThresholds, DateGap, QualityReport, QualitySummary};
pub use catalog::{ColumnInfo, EntityStatistics, TableInfo};
pub use filter::ScanFilter;
pub use multifactor::{JoinOutcome, JoinRequest};
pub use reconstruct::{ReadRequest, RowLimit};
pub use schema::{DropOutcome, EnsureOutcome};
pub use session::Session;
pub use upsert::{WriteOutcome, WriteSummary};

/// Errors that can occur during warehouse operations.
#[derive(Debug, Error)]
pub enum WarehouseError {
    /// `DuckDB` database error.
    #[error(transparent)]
    DuckDb(#[from] ::duckdb::Error),

    /// I/O error (file system operations).
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Identifier or value failed validation before reaching SQL.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Caller input could not be normalized.
    #[error(transparent)]
    DataFormat(#[from] DataFormatError),

    /// The session could not be opened or re-established.
    #[error("connection error: {0}")]
    Connection(String),

    /// Primary-key collision under the `error` conflict policy.
    #[error("constraint violation on {table}: {detail}")]
    ConstraintViolation { table: String, detail: String },

    /// Delete requested without any condition.
    #[error("delete requires at least one of start, end or entity codes")]
    EmptyPredicate,

    /// Request was rejected before execution.
    #[error("query rejected: {0}")]
    QueryRejected(String),
}

/// Configuration for the warehouse database.
#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    /// Root directory for ferrofactor data.
    pub home: PathBuf,
    /// Path to the `DuckDB` database file.
    pub db_path: PathBuf,
    /// Rows per multi-row `INSERT`.
    pub batch_size: usize,
    /// Reopen the session once when the liveness probe fails.
    pub reconnect: bool,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self::at_home(resolve_ferrofactor_home())
    }
}

impl WarehouseConfig {
    /// Defaults rooted at `home`, database at `<home>/warehouse.duckdb`.
    pub fn at_home(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        let db_path = home.join("warehouse.duckdb");
        Self {
            home,
            db_path,
            batch_size: 1_000,
            reconnect: true,
        }
    }
}

/// Result of [`Warehouse::create_table`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateOutcome {
    pub table: String,
    pub metric_label: String,
    pub ensured: EnsureOutcome,
    /// Present when initial data was supplied and the table was (re)created.
    pub write: Option<WriteSummary>,
}

impl CreateOutcome {
    pub fn created(&self) -> bool {
        self.ensured.created()
    }
}

/// The metric-table data-access layer over one `DuckDB` session.
pub struct Warehouse {
    config: WarehouseConfig,
    session: Session,
    normalizer: Normalizer,
}

impl std::fmt::Debug for Warehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Warehouse")
            .field("config", &self.config)
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

impl Warehouse {
    /// Open a warehouse with the specified configuration.
    pub fn open(config: WarehouseConfig) -> Result<Self, WarehouseError> {
        if let Some(parent) = config.db_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let session = Session::open(config.db_path.clone(), config.reconnect)?;
        let mut warehouse = Self {
            config,
            session,
            normalizer: Normalizer::default(),
        };
        warehouse.initialize()?;
        Ok(warehouse)
    }

    /// Replace the normalizer, e.g. to inject a different file loader.
    #[must_use]
    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Apply bookkeeping migrations.
    pub fn initialize(&mut self) -> Result<(), WarehouseError> {
        let connection = self.session.connection()?;
        migrations::apply_migrations(connection)?;
        Ok(())
    }

    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Get the path to the database file.
    pub fn db_path(&self) -> &Path {
        self.session.db_path()
    }

    // ---------------------------------------------------------------------
    // Schema management
    // ---------------------------------------------------------------------

    /// Whether a table with this unqualified name exists in any namespace.
    pub fn table_exists(&mut self, name: &TableName) -> Result<bool, WarehouseError> {
        let connection = self.session.connection()?;
        schema::table_exists(connection, name)
    }

    /// Create the table, or report that it already exists.
    ///
    /// With `overwrite` an existing table is dropped and created again.
    #[instrument(skip(self, table), fields(table = %table.name))]
    pub fn ensure_table(
        &mut self,
        table: &MetricTable,
        overwrite: bool,
    ) -> Result<EnsureOutcome, WarehouseError> {
        let connection = self.session.connection()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = schema::ensure_table(connection, table, overwrite);
        finalize_transaction(connection, result)
    }

    #[instrument(skip(self), fields(table = %name))]
    pub fn drop_table(&mut self, name: &TableName) -> Result<DropOutcome, WarehouseError> {
        let connection = self.session.connection()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = schema::drop_table(connection, name);
        finalize_transaction(connection, result)
    }

    /// The metric table at `name` with the label writes will use.
    pub fn metric_table(&mut self, name: &TableName) -> Result<Option<MetricTable>, WarehouseError> {
        let connection = self.session.connection()?;
        if !schema::relation_exists(connection, name)? {
            return Ok(None);
        }
        schema::resolve_metric_table(connection, name).map(Some)
    }

    /// Create a table and optionally load initial data, in one transaction.
    ///
    /// The source is normalized before anything is created, so malformed
    /// input leaves the database untouched. An existing table without
    /// `overwrite` is reported and left alone; no data is written to it.
    #[instrument(skip(self, table, source), fields(table = %table.name))]
    pub fn create_table(
        &mut self,
        table: &MetricTable,
        source: Option<TabularSource>,
        overwrite: bool,
        policy: ConflictPolicy,
    ) -> Result<CreateOutcome, WarehouseError> {
        let frame = match source {
            Some(source) => Some(self.normalizer.to_long(source)?),
            None => None,
        };

        let batch_size = self.config.batch_size;
        let connection = self.session.connection()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = (|| -> Result<CreateOutcome, WarehouseError> {
            let ensured = schema::ensure_table(connection, table, overwrite)?;
            let write = match (&frame, ensured.created()) {
                (Some(frame), true) => Some(upsert::write_frame(
                    connection, table, frame, policy, batch_size,
                )?),
                _ => None,
            };
            Ok(CreateOutcome {
                table: table.name.to_string(),
                metric_label: table.metric_label.to_string(),
                ensured,
                write,
            })
        })();

        finalize_transaction(connection, result)
    }

    /// Create several tables. One failing entry never stops the others.
    pub fn create_many(
        &mut self,
        entries: Vec<(MetricTable, TabularSource)>,
        overwrite: bool,
        policy: ConflictPolicy,
    ) -> BTreeMap<TableName, Result<CreateOutcome, WarehouseError>> {
        let mut outcomes = BTreeMap::new();
        for (table, source) in entries {
            let described = source.describe();
            let outcome = self.create_table(&table, Some(source), overwrite, policy);
            if let Err(error) = &outcome {
                warn!(
                    table = %table.name,
                    source = %described,
                    %error,
                    "batch import entry failed"
                );
            }
            outcomes.insert(table.name, outcome);
        }
        let failed = outcomes.values().filter(|outcome| outcome.is_err()).count();
        info!(tables = outcomes.len(), failed, "batch import finished");
        outcomes
    }

    // ---------------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------------

    /// Upsert long rows into an existing table.
    ///
    /// The metric label comes from the table's registry entry, never from the
    /// caller. Rows without a value are skipped.
    #[instrument(skip(self, frame), fields(table = %name, rows = frame.len()))]
    pub fn write(
        &mut self,
        name: &TableName,
        frame: &ferrofactor_core::LongFrame,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, WarehouseError> {
        let batch_size = self.config.batch_size;
        let connection = self.session.connection()?;
        if !schema::relation_exists(connection, name)? {
            warn!(table = %name, "write target does not exist");
            return Ok(WriteOutcome::TableMissing);
        }
        let table = schema::resolve_metric_table(connection, name)?;

        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = upsert::write_frame(connection, &table, frame, policy, batch_size);
        finalize_transaction(connection, result).map(WriteOutcome::Written)
    }

    /// Normalize a caller source and upsert it.
    pub fn insert(
        &mut self,
        name: &TableName,
        source: TabularSource,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, WarehouseError> {
        let frame = self.normalizer.to_long(source)?;
        self.write(name, &frame, policy)
    }

    /// Upsert only the rows newer than the latest stored timestamp.
    #[instrument(skip(self, source), fields(table = %name))]
    pub fn append_incremental(
        &mut self,
        name: &TableName,
        source: TabularSource,
        policy: ConflictPolicy,
    ) -> Result<WriteOutcome, WarehouseError> {
        let mut frame = self.normalizer.to_long(source)?;

        let connection = self.session.connection()?;
        if !schema::relation_exists(connection, name)? {
            warn!(table = %name, "incremental target does not exist");
            return Ok(WriteOutcome::TableMissing);
        }
        if let Some(latest) = catalog::max_timestamp(connection, name)? {
            let before = frame.len();
            frame.retain_after(latest);
            debug!(%latest, kept = frame.len(), dropped = before - frame.len(), "filtered to new rows");
        }

        self.write(name, &frame, policy)
    }

    /// Delete rows matching `filter`; `Ok(None)` when the table is missing.
    #[instrument(skip(self), fields(table = %name))]
    pub fn delete(
        &mut self,
        name: &TableName,
        filter: &ScanFilter,
    ) -> Result<Option<usize>, WarehouseError> {
        if filter.is_empty() {
            return Err(WarehouseError::EmptyPredicate);
        }
        let connection = self.session.connection()?;
        connection.execute_batch("BEGIN TRANSACTION")?;
        let result = catalog::delete_rows(connection, name, filter);
        finalize_transaction(connection, result)
    }

    // ---------------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------------

    /// Wide frame for the request, `Ok(None)` when the table is missing or
    /// nothing matches.
    #[instrument(skip(self, request), fields(table = %request.table))]
    pub fn read(&mut self, request: &ReadRequest) -> Result<Option<WideFrame>, WarehouseError> {
        let connection = self.session.connection()?;
        reconstruct::read_wide(connection, request)
    }

    /// Labelled long rows across every existing table in the request.
    #[instrument(skip(self, request), fields(tables = request.tables.len()))]
    pub fn join_metrics(&mut self, request: &JoinRequest) -> Result<JoinOutcome, WarehouseError> {
        let connection = self.session.connection()?;
        multifactor::join_metrics(connection, request)
    }

    /// Read two tables in full and align their wide frames on the time index.
    ///
    /// `Ok(None)` when either table is missing or holds no rows.
    #[instrument(skip(self, left, right), fields(left = %left, right = %right))]
    pub fn merge_tables(
        &mut self,
        left: &TableName,
        right: &TableName,
        kind: JoinKind,
    ) -> Result<Option<WideFrame>, WarehouseError> {
        let connection = self.session.connection()?;
        let mut sides = Vec::with_capacity(2);
        for name in [left, right] {
            match reconstruct::read_wide(connection, &ReadRequest::new(name.clone()))? {
                Some(frame) => sides.push(frame),
                None => {
                    warn!(table = %name, "merge input is missing or empty");
                    return Ok(None);
                }
            }
        }

        let merged = sides[0].merge(&sides[1], kind)?;
        let (rows, columns) = merged.shape();
        info!(rows, columns, "tables merged");
        Ok(Some(merged))
    }

    /// Audit a table. Connection failures are reported inside the report.
    #[instrument(skip(self), fields(table = %name))]
    pub fn audit(&mut self, name: &TableName, thresholds: &AuditThresholds) -> QualityReport {
        match self.session.connection() {
            Ok(connection) => audit::audit(connection, name, thresholds),
            Err(error) => QualityReport::unavailable(name, &error),
        }
    }

    pub fn statistics(
        &mut self,
        name: &TableName,
        filter: &ScanFilter,
    ) -> Result<Option<Vec<EntityStatistics>>, WarehouseError> {
        let connection = self.session.connection()?;
        catalog::statistics(connection, name, filter)
    }

    /// Metric tables in `namespace` (default `main`).
    pub fn list_tables(&mut self, namespace: Option<&str>) -> Result<Vec<String>, WarehouseError> {
        let connection = self.session.connection()?;
        catalog::list_tables(connection, namespace.unwrap_or(DEFAULT_NAMESPACE))
    }

    pub fn table_info(&mut self, name: &TableName) -> Result<Option<TableInfo>, WarehouseError> {
        let connection = self.session.connection()?;
        catalog::table_info(connection, name)
    }
}

/// Finalize a transaction, committing on success or rolling back on failure.
fn finalize_transaction<T>(
    connection: &Connection,
    result: Result<T, WarehouseError>,
) -> Result<T, WarehouseError> {
    match result {
        Ok(value) => {
            connection.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback) = connection.execute_batch("ROLLBACK") {
                warn!(%rollback, "rollback failed");
            }
            Err(error)
        }
    }
}

fn resolve_ferrofactor_home() -> PathBuf {
    if let Some(path) = env::var_os("FERROFACTOR_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".ferrofactor");
    }

    PathBuf::from(".ferrofactor")
}
