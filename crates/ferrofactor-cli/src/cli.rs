//! CLI argument definitions for ferrofactor.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `create` | Create a metric table, optionally loading a file |
//! | `drop` | Drop a metric table |
//! | `insert` | Upsert a file into an existing table |
//! | `query` | Read a table back as a wide frame |
//! | `join` | Labelled long rows across several tables |
//! | `merge` | Two tables aligned on the time index |
//! | `audit` | Data-quality report for one table |
//! | `delete` | Delete rows by time range and entity |
//! | `tables` | List metric tables in a namespace |
//! | `info` | Columns and row count of a table |
//! | `stats` | Per-entity descriptive statistics |
//!
//! # Global Options
//!
//! | Option | Default | Description |
//! |--------|---------|-------------|
//! | `--db` | `$FERROFACTOR_HOME/warehouse.duckdb` | Database file |
//! | `--format` | `json` | Output format (json, table) |
//! | `--pretty` | `false` | Pretty-print JSON output |
//! | `--strict` | `false` | Treat warnings as errors |
//! | `--log-level` | `warn` | Log filter when `RUST_LOG` is unset |
//!
//! # Examples
//!
//! ```bash
//! ferrofactor create price_close --from close.csv --label close
//! ferrofactor query price_close --start 2024-01-01 --entities AAPL,MSFT --format table
//! ferrofactor join price_close factors.pb --start 2024-01-01 --pretty
//! ferrofactor merge price_close factors.pb --how outer --format table
//! ferrofactor audit price_close --strict
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Wide/long metric tables on a local DuckDB file.
#[derive(Debug, Parser)]
#[command(
    name = "ferrofactor",
    author,
    version,
    about = "Metric-table warehouse for time × entity data",
    long_about = "ferrofactor stores one metric per table in long form and hands it back as \
time × entity matrices. Features include:\n\
\n\
  • Idempotent upserts with update, ignore or error conflict policies\n\
  • Filtered wide reads and multifactor joins\n\
  • Data-quality audits\n\
\n\
Use 'ferrofactor <command> --help' for command-specific help."
)]
pub struct Cli {
    /// Database file; defaults to `warehouse.duckdb` under `FERROFACTOR_HOME`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Output format for results.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Pretty-print JSON output with indentation.
    #[arg(long, global = true, default_value_t = false)]
    pub pretty: bool,

    /// Treat warnings and errors as failures (exit code 5).
    #[arg(long, global = true, default_value_t = false)]
    pub strict: bool,

    /// Log filter directive used when `RUST_LOG` is not set.
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable layout for terminals.
    Table,
    /// Single JSON envelope.
    Json,
}

/// Collision handling on `(timestamp, entity_code, metric_name)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConflictArg {
    Update,
    Ignore,
    Error,
}

/// Which timestamps a merge keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum JoinKindArg {
    Inner,
    Left,
    Right,
    Outer,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a metric table.
    ///
    /// Without --overwrite an existing table is left alone and no data is
    /// written to it.
    ///
    ///   ferrofactor create price_close --from close.csv
    ///   ferrofactor create factors.pb --label book --overwrite
    Create(CreateArgs),

    /// Drop a metric table and its label.
    Drop(TableArgs),

    /// Upsert a CSV or JSON file into an existing table.
    ///
    ///   ferrofactor insert price_close close.csv --on-conflict ignore
    ///   ferrofactor insert price_close close.csv --incremental
    Insert(InsertArgs),

    /// Read a table as a time × entity matrix.
    Query(QueryArgs),

    /// Join several tables into labelled long rows.
    Join(JoinArgs),

    /// Align two tables on the time index as one wide matrix.
    ///
    /// Entity codes present in both tables get `_x` and `_y` suffixes.
    ///
    ///   ferrofactor merge price_close price_open --how left
    Merge(MergeArgs),

    /// Report null rates, duplicate keys and time-axis gaps.
    Audit(AuditArgs),

    /// Delete rows matching a time range and entity list.
    Delete(DeleteArgs),

    /// List metric tables.
    Tables(TablesArgs),

    /// Show columns, label and row count of a table.
    Info(TableArgs),

    /// Per-entity count, mean, std, min, quartiles and max.
    Stats(StatsArgs),
}

#[derive(Debug, Args)]
pub struct TableArgs {
    /// Table name, optionally `namespace.table`.
    pub table: String,
}

/// Time range and entity selection shared by reads, joins and deletes.
#[derive(Debug, Default, Args)]
pub struct FilterArgs {
    /// Inclusive lower bound on timestamp.
    #[arg(long)]
    pub start: Option<String>,

    /// Inclusive upper bound on timestamp.
    #[arg(long)]
    pub end: Option<String>,

    /// Entity codes to keep (comma separated).
    #[arg(long, value_delimiter = ',', num_args = 1..)]
    pub entities: Vec<String>,
}

#[derive(Debug, Args)]
pub struct CreateArgs {
    pub table: String,

    /// Metric label stored in `metric_name`; defaults to the table name.
    #[arg(long)]
    pub label: Option<String>,

    /// Initial data file (csv or json).
    #[arg(long)]
    pub from: Option<PathBuf>,

    /// Drop and recreate an existing table.
    #[arg(long, default_value_t = false)]
    pub overwrite: bool,

    #[arg(long, value_enum, default_value_t = ConflictArg::Update)]
    pub on_conflict: ConflictArg,
}

#[derive(Debug, Args)]
pub struct InsertArgs {
    pub table: String,

    /// Data file (csv or json).
    pub file: PathBuf,

    #[arg(long, value_enum, default_value_t = ConflictArg::Update)]
    pub on_conflict: ConflictArg,

    /// Only write rows newer than the latest stored timestamp.
    #[arg(long, default_value_t = false)]
    pub incremental: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    pub table: String,

    #[command(flatten)]
    pub filter: FilterArgs,

    /// Maximum number of rows to return.
    #[arg(long)]
    pub limit: Option<usize>,

    /// Apply --limit to scanned long rows instead of output rows.
    #[arg(long, default_value_t = false, requires = "limit")]
    pub limit_source_rows: bool,
}

#[derive(Debug, Args)]
pub struct JoinArgs {
    /// Tables to join.
    #[arg(required = true, num_args = 1..)]
    pub tables: Vec<String>,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct MergeArgs {
    pub left: String,

    pub right: String,

    #[arg(long, value_enum, default_value_t = JoinKindArg::Inner)]
    pub how: JoinKindArg,
}

#[derive(Debug, Args)]
pub struct AuditArgs {
    pub table: String,

    /// Null fraction above which a column is flagged.
    #[arg(long, default_value_t = 0.10)]
    pub null_threshold: f64,

    /// Largest step between timestamps, in hours, not reported as a gap.
    #[arg(long, default_value_t = 24)]
    pub max_gap_hours: i64,

    #[arg(long, default_value_t = false)]
    pub skip_duplicates: bool,

    #[arg(long, default_value_t = false)]
    pub skip_continuity: bool,
}

#[derive(Debug, Args)]
pub struct DeleteArgs {
    pub table: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}

#[derive(Debug, Args)]
pub struct TablesArgs {
    /// Namespace to list; defaults to `main`.
    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Debug, Args)]
pub struct StatsArgs {
    pub table: String,

    #[command(flatten)]
    pub filter: FilterArgs,
}
