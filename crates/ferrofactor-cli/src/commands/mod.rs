mod audit;
mod read;
mod schema;
mod write;

use std::path::Path;
use std::time::Instant;

use ferrofactor_core::{
    ConflictPolicy, EntityCode, Envelope, EnvelopeError, EnvelopeMeta, JoinKind, Timestamp,
};
use ferrofactor_warehouse::{ScanFilter, Warehouse, WarehouseConfig};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::cli::{Cli, Command, ConflictArg, FilterArgs, JoinKindArg};
use crate::error::CliError;

const SCHEMA_VERSION: &str = "v1.0.0";

/// Error code carried by envelopes whose target table or rows are missing.
pub const NOT_FOUND: &str = "not_found";

pub struct CommandResult {
    pub data: Value,
    pub warnings: Vec<String>,
    pub errors: Vec<EnvelopeError>,
}

impl CommandResult {
    pub fn ok(data: Value) -> Self {
        Self {
            data,
            warnings: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Empty payload plus a `not_found` error.
    pub fn not_found(message: impl Into<String>) -> Result<Self, CliError> {
        Ok(Self::ok(Value::Null).with_error(EnvelopeError::new(NOT_FOUND, message)?))
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_warnings(mut self, warnings: impl IntoIterator<Item = String>) -> Self {
        self.warnings.extend(warnings);
        self
    }

    pub fn with_error(mut self, error: EnvelopeError) -> Self {
        self.errors.push(error);
        self
    }
}

pub fn run(cli: &Cli) -> Result<Envelope<Value>, CliError> {
    let started = Instant::now();
    let mut warehouse = open_warehouse(cli.db.as_deref())?;
    debug!(db = %warehouse.db_path().display(), "warehouse opened");

    let command_result = match &cli.command {
        Command::Create(args) => schema::create(args, &mut warehouse)?,
        Command::Drop(args) => schema::drop(args, &mut warehouse)?,
        Command::Tables(args) => schema::tables(args, &mut warehouse)?,
        Command::Info(args) => schema::info(args, &mut warehouse)?,
        Command::Insert(args) => write::insert(args, &mut warehouse)?,
        Command::Delete(args) => write::delete(args, &mut warehouse)?,
        Command::Query(args) => read::query(args, &mut warehouse)?,
        Command::Join(args) => read::join(args, &mut warehouse)?,
        Command::Merge(args) => read::merge(args, &mut warehouse)?,
        Command::Stats(args) => read::stats(args, &mut warehouse)?,
        Command::Audit(args) => audit::run(args, &mut warehouse)?,
    };

    let CommandResult {
        data,
        warnings,
        errors,
    } = command_result;

    let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    let mut meta = EnvelopeMeta::new(
        Uuid::new_v4().to_string(),
        SCHEMA_VERSION,
        operation(&cli.command),
        latency_ms,
    )?;
    for warning in warnings {
        meta.push_warning(warning);
    }

    Envelope::with_errors(meta, data, errors).map_err(CliError::from)
}

fn open_warehouse(db: Option<&Path>) -> Result<Warehouse, CliError> {
    let mut config = WarehouseConfig::default();
    if let Some(db) = db {
        config.db_path = db.to_path_buf();
    }
    Ok(Warehouse::open(config)?)
}

const fn operation(command: &Command) -> &'static str {
    match command {
        Command::Create(_) => "create",
        Command::Drop(_) => "drop",
        Command::Insert(_) => "insert",
        Command::Query(_) => "query",
        Command::Join(_) => "join",
        Command::Merge(_) => "merge",
        Command::Audit(_) => "audit",
        Command::Delete(_) => "delete",
        Command::Tables(_) => "tables",
        Command::Info(_) => "info",
        Command::Stats(_) => "stats",
    }
}

pub(crate) const fn to_policy(arg: ConflictArg) -> ConflictPolicy {
    match arg {
        ConflictArg::Update => ConflictPolicy::Update,
        ConflictArg::Ignore => ConflictPolicy::Ignore,
        ConflictArg::Error => ConflictPolicy::Error,
    }
}

pub(crate) const fn to_join_kind(arg: JoinKindArg) -> JoinKind {
    match arg {
        JoinKindArg::Inner => JoinKind::Inner,
        JoinKindArg::Left => JoinKind::Left,
        JoinKindArg::Right => JoinKind::Right,
        JoinKindArg::Outer => JoinKind::Outer,
    }
}

pub(crate) fn to_filter(args: &FilterArgs) -> Result<ScanFilter, CliError> {
    let mut filter = ScanFilter::default();
    if let Some(start) = &args.start {
        filter = filter.start(Timestamp::parse(start)?);
    }
    if let Some(end) = &args.end {
        filter = filter.end(Timestamp::parse(end)?);
    }
    let codes = args
        .entities
        .iter()
        .map(|code| EntityCode::parse(code))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(filter.entities(codes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_args_parse_into_scan_filter() {
        let args = FilterArgs {
            start: Some(String::from("2024-01-02")),
            end: None,
            entities: vec![String::from("AAPL"), String::from("MSFT")],
        };

        let filter = to_filter(&args).expect("filter");
        assert_eq!(
            filter.start,
            Some(Timestamp::parse("2024-01-02").expect("timestamp"))
        );
        assert_eq!(filter.entity_codes.len(), 2);
        assert!(to_filter(&FilterArgs::default()).expect("empty").is_empty());
    }

    #[test]
    fn bad_timestamps_are_validation_errors() {
        let args = FilterArgs {
            start: Some(String::from("yesterday")),
            ..FilterArgs::default()
        };
        let error = to_filter(&args).expect_err("must fail");
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn not_found_results_carry_one_error() {
        let result = CommandResult::not_found("table px does not exist").expect("result");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].code, NOT_FOUND);
        assert!(result.data.is_null());
    }
}
