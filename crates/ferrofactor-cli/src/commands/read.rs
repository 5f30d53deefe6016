use ferrofactor_core::TableName;
use ferrofactor_warehouse::{JoinOutcome, JoinRequest, ReadRequest, RowLimit, Warehouse};

use crate::cli::{JoinArgs, MergeArgs, QueryArgs, StatsArgs};
use crate::error::CliError;

use super::{to_filter, to_join_kind, CommandResult};

pub fn query(args: &QueryArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    let mut request = ReadRequest::new(name.clone()).filter(to_filter(&args.filter)?);
    if let Some(rows) = args.limit {
        request = request.limit(if args.limit_source_rows {
            RowLimit::SourceRows(rows)
        } else {
            RowLimit::WideRows(rows)
        });
    }

    match warehouse.read(&request)? {
        Some(frame) => {
            let mut result = CommandResult::ok(serde_json::to_value(&frame)?);
            if args.limit_source_rows {
                result = result.with_warning(
                    "limit applied to scanned rows; the last timestamp may be incomplete",
                );
            }
            Ok(result)
        }
        None => CommandResult::not_found(format!("no rows in {name} match the request")),
    }
}

pub fn join(args: &JoinArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let tables = args
        .tables
        .iter()
        .map(|table| TableName::parse(table))
        .collect::<Result<Vec<_>, _>>()?;
    let request = JoinRequest::new(tables).filter(to_filter(&args.filter)?);

    match warehouse.join_metrics(&request)? {
        JoinOutcome::Rows(frame) => {
            let mut missing = Vec::new();
            for table in &request.tables {
                if warehouse.metric_table(table)?.is_none() {
                    missing.push(table.to_string());
                }
            }

            let mut result = CommandResult::ok(serde_json::to_value(&frame)?);
            if !missing.is_empty() {
                result =
                    result.with_warning(format!("skipped missing tables: {}", missing.join(", ")));
            }
            Ok(result)
        }
        JoinOutcome::NoValidTables => {
            CommandResult::not_found("none of the requested tables exist")
        }
        JoinOutcome::NoMatchingRows => {
            CommandResult::not_found("no non-null rows match the request")
        }
    }
}

pub fn merge(args: &MergeArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let left = TableName::parse(&args.left)?;
    let right = TableName::parse(&args.right)?;
    let kind = to_join_kind(args.how);

    match warehouse.merge_tables(&left, &right, kind)? {
        Some(frame) if !frame.is_empty() => Ok(CommandResult::ok(serde_json::to_value(&frame)?)),
        Some(_) => {
            CommandResult::not_found(format!("{kind} merge of {left} and {right} has no rows"))
        }
        None => CommandResult::not_found(format!("{left} or {right} is missing or empty")),
    }
}

pub fn stats(args: &StatsArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    let filter = to_filter(&args.filter)?;

    match warehouse.statistics(&name, &filter)? {
        Some(stats) if !stats.is_empty() => Ok(CommandResult::ok(serde_json::to_value(stats)?)),
        Some(_) => CommandResult::not_found(format!("no rows in {name} match the request")),
        None => CommandResult::not_found(format!("table {name} does not exist")),
    }
}
