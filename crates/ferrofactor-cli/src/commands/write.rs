use ferrofactor_core::{TableName, TabularSource};
use ferrofactor_warehouse::{Warehouse, WriteOutcome};
use serde_json::json;

use crate::cli::{DeleteArgs, InsertArgs};
use crate::error::CliError;

use super::{to_filter, to_policy, CommandResult};

pub fn insert(args: &InsertArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    let source = TabularSource::Path(args.file.clone());
    let policy = to_policy(args.on_conflict);

    let outcome = if args.incremental {
        warehouse.append_incremental(&name, source, policy)?
    } else {
        warehouse.insert(&name, source, policy)?
    };

    let summary = match &outcome {
        WriteOutcome::Written(summary) => summary,
        WriteOutcome::TableMissing => {
            return CommandResult::not_found(format!(
                "table {name} does not exist; create it first"
            ))
        }
    };

    let mut result = CommandResult::ok(serde_json::to_value(&outcome)?);
    if summary.is_noop() {
        result = result.with_warning("no non-null values to write");
    }
    if summary.collapsed > 0 {
        result = result.with_warning(format!(
            "{} input rows repeated a (timestamp, entity) key and were collapsed",
            summary.collapsed
        ));
    }
    Ok(result)
}

pub fn delete(args: &DeleteArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    let filter = to_filter(&args.filter)?;

    match warehouse.delete(&name, &filter)? {
        Some(deleted) => Ok(CommandResult::ok(json!({
            "table": name.to_string(),
            "deleted": deleted,
        }))),
        None => CommandResult::not_found(format!("table {name} does not exist")),
    }
}
