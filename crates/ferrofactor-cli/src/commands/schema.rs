use ferrofactor_core::{MetricTable, TableName, TabularSource};
use ferrofactor_warehouse::{DropOutcome, Warehouse};
use serde_json::json;

use crate::cli::{CreateArgs, TableArgs, TablesArgs};
use crate::error::CliError;

use super::{to_policy, CommandResult};

pub fn create(args: &CreateArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let table = MetricTable::parse(&args.table, args.label.as_deref())?;
    let source = args.from.clone().map(TabularSource::from);
    let loading = source.is_some();

    let outcome =
        warehouse.create_table(&table, source, args.overwrite, to_policy(args.on_conflict))?;

    let mut result = CommandResult::ok(serde_json::to_value(&outcome)?);
    if !outcome.created() && loading {
        result = result.with_warning(format!(
            "table {} already exists; input was not loaded (use --overwrite or insert)",
            outcome.table
        ));
    }
    Ok(result)
}

pub fn drop(args: &TableArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    match warehouse.drop_table(&name)? {
        DropOutcome::Dropped => Ok(CommandResult::ok(json!({
            "table": name.to_string(),
            "status": DropOutcome::Dropped,
        }))),
        DropOutcome::NotFound => CommandResult::not_found(format!("table {name} does not exist")),
    }
}

pub fn tables(args: &TablesArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let namespace = args.namespace.as_deref();
    let tables = warehouse.list_tables(namespace)?;
    Ok(CommandResult::ok(json!({
        "namespace": namespace.unwrap_or(ferrofactor_core::DEFAULT_NAMESPACE),
        "tables": tables,
    })))
}

pub fn info(args: &TableArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    let name = TableName::parse(&args.table)?;
    match warehouse.table_info(&name)? {
        Some(info) => Ok(CommandResult::ok(serde_json::to_value(info)?)),
        None => CommandResult::not_found(format!("table {name} does not exist")),
    }
}
