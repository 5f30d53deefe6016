use ferrofactor_core::TableName;
use ferrofactor_warehouse::{AuditThresholds, Warehouse};
use time::Duration;

use crate::cli::AuditArgs;
use crate::error::CliError;

use super::CommandResult;

/// Audit findings surface as envelope warnings so `--strict` can fail on them.
pub fn run(args: &AuditArgs, warehouse: &mut Warehouse) -> Result<CommandResult, CliError> {
    if !(0.0..=1.0).contains(&args.null_threshold) {
        return Err(CliError::Argument(format!(
            "null threshold must be within 0..=1, got {}",
            args.null_threshold
        )));
    }
    if args.max_gap_hours <= 0 {
        return Err(CliError::Argument(String::from(
            "max gap must be a positive number of hours",
        )));
    }

    let name = TableName::parse(&args.table)?;
    let thresholds = AuditThresholds {
        null_rate: args.null_threshold,
        check_duplicates: !args.skip_duplicates,
        check_continuity: !args.skip_continuity,
        max_gap: Duration::hours(args.max_gap_hours),
    };

    let report = warehouse.audit(&name, &thresholds);
    let findings: Vec<String> = report
        .issues
        .iter()
        .map(|issue| format!("issue: {issue}"))
        .chain(report.warnings.iter().cloned())
        .collect();

    Ok(CommandResult::ok(serde_json::to_value(&report)?).with_warnings(findings))
}
