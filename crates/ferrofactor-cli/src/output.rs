use ferrofactor_core::Envelope;
use serde_json::Value;

use crate::cli::OutputFormat;
use crate::error::CliError;

pub fn render(
    envelope: &Envelope<Value>,
    format: OutputFormat,
    pretty: bool,
) -> Result<(), CliError> {
    match format {
        OutputFormat::Json => {
            let payload = if pretty {
                serde_json::to_string_pretty(envelope)?
            } else {
                serde_json::to_string(envelope)?
            };
            println!("{payload}");
        }
        OutputFormat::Table => render_table(envelope)?,
    }

    Ok(())
}

fn render_table(envelope: &Envelope<Value>) -> Result<(), CliError> {
    println!("request_id  : {}", envelope.meta.request_id);
    println!("schema      : {}", envelope.meta.schema_version);
    println!("operation   : {}", envelope.meta.operation);
    println!("generated_at: {}", envelope.meta.generated_at);
    println!("latency_ms  : {}", envelope.meta.latency_ms);

    if !envelope.meta.warnings.is_empty() {
        println!("warnings:");
        for warning in &envelope.meta.warnings {
            println!("  - {warning}");
        }
    }

    println!("data:");
    match frame_grid(&envelope.data) {
        Some(lines) => {
            for line in lines {
                println!("  {line}");
            }
        }
        None => {
            let pretty_data = serde_json::to_string_pretty(&envelope.data)?;
            for line in pretty_data.lines() {
                println!("  {line}");
            }
        }
    }

    if !envelope.errors.is_empty() {
        println!("errors:");
        for error in &envelope.errors {
            println!("  - {}: {}", error.code, error.message);
        }
    }

    Ok(())
}

/// Aligned grid for a serialized wide frame (`index`, `columns`, `data`),
/// `None` for any other payload. Missing cells print as `-`.
fn frame_grid(data: &Value) -> Option<Vec<String>> {
    let index = data.get("index")?.as_array()?;
    let columns = data.get("columns")?.as_array()?;
    let rows = data.get("data")?.as_array()?;

    let mut grid: Vec<Vec<String>> = Vec::with_capacity(rows.len() + 1);
    let mut header = vec![String::from("timestamp")];
    header.extend(columns.iter().map(cell_text));
    grid.push(header);

    for (label, row) in index.iter().zip(rows) {
        let mut line = vec![cell_text(label)];
        line.extend(row.as_array()?.iter().map(cell_text));
        grid.push(line);
    }

    let width = grid.first().map_or(0, Vec::len);
    let widths: Vec<usize> = (0..width)
        .map(|column| {
            grid.iter()
                .filter_map(|line| line.get(column))
                .map(String::len)
                .max()
                .unwrap_or(0)
        })
        .collect();

    Some(
        grid.iter()
            .map(|line| {
                line.iter()
                    .zip(&widths)
                    .map(|(cell, width)| format!("{cell:>width$}"))
                    .collect::<Vec<_>>()
                    .join("  ")
                    .trim_end()
                    .to_owned()
            })
            .collect(),
    )
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::from("-"),
        Value::String(text) => text.clone(),
        _ => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wide_frames_render_as_aligned_grid() {
        let data = json!({
            "index": ["2024-01-02 00:00:00", "2024-01-03 00:00:00"],
            "columns": ["A", "LONGNAME"],
            "data": [[1.5, null], [2.0, 30.25]],
        });

        let lines = frame_grid(&data).expect("grid");
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with("LONGNAME"));
        assert!(lines[1].ends_with('-'));
        assert!(lines[2].ends_with("30.25"));
        assert_eq!(lines[1].len(), lines[2].len());
    }

    #[test]
    fn other_payloads_fall_back_to_json() {
        assert!(frame_grid(&json!({ "tables": ["px"] })).is_none());
        assert!(frame_grid(&Value::Null).is_none());
    }
}
