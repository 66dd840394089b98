use std::io;

use serde_json::Value;

use super::format::{
    Align, Column, array_field, float_field, key_value_rows, render_table_or_blocks,
    terminal_width, text_field,
};

const PERIOD_COLUMNS: [Column<'static>; 8] = [
    Column {
        name: "Period",
        align: Align::Right,
    },
    Column {
        name: "Start",
        align: Align::Left,
    },
    Column {
        name: "End",
        align: Align::Left,
    },
    Column {
        name: "Headcount",
        align: Align::Right,
    },
    Column {
        name: "Predicted",
        align: Align::Right,
    },
    Column {
        name: "Truth",
        align: Align::Right,
    },
    Column {
        name: "Error",
        align: Align::Right,
    },
    Column {
        name: "Overcount",
        align: Align::Right,
    },
];

pub fn render_run(data: &Value) -> io::Result<String> {
    let trackers = array_field(data, "trackers");
    let periods = array_field(data, "periods");
    if trackers.is_empty() {
        return Err(io::Error::other("run output requires at least one tracker"));
    }

    let mut lines = vec![
        format!(
            "Planned {} substance(s) over {} {} period(s), {} to {}.",
            trackers.len(),
            periods.len(),
            text_field(data, "cadence"),
            text_field(data, "inception"),
            text_field(data, "year_end"),
        ),
        String::new(),
    ];

    let checkpoints = array_field(data, "checkpoints")
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<&str>>();
    let mut summary = vec![
        (
            "Population:",
            format!("{} ({})", text_field(data, "path"), text_field(data, "format")),
        ),
        (
            "Checkpoints:",
            if checkpoints.is_empty() {
                "none".to_string()
            } else {
                format!("{} ({})", checkpoints.join(", "), text_field(data, "projection"))
            },
        ),
    ];
    if let Some(percent) = data.get("zero_chance_percent").and_then(Value::as_u64) {
        summary.push((
            "Zero avoidance:",
            format!(
                "{percent}% chance, raised {} prediction(s)",
                text_field(data, "zero_avoidance_forced")
            ),
        ));
    }
    lines.extend(key_value_rows(&summary, 2));

    let width = terminal_width();
    for tracker in trackers {
        lines.push(String::new());
        lines.extend(render_tracker(tracker, width));
    }

    let stale = data
        .get("stale_operations")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if stale > 0 {
        lines.push(String::new());
        lines.push(format!(
            "Warning: {stale} stale predict/correct call(s) were ignored."
        ));
    }

    let mut footer = Vec::new();
    if let Some(persisted) = data.get("persisted") {
        footer.push((
            "Saved state:",
            format!(
                "{} in {}",
                text_field(persisted, "run_key"),
                text_field(persisted, "db_path")
            ),
        ));
    }
    if data.get("csv_path").is_some_and(Value::is_string) {
        footer.push(("CSV report:", text_field(data, "csv_path")));
    }
    if !footer.is_empty() {
        lines.push(String::new());
        lines.extend(key_value_rows(&footer, 0));
    }

    Ok(lines.join("\n"))
}

fn render_tracker(tracker: &Value, width: usize) -> Vec<String> {
    let mut lines = vec![format!(
        "{} (fraction {}, minimum {} per period)",
        text_field(tracker, "name"),
        float_field(tracker, "fraction", 2),
        text_field(tracker, "minimum_tests_per_period"),
    )];

    let rows = array_field(tracker, "periods")
        .iter()
        .map(|row| {
            let index = row
                .get("period_index")
                .and_then(Value::as_u64)
                .map(|value| (value + 1).to_string())
                .unwrap_or_else(|| "-".to_string());
            vec![
                index,
                text_field(row, "start"),
                text_field(row, "end"),
                text_field(row, "start_count"),
                text_field(row, "predicted"),
                float_field(row, "truth", 2),
                float_field(row, "overcount_error", 2),
                text_field(row, "cumulative_overcount"),
            ]
        })
        .collect::<Vec<Vec<String>>>();
    lines.extend(render_table_or_blocks(&PERIOD_COLUMNS, &rows, width, "Period"));

    for entry in array_field(tracker, "reconciliation") {
        lines.push(format!(
            "  Checkpoint {}: +{} test(s)",
            text_field(entry, "checkpoint"),
            text_field(entry, "amount"),
        ));
    }
    lines.push(format!(
        "  Prescribed {}, required {}, final overcount {} ({}).",
        text_field(tracker, "total_tests_prescribed"),
        text_field(tracker, "tests_required"),
        text_field(tracker, "final_overcount"),
        text_field(tracker, "severity"),
    ));
    lines
}
