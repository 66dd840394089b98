use std::io;

use serde_json::Value;

use super::format::{
    Align, Column, array_field, key_value_rows, render_table_or_blocks, terminal_width,
    text_field,
};

const SEVERITIES: [&str; 5] = ["over", "exact", "mild", "big", "huge"];

pub fn render_trials(data: &Value) -> io::Result<String> {
    let substances = array_field(data, "substances");
    if substances.is_empty() {
        return Err(io::Error::other("trials output requires substances"));
    }

    let mut lines = vec![
        format!(
            "Ran {} random pool(s) for {} on a {} cadence.",
            text_field(data, "runs"),
            text_field(data, "year"),
            text_field(data, "cadence"),
        ),
        String::new(),
    ];
    let checkpoints = array_field(data, "checkpoints")
        .iter()
        .filter_map(Value::as_str)
        .collect::<Vec<&str>>();
    lines.extend(key_value_rows(
        &[
            (
                "Checkpoints:",
                format!("{} ({})", checkpoints.join(", "), text_field(data, "projection")),
            ),
            ("Runs short:", text_field(data, "runs_with_undercount")),
        ],
        2,
    ));

    let mut columns = vec![Column {
        name: "Substance",
        align: Align::Left,
    }];
    columns.extend(SEVERITIES.iter().map(|name| Column {
        name: *name,
        align: Align::Right,
    }));
    columns.push(Column {
        name: "worst",
        align: Align::Right,
    });

    let rows = substances
        .iter()
        .map(|substance| {
            let mut row = vec![text_field(substance, "name")];
            row.extend(SEVERITIES.iter().map(|severity| {
                substance
                    .get("severity_counts")
                    .and_then(|counts| counts.get(*severity))
                    .and_then(Value::as_u64)
                    .unwrap_or(0)
                    .to_string()
            }));
            row.push(text_field(substance, "worst_overcount"));
            row
        })
        .collect::<Vec<Vec<String>>>();
    lines.push(String::new());
    lines.extend(render_table_or_blocks(&columns, &rows, terminal_width(), "Substance"));

    for substance in substances {
        let histogram = substance
            .get("overcount_histogram")
            .and_then(Value::as_object)
            .map(|levels| {
                let mut pairs = levels
                    .iter()
                    .filter_map(|(level, count)| {
                        Some((level.parse::<i64>().ok()?, count.as_u64()?))
                    })
                    .collect::<Vec<(i64, u64)>>();
                pairs.sort_unstable();
                pairs
                    .iter()
                    .map(|(level, count)| format!("{level:+}: {count}"))
                    .collect::<Vec<String>>()
                    .join(", ")
            })
            .unwrap_or_default();
        lines.push(format!(
            "  {} final overcount -> runs: {histogram}",
            text_field(substance, "name")
        ));
    }

    Ok(lines.join("\n"))
}
