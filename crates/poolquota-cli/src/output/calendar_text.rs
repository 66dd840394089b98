use std::io;

use serde_json::Value;

use super::format::{
    Align, Column, array_field, float_field, render_table_or_blocks, terminal_width, text_field,
};

const COLUMNS: [Column<'static>; 5] = [
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
        name: "Days",
        align: Align::Right,
    },
    Column {
        name: "Share of year",
        align: Align::Right,
    },
];

pub fn render_calendar(data: &Value) -> io::Result<String> {
    let periods = array_field(data, "periods");
    if periods.is_empty() {
        return Err(io::Error::other("calendar output requires periods"));
    }

    let rows = periods
        .iter()
        .enumerate()
        .map(|(index, period)| {
            vec![
                (index + 1).to_string(),
                text_field(period, "start"),
                text_field(period, "end"),
                text_field(period, "day_count"),
                float_field(period, "fraction_of_year", 4),
            ]
        })
        .collect::<Vec<Vec<String>>>();

    let mut lines = vec![
        format!(
            "{} {} period(s) from {} through {} ({} days in the year).",
            periods.len(),
            text_field(data, "cadence"),
            text_field(data, "inception"),
            text_field(data, "year_end"),
            text_field(data, "days_in_year"),
        ),
        String::new(),
    ];
    lines.extend(render_table_or_blocks(&COLUMNS, &rows, terminal_width(), "Period"));
    Ok(lines.join("\n"))
}
