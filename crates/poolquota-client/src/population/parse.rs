use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::calendar::{format_iso_date, looks_like_iso_date, year_end_of};
use crate::population::PopulationSeries;
use crate::{ClientError, ClientResult};

/// How the second column of a population file is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PopulationFormat {
    /// Each row is the headcount on that day.
    #[default]
    Absolute,
    /// Each row is the signed change in headcount on that day.
    Delta,
}

impl PopulationFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Delta => "delta",
        }
    }

    pub fn parse(value: &str) -> ClientResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "absolute" | "natural" => Ok(Self::Absolute),
            "delta" => Ok(Self::Delta),
            _ => Err(ClientError::invalid_argument(&format!(
                "Unknown population format `{value}`. Use `absolute` or `delta`."
            ))),
        }
    }
}

struct PopulationRow {
    row: usize,
    date: NaiveDate,
    value: i64,
}

pub fn parse_population(content: &str, format: PopulationFormat) -> ClientResult<PopulationSeries> {
    let rows = read_rows(content)?;
    if rows.is_empty() {
        return Err(ClientError::invalid_population(
            "Population file has no data rows.",
        ));
    }
    let year = rows[0].date.year();
    if let Some(stray) = rows.iter().find(|row| row.date.year() != year) {
        return Err(ClientError::invalid_population(&format!(
            "Row {} is dated {}, outside {year}; only one calendar year is supported.",
            stray.row,
            format_iso_date(&stray.date)
        )));
    }

    match format {
        PopulationFormat::Absolute => absolute_series(&rows),
        PopulationFormat::Delta => delta_series(&rows, year),
    }
}

/// Writes `date,count` rows that `parse_population` reads back as `Absolute`.
pub fn write_absolute(series: &PopulationSeries) -> ClientResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(["date", "count"])
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    for (date, count) in series.iter() {
        writer
            .write_record([format_iso_date(&date), count.to_string()])
            .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    String::from_utf8(bytes).map_err(|error| ClientError::internal_serialization(&error.to_string()))
}

/// Writes the first day's headcount followed by one row per day the headcount
/// changes, which `parse_population` reads back as `Delta`.
pub fn write_delta(series: &PopulationSeries) -> ClientResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer
        .write_record(["date", "change"])
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    let mut previous: Option<u32> = None;
    for (date, count) in series.iter() {
        let change = i64::from(count) - i64::from(previous.unwrap_or(0));
        if previous.is_none() || change != 0 {
            writer
                .write_record([format_iso_date(&date), change.to_string()])
                .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
        }
        previous = Some(count);
    }
    let bytes = writer
        .into_inner()
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    String::from_utf8(bytes).map_err(|error| ClientError::internal_serialization(&error.to_string()))
}

fn read_rows(content: &str) -> ClientResult<Vec<PopulationRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(content.as_bytes());

    let mut rows = Vec::new();
    for (index, record) in reader.records().enumerate() {
        let row = index + 1;
        let record = record
            .map_err(|_| ClientError::population_parse_failed(row, "row is malformed or not UTF-8"))?;
        if record.iter().all(|field| field.is_empty()) {
            continue;
        }
        let date_field = record.get(0).unwrap_or_default();
        if row == 1 && !looks_like_iso_date(date_field) {
            // Header row.
            continue;
        }
        if record.len() != 2 {
            return Err(ClientError::population_parse_failed(
                row,
                &format!("expected 2 columns, found {}", record.len()),
            ));
        }
        if !looks_like_iso_date(date_field) {
            return Err(ClientError::population_parse_failed(
                row,
                &format!("`{date_field}` is not a YYYY-MM-DD date"),
            ));
        }
        let date = NaiveDate::parse_from_str(date_field, "%Y-%m-%d").map_err(|_| {
            ClientError::population_parse_failed(row, &format!("`{date_field}` is not a real date"))
        })?;
        let value_field = record.get(1).unwrap_or_default();
        let value = value_field.parse::<i64>().map_err(|_| {
            ClientError::population_parse_failed(row, &format!("`{value_field}` is not an integer"))
        })?;
        rows.push(PopulationRow { row, date, value });
    }
    Ok(rows)
}

fn absolute_series(rows: &[PopulationRow]) -> ClientResult<PopulationSeries> {
    let mut counts = BTreeMap::new();
    for row in rows {
        let count = u32::try_from(row.value).map_err(|_| {
            ClientError::population_parse_failed(
                row.row,
                &format!("headcount {} must be between 0 and {}", row.value, u32::MAX),
            )
        })?;
        if counts.insert(row.date, count).is_some() {
            return Err(ClientError::population_parse_failed(
                row.row,
                &format!("{} appears more than once", format_iso_date(&row.date)),
            ));
        }
    }
    PopulationSeries::new(counts)
}

/// Inception is the first row with a positive change; days without a row keep
/// the previous headcount, and the series is padded through December 31.
fn delta_series(rows: &[PopulationRow], year: i32) -> ClientResult<PopulationSeries> {
    let mut sorted = rows.iter().collect::<Vec<&PopulationRow>>();
    sorted.sort_by_key(|row| row.date);

    let Some(first_positive) = sorted.iter().position(|row| row.value > 0) else {
        return Err(ClientError::invalid_population(
            "Delta population never rises above zero; no inception date found.",
        ));
    };

    let mut counts = BTreeMap::new();
    let mut headcount = 0i64;
    let mut next_day = sorted[first_positive].date;
    for row in &sorted[first_positive..] {
        while next_day < row.date {
            counts.insert(next_day, clamp_headcount(headcount));
            next_day += Duration::days(1);
        }
        headcount = (headcount + row.value).max(0);
        counts.insert(row.date, clamp_headcount(headcount));
        next_day = row.date + Duration::days(1);
    }

    let year_end = year_end_of(year)?;
    while next_day <= year_end {
        counts.insert(next_day, clamp_headcount(headcount));
        next_day += Duration::days(1);
    }
    PopulationSeries::new(counts)
}

fn clamp_headcount(value: i64) -> u32 {
    u32::try_from(value.max(0)).unwrap_or(u32::MAX)
}
