use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Duration, NaiveDate};
use poolquota_client::calendar::{Cadence, PeriodCalendar};
use poolquota_client::population::PopulationSeries;
use poolquota_client::quota::{SubstanceQuotaTracker, SubstanceSpec};
use tempfile::{Builder, TempDir};

pub fn day(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
}

/// Builds a series from `(first_day, headcount)` steps; each step holds until
/// the next one and the last holds through December 31.
pub fn stepped_year(steps: &[(NaiveDate, u32)]) -> PopulationSeries {
    let mut counts = BTreeMap::new();
    for (index, (start, count)) in steps.iter().enumerate() {
        let end = match steps.get(index + 1) {
            Some((next, _)) => *next - Duration::days(1),
            None => day(start.year(), 12, 31),
        };
        let mut current = *start;
        while current <= end {
            counts.insert(current, *count);
            current += Duration::days(1);
        }
    }
    let built = PopulationSeries::new(counts);
    assert!(built.is_ok());
    match built {
        Ok(series) => series,
        Err(_) => unreachable!(),
    }
}

pub fn quarterly_from(inception: NaiveDate) -> PeriodCalendar {
    let built = PeriodCalendar::from_cadence(inception, Cadence::Quarterly);
    assert!(built.is_ok());
    match built {
        Ok(calendar) => calendar,
        Err(_) => unreachable!(),
    }
}

pub fn tracker(name: &str, fraction: f64, minimum: u32) -> SubstanceQuotaTracker {
    let spec = SubstanceSpec::new(name, fraction, minimum);
    assert!(spec.is_ok());
    match spec {
        Ok(spec) => SubstanceQuotaTracker::new(&spec),
        Err(_) => unreachable!(),
    }
}

pub fn temp_home_in_tmp(prefix: &str) -> std::io::Result<(TempDir, PathBuf)> {
    let dir = Builder::new().prefix(prefix).tempdir_in("/tmp")?;
    let home = dir.path().join("poolquota-home");
    fs::create_dir_all(&home)?;
    Ok((dir, home))
}

pub fn write_population_file(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let written = fs::write(&path, body);
    assert!(written.is_ok());
    path
}

/// `date,count` rows for every day of `series`.
pub fn absolute_rows(series: &PopulationSeries) -> String {
    let mut body = String::from("date,count\n");
    for (date, count) in series.iter() {
        body.push_str(&format!("{},{count}\n", date.format("%Y-%m-%d")));
    }
    body
}
