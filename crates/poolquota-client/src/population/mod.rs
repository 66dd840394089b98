mod generate;
mod parse;

use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate};

use crate::calendar::format_iso_date;
use crate::{ClientError, ClientResult};

pub use generate::{RandomPopulation, generate_population};
pub use parse::{PopulationFormat, parse_population, write_absolute, write_delta};

/// Daily headcounts for one calendar year, keyed by date.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PopulationSeries {
    counts: BTreeMap<NaiveDate, u32>,
}

impl PopulationSeries {
    pub fn new(counts: BTreeMap<NaiveDate, u32>) -> ClientResult<Self> {
        let (Some(first), Some(last)) = (counts.keys().next(), counts.keys().next_back()) else {
            return Err(ClientError::invalid_population(
                "Population series is empty.",
            ));
        };
        if first.year() != last.year() {
            return Err(ClientError::invalid_population(&format!(
                "Population series spans {} through {}; only one calendar year is supported.",
                format_iso_date(first),
                format_iso_date(last)
            )));
        }
        Ok(Self { counts })
    }

    /// A constant headcount on every day of `start..=end`.
    pub fn constant(start: NaiveDate, end: NaiveDate, count: u32) -> ClientResult<Self> {
        if start > end {
            return Err(ClientError::empty_averaging_window(start, end));
        }
        let counts = start
            .iter_days()
            .take_while(|day| *day <= end)
            .map(|day| (day, count))
            .collect();
        Self::new(counts)
    }

    pub fn inception(&self) -> NaiveDate {
        self.counts.keys().next().copied().unwrap_or_default()
    }

    pub fn final_loaded_date(&self) -> NaiveDate {
        self.counts.keys().next_back().copied().unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, u32)> + '_ {
        self.counts.iter().map(|(date, count)| (*date, *count))
    }

    pub fn count_on(&self, date: NaiveDate) -> ClientResult<u32> {
        self.counts
            .get(&date)
            .copied()
            .ok_or_else(|| ClientError::missing_population_data(date))
    }

    /// Mean daily headcount over `start..=end`. Every day must be loaded.
    pub fn average_between(&self, start: NaiveDate, end: NaiveDate) -> ClientResult<f64> {
        if start > end {
            return Err(ClientError::empty_averaging_window(start, end));
        }
        let mut total = 0u64;
        let mut days = 0u64;
        for day in start.iter_days().take_while(|day| *day <= end) {
            total += u64::from(self.count_on(day)?);
            days += 1;
        }
        Ok(total as f64 / days as f64)
    }

    /// Mean over `start..=through_end` where every day after `observed_end`
    /// repeats the headcount on `observed_end`.
    pub fn carried_average(
        &self,
        start: NaiveDate,
        observed_end: NaiveDate,
        through_end: NaiveDate,
    ) -> ClientResult<f64> {
        if start > through_end {
            return Err(ClientError::empty_averaging_window(start, through_end));
        }
        let mut total = 0u64;
        let mut days = 0u64;
        for day in start.iter_days().take_while(|day| *day <= through_end) {
            total += u64::from(self.count_on(day.min(observed_end))?);
            days += 1;
        }
        Ok(total as f64 / days as f64)
    }

    pub fn validate_contiguous(&self) -> ClientResult<()> {
        let mut expected = self.inception();
        for date in self.counts.keys() {
            if *date != expected {
                return Err(ClientError::population_gap(
                    expected,
                    self.final_loaded_date(),
                ));
            }
            expected = *date + Duration::days(1);
        }
        Ok(())
    }
}
