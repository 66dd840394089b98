use chrono::{Datelike, Duration, NaiveDate};
use serde::Serialize;

use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Cadence {
    Semimonthly,
    Monthly,
    Bimonthly,
    Quarterly,
    Semiannually,
    Annually,
}

impl Cadence {
    pub const ALL: [Cadence; 6] = [
        Self::Semimonthly,
        Self::Monthly,
        Self::Bimonthly,
        Self::Quarterly,
        Self::Semiannually,
        Self::Annually,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Semimonthly => "semi-monthly",
            Self::Monthly => "monthly",
            Self::Bimonthly => "bi-monthly",
            Self::Quarterly => "quarterly",
            Self::Semiannually => "semiannually",
            Self::Annually => "annually",
        }
    }

    pub const fn periods_per_year(self) -> usize {
        match self {
            Self::Semimonthly => 24,
            Self::Monthly => 12,
            Self::Bimonthly => 6,
            Self::Quarterly => 4,
            Self::Semiannually => 2,
            Self::Annually => 1,
        }
    }

    pub fn parse(value: &str) -> ClientResult<Self> {
        let normalized = value.trim().to_ascii_lowercase().replace(['-', '_'], "");
        match normalized.as_str() {
            "semimonthly" => Ok(Self::Semimonthly),
            "monthly" => Ok(Self::Monthly),
            "bimonthly" => Ok(Self::Bimonthly),
            "quarterly" => Ok(Self::Quarterly),
            "semiannually" | "semiannual" => Ok(Self::Semiannually),
            "annually" | "annual" => Ok(Self::Annually),
            _ => Err(ClientError::invalid_argument_with_recovery(
                &format!("Unknown cadence `{value}`."),
                vec![format!(
                    "Use one of: {}.",
                    Self::ALL.map(Self::as_str).join(", ")
                )],
            )),
        }
    }

    /// Every boundary date of this cadence within `year`, starting Jan 1.
    pub fn boundaries(self, year: i32) -> Vec<NaiveDate> {
        let months: &[u32] = match self {
            Self::Semimonthly | Self::Monthly => &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12],
            Self::Bimonthly => &[1, 3, 5, 7, 9, 11],
            Self::Quarterly => &[1, 4, 7, 10],
            Self::Semiannually => &[1, 7],
            Self::Annually => &[1],
        };
        let days: &[u32] = match self {
            Self::Semimonthly => &[1, 16],
            _ => &[1],
        };

        months
            .iter()
            .flat_map(|month| {
                days.iter()
                    .filter_map(move |day| NaiveDate::from_ymd_opt(year, *month, *day))
            })
            .collect()
    }
}

/// Ordered period starts plus the year end. Period `i` runs from `starts[i]`
/// through the day before `starts[i + 1]`; the last period ends at `year_end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodCalendar {
    starts: Vec<NaiveDate>,
    year_end: NaiveDate,
}

impl PeriodCalendar {
    pub fn new(starts: Vec<NaiveDate>, year_end: NaiveDate) -> ClientResult<Self> {
        let Some(first) = starts.first().copied() else {
            return Err(ClientError::invalid_calendar(
                "A period calendar needs at least one period.",
            ));
        };
        let year = first.year();
        if year_end != year_end_of(year)? {
            return Err(ClientError::invalid_calendar(&format!(
                "Year end {} must be December 31 of {year}.",
                format_iso_date(&year_end)
            )));
        }
        for pair in starts.windows(2) {
            if pair[1] <= pair[0] {
                return Err(ClientError::invalid_calendar(&format!(
                    "Period start {} does not follow {}.",
                    format_iso_date(&pair[1]),
                    format_iso_date(&pair[0])
                )));
            }
        }
        if let Some(last) = starts.last()
            && last.year() != year
        {
            return Err(ClientError::invalid_calendar(&format!(
                "Period start {} falls outside {year}.",
                format_iso_date(last)
            )));
        }

        Ok(Self { starts, year_end })
    }

    /// Calendar for a pool whose first day is `inception`.
    pub fn from_cadence(inception: NaiveDate, cadence: Cadence) -> ClientResult<Self> {
        let mut starts = vec![inception];
        starts.extend(
            cadence
                .boundaries(inception.year())
                .into_iter()
                .filter(|boundary| *boundary > inception),
        );
        Self::new(starts, year_end_of(inception.year())?)
    }

    /// Drops periods that end before `inception` and starts the first remaining
    /// period on the inception itself.
    pub fn clamped_to(&self, inception: NaiveDate) -> ClientResult<Self> {
        if inception > self.year_end {
            return Err(ClientError::invalid_calendar(&format!(
                "Inception {} falls after the calendar year end {}.",
                format_iso_date(&inception),
                format_iso_date(&self.year_end)
            )));
        }
        let mut starts = vec![inception];
        starts.extend(
            self.starts
                .iter()
                .copied()
                .filter(|start| *start > inception),
        );
        Self::new(starts, self.year_end)
    }

    pub fn period_count(&self) -> usize {
        self.starts.len()
    }

    pub fn starts(&self) -> &[NaiveDate] {
        &self.starts
    }

    pub fn inception(&self) -> NaiveDate {
        self.starts[0]
    }

    pub fn year_end(&self) -> NaiveDate {
        self.year_end
    }

    pub fn year(&self) -> i32 {
        self.year_end.year()
    }

    pub fn bounds(&self, period_index: usize) -> Option<(NaiveDate, NaiveDate)> {
        let start = *self.starts.get(period_index)?;
        let end = match self.starts.get(period_index + 1) {
            Some(next) => *next - Duration::days(1),
            None => self.year_end,
        };
        Some((start, end))
    }

    pub fn day_count(&self, period_index: usize) -> Option<i64> {
        let (start, end) = self.bounds(period_index)?;
        Some((end - start).num_days() + 1)
    }

    pub fn days_in_year(&self) -> i64 {
        if is_leap_year(self.year()) { 366 } else { 365 }
    }

    pub fn fraction_of_year(&self, period_index: usize) -> Option<f64> {
        let days = self.day_count(period_index)?;
        Some(days as f64 / self.days_in_year() as f64)
    }

    /// Fraction of the year covered by `start..=end`, counting both ends.
    pub fn span_fraction(&self, start: NaiveDate, end: NaiveDate) -> f64 {
        let days = (end - start).num_days() + 1;
        days.max(0) as f64 / self.days_in_year() as f64
    }

    pub fn period_index_for(&self, date: NaiveDate) -> Option<usize> {
        if date < self.inception() || date > self.year_end {
            return None;
        }
        Some(self.starts.partition_point(|start| *start <= date) - 1)
    }
}

pub fn format_iso_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub fn parse_iso_date(value: &str, field_name: &str) -> ClientResult<NaiveDate> {
    if !looks_like_iso_date(value) {
        return Err(ClientError::invalid_argument(&format!(
            "`{field_name}` must use YYYY-MM-DD format with a real calendar date."
        )));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| {
        ClientError::invalid_argument(&format!(
            "`{field_name}` must use YYYY-MM-DD format with valid calendar values."
        ))
    })
}

pub(crate) fn looks_like_iso_date(value: &str) -> bool {
    if value.len() != 10 {
        return false;
    }
    let bytes = value.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return false;
    }

    for index in [0usize, 1, 2, 3, 5, 6, 8, 9] {
        if !bytes[index].is_ascii_digit() {
            return false;
        }
    }
    true
}

pub(crate) fn year_end_of(year: i32) -> ClientResult<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 12, 31)
        .ok_or_else(|| ClientError::invalid_calendar(&format!("Year {year} is out of range.")))
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::{Cadence, PeriodCalendar, format_iso_date, parse_iso_date};

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
    }

    #[test]
    fn cadences_cover_the_year_from_january() {
        for cadence in Cadence::ALL {
            let calendar = PeriodCalendar::from_cadence(date(2026, 1, 1), cadence);
            assert!(calendar.is_ok());
            if let Ok(calendar) = calendar {
                assert_eq!(calendar.period_count(), cadence.periods_per_year());
                let total: i64 = (0..calendar.period_count())
                    .filter_map(|index| calendar.day_count(index))
                    .sum();
                assert_eq!(total, 365);
            }
        }
    }

    #[test]
    fn semimonthly_splits_on_the_sixteenth() {
        let calendar = PeriodCalendar::from_cadence(date(2026, 1, 1), Cadence::Semimonthly);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            assert_eq!(calendar.bounds(0), Some((date(2026, 1, 1), date(2026, 1, 15))));
            assert_eq!(calendar.bounds(1), Some((date(2026, 1, 16), date(2026, 1, 31))));
            assert_eq!(calendar.bounds(23), Some((date(2026, 12, 16), date(2026, 12, 31))));
        }
    }

    #[test]
    fn mid_period_inception_clamps_the_first_period() {
        let calendar = PeriodCalendar::from_cadence(date(2026, 2, 10), Cadence::Quarterly);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            assert_eq!(calendar.period_count(), 4);
            assert_eq!(calendar.bounds(0), Some((date(2026, 2, 10), date(2026, 3, 31))));
            assert_eq!(calendar.day_count(0), Some(50));
        }
    }

    #[test]
    fn inception_on_a_boundary_does_not_duplicate_it() {
        let calendar = PeriodCalendar::from_cadence(date(2026, 7, 1), Cadence::Quarterly);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            assert_eq!(calendar.starts(), &[date(2026, 7, 1), date(2026, 10, 1)]);
        }
    }

    #[test]
    fn leap_years_use_366_days() {
        let calendar = PeriodCalendar::from_cadence(date(2028, 1, 1), Cadence::Annually);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            assert_eq!(calendar.days_in_year(), 366);
            assert_eq!(calendar.fraction_of_year(0), Some(1.0));
        }
    }

    #[test]
    fn custom_calendars_are_validated() {
        let year_end = date(2026, 12, 31);
        assert!(PeriodCalendar::new(Vec::new(), year_end).is_err());
        assert!(PeriodCalendar::new(vec![date(2026, 3, 1), date(2026, 3, 1)], year_end).is_err());
        assert!(PeriodCalendar::new(vec![date(2026, 3, 1), date(2027, 1, 1)], year_end).is_err());
        assert!(PeriodCalendar::new(vec![date(2026, 3, 1)], date(2026, 12, 30)).is_err());
        assert!(PeriodCalendar::new(vec![date(2026, 3, 1), date(2026, 9, 1)], year_end).is_ok());
    }

    #[test]
    fn clamping_drops_elapsed_periods() {
        let calendar = PeriodCalendar::from_cadence(date(2026, 1, 1), Cadence::Quarterly);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            let clamped = calendar.clamped_to(date(2026, 5, 5));
            assert!(clamped.is_ok());
            if let Ok(clamped) = clamped {
                assert_eq!(
                    clamped.starts(),
                    &[date(2026, 5, 5), date(2026, 7, 1), date(2026, 10, 1)]
                );
            }
            assert!(calendar.clamped_to(date(2027, 1, 2)).is_err());
        }
    }

    #[test]
    fn period_lookup_finds_the_containing_period() {
        let calendar = PeriodCalendar::from_cadence(date(2026, 1, 1), Cadence::Monthly);
        assert!(calendar.is_ok());
        if let Ok(calendar) = calendar {
            assert_eq!(calendar.period_index_for(date(2026, 1, 1)), Some(0));
            assert_eq!(calendar.period_index_for(date(2026, 2, 28)), Some(1));
            assert_eq!(calendar.period_index_for(date(2026, 12, 31)), Some(11));
            assert_eq!(calendar.period_index_for(date(2027, 1, 1)), None);
        }
    }

    #[test]
    fn cadence_names_parse_with_or_without_hyphens() {
        assert!(matches!(Cadence::parse("semi-monthly"), Ok(Cadence::Semimonthly)));
        assert!(matches!(Cadence::parse("bimonthly"), Ok(Cadence::Bimonthly)));
        assert!(matches!(Cadence::parse("Quarterly"), Ok(Cadence::Quarterly)));
        assert!(Cadence::parse("weekly").is_err());
    }

    #[test]
    fn iso_dates_are_strict() {
        assert!(parse_iso_date("2026-1-01", "inception").is_err());
        assert!(parse_iso_date("2026-02-30", "inception").is_err());
        let parsed = parse_iso_date("2026-02-28", "inception");
        assert!(parsed.is_ok());
        if let Ok(value) = parsed {
            assert_eq!(format_iso_date(&value), "2026-02-28");
        }
    }
}
