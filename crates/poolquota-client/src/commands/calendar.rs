use crate::ClientResult;
use crate::calendar::{PeriodCalendar, format_iso_date, parse_iso_date};
use crate::commands::common::parse_cadence;
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{CalendarData, CalendarPeriod};

pub fn run(inception: &str, cadence: Option<&str>) -> ClientResult<SuccessEnvelope> {
    let inception = parse_iso_date(inception, "inception")?;
    let cadence = parse_cadence(cadence)?;
    let calendar = PeriodCalendar::from_cadence(inception, cadence)?;

    let periods = (0..calendar.period_count())
        .filter_map(|index| {
            let (start, end) = calendar.bounds(index)?;
            Some(CalendarPeriod {
                period_index: index,
                start: format_iso_date(&start),
                end: format_iso_date(&end),
                day_count: calendar.day_count(index)?,
                fraction_of_year: calendar.fraction_of_year(index)?,
            })
        })
        .collect::<Vec<CalendarPeriod>>();

    let data = CalendarData {
        inception: format_iso_date(&inception),
        cadence: cadence.as_str().to_string(),
        year_end: format_iso_date(&calendar.year_end()),
        days_in_year: calendar.days_in_year(),
        periods,
    };

    success("calendar", data)
}
