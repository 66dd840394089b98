use std::collections::BTreeMap;

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use crate::calendar::year_end_of;
use crate::population::PopulationSeries;
use crate::{ClientError, ClientResult};

/// Parameters for a synthetic pool: a starting headcount that drifts by a
/// normally distributed whole number of people on each weekday.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomPopulation {
    pub start: NaiveDate,
    pub start_count: u32,
    pub mu: f64,
    pub sigma: f64,
}

impl RandomPopulation {
    /// Random start date within `year` and a start count in `1..=max_start_count`.
    pub fn sample(rng: &mut SmallRng, year: i32, max_start_count: u32, mu: f64, sigma: f64) -> Self {
        let year_start = NaiveDate::from_ymd_opt(year, 1, 1).unwrap_or_default();
        let offset = rng.random_range(0..365i64);
        Self {
            start: year_start + Duration::days(offset),
            start_count: rng.random_range(1..=max_start_count.max(1)),
            mu,
            sigma,
        }
    }
}

/// Builds a series from `params.start` through December 31 of that year.
pub fn generate_population(params: &RandomPopulation, seed: u64) -> ClientResult<PopulationSeries> {
    if !params.mu.is_finite() || !params.sigma.is_finite() || params.sigma < 0.0 {
        return Err(ClientError::invalid_argument(&format!(
            "Random population needs a finite mu and a non-negative sigma, got mu={} sigma={}.",
            params.mu, params.sigma
        )));
    }

    let step = Normal::new(params.mu, params.sigma).map_err(|error| {
        ClientError::invalid_argument(&format!(
            "Random population could not use mu={} sigma={}: {error}.",
            params.mu, params.sigma
        ))
    })?;
    let mut rng = SmallRng::seed_from_u64(seed);
    let year_end = year_end_of(params.start.year())?;
    let mut counts = BTreeMap::new();
    let mut headcount = i64::from(params.start_count);
    counts.insert(params.start, params.start_count);

    let mut day = params.start;
    while day < year_end {
        day += Duration::days(1);
        headcount = (headcount + daily_change(&mut rng, day, &step)).max(0);
        counts.insert(day, u32::try_from(headcount).unwrap_or(u32::MAX));
    }
    PopulationSeries::new(counts)
}

fn daily_change(rng: &mut SmallRng, day: NaiveDate, step: &Normal<f64>) -> i64 {
    if step.std_dev() < 1e-6 || matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
        return 0;
    }
    step.sample(rng).trunc() as i64
}
