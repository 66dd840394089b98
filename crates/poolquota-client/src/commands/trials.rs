use std::collections::BTreeMap;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::calendar::PeriodCalendar;
use crate::commands::common::{
    checkpoint_strings, default_checkpoints, new_trackers, parse_cadence, parse_checkpoints,
    parse_projection, substance_specs, validate_zero_chance,
};
use crate::commands::generate::MAX_START_COUNT;
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{TrialSubstanceSummary, TrialsData};
use crate::population::{RandomPopulation, generate_population};
use crate::quota::driver::PeriodDriver;
use crate::quota::policy::ZeroAvoidance;
use crate::{ClientError, ClientResult};

#[derive(Debug, Default)]
pub struct TrialsOptions {
    pub runs: usize,
    pub seed: u64,
    pub year: i32,
    pub mu: f64,
    pub sigma: f64,
    pub cadence: Option<String>,
    pub substances: Vec<String>,
    pub minimum_tests_per_period: u32,
    pub checkpoints: Vec<String>,
    pub projection: Option<String>,
    pub zero_chance_percent: Option<u8>,
}

/// Runs the quota engine over `runs` seeded random pools and tallies how each
/// substance's year closed.
pub fn run(options: TrialsOptions) -> ClientResult<SuccessEnvelope> {
    if options.runs == 0 {
        return Err(ClientError::invalid_argument_for_command(
            "Trials need at least one run.",
            Some("trials"),
        ));
    }
    let cadence = parse_cadence(options.cadence.as_deref())?;
    let projection = parse_projection(options.projection.as_deref())?;
    let zero_chance = validate_zero_chance(options.zero_chance_percent, "trials")?;
    let specs = substance_specs(
        &options.substances,
        options.minimum_tests_per_period,
        "trials",
    )?;
    let checkpoints = if options.checkpoints.is_empty() {
        default_checkpoints(options.year)
    } else {
        parse_checkpoints(&options.checkpoints)?
    };

    let mut summaries = specs
        .iter()
        .map(|spec| TrialSubstanceSummary {
            name: spec.name().to_string(),
            fraction: spec.fraction(),
            overcount_histogram: BTreeMap::new(),
            severity_counts: BTreeMap::new(),
            worst_overcount: 0,
            total_reconciliation: 0,
        })
        .collect::<Vec<TrialSubstanceSummary>>();
    let mut stale_operations = 0u32;
    let mut runs_with_undercount = 0usize;

    let mut rng = SmallRng::seed_from_u64(options.seed);
    for trial in 0..options.runs {
        let params = RandomPopulation::sample(
            &mut rng,
            options.year,
            MAX_START_COUNT,
            options.mu,
            options.sigma,
        );
        let population = generate_population(&params, rng.random::<u64>())?;
        let calendar = PeriodCalendar::from_cadence(population.inception(), cadence)?;
        let mut trackers = new_trackers(&specs);

        let mut driver = PeriodDriver::new(&population, &calendar)?
            .with_checkpoints(&checkpoints)?
            .with_projection(projection);
        if let Some(percent) = zero_chance {
            driver = driver.with_floor(Box::new(ZeroAvoidance::new(percent, rng.random::<u64>())));
        }
        let driver_run = driver.run(&mut trackers)?;
        stale_operations += driver_run.stale_operations;

        let mut undercount = false;
        for (summary, tracker) in summaries.iter_mut().zip(&trackers) {
            let final_overcount = tracker.final_overcount();
            let severity = tracker.severity();
            *summary
                .overcount_histogram
                .entry(final_overcount)
                .or_insert(0) += 1;
            *summary
                .severity_counts
                .entry(severity.as_str().to_string())
                .or_insert(0) += 1;
            summary.worst_overcount = summary.worst_overcount.min(final_overcount);
            summary.total_reconciliation += tracker.total_reconciliation();
            undercount |= severity.is_undercount();
        }
        if undercount {
            runs_with_undercount += 1;
            tracing::debug!(
                trial,
                inception = %params.start,
                start_count = params.start_count,
                "trial closed with an undercount"
            );
        }
    }

    let data = TrialsData {
        runs: options.runs,
        seed: options.seed,
        year: options.year,
        mu: options.mu,
        sigma: options.sigma,
        cadence: cadence.as_str().to_string(),
        projection: projection.as_str().to_string(),
        checkpoints: checkpoint_strings(&checkpoints),
        substances: summaries,
        stale_operations,
        runs_with_undercount,
    };

    success("trials", data)
}

#[cfg(test)]
mod tests {
    use super::{TrialsOptions, run};

    fn options(runs: usize, seed: u64) -> TrialsOptions {
        TrialsOptions {
            runs,
            seed,
            year: 2026,
            mu: 0.01,
            sigma: 2.0,
            ..TrialsOptions::default()
        }
    }

    #[test]
    fn histogram_counts_every_run_per_substance() {
        let envelope = run(options(12, 4));
        assert!(envelope.is_ok());
        if let Ok(envelope) = envelope {
            let substances = envelope.data["substances"].as_array().cloned().unwrap_or_default();
            assert_eq!(substances.len(), 2);
            for substance in substances {
                let total = substance["overcount_histogram"]
                    .as_object()
                    .map(|histogram| histogram.values().filter_map(|count| count.as_u64()).sum::<u64>())
                    .unwrap_or_default();
                assert_eq!(total, 12);
            }
            assert_eq!(envelope.data["stale_operations"], 0);
        }
    }

    #[test]
    fn same_seed_reproduces_the_summary() {
        let left = run(options(5, 99));
        let right = run(options(5, 99));
        assert!(left.is_ok() && right.is_ok());
        if let (Ok(left), Ok(right)) = (left, right) {
            assert_eq!(left.data, right.data);
        }
    }

    #[test]
    fn zero_runs_is_an_argument_error() {
        let result = run(options(0, 1));
        assert!(result.is_err());
        if let Err(error) = result {
            assert_eq!(error.code, "invalid_argument");
        }
    }
}
