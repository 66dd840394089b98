use std::path::Path;

use ulid::Ulid;

use crate::calendar::{PeriodCalendar, format_iso_date};
use crate::commands::common::{
    checkpoint_strings, new_trackers, parse_cadence, parse_checkpoints, parse_projection,
    substance_contracts, substance_specs, validate_zero_chance,
};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::{PersistedRun, RunData};
use crate::population::{PopulationFormat, parse_population};
use crate::quota::driver::PeriodDriver;
use crate::quota::policy::ZeroAvoidance;
use crate::report::{TrackerReport, reports_to_csv};
use crate::store::SqliteBlobStore;
use crate::{ClientError, ClientResult};

#[derive(Debug, Default)]
pub struct RunOptions<'a> {
    pub path: String,
    pub format: Option<String>,
    pub cadence: Option<String>,
    pub substances: Vec<String>,
    pub minimum_tests_per_period: u32,
    pub checkpoints: Vec<String>,
    pub projection: Option<String>,
    pub zero_chance_percent: Option<u8>,
    pub seed: u64,
    pub persist: bool,
    pub csv_out: Option<String>,
    pub home_override: Option<&'a Path>,
}

pub fn run(path: &str) -> ClientResult<SuccessEnvelope> {
    run_with_options(RunOptions {
        path: path.to_string(),
        ..RunOptions::default()
    })
}

#[doc(hidden)]
pub fn run_with_options(options: RunOptions<'_>) -> ClientResult<SuccessEnvelope> {
    let format = match options.format.as_deref() {
        Some(value) => PopulationFormat::parse(value)?,
        None => PopulationFormat::default(),
    };
    let cadence = parse_cadence(options.cadence.as_deref())?;
    let projection = parse_projection(options.projection.as_deref())?;
    let checkpoints = parse_checkpoints(&options.checkpoints)?;
    let zero_chance = validate_zero_chance(options.zero_chance_percent, "run")?;
    let specs = substance_specs(
        &options.substances,
        options.minimum_tests_per_period,
        "run",
    )?;

    let content = std::fs::read_to_string(&options.path)
        .map_err(|error| ClientError::population_file_unreadable(&options.path, &error.to_string()))?;
    let population = parse_population(&content, format)?;
    let calendar = PeriodCalendar::from_cadence(population.inception(), cadence)?;

    let mut zero_avoidance = zero_chance.map(|percent| ZeroAvoidance::new(percent, options.seed));
    let mut trackers = new_trackers(&specs);

    let mut driver = PeriodDriver::new(&population, &calendar)?
        .with_checkpoints(&checkpoints)?
        .with_projection(projection);
    if let Some(policy) = zero_avoidance.as_mut() {
        driver = driver.with_floor(Box::new(policy));
    }
    let accepted_checkpoints = driver.checkpoints().to_vec();
    let inception = driver.calendar().inception();
    let year_end = driver.calendar().year_end();

    let (driver_run, persisted) = if options.persist {
        let mut store = SqliteBlobStore::open(options.home_override)?;
        let run_key = format!("run_{}", Ulid::new());
        let driver_run = driver.run_persisted(&mut trackers, &mut store, &run_key)?;
        tracing::info!(run_key = %run_key, db_path = %store.db_path().display(), "run persisted");
        (
            driver_run,
            Some(PersistedRun {
                run_key,
                db_path: store.db_path().display().to_string(),
            }),
        )
    } else {
        (driver.run(&mut trackers)?, None)
    };
    drop(driver);

    let reports = trackers
        .iter()
        .map(|tracker| TrackerReport::build(tracker, &driver_run.periods))
        .collect::<Vec<TrackerReport>>();

    if let Some(csv_path) = options.csv_out.as_deref() {
        let text = reports_to_csv(&reports)?;
        std::fs::write(csv_path, text)
            .map_err(|error| ClientError::report_write_failed(csv_path, &error.to_string()))?;
    }

    let data = RunData {
        path: options.path.clone(),
        format: format.as_str().to_string(),
        cadence: cadence.as_str().to_string(),
        projection: projection.as_str().to_string(),
        inception: format_iso_date(&inception),
        year_end: format_iso_date(&year_end),
        final_loaded_date: format_iso_date(&population.final_loaded_date()),
        substances: substance_contracts(&specs),
        checkpoints: checkpoint_strings(&accepted_checkpoints),
        zero_chance_percent: zero_chance,
        zero_avoidance_forced: zero_avoidance
            .as_ref()
            .map(ZeroAvoidance::forced)
            .unwrap_or(0),
        periods: driver_run.periods,
        reconciliations: driver_run.checkpoints,
        stale_operations: driver_run.stale_operations,
        trackers: reports,
        persisted,
        csv_path: options.csv_out,
    };

    success("run", data)
}
