use std::path::Path;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::calendar::{format_iso_date, parse_iso_date};
use crate::contracts::envelope::{SuccessEnvelope, success};
use crate::contracts::types::GenerateData;
use crate::population::{
    PopulationFormat, RandomPopulation, generate_population, write_absolute, write_delta,
};
use crate::{ClientError, ClientResult};

pub const MAX_START_COUNT: u32 = 500;

#[derive(Debug, Default)]
pub struct GenerateOptions {
    pub path: String,
    pub format: Option<String>,
    pub year: i32,
    pub start: Option<String>,
    pub start_count: Option<u32>,
    pub mu: f64,
    pub sigma: f64,
    pub seed: u64,
}

/// Writes a random population file that `run` can load.
pub fn run(options: GenerateOptions) -> ClientResult<SuccessEnvelope> {
    let format = match options.format.as_deref() {
        Some(value) => PopulationFormat::parse(value)?,
        None => PopulationFormat::Delta,
    };

    let mut rng = SmallRng::seed_from_u64(options.seed);
    let mut params = RandomPopulation::sample(
        &mut rng,
        options.year,
        MAX_START_COUNT,
        options.mu,
        options.sigma,
    );
    if let Some(start) = options.start.as_deref() {
        params.start = parse_iso_date(start, "start")?;
    }
    if let Some(count) = options.start_count {
        if count == 0 {
            return Err(ClientError::invalid_argument_for_command(
                "Start count must be at least 1 so the pool has an inception.",
                Some("generate"),
            ));
        }
        params.start_count = count;
    }

    let series = generate_population(&params, rng.random::<u64>())?;
    let text = match format {
        PopulationFormat::Absolute => write_absolute(&series)?,
        PopulationFormat::Delta => write_delta(&series)?,
    };
    write_file(Path::new(&options.path), &text)?;

    let final_date = series.final_loaded_date();
    let data = GenerateData {
        path: options.path.clone(),
        format: format.as_str().to_string(),
        seed: options.seed,
        mu: options.mu,
        sigma: options.sigma,
        inception: format_iso_date(&series.inception()),
        start_count: params.start_count,
        final_count: series.count_on(final_date)?,
        days: series.len(),
    };

    success("generate", data)
}

fn write_file(path: &Path, text: &str) -> ClientResult<()> {
    std::fs::write(path, text).map_err(|error| {
        ClientError::report_write_failed(&path.display().to_string(), &error.to_string())
    })
}
