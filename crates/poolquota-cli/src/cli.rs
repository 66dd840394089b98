use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IsoDate(pub String);

impl IsoDate {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub fn parse_iso_date(value: &str) -> Result<IsoDate, String> {
    if value.len() != 10 {
        return Err("date must use YYYY-MM-DD format".to_string());
    }

    let bytes = value.as_bytes();
    if bytes[4] != b'-' || bytes[7] != b'-' {
        return Err("date must use YYYY-MM-DD format".to_string());
    }

    for index in [0usize, 1, 2, 3, 5, 6, 8, 9] {
        if !bytes[index].is_ascii_digit() {
            return Err("date must use YYYY-MM-DD format".to_string());
        }
    }

    if NaiveDate::parse_from_str(value, "%Y-%m-%d").is_err() {
        return Err("date must use valid calendar values".to_string());
    }

    Ok(IsoDate(value.to_string()))
}

pub fn parse_substance(value: &str) -> Result<String, String> {
    match value.split_once('=') {
        Some((name, fraction)) if !name.trim().is_empty() && !fraction.trim().is_empty() => {
            Ok(value.to_string())
        }
        _ => Err("substance must use NAME=FRACTION, for example drug=0.5".to_string()),
    }
}

pub fn parse_zero_chance(value: &str) -> Result<u8, String> {
    match value.parse::<u8>() {
        Ok(percent) if percent <= 100 => Ok(percent),
        _ => Err("zero chance must be a whole percentage from 0 to 100".to_string()),
    }
}

/// Extended help shown after `poolquota run --help`.
pub const RUN_AFTER_HELP: &str = "\
Population file:
  Two columns per row, an optional header, one calendar year only.
    absolute (default): `YYYY-MM-DD,<headcount>`, one row for every day
    delta:              `YYYY-MM-DD,<signed change>`; the pool starts on the
                        first positive change and missing days keep the
                        previous headcount

Checkpoints:
  Each `--checkpoint` date tops up any substance whose prescribed tests fall
  short of the year's projected requirement. Dates on or before the pool's
  inception are skipped; dates after December 31 are rejected.

What to do next:
  1. Run `poolquota calendar <inception>` to preview the testing periods.
  2. Run `poolquota run <path> --csv-out report.csv` to keep a per-period table.
  3. Run `poolquota trials` to see how often a cadence ends the year short.
";

#[derive(Debug, Parser)]
#[command(
    name = "poolquota",
    version,
    about = "random drug and alcohol testing quota planner",
    disable_help_subcommand = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args)]
pub struct SubstanceArgs {
    /// Substance to track as NAME=FRACTION; repeat for more (default drug=0.5, alcohol=0.1)
    #[arg(long = "substance", value_name = "NAME=FRACTION", value_parser = parse_substance)]
    pub substances: Vec<String>,
    /// Fewest tests to predict for any period
    #[arg(long = "minimum", value_name = "N", default_value_t = 0)]
    pub minimum_tests_per_period: u32,
}

#[derive(Debug, Args)]
pub struct ScheduleArgs {
    /// Testing cadence: semi-monthly, monthly, bi-monthly, quarterly, semiannually, annually
    #[arg(long, value_name = "CADENCE")]
    pub cadence: Option<String>,
    /// Reconciliation date (YYYY-MM-DD); repeat for more
    #[arg(long = "checkpoint", value_name = "DATE", value_parser = parse_iso_date)]
    pub checkpoints: Vec<IsoDate>,
    /// How a checkpoint projects the rest of the year: carry-forward or observed
    #[arg(long, value_name = "PROJECTION")]
    pub projection: Option<String>,
    /// Percent chance that a zero prediction is raised to one test
    #[arg(long = "zero-chance", value_name = "PCT", value_parser = parse_zero_chance)]
    pub zero_chance: Option<u8>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Plan a year of tests from a population file
    #[command(after_help = RUN_AFTER_HELP)]
    Run {
        /// Population CSV file
        path: String,
        /// Population file layout: absolute or delta
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
        #[command(flatten)]
        substances: SubstanceArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
        /// Seed for the zero-avoidance draw
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Save tracker state between periods under the poolquota home
        #[arg(long)]
        persist: bool,
        /// Write the per-period table as CSV
        #[arg(long = "csv-out", value_name = "PATH")]
        csv_out: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// List the testing periods for an inception date
    Calendar {
        /// First day of the pool (YYYY-MM-DD)
        #[arg(value_parser = parse_iso_date)]
        inception: IsoDate,
        /// Testing cadence
        #[arg(long, value_name = "CADENCE")]
        cadence: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Run the planner over many random pools and tally year-end outcomes
    Trials {
        /// Number of random pools
        #[arg(long, default_value_t = 100)]
        runs: usize,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        /// Calendar year to simulate (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// Mean daily headcount change on weekdays
        #[arg(long, default_value_t = 0.01, allow_negative_numbers = true)]
        mu: f64,
        /// Standard deviation of the daily headcount change
        #[arg(long, default_value_t = 2.0)]
        sigma: f64,
        #[command(flatten)]
        substances: SubstanceArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
        #[arg(long)]
        json: bool,
    },
    /// Write a random population file
    Generate {
        /// Output CSV file
        path: String,
        /// Output layout: delta (default) or absolute
        #[arg(long, value_name = "FORMAT")]
        format: Option<String>,
        /// Calendar year (default: current year)
        #[arg(long)]
        year: Option<i32>,
        /// First day of the pool (default: random day in the year)
        #[arg(long, value_parser = parse_iso_date)]
        start: Option<IsoDate>,
        /// Headcount on the first day (default: random)
        #[arg(long = "start-count")]
        start_count: Option<u32>,
        #[arg(long, default_value_t = 0.01, allow_negative_numbers = true)]
        mu: f64,
        #[arg(long, default_value_t = 2.0)]
        sigma: f64,
        #[arg(long, default_value_t = 0)]
        seed: u64,
        #[arg(long)]
        json: bool,
    },
}

#[cfg(test)]
pub fn parse_from<I, T>(itr: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(itr)
}
