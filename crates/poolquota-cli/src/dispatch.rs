use chrono::{Datelike, Local};
use poolquota_client::commands;
use poolquota_client::commands::generate::GenerateOptions;
use poolquota_client::commands::run::RunOptions;
use poolquota_client::commands::trials::TrialsOptions;
use poolquota_client::{ClientResult, SuccessEnvelope};

use crate::cli::{Cli, Commands, IsoDate};

pub fn dispatch(cli: &Cli) -> ClientResult<SuccessEnvelope> {
    match &cli.command {
        Commands::Run {
            path,
            format,
            substances,
            schedule,
            seed,
            persist,
            csv_out,
            json: _,
        } => commands::run::run_with_options(RunOptions {
            path: path.clone(),
            format: format.clone(),
            cadence: schedule.cadence.clone(),
            substances: substances.substances.clone(),
            minimum_tests_per_period: substances.minimum_tests_per_period,
            checkpoints: date_strings(&schedule.checkpoints),
            projection: schedule.projection.clone(),
            zero_chance_percent: schedule.zero_chance,
            seed: *seed,
            persist: *persist,
            csv_out: csv_out.clone(),
            home_override: None,
        }),
        Commands::Calendar {
            inception, cadence, ..
        } => commands::calendar::run(inception.as_str(), cadence.as_deref()),
        Commands::Trials {
            runs,
            seed,
            year,
            mu,
            sigma,
            substances,
            schedule,
            json: _,
        } => commands::trials::run(TrialsOptions {
            runs: *runs,
            seed: *seed,
            year: year.unwrap_or_else(current_year),
            mu: *mu,
            sigma: *sigma,
            cadence: schedule.cadence.clone(),
            substances: substances.substances.clone(),
            minimum_tests_per_period: substances.minimum_tests_per_period,
            checkpoints: date_strings(&schedule.checkpoints),
            projection: schedule.projection.clone(),
            zero_chance_percent: schedule.zero_chance,
        }),
        Commands::Generate {
            path,
            format,
            year,
            start,
            start_count,
            mu,
            sigma,
            seed,
            json: _,
        } => commands::generate::run(GenerateOptions {
            path: path.clone(),
            format: format.clone(),
            year: year
                .or_else(|| start.as_ref().and_then(date_year))
                .unwrap_or_else(current_year),
            start: start.as_ref().map(|date| date.as_str().to_string()),
            start_count: *start_count,
            mu: *mu,
            sigma: *sigma,
            seed: *seed,
        }),
    }
}

fn date_strings(dates: &[IsoDate]) -> Vec<String> {
    dates.iter().map(|date| date.as_str().to_string()).collect()
}

fn date_year(date: &IsoDate) -> Option<i32> {
    date.as_str().get(..4)?.parse::<i32>().ok()
}

fn current_year() -> i32 {
    Local::now().year()
}

#[cfg(test)]
mod tests {
    use crate::cli::parse_from;

    use super::dispatch;

    #[test]
    fn dispatches_to_expected_command_names() {
        let parsed = parse_from(["poolquota", "calendar", "2026-03-01", "--cadence", "bi-monthly"]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            let response = dispatch(&cli);
            assert!(response.is_ok());
            if let Ok(success) = response {
                assert_eq!(success.command, "calendar");
                assert_eq!(success.data["periods"].as_array().map(Vec::len), Some(5));
            }
        }
    }

    #[test]
    fn trials_uses_the_requested_year() {
        let parsed = parse_from(["poolquota", "trials", "--runs", "2", "--year", "2024"]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            let response = dispatch(&cli);
            assert!(response.is_ok());
            if let Ok(success) = response {
                assert_eq!(success.command, "trials");
                assert_eq!(success.data["year"], 2024);
                assert_eq!(success.data["checkpoints"][0], "2024-12-01");
            }
        }
    }

    #[test]
    fn missing_population_file_surfaces_as_a_client_error() {
        let parsed = parse_from(["poolquota", "run", "/no/such/pool.csv"]);
        assert!(parsed.is_ok());
        if let Ok(cli) = parsed {
            let response = dispatch(&cli);
            assert!(response.is_err());
            if let Err(error) = response {
                assert_eq!(error.code, "population_file_unreadable");
            }
        }
    }
}
