use chrono::NaiveDate;

use crate::calendar::{Cadence, parse_iso_date};
use crate::contracts::types::SubstanceContract;
use crate::quota::driver::CheckpointProjection;
use crate::quota::tracker::{SubstanceQuotaTracker, SubstanceSpec};
use crate::{ClientError, ClientResult};

pub const DEFAULT_SUBSTANCES: [(&str, f64); 2] = [("drug", 0.5), ("alcohol", 0.1)];

/// Month and day of the reconciliation checkpoints used when none are given.
pub const DEFAULT_CHECKPOINT_DAYS: [(u32, u32); 4] = [(12, 1), (12, 15), (12, 22), (12, 29)];

/// Parses `NAME=FRACTION`; an empty list falls back to `DEFAULT_SUBSTANCES`.
pub fn substance_specs(
    values: &[String],
    minimum_tests_per_period: u32,
    command: &str,
) -> ClientResult<Vec<SubstanceSpec>> {
    if values.is_empty() {
        return DEFAULT_SUBSTANCES
            .iter()
            .map(|(name, fraction)| SubstanceSpec::new(name, *fraction, minimum_tests_per_period))
            .collect();
    }

    values
        .iter()
        .map(|value| {
            let Some((name, fraction)) = value.split_once('=') else {
                return Err(ClientError::invalid_argument_for_command(
                    &format!("Substance `{value}` must use NAME=FRACTION, for example `drug=0.5`."),
                    Some(command),
                ));
            };
            let fraction = fraction.trim().parse::<f64>().map_err(|_| {
                ClientError::invalid_substance(name, &format!("`{fraction}` is not a number"))
            })?;
            SubstanceSpec::new(name, fraction, minimum_tests_per_period)
        })
        .collect()
}

pub fn new_trackers(specs: &[SubstanceSpec]) -> Vec<SubstanceQuotaTracker> {
    specs.iter().map(SubstanceQuotaTracker::new).collect()
}

pub fn substance_contracts(specs: &[SubstanceSpec]) -> Vec<SubstanceContract> {
    specs
        .iter()
        .map(|spec| SubstanceContract {
            name: spec.name().to_string(),
            fraction: spec.fraction(),
            minimum_tests_per_period: spec.minimum_tests_per_period(),
        })
        .collect()
}

pub fn parse_cadence(value: Option<&str>) -> ClientResult<Cadence> {
    match value {
        Some(text) => Cadence::parse(text),
        None => Ok(Cadence::Quarterly),
    }
}

pub fn parse_projection(value: Option<&str>) -> ClientResult<CheckpointProjection> {
    match value {
        Some(text) => CheckpointProjection::parse(text),
        None => Ok(CheckpointProjection::default()),
    }
}

pub fn parse_checkpoints(values: &[String]) -> ClientResult<Vec<NaiveDate>> {
    values
        .iter()
        .map(|value| parse_iso_date(value, "checkpoint"))
        .collect()
}

pub fn default_checkpoints(year: i32) -> Vec<NaiveDate> {
    DEFAULT_CHECKPOINT_DAYS
        .iter()
        .filter_map(|(month, day)| NaiveDate::from_ymd_opt(year, *month, *day))
        .collect()
}

pub fn validate_zero_chance(value: Option<u8>, command: &str) -> ClientResult<Option<u8>> {
    match value {
        Some(percent) if percent > 100 => Err(ClientError::invalid_argument_for_command(
            &format!("Zero-avoidance chance must be between 0 and 100, got {percent}."),
            Some(command),
        )),
        other => Ok(other),
    }
}

pub fn checkpoint_strings(checkpoints: &[NaiveDate]) -> Vec<String> {
    checkpoints
        .iter()
        .map(|date| date.format("%Y-%m-%d").to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{default_checkpoints, substance_specs, validate_zero_chance};

    #[test]
    fn empty_substance_list_uses_the_defaults() {
        let specs = substance_specs(&[], 2, "run");
        assert!(specs.is_ok());
        if let Ok(specs) = specs {
            let names = specs.iter().map(|spec| spec.name()).collect::<Vec<&str>>();
            assert_eq!(names, vec!["drug", "alcohol"]);
            assert!(specs.iter().all(|spec| spec.minimum_tests_per_period() == 2));
        }
    }

    #[test]
    fn substance_flags_need_name_and_fraction() {
        assert!(substance_specs(&["drug".to_string()], 0, "run").is_err());
        assert!(substance_specs(&["drug=lots".to_string()], 0, "run").is_err());
        assert!(substance_specs(&["drug=1.5".to_string()], 0, "run").is_err());

        let parsed = substance_specs(&["hair = 0.25".to_string()], 0, "run");
        assert!(parsed.is_ok());
        if let Ok(specs) = parsed {
            assert_eq!(specs[0].name(), "hair");
            assert!((specs[0].fraction() - 0.25).abs() < 1e-12);
        }
    }

    #[test]
    fn default_checkpoints_fall_in_december() {
        let checkpoints = default_checkpoints(2026);
        assert_eq!(checkpoints.len(), 4);
        assert!(checkpoints.iter().all(|date| date.format("%m").to_string() == "12"));
    }

    #[test]
    fn zero_chance_is_a_percentage() {
        assert!(validate_zero_chance(Some(101), "run").is_err());
        assert!(matches!(validate_zero_chance(Some(40), "run"), Ok(Some(40))));
        assert!(matches!(validate_zero_chance(None, "run"), Ok(None)));
    }
}
