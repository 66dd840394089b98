use std::path::Path;

use chrono::NaiveDate;
use serde_json::{Value, json};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
    pub recovery_steps: Vec<String>,
    pub data: Option<Value>,
}

impl ClientError {
    pub fn new(code: &str, message: &str, recovery_steps: Vec<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.to_string(),
            recovery_steps,
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn invalid_argument(message: &str) -> Self {
        Self::invalid_argument_for_command(message, None)
    }

    pub fn invalid_argument_for_command(message: &str, command: Option<&str>) -> Self {
        let help_hint = match command {
            Some(cmd) => format!("Run `poolquota {cmd} --help` for usage."),
            None => "Run `poolquota --help` for usage.".to_string(),
        };
        let error = Self::new("invalid_argument", message, vec![help_hint]);
        if let Some(cmd) = command {
            return error.with_data(json!({
                "command_hint": cmd,
            }));
        }
        error
    }

    pub fn invalid_argument_with_recovery(message: &str, recovery_steps: Vec<String>) -> Self {
        Self::new("invalid_argument", message, recovery_steps)
    }

    pub fn invalid_substance(name: &str, detail: &str) -> Self {
        Self::new(
            "invalid_substance",
            &format!("Substance `{name}` is invalid: {detail}"),
            vec![
                "Use a non-empty name and a fraction greater than 0 and at most 1.".to_string(),
                "Example: `--substance drug=0.5`.".to_string(),
            ],
        )
        .with_data(json!({
            "substance": name,
        }))
    }

    pub fn invalid_calendar(message: &str) -> Self {
        Self::new(
            "invalid_calendar",
            message,
            vec![
                "Period starts must be strictly increasing and fall in one calendar year."
                    .to_string(),
            ],
        )
    }

    pub fn missing_population_data(date: NaiveDate) -> Self {
        let day = date.format("%Y-%m-%d").to_string();
        Self::new(
            "missing_population_data",
            &format!("No population headcount is loaded for {day}."),
            vec![
                "Load a population series that covers every day of the requested range."
                    .to_string(),
            ],
        )
        .with_data(json!({
            "date": day,
        }))
    }

    pub fn population_gap(first_missing: NaiveDate, final_loaded: NaiveDate) -> Self {
        let missing = first_missing.format("%Y-%m-%d").to_string();
        let last = final_loaded.format("%Y-%m-%d").to_string();
        Self::new(
            "population_gap",
            &format!("Population series has a gap at {missing} before the final loaded date {last}."),
            vec!["Supply one headcount per day, or use the delta format to pad gaps.".to_string()],
        )
        .with_data(json!({
            "first_missing": missing,
            "final_loaded": last,
        }))
    }

    pub fn invalid_population(message: &str) -> Self {
        Self::new(
            "invalid_population",
            message,
            vec!["Population data must cover a single calendar year.".to_string()],
        )
    }

    pub fn population_parse_failed(row: usize, detail: &str) -> Self {
        Self::new(
            "population_parse_failed",
            &format!("Population row {row} could not be read: {detail}"),
            vec![
                "Each row must be `YYYY-MM-DD,<integer>`.".to_string(),
                "Rerun with `--format delta` if the file holds daily changes.".to_string(),
            ],
        )
        .with_data(json!({
            "row": row,
        }))
    }

    pub fn population_file_unreadable(path: &str, detail: &str) -> Self {
        Self::new(
            "population_file_unreadable",
            &format!("Could not read population file `{path}`: {detail}"),
            vec!["Check the path and that the file is readable.".to_string()],
        )
        .with_data(json!({
            "path": path,
        }))
    }

    pub fn report_write_failed(path: &str, detail: &str) -> Self {
        Self::new(
            "report_write_failed",
            &format!("Could not write `{path}`: {detail}"),
            vec!["Choose an output path in a writable directory.".to_string()],
        )
    }

    pub fn empty_averaging_window(start: NaiveDate, end: NaiveDate) -> Self {
        Self::new(
            "empty_averaging_window",
            &format!(
                "Cannot average population over an empty window {} .. {}.",
                start.format("%Y-%m-%d"),
                end.format("%Y-%m-%d")
            ),
            vec!["Check the period calendar; every period needs at least one day.".to_string()],
        )
    }

    pub fn period_out_of_order(tracker: &str, period_index: usize, detail: &str) -> Self {
        Self::new(
            "period_out_of_order",
            &format!("Tracker `{tracker}` cannot process period {period_index}: {detail}"),
            vec!["Process periods in index order: predict, then correct.".to_string()],
        )
        .with_data(json!({
            "tracker": tracker,
            "period_index": period_index,
        }))
    }

    pub fn invalid_period_fraction(value: f64) -> Self {
        Self::new(
            "invalid_argument",
            &format!("Period fraction of year must be in (0, 1], got {value}."),
            Vec::new(),
        )
    }

    pub fn internal_serialization(message: &str) -> Self {
        Self::new("internal_serialization_error", message, Vec::new())
    }

    pub fn blob_missing(name: &str) -> Self {
        Self::new(
            "state_not_found",
            &format!("Persisted state `{name}` was not found."),
            vec!["Open the period before closing it.".to_string()],
        )
    }

    pub fn store_locked(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "store_locked",
            &format!("State database is locked at `{location}`."),
            vec![format!(
                "Close other processes using `{location}` so the lock is released."
            )],
        )
    }

    pub fn store_corrupt(path: &Path) -> Self {
        let location = path.display().to_string();
        Self::new(
            "store_corrupt",
            &format!("State database appears corrupt at `{location}`."),
            vec![format!("Remove `{location}`; it is rebuilt on the next run.")],
        )
    }

    pub fn store_permission_denied(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "store_permission_denied",
            &format!("Cannot initialize state at `{location}`: {detail}"),
            vec![format!(
                "Grant write access to `{location}` or set `POOLQUOTA_HOME` to a writable directory."
            )],
        )
    }

    pub fn store_failed(path: &Path, detail: &str) -> Self {
        let location = path.display().to_string();
        Self::new(
            "store_failed",
            &format!("State store operation failed at `{location}`: {detail}"),
            Vec::new(),
        )
    }

    pub fn is_internal(&self) -> bool {
        self.code.starts_with("internal_") || self.code.starts_with("store_")
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::ClientError;

    #[test]
    fn missing_population_data_carries_the_date() {
        let day = NaiveDate::from_ymd_opt(2026, 3, 14);
        assert!(day.is_some());
        if let Some(value) = day {
            let error = ClientError::missing_population_data(value);
            assert_eq!(error.code, "missing_population_data");
            assert!(error.message.contains("2026-03-14"));
            assert_eq!(
                error.data.as_ref().and_then(|data| data["date"].as_str()),
                Some("2026-03-14")
            );
        }
    }

    #[test]
    fn store_errors_are_internal() {
        let error = ClientError::store_locked(std::path::Path::new("/tmp/state.db"));
        assert!(error.is_internal());
        assert!(!ClientError::invalid_argument("bad").is_internal());
    }
}
