use std::collections::BTreeMap;

use serde::Serialize;

use crate::quota::driver::{CheckpointRecord, PeriodRecord};
use crate::report::TrackerReport;

#[derive(Debug, Clone, Serialize)]
pub struct SubstanceContract {
    pub name: String,
    pub fraction: f64,
    pub minimum_tests_per_period: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PersistedRun {
    pub run_key: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunData {
    pub path: String,
    pub format: String,
    pub cadence: String,
    pub projection: String,
    pub inception: String,
    pub year_end: String,
    pub final_loaded_date: String,
    pub substances: Vec<SubstanceContract>,
    pub checkpoints: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_chance_percent: Option<u8>,
    pub zero_avoidance_forced: u32,
    pub periods: Vec<PeriodRecord>,
    pub reconciliations: Vec<CheckpointRecord>,
    pub stale_operations: u32,
    pub trackers: Vec<TrackerReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persisted: Option<PersistedRun>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub csv_path: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarPeriod {
    pub period_index: usize,
    pub start: String,
    pub end: String,
    pub day_count: i64,
    pub fraction_of_year: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CalendarData {
    pub inception: String,
    pub cadence: String,
    pub year_end: String,
    pub days_in_year: i64,
    pub periods: Vec<CalendarPeriod>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialSubstanceSummary {
    pub name: String,
    pub fraction: f64,
    /// Final overcount -> number of runs that ended there.
    pub overcount_histogram: BTreeMap<i64, u32>,
    /// Severity class -> number of runs.
    pub severity_counts: BTreeMap<String, u32>,
    pub worst_overcount: i64,
    pub total_reconciliation: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TrialsData {
    pub runs: usize,
    pub seed: u64,
    pub year: i32,
    pub mu: f64,
    pub sigma: f64,
    pub cadence: String,
    pub projection: String,
    pub checkpoints: Vec<String>,
    pub substances: Vec<TrialSubstanceSummary>,
    pub stale_operations: u32,
    pub runs_with_undercount: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateData {
    pub path: String,
    pub format: String,
    pub seed: u64,
    pub mu: f64,
    pub sigma: f64,
    pub inception: String,
    pub start_count: u32,
    pub final_count: u32,
    pub days: usize,
}
