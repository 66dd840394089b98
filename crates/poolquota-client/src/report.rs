use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::format_iso_date;
use crate::quota::driver::PeriodRecord;
use crate::quota::severity::UndercountSeverity;
use crate::quota::tracker::SubstanceQuotaTracker;
use crate::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodRow {
    pub period_index: usize,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub start_count: Option<u32>,
    pub true_average: Option<f64>,
    pub apriori_estimate: Option<f64>,
    pub predicted: u32,
    pub truth: Option<f64>,
    pub overcount_error: Option<f64>,
    pub cumulative_predicted: u64,
    pub cumulative_required: i64,
    pub cumulative_overcount: i64,
    pub pool_deviation: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciliationRow {
    pub checkpoint: NaiveDate,
    pub amount: u32,
}

/// Read-only summary of one tracker after (or during) a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackerReport {
    pub name: String,
    pub fraction: f64,
    pub minimum_tests_per_period: u32,
    pub periods: Vec<PeriodRow>,
    pub reconciliation: Vec<ReconciliationRow>,
    pub carried_reconciliation: u32,
    pub predicted_total: u64,
    pub reconciliation_total: u64,
    pub total_tests_prescribed: u64,
    pub tests_required: i64,
    pub final_overcount: i64,
    pub severity: UndercountSeverity,
    pub stale_operations: u32,
}

impl TrackerReport {
    /// `periods` supplies dates and headcounts; rows past its end carry only
    /// the tracker's own series.
    pub fn build(tracker: &SubstanceQuotaTracker, periods: &[PeriodRecord]) -> Self {
        let rows = (0..tracker.periods_predicted())
            .map(|index| {
                let record = periods.get(index);
                let truth = tracker.truth().get(index).copied();
                PeriodRow {
                    period_index: index,
                    start: record.map(|value| value.start),
                    end: record.map(|value| value.end),
                    start_count: record.map(|value| value.start_count),
                    true_average: record
                        .filter(|_| truth.is_some())
                        .map(|value| value.true_average),
                    apriori_estimate: tracker.apriori_estimates().get(index).copied(),
                    predicted: tracker.predicted_tests()[index],
                    truth,
                    overcount_error: tracker.overcount_error().get(index).copied(),
                    cumulative_predicted: tracker.predicted_sum_through(index),
                    cumulative_required: tracker.required_sum_through(index),
                    cumulative_overcount: tracker.overcount_through(index),
                    pool_deviation: tracker.pool_deviation(index),
                }
            })
            .collect();

        let reconciliation = tracker
            .reconciliation()
            .entries()
            .iter()
            .map(|(checkpoint, amount)| ReconciliationRow {
                checkpoint: *checkpoint,
                amount: *amount,
            })
            .collect();

        Self {
            name: tracker.name().to_string(),
            fraction: tracker.fraction(),
            minimum_tests_per_period: tracker.minimum_tests_per_period(),
            periods: rows,
            reconciliation,
            carried_reconciliation: tracker.reconciliation().carried(),
            predicted_total: tracker.predicted_total(),
            reconciliation_total: tracker.total_reconciliation(),
            total_tests_prescribed: tracker.total_tests_prescribed(),
            tests_required: tracker.tests_required(),
            final_overcount: tracker.final_overcount(),
            severity: tracker.severity(),
            stale_operations: tracker.stale_operations(),
        }
    }
}

const CSV_HEADERS: [&str; 14] = [
    "substance",
    "period",
    "start",
    "end",
    "start_count",
    "true_average",
    "apriori_estimate",
    "predicted",
    "truth",
    "overcount_error",
    "cumulative_predicted",
    "cumulative_required",
    "cumulative_overcount",
    "pool_deviation",
];

/// One CSV row per tracker period, trackers in the given order.
pub fn reports_to_csv(reports: &[TrackerReport]) -> ClientResult<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    writer.write_record(CSV_HEADERS).map_err(csv_error)?;

    for report in reports {
        for row in &report.periods {
            writer
                .write_record([
                    report.name.clone(),
                    (row.period_index + 1).to_string(),
                    optional_date(row.start),
                    optional_date(row.end),
                    optional(row.start_count.map(|value| value.to_string())),
                    optional_float(row.true_average),
                    optional_float(row.apriori_estimate),
                    row.predicted.to_string(),
                    optional_float(row.truth),
                    optional_float(row.overcount_error),
                    row.cumulative_predicted.to_string(),
                    row.cumulative_required.to_string(),
                    row.cumulative_overcount.to_string(),
                    optional_float(row.pool_deviation),
                ])
                .map_err(csv_error)?;
        }
    }

    let bytes = writer
        .into_inner()
        .map_err(|error| ClientError::internal_serialization(&error.to_string()))?;
    String::from_utf8(bytes).map_err(|error| ClientError::internal_serialization(&error.to_string()))
}

fn csv_error(error: csv::Error) -> ClientError {
    ClientError::internal_serialization(&error.to_string())
}

fn optional_date(value: Option<NaiveDate>) -> String {
    optional(value.map(|date| format_iso_date(&date)))
}

fn optional_float(value: Option<f64>) -> String {
    optional(value.map(|number| format!("{number:.4}")))
}

fn optional(value: Option<String>) -> String {
    value.unwrap_or_default()
}
