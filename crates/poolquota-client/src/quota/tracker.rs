use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::quota::discretize::{DISCRETIZE_EPSILON, ceil_count, ceil_signed, discretize};
use crate::quota::policy::{MinimumOnly, PredictionFloor};
use crate::quota::reconciliation::Reconciliation;
use crate::quota::severity::UndercountSeverity;
use crate::{ClientError, ClientResult};

/// Validated description of one substance's testing requirement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubstanceSpec {
    name: String,
    fraction: f64,
    minimum_tests_per_period: u32,
}

impl SubstanceSpec {
    pub fn new(name: &str, fraction: f64, minimum_tests_per_period: u32) -> ClientResult<Self> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(ClientError::invalid_substance(name, "name must not be empty"));
        }
        validate_fraction(trimmed, fraction)?;
        Ok(Self {
            name: trimmed.to_string(),
            fraction,
            minimum_tests_per_period,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn minimum_tests_per_period(&self) -> u32 {
        self.minimum_tests_per_period
    }
}

fn validate_fraction(name: &str, fraction: f64) -> ClientResult<()> {
    if !fraction.is_finite() || fraction <= 0.0 || fraction > 1.0 {
        return Err(ClientError::invalid_substance(
            name,
            &format!("fraction must be greater than 0 and at most 1, got {fraction}"),
        ));
    }
    Ok(())
}

fn validate_period_fraction(period_fraction_of_year: f64) -> ClientResult<()> {
    if !period_fraction_of_year.is_finite()
        || period_fraction_of_year <= 0.0
        || period_fraction_of_year > 1.0
    {
        return Err(ClientError::invalid_period_fraction(period_fraction_of_year));
    }
    Ok(())
}

fn validate_population_value(label: &str, value: f64) -> ClientResult<()> {
    if !value.is_finite() || value < 0.0 {
        return Err(ClientError::invalid_argument(&format!(
            "{label} must be a finite non-negative number, got {value}."
        )));
    }
    Ok(())
}

/// The numbers behind one appended prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PredictionStep {
    pub period_index: usize,
    pub apriori_estimate: f64,
    pub offset: f64,
    pub prediction: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PredictOutcome {
    Predicted(PredictionStep),
    /// The period already had a prediction; nothing changed.
    Stale { stored: u32, ignored: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CorrectOutcome {
    Corrected { truth: f64, overcount_error: f64 },
    /// The period was already corrected; nothing changed.
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReconcileOutcome {
    ToppedUp { shortfall: f64, amount: u32 },
    Covered { shortfall: f64 },
}

/// Per-substance predict/correct/reconcile state machine.
///
/// `predicted_tests` is append-only. `truth` and `overcount_error` trail it by
/// at most one entry, which is the state between a period's prediction and
/// its correction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TrackerRecord")]
pub struct SubstanceQuotaTracker {
    name: String,
    fraction: f64,
    minimum_tests_per_period: u32,
    predicted_tests: Vec<u32>,
    apriori_estimate: Vec<f64>,
    truth: Vec<f64>,
    overcount_error: Vec<f64>,
    reconciliation: Reconciliation,
    stale_operations: u32,
}

#[derive(Deserialize)]
struct TrackerRecord {
    name: String,
    fraction: f64,
    #[serde(default, alias = "min_number_tests_per_period")]
    minimum_tests_per_period: u32,
    #[serde(default)]
    predicted_tests: Vec<u32>,
    #[serde(default)]
    apriori_estimate: Vec<f64>,
    #[serde(default)]
    truth: Vec<f64>,
    #[serde(default)]
    overcount_error: Vec<f64>,
    #[serde(default)]
    reconciliation: Reconciliation,
    #[serde(default)]
    stale_operations: u32,
}

impl TryFrom<TrackerRecord> for SubstanceQuotaTracker {
    type Error = ClientError;

    fn try_from(record: TrackerRecord) -> Result<Self, Self::Error> {
        let spec = SubstanceSpec::new(
            &record.name,
            record.fraction,
            record.minimum_tests_per_period,
        )?;
        if record.truth.len() != record.overcount_error.len() {
            return Err(ClientError::internal_serialization(&format!(
                "tracker `{}` has {} truth entries but {} overcount entries",
                spec.name,
                record.truth.len(),
                record.overcount_error.len()
            )));
        }
        if record.truth.len() > record.predicted_tests.len()
            || record.predicted_tests.len() - record.truth.len() > 1
        {
            return Err(ClientError::internal_serialization(&format!(
                "tracker `{}` has {} predictions but {} corrected periods",
                spec.name,
                record.predicted_tests.len(),
                record.truth.len()
            )));
        }
        if record.apriori_estimate.len() > record.predicted_tests.len() {
            return Err(ClientError::internal_serialization(&format!(
                "tracker `{}` has more apriori estimates than predictions",
                spec.name
            )));
        }
        if let Some(low) = record
            .predicted_tests
            .iter()
            .find(|value| **value < spec.minimum_tests_per_period)
        {
            return Err(ClientError::internal_serialization(&format!(
                "tracker `{}` stores prediction {low} below its minimum {}",
                spec.name, spec.minimum_tests_per_period
            )));
        }

        Ok(Self {
            name: spec.name,
            fraction: spec.fraction,
            minimum_tests_per_period: spec.minimum_tests_per_period,
            predicted_tests: record.predicted_tests,
            apriori_estimate: record.apriori_estimate,
            truth: record.truth,
            overcount_error: record.overcount_error,
            reconciliation: record.reconciliation,
            stale_operations: record.stale_operations,
        })
    }
}

impl SubstanceQuotaTracker {
    pub fn new(spec: &SubstanceSpec) -> Self {
        Self {
            name: spec.name.clone(),
            fraction: spec.fraction,
            minimum_tests_per_period: spec.minimum_tests_per_period,
            predicted_tests: Vec::new(),
            apriori_estimate: Vec::new(),
            truth: Vec::new(),
            overcount_error: Vec::new(),
            reconciliation: Reconciliation::default(),
            stale_operations: 0,
        }
    }

    pub fn from_json(text: &str) -> ClientResult<Self> {
        serde_json::from_str::<Self>(text)
            .map_err(|error| ClientError::internal_serialization(&error.to_string()))
    }

    pub fn to_json(&self) -> ClientResult<String> {
        serde_json::to_string(self)
            .map_err(|error| ClientError::internal_serialization(&error.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fraction(&self) -> f64 {
        self.fraction
    }

    pub fn minimum_tests_per_period(&self) -> u32 {
        self.minimum_tests_per_period
    }

    pub fn predicted_tests(&self) -> &[u32] {
        &self.predicted_tests
    }

    pub fn apriori_estimates(&self) -> &[f64] {
        &self.apriori_estimate
    }

    pub fn truth(&self) -> &[f64] {
        &self.truth
    }

    pub fn overcount_error(&self) -> &[f64] {
        &self.overcount_error
    }

    pub fn reconciliation(&self) -> &Reconciliation {
        &self.reconciliation
    }

    pub fn total_reconciliation(&self) -> u64 {
        self.reconciliation.total()
    }

    pub fn stale_operations(&self) -> u32 {
        self.stale_operations
    }

    pub fn periods_predicted(&self) -> usize {
        self.predicted_tests.len()
    }

    pub fn periods_corrected(&self) -> usize {
        self.truth.len()
    }

    /// True between a period's prediction and its correction.
    pub fn awaiting_correction(&self) -> bool {
        self.predicted_tests.len() > self.truth.len()
    }

    /// Running sum of overcount errors; positive is a banked surplus.
    pub fn cumulative_overcount_error(&self) -> f64 {
        self.overcount_error.iter().sum()
    }

    pub fn predicted_total(&self) -> u64 {
        self.predicted_tests.iter().map(|value| u64::from(*value)).sum()
    }

    pub fn total_tests_prescribed(&self) -> u64 {
        self.predicted_total() + self.reconciliation.total()
    }

    pub fn tests_required(&self) -> i64 {
        ceil_signed(self.truth.iter().sum())
    }

    /// Apriori quota for `period_index`, offset by the banked error of earlier periods.
    pub fn predict(
        &mut self,
        period_index: usize,
        start_count: u32,
        period_fraction_of_year: f64,
    ) -> ClientResult<PredictOutcome> {
        self.predict_with_floor(
            period_index,
            start_count,
            period_fraction_of_year,
            &mut MinimumOnly,
        )
    }

    pub fn predict_with_floor(
        &mut self,
        period_index: usize,
        start_count: u32,
        period_fraction_of_year: f64,
        floor: &mut dyn PredictionFloor,
    ) -> ClientResult<PredictOutcome> {
        let weighted_start_pop = period_fraction_of_year * f64::from(start_count);
        let apriori_estimate = weighted_start_pop * self.fraction;
        let previous_error = self.cumulative_overcount_error();
        let offset = apriori_estimate.min(previous_error);
        let raw = discretize(apriori_estimate - offset);
        let prediction = ceil_count(raw).max(self.minimum_tests_per_period);

        if period_index < self.predicted_tests.len() {
            let stored = self.predicted_tests[period_index];
            self.stale_operations += 1;
            tracing::warn!(
                tracker = %self.name,
                period_index,
                stored,
                ignored = prediction,
                stale_operations = self.stale_operations,
                "stale prediction ignored"
            );
            return Ok(PredictOutcome::Stale {
                stored,
                ignored: prediction,
            });
        }
        validate_period_fraction(period_fraction_of_year)?;
        if period_index > self.predicted_tests.len() {
            return Err(ClientError::period_out_of_order(
                &self.name,
                period_index,
                &format!(
                    "period {} has not been predicted yet",
                    self.predicted_tests.len()
                ),
            ));
        }
        if self.awaiting_correction() {
            return Err(ClientError::period_out_of_order(
                &self.name,
                period_index,
                &format!("period {} has not been corrected yet", self.truth.len()),
            ));
        }

        let prediction = prediction.max(floor.raise(&self.name, apriori_estimate, prediction));
        self.predicted_tests.push(prediction);
        self.apriori_estimate.push(apriori_estimate);

        tracing::debug!(
            tracker = %self.name,
            period_index,
            start_count,
            period_fraction_of_year,
            apriori_estimate,
            previous_error,
            offset,
            prediction,
            "period predicted"
        );

        Ok(PredictOutcome::Predicted(PredictionStep {
            period_index,
            apriori_estimate,
            offset,
            prediction,
        }))
    }

    /// Records the aposteriori truth for `period_index` and its overcount error.
    pub fn correct(
        &mut self,
        period_index: usize,
        true_average_count: f64,
        period_fraction_of_year: f64,
    ) -> ClientResult<CorrectOutcome> {
        if period_index < self.truth.len() {
            self.stale_operations += 1;
            tracing::warn!(
                tracker = %self.name,
                period_index,
                stale_operations = self.stale_operations,
                "stale correction ignored"
            );
            return Ok(CorrectOutcome::Stale);
        }
        validate_period_fraction(period_fraction_of_year)?;
        validate_population_value("true average population", true_average_count)?;
        if period_index > self.truth.len() || period_index >= self.predicted_tests.len() {
            return Err(ClientError::period_out_of_order(
                &self.name,
                period_index,
                "correction must follow the prediction for the same period",
            ));
        }

        let truth = true_average_count * period_fraction_of_year * self.fraction;
        let overcount_error = f64::from(self.predicted_tests[period_index]) - truth;
        self.truth.push(truth);
        self.overcount_error.push(overcount_error);

        tracing::debug!(
            tracker = %self.name,
            period_index,
            true_average_count,
            truth,
            overcount_error,
            "period corrected"
        );

        Ok(CorrectOutcome::Corrected {
            truth,
            overcount_error,
        })
    }

    /// Tops up the year's prescription when a late checkpoint shows a shortfall.
    pub fn reconcile(
        &mut self,
        weighted_avg_pop_at_checkpoint: f64,
        checkpoint: NaiveDate,
    ) -> ClientResult<ReconcileOutcome> {
        validate_population_value(
            "weighted checkpoint population",
            weighted_avg_pop_at_checkpoint,
        )?;

        let best_truth = weighted_avg_pop_at_checkpoint * self.fraction;
        let shortfall =
            best_truth - self.predicted_total() as f64 - self.reconciliation.total() as f64;
        let amount = if shortfall > 0.0 {
            ceil_count(shortfall)
        } else {
            0
        };

        if amount == 0 {
            tracing::debug!(
                tracker = %self.name,
                checkpoint = %checkpoint,
                best_truth,
                shortfall,
                "checkpoint already covered"
            );
            return Ok(ReconcileOutcome::Covered { shortfall });
        }

        let entry = self.reconciliation.top_up(checkpoint, amount);
        tracing::debug!(
            tracker = %self.name,
            checkpoint = %checkpoint,
            best_truth,
            shortfall,
            amount,
            entry,
            "checkpoint reconciliation recorded"
        );
        Ok(ReconcileOutcome::ToppedUp { shortfall, amount })
    }

    /// Prescribed total minus the required total; negative means under-prescribed.
    pub fn final_overcount(&self) -> i64 {
        let prescribed = i64::try_from(self.total_tests_prescribed()).unwrap_or(i64::MAX);
        prescribed - self.tests_required()
    }

    pub fn severity(&self) -> UndercountSeverity {
        UndercountSeverity::classify(self.final_overcount())
    }

    pub fn required_sum_through(&self, period_index: usize) -> i64 {
        let end = (period_index + 1).min(self.truth.len());
        ceil_signed(self.truth[..end].iter().sum())
    }

    pub fn predicted_sum_through(&self, period_index: usize) -> u64 {
        let end = (period_index + 1).min(self.predicted_tests.len());
        self.predicted_tests[..end]
            .iter()
            .map(|value| u64::from(*value))
            .sum()
    }

    pub fn overcount_through(&self, period_index: usize) -> i64 {
        let predicted = i64::try_from(self.predicted_sum_through(period_index)).unwrap_or(i64::MAX);
        predicted - self.required_sum_through(period_index)
    }

    /// Relative change between the apriori estimate and the truth for one period.
    pub fn pool_deviation(&self, period_index: usize) -> Option<f64> {
        let estimate = *self.apriori_estimate.get(period_index)?;
        let truth = *self.truth.get(period_index)?;
        if estimate < DISCRETIZE_EPSILON {
            return Some(0.0);
        }
        Some((truth - estimate) / estimate)
    }
}
