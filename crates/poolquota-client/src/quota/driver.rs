use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::calendar::{PeriodCalendar, format_iso_date};
use crate::population::PopulationSeries;
use crate::quota::policy::{MinimumOnly, PredictionFloor};
use crate::quota::tracker::{PredictOutcome, ReconcileOutcome, SubstanceQuotaTracker};
use crate::store::BlobStore;
use crate::{ClientError, ClientResult};

/// How the population after a reconciliation checkpoint is accounted for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CheckpointProjection {
    /// Average over inception..=checkpoint, weighted by that span's share of the year.
    ObservedOnly,
    /// The checkpoint headcount is carried through December 31 and the average
    /// is weighted by the share of the year from inception to December 31.
    #[default]
    CarryForward,
}

impl CheckpointProjection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ObservedOnly => "observed",
            Self::CarryForward => "carry-forward",
        }
    }

    pub fn parse(value: &str) -> ClientResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "observed" | "observed-only" => Ok(Self::ObservedOnly),
            "carry-forward" | "carry" => Ok(Self::CarryForward),
            _ => Err(ClientError::invalid_argument(&format!(
                "Unknown checkpoint projection `{value}`. Use `carry-forward` or `observed`."
            ))),
        }
    }
}

/// Population figures the driver fed to the trackers for one period.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PeriodRecord {
    pub period_index: usize,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub day_count: i64,
    pub fraction_of_year: f64,
    pub start_count: u32,
    pub true_average: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointRecord {
    pub checkpoint: NaiveDate,
    pub weighted_average: f64,
    pub top_ups: Vec<CheckpointTopUp>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckpointTopUp {
    pub tracker: String,
    pub shortfall: f64,
    pub amount: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodClose {
    pub record: PeriodRecord,
    pub checkpoints: Vec<CheckpointRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DriverRun {
    pub periods: Vec<PeriodRecord>,
    pub checkpoints: Vec<CheckpointRecord>,
    pub stale_operations: u32,
}

/// Drives trackers through every period of one pool year.
pub struct PeriodDriver<'a> {
    population: &'a PopulationSeries,
    calendar: PeriodCalendar,
    checkpoints: Vec<NaiveDate>,
    projection: CheckpointProjection,
    floor: Box<dyn PredictionFloor + 'a>,
}

impl<'a> PeriodDriver<'a> {
    /// The calendar is clamped to the population's inception, and the
    /// population must be gap-free through its final loaded date.
    pub fn new(population: &'a PopulationSeries, calendar: &PeriodCalendar) -> ClientResult<Self> {
        population.validate_contiguous()?;
        if population.inception() > calendar.year_end()
            || population.final_loaded_date() < calendar.inception()
        {
            return Err(ClientError::invalid_calendar(&format!(
                "Population {} .. {} does not overlap the calendar {} .. {}.",
                format_iso_date(&population.inception()),
                format_iso_date(&population.final_loaded_date()),
                format_iso_date(&calendar.inception()),
                format_iso_date(&calendar.year_end())
            )));
        }
        let calendar = if population.inception() > calendar.inception() {
            calendar.clamped_to(population.inception())?
        } else {
            calendar.clone()
        };

        Ok(Self {
            population,
            calendar,
            checkpoints: Vec::new(),
            projection: CheckpointProjection::default(),
            floor: Box::new(MinimumOnly),
        })
    }

    /// Checkpoints on or before the inception are skipped; ones after the
    /// year end are rejected.
    pub fn with_checkpoints(mut self, checkpoints: &[NaiveDate]) -> ClientResult<Self> {
        let inception = self.calendar.inception();
        let mut accepted = BTreeSet::new();
        for checkpoint in checkpoints {
            if *checkpoint > self.calendar.year_end() {
                return Err(ClientError::invalid_argument(&format!(
                    "Checkpoint {} falls after the year end {}.",
                    format_iso_date(checkpoint),
                    format_iso_date(&self.calendar.year_end())
                )));
            }
            if *checkpoint <= inception {
                tracing::debug!(
                    checkpoint = %checkpoint,
                    inception = %inception,
                    "checkpoint on or before inception skipped"
                );
                continue;
            }
            accepted.insert(*checkpoint);
        }
        self.checkpoints = accepted.into_iter().collect();
        Ok(self)
    }

    pub fn with_projection(mut self, projection: CheckpointProjection) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_floor(mut self, floor: Box<dyn PredictionFloor + 'a>) -> Self {
        self.floor = floor;
        self
    }

    pub fn calendar(&self) -> &PeriodCalendar {
        &self.calendar
    }

    pub fn checkpoints(&self) -> &[NaiveDate] {
        &self.checkpoints
    }

    pub fn projection(&self) -> CheckpointProjection {
        self.projection
    }

    pub fn period_count(&self) -> usize {
        self.calendar.period_count()
    }

    pub fn start_count(&self, period_index: usize) -> ClientResult<u32> {
        let (start, _) = self.bounds(period_index)?;
        self.population.count_on(start)
    }

    pub fn true_average(&self, period_index: usize) -> ClientResult<f64> {
        let (start, end) = self.bounds(period_index)?;
        self.population.average_between(start, end)
    }

    pub fn period_fraction(&self, period_index: usize) -> ClientResult<f64> {
        self.calendar
            .fraction_of_year(period_index)
            .ok_or_else(|| self.unknown_period(period_index))
    }

    /// Year-weighted average population used to reconcile at `checkpoint`.
    pub fn checkpoint_weighted_average(&self, checkpoint: NaiveDate) -> ClientResult<f64> {
        let inception = self.calendar.inception();
        match self.projection {
            CheckpointProjection::ObservedOnly => {
                let average = self.population.average_between(inception, checkpoint)?;
                Ok(average * self.calendar.span_fraction(inception, checkpoint))
            }
            CheckpointProjection::CarryForward => {
                let year_end = self.calendar.year_end();
                let average = self
                    .population
                    .carried_average(inception, checkpoint, year_end)?;
                Ok(average * self.calendar.span_fraction(inception, year_end))
            }
        }
    }

    /// Predicts `period_index` for every tracker from the headcount on its first day.
    pub fn open_period(
        &mut self,
        period_index: usize,
        trackers: &mut [SubstanceQuotaTracker],
    ) -> ClientResult<Vec<PredictOutcome>> {
        let start_count = self.start_count(period_index)?;
        let fraction = self.period_fraction(period_index)?;

        let mut outcomes = Vec::with_capacity(trackers.len());
        for tracker in trackers.iter_mut() {
            outcomes.push(tracker.predict_with_floor(
                period_index,
                start_count,
                fraction,
                self.floor.as_mut(),
            )?);
        }
        Ok(outcomes)
    }

    /// Corrects `period_index` with the period's true average. After the last
    /// period every checkpoint is reconciled in date order.
    pub fn close_period(
        &mut self,
        period_index: usize,
        trackers: &mut [SubstanceQuotaTracker],
    ) -> ClientResult<PeriodClose> {
        let record = self.period_record(period_index)?;
        for tracker in trackers.iter_mut() {
            tracker.correct(period_index, record.true_average, record.fraction_of_year)?;
        }

        let mut checkpoints = Vec::new();
        if period_index + 1 == self.period_count() {
            for checkpoint in self.checkpoints.clone() {
                checkpoints.push(self.reconcile_checkpoint(checkpoint, trackers)?);
            }
        }

        Ok(PeriodClose {
            record,
            checkpoints,
        })
    }

    /// Runs every period in memory.
    pub fn run(&mut self, trackers: &mut [SubstanceQuotaTracker]) -> ClientResult<DriverRun> {
        ensure_unique_names(trackers)?;
        let stale_before = stale_total(trackers);

        let mut run = DriverRun::default();
        for period_index in 0..self.period_count() {
            self.open_period(period_index, trackers)?;
            let closed = self.close_period(period_index, trackers)?;
            run.periods.push(closed.record);
            run.checkpoints.extend(closed.checkpoints);
        }

        run.stale_operations = stale_total(trackers) - stale_before;
        log_final_outcomes(trackers);
        Ok(run)
    }

    /// Like `run`, but every tracker is written to `store` after each half of a
    /// period and read back before the next half.
    pub fn run_persisted(
        &mut self,
        trackers: &mut [SubstanceQuotaTracker],
        store: &mut dyn BlobStore,
        run_key: &str,
    ) -> ClientResult<DriverRun> {
        ensure_unique_names(trackers)?;
        let stale_before = stale_total(trackers);
        save_trackers(store, run_key, trackers)?;

        let mut run = DriverRun::default();
        for period_index in 0..self.period_count() {
            load_trackers(store, run_key, trackers)?;
            self.open_period(period_index, trackers)?;
            save_trackers(store, run_key, trackers)?;

            load_trackers(store, run_key, trackers)?;
            let closed = self.close_period(period_index, trackers)?;
            save_trackers(store, run_key, trackers)?;

            run.periods.push(closed.record);
            run.checkpoints.extend(closed.checkpoints);
        }

        load_trackers(store, run_key, trackers)?;
        run.stale_operations = stale_total(trackers) - stale_before;
        log_final_outcomes(trackers);
        Ok(run)
    }

    fn reconcile_checkpoint(
        &self,
        checkpoint: NaiveDate,
        trackers: &mut [SubstanceQuotaTracker],
    ) -> ClientResult<CheckpointRecord> {
        let weighted_average = self.checkpoint_weighted_average(checkpoint)?;
        let mut top_ups = Vec::new();
        for tracker in trackers.iter_mut() {
            if let ReconcileOutcome::ToppedUp { shortfall, amount } =
                tracker.reconcile(weighted_average, checkpoint)?
            {
                top_ups.push(CheckpointTopUp {
                    tracker: tracker.name().to_string(),
                    shortfall,
                    amount,
                });
            }
        }
        Ok(CheckpointRecord {
            checkpoint,
            weighted_average,
            top_ups,
        })
    }

    fn period_record(&self, period_index: usize) -> ClientResult<PeriodRecord> {
        let (start, end) = self.bounds(period_index)?;
        let day_count = self
            .calendar
            .day_count(period_index)
            .ok_or_else(|| self.unknown_period(period_index))?;
        Ok(PeriodRecord {
            period_index,
            start,
            end,
            day_count,
            fraction_of_year: self.period_fraction(period_index)?,
            start_count: self.population.count_on(start)?,
            true_average: self.population.average_between(start, end)?,
        })
    }

    fn bounds(&self, period_index: usize) -> ClientResult<(NaiveDate, NaiveDate)> {
        self.calendar
            .bounds(period_index)
            .ok_or_else(|| self.unknown_period(period_index))
    }

    fn unknown_period(&self, period_index: usize) -> ClientError {
        ClientError::invalid_argument(&format!(
            "Period {period_index} does not exist; the calendar has {} periods.",
            self.calendar.period_count()
        ))
    }
}

pub fn tracker_blob_name(run_key: &str, tracker_name: &str) -> String {
    format!("{run_key}/{tracker_name}")
}

fn save_trackers(
    store: &mut dyn BlobStore,
    run_key: &str,
    trackers: &[SubstanceQuotaTracker],
) -> ClientResult<()> {
    for tracker in trackers {
        store.write_blob(&tracker_blob_name(run_key, tracker.name()), &tracker.to_json()?)?;
    }
    Ok(())
}

fn load_trackers(
    store: &dyn BlobStore,
    run_key: &str,
    trackers: &mut [SubstanceQuotaTracker],
) -> ClientResult<()> {
    for tracker in trackers.iter_mut() {
        let name = tracker_blob_name(run_key, tracker.name());
        let Some(body) = store.read_blob(&name)? else {
            return Err(ClientError::blob_missing(&name));
        };
        *tracker = SubstanceQuotaTracker::from_json(&body)?;
    }
    Ok(())
}

fn ensure_unique_names(trackers: &[SubstanceQuotaTracker]) -> ClientResult<()> {
    let mut seen = BTreeSet::new();
    for tracker in trackers {
        if !seen.insert(tracker.name()) {
            return Err(ClientError::invalid_substance(
                tracker.name(),
                "each substance may only be listed once",
            ));
        }
    }
    Ok(())
}

fn stale_total(trackers: &[SubstanceQuotaTracker]) -> u32 {
    trackers.iter().map(SubstanceQuotaTracker::stale_operations).sum()
}

fn log_final_outcomes(trackers: &[SubstanceQuotaTracker]) {
    for tracker in trackers {
        let final_overcount = tracker.final_overcount();
        let severity = tracker.severity();
        if severity.is_undercount() {
            tracing::warn!(
                tracker = %tracker.name(),
                final_overcount,
                severity = severity.as_str(),
                "year closed under-prescribed"
            );
        } else if final_overcount > 0 {
            tracing::warn!(
                tracker = %tracker.name(),
                final_overcount,
                "year closed over-prescribed"
            );
        } else {
            tracing::debug!(tracker = %tracker.name(), "year closed exact");
        }
    }
}
