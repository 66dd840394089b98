pub mod discretize;
pub mod driver;
pub mod policy;
pub mod reconciliation;
pub mod severity;
pub mod tracker;

pub use discretize::{DISCRETIZE_EPSILON, discretize};
pub use driver::{CheckpointProjection, DriverRun, PeriodDriver, PeriodRecord};
pub use policy::{MinimumOnly, PredictionFloor, ZeroAvoidance};
pub use reconciliation::Reconciliation;
pub use severity::UndercountSeverity;
pub use tracker::{
    CorrectOutcome, PredictOutcome, PredictionStep, ReconcileOutcome, SubstanceQuotaTracker,
    SubstanceSpec,
};
