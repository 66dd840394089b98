use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Post-rounding hook applied to a prediction before it is appended.
///
/// The tracker keeps the larger of the incoming prediction and the returned
/// value, so an implementation can raise a quota but never lower it.
pub trait PredictionFloor {
    fn raise(&mut self, tracker_name: &str, apriori_estimate: f64, prediction: u32) -> u32;
}

impl<T: PredictionFloor + ?Sized> PredictionFloor for &mut T {
    fn raise(&mut self, tracker_name: &str, apriori_estimate: f64, prediction: u32) -> u32 {
        (**self).raise(tracker_name, apriori_estimate, prediction)
    }
}

/// No extra policy: only `minimum_tests_per_period` applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinimumOnly;

impl PredictionFloor for MinimumOnly {
    fn raise(&mut self, _tracker_name: &str, _apriori_estimate: f64, prediction: u32) -> u32 {
        prediction
    }
}

/// Turns a zero quota into one test with probability `chance_percent`%.
///
/// Periods with no positive apriori estimate (an empty pool) stay at zero.
#[derive(Debug, Clone)]
pub struct ZeroAvoidance {
    chance_percent: u8,
    rng: SmallRng,
    forced: u32,
}

impl ZeroAvoidance {
    pub fn new(chance_percent: u8, seed: u64) -> Self {
        Self {
            chance_percent: chance_percent.min(100),
            rng: SmallRng::seed_from_u64(seed),
            forced: 0,
        }
    }

    pub fn chance_percent(&self) -> u8 {
        self.chance_percent
    }

    /// Number of zero predictions this policy has raised to one.
    pub fn forced(&self) -> u32 {
        self.forced
    }
}

impl PredictionFloor for ZeroAvoidance {
    fn raise(&mut self, tracker_name: &str, apriori_estimate: f64, prediction: u32) -> u32 {
        if prediction > 0 || apriori_estimate <= 0.0 || self.chance_percent == 0 {
            return prediction;
        }
        let roll = self.rng.random_range(0..100u8);
        if roll < self.chance_percent {
            self.forced += 1;
            tracing::debug!(
                tracker = tracker_name,
                apriori_estimate,
                chance_percent = self.chance_percent,
                "zero quota raised to one test"
            );
            return 1;
        }
        prediction
    }
}

#[cfg(test)]
mod tests {
    use super::{MinimumOnly, PredictionFloor, ZeroAvoidance};

    #[test]
    fn minimum_only_passes_predictions_through() {
        let mut floor = MinimumOnly;
        assert_eq!(floor.raise("drug", 0.4, 0), 0);
        assert_eq!(floor.raise("drug", 7.2, 8), 8);
    }

    #[test]
    fn certain_chance_always_raises_zero() {
        let mut floor = ZeroAvoidance::new(100, 7);
        for _ in 0..20 {
            assert_eq!(floor.raise("alcohol", 0.3, 0), 1);
        }
        assert_eq!(floor.forced(), 20);
    }

    #[test]
    fn zero_chance_never_raises() {
        let mut floor = ZeroAvoidance::new(0, 7);
        assert_eq!(floor.raise("alcohol", 0.3, 0), 0);
        assert_eq!(floor.forced(), 0);
    }

    #[test]
    fn empty_pool_and_positive_predictions_are_untouched() {
        let mut floor = ZeroAvoidance::new(100, 11);
        assert_eq!(floor.raise("drug", 0.0, 0), 0);
        assert_eq!(floor.raise("drug", 4.0, 3), 3);
        assert_eq!(floor.forced(), 0);
    }

    #[test]
    fn same_seed_gives_the_same_sequence() {
        let mut left = ZeroAvoidance::new(50, 99);
        let mut right = ZeroAvoidance::new(50, 99);
        for _ in 0..32 {
            assert_eq!(left.raise("drug", 0.2, 0), right.raise("drug", 0.2, 0));
        }
    }
}
