/// Snap distance used by every ceiling/floor in the quota engine.
pub const DISCRETIZE_EPSILON: f64 = 1e-10;

/// Snaps `value` onto the integer at or below its magnitude when the
/// fractional part is smaller than `DISCRETIZE_EPSILON`.
///
/// `3.0000000000001` becomes `3.0`, so a later `ceil` yields 3 rather than 4.
/// Values whose fractional part is larger are returned unchanged.
pub fn discretize(value: f64) -> f64 {
    discretize_with(value, DISCRETIZE_EPSILON)
}

pub fn discretize_with(value: f64, epsilon: f64) -> f64 {
    let magnitude = value.abs();
    let whole = magnitude.floor();
    if magnitude - whole < epsilon {
        if value < 0.0 {
            return -whole;
        }
        return whole;
    }
    value
}

/// `ceil(discretize(value))` as a test count, saturating at zero and `u32::MAX`.
pub fn ceil_count(value: f64) -> u32 {
    let rounded = discretize(value).ceil();
    if rounded.is_nan() || rounded <= 0.0 {
        return 0;
    }
    if rounded >= f64::from(u32::MAX) {
        return u32::MAX;
    }
    rounded as u32
}

/// `ceil(discretize(value))` without the non-negative clamp.
pub fn ceil_signed(value: f64) -> i64 {
    let rounded = discretize(value).ceil();
    if !rounded.is_finite() {
        return 0;
    }
    rounded as i64
}
