//! Tolerant floating-point comparisons for time bookkeeping.
//!
//! Every equality or ordering decision on simulation time goes through these
//! predicates. They use a mixed absolute/relative tolerance so that both
//! times near zero and large accumulated times compare stably:
//! `|a - b| <= eps * max(1, |a|, |b|)`.

/// Tolerance used by all time comparisons.
pub const NUMERICAL_TOLERANCE: f64 = 1e-12;

fn scale(a: f64, b: f64) -> f64 {
    1.0_f64.max(a.abs()).max(b.abs())
}

/// True if `a` and `b` are equal within tolerance.
pub fn equals(a: f64, b: f64) -> bool {
    (a - b).abs() <= NUMERICAL_TOLERANCE * scale(a, b)
}

/// True if `a` is greater than `b` beyond tolerance.
pub fn greater(a: f64, b: f64) -> bool {
    a - b > NUMERICAL_TOLERANCE * scale(a, b)
}

/// True if `a` is greater than or tolerantly equal to `b`.
pub fn greater_equals(a: f64, b: f64) -> bool {
    a - b >= -NUMERICAL_TOLERANCE * scale(a, b)
}

/// True if `a` is smaller than `b` beyond tolerance.
pub fn smaller(a: f64, b: f64) -> bool {
    greater(b, a)
}
