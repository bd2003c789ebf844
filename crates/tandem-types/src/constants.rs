//! Sentinel values used by the coupling configuration.
//!
//! A negative sentinel marks a limit as "not configured". They are plain
//! constants rather than `Option`s because they travel through configuration
//! files and log output in exactly this form.

/// No time limit for the coupled simulation.
pub const UNDEFINED_TIME: f64 = -1.0;

/// No limit on the number of time windows.
pub const UNDEFINED_TIME_WINDOWS: i32 = -1;

/// The time window size is negotiated dynamically during the coupling.
pub const UNDEFINED_TIME_WINDOW_SIZE: f64 = -1.0;

/// No minimal iteration count configured (explicit coupling).
pub const UNDEFINED_MIN_ITERATIONS: i32 = -2;

/// No maximal iteration count configured (explicit coupling).
pub const UNDEFINED_MAX_ITERATIONS: i32 = -2;

/// Implicit coupling iterates until convergence without an upper bound.
pub const INFINITE_MAX_ITERATIONS: i32 = -1;
