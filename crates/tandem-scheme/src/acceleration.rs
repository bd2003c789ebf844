//! Acceleration boundary.
//!
//! Acceleration transforms (quasi-Newton and friends) live outside the
//! core. The scheme hands them shared data handles: before a transform it
//! loads each datum's latest stample into the working sample, the transform
//! mutates the working samples in place, and the scheme stores the result
//! back at the end-of-window time.

use crate::data::SharedDatum;
use crate::error::SchemeResult;

/// Least-squares system statistics reported to the iterations table.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ColumnStats {
    pub active: i32,
    pub deleted: i32,
    pub dropped: i32,
}

/// A convergence-accelerating transform over iteration samples.
pub trait Acceleration {
    /// Called once before the first window with the acceleration data set.
    fn initialize(&mut self, data: &[SharedDatum]) -> SchemeResult<()>;

    /// Transforms the working samples of `data` in place after a
    /// non-converged iteration.
    fn accelerate(&mut self, data: &[SharedDatum]) -> SchemeResult<()>;

    /// Notifies the module that the current window's iterations converged.
    fn iterations_converged(&mut self, data: &[SharedDatum]);

    /// Statistics for the `QNColumns` family of table columns.
    fn column_stats(&self) -> ColumnStats {
        ColumnStats::default()
    }
}
