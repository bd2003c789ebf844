//! Convergence measures and their aggregation context.

use nalgebra::DVector;

use crate::data::SharedDatum;

/// A predicate deciding whether one data field of an implicit iteration has
/// locally converged.
///
/// Implementations live outside the core; the scheme only drives the
/// series: [`ConvergenceMeasure::new_series`] when a window converges,
/// [`ConvergenceMeasure::measure`] once per iteration on
/// `(previous_iteration, current)` values.
pub trait ConvergenceMeasure {
    /// Starts a fresh measurement series for the next time window.
    fn new_series(&mut self);

    /// Measures the residual between the previous iteration and the
    /// current values.
    fn measure(&mut self, previous: &DVector<f64>, current: &DVector<f64>);

    /// Outcome of the last [`ConvergenceMeasure::measure`] call.
    fn has_converged(&self) -> bool;

    /// Residual norm of the last measurement, logged to the convergence
    /// table.
    fn residual(&self) -> f64;

    /// Short tag used in the convergence table header, e.g. `ResAbs`.
    fn abbreviation(&self) -> &str;

    /// One-line human-readable state for the run log.
    fn describe(&self, data_name: &str) -> String;
}

/// One configured measure with its aggregation flags.
pub struct MeasureContext {
    pub datum: SharedDatum,
    /// A converged `suffices` measure alone can carry the decision.
    pub suffices: bool,
    /// A failing `strict` measure aborts the run at the iteration limit.
    pub strict: bool,
    /// Whether this measure's residual is written to the convergence table.
    pub does_logging: bool,
    pub measure: Box<dyn ConvergenceMeasure>,
}

impl MeasureContext {
    /// Column header in the convergence table.
    pub fn log_header(&self) -> String {
        format!("{}({})", self.measure.abbreviation(), self.datum.borrow().name())
    }
}

impl std::fmt::Debug for MeasureContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasureContext")
            .field("data", &self.datum.borrow().name())
            .field("suffices", &self.suffices)
            .field("strict", &self.strict)
            .field("does_logging", &self.does_logging)
            .finish()
    }
}

/// Ordered list of all configured convergence measures.
#[derive(Debug, Default)]
pub struct ConvergenceSet {
    contexts: Vec<MeasureContext>,
}

impl ConvergenceSet {
    pub fn add(&mut self, context: MeasureContext) {
        self.contexts.push(context);
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MeasureContext> {
        self.contexts.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut MeasureContext> {
        self.contexts.iter_mut()
    }

    /// Resets every measure for the next time window.
    pub fn new_series_all(&mut self) {
        for context in &mut self.contexts {
            context.measure.new_series();
        }
    }
}
