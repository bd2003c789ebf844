//! Error types of the coupling scheme.
//!
//! The scheme never recovers locally: configuration and usage errors, strict
//! convergence failures, and transport failures all end the run. Internal
//! consistency violations are assertions, not errors.

use tandem_transport::TransportError;
use tandem_types::{Action, DataId};
use thiserror::Error;

/// Errors that can occur while configuring or driving a coupling scheme.
#[derive(Debug, Error)]
pub enum SchemeError {
    /// The construction contract was violated.
    #[error("invalid coupling configuration: {0}")]
    InvalidConfiguration(String),

    /// The same data field was registered for sending and for receiving.
    #[error("data \"{0}\" cannot be registered for both sending and receiving")]
    ConflictingDirections(String),

    /// A data id was referenced before being registered.
    #[error("no coupling data registered under {0}")]
    UnknownData(DataId),

    /// A peer name was referenced that this schedule is not connected to.
    #[error("no coupling partner named \"{0}\"")]
    UnknownPartner(String),

    /// An operation required an initialized scheme.
    #[error("the coupling scheme has not been initialized")]
    NotInitialized,

    /// `initialize` was called twice.
    #[error("the coupling scheme is already initialized")]
    AlreadyInitialized,

    /// `add_computed_time` was called after the coupled simulation ended.
    #[error("cannot add computed time after the end of the coupled simulation")]
    CouplingComplete,

    /// Required actions were not fulfilled before the next phase boundary.
    #[error(
        "the required actions [{missing}] are not fulfilled; \
         perform them and mark them fulfilled before advancing"
    )]
    UnfulfilledActions { missing: String },

    /// An action was marked fulfilled without being required.
    #[error("action {0} was marked fulfilled but was never required")]
    ActionNotRequired(Action),

    /// The solver stepped past the end of the current time window.
    #[error(
        "the time step size {dt} exceeds the maximum allowed size {max} \
         remaining in this time window"
    )]
    StepExceedsWindow { dt: f64, max: f64 },

    /// A strict convergence measure failed at the iteration limit.
    #[error(
        "the strict convergence measure for data \"{data}\" did not converge \
         within the maximum of {iterations} iterations"
    )]
    StrictConvergenceFailure { data: String, iterations: i32 },

    /// The channel failed; never retried.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Writing an iteration or convergence table failed.
    #[error("log table error: {0}")]
    Table(#[from] std::io::Error),
}

impl SchemeError {
    pub(crate) fn unfulfilled(missing: &[Action]) -> Self {
        let missing = missing
            .iter()
            .map(Action::as_str)
            .collect::<Vec<_>>()
            .join(", ");
        SchemeError::UnfulfilledActions { missing }
    }
}

/// Result type for scheme operations.
pub type SchemeResult<T> = Result<T, SchemeError>;
