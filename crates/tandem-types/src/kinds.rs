//! Closed enumerations describing how a participant couples.

use serde::{Deserialize, Serialize};

/// Whether a data field is sent to or received from the coupling partner.
///
/// Immutable once the field is registered with a scheme.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction {
    Send,
    Receive,
}

/// Explicit coupling performs one exchange per window; implicit coupling
/// iterates each window until the configured convergence measures pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CouplingMode {
    Explicit,
    Implicit,
}

/// How the time window size is determined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimesteppingMethod {
    /// A fixed window size is prescribed by the configuration.
    FixedWindowSize,
    /// The first participant dictates the window size; the second adopts it.
    FirstParticipant,
}

/// Role of this process within a multi-rank participant.
///
/// Only the primary rank writes iteration and convergence tables; the
/// coupling algorithm itself is rank-uniform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Rank {
    Primary,
    Secondary,
}

impl Rank {
    pub fn is_secondary(&self) -> bool {
        matches!(self, Rank::Secondary)
    }
}
