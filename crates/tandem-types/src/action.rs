//! Required actions of the coupling handshake.

use serde::{Deserialize, Serialize};

/// Bookkeeping actions a solver adapter must perform between coupling
/// phases.
///
/// The scheme *requires* actions; the adapter performs them and marks them
/// *fulfilled*. An unfulfilled required action at the next phase boundary is
/// a fatal usage error. The set is closed: the string forms below appear in
/// state output and diagnostics and are stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Save solver state so a non-converged window can be repeated.
    WriteCheckpoint,
    /// Restore the state saved at the start of the current window.
    ReadCheckpoint,
    /// Provide initial data before the first exchange.
    InitializeData,
}

impl Action {
    /// Stable string form used in state output and error messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::WriteCheckpoint => "write-checkpoint",
            Action::ReadCheckpoint => "read-checkpoint",
            Action::InitializeData => "initialize-data",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
