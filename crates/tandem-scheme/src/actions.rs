//! The required-action handshake.

use std::collections::BTreeSet;

use tandem_types::Action;

use crate::error::{SchemeError, SchemeResult};

/// Tracks which actions the scheme requires from the adapter and which the
/// adapter has fulfilled within the current step.
///
/// At every phase boundary the required set must be a subset of the
/// fulfilled set; the completeness check then clears both for the next
/// step.
#[derive(Debug, Default)]
pub struct ActionLedger {
    required: BTreeSet<Action>,
    fulfilled: BTreeSet<Action>,
}

impl ActionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Requires `action` to be performed before the next phase boundary.
    pub fn require(&mut self, action: Action) {
        self.required.insert(action);
    }

    pub fn is_required(&self, action: Action) -> bool {
        self.required.contains(&action)
    }

    pub fn is_fulfilled(&self, action: Action) -> bool {
        self.fulfilled.contains(&action)
    }

    /// Records that the adapter performed a required action.
    pub fn mark_fulfilled(&mut self, action: Action) -> SchemeResult<()> {
        if !self.required.contains(&action) {
            return Err(SchemeError::ActionNotRequired(action));
        }
        self.fulfilled.insert(action);
        Ok(())
    }

    /// Currently required actions, in stable order.
    pub fn pending(&self) -> Vec<Action> {
        self.required.iter().copied().collect()
    }

    /// Verifies that every required action has been fulfilled, then clears
    /// both sets for the next step.
    pub fn check_completeness(&mut self) -> SchemeResult<()> {
        let missing: Vec<Action> = self
            .required
            .difference(&self.fulfilled)
            .copied()
            .collect();
        if !missing.is_empty() {
            return Err(SchemeError::unfulfilled(&missing));
        }
        self.required.clear();
        self.fulfilled.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fulfilled_requirements_pass_and_clear() {
        let mut ledger = ActionLedger::new();
        ledger.require(Action::WriteCheckpoint);
        assert!(ledger.is_required(Action::WriteCheckpoint));

        ledger.mark_fulfilled(Action::WriteCheckpoint).unwrap();
        ledger.check_completeness().unwrap();

        assert!(!ledger.is_required(Action::WriteCheckpoint));
        assert!(!ledger.is_fulfilled(Action::WriteCheckpoint));
    }

    #[test]
    fn missing_actions_are_listed_by_name() {
        let mut ledger = ActionLedger::new();
        ledger.require(Action::WriteCheckpoint);
        ledger.require(Action::InitializeData);
        ledger.mark_fulfilled(Action::InitializeData).unwrap();

        let err = ledger.check_completeness().unwrap_err();
        let message = err.to_string();
        assert!(message.contains("write-checkpoint"));
        assert!(!message.contains("initialize-data"));
    }

    #[test]
    fn fulfilling_an_unrequired_action_is_an_error() {
        let mut ledger = ActionLedger::new();
        let err = ledger.mark_fulfilled(Action::ReadCheckpoint).unwrap_err();
        assert!(matches!(err, SchemeError::ActionNotRequired(_)));
    }

    #[test]
    fn empty_ledger_is_complete() {
        let mut ledger = ActionLedger::new();
        ledger.check_completeness().unwrap();
    }
}
