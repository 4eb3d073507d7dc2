//! Finite State Machine for a single stack deployment

use serde::{Deserialize, Serialize};

use crate::errors::DeployError;
use crate::models::outcome::DeployStatus;

/// Deployer state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeployerState {
    /// Initial state, nothing submitted
    NoStackYet,

    /// Change set submitted and ready
    ChangeSetCreated,

    /// Nothing to change
    Unchanged,

    /// Change set execution requested
    ChangeSetExecuted,

    /// Stack operation finished
    ChangeSetCompleted,

    /// Stack deleted
    Deleted,
}

/// Deployer event
#[derive(Debug, Clone)]
pub enum DeployerEvent {
    /// Change set reached CREATE_COMPLETE
    ChangeSetReady,

    /// Change set failed because it contained no changes
    NoOpChange,

    /// Execute call accepted
    Execute,

    /// Stack create/update finished
    Complete,

    /// Stack delete finished
    Delete,

    /// Delete requested for a stack that does not exist
    AlreadyAbsent,
}

/// Deployer FSM
#[derive(Debug, Clone)]
pub struct DeployerFsm {
    state: DeployerState,
}

impl DeployerFsm {
    /// Create a new FSM with no stack submitted yet
    pub fn new() -> Self {
        Self {
            state: DeployerState::NoStackYet,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeployerState {
        self.state
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployerEvent) -> Result<(), DeployError> {
        let new_state = match (self.state, &event) {
            // From NoStackYet
            (DeployerState::NoStackYet, DeployerEvent::ChangeSetReady) => {
                DeployerState::ChangeSetCreated
            }
            (DeployerState::NoStackYet, DeployerEvent::NoOpChange) => DeployerState::Unchanged,
            (DeployerState::NoStackYet, DeployerEvent::Delete) => DeployerState::Deleted,
            (DeployerState::NoStackYet, DeployerEvent::AlreadyAbsent) => DeployerState::Unchanged,

            // From ChangeSetCreated
            (DeployerState::ChangeSetCreated, DeployerEvent::Execute) => {
                DeployerState::ChangeSetExecuted
            }

            // From ChangeSetExecuted
            (DeployerState::ChangeSetExecuted, DeployerEvent::Complete) => {
                DeployerState::ChangeSetCompleted
            }

            // Invalid transitions
            (state, event) => {
                return Err(DeployError::InvalidTransition(format!(
                    "{:?} -> {:?}",
                    state, event
                )));
            }
        };

        self.state = new_state;
        Ok(())
    }

    /// Status to report when the deployer stops in the current state
    pub fn status(&self) -> Option<DeployStatus> {
        match self.state {
            DeployerState::NoStackYet => None,
            DeployerState::ChangeSetCreated => Some(DeployStatus::ChangeSetCreated),
            DeployerState::Unchanged => Some(DeployStatus::Unchanged),
            DeployerState::ChangeSetExecuted => Some(DeployStatus::ChangeSetExecuted),
            DeployerState::ChangeSetCompleted => Some(DeployStatus::ChangeSetCompleted),
            DeployerState::Deleted => Some(DeployStatus::Deleted),
        }
    }
}

impl Default for DeployerFsm {
    fn default() -> Self {
        Self::new()
    }
}
