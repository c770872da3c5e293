//! Experiment runner state machine.
//!
//! Normal progression:
//! INIT → MEMORY_LOCKED → CONFIG_SELECTED → THREADS_STARTED → THREADS_JOINED → DONE
//!
//! An unknown experiment id leaves MEMORY_LOCKED for CONFIG_MISSING, which
//! only leads to DONE. There are no retries and no backward transitions.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle states of one experiment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunnerState {
    /// Process started, nothing done yet.
    #[default]
    Init,
    /// Process memory is locked (or locking was disabled by configuration).
    MemoryLocked,
    /// An experiment recipe was found.
    ConfigSelected,
    /// The requested id matched no recipe.
    ConfigMissing,
    /// Every thread of the recipe has been started.
    ThreadsStarted,
    /// Every started thread has been joined.
    ThreadsJoined,
    /// Terminal state.
    Done,
}

impl fmt::Display for RunnerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Init => write!(f, "INIT"),
            Self::MemoryLocked => write!(f, "MEMORY_LOCKED"),
            Self::ConfigSelected => write!(f, "CONFIG_SELECTED"),
            Self::ConfigMissing => write!(f, "CONFIG_MISSING"),
            Self::ThreadsStarted => write!(f, "THREADS_STARTED"),
            Self::ThreadsJoined => write!(f, "THREADS_JOINED"),
            Self::Done => write!(f, "DONE"),
        }
    }
}

impl RunnerState {
    /// Check if a transition to `target` is valid from the current state.
    #[must_use]
    pub fn can_transition_to(&self, target: RunnerState) -> bool {
        use RunnerState::{
            ConfigMissing, ConfigSelected, Done, Init, MemoryLocked, ThreadsJoined, ThreadsStarted,
        };

        matches!(
            (self, target),
            (Init, MemoryLocked)
                | (MemoryLocked, ConfigSelected)
                | (MemoryLocked, ConfigMissing)
                | (ConfigSelected, ThreadsStarted)
                | (ThreadsStarted, ThreadsJoined)
                | (ThreadsJoined, Done)
                | (ConfigMissing, Done)
        )
    }

    /// Returns true once the run can make no further progress.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done)
    }
}

/// State machine wrapper with transition history tracking.
#[derive(Debug, Clone, Default)]
pub struct StateMachine {
    current: RunnerState,
    history: Vec<RunnerState>,
}

impl StateMachine {
    /// Create a new state machine starting in INIT.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.current
    }

    /// States visited so far, oldest first, including the current one.
    #[must_use]
    pub fn path(&self) -> Vec<RunnerState> {
        let mut path = self.history.clone();
        path.push(self.current);
        path
    }

    /// Attempt a state transition.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::InvalidStateTransition`] if `target` is not
    /// reachable from the current state.
    pub fn transition(&mut self, target: RunnerState) -> HarnessResult<()> {
        if self.current.can_transition_to(target) {
            self.history.push(self.current);
            self.current = target;
            Ok(())
        } else {
            Err(HarnessError::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            })
        }
    }
}
