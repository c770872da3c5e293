use thiserror::Error;

/// Harness error types covering startup, per-thread scheduling, and lifecycle misuse.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HarnessError {
    /// Configuration or directive validation error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Locking process memory failed; timing results would be unreliable.
    #[error("memory lock failed: {0}")]
    MemoryLock(String),

    /// The OS refused the thread's real-time policy or priority.
    #[error("app #{app_id}: scheduling policy rejected: {message}")]
    SchedPolicy {
        /// Application id of the thread that could not be created.
        app_id: u32,
        /// OS error description.
        message: String,
    },

    /// Pinning a thread to its CPU failed. Non-fatal.
    #[error("failed to pin thread to CPU {cpu}: {message}")]
    Affinity {
        /// Requested CPU index.
        cpu: usize,
        /// OS error description.
        message: String,
    },

    /// OS thread creation failed for a reason other than scheduling.
    #[error("app #{app_id}: thread spawn failed: {message}")]
    Spawn {
        /// Application id of the thread.
        app_id: u32,
        /// OS error description.
        message: String,
    },

    /// `join()` was called on a thread that was never started.
    #[error("app #{app_id}: join called before start")]
    NotStarted {
        /// Application id of the thread.
        app_id: u32,
    },

    /// `start()` was called twice on the same thread.
    #[error("app #{app_id}: thread already started")]
    AlreadyStarted {
        /// Application id of the thread.
        app_id: u32,
    },

    /// The bound task panicked inside the worker thread.
    #[error("app #{app_id}: task panicked")]
    TaskPanicked {
        /// Application id of the thread.
        app_id: u32,
    },

    /// No experiment is registered under the requested id.
    #[error("experiment {0} not found")]
    UnknownExperiment(u32),

    /// Invalid state transition attempted.
    #[error("invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Source state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl HarnessError {
    /// Returns true if the error must stop the whole experiment.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::MemoryLock(_) | Self::Config(_))
    }
}

/// Convenience type alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;
