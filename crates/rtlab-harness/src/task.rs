//! Timed tasks: the unit of work a managed thread runs.
//!
//! A [`Runnable`] is whatever the application wants executed. [`TimedTask`]
//! wraps it with the application id and measures the workload call alone, so
//! the result nests strictly inside the owning thread's own span.

use rtlab_common::config::{ExperimentEntry, TaskKind, ThreadClass};
use rtlab_common::time::{Seconds, Span};
use std::fmt;

/// A unit of work with no result.
pub trait Runnable: Send + 'static {
    /// Execute the work to completion.
    fn run(&mut self);
}

impl<F> Runnable for F
where
    F: FnMut() + Send + 'static,
{
    fn run(&mut self) {
        self();
    }
}

/// Builds the task for each entry of an experiment.
pub trait TaskSource: Send + Sync {
    /// Create the task bound to `entry`.
    fn task_for(&self, entry: &ExperimentEntry) -> TimedTask;
}

impl<F> TaskSource for F
where
    F: Fn(&ExperimentEntry) -> TimedTask + Send + Sync,
{
    fn task_for(&self, entry: &ExperimentEntry) -> TimedTask {
        self(entry)
    }
}

/// Output prefix identifying a worker: `[RT thread #1234]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadLabel {
    /// Scheduling class.
    pub class: ThreadClass,
    /// Kernel thread id.
    pub tid: i64,
}

impl fmt::Display for ThreadLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{} thread #{}]", self.class, self.tid)
    }
}

/// An application's workload plus its timing.
pub struct TimedTask {
    app_id: u32,
    kind: TaskKind,
    runnable: Box<dyn Runnable>,
}

impl fmt::Debug for TimedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimedTask")
            .field("app_id", &self.app_id)
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl TimedTask {
    /// Bind a runnable to an application id.
    pub fn new(app_id: u32, kind: TaskKind, runnable: impl Runnable) -> Self {
        Self {
            app_id,
            kind,
            runnable: Box::new(runnable),
        }
    }

    /// Application id.
    #[must_use]
    pub fn app_id(&self) -> u32 {
        self.app_id
    }

    /// Workload kind.
    #[must_use]
    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Run the workload once and print its elapsed time.
    pub fn execute(&mut self, label: &ThreadLabel) -> Span {
        println!("Running App #{}...", self.app_id);

        let runnable = &mut self.runnable;
        let (span, ()) = Span::measure(|| runnable.run());

        println!(
            "{label} App #{} Workload time: {} seconds",
            self.app_id,
            Seconds(span.elapsed())
        );
        span
    }
}
