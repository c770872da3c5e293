//! Per-thread timing reports and the experiment summary.
//!
//! A thread's total time runs from `start()` to `join()` completion; its
//! workload time covers only the task body. The difference is the thread
//! overhead plus any time spent waiting for a CPU.

use crate::config::{TaskKind, ThreadClass};
use crate::error::HarnessError;
use crate::time::{Seconds, Span};
use std::fmt;
use std::time::Duration;

/// Timing of one managed thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadReport {
    /// Application id.
    pub app_id: u32,
    /// Scheduling class the thread ran under.
    pub class: ThreadClass,
    /// Workload the thread ran.
    pub task: TaskKind,
    /// Kernel thread id of the worker.
    pub tid: i64,
    /// CPU the worker was on when its task began.
    pub cpu: Option<usize>,
    /// From `start()` to `join()` completion.
    pub thread: Span,
    /// Around the workload call only.
    pub workload: Span,
}

impl ThreadReport {
    /// Total elapsed time.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.thread.elapsed()
    }

    /// Workload-only elapsed time.
    #[must_use]
    pub fn workload_time(&self) -> Duration {
        self.workload.elapsed()
    }

    /// Thread overhead and scheduling latency (total minus workload).
    #[must_use]
    pub fn overhead(&self) -> Duration {
        self.total().saturating_sub(self.workload_time())
    }

    /// Returns true if the workload span lies within the thread span.
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.thread.contains(&self.workload)
    }
}

/// Outcome of one experiment run.
#[derive(Debug, Clone, Default)]
pub struct ExperimentSummary {
    /// Experiment id.
    pub experiment_id: u32,
    /// Experiment name.
    pub name: String,
    /// CPU every thread was pinned to, if pinning was enabled.
    pub pin_cpu: Option<usize>,
    /// Reports of threads that ran to completion, in join order.
    pub reports: Vec<ThreadReport>,
    /// Threads that failed to start or whose task panicked.
    pub failures: Vec<(u32, HarnessError)>,
}

impl ExperimentSummary {
    /// Number of threads that ran to completion.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.reports.len()
    }

    /// Report for the given application id.
    #[must_use]
    pub fn report(&self, app_id: u32) -> Option<&ThreadReport> {
        self.reports.iter().find(|r| r.app_id == app_id)
    }

    /// Returns true if every thread completed.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

impl fmt::Display for ExperimentSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "== Experiment {} ({})", self.experiment_id, self.name)?;
        match self.pin_cpu {
            Some(cpu) => writeln!(f, ", pinned to CPU #{cpu} ==")?,
            None => writeln!(f, ", unpinned ==")?,
        }
        writeln!(
            f,
            "{:<6}{:<7}{:<6}{:>10}{:>6}{:>11}{:>13}{:>13}",
            "APP", "CLASS", "TASK", "TID", "CPU", "TOTAL(s)", "WORKLOAD(s)", "OVERHEAD(s)"
        )?;
        for r in &self.reports {
            let cpu = r.cpu.map_or_else(|| "-".to_string(), |c| c.to_string());
            writeln!(
                f,
                "{:<6}{:<7}{:<6}{:>10}{:>6}{:>11}{:>13}{:>13}",
                format!("#{}", r.app_id),
                r.class.to_string(),
                r.task.to_string(),
                r.tid,
                cpu,
                Seconds(r.total()).to_string(),
                Seconds(r.workload_time()).to_string(),
                Seconds(r.overhead()).to_string(),
            )?;
        }
        for (app_id, err) in &self.failures {
            writeln!(f, "#{app_id:<5}FAILED: {err}")?;
        }
        Ok(())
    }
}
