//! Managed threads: one OS thread with a scheduling directive and timing.
//!
//! # Lifecycle
//!
//! ```text
//! new() ──start()──▶ running ──join()──▶ ThreadReport
//!   │                                      ▲
//!   └─────────── join() ──▶ NotStarted ────┘ (caller contract violation)
//! ```
//!
//! RT threads get their policy and priority attached at creation, so the
//! bound task never runs under the inherited policy. NRT threads are plain
//! threads. Both pin themselves to the directive's CPU (if any) before the
//! task starts; a failed pin is logged and the thread carries on.
//!
//! The thread span opens in `start()` before the OS thread exists and closes
//! after the OS join returns, so the task's workload span always nests inside.

use crate::realtime::{current_cpu, current_tid, AffinityControl};
use crate::spawn::{spawn_nrt, spawn_rt, OsThread};
use crate::task::{ThreadLabel, TimedTask};
use rtlab_common::config::{SchedDirective, TaskKind, ThreadClass};
use rtlab_common::error::{HarnessError, HarnessResult};
use rtlab_common::report::ThreadReport;
use rtlab_common::time::{Seconds, Span};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// What the worker hands back through the join.
struct WorkerOutcome {
    tid: i64,
    cpu: Option<usize>,
    workload: Span,
}

/// One OS thread running one timed task under a scheduling directive.
pub struct ManagedThread {
    app_id: u32,
    kind: TaskKind,
    directive: SchedDirective,
    affinity: Arc<dyn AffinityControl>,
    task: Option<TimedTask>,
    handle: Option<OsThread<WorkerOutcome>>,
    started_at: Option<Instant>,
}

impl fmt::Debug for ManagedThread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedThread")
            .field("app_id", &self.app_id)
            .field("directive", &self.directive)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}

impl ManagedThread {
    /// Bind a task to a directive. Nothing runs until [`start`](Self::start).
    #[must_use]
    pub fn new(
        task: TimedTask,
        directive: SchedDirective,
        affinity: Arc<dyn AffinityControl>,
    ) -> Self {
        Self {
            app_id: task.app_id(),
            kind: task.kind(),
            directive,
            affinity,
            task: Some(task),
            handle: None,
            started_at: None,
        }
    }

    /// Application id.
    #[must_use]
    pub fn app_id(&self) -> u32 {
        self.app_id
    }

    /// Scheduling directive.
    #[must_use]
    pub fn directive(&self) -> SchedDirective {
        self.directive
    }

    /// Returns true between a successful `start()` and `join()`.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.handle.is_some()
    }

    /// Create the OS thread and return immediately.
    ///
    /// RT threads are created with `PTHREAD_EXPLICIT_SCHED` and the
    /// directive's policy and priority; if the OS refuses, no thread exists
    /// and the task never runs.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::AlreadyStarted`] on a second call.
    /// - [`HarnessError::SchedPolicy`] if the RT attributes are rejected.
    /// - [`HarnessError::Spawn`] for any other creation failure.
    pub fn start(&mut self) -> HarnessResult<()> {
        let Some(task) = self.task.take() else {
            return Err(HarnessError::AlreadyStarted {
                app_id: self.app_id,
            });
        };

        let app_id = self.app_id;
        let directive = self.directive;
        let body = worker_body(task, directive, Arc::clone(&self.affinity));

        debug!(app_id, ?directive, "Starting managed thread");
        let started_at = Instant::now();

        let spawned = match directive.class() {
            ThreadClass::Rt { policy, priority } => {
                spawn_rt(policy, priority, body).map_err(|e| rt_spawn_error(app_id, &e))
            }
            ThreadClass::Nrt => spawn_nrt(format!("rtlab-app-{app_id}"), body).map_err(|e| {
                HarnessError::Spawn {
                    app_id,
                    message: e.to_string(),
                }
            }),
        };

        self.handle = Some(spawned?);
        self.started_at = Some(started_at);
        Ok(())
    }

    /// Wait for the thread, print its total time and return its report.
    ///
    /// # Preconditions
    ///
    /// `start()` must have succeeded. Joining an unstarted (or already
    /// joined) thread is a caller error and yields
    /// [`HarnessError::NotStarted`]; it never blocks.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::NotStarted`] as above.
    /// - [`HarnessError::TaskPanicked`] if the task panicked.
    /// - [`HarnessError::Spawn`] if the OS join itself failed.
    pub fn join(&mut self) -> HarnessResult<ThreadReport> {
        let (Some(handle), Some(started_at)) = (self.handle.take(), self.started_at) else {
            return Err(HarnessError::NotStarted {
                app_id: self.app_id,
            });
        };
        let app_id = self.app_id;

        let joined = handle.join().map_err(|e| HarnessError::Spawn {
            app_id,
            message: format!("join failed: {e}"),
        })?;
        let thread = Span::new(started_at, Instant::now());
        let outcome = joined.map_err(|_| HarnessError::TaskPanicked { app_id })?;

        let class = self.directive.class();
        let label = ThreadLabel {
            class,
            tid: outcome.tid,
        };
        println!(
            "{label} App #{app_id} Ends (Elapsed: {} seconds)",
            Seconds(thread.elapsed())
        );
        info!(
            app_id,
            %class,
            elapsed = %humantime::format_duration(thread.elapsed()),
            workload = %humantime::format_duration(outcome.workload.elapsed()),
            "Managed thread joined"
        );

        Ok(ThreadReport {
            app_id,
            class,
            task: self.kind,
            tid: outcome.tid,
            cpu: outcome.cpu,
            thread,
            workload: outcome.workload,
        })
    }
}

/// Body executed on the new thread: pin, announce, run the task.
fn worker_body(
    mut task: TimedTask,
    directive: SchedDirective,
    affinity: Arc<dyn AffinityControl>,
) -> impl FnOnce() -> WorkerOutcome + Send + 'static {
    move || {
        let app_id = task.app_id();
        if let Some(cpu) = directive.pin_cpu() {
            if let Err(e) = affinity.pin_current_thread(cpu) {
                warn!(app_id, error = %e, "CPU pinning failed, continuing with default affinity");
            }
        }

        let tid = current_tid();
        let cpu = current_cpu();
        let label = ThreadLabel {
            class: directive.class(),
            tid,
        };
        match cpu {
            Some(cpu) => println!("{label} running on CPU #{cpu}"),
            None => println!("{label} running on CPU #?"),
        }

        let workload = task.execute(&label);
        WorkerOutcome { tid, cpu, workload }
    }
}

/// Classify a failed RT `pthread_create`.
fn rt_spawn_error(app_id: u32, err: &io::Error) -> HarnessError {
    match err.raw_os_error() {
        // Attribute rejected: missing privilege, bad policy or priority
        Some(libc::EPERM | libc::EINVAL | libc::ENOTSUP) => HarnessError::SchedPolicy {
            app_id,
            message: err.to_string(),
        },
        _ if err.kind() == io::ErrorKind::Unsupported => HarnessError::SchedPolicy {
            app_id,
            message: err.to_string(),
        },
        _ => HarnessError::Spawn {
            app_id,
            message: err.to_string(),
        },
    }
}
