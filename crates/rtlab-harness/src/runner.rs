//! Experiment runner.
//!
//! Drives one experiment per process:
//! 1. Lock memory (fatal on failure)
//! 2. Select the recipe by id (unknown id: report and finish, no threads)
//! 3. Build one managed thread per entry
//! 4. Start every thread
//! 5. Join every started thread
//! 6. Print the summary
//!
//! There is no cancellation or timeout: a workload that never returns hangs
//! the run in step 5.

use crate::realtime::{
    check_rt_capabilities, AffinityControl, MemoryLocker, SkipMemoryLock, SystemAffinity,
    SystemMemoryLock,
};
use crate::task::TaskSource;
use crate::thread::ManagedThread;
use crate::workload::WorkloadProvider;
use rtlab_common::config::{ExperimentConfig, ExperimentTable, HarnessConfig, ThreadClass};
use rtlab_common::error::{HarnessError, HarnessResult};
use rtlab_common::report::ExperimentSummary;
use rtlab_common::state::{RunnerState, StateMachine};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Result of a run that reached DONE.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The experiment ran; some threads may have failed.
    Completed(ExperimentSummary),
    /// No recipe had the requested id; nothing was started.
    NotFound(u32),
}

/// Orchestrates a single experiment run.
pub struct ExperimentRunner {
    config: HarnessConfig,
    table: ExperimentTable,
    locker: Box<dyn MemoryLocker>,
    affinity: Arc<dyn AffinityControl>,
    tasks: Box<dyn TaskSource>,
    state: StateMachine,
}

impl ExperimentRunner {
    /// Runner with the built-in table and system collaborators.
    #[must_use]
    pub fn new(config: HarnessConfig) -> Self {
        RunnerBuilder::new().config(config).build()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> RunnerState {
        self.state.state()
    }

    /// States visited so far.
    #[must_use]
    pub fn state_path(&self) -> Vec<RunnerState> {
        self.state.path()
    }

    /// Run experiment `id` to completion.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::MemoryLock`] if memory cannot be locked; no thread
    ///   is created.
    /// - [`HarnessError::InvalidStateTransition`] if the runner was already
    ///   used; a runner runs exactly once.
    ///
    /// Per-thread failures do not fail the run; they are listed in the
    /// summary.
    pub fn run(&mut self, id: u32) -> HarnessResult<RunOutcome> {
        if self.state.state() != RunnerState::Init {
            return Err(HarnessError::InvalidStateTransition {
                from: self.state.state().to_string(),
                to: RunnerState::MemoryLocked.to_string(),
            });
        }

        info!(experiment = id, "Starting experiment run");

        // INIT → MEMORY_LOCKED
        self.locker.lock_all().inspect_err(|e| {
            error!(error = %e, "Memory lock failed, aborting before any thread starts");
        })?;
        self.state.transition(RunnerState::MemoryLocked)?;

        // MEMORY_LOCKED → CONFIG_SELECTED | CONFIG_MISSING
        let experiment = match self.table.get(id) {
            Ok(experiment) => experiment.clone(),
            Err(e) => {
                error!(error = %e, "ERROR: exp_id NOT FOUND");
                self.state.transition(RunnerState::ConfigMissing)?;
                self.state.transition(RunnerState::Done)?;
                return Ok(RunOutcome::NotFound(id));
            }
        };
        self.state.transition(RunnerState::ConfigSelected)?;
        info!(
            experiment = experiment.id,
            name = %experiment.name,
            threads = experiment.entries.len(),
            pinned = experiment.pin_enabled,
            "Experiment selected"
        );
        self.warn_missing_capabilities(&experiment);

        let mut summary = ExperimentSummary {
            experiment_id: experiment.id,
            name: experiment.name.clone(),
            pin_cpu: experiment.pin_enabled.then_some(self.config.pin_cpu),
            ..Default::default()
        };

        let mut threads = Vec::with_capacity(experiment.entries.len());
        for entry in &experiment.entries {
            let directive = experiment.directive_for(entry, self.config.pin_cpu)?;
            let task = self.tasks.task_for(entry);
            threads.push(ManagedThread::new(task, directive, Arc::clone(&self.affinity)));
        }

        // CONFIG_SELECTED → THREADS_STARTED: start all before joining any
        for thread in &mut threads {
            if let Err(e) = thread.start() {
                error!(app_id = thread.app_id(), error = %e, "Thread failed to start");
                summary.failures.push((thread.app_id(), e));
            }
        }
        self.state.transition(RunnerState::ThreadsStarted)?;

        // THREADS_STARTED → THREADS_JOINED
        for thread in threads.iter_mut().filter(|t| t.is_started()) {
            match thread.join() {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    error!(app_id = thread.app_id(), error = %e, "Thread did not complete");
                    summary.failures.push((thread.app_id(), e));
                }
            }
        }
        self.state.transition(RunnerState::ThreadsJoined)?;

        println!("{summary}");
        info!(
            completed = summary.completed(),
            failed = summary.failures.len(),
            "Experiment finished"
        );

        self.state.transition(RunnerState::Done)?;
        Ok(RunOutcome::Completed(summary))
    }

    /// Log the host's RT capabilities and explain likely failures up front.
    fn warn_missing_capabilities(&self, experiment: &ExperimentConfig) {
        let caps = check_rt_capabilities();
        info!(
            is_root = caps.is_root,
            rtprio_limit = ?caps.rtprio_limit,
            memlock_limit = ?caps.memlock_limit,
            preempt_rt = caps.preempt_rt,
            "RT capabilities"
        );
        let needed = experiment
            .entries
            .iter()
            .filter_map(|e| match e.class {
                ThreadClass::Rt { priority, .. } => Some(priority),
                ThreadClass::Nrt => None,
            })
            .max();

        if let Some(priority) = needed {
            if !caps.can_use_rt_priority(priority) {
                warn!(
                    priority,
                    rtprio_limit = ?caps.rtprio_limit,
                    is_root = caps.is_root,
                    "RT threads will likely be refused: grant CAP_SYS_NICE or raise RLIMIT_RTPRIO"
                );
            }
        }
        if !caps.preempt_rt {
            debug!("PREEMPT_RT kernel not detected");
        }
    }
}

/// Builder for configuring the runner and swapping collaborators.
pub struct RunnerBuilder {
    config: HarnessConfig,
    table: Option<ExperimentTable>,
    locker: Option<Box<dyn MemoryLocker>>,
    affinity: Option<Arc<dyn AffinityControl>>,
    tasks: Option<Box<dyn TaskSource>>,
}

impl Default for RunnerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RunnerBuilder {
    /// Builder with default configuration and system collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: HarnessConfig::default(),
            table: None,
            locker: None,
            affinity: None,
            tasks: None,
        }
    }

    /// Set the harness configuration.
    #[must_use]
    pub fn config(mut self, config: HarnessConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the built-in experiment table.
    #[must_use]
    pub fn table(mut self, table: ExperimentTable) -> Self {
        self.table = Some(table);
        self
    }

    /// Replace the memory locker.
    #[must_use]
    pub fn memory_locker(mut self, locker: impl MemoryLocker + 'static) -> Self {
        self.locker = Some(Box::new(locker));
        self
    }

    /// Replace the affinity control.
    #[must_use]
    pub fn affinity(mut self, affinity: Arc<dyn AffinityControl>) -> Self {
        self.affinity = Some(affinity);
        self
    }

    /// Replace the task source.
    #[must_use]
    pub fn task_source(mut self, tasks: impl TaskSource + 'static) -> Self {
        self.tasks = Some(Box::new(tasks));
        self
    }

    /// Build the runner.
    #[must_use]
    pub fn build(self) -> ExperimentRunner {
        let config = self.config;
        let locker = self.locker.unwrap_or_else(|| {
            if config.lock_memory {
                Box::new(SystemMemoryLock)
            } else {
                Box::new(SkipMemoryLock)
            }
        });
        let tasks = self
            .tasks
            .unwrap_or_else(|| Box::new(WorkloadProvider::new(config.workload)));

        ExperimentRunner {
            table: self.table.unwrap_or_else(ExperimentTable::builtin),
            locker,
            affinity: self.affinity.unwrap_or_else(|| Arc::new(SystemAffinity)),
            tasks,
            state: StateMachine::new(),
            config,
        }
    }
}
