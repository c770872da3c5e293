//! Common utilities for acceptance tests.
//!
//! Provides helpers for:
//! - Checking real-time prerequisites (privileges, RLIMIT_RTPRIO, PREEMPT_RT)
//! - Recording affinity calls without touching the real CPU mask
//! - Stub workloads that observe concurrency and scheduling

#![allow(dead_code)] // Not every helper is used by every test file

use rtlab_common::config::{ExperimentEntry, HarnessConfig, WorkloadConfig};
use rtlab_common::error::HarnessResult;
use rtlab_harness::realtime::{check_rt_capabilities, current_sched, AffinityControl, ThreadSched};
use rtlab_harness::task::{TaskSource, TimedTask};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Check if the system has PREEMPT_RT kernel.
pub fn has_preempt_rt() -> bool {
    check_rt_capabilities().preempt_rt
}

/// Check if running as root.
pub fn is_root() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// Get the number of CPUs.
pub fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(1)
}

/// Ask the kernel whether a thread may switch to SCHED_FIFO at `priority`.
///
/// Root in a container can still lack CAP_SYS_NICE, so uid and rlimits
/// alone are not conclusive.
pub fn kernel_grants_fifo(priority: u8) -> bool {
    std::thread::spawn(move || {
        let param = libc::sched_param {
            sched_priority: i32::from(priority),
        };
        unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) == 0 }
    })
    .join()
    .unwrap_or(false)
}

/// Check prerequisites for tests that need RT scheduling at `priority`.
pub fn check_rt_prerequisites(priority: u8) -> Result<(), String> {
    let caps = check_rt_capabilities();

    if !has_preempt_rt() {
        eprintln!("WARNING: PREEMPT_RT kernel not detected - timings may be noisy");
    }

    if !caps.can_use_rt_priority(priority) {
        return Err(format!(
            "RT priority {priority} not permitted (root: {}, RLIMIT_RTPRIO: {:?})",
            caps.is_root, caps.rtprio_limit
        ));
    }
    if !kernel_grants_fifo(priority) {
        return Err(format!("kernel refused SCHED_FIFO priority {priority}"));
    }
    Ok(())
}

/// Check that `mlockall` is likely to succeed.
pub fn check_memory_lock_prerequisites() -> Result<(), String> {
    if check_rt_capabilities().can_lock_memory() {
        Ok(())
    } else {
        Err("RLIMIT_MEMLOCK too low and not root".to_string())
    }
}

/// Harness configuration with tiny workloads and no memory lock.
pub fn fast_config() -> HarnessConfig {
    HarnessConfig {
        lock_memory: false,
        pin_cpu: 0,
        workload: WorkloadConfig {
            image_width: 32,
            image_height: 24,
            edge_passes: 1,
            busy_iterations: 10_000,
        },
    }
}

/// Affinity control that records requested CPUs instead of pinning.
#[derive(Debug, Default)]
pub struct RecordingAffinity {
    calls: Mutex<Vec<usize>>,
}

impl RecordingAffinity {
    /// CPUs requested so far, in call order.
    pub fn calls(&self) -> Vec<usize> {
        self.calls.lock().unwrap().clone()
    }
}

impl AffinityControl for RecordingAffinity {
    fn pin_current_thread(&self, cpu: usize) -> HarnessResult<()> {
        self.calls.lock().unwrap().push(cpu);
        Ok(())
    }
}

/// Task source whose workloads wait until every task in the experiment is
/// running at the same time, or the deadline passes.
///
/// If the runner joined any thread before starting all of them, the peak
/// never reaches the expected count.
#[derive(Debug, Clone)]
pub struct ConcurrencyProbe {
    expected: usize,
    deadline: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl ConcurrencyProbe {
    /// Probe expecting `expected` simultaneous tasks.
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            deadline: Duration::from_secs(5),
            running: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Highest number of tasks observed running together.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TaskSource for ConcurrencyProbe {
    fn task_for(&self, entry: &ExperimentEntry) -> TimedTask {
        let probe = self.clone();
        TimedTask::new(entry.app_id, entry.task, move || {
            let now = probe.running.fetch_add(1, Ordering::SeqCst) + 1;
            probe.peak.fetch_max(now, Ordering::SeqCst);

            let start = Instant::now();
            while probe.running.load(Ordering::SeqCst) < probe.expected
                && start.elapsed() < probe.deadline
            {
                std::thread::sleep(Duration::from_millis(1));
            }
            probe
                .peak
                .fetch_max(probe.running.load(Ordering::SeqCst), Ordering::SeqCst);
        })
    }
}

/// Task source whose workloads record the scheduling parameters they start
/// under, keyed by application id.
#[derive(Debug, Clone, Default)]
pub struct SchedProbe {
    seen: Arc<Mutex<BTreeMap<u32, ThreadSched>>>,
}

impl SchedProbe {
    /// Parameters observed by `app_id`, if its task ran.
    pub fn observed(&self, app_id: u32) -> Option<ThreadSched> {
        self.seen.lock().unwrap().get(&app_id).copied()
    }
}

impl TaskSource for SchedProbe {
    fn task_for(&self, entry: &ExperimentEntry) -> TimedTask {
        let seen = Arc::clone(&self.seen);
        let app_id = entry.app_id;
        TimedTask::new(app_id, entry.task, move || {
            let sched = current_sched().expect("pthread_getschedparam");
            seen.lock().unwrap().insert(app_id, sched);
        })
    }
}
