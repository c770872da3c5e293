//! Real-time process and thread utilities.
//!
//! Provides the OS-facing pieces the harness needs:
//! - Memory locking (mlockall) so page faults cannot distort measurements
//! - CPU pinning of the calling thread
//! - Introspection of the calling thread (tid, CPU, effective policy)
//! - A capability probe explaining why RT setup might fail
//!
//! Memory locking and pinning sit behind the [`MemoryLocker`] and
//! [`AffinityControl`] traits so tests can substitute recording fakes.

use rtlab_common::config::SchedPolicy;
use rtlab_common::error::{HarnessError, HarnessResult};
use tracing::{debug, info, warn};

/// Locks process memory before an experiment.
pub trait MemoryLocker: Send + Sync {
    /// Pin all current and future pages into RAM.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::MemoryLock`] if the pages cannot be locked.
    fn lock_all(&self) -> HarnessResult<()>;
}

/// Locks memory with `mlockall(MCL_CURRENT | MCL_FUTURE)`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemMemoryLock;

impl MemoryLocker for SystemMemoryLock {
    #[cfg(target_os = "linux")]
    fn lock_all(&self) -> HarnessResult<()> {
        use nix::sys::mman::{mlockall, MlockAllFlags};

        debug!("Locking memory pages with mlockall");

        match mlockall(MlockAllFlags::MCL_CURRENT | MlockAllFlags::MCL_FUTURE) {
            Ok(()) => {
                info!("Memory locked successfully");
                Ok(())
            }
            // EPERM is common when not running as root or without CAP_IPC_LOCK
            Err(nix::errno::Errno::EPERM) => Err(HarnessError::MemoryLock(
                "mlockall: EPERM - run as root or grant CAP_IPC_LOCK".into(),
            )),
            Err(e) => Err(HarnessError::MemoryLock(format!("mlockall: {e}"))),
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn lock_all(&self) -> HarnessResult<()> {
        Err(HarnessError::MemoryLock(
            "mlockall not available on this platform".into(),
        ))
    }
}

/// Leaves memory unlocked. Selected when `lock_memory = false`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipMemoryLock;

impl MemoryLocker for SkipMemoryLock {
    fn lock_all(&self) -> HarnessResult<()> {
        warn!("Memory locking disabled by configuration; page faults may distort timings");
        Ok(())
    }
}

/// Restricts the calling thread to one CPU.
pub trait AffinityControl: Send + Sync {
    /// Pin the calling thread to `cpu`.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Affinity`] if the OS rejects the mask.
    fn pin_current_thread(&self, cpu: usize) -> HarnessResult<()>;
}

/// Pins threads with `sched_setaffinity`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAffinity;

impl AffinityControl for SystemAffinity {
    #[cfg(target_os = "linux")]
    fn pin_current_thread(&self, cpu: usize) -> HarnessResult<()> {
        use nix::sched::{sched_setaffinity, CpuSet};
        use nix::unistd::Pid;

        let affinity_err = |e: nix::Error| HarnessError::Affinity {
            cpu,
            message: e.to_string(),
        };

        let mut cpu_set = CpuSet::new();
        cpu_set.set(cpu).map_err(affinity_err)?;

        // Pid 0 targets the calling thread, not the whole process
        sched_setaffinity(Pid::from_raw(0), &cpu_set).map_err(affinity_err)?;
        debug!(cpu, "CPU affinity set");
        Ok(())
    }

    #[cfg(not(target_os = "linux"))]
    fn pin_current_thread(&self, cpu: usize) -> HarnessResult<()> {
        Err(HarnessError::Affinity {
            cpu,
            message: "CPU affinity not available on this platform".into(),
        })
    }
}

/// Map a policy onto its libc constant.
#[must_use]
pub fn raw_policy(policy: SchedPolicy) -> libc::c_int {
    match policy {
        SchedPolicy::Fifo => libc::SCHED_FIFO,
        SchedPolicy::RoundRobin => libc::SCHED_RR,
    }
}

/// Scheduling parameters the calling thread is actually running with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadSched {
    /// Raw policy constant (`SCHED_OTHER`, `SCHED_FIFO`, ...).
    pub policy: libc::c_int,
    /// Static priority; 0 for non-RT policies.
    pub priority: libc::c_int,
}

impl ThreadSched {
    /// The RT policy, or `None` for time-sharing policies.
    #[must_use]
    pub fn rt_policy(&self) -> Option<SchedPolicy> {
        match self.policy {
            libc::SCHED_FIFO => Some(SchedPolicy::Fifo),
            libc::SCHED_RR => Some(SchedPolicy::RoundRobin),
            _ => None,
        }
    }
}

/// Read the calling thread's scheduling policy and priority.
///
/// # Errors
///
/// Returns [`HarnessError::Config`] if `pthread_getschedparam` fails.
#[cfg(unix)]
pub fn current_sched() -> HarnessResult<ThreadSched> {
    let mut policy: libc::c_int = 0;
    // SAFETY: sched_param is plain old data; zero is a valid bit pattern
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };

    // SAFETY: pthread_self() is always a valid handle for the calling thread
    let rc = unsafe { libc::pthread_getschedparam(libc::pthread_self(), &mut policy, &mut param) };
    if rc != 0 {
        return Err(HarnessError::Config(format!(
            "pthread_getschedparam failed: {}",
            std::io::Error::from_raw_os_error(rc)
        )));
    }

    Ok(ThreadSched {
        policy,
        priority: param.sched_priority,
    })
}

/// CPU the calling thread is currently running on.
#[cfg(target_os = "linux")]
#[must_use]
pub fn current_cpu() -> Option<usize> {
    // SAFETY: sched_getcpu has no preconditions
    let cpu = unsafe { libc::sched_getcpu() };
    usize::try_from(cpu).ok()
}

/// CPU the calling thread is currently running on.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_cpu() -> Option<usize> {
    None
}

/// Kernel thread id of the calling thread.
#[cfg(target_os = "linux")]
#[must_use]
pub fn current_tid() -> i64 {
    // SAFETY: gettid takes no arguments and cannot fail
    i64::from(unsafe { libc::syscall(libc::SYS_gettid) } as libc::pid_t)
}

/// Kernel thread id of the calling thread.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn current_tid() -> i64 {
    i64::from(std::process::id())
}

/// Check if the current process has real-time capabilities.
#[cfg(target_os = "linux")]
#[must_use]
pub fn check_rt_capabilities() -> RtCapabilities {
    use std::fs;

    let mut caps = RtCapabilities {
        // SAFETY: geteuid cannot fail
        is_root: unsafe { libc::geteuid() } == 0,
        ..Default::default()
    };

    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: rlim is a valid out-pointer
    if unsafe { libc::getrlimit(libc::RLIMIT_RTPRIO, &mut rlim) } == 0 {
        caps.rtprio_limit = Some(rlim.rlim_cur);
    }

    // SAFETY: as above
    if unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, &mut rlim) } == 0 {
        caps.memlock_limit = Some(rlim.rlim_cur);
    }

    if let Ok(version) = fs::read_to_string("/proc/version") {
        caps.preempt_rt = version.contains("PREEMPT_RT") || version.contains("PREEMPT RT");
    }

    caps
}

/// Check if the current process has real-time capabilities.
#[cfg(not(target_os = "linux"))]
#[must_use]
pub fn check_rt_capabilities() -> RtCapabilities {
    RtCapabilities::default()
}

/// Information about real-time capabilities of the system.
#[derive(Debug, Clone, Default)]
pub struct RtCapabilities {
    /// Whether running as root.
    pub is_root: bool,
    /// RLIMIT_RTPRIO value (max RT priority allowed).
    pub rtprio_limit: Option<u64>,
    /// RLIMIT_MEMLOCK value (max lockable memory).
    pub memlock_limit: Option<u64>,
    /// Whether running on a PREEMPT_RT kernel.
    pub preempt_rt: bool,
}

impl RtCapabilities {
    /// Check if RT scheduling at `priority` is likely to succeed.
    #[must_use]
    pub fn can_use_rt_priority(&self, priority: u8) -> bool {
        self.is_root || self.rtprio_limit.is_some_and(|l| l >= u64::from(priority))
    }

    /// Check if memory locking is likely to succeed.
    #[must_use]
    pub fn can_lock_memory(&self) -> bool {
        if self.is_root {
            return true;
        }

        #[cfg(target_family = "unix")]
        {
            self.memlock_limit
                .is_some_and(|l| l == libc::RLIM_INFINITY as u64)
        }

        #[cfg(not(target_family = "unix"))]
        {
            false
        }
    }
}
