//! Real-time scheduling acceptance tests.
//!
//! RT threads must already run under their directive's policy and priority
//! when the task executes its first instruction. On hosts that refuse RT
//! scheduling the thread must never run at all.
//!
//! # Requirements
//!
//! - CAP_SYS_NICE or RLIMIT_RTPRIO >= the requested priority for the full
//!   checks; otherwise the refusal path is checked instead
//! - Root and a spare CPU for the ignored end-to-end run

use super::common::{
    check_memory_lock_prerequisites, check_rt_prerequisites, fast_config, num_cpus, SchedProbe,
};
use rtlab_common::config::{ExperimentConfig, ExperimentEntry, ExperimentTable, SchedPolicy};
use rtlab_common::error::HarnessError;
use rtlab_harness::runner::{RunOutcome, RunnerBuilder};

fn mixed_table() -> ExperimentTable {
    let mut table = ExperimentTable::new();
    table
        .insert(ExperimentConfig::new(
            20,
            "fifo-rr-nrt",
            false,
            vec![
                ExperimentEntry::rt(1, SchedPolicy::Fifo, 10),
                ExperimentEntry::rt(2, SchedPolicy::RoundRobin, 12),
                ExperimentEntry::nrt(3),
            ],
        ))
        .unwrap();
    table
}

#[test]
fn test_rt_policy_applied_before_first_instruction() {
    let probe = SchedProbe::default();
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(mixed_table())
        .task_source(probe.clone())
        .build();

    let RunOutcome::Completed(summary) = runner.run(20).unwrap() else {
        panic!("experiment 20 should exist");
    };

    let nrt = probe.observed(3).expect("NRT task always runs");
    assert_eq!(nrt.rt_policy(), None);

    for (app_id, policy, priority) in [(1, SchedPolicy::Fifo, 10), (2, SchedPolicy::RoundRobin, 12)]
    {
        match summary.failures.iter().find(|(id, _)| *id == app_id) {
            Some((_, err)) => {
                eprintln!("Host refused RT for app {app_id}: {err}");
                assert!(matches!(err, HarnessError::SchedPolicy { .. }));
                assert!(probe.observed(app_id).is_none(), "refused RT task ran");
            }
            None => {
                let sched = probe.observed(app_id).expect("started RT task ran");
                assert_eq!(sched.rt_policy(), Some(policy));
                assert_eq!(sched.priority, i32::from(priority));
            }
        }
    }
}

#[test]
fn test_rt_threads_granted_when_permitted() {
    if let Err(e) = check_rt_prerequisites(12) {
        eprintln!("Skipping test: {}", e);
        return;
    }

    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(mixed_table())
        .task_source(SchedProbe::default())
        .build();

    let RunOutcome::Completed(summary) = runner.run(20).unwrap() else {
        panic!("experiment 20 should exist");
    };
    assert!(summary.is_clean(), "{summary}");
    assert_eq!(summary.completed(), 3);
}

/// Full-size run of the two-FIFO pinned experiment with real workloads
/// and memory locking.
#[test]
#[ignore = "Requires root - runs full-size workloads for several seconds"]
fn test_two_fifo_pinned_end_to_end() {
    if let Err(e) = check_rt_prerequisites(80) {
        eprintln!("Skipping test: {}", e);
        return;
    }
    if let Err(e) = check_memory_lock_prerequisites() {
        eprintln!("Skipping test: {}", e);
        return;
    }
    if num_cpus() < 2 {
        eprintln!("Skipping test: need at least 2 CPUs");
        return;
    }

    let mut config = rtlab_common::config::HarnessConfig::default();
    config.pin_cpu = 1;
    let mut runner = RunnerBuilder::new().config(config).build();

    let RunOutcome::Completed(summary) = runner.run(3).unwrap() else {
        panic!("experiment 3 should exist");
    };
    assert!(summary.is_clean(), "{summary}");
    assert_eq!(summary.completed(), 3);
    for report in &summary.reports {
        assert_eq!(report.cpu, Some(1), "app {} not on pin CPU", report.app_id);
        assert!(report.is_nested());
    }
}
