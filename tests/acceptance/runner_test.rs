//! Experiment runner acceptance tests.
//!
//! These drive complete runs through the public runner API with stub
//! workloads and a recording affinity control, so they need no privileges.
//! RT entries in the built-in recipes may be refused by the host; the
//! assertions only rely on what holds either way.

use super::common::{fast_config, ConcurrencyProbe, RecordingAffinity};
use rtlab_common::config::{ExperimentConfig, ExperimentEntry, ExperimentTable};
use rtlab_common::error::HarnessError;
use rtlab_common::report::ExperimentSummary;
use rtlab_common::state::RunnerState;
use rtlab_harness::runner::{RunOutcome, RunnerBuilder};
use std::sync::Arc;

fn nrt_only(id: u32, pin_enabled: bool, count: u32) -> ExperimentTable {
    let mut table = ExperimentTable::new();
    table
        .insert(ExperimentConfig::new(
            id,
            "nrt-only",
            pin_enabled,
            (1..=count).map(ExperimentEntry::nrt).collect(),
        ))
        .unwrap();
    table
}

fn completed(outcome: RunOutcome) -> ExperimentSummary {
    match outcome {
        RunOutcome::Completed(summary) => summary,
        RunOutcome::NotFound(id) => panic!("experiment {id} not found"),
    }
}

/// Every thread is started before the first join.
#[test]
fn test_all_threads_start_before_any_join() {
    let probe = ConcurrencyProbe::new(4);
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(nrt_only(7, false, 4))
        .task_source(probe.clone())
        .build();

    let summary = completed(runner.run(7).unwrap());

    assert_eq!(summary.completed(), 4);
    assert_eq!(probe.peak(), 4, "threads did not all run concurrently");
}

/// N entries yield N reports, each internally consistent.
#[test]
fn test_reports_are_nested() {
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(nrt_only(7, false, 3))
        .build();

    let summary = completed(runner.run(7).unwrap());

    assert!(summary.is_clean());
    assert_eq!(summary.reports.len(), 3);
    for report in &summary.reports {
        assert!(report.thread.end() >= report.thread.start());
        assert!(report.is_nested(), "app {} workload escaped thread", report.app_id);
        assert!(report.workload_time() <= report.total());
        assert!(report.tid > 0);
    }
    let mut ids: Vec<_> = summary.reports.iter().map(|r| r.app_id).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn test_unpinned_run_makes_no_affinity_calls() {
    let affinity = Arc::new(RecordingAffinity::default());
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(nrt_only(7, false, 3))
        .affinity(affinity.clone())
        .build();

    completed(runner.run(7).unwrap());
    assert!(affinity.calls().is_empty());
}

#[test]
fn test_pinned_run_pins_each_thread_once() {
    let affinity = Arc::new(RecordingAffinity::default());
    let mut config = fast_config();
    config.pin_cpu = 0;
    let mut runner = RunnerBuilder::new()
        .config(config)
        .table(nrt_only(7, true, 3))
        .affinity(affinity.clone())
        .build();

    let summary = completed(runner.run(7).unwrap());
    assert_eq!(summary.pin_cpu, Some(0));
    assert_eq!(affinity.calls(), vec![0, 0, 0]);
}

/// Built-in experiment 0: two threads, never pinned.
#[test]
fn test_builtin_default_experiment() {
    let affinity = Arc::new(RecordingAffinity::default());
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .affinity(affinity.clone())
        .build();

    let summary = completed(runner.run(0).unwrap());

    assert_eq!(summary.completed() + summary.failures.len(), 2);
    assert!(summary.report(2).is_some(), "NRT app 2 always runs");
    assert_eq!(summary.pin_cpu, None);
    assert!(affinity.calls().is_empty());
    assert_eq!(runner.state(), RunnerState::Done);
}

/// Built-in experiment 1: three threads, every started one pinned to the
/// same CPU.
#[test]
fn test_builtin_pinned_experiment() {
    let affinity = Arc::new(RecordingAffinity::default());
    let mut config = fast_config();
    config.pin_cpu = 0;
    let mut runner = RunnerBuilder::new()
        .config(config)
        .affinity(affinity.clone())
        .build();

    let summary = completed(runner.run(1).unwrap());

    assert_eq!(summary.completed() + summary.failures.len(), 3);
    assert!(summary.report(2).is_some());
    assert!(summary.report(3).is_some());
    for (app_id, err) in &summary.failures {
        assert!(
            matches!(err, HarnessError::SchedPolicy { .. }),
            "app {app_id}: {err}"
        );
    }

    let calls = affinity.calls();
    assert_eq!(calls.len(), summary.completed());
    assert!(calls.iter().all(|&cpu| cpu == 0));
}

#[test]
fn test_unknown_experiment_runs_nothing() {
    let affinity = Arc::new(RecordingAffinity::default());
    let probe = ConcurrencyProbe::new(1);
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .affinity(affinity.clone())
        .task_source(probe.clone())
        .build();

    let outcome = runner.run(99).unwrap();

    assert!(matches!(outcome, RunOutcome::NotFound(99)));
    assert!(runner.state_path().contains(&RunnerState::ConfigMissing));
    assert_eq!(runner.state(), RunnerState::Done);
    assert_eq!(probe.peak(), 0);
    assert!(affinity.calls().is_empty());
}

#[test]
fn test_state_path_of_completed_run() {
    let mut runner = RunnerBuilder::new()
        .config(fast_config())
        .table(nrt_only(7, false, 2))
        .build();
    completed(runner.run(7).unwrap());

    assert_eq!(
        runner.state_path(),
        vec![
            RunnerState::Init,
            RunnerState::MemoryLocked,
            RunnerState::ConfigSelected,
            RunnerState::ThreadsStarted,
            RunnerState::ThreadsJoined,
            RunnerState::Done,
        ]
    );
}
