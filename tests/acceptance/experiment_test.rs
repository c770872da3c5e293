//! Built-in experiment table acceptance tests.
//!
//! These pin down the recipes the command line exposes; no threads are
//! created here.

use rtlab_common::config::{ExperimentTable, SchedPolicy, TaskKind, ThreadClass};
use rtlab_common::error::HarnessError;

#[test]
fn test_default_experiment_shape() {
    let table = ExperimentTable::builtin();
    let exp = table.get(0).unwrap();

    assert!(!exp.pin_enabled);
    assert_eq!(exp.entries.len(), 2);
    assert_eq!(
        exp.entries[0].class,
        ThreadClass::Rt {
            policy: SchedPolicy::Fifo,
            priority: 80
        }
    );
    assert_eq!(exp.entries[0].task, TaskKind::Edge);
    assert_eq!(exp.entries[1].class, ThreadClass::Nrt);
    assert_eq!(exp.entries[1].task, TaskKind::Busy);
}

#[test]
fn test_pinned_experiment_shape() {
    let table = ExperimentTable::builtin();
    let exp = table.get(1).unwrap();

    assert!(exp.pin_enabled);
    assert_eq!(exp.entries.len(), 3);
    assert_eq!(exp.rt_count(), 1);

    let cpus: Vec<_> = exp
        .entries
        .iter()
        .map(|e| exp.directive_for(e, 2).unwrap().pin_cpu())
        .collect();
    assert_eq!(cpus, vec![Some(2); 3]);
}

#[test]
fn test_unknown_experiment() {
    let table = ExperimentTable::builtin();
    assert_eq!(table.get(99).unwrap_err(), HarnessError::UnknownExperiment(99));
    assert!(table.get(6).is_err());
}

#[test]
fn test_round_robin_variant() {
    let table = ExperimentTable::builtin();
    let exp = table.get(4).unwrap();

    assert!(exp.pin_enabled);
    assert_eq!(exp.rt_count(), 2);
    for entry in exp.entries.iter().filter(|e| e.class.is_rt()) {
        assert!(matches!(
            entry.class,
            ThreadClass::Rt {
                policy: SchedPolicy::RoundRobin,
                ..
            }
        ));
    }
}

#[test]
fn test_only_rt_app_one_runs_edge_detection() {
    let table = ExperimentTable::builtin();
    for exp in table.iter() {
        for entry in &exp.entries {
            let expect_edge = entry.app_id == 1 && entry.class.is_rt();
            assert_eq!(
                entry.task == TaskKind::Edge,
                expect_edge,
                "experiment {} app {}",
                exp.id,
                entry.app_id
            );
        }
    }
}

#[test]
fn test_unpinned_directives_have_no_cpu() {
    let table = ExperimentTable::builtin();
    for id in [0, 2, 5] {
        let exp = table.get(id).unwrap();
        assert!(exp
            .entries
            .iter()
            .all(|e| exp.directive_for(e, 1).unwrap().pin_cpu().is_none()));
    }
}
