//! Integration tests for rtlab acceptance testing.
//!
//! Most tests run unprivileged with stub workloads. RT checks adapt to what
//! the host grants:
//! - CAP_SYS_NICE or RLIMIT_RTPRIO for RT threads
//! - Root for memory locking in the full-size run

mod common;
mod experiment_test;
mod rt_scheduling_test;
mod runner_test;
