#![doc = "Thread scheduling and measurement harness for RT/NRT contention experiments."]

pub mod realtime;
pub mod runner;
mod spawn;
pub mod task;
pub mod thread;
pub mod workload;

pub use realtime::*;
pub use runner::*;
pub use task::*;
pub use thread::*;
pub use workload::*;
