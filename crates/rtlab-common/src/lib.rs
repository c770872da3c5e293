#![doc = "Common types shared across the rtlab workspace."]

pub mod config;
pub mod error;
pub mod report;
pub mod state;
pub mod time;

pub use config::*;
pub use error::*;
pub use report::*;
pub use state::*;
pub use time::*;
