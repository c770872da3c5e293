//! Configuration structures for the experiment harness.
//!
//! Two kinds of configuration live here:
//!
//! - [`HarnessConfig`]: ambient settings loaded from TOML (memory locking,
//!   the pin CPU, workload sizes).
//! - [`ExperimentTable`]: the fixed table of experiment recipes. It is built
//!   in code and cannot be changed from a configuration file.

use crate::error::{HarnessError, HarnessResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use tracing::debug;

/// Lowest real-time priority accepted by Linux for FIFO/RR.
pub const RT_PRIORITY_MIN: u8 = 1;
/// Highest real-time priority accepted by Linux for FIFO/RR.
pub const RT_PRIORITY_MAX: u8 = 99;

/// Top-level harness configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Lock all memory pages (mlockall) before any thread starts.
    pub lock_memory: bool,

    /// CPU index every pinned thread is bound to.
    pub pin_cpu: usize,

    /// Workload sizing.
    pub workload: WorkloadConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            lock_memory: true,
            pin_cpu: 1,
            workload: WorkloadConfig::default(),
        }
    }
}

/// Workload cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkloadConfig {
    /// Width of the synthetic image processed by the edge workload.
    pub image_width: usize,
    /// Height of the synthetic image processed by the edge workload.
    pub image_height: usize,
    /// Number of full edge-detection passes per run.
    pub edge_passes: u32,
    /// Iterations of the busy workload.
    pub busy_iterations: u64,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            image_width: 640,
            image_height: 480,
            edge_passes: 40,
            busy_iterations: 400_000_000,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        debug!(?path, "Reading harness configuration");
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(ConfigError::Parse)
    }

    /// Serialize configuration to TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File I/O error.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// TOML parsing error.
    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Real-time scheduler policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedPolicy {
    /// SCHED_FIFO: run until blocked or preempted by a higher priority.
    Fifo,
    /// SCHED_RR: FIFO with a time slice among equal priorities.
    #[serde(rename = "rr")]
    RoundRobin,
}

impl fmt::Display for SchedPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fifo => write!(f, "SCHED_FIFO"),
            Self::RoundRobin => write!(f, "SCHED_RR"),
        }
    }
}

/// Scheduling class of a thread. Policy and priority only exist for RT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "class", rename_all = "lowercase")]
pub enum ThreadClass {
    /// Real-time thread with an explicit policy and priority.
    Rt {
        /// Scheduler policy.
        policy: SchedPolicy,
        /// Static priority (1-99).
        priority: u8,
    },
    /// Default time-sharing thread; scheduling is inherited.
    Nrt,
}

impl ThreadClass {
    /// Returns true for the real-time class.
    #[must_use]
    pub fn is_rt(&self) -> bool {
        matches!(self, Self::Rt { .. })
    }

    /// Check that an RT priority lies in the accepted range.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Config`] for an out-of-range priority.
    pub fn validate(&self) -> HarnessResult<()> {
        match *self {
            Self::Rt { policy, priority }
                if !(RT_PRIORITY_MIN..=RT_PRIORITY_MAX).contains(&priority) =>
            {
                Err(HarnessError::Config(format!(
                    "{policy} priority {priority} outside {RT_PRIORITY_MIN}..={RT_PRIORITY_MAX}"
                )))
            }
            _ => Ok(()),
        }
    }
}

impl fmt::Display for ThreadClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rt { .. } => write!(f, "RT"),
            Self::Nrt => write!(f, "NRT"),
        }
    }
}

/// How a single thread is scheduled. Fixed once the thread is constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchedDirective {
    class: ThreadClass,
    pin_cpu: Option<usize>,
}

impl SchedDirective {
    /// Real-time directive with the given policy and priority.
    ///
    /// # Errors
    ///
    /// Returns an error if the priority is outside 1..=99.
    pub fn rt(policy: SchedPolicy, priority: u8) -> HarnessResult<Self> {
        Self::new(ThreadClass::Rt { policy, priority }, None)
    }

    /// Non-real-time directive.
    #[must_use]
    pub fn nrt() -> Self {
        Self {
            class: ThreadClass::Nrt,
            pin_cpu: None,
        }
    }

    /// Build a directive from a class and an optional pin CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the class fails validation.
    pub fn new(class: ThreadClass, pin_cpu: Option<usize>) -> HarnessResult<Self> {
        class.validate()?;
        Ok(Self { class, pin_cpu })
    }

    /// Same directive pinned to `cpu`.
    #[must_use]
    pub fn pinned_to(self, cpu: usize) -> Self {
        Self {
            pin_cpu: Some(cpu),
            ..self
        }
    }

    /// Scheduling class.
    #[must_use]
    pub fn class(&self) -> ThreadClass {
        self.class
    }

    /// CPU the thread pins itself to, if pinning is enabled.
    #[must_use]
    pub fn pin_cpu(&self) -> Option<usize> {
        self.pin_cpu
    }
}

/// Which workload an application runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// Heavy image edge-detection pipeline.
    Edge,
    /// Light integer busy loop.
    Busy,
}

impl TaskKind {
    /// Fixed workload mapping: the RT application #1 runs the edge workload,
    /// everything else runs the busy loop.
    #[must_use]
    pub fn for_app(app_id: u32, class: ThreadClass) -> Self {
        if class.is_rt() && app_id == 1 {
            Self::Edge
        } else {
            Self::Busy
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Edge => write!(f, "edge"),
            Self::Busy => write!(f, "busy"),
        }
    }
}

/// One application in an experiment recipe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ExperimentEntry {
    /// Application id, unique within the experiment.
    pub app_id: u32,
    /// Workload the application runs.
    pub task: TaskKind,
    /// Scheduling class template; pinning is added per experiment.
    pub class: ThreadClass,
}

impl ExperimentEntry {
    /// Real-time entry using the fixed workload mapping.
    #[must_use]
    pub fn rt(app_id: u32, policy: SchedPolicy, priority: u8) -> Self {
        let class = ThreadClass::Rt { policy, priority };
        Self {
            app_id,
            task: TaskKind::for_app(app_id, class),
            class,
        }
    }

    /// Non-real-time entry using the fixed workload mapping.
    #[must_use]
    pub fn nrt(app_id: u32) -> Self {
        Self {
            app_id,
            task: TaskKind::for_app(app_id, ThreadClass::Nrt),
            class: ThreadClass::Nrt,
        }
    }
}

/// A named, fixed experiment recipe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExperimentConfig {
    /// Identifier used on the command line.
    pub id: u32,
    /// Short human-readable name.
    pub name: String,
    /// Whether every thread is pinned to the harness pin CPU.
    pub pin_enabled: bool,
    /// Applications in start order.
    pub entries: Vec<ExperimentEntry>,
}

impl ExperimentConfig {
    /// Create an experiment recipe.
    pub fn new(
        id: u32,
        name: impl Into<String>,
        pin_enabled: bool,
        entries: Vec<ExperimentEntry>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            pin_enabled,
            entries,
        }
    }

    /// Resolve the directive for one entry given the harness pin CPU.
    ///
    /// # Errors
    ///
    /// Returns an error if the entry's class is invalid.
    pub fn directive_for(
        &self,
        entry: &ExperimentEntry,
        pin_cpu: usize,
    ) -> HarnessResult<SchedDirective> {
        SchedDirective::new(entry.class, self.pin_enabled.then_some(pin_cpu))
    }

    /// Number of RT entries.
    #[must_use]
    pub fn rt_count(&self) -> usize {
        self.entries.iter().filter(|e| e.class.is_rt()).count()
    }

    fn validate(&self) -> HarnessResult<()> {
        if self.entries.is_empty() {
            return Err(HarnessError::Config(format!(
                "experiment {} has no entries",
                self.id
            )));
        }
        for (i, entry) in self.entries.iter().enumerate() {
            entry.class.validate()?;
            if self.entries[..i].iter().any(|e| e.app_id == entry.app_id) {
                return Err(HarnessError::Config(format!(
                    "experiment {}: duplicate app id {}",
                    self.id, entry.app_id
                )));
            }
        }
        Ok(())
    }
}

/// Mapping from experiment id to recipe.
#[derive(Debug, Clone, Default)]
pub struct ExperimentTable {
    experiments: BTreeMap<u32, ExperimentConfig>,
}

impl ExperimentTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The built-in experiment recipes.
    #[must_use]
    pub fn builtin() -> Self {
        use SchedPolicy::{Fifo, RoundRobin};

        let recipes = [
            ExperimentConfig::new(
                0,
                "default",
                false,
                vec![ExperimentEntry::rt(1, Fifo, 80), ExperimentEntry::nrt(2)],
            ),
            ExperimentConfig::new(
                1,
                "rt-vs-2nrt-pinned",
                true,
                vec![
                    ExperimentEntry::rt(1, Fifo, 80),
                    ExperimentEntry::nrt(2),
                    ExperimentEntry::nrt(3),
                ],
            ),
            ExperimentConfig::new(
                2,
                "rt-vs-2nrt-free",
                false,
                vec![
                    ExperimentEntry::rt(1, Fifo, 80),
                    ExperimentEntry::nrt(2),
                    ExperimentEntry::nrt(3),
                ],
            ),
            ExperimentConfig::new(
                3,
                "2fifo-vs-nrt-pinned",
                true,
                vec![
                    ExperimentEntry::rt(1, Fifo, 80),
                    ExperimentEntry::rt(2, Fifo, 80),
                    ExperimentEntry::nrt(3),
                ],
            ),
            ExperimentConfig::new(
                4,
                "2rr-vs-nrt-pinned",
                true,
                vec![
                    ExperimentEntry::rt(1, RoundRobin, 80),
                    ExperimentEntry::rt(2, RoundRobin, 80),
                    ExperimentEntry::nrt(3),
                ],
            ),
            ExperimentConfig::new(
                5,
                "2fifo-vs-nrt-free",
                false,
                vec![
                    ExperimentEntry::rt(1, Fifo, 80),
                    ExperimentEntry::rt(2, Fifo, 80),
                    ExperimentEntry::nrt(3),
                ],
            ),
        ];

        Self {
            experiments: recipes.into_iter().map(|c| (c.id, c)).collect(),
        }
    }

    /// Register a recipe.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken, the recipe is empty, app ids
    /// repeat, or an RT priority is out of range.
    pub fn insert(&mut self, config: ExperimentConfig) -> HarnessResult<()> {
        config.validate()?;
        if self.experiments.contains_key(&config.id) {
            return Err(HarnessError::Config(format!(
                "experiment {} already registered",
                config.id
            )));
        }
        self.experiments.insert(config.id, config);
        Ok(())
    }

    /// Look up a recipe by id.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::UnknownExperiment`] if no recipe has this id.
    pub fn get(&self, id: u32) -> HarnessResult<&ExperimentConfig> {
        self.experiments
            .get(&id)
            .ok_or(HarnessError::UnknownExperiment(id))
    }

    /// Iterate recipes in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ExperimentConfig> {
        self.experiments.values()
    }

    /// Number of registered recipes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.experiments.len()
    }

    /// Returns true if no recipe is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.experiments.is_empty()
    }
}
