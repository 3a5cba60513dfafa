//! Configuration for a driven simulation run.
//!
//! This module defines the inputs of a run. It provides:
//! 1. **Run control:** Warmup and maximum instruction counts, checkpointing, restore and the output directory.
//! 2. **Root document:** [`SimConfig`], pairing run control with the [`SystemSpec`] topology.
//! 3. **Loading:** JSON deserialization with per-field defaults, followed by validation.
//!
//! Every field has a default, so `{}` is a valid document. The CLI loads an
//! optional JSON file first and then applies its flags on top.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::common::{DriverError, Result};
use crate::topology::SystemSpec;

mod defaults {
    /// Output directory used when none is configured.
    pub const OUTDIR: &str = "m5out";
}

/// Run-control inputs of the driver.
///
/// Instruction counts of `0` are treated the same as unset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunConfig {
    /// Instructions to run before statistics are considered meaningful.
    #[serde(default)]
    pub warmup_insts: Option<u64>,

    /// Instructions to run after warmup.
    #[serde(default)]
    pub max_insts: Option<u64>,

    /// Log the checkpoint directory at start-up.
    #[serde(default)]
    pub checkpoint: bool,

    /// Directory holding stats files and checkpoints.
    #[serde(default = "RunConfig::default_outdir")]
    pub outdir: PathBuf,

    /// Checkpoint directory to restore before running.
    #[serde(default)]
    pub restore: Option<PathBuf>,
}

impl RunConfig {
    fn default_outdir() -> PathBuf {
        PathBuf::from(defaults::OUTDIR)
    }

    /// Creates a run with no warmup and no instruction limit writing to `outdir`.
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            warmup_insts: None,
            max_insts: None,
            checkpoint: false,
            outdir: outdir.into(),
            restore: None,
        }
    }

    /// Sets the warmup instruction count.
    #[must_use]
    pub fn with_warmup(mut self, insts: u64) -> Self {
        self.warmup_insts = Some(insts);
        self
    }

    /// Sets the post-warmup instruction count.
    #[must_use]
    pub fn with_max_insts(mut self, insts: u64) -> Self {
        self.max_insts = Some(insts);
        self
    }

    /// Warmup target, if a non-zero warmup is configured.
    pub fn warmup_target(&self) -> Option<u64> {
        self.warmup_insts.filter(|&n| n > 0)
    }

    /// Per-core instruction limit for the main phase.
    ///
    /// The engine counts instructions from the start of simulation, so the
    /// warmup instructions are added to the post-warmup budget.
    ///
    /// ```
    /// use simdrive_core::config::RunConfig;
    ///
    /// let run = RunConfig::new("out").with_max_insts(1000).with_warmup(200);
    /// assert_eq!(run.total_inst_limit(), Some(1200));
    /// assert_eq!(RunConfig::new("out").with_warmup(200).total_inst_limit(), None);
    /// ```
    pub fn total_inst_limit(&self) -> Option<u64> {
        self.max_insts
            .filter(|&n| n > 0)
            .map(|max| max.saturating_add(self.warmup_target().unwrap_or(0)))
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self::new(defaults::OUTDIR)
    }
}

/// Root configuration document.
///
/// # Examples
///
/// ```
/// use simdrive_core::config::SimConfig;
/// use simdrive_core::topology::CpuModel;
///
/// let json = r#"{
///     "run": { "warmup_insts": 5000000, "max_insts": 10000000, "outdir": "out" },
///     "system": { "cpu": "o3", "num_cores": 2, "cpu_freq": "3GHz" }
/// }"#;
///
/// let config = SimConfig::from_json_str(json).unwrap();
/// assert_eq!(config.run.total_inst_limit(), Some(15_000_000));
/// assert_eq!(config.system.cpu, CpuModel::O3);
/// assert_eq!(config.system.num_cores, 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Run control.
    pub run: RunConfig,
    /// System topology.
    pub system: SystemSpec,
}

impl SimConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::ConfigParse`] on malformed JSON and
    /// [`DriverError::InvalidConfig`] when validation fails.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the file cannot be read, otherwise as
    /// [`SimConfig::from_json_str`].
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| DriverError::io("read", path, e))?;
        Self::from_json_str(&text)
    }

    /// Validates the system description and run limits.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.system.validate()?;
        if self.run.outdir.as_os_str().is_empty() {
            return Err(DriverError::InvalidConfig(
                "outdir must not be empty".to_owned(),
            ));
        }
        Ok(())
    }
}
