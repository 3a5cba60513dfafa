//! Warmup-aware run driver for full-system simulations.
//!
//! This crate drives an external simulation engine through a two-phase run:
//! 1. **Warmup:** Bounded slices until an instruction count is reached, with the
//!    warmup statistics archived to `stats_warmup.txt`.
//! 2. **Main:** Unbounded runs with checkpoints on request, ending with the
//!    engine's exit code and a clean `stats_final.txt`.
//! 3. **Topology:** A declarative description of the CPU cluster, caches and boot inputs.
//! 4. **Configuration:** JSON-loadable run and system settings.
//! 5. **FDP preset:** The fetch-directed prefetch experiment system and its baseline.

/// Common types and constants (errors, stats file names, event causes).
pub mod common;
/// Run and system configuration.
pub mod config;
/// Fetch-directed prefetch experiment preset.
pub mod fdp;
/// Engine traits, exit events, stats files, the driver and the synthetic engine.
pub mod sim;
/// CPU cluster, cache presets and boot parameters.
pub mod topology;

/// Root configuration type; use `SimConfig::default()` or load it from JSON.
pub use crate::config::{RunConfig, SimConfig};
/// The run driver.
pub use crate::sim::SimulationDriver;
/// Full system description.
pub use crate::topology::SystemSpec;
