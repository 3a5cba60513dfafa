//! Simulation control: engine capabilities, exit events, stats files and the driver.
//!
//! The driver in [`driver`] only talks to the backend through the
//! [`SimEngine`] and [`StatsSink`] traits, so it runs the same against a real
//! simulator binding, the [`SyntheticEngine`] or a test fake.

/// Two-phase (warmup + main) run driver.
pub mod driver;
/// Engine and statistics-sink traits.
pub mod engine;
/// Simulation exit events.
pub mod event;
/// Stats text parsing and stats file management.
pub mod stats_file;
/// Fixed-rate engine used by the CLI and tests.
pub mod synthetic;

pub use driver::{RunOutcome, SimulationDriver, WarmupSummary};
pub use engine::{SimEngine, StatsSink};
pub use event::SimEvent;
pub use stats_file::{StatsFiles, StatsSnapshot};
pub use synthetic::{SyntheticEngine, SyntheticStats, Workload};
