//! Capabilities the driver needs from a simulation backend.
//!
//! The driver never touches engine globals. Everything it does to the
//! backend goes through these two traits, which a real simulator binding,
//! the [`SyntheticEngine`](super::synthetic::SyntheticEngine) or a test
//! fake can implement.

use std::path::{Path, PathBuf};

use crate::common::Result;

use super::event::SimEvent;

/// Advances simulated time and manages engine state.
pub trait SimEngine {
    /// Instantiates the simulated system, restoring `restore` if given.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be read or does not match the system.
    fn instantiate(&mut self, restore: Option<PathBuf>) -> Result<()>;

    /// Runs until the next exit event, or for at most `max_ticks` ticks.
    ///
    /// Engine faults are reported through the event cause, never as errors.
    fn simulate(&mut self, max_ticks: Option<u64>) -> SimEvent;

    /// Current simulated tick.
    fn cur_tick(&self) -> u64;

    /// Number of cores whose instruction limit can be set.
    fn num_cores(&self) -> usize;

    /// Sets the instruction limit of `core`, counted from the start of simulation.
    fn set_max_insts(&mut self, core: usize, limit: u64);

    /// Serializes the full engine state into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the checkpoint cannot be written.
    fn checkpoint(&mut self, dir: &Path) -> Result<()>;
}

/// Statistics output of the engine.
pub trait StatsSink {
    /// Appends the current statistics to the live stats file.
    ///
    /// # Errors
    ///
    /// Returns an error if the stats file cannot be written.
    fn dump(&mut self) -> Result<()>;

    /// Starts a new statistics window. Calling it twice in a row is harmless.
    fn reset(&mut self);
}
