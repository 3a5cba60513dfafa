//! Two-phase simulation driver.
//!
//! The driver owns an engine and its statistics sink and runs:
//! 1. **Warmup:** Bounded slices until the configured instruction count is reached
//!    (or the workload stops early), then archives the warmup statistics.
//! 2. **Main:** Unbounded runs, taking a checkpoint whenever the workload asks for
//!    one, until any other exit event ends the run.
//! 3. **Finalize:** A last stats dump, plus the `stats_final.txt` rewrite when warmup was used.

use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::common::constants::WARMUP_SLICE_TICKS;
use crate::common::{DriverError, Result};
use crate::config::RunConfig;

use super::engine::{SimEngine, StatsSink};
use super::event::SimEvent;
use super::stats_file::{StatsFiles, StatsSnapshot};

/// How the warmup phase ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarmupSummary {
    /// Tick at which warmup ended.
    pub tick: u64,
    /// Slices simulated.
    pub slices: u64,
    /// True if the instruction target was observed in the stats file.
    pub reached_target: bool,
    /// Cause of the last slice.
    pub last_cause: String,
    /// Archive of the warmup statistics, if a live file existed.
    pub archive: Option<PathBuf>,
}

/// Result of a complete run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// The event that ended the main phase.
    pub event: SimEvent,
    /// Tick of the terminal event.
    pub tick: u64,
    /// Checkpoint directories written during the main phase.
    pub checkpoints: Vec<PathBuf>,
    /// Warmup phase summary, when a warmup was configured.
    pub warmup: Option<WarmupSummary>,
    /// `stats_final.txt`, when a warmup was configured and stats existed.
    pub final_stats: Option<PathBuf>,
}

impl RunOutcome {
    /// Process exit code: taken verbatim from the terminal event.
    pub const fn exit_code(&self) -> i32 {
        self.event.code
    }
}

/// Drives an engine through warmup and the main run.
#[derive(Debug)]
pub struct SimulationDriver<E, S> {
    config: RunConfig,
    engine: E,
    stats: S,
    files: StatsFiles,
}

impl<E: SimEngine, S: StatsSink> SimulationDriver<E, S> {
    /// Creates a driver for `config` over the given engine and stats sink.
    pub fn new(config: RunConfig, engine: E, stats: S) -> Self {
        let files = StatsFiles::new(config.outdir.clone());
        Self {
            config,
            engine,
            stats,
            files,
        }
    }

    /// Run configuration.
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Stats file locations.
    pub const fn files(&self) -> &StatsFiles {
        &self.files
    }

    /// The driven engine.
    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Consumes the driver, returning the engine and stats sink.
    pub fn into_parts(self) -> (E, S) {
        (self.engine, self.stats)
    }

    /// Instantiates the engine and runs warmup (if configured) and the main phase.
    ///
    /// # Errors
    ///
    /// Returns an error if the output directory cannot be created, the
    /// restore fails, or a stats file or checkpoint cannot be written.
    /// Stats polling failures during warmup are not errors.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let outdir = self.files.outdir().to_path_buf();
        fs::create_dir_all(&outdir).map_err(|e| DriverError::io("create", &outdir, e))?;
        if self.config.checkpoint {
            info!(dir = %outdir.display(), "checkpoint directory");
        }

        if let Some(restore) = &self.config.restore {
            info!(from = %restore.display(), "restoring checkpoint");
        }
        self.engine.instantiate(self.config.restore.clone())?;

        let warmup = match self.config.warmup_target() {
            Some(target) => Some(self.run_warmup(target)?),
            None => None,
        };

        let (event, checkpoints) = self.run_main()?;
        let tick = self.engine.cur_tick();

        info!("dumping final statistics");
        self.stats.dump()?;

        let final_stats = if warmup.is_some() {
            let path = self.files.finalize()?;
            if let Some(path) = &path {
                info!(path = %path.display(), "simulation stats renamed");
            }
            path
        } else {
            None
        };

        Ok(RunOutcome {
            event,
            tick,
            checkpoints,
            warmup,
            final_stats,
        })
    }

    /// Runs bounded slices until `target` instructions are reported, then
    /// archives the warmup statistics and reseeds the live stats file.
    ///
    /// # Errors
    ///
    /// Returns an error if a stats dump or the archive step fails.
    pub fn run_warmup(&mut self, target: u64) -> Result<WarmupSummary> {
        info!(warmup_insts = target, "warmup instructions");
        self.set_inst_limit(target);

        let mut slices = 0;
        let (reached_target, last_cause) = loop {
            let event = self.engine.simulate(Some(WARMUP_SLICE_TICKS));
            slices += 1;
            self.stats.dump()?;

            if self.warmup_reached(target) {
                info!("warmup done");
                break (true, event.cause);
            }
            if !event.is_slice_limit() {
                info!(
                    cause = %event.cause,
                    tick = self.engine.cur_tick(),
                    "simulation ended during warmup"
                );
                break (false, event.cause);
            }
        };

        info!("resetting stats after warmup");
        self.stats.dump()?;
        self.stats.reset();
        let archive = self.files.archive_warmup()?;
        if let Some(path) = &archive {
            info!(path = %path.display(), "warmup stats archived");
        }
        self.stats.reset();
        self.files.write_placeholder()?;

        Ok(WarmupSummary {
            tick: self.engine.cur_tick(),
            slices,
            reached_target,
            last_cause,
            archive,
        })
    }

    /// Runs until an exit event other than a checkpoint request.
    ///
    /// Returns the terminal event and the checkpoint directories written.
    ///
    /// # Errors
    ///
    /// Returns an error if a checkpoint cannot be written.
    pub fn run_main(&mut self) -> Result<(SimEvent, Vec<PathBuf>)> {
        match self.config.max_insts.filter(|&n| n > 0) {
            Some(max) => info!(max_insts = max, "starting main simulation"),
            None => info!("starting main simulation"),
        }
        if let Some(total) = self.config.total_inst_limit() {
            info!(
                total,
                warmup = self.config.warmup_target().unwrap_or(0),
                "setting total instruction limit"
            );
            self.set_inst_limit(total);
        }

        let mut checkpoints = Vec::new();
        loop {
            let event = self.engine.simulate(None);
            let tick = self.engine.cur_tick();
            if event.is_checkpoint() {
                info!(tick, "dropping checkpoint");
                let dir = self.files.checkpoint_dir(tick);
                self.engine.checkpoint(&dir)?;
                info!(dir = %dir.display(), "checkpoint done");
                checkpoints.push(dir);
            } else {
                info!(cause = %event.cause, tick, "simulation exited");
                return Ok((event, checkpoints));
            }
        }
    }

    /// Reads the live stats file and checks the warmup target.
    ///
    /// A missing or unreadable file only means the target is not reached yet.
    fn warmup_reached(&self, target: u64) -> bool {
        let text = match self.files.read_live() {
            Ok(text) => text,
            Err(e) => {
                warn!(
                    path = %self.files.live().display(),
                    error = %e,
                    "cannot read stats file"
                );
                return false;
            }
        };
        let snapshot = StatsSnapshot::parse(&text);
        debug!(current = ?snapshot.latest(), goal = target, "warmup progress");
        snapshot.reached(target)
    }

    fn set_inst_limit(&mut self, limit: u64) {
        for core in 0..self.engine.num_cores() {
            self.engine.set_max_insts(core, limit);
        }
    }
}
