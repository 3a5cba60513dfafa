//! Self-contained engine with a fixed retirement rate.
//!
//! [`SyntheticEngine`] stands in for a full simulator backend. Every core
//! retires instructions at a constant IPC derived from its CPU model, so the
//! tick at which any instruction count is reached is known in closed form.
//! It models:
//! 1. **Exit events:** Slice bounds, per-core instruction limits, scheduled
//!    checkpoint requests and the end of the workload.
//! 2. **Statistics:** gem5-style text blocks written to a fresh `stats.txt` by
//!    [`SyntheticStats`], windowed by `reset`.
//! 3. **Checkpoints:** A JSON state file per checkpoint directory, restorable by
//!    `instantiate`.
//!
//! Instruction limits count from the start of simulation, while `simInsts`
//! in the stats file counts from the last statistics reset.

use std::cell::RefCell;
use std::fmt::Write as _;
use std::fs::{self, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::constants::{
    CAUSE_MAX_INSTS, CAUSE_WORKLOAD_EXIT, STATS_FILE, TICKS_PER_SECOND,
};
use crate::common::{DriverError, Result};
use crate::topology::{ClusterSpec, CpuModel};

use super::engine::{SimEngine, StatsSink};
use super::event::SimEvent;

/// Name of the state file inside a checkpoint directory.
pub const CHECKPOINT_STATE_FILE: &str = "engine.json";

/// Instructions retired per 1000 cycles for each CPU model.
pub const fn ipc_milli(model: CpuModel) -> u64 {
    match model {
        CpuModel::Atomic => 1000,
        CpuModel::Minor => 700,
        CpuModel::Hpi => 850,
        CpuModel::O3 => 1800,
    }
}

/// What the simulated workload does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workload {
    /// Instructions per core before the workload exits.
    pub insts: u64,
    /// Exit code reported when the workload exits.
    pub exit_code: i32,
    /// Ticks at which the workload requests a checkpoint.
    pub checkpoint_ticks: Vec<u64>,
}

impl Workload {
    /// A workload of `insts` instructions exiting with code 0.
    pub const fn new(insts: u64) -> Self {
        Self {
            insts,
            exit_code: 0,
            checkpoint_ticks: Vec::new(),
        }
    }

    /// Sets the exit code.
    #[must_use]
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Requests checkpoints at the given ticks.
    #[must_use]
    pub fn with_checkpoints(mut self, ticks: impl IntoIterator<Item = u64>) -> Self {
        self.checkpoint_ticks = ticks.into_iter().collect();
        self.checkpoint_ticks.sort_unstable();
        self.checkpoint_ticks.dedup();
        self
    }
}

#[derive(Debug)]
struct ModelState {
    tick: u64,
    cycle_ticks: u64,
    ipc_milli: u64,
    limits: Vec<Option<u64>>,
    workload: Workload,
    exited: bool,
    window_tick: u64,
    window_insts: u64,
}

impl ModelState {
    /// Instructions each core has retired by `tick`.
    fn insts_at(&self, tick: u64) -> u64 {
        let cycles = u128::from(tick / self.cycle_ticks);
        u64::try_from(cycles * u128::from(self.ipc_milli) / 1000).unwrap_or(u64::MAX)
    }

    /// First tick at which each core has retired `insts` instructions.
    fn tick_for(&self, insts: u64) -> u64 {
        let cycles = (u128::from(insts) * 1000).div_ceil(u128::from(self.ipc_milli));
        let tick = cycles * u128::from(self.cycle_ticks);
        u64::try_from(tick).unwrap_or(u64::MAX)
    }
}

/// Checkpoint payload.
#[derive(Debug, Serialize, Deserialize)]
struct CheckpointState {
    tick: u64,
    cores: usize,
    insts: u64,
}

/// Fixed-rate engine; see the module docs.
#[derive(Debug)]
pub struct SyntheticEngine {
    state: Rc<RefCell<ModelState>>,
}

impl SyntheticEngine {
    /// Creates an engine for `cluster` running `workload`.
    ///
    /// Instruction limits already set on the cluster's cores are applied.
    pub fn new(cluster: &ClusterSpec, workload: Workload) -> Self {
        let limits = cluster.cores.iter().map(|c| c.max_insts).collect();
        let state = ModelState {
            tick: 0,
            cycle_ticks: cluster.clock_ticks.max(1),
            ipc_milli: ipc_milli(cluster.model),
            limits,
            workload,
            exited: false,
            window_tick: 0,
            window_insts: 0,
        };
        Self {
            state: Rc::new(RefCell::new(state)),
        }
    }

    /// Stats sink sharing this engine's counters, writing into `outdir`.
    pub fn stats_sink(&self, outdir: impl Into<PathBuf>) -> SyntheticStats {
        SyntheticStats {
            state: Rc::clone(&self.state),
            path: outdir.into().join(STATS_FILE),
            opened: false,
        }
    }

    /// Instructions retired per core so far.
    pub fn committed_insts(&self) -> u64 {
        let s = self.state.borrow();
        s.insts_at(s.tick)
    }

    /// Current instruction limit of `core`, if armed.
    pub fn max_insts(&self, core: usize) -> Option<u64> {
        self.state.borrow().limits.get(core).copied().flatten()
    }
}

impl SimEngine for SyntheticEngine {
    fn instantiate(&mut self, restore: Option<PathBuf>) -> Result<()> {
        let Some(dir) = restore else {
            return Ok(());
        };
        let path = dir.join(CHECKPOINT_STATE_FILE);
        let text = fs::read_to_string(&path).map_err(|e| DriverError::io("read", &path, e))?;
        let saved: CheckpointState =
            serde_json::from_str(&text).map_err(|e| DriverError::Checkpoint {
                path: dir.clone(),
                reason: e.to_string(),
            })?;

        let mut s = self.state.borrow_mut();
        if saved.cores != s.limits.len() {
            return Err(DriverError::Checkpoint {
                path: dir,
                reason: format!(
                    "checkpoint has {} cores, system has {}",
                    saved.cores,
                    s.limits.len()
                ),
            });
        }
        s.tick = saved.tick;
        s.window_tick = saved.tick;
        s.window_insts = saved.insts;
        s.workload.checkpoint_ticks.retain(|&t| t > saved.tick);
        debug!(tick = saved.tick, "restored synthetic engine");
        Ok(())
    }

    fn simulate(&mut self, max_ticks: Option<u64>) -> SimEvent {
        let mut s = self.state.borrow_mut();
        let start = s.tick;
        if s.exited {
            return SimEvent::new(CAUSE_WORKLOAD_EXIT, s.workload.exit_code);
        }

        // Earliest event wins; on ties the order below decides.
        let exit_tick = s.tick_for(s.workload.insts);
        let limit = s
            .limits
            .iter()
            .enumerate()
            .filter_map(|(core, l)| l.map(|n| (s.tick_for(n).max(start), core)))
            .min();
        let checkpoint = s.workload.checkpoint_ticks.first().copied();
        let bound = max_ticks.map(|t| start.saturating_add(t));

        let mut next = (exit_tick.max(start), 0_u8);
        if let Some((t, _)) = limit {
            next = next.min((t, 1));
        }
        if let Some(t) = checkpoint {
            next = next.min((t.max(start), 2));
        }
        if let Some(t) = bound {
            next = next.min((t, 3));
        }

        s.tick = next.0;
        match next.1 {
            0 => {
                s.exited = true;
                SimEvent::new(CAUSE_WORKLOAD_EXIT, s.workload.exit_code)
            }
            1 => {
                let now = next.0;
                let fired: Vec<usize> = s
                    .limits
                    .iter()
                    .enumerate()
                    .filter(|(_, l)| l.is_some_and(|n| s.tick_for(n) <= now))
                    .map(|(core, _)| core)
                    .collect();
                // A limit fires once, like the engine's exit event it stands for.
                for core in fired {
                    s.limits[core] = None;
                }
                SimEvent::new(CAUSE_MAX_INSTS, 0)
            }
            2 => {
                let _ = s.workload.checkpoint_ticks.remove(0);
                SimEvent::checkpoint()
            }
            _ => SimEvent::slice_limit(),
        }
    }

    fn cur_tick(&self) -> u64 {
        self.state.borrow().tick
    }

    fn num_cores(&self) -> usize {
        self.state.borrow().limits.len()
    }

    fn set_max_insts(&mut self, core: usize, limit: u64) {
        if let Some(slot) = self.state.borrow_mut().limits.get_mut(core) {
            *slot = Some(limit);
        }
    }

    fn checkpoint(&mut self, dir: &Path) -> Result<()> {
        let s = self.state.borrow();
        fs::create_dir_all(dir).map_err(|e| DriverError::io("create", dir, e))?;
        let saved = CheckpointState {
            tick: s.tick,
            cores: s.limits.len(),
            insts: s.insts_at(s.tick),
        };
        let json = serde_json::to_string_pretty(&saved).map_err(|e| DriverError::Checkpoint {
            path: dir.to_path_buf(),
            reason: e.to_string(),
        })?;
        let path = dir.join(CHECKPOINT_STATE_FILE);
        fs::write(&path, json).map_err(|e| DriverError::io("write", &path, e))
    }
}

/// Statistics sink of a [`SyntheticEngine`].
///
/// Like the engine it stands for, the sink starts a new `stats.txt` on its
/// first dump and appends afterwards.
#[derive(Debug)]
pub struct SyntheticStats {
    state: Rc<RefCell<ModelState>>,
    path: PathBuf,
    opened: bool,
}

impl SyntheticStats {
    /// File the sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn render(&self) -> String {
        let s = self.state.borrow();
        let total = s.insts_at(s.tick);
        let insts = total.saturating_sub(s.window_insts);
        let ticks = s.tick - s.window_tick;
        let cycles = ticks / s.cycle_ticks;
        let cores = s.limits.len() as u64;

        let mut out = String::new();
        out.push_str("\n---------- Begin Simulation Statistics ----------\n");
        stat(
            &mut out,
            "simSeconds",
            format!("{:.6}", ticks as f64 / TICKS_PER_SECOND as f64),
            "Number of seconds simulated (Second)",
        );
        stat(&mut out, "simTicks", ticks, "Number of ticks simulated (Tick)");
        stat(
            &mut out,
            "finalTick",
            s.tick,
            "Number of ticks from beginning of simulation (Tick)",
        );
        stat(
            &mut out,
            "simFreq",
            TICKS_PER_SECOND,
            "The number of ticks per simulated second ((Tick/Second))",
        );
        stat(
            &mut out,
            "simInsts",
            insts.saturating_mul(cores),
            "Number of instructions simulated (Count)",
        );
        for core in 0..cores {
            let name = format!("system.cpu{core}");
            stat(
                &mut out,
                &format!("{name}.numCycles"),
                cycles,
                "Number of cpu cycles simulated (Cycle)",
            );
            stat(
                &mut out,
                &format!("{name}.committedInsts"),
                insts,
                "Number of instructions committed (Count)",
            );
            let ipc = if cycles == 0 {
                0.0
            } else {
                insts as f64 / cycles as f64
            };
            stat(
                &mut out,
                &format!("{name}.ipc"),
                format!("{ipc:.6}"),
                "IPC: instructions per cycle ((Count/Cycle))",
            );
        }
        out.push_str("\n---------- End Simulation Statistics   ----------\n");
        out
    }
}

fn stat(out: &mut String, name: &str, value: impl std::fmt::Display, desc: &str) {
    let _ = writeln!(out, "{name:<52}{value:>20}                       # {desc}");
}

impl StatsSink for SyntheticStats {
    fn dump(&mut self) -> Result<()> {
        let block = self.render();
        let mut options = OpenOptions::new();
        if self.opened {
            let _ = options.append(true);
        } else {
            let _ = options.write(true).truncate(true);
        }
        let mut file = options
            .create(true)
            .open(&self.path)
            .map_err(|e| DriverError::io("open", &self.path, e))?;
        self.opened = true;
        file.write_all(block.as_bytes())
            .map_err(|e| DriverError::io("write", &self.path, e))
    }

    fn reset(&mut self) {
        let mut s = self.state.borrow_mut();
        s.window_tick = s.tick;
        s.window_insts = s.insts_at(s.tick);
    }
}
