//! Fetch-directed instruction prefetch (FDP) experiment preset.
//!
//! Describes a single O3 core with a decoupled front end, a private L1/L2
//! hierarchy and a multi-prefetcher on the L1I. It provides:
//! 1. **ISA choice:** `X86`, `Arm` or `RiscV`, which sets the smallest
//!    instruction size the front end scans for and the branch predictor shift.
//! 2. **Workload choice:** the "hello" program, resolved per ISA.
//! 3. **Baseline toggle:** Disabling FDP turns off the decoupled front end
//!    and drops the fetch-directed prefetcher, keeping the tagged one.

use std::fmt;
use std::str::FromStr;

use crate::common::{DriverError, Result};
use crate::config::RunConfig;
use crate::topology::{CacheSpec, Clusivity, ClusterSpec, CpuModel, SystemSpec};

/// Composite prefetcher attached to the L1I.
pub const MULTI_PREFETCHER: &str = "MultiPrefetcher";
/// Prefetcher fed by fetch target queue insertions.
pub const FETCH_DIRECTED_PREFETCHER: &str = "FetchDirectedPrefetcher";
/// Next-line prefetcher kept in the baseline.
pub const TAGGED_PREFETCHER: &str = "TaggedPrefetcher";

const CLOCK: &str = "3GHz";
const MEMORY: &str = "SingleChannelDDR3_1600";
const MEMORY_SIZE: &str = "32MB";

const KIB: u64 = 1024;

/// Instruction set simulated by the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isa {
    /// Variable-length x86.
    #[default]
    X86,
    /// AArch64 (Thumb is ignored).
    Arm,
    /// RISC-V (compressed instructions are ignored).
    RiscV,
}

impl Isa {
    /// All ISAs, in CLI listing order.
    pub const ALL: [Self; 3] = [Self::X86, Self::Arm, Self::RiscV];

    /// Name used on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::X86 => "X86",
            Self::Arm => "Arm",
            Self::RiscV => "RiscV",
        }
    }

    /// Address stride the decoupled front end uses when searching the BTB.
    pub const fn min_inst_size(self) -> u32 {
        match self {
            Self::X86 => 1,
            Self::Arm | Self::RiscV => 4,
        }
    }

    /// Low PC bits the branch predictor ignores.
    pub const fn bp_inst_shift(self) -> u32 {
        match self {
            Self::Arm => 2,
            Self::X86 | Self::RiscV => 0,
        }
    }
}

impl fmt::Display for Isa {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Isa {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|isa| isa.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                DriverError::InvalidConfig(format!(
                    "unknown ISA '{s}' (expected one of: X86, Arm, RiscV)"
                ))
            })
    }
}

/// Program run by the experiment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FdpWorkload {
    /// Statically linked "Hello World!".
    #[default]
    Hello,
}

impl FdpWorkload {
    /// Name used on the command line.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hello => "hello",
        }
    }

    /// Resource name of the binary built for `isa`.
    pub const fn resource(self, isa: Isa) -> &'static str {
        match (self, isa) {
            (Self::Hello, Isa::Arm) => "arm-hello64-static",
            (Self::Hello, Isa::X86) => "x86-hello64-static",
            (Self::Hello, Isa::RiscV) => "riscv-hello",
        }
    }
}

impl fmt::Display for FdpWorkload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FdpWorkload {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hello" => Ok(Self::Hello),
            other => Err(DriverError::InvalidConfig(format!(
                "unknown workload '{other}' (expected: hello)"
            ))),
        }
    }
}

/// O3 fetch parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrontEndSpec {
    /// Fetch buffer size in bytes.
    pub fetch_buffer_size: u32,
    /// Fetch target size in bytes; twice the buffer so the front end runs ahead.
    pub fetch_target_width: u32,
    /// Address stride used while searching for branches.
    pub min_inst_size: u32,
    /// Decoupled front end enabled.
    pub decoupled: bool,
}

/// Branch predictor required by the decoupled front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BranchPredictorSpec {
    /// Predictor model (only LTAGE and TAGE-SC-L drive the decoupled front end).
    pub kind: &'static str,
    /// BTB entries.
    pub btb_entries: u32,
    /// BTB associativity.
    pub btb_assoc: u32,
    /// Low PC bits ignored when indexing.
    pub inst_shift_amt: u32,
    /// Only predict branches that hit in the BTB.
    pub requires_btb_hit: bool,
    /// Global history only records taken branches.
    pub taken_only_history: bool,
}

/// Choices of one FDP run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdpExperiment {
    /// Simulated ISA.
    pub isa: Isa,
    /// Program to run.
    pub workload: FdpWorkload,
    /// False for the baseline run.
    pub fdp_enabled: bool,
}

impl Default for FdpExperiment {
    fn default() -> Self {
        Self {
            isa: Isa::default(),
            workload: FdpWorkload::default(),
            fdp_enabled: true,
        }
    }
}

impl FdpExperiment {
    /// FDP run for `isa` with the default workload.
    pub fn new(isa: Isa) -> Self {
        Self {
            isa,
            ..Self::default()
        }
    }

    /// Turns the experiment into the baseline run.
    #[must_use]
    pub const fn baseline(mut self) -> Self {
        self.fdp_enabled = false;
        self
    }

    /// One-line description printed before the run.
    pub fn banner(&self) -> String {
        format!(
            "Running {} on {}, FDP {}",
            self.workload,
            self.isa,
            if self.fdp_enabled { "enabled" } else { "disabled" }
        )
    }

    /// Prefetchers combined on the L1I, in issue order.
    pub fn l1i_prefetchers(&self) -> Vec<&'static str> {
        let mut prefetchers = Vec::with_capacity(2);
        if self.fdp_enabled {
            prefetchers.push(FETCH_DIRECTED_PREFETCHER);
        }
        prefetchers.push(TAGGED_PREFETCHER);
        prefetchers
    }

    /// Builds the system, applying the run's instruction limit to the core.
    ///
    /// # Errors
    ///
    /// Propagates [`SystemSpec::build_cluster`] failures.
    pub fn build(&self, run: &RunConfig) -> Result<FdpSystem> {
        let system = SystemSpec {
            cpu: CpuModel::O3,
            num_cores: 1,
            cpu_freq: CLOCK.to_owned(),
            mem_size: MEMORY_SIZE.to_owned(),
            last_cache_level: 2,
            ..SystemSpec::default()
        };
        let mut cluster = system.build_cluster(run)?;
        cluster.l1i = Some(l1().with_prefetcher(MULTI_PREFETCHER));
        cluster.l1d = Some(l1());
        cluster.l2 = Some(l2());
        cluster.walker = Some(mmu_cache());

        Ok(FdpSystem {
            experiment: *self,
            front_end: FrontEndSpec {
                fetch_buffer_size: 16,
                fetch_target_width: 32,
                min_inst_size: self.isa.min_inst_size(),
                decoupled: self.fdp_enabled,
            },
            branch_predictor: BranchPredictorSpec {
                kind: "LTAGE",
                btb_entries: 16 * 1024,
                btb_assoc: 8,
                inst_shift_amt: self.isa.bp_inst_shift(),
                requires_btb_hit: true,
                taken_only_history: true,
            },
            l1i_prefetchers: self.l1i_prefetchers(),
            memory: MEMORY,
            memory_size: MEMORY_SIZE,
            cluster,
        })
    }
}

/// Built FDP system.
#[derive(Debug, Clone, PartialEq)]
pub struct FdpSystem {
    /// Choices it was built from.
    pub experiment: FdpExperiment,
    /// O3 fetch parameters.
    pub front_end: FrontEndSpec,
    /// Branch predictor parameters.
    pub branch_predictor: BranchPredictorSpec,
    /// Prefetchers inside the L1I multi-prefetcher.
    pub l1i_prefetchers: Vec<&'static str>,
    /// Memory controller model.
    pub memory: &'static str,
    /// Memory size.
    pub memory_size: &'static str,
    /// Single-core cluster with private L1I, L1D, L2 and MMU cache.
    pub cluster: ClusterSpec,
}

impl FdpSystem {
    /// Workload binary to load.
    pub const fn workload_resource(&self) -> &'static str {
        self.experiment.workload.resource(self.experiment.isa)
    }
}

/// Shape shared by the L1I and L1D.
fn l1() -> CacheSpec {
    CacheSpec::preset(32 * KIB, 8, 1, 1, 1, 16, 20, 8, Clusivity::MostlyIncl)
}

fn l2() -> CacheSpec {
    CacheSpec::preset(1024 * KIB, 16, 10, 10, 1, 20, 12, 8, Clusivity::MostlyIncl)
}

fn mmu_cache() -> CacheSpec {
    CacheSpec::preset(8 * KIB, 4, 1, 1, 1, 20, 12, 8, Clusivity::MostlyIncl)
}
