//! Declarative system description handed to the engine.
//!
//! This module describes the system an engine should instantiate without
//! wiring any ports itself. It provides:
//! 1. **CPU models:** `atomic`, `minor`, `hpi` and `o3`, each with a memory mode and cache presets.
//! 2. **Cache presets:** Private L1I/L1D, a cluster L2, a shared L3 and MMU walker caches.
//! 3. **Clusters:** Per-core instruction limits and PMU interrupt assignment.
//! 4. **Boot:** Kernel, disk, DTB and initrd paths plus the kernel command line.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;

use crate::common::constants::TICKS_PER_SECOND;
use crate::common::{DriverError, Result};
use crate::config::RunConfig;

mod defaults {
    pub const NUM_CORES: usize = 1;
    pub const CPU_FREQ: &str = "4GHz";
    pub const CPU_VOLTAGE: &str = "1.0V";
    pub const MEM_SIZE: &str = "512MB";
    pub const KERNEL: &str = "vmlinux.arm64";
    pub const DISK_IMAGE: &str = "linaro-minimal-aarch64.img";
    pub const ROOT_DEVICE: &str = "/dev/vda2";
    pub const PMU_PPI: u32 = 23;
    pub const LAST_CACHE_LEVEL: u8 = 3;
    /// Loops-per-jiffy handed to the kernel so boot does not calibrate.
    pub const LPJ: u64 = 19_988_480;
}

/// Replacement policy name that splits the L2 into preserved and LRU ways.
pub const EMISSARY_POLICY: &str = "LRUEmissaryRP";

/// Valid range for Arm private peripheral interrupt numbers.
pub const PPI_RANGE: std::ops::RangeInclusive<u32> = 16..=31;

/// How the engine's CPUs access memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryMode {
    /// Functional accesses with no timing; caches are not simulated.
    Atomic,
    /// Timed accesses through the cache hierarchy.
    Timing,
}

/// CPU model selected for every core of the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CpuModel {
    /// Single-cycle functional CPU.
    #[default]
    Atomic,
    /// In-order pipelined CPU.
    Minor,
    /// High-performance in-order CPU.
    Hpi,
    /// Out-of-order CPU.
    O3,
}

impl CpuModel {
    /// All models, in CLI listing order.
    pub const ALL: [Self; 4] = [Self::Atomic, Self::Minor, Self::Hpi, Self::O3];

    /// Lower-case name used on the command line and in JSON.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Atomic => "atomic",
            Self::Minor => "minor",
            Self::Hpi => "hpi",
            Self::O3 => "o3",
        }
    }

    /// Memory mode required by the model.
    pub const fn memory_mode(self) -> MemoryMode {
        match self {
            Self::Atomic => MemoryMode::Atomic,
            Self::Minor | Self::Hpi | Self::O3 => MemoryMode::Timing,
        }
    }

    /// Private L1 and cluster L2 presets as `(l1i, l1d, l2)`.
    ///
    /// The atomic model carries no caches at all.
    pub fn cache_presets(self) -> (Option<CacheSpec>, Option<CacheSpec>, Option<CacheSpec>) {
        match self {
            Self::Atomic => (None, None, None),
            Self::Hpi => (
                Some(CacheSpec::hpi_l1i()),
                Some(CacheSpec::hpi_l1d()),
                Some(CacheSpec::hpi_l2()),
            ),
            Self::Minor | Self::O3 => (
                Some(CacheSpec::l1i()),
                Some(CacheSpec::l1d()),
                Some(CacheSpec::l2()),
            ),
        }
    }
}

impl fmt::Display for CpuModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CpuModel {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|m| m.name()).collect();
                DriverError::InvalidConfig(format!(
                    "unknown CPU model '{s}' (expected one of: {})",
                    names.join(", ")
                ))
            })
    }
}

/// Inclusion policy of a cache with respect to the level above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Clusivity {
    /// Lines are filled on every miss from above.
    MostlyIncl,
    /// Lines are filled only on writeback from above.
    MostlyExcl,
}

/// Sizing and timing parameters of one cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSpec {
    /// Capacity in bytes.
    pub size_bytes: u64,
    /// Associativity (ways per set).
    pub assoc: u32,
    /// Tag lookup latency in cycles.
    pub tag_latency: u32,
    /// Data array latency in cycles.
    pub data_latency: u32,
    /// Latency to forward a response upwards in cycles.
    pub response_latency: u32,
    /// Miss status holding registers.
    pub mshrs: u32,
    /// Targets tracked per MSHR.
    pub tgts_per_mshr: u32,
    /// Write buffer entries.
    pub write_buffers: u32,
    /// Inclusion policy.
    pub clusivity: Clusivity,
    /// Replacement policy name, or `None` for the engine default.
    pub replacement_policy: Option<String>,
    /// Hardware prefetcher name, or `None` for no prefetcher.
    pub prefetcher: Option<String>,
    /// Ways protected from LRU eviction (EMISSARY L2 only).
    pub preserve_ways: Option<u32>,
    /// Ways managed by plain LRU (EMISSARY L2 only).
    pub lru_ways: Option<u32>,
}

const KIB: u64 = 1024;
const MIB: u64 = 1024 * KIB;

impl CacheSpec {
    #[allow(clippy::too_many_arguments)]
    pub(crate) const fn preset(
        size_bytes: u64,
        assoc: u32,
        tag_latency: u32,
        data_latency: u32,
        response_latency: u32,
        mshrs: u32,
        tgts_per_mshr: u32,
        write_buffers: u32,
        clusivity: Clusivity,
    ) -> Self {
        Self {
            size_bytes,
            assoc,
            tag_latency,
            data_latency,
            response_latency,
            mshrs,
            tgts_per_mshr,
            write_buffers,
            clusivity,
            replacement_policy: None,
            prefetcher: None,
            preserve_ways: None,
            lru_ways: None,
        }
    }

    /// Private L1 instruction cache: 64 KiB, 8-way.
    pub const fn l1i() -> Self {
        Self::preset(64 * KIB, 8, 1, 1, 1, 16, 20, 16, Clusivity::MostlyIncl)
    }

    /// Private L1 data cache: 48 KiB, 12-way.
    pub const fn l1d() -> Self {
        Self::preset(48 * KIB, 12, 4, 4, 1, 16, 20, 16, Clusivity::MostlyIncl)
    }

    /// Cluster L2: 2 MiB, 16-way, mostly exclusive, half the ways preserved.
    pub fn l2() -> Self {
        let mut spec = Self::preset(2 * MIB, 16, 15, 15, 1, 32, 20, 32, Clusivity::MostlyExcl);
        spec.preserve_ways = Some(8);
        spec.lru_ways = Some(8);
        spec
    }

    /// Shared last-level cache: 3 MiB, 12-way.
    pub const fn l3() -> Self {
        Self::preset(3 * MIB, 12, 32, 32, 1, 64, 20, 64, Clusivity::MostlyExcl)
    }

    /// Page table walker cache: 32 KiB, 4-way.
    pub const fn walker() -> Self {
        Self::preset(32 * KIB, 4, 2, 2, 0, 16, 20, 16, Clusivity::MostlyIncl)
    }

    /// HPI L1 instruction cache: 32 KiB, 2-way.
    pub const fn hpi_l1i() -> Self {
        Self::preset(32 * KIB, 2, 1, 1, 1, 2, 8, 8, Clusivity::MostlyIncl)
    }

    /// HPI L1 data cache: 32 KiB, 4-way.
    pub const fn hpi_l1d() -> Self {
        Self::preset(32 * KIB, 4, 1, 1, 1, 4, 8, 4, Clusivity::MostlyIncl)
    }

    /// HPI L2: 1 MiB, 16-way.
    pub const fn hpi_l2() -> Self {
        Self::preset(MIB, 16, 13, 13, 5, 4, 8, 16, Clusivity::MostlyExcl)
    }

    /// Total hit latency (tag + data) in cycles.
    pub const fn hit_latency(&self) -> u32 {
        self.tag_latency + self.data_latency
    }

    /// Applies a replacement policy, splitting the ways when it is EMISSARY.
    ///
    /// `preserve_ways` defaults to half the associativity and must not exceed it.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] when `preserve_ways > assoc`.
    pub fn with_replacement_policy(
        mut self,
        policy: &str,
        preserve_ways: Option<u32>,
    ) -> Result<Self> {
        if policy == EMISSARY_POLICY {
            let preserve = preserve_ways.unwrap_or(self.assoc / 2);
            if preserve > self.assoc {
                return Err(DriverError::InvalidConfig(format!(
                    "preserve_ways {preserve} exceeds cache associativity {}",
                    self.assoc
                )));
            }
            self.preserve_ways = Some(preserve);
            self.lru_ways = Some(self.assoc - preserve);
        }
        self.replacement_policy = Some(policy.to_owned());
        Ok(self)
    }

    /// Attaches a hardware prefetcher by name.
    #[must_use]
    pub fn with_prefetcher(mut self, prefetcher: &str) -> Self {
        self.prefetcher = Some(prefetcher.to_owned());
        self
    }
}

/// Per-level replacement policy and prefetcher overrides.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheOverrides {
    /// L1I replacement policy.
    pub l1i_rp: Option<String>,
    /// L1D replacement policy.
    pub l1d_rp: Option<String>,
    /// L2 replacement policy.
    pub l2_rp: Option<String>,
    /// L1I prefetcher.
    pub l1i_hwp: Option<String>,
    /// L1D prefetcher.
    pub l1d_hwp: Option<String>,
    /// L2 prefetcher.
    pub l2_hwp: Option<String>,
    /// Preserved ways for an EMISSARY L2.
    pub preserve_ways: Option<u32>,
    /// Starvation randomness (percent) for EMISSARY cores.
    pub starve_randomness: Option<f64>,
}

/// Boot inputs for a full-system Linux run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BootSpec {
    /// Kernel image.
    pub kernel: PathBuf,
    /// Root disk image, attached copy-on-write.
    pub disk_image: PathBuf,
    /// Guest device name of the root partition.
    pub root_device: String,
    /// Device tree blob; generated into the output directory when unset.
    pub dtb: Option<PathBuf>,
    /// Initial ramdisk.
    pub initrd: Option<PathBuf>,
    /// Boot script read by the guest; must exist when set.
    pub script: Option<PathBuf>,
}

impl Default for BootSpec {
    fn default() -> Self {
        Self {
            kernel: PathBuf::from(defaults::KERNEL),
            disk_image: PathBuf::from(defaults::DISK_IMAGE),
            root_device: defaults::ROOT_DEVICE.to_owned(),
            dtb: None,
            initrd: None,
            script: None,
        }
    }
}

impl BootSpec {
    /// Kernel command line for a guest with `mem_size` of memory.
    ///
    /// ```
    /// use simdrive_core::topology::BootSpec;
    ///
    /// let cmd = BootSpec::default().kernel_command_line("512MB");
    /// assert_eq!(
    ///     cmd,
    ///     "console=ttyAMA0 lpj=19988480 norandmaps root=/dev/vda2 rw mem=512MB"
    /// );
    /// ```
    pub fn kernel_command_line(&self, mem_size: &str) -> String {
        [
            "console=ttyAMA0".to_owned(),
            format!("lpj={}", defaults::LPJ),
            "norandmaps".to_owned(),
            format!("root={}", self.root_device),
            "rw".to_owned(),
            format!("mem={mem_size}"),
        ]
        .join(" ")
    }

    /// DTB to load: the configured one, or `system.dtb` under `outdir`.
    pub fn dtb_path(&self, outdir: &Path) -> PathBuf {
        self.dtb
            .clone()
            .unwrap_or_else(|| outdir.join("system.dtb"))
    }

    /// Fails when a boot script is configured but missing on disk.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] naming the missing script.
    pub fn check_script(&self) -> Result<()> {
        match &self.script {
            Some(script) if !script.is_file() => Err(DriverError::InvalidConfig(format!(
                "boot script '{}' does not exist",
                script.display()
            ))),
            _ => Ok(()),
        }
    }
}

/// Full system description: CPU cluster, caches, memory and boot.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SystemSpec {
    /// CPU model for every core.
    pub cpu: CpuModel,
    /// Cores in the cluster.
    pub num_cores: usize,
    /// Core clock, e.g. `"4GHz"`.
    pub cpu_freq: String,
    /// Physical memory size, e.g. `"512MB"`.
    pub mem_size: String,
    /// Deepest cache level to build (2 or 3).
    pub last_cache_level: u8,
    /// Replacement policy and prefetcher overrides.
    pub caches: CacheOverrides,
    /// Attach a PMU to every core.
    pub with_pmu: bool,
    /// PPI used by each core's PMU.
    pub pmu_ppi_number: u32,
    /// Boot inputs.
    pub boot: BootSpec,
}

impl Default for SystemSpec {
    fn default() -> Self {
        Self {
            cpu: CpuModel::default(),
            num_cores: defaults::NUM_CORES,
            cpu_freq: defaults::CPU_FREQ.to_owned(),
            mem_size: defaults::MEM_SIZE.to_owned(),
            last_cache_level: defaults::LAST_CACHE_LEVEL,
            caches: CacheOverrides::default(),
            with_pmu: false,
            pmu_ppi_number: defaults::PMU_PPI,
            boot: BootSpec::default(),
        }
    }
}

impl SystemSpec {
    /// Checks values that would otherwise fail deep inside the engine.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] for zero cores, an unparsable
    /// clock, an unsupported cache depth or a PPI outside `16..=31`.
    pub fn validate(&self) -> Result<()> {
        if self.num_cores == 0 {
            return Err(DriverError::InvalidConfig(
                "num_cores must be at least 1".to_owned(),
            ));
        }
        let _ = parse_frequency(&self.cpu_freq)?;
        if !(2..=3).contains(&self.last_cache_level) {
            return Err(DriverError::InvalidConfig(format!(
                "last_cache_level must be 2 or 3, got {}",
                self.last_cache_level
            )));
        }
        if self.with_pmu {
            let _ = validate_ppi(self.pmu_ppi_number)?;
        }
        Ok(())
    }

    /// Caches are simulated only for timing-mode CPUs.
    pub const fn want_caches(&self) -> bool {
        matches!(self.cpu.memory_mode(), MemoryMode::Timing)
    }

    /// Clock period of one core cycle in ticks.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::InvalidConfig`] if `cpu_freq` does not parse.
    pub fn cycle_ticks(&self) -> Result<u64> {
        Ok(TICKS_PER_SECOND / parse_frequency(&self.cpu_freq)?)
    }

    /// Shared last-level cache, present only with caches and a 3-level hierarchy.
    pub fn l3(&self) -> Option<CacheSpec> {
        (self.want_caches() && self.last_cache_level >= 3).then(CacheSpec::l3)
    }

    /// Builds the cluster, applying overrides and the run's instruction limit.
    ///
    /// Each core's build-time limit is `max_insts + warmup_insts`, matching
    /// the limit the driver later applies in the main phase.
    ///
    /// # Errors
    ///
    /// Propagates [`SystemSpec::validate`] failures and invalid EMISSARY way splits.
    pub fn build_cluster(&self, run: &RunConfig) -> Result<ClusterSpec> {
        self.validate()?;
        let (l1i, l1d, l2) = if self.want_caches() {
            self.cpu.cache_presets()
        } else {
            (None, None, None)
        };
        let o = &self.caches;

        let l1i = l1i
            .map(|c| apply_overrides(c, o.l1i_rp.as_deref(), o.l1i_hwp.as_deref(), None))
            .transpose()?;
        let l1d = l1d
            .map(|c| apply_overrides(c, o.l1d_rp.as_deref(), o.l1d_hwp.as_deref(), None))
            .transpose()?;
        let l2 = l2
            .map(|c| {
                apply_overrides(c, o.l2_rp.as_deref(), o.l2_hwp.as_deref(), o.preserve_ways)
            })
            .transpose()?;
        let walker = l2.is_some().then(CacheSpec::walker);

        let emissary = o.l2_rp.as_deref() == Some(EMISSARY_POLICY);
        let pmu_ppi = self.with_pmu.then_some(self.pmu_ppi_number);
        let cores = (0..self.num_cores)
            .map(|id| CoreSpec {
                id,
                max_insts: run.total_inst_limit(),
                pmu_ppi,
                emissary,
                starve_randomness: emissary.then(|| o.starve_randomness.unwrap_or(50.0)),
            })
            .collect();

        Ok(ClusterSpec {
            model: self.cpu,
            clock_ticks: self.cycle_ticks()?,
            voltage: defaults::CPU_VOLTAGE.to_owned(),
            l1i,
            l1d,
            l2,
            walker,
            cores,
        })
    }
}

fn apply_overrides(
    spec: CacheSpec,
    rp: Option<&str>,
    hwp: Option<&str>,
    preserve_ways: Option<u32>,
) -> Result<CacheSpec> {
    let spec = match rp {
        Some(rp) => spec.with_replacement_policy(rp, preserve_ways)?,
        None => spec,
    };
    Ok(match hwp {
        Some(hwp) => spec.with_prefetcher(hwp),
        None => spec,
    })
}

/// One core of a built cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreSpec {
    /// Core index within the cluster.
    pub id: usize,
    /// Instruction limit set at build time.
    pub max_insts: Option<u64>,
    /// PMU interrupt, when a PMU is attached.
    pub pmu_ppi: Option<u32>,
    /// EMISSARY front-end starvation tracking enabled.
    pub emissary: bool,
    /// Starvation randomness for EMISSARY cores.
    pub starve_randomness: Option<f64>,
}

/// A cluster of identical cores sharing an L2.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    /// CPU model of every core.
    pub model: CpuModel,
    /// Clock period in ticks.
    pub clock_ticks: u64,
    /// Voltage domain.
    pub voltage: String,
    /// Private L1I preset.
    pub l1i: Option<CacheSpec>,
    /// Private L1D preset.
    pub l1d: Option<CacheSpec>,
    /// Shared L2.
    pub l2: Option<CacheSpec>,
    /// Walker caches, one per translation walker.
    pub walker: Option<CacheSpec>,
    /// Cores in index order.
    pub cores: Vec<CoreSpec>,
}

impl ClusterSpec {
    /// Number of cores.
    pub fn len(&self) -> usize {
        self.cores.len()
    }

    /// True when the cluster has no cores.
    pub fn is_empty(&self) -> bool {
        self.cores.is_empty()
    }
}

/// Returns `ppi` if it is a valid Arm PPI number (16..=31).
///
/// # Errors
///
/// Returns [`DriverError::InvalidConfig`] otherwise.
pub fn validate_ppi(ppi: u32) -> Result<u32> {
    if PPI_RANGE.contains(&ppi) {
        Ok(ppi)
    } else {
        Err(DriverError::InvalidConfig(format!(
            "{ppi} is not a valid Arm PPI number"
        )))
    }
}

/// Parses a clock such as `"4GHz"` or `"800 MHz"` into hertz.
///
/// # Errors
///
/// Returns [`DriverError::InvalidConfig`] on an unknown unit, a non-numeric
/// value or a zero frequency.
///
/// ```
/// use simdrive_core::topology::parse_frequency;
///
/// assert_eq!(parse_frequency("4GHz").unwrap(), 4_000_000_000);
/// assert_eq!(parse_frequency("1.5 GHz").unwrap(), 1_500_000_000);
/// assert!(parse_frequency("fast").is_err());
/// ```
pub fn parse_frequency(s: &str) -> Result<u64> {
    let s = s.trim();
    let split = s
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(s.len());
    let (value, unit) = s.split_at(split);
    let scale = match unit.trim().to_ascii_lowercase().as_str() {
        "ghz" => 1e9,
        "mhz" => 1e6,
        "khz" => 1e3,
        "hz" | "" => 1.0,
        other => {
            return Err(DriverError::InvalidConfig(format!(
                "unknown frequency unit '{other}' in '{s}'"
            )));
        }
    };
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| DriverError::InvalidConfig(format!("invalid frequency '{s}'")))?;
    let hz = (value * scale).round();
    if hz < 1.0 {
        return Err(DriverError::InvalidConfig(format!(
            "frequency '{s}' must be positive"
        )));
    }
    Ok(hz as u64)
}
