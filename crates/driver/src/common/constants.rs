//! Fixed names and magic values shared between the driver and engines.

/// Ticks advanced per warmup polling slice.
pub const WARMUP_SLICE_TICKS: u64 = 250_000_000;

/// Simulated ticks per second (1 tick = 1 ps).
pub const TICKS_PER_SECOND: u64 = 1_000_000_000_000;

/// Cause reported when a bounded `simulate` call reaches its tick bound.
pub const CAUSE_SLICE_LIMIT: &str = "simulate() limit reached";

/// Cause reported when the workload requests a checkpoint.
pub const CAUSE_CHECKPOINT: &str = "checkpoint";

/// Cause reported when a core reaches its instruction limit.
pub const CAUSE_MAX_INSTS: &str = "a thread reached the max instruction count";

/// Cause reported when the last running workload context exits.
pub const CAUSE_WORKLOAD_EXIT: &str = "exiting with last active thread context";

/// Counter key polled for the retired instruction count.
pub const SIM_INSTS_KEY: &str = "simInsts";

/// Live statistics file inside the output directory.
pub const STATS_FILE: &str = "stats.txt";

/// Archive of the statistics produced during warmup.
pub const WARMUP_STATS_FILE: &str = "stats_warmup.txt";

/// Final statistics file produced after a warmed-up run.
pub const FINAL_STATS_FILE: &str = "stats_final.txt";

/// Placeholder written to the live stats file once warmup ends.
pub const POST_WARMUP_HEADER: &str = "Final stats after warmup";

/// Prefix of checkpoint directory names (`cpt.<tick>`).
pub const CHECKPOINT_PREFIX: &str = "cpt.";
