//! Stats file parsing and warmup/final file management.
//!
//! The engine appends plain-text statistics blocks to `stats.txt` in the
//! output directory. This module:
//! 1. **Parses:** Extracts the `simInsts` counter from the text ([`StatsSnapshot`]).
//! 2. **Archives:** Copies the warmup numbers to `stats_warmup.txt` and reseeds the live file.
//! 3. **Finalizes:** Strips the reset artifact line and moves the live file to `stats_final.txt`.
//! 4. **Names checkpoints:** `cpt.<tick>` directories under the output directory.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::common::constants::{
    CHECKPOINT_PREFIX, FINAL_STATS_FILE, POST_WARMUP_HEADER, SIM_INSTS_KEY, STATS_FILE,
    WARMUP_STATS_FILE,
};
use crate::common::{DriverError, Result};

/// Instruction counts found in one read of the stats file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Every parsable `simInsts` value, in file order.
    pub sim_insts: Vec<u64>,
}

impl StatsSnapshot {
    /// Scans stats text for `simInsts` counters.
    ///
    /// Comment lines (leading `#`) are ignored. A counter line whose second
    /// token is not an integer is skipped.
    ///
    /// ```
    /// use simdrive_core::sim::StatsSnapshot;
    ///
    /// let snap = StatsSnapshot::parse("simInsts   12345678   # comment\n");
    /// assert_eq!(snap.latest(), Some(12345678));
    /// ```
    pub fn parse(text: &str) -> Self {
        let sim_insts = text
            .lines()
            .filter(|line| !line.trim_start().starts_with('#'))
            .filter(|line| line.contains(SIM_INSTS_KEY))
            .filter_map(|line| line.split_whitespace().nth(1)?.parse().ok())
            .collect();
        Self { sim_insts }
    }

    /// Value from the most recent dump, if any.
    pub fn latest(&self) -> Option<u64> {
        self.sim_insts.last().copied()
    }

    /// True once the most recent dump reports at least `target` instructions.
    pub fn reached(&self, target: u64) -> bool {
        self.latest().is_some_and(|n| n >= target)
    }
}

/// Paths of the stats artifacts inside one output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatsFiles {
    outdir: PathBuf,
}

impl StatsFiles {
    /// Creates the file set for `outdir`.
    pub fn new(outdir: impl Into<PathBuf>) -> Self {
        Self {
            outdir: outdir.into(),
        }
    }

    /// Output directory.
    pub fn outdir(&self) -> &Path {
        &self.outdir
    }

    /// The live `stats.txt`.
    pub fn live(&self) -> PathBuf {
        self.outdir.join(STATS_FILE)
    }

    /// The warmup archive `stats_warmup.txt`.
    pub fn warmup(&self) -> PathBuf {
        self.outdir.join(WARMUP_STATS_FILE)
    }

    /// The final `stats_final.txt`.
    pub fn final_stats(&self) -> PathBuf {
        self.outdir.join(FINAL_STATS_FILE)
    }

    /// Checkpoint directory for `tick`.
    pub fn checkpoint_dir(&self, tick: u64) -> PathBuf {
        self.outdir.join(format!("{CHECKPOINT_PREFIX}{tick}"))
    }

    /// Reads the live stats file.
    ///
    /// # Errors
    ///
    /// Returns the raw I/O error, including `NotFound` before the first dump.
    pub fn read_live(&self) -> io::Result<String> {
        fs::read_to_string(self.live())
    }

    /// Copies the live file to the warmup archive and truncates it.
    ///
    /// Returns the archive path, or `None` if there was no live file to archive.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the copy or the truncation fails.
    pub fn archive_warmup(&self) -> Result<Option<PathBuf>> {
        let live = self.live();
        if !live.exists() {
            return Ok(None);
        }
        let archive = self.warmup();
        let _ = fs::copy(&live, &archive).map_err(|e| DriverError::io("copy", &live, e))?;
        fs::write(&live, "").map_err(|e| DriverError::io("truncate", &live, e))?;
        Ok(Some(archive))
    }

    /// Reseeds the live file with the post-warmup placeholder line.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if the file cannot be written.
    pub fn write_placeholder(&self) -> Result<()> {
        let live = self.live();
        fs::write(&live, format!("{POST_WARMUP_HEADER}\n"))
            .map_err(|e| DriverError::io("write", &live, e))
    }

    /// Drops the second line of the live file and moves it to `stats_final.txt`.
    ///
    /// The second line is the blank separator the first post-warmup dump
    /// leaves after the placeholder. Returns the final path, or `None` if
    /// there was no live file.
    ///
    /// # Errors
    ///
    /// Returns [`DriverError::Io`] if reading, rewriting or renaming fails.
    pub fn finalize(&self) -> Result<Option<PathBuf>> {
        let live = self.live();
        if !live.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(&live).map_err(|e| DriverError::io("read", &live, e))?;
        let mut lines: Vec<&str> = text.split_inclusive('\n').collect();
        if lines.len() > 1 {
            let _ = lines.remove(1);
        }
        fs::write(&live, lines.concat()).map_err(|e| DriverError::io("write", &live, e))?;

        let dest = self.final_stats();
        fs::rename(&live, &dest).map_err(|e| DriverError::io("rename", &live, e))?;
        Ok(Some(dest))
    }
}
