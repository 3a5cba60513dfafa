//! Common types and constants used throughout the run driver.
//!
//! This module provides:
//! 1. **Constants:** Stats file names, event causes and the warmup slice size.
//! 2. **Error Handling:** The crate-wide [`DriverError`] and [`Result`] alias.

/// Common constants (file names, event causes, tick sizes).
pub mod constants;

/// Error types.
pub mod error;

pub use constants::{CAUSE_CHECKPOINT, CAUSE_SLICE_LIMIT, WARMUP_SLICE_TICKS};
pub use error::{DriverError, Result};
