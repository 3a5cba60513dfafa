//! Simulation exit events.
//!
//! Every call into the engine ends with a [`SimEvent`] describing why it
//! stopped. The driver only distinguishes three kinds of cause: the slice
//! bound was reached, the workload requested a checkpoint, or anything else.

use std::fmt;

use crate::common::constants::{CAUSE_CHECKPOINT, CAUSE_SLICE_LIMIT};

/// Why a call to [`SimEngine::simulate`](super::engine::SimEngine::simulate) returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimEvent {
    /// Engine-provided cause string.
    pub cause: String,
    /// Exit code carried by the event; the process exits with it when the event is terminal.
    pub code: i32,
}

impl SimEvent {
    /// Creates an event with an arbitrary cause.
    pub fn new(cause: impl Into<String>, code: i32) -> Self {
        Self {
            cause: cause.into(),
            code,
        }
    }

    /// Event returned when a bounded slice ran to its tick bound.
    pub fn slice_limit() -> Self {
        Self::new(CAUSE_SLICE_LIMIT, 0)
    }

    /// Event returned when the workload asks for a checkpoint.
    pub fn checkpoint() -> Self {
        Self::new(CAUSE_CHECKPOINT, 0)
    }

    /// True if the slice simply ran out of ticks.
    pub fn is_slice_limit(&self) -> bool {
        self.cause == CAUSE_SLICE_LIMIT
    }

    /// True if the workload requested a checkpoint.
    pub fn is_checkpoint(&self) -> bool {
        self.cause == CAUSE_CHECKPOINT
    }
}

impl fmt::Display for SimEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.cause, self.code)
    }
}
