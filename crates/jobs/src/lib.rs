//! Asynchronous job primitives: lifecycle, progress accounting, cancellation
//! and cooperative blocking (`exec`) on top of the host loop.
//!
//! A [`Job`] runs its work through a [`JobDriver`] and reports everything
//! outward through typed observer lists. The contract callers rely on is the
//! single-emission guarantee: over a job's whole lifetime `finished` fires
//! exactly once and `result` fires at most once, no matter how `start`,
//! `kill` and explicit destruction are interleaved.

use serde::{Deserialize, Serialize};

mod delegate;
mod job;
mod signal;

pub use delegate::{UiDelegate, WeakUiDelegate};
pub use job::{Job, JobDriver, WeakJob};

/// Success.
pub const NO_ERROR: i32 = 0;
/// The job was cancelled via [`Job::kill`].
pub const KILLED_JOB_ERROR: i32 = 1;
/// Codes at or above this value carry caller-defined meaning.
pub const USER_DEFINED_ERROR: i32 = 100;

/// What a progress amount counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Bytes,
    Files,
    Directories,
    Items,
}

impl Unit {
    pub const ALL: [Unit; 4] = [Unit::Bytes, Unit::Files, Unit::Directories, Unit::Items];

    pub(crate) const COUNT: usize = 4;

    pub(crate) fn index(self) -> usize {
        match self {
            Unit::Bytes => 0,
            Unit::Files => 1,
            Unit::Directories => 2,
            Unit::Items => 3,
        }
    }
}

/// Whether a kill still delivers the `result` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillVerbosity {
    Quietly,
    EmitResult,
}

/// Bitset of optional operations a job supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Capabilities(u32);

impl Capabilities {
    pub const NONE: Capabilities = Capabilities(0);
    pub const KILLABLE: Capabilities = Capabilities(1);
    pub const SUSPENDABLE: Capabilities = Capabilities(1 << 1);

    pub fn contains(self, other: Capabilities) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Capabilities {
    type Output = Capabilities;

    fn bitor(self, rhs: Capabilities) -> Capabilities {
        Capabilities(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Capabilities {
    fn bitor_assign(&mut self, rhs: Capabilities) {
        self.0 |= rhs.0;
    }
}

/// Terminal-state snapshot delivered with the `result` and `finished`
/// notifications. Snapshotting keeps observers readable even when `finished`
/// is delivered while the job object itself is being torn down.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub error: i32,
    pub error_text: String,
}

impl JobOutcome {
    pub fn is_error(&self) -> bool {
        self.error != NO_ERROR
    }
}
