//! The replay cursor.

use crate::error::ReplayError;
use crate::time_index::TimeIndex;

/// Current position of the replay within the time index.
///
/// `index` is authoritative; `time` is always `time_from_index(index)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    /// Current time-step index.
    pub index: u64,
    /// Largest valid index.
    pub max_index: u64,
    /// Recorded time at `index`.
    pub time: u64,
    /// Last recorded time.
    pub max_time: u64,
}

impl Cursor {
    /// Places a cursor at the first recorded time.
    pub fn new(time_index: &TimeIndex) -> Self {
        Self {
            index: 0,
            max_index: time_index.max_index(),
            time: time_index.times()[0],
            max_time: time_index.max_time(),
        }
    }

    /// Moves the cursor to `index`, keeping `time` in sync.
    pub fn seek(&mut self, time_index: &TimeIndex, index: u64) -> Result<(), ReplayError> {
        self.time = time_index.time_from_index(index)?;
        self.index = index;
        Ok(())
    }

    /// Returns `true` once the cursor sits on the last index.
    pub fn at_end(&self) -> bool {
        self.index >= self.max_index
    }
}
