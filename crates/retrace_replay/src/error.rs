//! Replay error types.
//!
//! Everything that can go wrong while building or driving a
//! [`ReplayEngine`](crate::ReplayEngine) is a [`ReplayError`]. Errors raised
//! by a callback abort the run after end-of-simulation has been delivered.

use retrace_cache::CacheError;
use retrace_config::ConfigError;
use retrace_trace::TraceError;

/// Errors that can occur while setting up or running a replay.
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    /// A time lies past the last recorded time of the trace.
    #[error("time {time} is beyond the end of the trace (last recorded time {max_time})")]
    BeyondTrace {
        /// The requested time, in trace units.
        time: u64,
        /// The last recorded time, in trace units.
        max_time: u64,
    },

    /// The trace does not record enough distinct times to be replayed.
    #[error("trace records {0} distinct time(s); at least 2 are required")]
    TraceTooShort(usize),

    /// A singleton callback slot was registered twice.
    #[error("a {0} callback is already registered")]
    DuplicateCallback(&'static str),

    /// A cursor index lies outside the time index.
    #[error("index {index} is out of range (max index {max_index})")]
    IndexOutOfRange {
        /// The requested index.
        index: u64,
        /// The largest valid index.
        max_index: u64,
    },

    /// A signal id was not handed out by this engine.
    #[error("unknown signal id {0}")]
    UnknownSignal(u32),

    /// A signal is too wide for the JIT optimizer.
    #[error("signal '{name}' is {width} bits wide; only signals up to 32 bits can be optimized")]
    Unoptimizable {
        /// Hierarchical name of the signal.
        name: String,
        /// Bit width of the signal.
        width: u32,
    },

    /// The trace oracle failed.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// A JIT option could not be applied.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The persistent cache could not be written.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// A callback reported a failure of its own.
    #[error("callback failed: {0}")]
    Callback(String),

    /// A callback panicked. The replay was aborted.
    #[error("callback panicked: {0}")]
    Panicked(String),
}
