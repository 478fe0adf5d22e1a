//! Trace oracles for the retrace waveform-replay engine.
//!
//! A trace oracle answers one question: what was the value of signal `s` at
//! dense time-step index `i` of a recorded waveform? The replay engine never
//! parses trace files itself; it consumes any [`TraceOracle`].
//!
//! # Oracles
//!
//! - [`VcdTrace`] parses IEEE 1364 Value Change Dump files, plain or gzipped.
//! - [`MemoryTrace`] holds a synthetic trace assembled in code, used by tests
//!   and by tools that generate stimulus on the fly.
//!
//! # Value formats
//!
//! Values are handed out as [`SignalValue`]s in one of the four
//! [`ValueFormat`]s. Decoding is two-state: `x` and `z` bits read as 0.

#![warn(missing_docs)]

pub mod error;
mod history;
pub mod memory;
pub mod oracle;
pub mod timescale;
pub mod value;
pub mod vcd;

pub use error::TraceError;
pub use memory::{MemoryTrace, MemoryTraceBuilder};
pub use oracle::{rank_suggestions, SignalInfo, SignalRef, TraceOracle, VarType};
pub use timescale::{TimeUnit, Timescale};
pub use value::{SignalValue, ValueFormat, VecVal};
pub use vcd::VcdTrace;
