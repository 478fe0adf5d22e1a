//! Waveform replay engine for the retrace toolchain.
//!
//! This crate replays a recorded waveform as if it were a live, event-driven
//! simulation. Testbench scripts register procedural callbacks, read signal
//! values and control the run through a [`ReplayEngine`], while the engine
//! walks a random-access [`TraceOracle`](retrace_trace::TraceOracle) one
//! recorded time step at a time.
//!
//! # Architecture
//!
//! - **Time index** ([`TimeIndex`]): the sorted, deduplicated table of
//!   recorded times. Cursor indices are positions in this table.
//! - **Handle cache** ([`HandleCache`]): hierarchical names resolved once and
//!   handed out as [`SignalId`]s.
//! - **JIT optimizer** ([`jit`]): background workers that pre-decode hot
//!   signals ahead of the cursor.
//! - **Callbacks** ([`callback`]): start/end of simulation, value change,
//!   delay and next-time-step registrations, staged through [`staged`].
//! - **Replay loop** ([`ReplayEngine::run`]): fires timed, value-change and
//!   next-step callbacks in that order, then advances the cursor.
//!
//! # Usage
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use retrace_config::JitConfig;
//! use retrace_replay::ReplayEngine;
//! use retrace_trace::{ValueFormat, VcdTrace};
//!
//! let trace = VcdTrace::open(Path::new("wave.vcd")).unwrap();
//! let mut engine = ReplayEngine::new(Arc::new(trace), JitConfig::default()).unwrap();
//! let clk = engine.resolve("top.clk").unwrap();
//! engine
//!     .register_value_change(clk, ValueFormat::Integer, |_, data| {
//!         println!("clk = {} at {}", data.value.as_ref().unwrap(), data.time);
//!         Ok(())
//!     })
//!     .unwrap();
//! let outcome = engine.run().unwrap();
//! println!("ended: {}", outcome.reason);
//! ```

#![warn(missing_docs)]

pub mod callback;
pub mod control;
pub mod cursor;
pub mod engine;
pub mod error;
pub mod handle;
pub mod jit;
pub mod staged;
pub mod time_index;

pub use callback::{Callback, CallbackData, CallbackId, CallbackReason};
pub use cursor::Cursor;
pub use engine::{EngineState, ReplayEngine, RunOutcome, TerminateReason};
pub use error::ReplayError;
pub use handle::{HandleCache, SignalId};
pub use jit::{JitPhase, JitStatistics};
pub use time_index::TimeIndex;
