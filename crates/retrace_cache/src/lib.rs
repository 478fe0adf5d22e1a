//! On-disk persistence of derived replay data.
//!
//! Building the time index of a large trace and resolving signal names through
//! a deep scope hierarchy are both expensive. This crate stores their results
//! next to a manifest that records each trace's size and modification time, so
//! a later run over an unchanged trace can skip the work. Every read is
//! fail-safe: a stale stamp, a missing file, or a corrupted artifact is a
//! cache miss.

#![warn(missing_docs)]

pub mod artifact;
pub mod cache;
pub mod error;
pub mod manifest;
pub mod stamp;

pub use cache::{PersistedSignal, SignalNameTable, TraceCache, MIN_PERSISTED_SIGNALS};
pub use error::CacheError;
pub use manifest::{CacheManifest, TraceEntry};
pub use stamp::SourceStamp;
