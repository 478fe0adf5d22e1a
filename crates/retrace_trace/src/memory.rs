//! In-memory trace oracle for synthetic waveforms.
//!
//! [`MemoryTrace`] is assembled with a [`MemoryTraceBuilder`] from changes at
//! absolute times. It also counts name lookups and value reads, which lets
//! callers observe how often the replay engine actually reaches the oracle.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use retrace_common::LogicVec;

use crate::error::TraceError;
use crate::history::SignalHistory;
use crate::oracle::{SignalInfo, SignalRef, TraceOracle, VarType};
use crate::timescale::Timescale;

/// A synthetic trace held entirely in memory.
#[derive(Debug)]
pub struct MemoryTrace {
    timescale: Timescale,
    times: Vec<u64>,
    signals: Vec<SignalHistory>,
    names: HashMap<String, SignalRef>,
    lookups: AtomicU64,
    reads: AtomicU64,
}

impl MemoryTrace {
    /// Starts building a trace.
    pub fn builder() -> MemoryTraceBuilder {
        MemoryTraceBuilder::default()
    }

    /// Returns how many times [`TraceOracle::lookup`] was called.
    pub fn lookup_count(&self) -> u64 {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Returns how many value reads reached this oracle.
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    fn history(&self, signal: SignalRef) -> Result<&SignalHistory, TraceError> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.signals
            .get(signal.index())
            .ok_or(TraceError::UnknownSignal(signal))
    }
}

impl TraceOracle for MemoryTrace {
    fn scan_time_table(&self) -> Vec<u64> {
        self.times.clone()
    }

    fn lookup(&self, name: &str) -> Option<SignalRef> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        self.names.get(name).copied()
    }

    fn signal_info(&self, signal: SignalRef) -> Option<SignalInfo> {
        self.signals.get(signal.index()).map(|h| SignalInfo {
            width: h.width,
            var_type: h.var_type,
        })
    }

    fn bits_at(&self, signal: SignalRef, index: u64) -> Result<LogicVec, TraceError> {
        Ok(self.history(signal)?.bits_at(index))
    }

    fn word_at(&self, signal: SignalRef, index: u64) -> Result<u32, TraceError> {
        Ok(self.history(signal)?.word_at(index))
    }

    fn signal_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.keys().cloned().collect();
        names.sort();
        names
    }

    fn timescale(&self) -> Timescale {
        self.timescale
    }
}

/// Builder for [`MemoryTrace`].
#[derive(Debug, Default)]
pub struct MemoryTraceBuilder {
    timescale: Timescale,
    times: Vec<u64>,
    declared: Vec<(String, u32, VarType)>,
    changes: Vec<Vec<(u64, LogicVec)>>,
}

impl MemoryTraceBuilder {
    /// Sets the timescale reported by the trace.
    pub fn timescale(&mut self, timescale: Timescale) -> &mut Self {
        self.timescale = timescale;
        self
    }

    /// Declares a signal and returns its reference.
    pub fn signal(&mut self, name: &str, width: u32, var_type: VarType) -> SignalRef {
        let signal = SignalRef(self.declared.len() as u32);
        self.declared.push((name.to_string(), width, var_type));
        self.changes.push(Vec::new());
        signal
    }

    /// Records a time step, with or without changes.
    pub fn time(&mut self, time: u64) -> &mut Self {
        self.times.push(time);
        self
    }

    /// Records `signal` taking `value` (truncated to its width) at `time`.
    pub fn change(&mut self, signal: SignalRef, time: u64, value: u64) -> &mut Self {
        let width = self.declared[signal.index()].1;
        self.change_bits(signal, time, LogicVec::from_u64(value, width))
    }

    /// Records a four-state value for `signal` at `time`.
    ///
    /// # Panics
    ///
    /// Panics if `signal` was not declared by this builder.
    pub fn change_bits(&mut self, signal: SignalRef, time: u64, value: LogicVec) -> &mut Self {
        self.times.push(time);
        self.changes[signal.index()].push((time, value));
        self
    }

    /// Finishes the trace. Times are sorted and deduplicated into the index
    /// space; the last change recorded for a signal at a given time wins.
    pub fn build(&mut self) -> MemoryTrace {
        let mut times = std::mem::take(&mut self.times);
        times.sort_unstable();
        times.dedup();

        let mut signals = Vec::with_capacity(self.declared.len());
        let mut names = HashMap::new();
        for (i, ((name, width, var_type), mut changes)) in self
            .declared
            .drain(..)
            .zip(self.changes.drain(..))
            .enumerate()
        {
            changes.sort_by_key(|(t, _)| *t);
            let mut history = SignalHistory::new(width, var_type);
            for (time, value) in changes {
                let index = times.partition_point(|&t| t < time) as u64;
                history.record(index, value);
            }
            signals.push(history);
            names.insert(name, SignalRef(i as u32));
        }

        MemoryTrace {
            timescale: self.timescale,
            times,
            signals,
            names,
            lookups: AtomicU64::new(0),
            reads: AtomicU64::new(0),
        }
    }
}
