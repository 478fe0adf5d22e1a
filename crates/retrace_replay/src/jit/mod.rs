//! Adaptive JIT signal-value optimizer.
//!
//! Every signal starts [`JitPhase::Cold`] and is read straight from the trace
//! oracle. Once a signal of at most 32 bits has been read more than
//! `hot_access_threshold` times, a background worker starts decoding its
//! values from the current cursor index into a [`JitSlot`], one
//! `compile_window_size` window at a time. Reads inside the published window
//! are served from memory; reads outside it fall back to the oracle. When the
//! cursor comes within `recompile_window_size` of the window's end, the
//! worker is resumed to extend the window.
//!
//! The number of live workers is capped by `max_opt_threads`. A signal that
//! turns hot while the cap is reached simply stays cold and retries on its
//! next read.

mod continuation;
mod slot;

use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use retrace_common::LogicVec;
use retrace_config::{ConfigError, JitConfig, JitOption};
use retrace_trace::{TraceError, TraceOracle};

use crate::handle::SignalHandle;

pub use continuation::{Continuation, Resume};
pub use slot::JitSlot;

use slot::Worker;

/// Widest signal the optimizer caches.
pub const MAX_OPTIMIZED_WIDTH: u32 = 32;

/// Optimizer state of one signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JitPhase {
    /// Read from the oracle; counting reads.
    Cold,
    /// A worker is decoding the first window.
    Warming,
    /// Reads inside the published window come from memory.
    Hot,
    /// Hot, with a continuation requested but not yet picked up.
    Recompiling,
    /// The worker reached the end of the trace and exited.
    Exhausted,
}

impl fmt::Display for JitPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            JitPhase::Cold => "cold",
            JitPhase::Warming => "warming",
            JitPhase::Hot => "hot",
            JitPhase::Recompiling => "recompiling",
            JitPhase::Exhausted => "exhausted",
        })
    }
}

/// The optimizer's hold on one signal.
#[derive(Debug, Default)]
pub(crate) enum JitState {
    #[default]
    Cold,
    Active(Arc<JitSlot>),
}

impl JitState {
    pub(crate) fn phase(&self) -> JitPhase {
        match self {
            JitState::Cold => JitPhase::Cold,
            JitState::Active(slot) if slot.is_exhausted() => JitPhase::Exhausted,
            JitState::Active(slot) if !slot.is_ready() => JitPhase::Warming,
            JitState::Active(slot) if slot.continuation().is_pending() => JitPhase::Recompiling,
            JitState::Active(_) => JitPhase::Hot,
        }
    }
}

/// Counters describing how signal reads were served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JitStatistics {
    /// Reads served from a published window.
    pub read_from_cache: u64,
    /// Reads served by the trace oracle.
    pub read_from_oracle: u64,
    /// Oracle reads of signals wider than [`MAX_OPTIMIZED_WIDTH`].
    pub unoptimizable_reads: u64,
    /// Time spent in cache reads. Only measured when `verbose` is set.
    pub cache_time: Duration,
    /// Time spent in oracle reads. Only measured when `verbose` is set.
    pub oracle_time: Duration,
    /// Hot signals that stayed cold because the worker cap was reached.
    pub thread_cap_blocked: u64,
    /// Workers started.
    pub tasks_spawned: u64,
    /// Workers that published their first window.
    pub first_windows_finished: u64,
    /// Workers still running.
    pub active_workers: u32,
}

/// Owner of the optimizer configuration, its workers and its counters.
pub(crate) struct Jit {
    config: JitConfig,
    active: Arc<AtomicU32>,
    first_windows: Arc<AtomicU64>,
    stats: JitStatistics,
    workers: Vec<(Arc<JitSlot>, JoinHandle<()>)>,
}

impl Jit {
    pub(crate) fn new(config: JitConfig) -> Self {
        Self {
            config,
            active: Arc::new(AtomicU32::new(0)),
            first_windows: Arc::new(AtomicU64::new(0)),
            stats: JitStatistics::default(),
            workers: Vec::new(),
        }
    }

    pub(crate) fn option(&self, option: JitOption) -> u64 {
        self.config.get(option)
    }

    pub(crate) fn set_option(&mut self, option: JitOption, value: u64) -> Result<(), ConfigError> {
        self.config.set(option, value)?;
        log::debug!("jit option {option} set to {}", self.config.get(option));
        Ok(())
    }

    pub(crate) fn active_workers(&self) -> u32 {
        self.active.load(Ordering::Acquire)
    }

    pub(crate) fn statistics(&self) -> JitStatistics {
        JitStatistics {
            first_windows_finished: self.first_windows.load(Ordering::Relaxed),
            active_workers: self.active_workers(),
            ..self.stats.clone()
        }
    }

    /// Reads the two-state word of a signal at most 32 bits wide.
    pub(crate) fn read_word(
        &mut self,
        handle: &mut SignalHandle,
        oracle: &Arc<dyn TraceOracle>,
        index: u64,
        end: u64,
    ) -> Result<u32, TraceError> {
        let started = self.config.verbose.then(Instant::now);

        if let JitState::Active(slot) = &handle.jit {
            if let Some(word) = slot.read(index) {
                if !slot.is_exhausted()
                    && slot.finished() - index <= self.config.recompile_window()
                    && slot.continuation().request()
                    && self.config.verbose
                {
                    log::debug!(
                        "requesting continuation of '{}' at index {index} (window ends at {})",
                        handle.name,
                        slot.finished()
                    );
                }
                self.stats.read_from_cache += 1;
                if let Some(started) = started {
                    self.stats.cache_time += started.elapsed();
                }
                return Ok(word);
            }
            // Stale: the cursor ran past the window or the first window is
            // still being decoded.
            if slot.is_ready() && !slot.is_exhausted() && index >= slot.finished() {
                slot.continuation().request();
            }
        } else {
            handle.read_count += 1;
            if self.config.enable && handle.read_count > self.config.hot_access_threshold {
                self.spawn(handle, oracle, index, end);
            }
        }

        let word = oracle.word_at(handle.signal, index)?;
        self.stats.read_from_oracle += 1;
        if let Some(started) = started {
            self.stats.oracle_time += started.elapsed();
        }
        Ok(word)
    }

    /// Reads a signal wider than [`MAX_OPTIMIZED_WIDTH`] from the oracle.
    pub(crate) fn read_wide(
        &mut self,
        handle: &mut SignalHandle,
        oracle: &Arc<dyn TraceOracle>,
        index: u64,
    ) -> Result<LogicVec, TraceError> {
        let started = self.config.verbose.then(Instant::now);
        handle.read_count += 1;
        let bits = oracle.bits_at(handle.signal, index)?;
        self.stats.unoptimizable_reads += 1;
        self.stats.read_from_oracle += 1;
        if let Some(started) = started {
            self.stats.oracle_time += started.elapsed();
        }
        Ok(bits)
    }

    /// Starts a worker for `handle` at `index` unless the cap is reached.
    pub(crate) fn spawn(
        &mut self,
        handle: &mut SignalHandle,
        oracle: &Arc<dyn TraceOracle>,
        index: u64,
        end: u64,
    ) -> bool {
        // Only this thread increments the counter, so the check cannot race
        // with another spawn.
        if u64::from(self.active.load(Ordering::Acquire)) >= self.config.max_opt_threads {
            self.stats.thread_cap_blocked += 1;
            return false;
        }

        let slot = Arc::new(JitSlot::new(
            handle.signal,
            index,
            end,
            self.config.compile_window_size,
        ));
        self.active.fetch_add(1, Ordering::AcqRel);
        let worker = Worker {
            name: handle.name.clone(),
            slot: Arc::clone(&slot),
            oracle: Arc::clone(oracle),
            active: Arc::clone(&self.active),
            first_windows: Arc::clone(&self.first_windows),
            verbose: self.config.verbose,
        };

        match thread::Builder::new()
            .name("retrace-jit".to_string())
            .spawn(move || worker.run())
        {
            Ok(join) => {
                if self.config.verbose {
                    log::debug!(
                        "optimizing '{}' from index {index} after {} reads",
                        handle.name,
                        handle.read_count
                    );
                }
                self.stats.tasks_spawned += 1;
                self.workers.push((Arc::clone(&slot), join));
                handle.jit = JitState::Active(slot);
                true
            }
            Err(e) => {
                self.active.fetch_sub(1, Ordering::AcqRel);
                log::warn!("failed to start optimizer for '{}': {e}", handle.name);
                false
            }
        }
    }

    /// Logs the read statistics.
    pub(crate) fn report(&self) {
        let stats = self.statistics();
        log::info!(
            "jit: {} cached reads, {} oracle reads ({} unoptimizable), {} workers spawned, {} first windows, {} cap blocks",
            stats.read_from_cache,
            stats.read_from_oracle,
            stats.unoptimizable_reads,
            stats.tasks_spawned,
            stats.first_windows_finished,
            stats.thread_cap_blocked
        );
        if self.config.verbose {
            log::info!(
                "jit: {:?} in cached reads, {:?} in oracle reads",
                stats.cache_time,
                stats.oracle_time
            );
        }
    }

    /// Stops every worker and waits for it to exit.
    pub(crate) fn shutdown(&mut self) {
        for (slot, _) in &self.workers {
            slot.continuation().shutdown();
        }
        for (_, join) in self.workers.drain(..) {
            if join.join().is_err() {
                log::warn!("an optimizer thread panicked");
            }
        }
    }
}

impl Drop for Jit {
    fn drop(&mut self) {
        self.shutdown();
    }
}
