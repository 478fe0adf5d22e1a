//! The replay engine and its main loop.
//!
//! A [`ReplayEngine`] owns everything one replay needs: the oracle, the time
//! index, the cursor, resolved handles, the JIT optimizer and the callback
//! tables. [`ReplayEngine::run`] walks the cursor from index 0 to the last
//! index. Each step runs three callback phases in a fixed order:
//!
//! 1. timed callbacks whose target index has been reached;
//! 2. value-change registrations whose signal changed;
//! 3. next-time-step callbacks.
//!
//! Registrations made by callbacks are staged and merged at flush points
//! between the phases, so a collection is never mutated while it is walked.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use retrace_cache::TraceCache;
use retrace_config::{JitConfig, RetraceConfig};
use retrace_trace::TraceOracle;

use crate::callback::{
    CallbackData, CallbackId, CallbackReason, CallbackTables, NextStepCallback, Sample,
    ValueChangeRegistration,
};
use crate::cursor::Cursor;
use crate::error::ReplayError;
use crate::handle::{HandleCache, SignalId};
use crate::jit::{Jit, JitPhase, JitState, JitStatistics, MAX_OPTIMIZED_WIDTH};
use crate::time_index::TimeIndex;

/// Version written into cache manifests.
const TOOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Lifecycle of a replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineState {
    /// [`ReplayEngine::run`] has not been called.
    NotStarted,
    /// The loop is stepping.
    Running,
    /// End-of-simulation has fired.
    Terminated,
}

/// Why a replay ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TerminateReason {
    /// The cursor reached the last index.
    Natural,
    /// A script called [`ReplayEngine::stop`].
    Stop,
    /// A script called [`ReplayEngine::finish`].
    Finish,
    /// The interrupt flag was raised.
    Interrupted,
    /// A callback returned an error or panicked.
    Aborted,
}

impl fmt::Display for TerminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TerminateReason::Natural => "end of trace",
            TerminateReason::Stop => "stop",
            TerminateReason::Finish => "finish",
            TerminateReason::Interrupted => "interrupted",
            TerminateReason::Aborted => "aborted",
        })
    }
}

/// Summary of a completed replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Why the replay ended.
    pub reason: TerminateReason,
    /// Cursor index when it ended.
    pub final_index: u64,
    /// Recorded time at `final_index`.
    pub final_time: u64,
    /// How signal reads were served.
    pub statistics: JitStatistics,
}

/// A waveform replay in progress.
pub struct ReplayEngine {
    pub(crate) oracle: Arc<dyn TraceOracle>,
    pub(crate) time_index: TimeIndex,
    pub(crate) cursor: Cursor,
    pub(crate) handles: HandleCache,
    pub(crate) jit: Jit,
    pub(crate) callbacks: CallbackTables,
    state: EngineState,
    reason: Option<TerminateReason>,
    end_fired: bool,
    deferred_error: Option<ReplayError>,
    interrupt: Arc<AtomicBool>,
    cache: Option<TraceCache>,
}

impl ReplayEngine {
    /// Creates an engine without on-disk persistence.
    pub fn new(oracle: Arc<dyn TraceOracle>, jit: JitConfig) -> Result<Self, ReplayError> {
        Self::with_cache(oracle, jit, None)
    }

    /// Creates an engine from a full configuration.
    ///
    /// When persistence is enabled and the oracle was loaded from a file, the
    /// time index and resolved names are cached under `replay.cache_dir`. A
    /// cache that cannot be opened is logged and skipped.
    pub fn from_config(oracle: Arc<dyn TraceOracle>, config: &RetraceConfig) -> Result<Self, ReplayError> {
        let cache = match oracle.source_path() {
            Some(path) if config.replay.persist_cache => {
                match TraceCache::open(&config.replay.cache_dir, path, TOOL_VERSION) {
                    Ok(cache) => Some(cache),
                    Err(e) => {
                        log::warn!("replay cache disabled: {e}");
                        None
                    }
                }
            }
            _ => None,
        };
        Self::with_cache(oracle, config.jit.clone(), cache)
    }

    /// Creates an engine that loads and stores derived data through `cache`.
    pub fn with_cache(
        oracle: Arc<dyn TraceOracle>,
        jit: JitConfig,
        mut cache: Option<TraceCache>,
    ) -> Result<Self, ReplayError> {
        jit.validate()?;
        let time_index = TimeIndex::load_or_build(oracle.as_ref(), cache.as_mut())?;
        let handles = match cache.as_ref().and_then(TraceCache::load_signal_names) {
            Some(table) => {
                log::debug!("loaded {} persisted signal names", table.len());
                HandleCache::with_persisted(table)
            }
            None => HandleCache::new(),
        };
        let cursor = Cursor::new(&time_index);
        log::info!(
            "replaying {} time steps, {} to {} ({})",
            time_index.len(),
            cursor.time,
            cursor.max_time,
            oracle.timescale()
        );

        Ok(Self {
            oracle,
            time_index,
            cursor,
            handles,
            jit: Jit::new(jit),
            callbacks: CallbackTables::default(),
            state: EngineState::NotStarted,
            reason: None,
            end_fired: false,
            deferred_error: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            cache,
        })
    }

    /// Returns the oracle being replayed.
    pub fn oracle(&self) -> &dyn TraceOracle {
        self.oracle.as_ref()
    }

    /// Returns the time index.
    pub fn time_index(&self) -> &TimeIndex {
        &self.time_index
    }

    /// Returns the cursor.
    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Returns the lifecycle state.
    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Returns why the replay ended, once it has.
    pub fn termination_reason(&self) -> Option<TerminateReason> {
        self.reason
    }

    /// Returns a flag that, once set from any thread, ends the replay before
    /// its next step.
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    /// Resolves a hierarchical signal name.
    pub fn resolve(&mut self, name: &str) -> Option<SignalId> {
        self.handles.resolve(self.oracle.as_ref(), name)
    }

    /// Returns the read statistics so far.
    pub fn statistics(&self) -> JitStatistics {
        self.jit.statistics()
    }

    /// Returns the optimizer phase of `signal`.
    pub fn jit_phase(&self, signal: SignalId) -> Result<JitPhase, ReplayError> {
        Ok(self.handles.get(signal)?.jit.phase())
    }

    /// Starts optimizing `signal` now, regardless of its read count.
    ///
    /// Returns `false` if the signal is already optimized or the worker cap is
    /// reached.
    pub fn optimize(&mut self, signal: SignalId) -> Result<bool, ReplayError> {
        let index = self.cursor.index;
        let end = self.time_index.len();
        let handle = self.handles.get_mut(signal)?;
        if handle.width > MAX_OPTIMIZED_WIDTH {
            return Err(ReplayError::Unoptimizable {
                name: handle.name.clone(),
                width: handle.width,
            });
        }
        if !matches!(handle.jit, JitState::Cold) {
            return Ok(false);
        }
        Ok(self.jit.spawn(handle, &self.oracle, index, end))
    }

    /// Reads `signal` at the cursor through the optimizer.
    pub(crate) fn sample(&mut self, signal: SignalId) -> Result<Sample, ReplayError> {
        let index = self.cursor.index;
        let end = self.time_index.len();
        let handle = self.handles.get_mut(signal)?;
        if handle.width > MAX_OPTIMIZED_WIDTH {
            return Ok(Sample::Wide(self.jit.read_wide(handle, &self.oracle, index)?));
        }
        Ok(Sample::Word(self.jit.read_word(handle, &self.oracle, index, end)?))
    }

    /// Runs the replay to completion.
    ///
    /// End-of-simulation fires exactly once, whatever ends the run. If a
    /// callback fails or panics, end-of-simulation is still delivered, the
    /// engine is finalized and the failure is returned. A panic is reported
    /// as [`ReplayError::Panicked`].
    pub fn run(&mut self) -> Result<RunOutcome, ReplayError> {
        if self.state == EngineState::NotStarted {
            if let Err(e) = self.guarded(Self::start) {
                return Err(self.abort(e));
            }
        }

        while self.state == EngineState::Running {
            if self.interrupt.load(Ordering::Relaxed) {
                log::info!("interrupted at index {}", self.cursor.index);
                self.terminate(TerminateReason::Interrupted);
            } else if self.cursor.at_end() {
                self.terminate(TerminateReason::Natural);
            } else if let Err(e) = self.guarded(Self::step) {
                return Err(self.abort(e));
            }
        }

        if let Some(e) = self.deferred_error.take() {
            return Err(e);
        }
        Ok(self.outcome())
    }

    /// Runs `f`, turning a panic into [`ReplayError::Panicked`].
    ///
    /// A collection detached for dispatch when the panic hit is lost. The
    /// caller aborts the run right after, so nothing dispatches again.
    fn guarded<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ReplayError>,
    ) -> Result<T, ReplayError> {
        panic::catch_unwind(AssertUnwindSafe(|| f(self)))
            .unwrap_or_else(|payload| Err(ReplayError::Panicked(panic_message(&*payload))))
    }

    fn outcome(&self) -> RunOutcome {
        RunOutcome {
            reason: self.reason.unwrap_or(TerminateReason::Natural),
            final_index: self.cursor.index,
            final_time: self.cursor.time,
            statistics: self.jit.statistics(),
        }
    }

    fn is_running(&self) -> bool {
        self.state == EngineState::Running
    }

    fn callback_data(&self, reason: CallbackReason, id: Option<CallbackId>) -> CallbackData {
        CallbackData {
            reason,
            id,
            index: self.cursor.index,
            time: self.cursor.time,
            signal: None,
            value: None,
        }
    }

    fn start(&mut self) -> Result<(), ReplayError> {
        self.state = EngineState::Running;
        if let Some(mut callback) = self.callbacks.start.take() {
            let data = self.callback_data(CallbackReason::StartOfSimulation, None);
            callback(self, &data)?;
        }
        self.callbacks.flush_all();
        Ok(())
    }

    fn step(&mut self) -> Result<(), ReplayError> {
        self.fire_due_timers()?;
        self.callbacks.timed.flush();

        self.check_value_changes()?;

        self.fire_next_step()?;

        self.callbacks.value_changes.flush();

        if self.is_running() && !self.cursor.at_end() {
            let next = self.cursor.index + 1;
            self.cursor.seek(&self.time_index, next)?;
        }
        Ok(())
    }

    fn fire_due_timers(&mut self) -> Result<(), ReplayError> {
        while self.is_running() {
            let index = self.cursor.index;
            let Some(mut timer) = self
                .callbacks
                .timed
                .live_mut()
                .pop_if(|t| t.target_index <= index)
            else {
                break;
            };
            if self.callbacks.timed.is_removal_pending(&timer.id) {
                continue;
            }
            let data = self.callback_data(CallbackReason::AfterDelay, Some(timer.id));
            (timer.callback)(self, &data)?;
        }
        Ok(())
    }

    fn check_value_changes(&mut self) -> Result<(), ReplayError> {
        let mut live = self.callbacks.value_changes.take_snapshot();
        let result = self.dispatch_value_changes(&mut live);
        self.callbacks.value_changes.restore(live);
        result
    }

    fn dispatch_value_changes(
        &mut self,
        live: &mut BTreeMap<CallbackId, ValueChangeRegistration>,
    ) -> Result<(), ReplayError> {
        for (&id, registration) in live.iter_mut() {
            if !self.is_running() {
                break;
            }
            if self.callbacks.value_changes.is_removal_pending(&id) {
                continue;
            }
            let sample = self.sample(registration.signal)?;
            if !registration.update(&sample) {
                continue;
            }
            let width = self.handles.get(registration.signal)?.width;
            let data = CallbackData {
                signal: Some(registration.signal),
                value: Some(sample.to_value(width, registration.format)),
                ..self.callback_data(CallbackReason::ValueChange, Some(id))
            };
            (registration.callback)(self, &data)?;
        }
        Ok(())
    }

    fn fire_next_step(&mut self) -> Result<(), ReplayError> {
        let mut due = self.callbacks.next_step.take_snapshot();
        let result = self.dispatch_next_step(&mut due);
        // The fired list is consumed; whatever was staged becomes the next one.
        self.callbacks.next_step.flush();
        result
    }

    fn dispatch_next_step(&mut self, due: &mut [NextStepCallback]) -> Result<(), ReplayError> {
        for entry in due.iter_mut() {
            if !self.is_running() {
                break;
            }
            if self.callbacks.next_step.is_removal_pending(&entry.id) {
                continue;
            }
            let data = self.callback_data(CallbackReason::NextSimTime, Some(entry.id));
            (entry.callback)(self, &data)?;
        }
        Ok(())
    }

    /// Ends the replay: records `reason` unless one is already set, fires
    /// end-of-simulation and finalizes. Does nothing the second time.
    pub(crate) fn terminate(&mut self, reason: TerminateReason) {
        if self.end_fired {
            return;
        }
        self.end_fired = true;
        if self.reason.is_none() {
            self.reason = Some(reason);
        }
        self.state = EngineState::Terminated;

        if let Some(mut callback) = self.callbacks.end.take() {
            let data = self.callback_data(CallbackReason::EndOfSimulation, None);
            if let Err(e) = self.guarded(|engine| callback(engine, &data)) {
                self.deferred_error.get_or_insert(e);
            }
        }
        self.finalize();
    }

    fn abort(&mut self, error: ReplayError) -> ReplayError {
        self.terminate(TerminateReason::Aborted);
        if let Some(e) = self.deferred_error.take() {
            log::warn!("end-of-simulation callback failed after an earlier error: {e}");
        }
        error
    }

    fn finalize(&mut self) {
        if let Some(cache) = self.cache.as_mut() {
            if let Some(table) = self.handles.table_to_persist() {
                match cache.store_signal_names(&table) {
                    Ok(()) => {
                        log::debug!("persisted {} signal names", table.len());
                        self.handles.mark_persisted(table);
                    }
                    Err(e) => log::warn!("failed to persist signal names: {e}"),
                }
            }
        }
        log::info!(
            "replay ended ({}) at index {} of {}, time {}",
            self.reason.unwrap_or(TerminateReason::Natural),
            self.cursor.index,
            self.cursor.max_index,
            self.cursor.time
        );
        self.jit.report();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
