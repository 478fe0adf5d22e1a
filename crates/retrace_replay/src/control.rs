//! Control and query operations available to scripts.

use retrace_config::JitOption;
use retrace_trace::{SignalValue, ValueFormat};

use crate::engine::{ReplayEngine, TerminateReason};
use crate::error::ReplayError;
use crate::handle::SignalId;

impl ReplayEngine {
    /// Ends the replay as `$stop` would. End-of-simulation fires immediately.
    pub fn stop(&mut self) {
        self.terminate(TerminateReason::Stop);
    }

    /// Ends the replay as `$finish` would. End-of-simulation fires immediately.
    pub fn finish(&mut self) {
        self.terminate(TerminateReason::Finish);
    }

    /// Current cursor index.
    pub fn cursor_index(&self) -> u64 {
        self.cursor.index
    }

    /// Largest valid cursor index.
    pub fn max_cursor_index(&self) -> u64 {
        self.cursor.max_index
    }

    /// Recorded time at the cursor.
    pub fn current_time(&self) -> u64 {
        self.cursor.time
    }

    /// Moves the cursor to `index`.
    pub fn set_cursor_index(&mut self, index: u64) -> Result<(), ReplayError> {
        if index > self.cursor.max_index {
            return Err(ReplayError::IndexOutOfRange {
                index,
                max_index: self.cursor.max_index,
            });
        }
        self.cursor.seek(&self.time_index, index)
    }

    /// Moves the cursor to `percent` of the trace.
    ///
    /// 100 and above land one step before the end so the loop still has a
    /// step to run. Negative values land at 0.
    pub fn set_cursor_percent(&mut self, percent: f64) -> Result<(), ReplayError> {
        let max = self.cursor.max_index;
        let index = if percent >= 100.0 {
            max.saturating_sub(1)
        } else if percent > 0.0 {
            (max as f64 * percent / 100.0).floor() as u64
        } else {
            0
        };
        self.set_cursor_index(index)
    }

    /// Reads `signal` at the cursor, decoded into `format`.
    pub fn value(&mut self, signal: SignalId, format: ValueFormat) -> Result<SignalValue, ReplayError> {
        let sample = self.sample(signal)?;
        let width = self.handles.get(signal)?.width;
        Ok(sample.to_value(width, format))
    }

    /// Bit width of `signal`.
    pub fn signal_width(&self, signal: SignalId) -> Result<u32, ReplayError> {
        Ok(self.handles.get(signal)?.width)
    }

    /// Procedural-interface type name of `signal`, such as `"vpiReg"`.
    pub fn signal_type(&self, signal: SignalId) -> Result<&'static str, ReplayError> {
        Ok(self.handles.get(signal)?.var_type.type_string())
    }

    /// Full hierarchical name `signal` was resolved from.
    pub fn signal_name(&self, signal: SignalId) -> Result<&str, ReplayError> {
        Ok(&self.handles.get(signal)?.name)
    }

    /// Changes a JIT option for the rest of the replay.
    ///
    /// Window sizes apply to signals optimized afterwards. An invalid
    /// combination is rejected and leaves the settings unchanged.
    pub fn set_jit_option(&mut self, option: JitOption, value: u64) -> Result<(), ReplayError> {
        Ok(self.jit.set_option(option, value)?)
    }

    /// Current value of a JIT option. Flags read as 0 or 1.
    pub fn jit_option(&self, option: JitOption) -> u64 {
        self.jit.option(option)
    }

    /// Number of optimizer threads still running.
    pub fn active_jit_workers(&self) -> u32 {
        self.jit.active_workers()
    }
}
