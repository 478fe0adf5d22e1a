//! Callback registration.
//!
//! Scripts drive a replay the way they would drive a live simulator: they
//! register callbacks for the start and end of simulation, for value changes
//! of a signal, for a delay, and for the next time step. Registrations made
//! while the engine is dispatching are staged and become live at the next
//! flush point of the replay loop.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use retrace_common::LogicVec;
use retrace_trace::{SignalValue, ValueFormat};

use crate::engine::ReplayEngine;
use crate::error::ReplayError;
use crate::handle::SignalId;
use crate::staged::{Keyed, Staged, TimerQueue};

/// A registered callback.
pub type Callback = Box<dyn FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError>>;

/// Identifier of a registration, usable with [`ReplayEngine::remove_callback`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cb{}", self.0)
    }
}

/// Why a callback is being invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackReason {
    /// The replay is starting.
    StartOfSimulation,
    /// The replay has ended.
    EndOfSimulation,
    /// A watched signal changed.
    ValueChange,
    /// A delay elapsed.
    AfterDelay,
    /// The replay moved to a new time step.
    NextSimTime,
}

/// What a callback is told when it is invoked.
#[derive(Debug, Clone, PartialEq)]
pub struct CallbackData {
    /// Why the callback fires.
    pub reason: CallbackReason,
    /// The registration, for everything but the start/end singletons.
    pub id: Option<CallbackId>,
    /// Cursor index at the time of the call.
    pub index: u64,
    /// Recorded time at `index`.
    pub time: u64,
    /// The watched signal, for value changes.
    pub signal: Option<SignalId>,
    /// The new value in the registered format, for value changes.
    pub value: Option<SignalValue>,
}

/// A sampled signal value.
#[derive(Debug, Clone)]
pub(crate) enum Sample {
    Word(u32),
    Wide(LogicVec),
}

impl Sample {
    pub(crate) fn to_value(&self, width: u32, format: ValueFormat) -> SignalValue {
        match self {
            Sample::Word(word) => SignalValue::from_word(*word, width, format),
            Sample::Wide(bits) => SignalValue::from_bits(bits, format),
        }
    }

    /// Word for narrow signals, binary string for wide ones.
    fn observed(&self) -> Observed {
        match self {
            Sample::Word(word) => Observed::Word(*word),
            Sample::Wide(bits) => Observed::Bits(bits.to_bin_string()),
        }
    }
}

/// The value a value-change registration compares against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Observed {
    Word(u32),
    Bits(String),
}

pub(crate) struct ValueChangeRegistration {
    pub(crate) signal: SignalId,
    pub(crate) format: ValueFormat,
    pub(crate) last: Observed,
    pub(crate) callback: Callback,
}

impl ValueChangeRegistration {
    /// Records `sample` and returns `true` if it differs from the last one.
    pub(crate) fn update(&mut self, sample: &Sample) -> bool {
        let observed = sample.observed();
        if observed == self.last {
            return false;
        }
        self.last = observed;
        true
    }
}

pub(crate) struct TimedCallback {
    pub(crate) target_index: u64,
    seq: u64,
    pub(crate) id: CallbackId,
    pub(crate) callback: Callback,
}

impl PartialEq for TimedCallback {
    fn eq(&self, other: &Self) -> bool {
        (self.target_index, self.seq) == (other.target_index, other.seq)
    }
}

impl Eq for TimedCallback {}

impl PartialOrd for TimedCallback {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimedCallback {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.target_index, self.seq).cmp(&(other.target_index, other.seq))
    }
}

impl Keyed for TimedCallback {
    type Key = CallbackId;
    fn key(&self) -> &CallbackId {
        &self.id
    }
}

pub(crate) struct NextStepCallback {
    pub(crate) id: CallbackId,
    pub(crate) callback: Callback,
}

impl Keyed for NextStepCallback {
    type Key = CallbackId;
    fn key(&self) -> &CallbackId {
        &self.id
    }
}

/// A start- or end-of-simulation slot.
#[derive(Default)]
pub(crate) enum Singleton {
    #[default]
    Empty,
    Armed(Callback),
    Fired,
}

impl Singleton {
    fn arm(&mut self, callback: Callback, what: &'static str) -> Result<(), ReplayError> {
        match self {
            Singleton::Empty => {
                *self = Singleton::Armed(callback);
                Ok(())
            }
            _ => Err(ReplayError::DuplicateCallback(what)),
        }
    }

    /// Takes the callback for firing. The slot stays occupied.
    pub(crate) fn take(&mut self) -> Option<Callback> {
        match std::mem::replace(self, Singleton::Fired) {
            Singleton::Armed(callback) => Some(callback),
            _ => None,
        }
    }
}

/// Every registration the engine knows about.
#[derive(Default)]
pub(crate) struct CallbackTables {
    next_id: u64,
    next_seq: u64,
    pub(crate) start: Singleton,
    pub(crate) end: Singleton,
    pub(crate) value_changes: Staged<BTreeMap<CallbackId, ValueChangeRegistration>>,
    pub(crate) timed: Staged<TimerQueue<TimedCallback>>,
    pub(crate) next_step: Staged<Vec<NextStepCallback>>,
}

impl CallbackTables {
    fn allocate(&mut self) -> CallbackId {
        self.next_id += 1;
        CallbackId(self.next_id)
    }

    pub(crate) fn flush_all(&mut self) {
        self.timed.flush();
        self.value_changes.flush();
        self.next_step.flush();
    }
}

impl ReplayEngine {
    /// Registers the callback fired once when the replay starts.
    pub fn register_start_of_simulation<F>(&mut self, callback: F) -> Result<(), ReplayError>
    where
        F: FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError> + 'static,
    {
        self.callbacks
            .start
            .arm(Box::new(callback), "start-of-simulation")
    }

    /// Registers the callback fired once when the replay ends, for whatever
    /// reason.
    pub fn register_end_of_simulation<F>(&mut self, callback: F) -> Result<(), ReplayError>
    where
        F: FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError> + 'static,
    {
        self.callbacks
            .end
            .arm(Box::new(callback), "end-of-simulation")
    }

    /// Registers a callback fired whenever `signal` changes.
    ///
    /// The signal's current value is the baseline: the first call happens on
    /// the first step whose value differs from it.
    pub fn register_value_change<F>(
        &mut self,
        signal: SignalId,
        format: ValueFormat,
        callback: F,
    ) -> Result<CallbackId, ReplayError>
    where
        F: FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError> + 'static,
    {
        let baseline = self.sample(signal)?;
        let id = self.callbacks.allocate();
        self.callbacks.value_changes.stage_add((
            id,
            ValueChangeRegistration {
                signal,
                format,
                last: baseline.observed(),
                callback: Box::new(callback),
            },
        ));
        Ok(id)
    }

    /// Registers a callback fired once at the first recorded time at or after
    /// `delay` trace units from now.
    ///
    /// A target past the last recorded time is [`ReplayError::BeyondTrace`].
    /// A target that lands exactly on the last recorded time is accepted but
    /// never fires: the replay ends on reaching the last index without
    /// stepping it, so such a callback is only dropped at end-of-simulation.
    pub fn register_after_delay<F>(&mut self, delay: u64, callback: F) -> Result<CallbackId, ReplayError>
    where
        F: FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError> + 'static,
    {
        let now = self.cursor.time;
        let target_time = now.checked_add(delay).ok_or(ReplayError::BeyondTrace {
            time: u64::MAX,
            max_time: self.cursor.max_time,
        })?;
        let target_index = self.time_index.index_from_time(target_time)?;
        let id = self.callbacks.allocate();
        self.callbacks.next_seq += 1;
        let seq = self.callbacks.next_seq;
        self.callbacks.timed.stage_add(TimedCallback {
            target_index,
            seq,
            id,
            callback: Box::new(callback),
        });
        Ok(id)
    }

    /// Registers a callback fired once on the next time step.
    pub fn register_next_sim_time<F>(&mut self, callback: F) -> CallbackId
    where
        F: FnMut(&mut ReplayEngine, &CallbackData) -> Result<(), ReplayError> + 'static,
    {
        let id = self.callbacks.allocate();
        self.callbacks.next_step.stage_add(NextStepCallback {
            id,
            callback: Box::new(callback),
        });
        id
    }

    /// Removes a value-change, timed or next-step registration. Unknown ids
    /// are ignored.
    ///
    /// The registration never fires after this call, even later in the same
    /// step. It leaves the live tables at the next flush point.
    pub fn remove_callback(&mut self, id: CallbackId) {
        self.callbacks.value_changes.stage_remove(id);
        self.callbacks.timed.stage_remove(id);
        self.callbacks.next_step.stage_remove(id);
    }

    /// Returns the number of live value-change registrations.
    pub fn value_change_count(&self) -> usize {
        self.callbacks.value_changes.live().len()
    }

    /// Returns the number of live timed callbacks.
    pub fn pending_timer_count(&self) -> usize {
        self.callbacks.timed.live().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_rejects_second_registration() {
        let mut slot = Singleton::default();
        slot.arm(Box::new(|_, _| Ok(())), "start-of-simulation").unwrap();
        assert!(matches!(
            slot.arm(Box::new(|_, _| Ok(())), "start-of-simulation"),
            Err(ReplayError::DuplicateCallback("start-of-simulation"))
        ));
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
        assert!(slot.arm(Box::new(|_, _| Ok(())), "x").is_err());
    }

    #[test]
    fn wide_samples_compare_as_strings() {
        let mut reg = ValueChangeRegistration {
            signal: SignalId::from_raw(0),
            format: ValueFormat::HexStr,
            last: Observed::Bits("0".repeat(40)),
            callback: Box::new(|_, _| Ok(())),
        };
        let same = Sample::Wide(LogicVec::from_binary_str(&"z".repeat(40)).unwrap());
        assert!(!reg.update(&same));
        let changed = Sample::Wide(LogicVec::from_u64(1, 40));
        assert!(reg.update(&changed));
        assert!(!reg.update(&changed));
    }

    #[test]
    fn sample_values() {
        assert_eq!(
            Sample::Word(5).to_value(4, ValueFormat::BinStr),
            SignalValue::BinStr("0101".to_string())
        );
        assert_eq!(
            Sample::Wide(LogicVec::from_u64(0xab, 36)).to_value(36, ValueFormat::HexStr),
            SignalValue::HexStr("0000000ab".to_string())
        );
    }

    #[test]
    fn callback_id_display() {
        assert_eq!(CallbackId(4).to_string(), "cb4");
    }
}
