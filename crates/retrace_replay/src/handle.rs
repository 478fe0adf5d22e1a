//! Signal handle cache.
//!
//! Resolving a hierarchical name through the oracle may walk the whole scope
//! tree, so every successful resolution is cached for the engine's lifetime
//! and handed out as a small [`SignalId`]. Failed resolutions are not cached;
//! a name that does not resolve is asked again on every call.

use std::collections::HashMap;
use std::fmt;

use retrace_cache::{PersistedSignal, SignalNameTable, MIN_PERSISTED_SIGNALS};
use retrace_trace::{SignalRef, TraceOracle, VarType};

use crate::error::ReplayError;
use crate::jit::JitState;

/// Number of suggestions logged for a name that does not resolve.
const SUGGESTION_LIMIT: usize = 3;

/// Opaque handle to a resolved signal. Stable for the engine's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignalId(u32);

impl SignalId {
    /// Returns the raw id.
    pub fn as_raw(self) -> u32 {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sig{}", self.0)
    }
}

/// A resolved signal with its read counter and optimizer state.
#[derive(Debug)]
pub(crate) struct SignalHandle {
    pub(crate) name: String,
    pub(crate) signal: SignalRef,
    pub(crate) width: u32,
    pub(crate) var_type: VarType,
    pub(crate) read_count: u64,
    pub(crate) jit: JitState,
}

impl SignalHandle {
    pub(crate) fn new(name: String, signal: SignalRef, width: u32, var_type: VarType) -> Self {
        Self {
            name,
            signal,
            width,
            var_type,
            read_count: 0,
            jit: JitState::Cold,
        }
    }
}

/// Name-to-handle cache backed by an optional persisted name table.
#[derive(Debug, Default)]
pub struct HandleCache {
    names: HashMap<String, SignalId>,
    handles: Vec<SignalHandle>,
    persisted: SignalNameTable,
    resolved_new: bool,
}

impl HandleCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a cache that consults names resolved by an earlier run before
    /// asking the oracle.
    pub fn with_persisted(persisted: SignalNameTable) -> Self {
        Self {
            persisted,
            ..Self::default()
        }
    }

    /// Resolves `name` to a handle.
    ///
    /// Repeated calls with the same name return the same id without touching
    /// the oracle.
    pub fn resolve(&mut self, oracle: &dyn TraceOracle, name: &str) -> Option<SignalId> {
        if let Some(&id) = self.names.get(name) {
            return Some(id);
        }

        let handle = match self.restore_persisted(oracle, name) {
            Some(handle) => handle,
            None => {
                let Some(signal) = oracle.lookup(name) else {
                    if log::log_enabled!(log::Level::Debug) {
                        let suggestions = oracle.suggest(name, SUGGESTION_LIMIT);
                        if suggestions.is_empty() {
                            log::debug!("signal '{name}' not found");
                        } else {
                            log::debug!(
                                "signal '{name}' not found; did you mean {}?",
                                suggestions.join(", ")
                            );
                        }
                    }
                    return None;
                };
                let info = oracle.signal_info(signal)?;
                self.resolved_new = true;
                SignalHandle::new(name.to_string(), signal, info.width, info.var_type)
            }
        };

        let id = SignalId(self.handles.len() as u32);
        self.handles.push(handle);
        self.names.insert(name.to_string(), id);
        Some(id)
    }

    /// Rebuilds a handle from the persisted table if the oracle still agrees
    /// on the signal's shape.
    fn restore_persisted(&self, oracle: &dyn TraceOracle, name: &str) -> Option<SignalHandle> {
        let entry = self.persisted.get(name)?;
        let signal = SignalRef(entry.signal_ref);
        let info = oracle.signal_info(signal)?;
        if info.width != entry.width || info.var_type.type_string() != entry.var_type {
            log::debug!("persisted entry for '{name}' no longer matches the trace");
            return None;
        }
        Some(SignalHandle::new(name.to_string(), signal, info.width, info.var_type))
    }

    pub(crate) fn get(&self, id: SignalId) -> Result<&SignalHandle, ReplayError> {
        self.handles
            .get(id.index())
            .ok_or(ReplayError::UnknownSignal(id.0))
    }

    pub(crate) fn get_mut(&mut self, id: SignalId) -> Result<&mut SignalHandle, ReplayError> {
        self.handles
            .get_mut(id.index())
            .ok_or(ReplayError::UnknownSignal(id.0))
    }

    /// Returns the number of resolved names.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Returns `true` if nothing has been resolved yet.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Returns the table to write back, if it is worth writing.
    ///
    /// The table merges the persisted entries with everything resolved in this
    /// run. `None` unless a name was resolved through the oracle and the table
    /// holds at least [`MIN_PERSISTED_SIGNALS`] names.
    pub fn table_to_persist(&self) -> Option<SignalNameTable> {
        if !self.resolved_new {
            return None;
        }
        let mut table = self.persisted.clone();
        for handle in &self.handles {
            table.insert(
                handle.name.clone(),
                PersistedSignal {
                    signal_ref: handle.signal.0,
                    width: handle.width,
                    var_type: handle.var_type.type_string().to_string(),
                },
            );
        }
        (table.len() >= MIN_PERSISTED_SIGNALS).then_some(table)
    }

    /// Records that `table` has been written.
    pub fn mark_persisted(&mut self, table: SignalNameTable) {
        self.persisted = table;
        self.resolved_new = false;
    }
}
