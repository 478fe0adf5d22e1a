//! The trace oracle interface consumed by the replay engine.

use std::fmt;
use std::path::Path;

use retrace_common::LogicVec;
use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::timescale::Timescale;
use crate::value::{SignalValue, ValueFormat};

/// An oracle-native reference to one signal of a trace.
///
/// Several hierarchical names may alias the same reference. References are
/// stable for a given trace file, which is what lets resolved names be
/// persisted between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SignalRef(pub u32);

impl SignalRef {
    /// Returns the reference as a vector index.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for SignalRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declared kind of a traced variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VarType {
    /// A net (`wire`, `tri`, `wand`, ...).
    Wire,
    /// A variable (`reg`, `logic`, `bit`).
    Reg,
    /// An `integer` variable.
    Integer,
    /// A `parameter`.
    Parameter,
    /// A `real` variable.
    Real,
    /// Anything else the trace declares.
    Other,
}

impl VarType {
    /// Maps a VCD `$var` type keyword to a [`VarType`].
    pub fn from_vcd(keyword: &str) -> Self {
        match keyword {
            "wire" | "tri" | "tri0" | "tri1" | "triand" | "trior" | "trireg" | "wand" | "wor"
            | "supply0" | "supply1" | "uwire" => VarType::Wire,
            "reg" | "logic" | "bit" => VarType::Reg,
            "integer" | "int" => VarType::Integer,
            "parameter" => VarType::Parameter,
            "real" | "realtime" => VarType::Real,
            _ => VarType::Other,
        }
    }

    /// Returns the procedural-interface type name scripts see.
    pub fn type_string(self) -> &'static str {
        match self {
            VarType::Reg => "vpiReg",
            VarType::Wire | VarType::Other => "vpiNet",
            VarType::Integer => "vpiIntegerVar",
            VarType::Parameter => "vpiParameter",
            VarType::Real => "vpiRealVar",
        }
    }

    /// Parses a [`VarType::type_string`] back.
    pub fn from_type_string(s: &str) -> Option<Self> {
        match s {
            "vpiReg" => Some(VarType::Reg),
            "vpiNet" => Some(VarType::Wire),
            "vpiIntegerVar" => Some(VarType::Integer),
            "vpiParameter" => Some(VarType::Parameter),
            "vpiRealVar" => Some(VarType::Real),
            _ => None,
        }
    }
}

/// Static metadata of a signal, fetched once at resolution time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalInfo {
    /// Bit width.
    pub width: u32,
    /// Declared kind.
    pub var_type: VarType,
}

/// A randomly accessible, read-only recorded waveform.
///
/// Indices are dense positions in the trace's sorted, deduplicated table of
/// recorded times (see [`TraceOracle::scan_time_table`]). Before a signal's
/// first recorded change its value is all zeros.
///
/// Oracles are shared with background optimizer threads and must therefore
/// be `Send + Sync`.
pub trait TraceOracle: Send + Sync {
    /// Walks the trace and returns every recorded time.
    ///
    /// This is the expensive full scan. The result may be unsorted or contain
    /// duplicates; callers sort and deduplicate it once and persist it.
    fn scan_time_table(&self) -> Vec<u64>;

    /// Resolves a full hierarchical name. May walk the whole scope tree.
    fn lookup(&self, name: &str) -> Option<SignalRef>;

    /// Returns metadata of a signal, or `None` for a foreign reference.
    fn signal_info(&self, signal: SignalRef) -> Option<SignalInfo>;

    /// Returns the raw value of `signal` at `index`.
    fn bits_at(&self, signal: SignalRef, index: u64) -> Result<LogicVec, TraceError>;

    /// Returns the low 32 bits of the value at `index`, two-state.
    fn word_at(&self, signal: SignalRef, index: u64) -> Result<u32, TraceError> {
        Ok(self.bits_at(signal, index)?.to_word())
    }

    /// Returns the value at `index` decoded into `format`.
    fn value_at(
        &self,
        signal: SignalRef,
        index: u64,
        format: ValueFormat,
    ) -> Result<SignalValue, TraceError> {
        Ok(SignalValue::from_bits(&self.bits_at(signal, index)?, format))
    }

    /// Returns every resolvable hierarchical name.
    fn signal_names(&self) -> Vec<String>;

    /// Returns up to `limit` known names that look like `name`.
    fn suggest(&self, name: &str, limit: usize) -> Vec<String> {
        rank_suggestions(self.signal_names(), name, limit)
    }

    /// Returns the file this oracle was loaded from, if any.
    fn source_path(&self) -> Option<&Path> {
        None
    }

    /// Returns the trace's timescale.
    fn timescale(&self) -> Timescale {
        Timescale::default()
    }
}

/// Ranks `candidates` by how many leading dotted scope segments they share
/// with `name`, breaking ties on a matching leaf name and then alphabetically.
///
/// Candidates sharing nothing with `name` are dropped.
pub fn rank_suggestions<I>(candidates: I, name: &str, limit: usize) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let wanted: Vec<&str> = name.split('.').collect();
    let wanted_leaf = wanted.last().copied().unwrap_or_default();
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let segments: Vec<&str> = candidate.split('.').collect();
            let shared = segments
                .iter()
                .zip(&wanted)
                .take_while(|(a, b)| a == b)
                .count();
            let leaf_bonus = usize::from(segments.last().copied() == Some(wanted_leaf));
            let score = shared * 2 + leaf_bonus;
            (score > 0).then_some((score, candidate))
        })
        .collect();
    scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
    scored.into_iter().take(limit).map(|(_, n)| n).collect()
}
