//! Per-signal change lists shared by the in-crate oracles.

use retrace_common::LogicVec;

use crate::oracle::VarType;

/// A signal's declared shape and its changes, ordered by time-step index.
#[derive(Debug, Clone)]
pub(crate) struct SignalHistory {
    pub(crate) width: u32,
    pub(crate) var_type: VarType,
    changes: Vec<(u64, LogicVec)>,
}

impl SignalHistory {
    pub(crate) fn new(width: u32, var_type: VarType) -> Self {
        Self {
            width,
            var_type,
            changes: Vec::new(),
        }
    }

    /// Records `value` at `index`. Indices arrive in non-decreasing order; a
    /// second change at the same index replaces the first.
    pub(crate) fn record(&mut self, index: u64, value: LogicVec) {
        match self.changes.last_mut() {
            Some((last, slot)) if *last == index => *slot = value,
            _ => {
                debug_assert!(self.changes.last().is_none_or(|(last, _)| *last < index));
                self.changes.push((index, value));
            }
        }
    }

    /// Returns the value in effect at `index`, if the signal changed at or before it.
    pub(crate) fn at(&self, index: u64) -> Option<&LogicVec> {
        let pos = self.changes.partition_point(|(i, _)| *i <= index);
        pos.checked_sub(1).map(|p| &self.changes[p].1)
    }

    /// Returns the value at `index`, all zeros before the first change.
    pub(crate) fn bits_at(&self, index: u64) -> LogicVec {
        self.at(index)
            .cloned()
            .unwrap_or_else(|| LogicVec::new(self.width))
    }

    pub(crate) fn word_at(&self, index: u64) -> u32 {
        self.at(index).map_or(0, LogicVec::to_word)
    }

    pub(crate) fn change_count(&self) -> usize {
        self.changes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_before_first_change() {
        let mut h = SignalHistory::new(4, VarType::Reg);
        h.record(3, LogicVec::from_u64(9, 4));
        assert_eq!(h.word_at(0), 0);
        assert_eq!(h.bits_at(2), LogicVec::new(4));
        assert_eq!(h.word_at(3), 9);
        assert_eq!(h.word_at(100), 9);
    }

    #[test]
    fn same_index_replaces() {
        let mut h = SignalHistory::new(1, VarType::Wire);
        h.record(0, LogicVec::from_u64(0, 1));
        h.record(0, LogicVec::from_u64(1, 1));
        assert_eq!(h.change_count(), 1);
        assert_eq!(h.word_at(0), 1);
    }
}
