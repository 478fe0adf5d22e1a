//! The sorted table of recorded times and the index/time conversions over it.

use rayon::slice::ParallelSliceMut;
use retrace_cache::TraceCache;
use retrace_trace::TraceOracle;

use crate::error::ReplayError;

/// Bijection between dense cursor indices and the trace's recorded times.
///
/// Built once per trace. Index `i` is the `i`-th smallest distinct time the
/// trace records, so `time_from_index` is strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeIndex {
    times: Vec<u64>,
}

impl TimeIndex {
    /// Builds an index from an unordered scan of recorded times.
    ///
    /// The table can hold tens of millions of entries, so it is sorted in
    /// parallel.
    pub fn from_scan(mut times: Vec<u64>) -> Result<Self, ReplayError> {
        times.par_sort_unstable();
        times.dedup();
        Self::from_sorted(times)
    }

    fn from_sorted(times: Vec<u64>) -> Result<Self, ReplayError> {
        if times.len() < 2 {
            return Err(ReplayError::TraceTooShort(times.len()));
        }
        Ok(Self { times })
    }

    /// Loads the persisted table when `cache` is fresh, otherwise scans the
    /// oracle and persists the result.
    ///
    /// Failing to write the cache is logged and otherwise ignored.
    pub fn load_or_build(
        oracle: &dyn TraceOracle,
        cache: Option<&mut TraceCache>,
    ) -> Result<Self, ReplayError> {
        let Some(cache) = cache else {
            return Self::from_scan(oracle.scan_time_table());
        };

        if let Some(times) = cache.load_time_table() {
            let sorted = times.windows(2).all(|w| w[0] < w[1]);
            if sorted && times.len() >= 2 {
                log::debug!("loaded time index ({} entries) from cache", times.len());
                return Self::from_sorted(times);
            }
            log::warn!("ignoring malformed cached time index");
        }

        let index = Self::from_scan(oracle.scan_time_table())?;
        if let Err(e) = cache.store_time_table(&index.times) {
            log::warn!("failed to persist time index: {e}");
        }
        Ok(index)
    }

    /// Returns the index of the first recorded time `>= time`.
    pub fn index_from_time(&self, time: u64) -> Result<u64, ReplayError> {
        if time > self.max_time() {
            return Err(ReplayError::BeyondTrace {
                time,
                max_time: self.max_time(),
            });
        }
        Ok(self.times.partition_point(|&t| t < time) as u64)
    }

    /// Returns the recorded time at `index`.
    pub fn time_from_index(&self, index: u64) -> Result<u64, ReplayError> {
        usize::try_from(index)
            .ok()
            .and_then(|i| self.times.get(i))
            .copied()
            .ok_or(ReplayError::IndexOutOfRange {
                index,
                max_index: self.max_index(),
            })
    }

    /// Returns the index of `time` if it was recorded, else of the closest
    /// recorded time below it. Times before the first record map to 0.
    pub fn nearest_time_index(&self, time: u64) -> u64 {
        match self.times.binary_search(&time) {
            Ok(i) => i as u64,
            Err(0) => 0,
            Err(i) => (i - 1) as u64,
        }
    }

    /// Returns the number of distinct recorded times.
    pub fn len(&self) -> u64 {
        self.times.len() as u64
    }

    /// Always `false`: a time index holds at least two times.
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Returns the largest valid index.
    pub fn max_index(&self) -> u64 {
        self.len() - 1
    }

    /// Returns the last recorded time.
    pub fn max_time(&self) -> u64 {
        self.times[self.times.len() - 1]
    }

    /// Returns the sorted table.
    pub fn times(&self) -> &[u64] {
        &self.times
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_trace::{MemoryTrace, VarType};

    fn index() -> TimeIndex {
        TimeIndex::from_scan(vec![30, 0, 10, 10, 50, 30]).unwrap()
    }

    #[test]
    fn scan_is_sorted_and_deduplicated() {
        let idx = index();
        assert_eq!(idx.times(), &[0, 10, 30, 50]);
        assert_eq!(idx.max_index(), 3);
        assert_eq!(idx.max_time(), 50);
        assert_eq!(idx.len(), 4);
    }

    #[test]
    fn time_from_index_is_strictly_increasing() {
        let idx = index();
        for i in 0..idx.max_index() {
            assert!(idx.time_from_index(i).unwrap() < idx.time_from_index(i + 1).unwrap());
        }
    }

    #[test]
    fn recorded_times_round_trip() {
        let idx = index();
        for i in 0..=idx.max_index() {
            let t = idx.time_from_index(i).unwrap();
            assert_eq!(idx.index_from_time(t).unwrap(), i);
            assert_eq!(idx.nearest_time_index(t), i);
        }
    }

    #[test]
    fn index_from_time_rounds_up() {
        let idx = index();
        assert_eq!(idx.index_from_time(11).unwrap(), 2);
        assert_eq!(idx.index_from_time(1).unwrap(), 1);
    }

    #[test]
    fn index_from_time_past_end_is_an_error() {
        let idx = index();
        assert!(matches!(
            idx.index_from_time(51),
            Err(ReplayError::BeyondTrace { time: 51, max_time: 50 })
        ));
    }

    #[test]
    fn time_from_index_out_of_range() {
        let idx = index();
        assert!(matches!(
            idx.time_from_index(4),
            Err(ReplayError::IndexOutOfRange { index: 4, max_index: 3 })
        ));
    }

    #[test]
    fn nearest_rounds_down_and_clamps() {
        let idx = TimeIndex::from_scan(vec![5, 10, 20]).unwrap();
        assert_eq!(idx.nearest_time_index(15), 1);
        assert_eq!(idx.nearest_time_index(0), 0);
        assert_eq!(idx.nearest_time_index(1000), 2);
    }

    #[test]
    fn single_time_is_too_short() {
        assert!(matches!(
            TimeIndex::from_scan(vec![7, 7]),
            Err(ReplayError::TraceTooShort(1))
        ));
        assert!(matches!(
            TimeIndex::from_scan(Vec::new()),
            Err(ReplayError::TraceTooShort(0))
        ));
    }

    #[test]
    fn build_without_cache_scans_oracle() {
        let mut b = MemoryTrace::builder();
        let a = b.signal("top.a", 1, VarType::Wire);
        b.change(a, 0, 0).change(a, 20, 1).time(10);
        let trace = b.build();
        let idx = TimeIndex::load_or_build(&trace, None).unwrap();
        assert_eq!(idx.times(), &[0, 10, 20]);
    }

    #[test]
    fn build_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let trace_path = dir.path().join("wave.vcd");
        std::fs::write(&trace_path, "placeholder").unwrap();
        let cache_dir = dir.path().join("cache");

        let mut b = MemoryTrace::builder();
        let a = b.signal("top.a", 1, VarType::Wire);
        b.change(a, 0, 0).change(a, 5, 1);
        let trace = b.build();

        let mut cache = TraceCache::open(&cache_dir, &trace_path, "test").unwrap();
        let built = TimeIndex::load_or_build(&trace, Some(&mut cache)).unwrap();

        let cache = TraceCache::open(&cache_dir, &trace_path, "test").unwrap();
        assert_eq!(cache.load_time_table().unwrap(), vec![0, 5]);

        // A different oracle proves the second build came from disk.
        let mut b = MemoryTrace::builder();
        let a = b.signal("top.a", 1, VarType::Wire);
        b.change(a, 100, 1).change(a, 200, 0);
        let other = b.build();
        let mut cache = cache;
        let loaded = TimeIndex::load_or_build(&other, Some(&mut cache)).unwrap();
        assert_eq!(loaded, built);
    }
}
