//! Per-signal value window shared between the replay loop and its worker.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use retrace_trace::{SignalRef, TraceOracle};

use super::continuation::{Continuation, Resume};

/// Pre-decoded values of one signal from `start` onwards.
///
/// Values are stored in fixed-size chunks, one per optimizer window. The
/// worker is the only writer: it fills a chunk, then publishes the new upper
/// bound in `finished` with release ordering. Readers load `finished` with
/// acquire ordering and only touch indices below it.
#[derive(Debug)]
pub struct JitSlot {
    signal: SignalRef,
    start: u64,
    end: u64,
    window: u64,
    chunks: Box<[OnceLock<Box<[u32]>>]>,
    finished: AtomicU64,
    exhausted: AtomicBool,
    continuation: Continuation,
}

impl JitSlot {
    /// Creates an empty slot covering `[start, end)` in windows of `window`.
    pub fn new(signal: SignalRef, start: u64, end: u64, window: u64) -> Self {
        let window = window.max(1);
        let span = end.saturating_sub(start);
        let chunk_count = span.div_ceil(window) as usize;
        Self {
            signal,
            start,
            end,
            window,
            chunks: (0..chunk_count).map(|_| OnceLock::new()).collect(),
            finished: AtomicU64::new(start),
            exhausted: AtomicBool::new(span == 0),
            continuation: Continuation::new(),
        }
    }

    /// First index covered.
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Exclusive upper bound of the published values.
    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Acquire)
    }

    /// Returns `true` once the first window has been published.
    pub fn is_ready(&self) -> bool {
        self.finished() > self.start
    }

    /// Returns `true` once no further windows will be produced.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Acquire)
    }

    /// The park/resume primitive of this slot's worker.
    pub fn continuation(&self) -> &Continuation {
        &self.continuation
    }

    /// Returns the cached value at `index` if it has been published.
    pub fn read(&self, index: u64) -> Option<u32> {
        if index < self.start || index >= self.finished() {
            return None;
        }
        let offset = index - self.start;
        let chunk = self.chunks.get((offset / self.window) as usize)?.get()?;
        chunk.get((offset % self.window) as usize).copied()
    }

    /// Decodes chunk `n` from the oracle and publishes it.
    ///
    /// Returns the new `finished` bound.
    fn fill(&self, oracle: &dyn TraceOracle, n: usize) -> Result<u64, retrace_trace::TraceError> {
        let from = self.start + n as u64 * self.window;
        let to = (from + self.window).min(self.end);
        let values = (from..to)
            .map(|i| oracle.word_at(self.signal, i))
            .collect::<Result<Vec<u32>, _>>()?;
        if let Some(cell) = self.chunks.get(n) {
            // Only this slot's worker fills chunks, each exactly once.
            let _ = cell.set(values.into_boxed_slice());
        }
        self.finished.store(to, Ordering::Release);
        Ok(to)
    }
}

/// Decrements the active-worker counter when a worker exits, however it exits.
struct ActiveGuard(Arc<AtomicU32>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Everything a worker thread owns.
pub(crate) struct Worker {
    pub(crate) name: String,
    pub(crate) slot: Arc<JitSlot>,
    pub(crate) oracle: Arc<dyn TraceOracle>,
    pub(crate) active: Arc<AtomicU32>,
    pub(crate) first_windows: Arc<AtomicU64>,
    pub(crate) verbose: bool,
}

impl Worker {
    /// Produces windows until the trace is exhausted or shutdown is requested.
    ///
    /// The caller has already counted this worker as active.
    pub(crate) fn run(self) {
        let _guard = ActiveGuard(Arc::clone(&self.active));
        let slot = &self.slot;
        let mut chunk = 0usize;
        loop {
            let finished = match slot.fill(self.oracle.as_ref(), chunk) {
                Ok(finished) => finished,
                Err(e) => {
                    log::warn!("optimizer for '{}' stopped: {e}", self.name);
                    slot.exhausted.store(true, Ordering::Release);
                    return;
                }
            };
            if chunk == 0 {
                self.first_windows.fetch_add(1, Ordering::Relaxed);
            }
            if self.verbose {
                log::debug!(
                    "optimizer for '{}' published [{}, {finished})",
                    self.name,
                    slot.start + chunk as u64 * slot.window
                );
            }
            if finished >= slot.end {
                slot.exhausted.store(true, Ordering::Release);
                if self.verbose {
                    log::debug!("optimizer for '{}' reached the end of the trace", self.name);
                }
                return;
            }
            chunk += 1;
            if slot.continuation.park() == Resume::Shutdown {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use retrace_trace::{MemoryTrace, VarType};

    fn counter_trace(steps: u64) -> (MemoryTrace, SignalRef) {
        let mut b = MemoryTrace::builder();
        let s = b.signal("top.count", 8, VarType::Reg);
        for t in 0..steps {
            b.change(s, t, t);
        }
        (b.build(), s)
    }

    #[test]
    fn nothing_readable_before_publish() {
        let (_, s) = counter_trace(4);
        let slot = JitSlot::new(s, 1, 4, 2);
        assert!(!slot.is_ready());
        assert_eq!(slot.read(1), None);
    }

    #[test]
    fn fill_publishes_window() {
        let (trace, s) = counter_trace(10);
        let slot = JitSlot::new(s, 3, 10, 4);
        assert_eq!(slot.fill(&trace, 0).unwrap(), 7);
        assert!(slot.is_ready());
        assert_eq!(slot.read(2), None);
        assert_eq!(slot.read(3), Some(3));
        assert_eq!(slot.read(6), Some(6));
        assert_eq!(slot.read(7), None);
        assert_eq!(slot.fill(&trace, 1).unwrap(), 10);
        assert_eq!(slot.read(9), Some(9));
    }

    #[test]
    fn worker_runs_to_exhaustion() {
        let (trace, s) = counter_trace(10);
        let oracle: Arc<dyn TraceOracle> = Arc::new(trace);
        let slot = Arc::new(JitSlot::new(s, 0, 10, 4));
        let active = Arc::new(AtomicU32::new(1));
        let first = Arc::new(AtomicU64::new(0));
        let worker = Worker {
            name: "top.count".to_string(),
            slot: Arc::clone(&slot),
            oracle,
            active: Arc::clone(&active),
            first_windows: Arc::clone(&first),
            verbose: false,
        };
        let handle = std::thread::spawn(move || worker.run());
        while !slot.is_ready() {
            std::thread::yield_now();
        }
        assert_eq!(slot.finished(), 4);
        slot.continuation().request();
        while slot.finished() < 8 {
            std::thread::yield_now();
        }
        slot.continuation().request();
        handle.join().unwrap();
        assert!(slot.is_exhausted());
        assert_eq!(slot.finished(), 10);
        assert_eq!(active.load(Ordering::Acquire), 0);
        assert_eq!(first.load(Ordering::Relaxed), 1);
        for i in 0..10 {
            assert_eq!(slot.read(i), Some(i as u32));
        }
    }

    #[test]
    fn shutdown_releases_worker() {
        let (trace, s) = counter_trace(10);
        let slot = Arc::new(JitSlot::new(s, 0, 10, 2));
        let active = Arc::new(AtomicU32::new(1));
        let worker = Worker {
            name: "top.count".to_string(),
            slot: Arc::clone(&slot),
            oracle: Arc::new(trace),
            active: Arc::clone(&active),
            first_windows: Arc::new(AtomicU64::new(0)),
            verbose: true,
        };
        let handle = std::thread::spawn(move || worker.run());
        while !slot.is_ready() {
            std::thread::yield_now();
        }
        slot.continuation().shutdown();
        handle.join().unwrap();
        assert!(!slot.is_exhausted());
        assert_eq!(active.load(Ordering::Acquire), 0);
    }
}
