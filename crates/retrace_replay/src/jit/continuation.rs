//! Park/resume hand-off between the replay loop and one optimizer thread.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What a parked worker should do after waking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resume {
    /// Produce the next window.
    Continue,
    /// Exit without producing more.
    Shutdown,
}

#[derive(Debug, Default)]
struct State {
    pending: bool,
    shutdown: bool,
}

/// A one-slot request flag paired with a condition variable.
///
/// The main path calls [`Continuation::request`], which never waits on the
/// worker. The worker blocks in [`Continuation::park`] until a request or a
/// shutdown arrives.
#[derive(Debug, Default)]
pub struct Continuation {
    state: Mutex<State>,
    wake: Condvar,
}

impl Continuation {
    /// Creates a continuation with nothing pending.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Asks the worker for another window.
    ///
    /// Returns `false` if a request was already pending or the worker is
    /// shutting down.
    pub fn request(&self) -> bool {
        let mut state = self.lock();
        if state.pending || state.shutdown {
            return false;
        }
        state.pending = true;
        self.wake.notify_one();
        true
    }

    /// Returns `true` while a request has not been picked up yet.
    pub fn is_pending(&self) -> bool {
        self.lock().pending
    }

    /// Tells the worker to exit, waking it if parked.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        state.shutdown = true;
        self.wake.notify_all();
    }

    /// Blocks until a request or a shutdown arrives, consuming the request.
    ///
    /// Shutdown wins over a pending request.
    pub fn park(&self) -> Resume {
        let mut state = self.lock();
        loop {
            if state.shutdown {
                return Resume::Shutdown;
            }
            if state.pending {
                state.pending = false;
                return Resume::Continue;
            }
            state = self
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}
