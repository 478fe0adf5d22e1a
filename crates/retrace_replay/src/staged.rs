//! Collections whose mutations are deferred to explicit flush points.
//!
//! Callbacks may register or remove other callbacks while the engine is
//! walking a live collection. A [`Staged`] collection records those requests
//! in a pending queue and applies them, in request order, only when the
//! engine calls [`Staged::flush`].

use std::cmp::Ordering;
use std::collections::{BTreeMap, BinaryHeap};

/// A collection that can absorb staged additions and removals.
pub trait StagedCollection: Default {
    /// The element added by a staged addition.
    type Item;
    /// The key named by a staged removal.
    type Key;

    /// Adds an element.
    fn add(&mut self, item: Self::Item);

    /// Removes the element(s) with `key`. Unknown keys are ignored.
    fn remove(&mut self, key: &Self::Key);
}

/// A pending mutation.
pub enum Change<I, K> {
    /// Add an item.
    Add(I),
    /// Remove the item with this key.
    Remove(K),
}

/// A live collection plus a queue of mutations not yet applied to it.
pub struct Staged<C: StagedCollection> {
    live: C,
    pending: Vec<Change<C::Item, C::Key>>,
}

impl<C: StagedCollection> Default for Staged<C> {
    fn default() -> Self {
        Self {
            live: C::default(),
            pending: Vec::new(),
        }
    }
}

impl<C: StagedCollection> Staged<C> {
    /// Queues an addition.
    pub fn stage_add(&mut self, item: C::Item) {
        self.pending.push(Change::Add(item));
    }

    /// Queues a removal.
    pub fn stage_remove(&mut self, key: C::Key) {
        self.pending.push(Change::Remove(key));
    }

    /// Applies every pending change to the live collection, in order.
    pub fn flush(&mut self) {
        for change in self.pending.drain(..) {
            match change {
                Change::Add(item) => self.live.add(item),
                Change::Remove(key) => self.live.remove(&key),
            }
        }
    }

    /// Returns the live collection.
    pub fn live(&self) -> &C {
        &self.live
    }

    /// Returns the live collection for in-place iteration by the engine.
    pub fn live_mut(&mut self) -> &mut C {
        &mut self.live
    }

    /// Detaches the live collection so it can be walked while callbacks run.
    ///
    /// Pending changes stay queued. Pair with [`Staged::restore`].
    pub fn take_snapshot(&mut self) -> C {
        std::mem::take(&mut self.live)
    }

    /// Reattaches a collection detached by [`Staged::take_snapshot`].
    pub fn restore(&mut self, live: C) {
        self.live = live;
    }

    /// Returns `true` if a removal of `key` is queued.
    ///
    /// Dispatch loops use this to skip entries removed since the last flush.
    /// Keys are never reused, so a queued removal always wins.
    pub fn is_removal_pending(&self, key: &C::Key) -> bool
    where
        C::Key: PartialEq,
    {
        self.pending
            .iter()
            .any(|change| matches!(change, Change::Remove(k) if k == key))
    }

    /// Returns the number of queued changes.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// An element that knows its own removal key.
pub trait Keyed {
    /// The key type.
    type Key: PartialEq;
    /// Returns this element's key.
    fn key(&self) -> &Self::Key;
}

impl<K: Ord, V> StagedCollection for BTreeMap<K, V> {
    type Item = (K, V);
    type Key = K;

    fn add(&mut self, (key, value): (K, V)) {
        self.insert(key, value);
    }

    fn remove(&mut self, key: &K) {
        BTreeMap::remove(self, key);
    }
}

impl<T: Keyed> StagedCollection for Vec<T> {
    type Item = T;
    type Key = T::Key;

    fn add(&mut self, item: T) {
        self.push(item);
    }

    fn remove(&mut self, key: &T::Key) {
        self.retain(|item| item.key() != key);
    }
}

/// A min-queue of elements ordered by [`Ord`], removable by key.
pub struct TimerQueue<T> {
    heap: BinaryHeap<MinFirst<T>>,
}

impl<T> Default for TimerQueue<T> {
    fn default() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }
}

impl<T: Ord> TimerQueue<T> {
    /// Returns the smallest element without removing it.
    pub fn peek(&self) -> Option<&T> {
        self.heap.peek().map(|e| &e.0)
    }

    /// Removes and returns the smallest element if `due` accepts it.
    pub fn pop_if(&mut self, due: impl FnOnce(&T) -> bool) -> Option<T> {
        if due(self.peek()?) {
            self.heap.pop().map(|e| e.0)
        } else {
            None
        }
    }

    /// Returns the number of queued elements.
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T: Ord + Keyed> StagedCollection for TimerQueue<T> {
    type Item = T;
    type Key = T::Key;

    fn add(&mut self, item: T) {
        self.heap.push(MinFirst(item));
    }

    fn remove(&mut self, key: &T::Key) {
        self.heap.retain(|e| e.0.key() != key);
    }
}

struct MinFirst<T>(T);

impl<T: Ord> PartialEq for MinFirst<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: Ord> Eq for MinFirst<T> {}

impl<T: Ord> PartialOrd for MinFirst<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: Ord> Ord for MinFirst<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        other.0.cmp(&self.0)
    }
}
