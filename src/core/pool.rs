//! Array-backed min-heap with cached positions.
//!
//! Entries are stored in slots that never move; the heap itself is a vector of
//! slot ids. Every slot caches its current heap position so an entry whose key
//! changed can be removed in O(log n) without a scan. Positions are written
//! only by the pool's own swap, which [`Pool::push`], [`Pool::pop_min`] and
//! [`Pool::remove_at`] are built from.
//!
//! A slot is either *queued* (present in the heap, position `Some`) or
//! *detached* (position `None`). Mutable access is handed out for detached
//! slots only, so a key can never change underneath the heap ordering.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::error::PoolError;

/// Ordering key for entries stored in a [`Pool`].
pub trait Ranked {
    /// Key type; smaller keys sit closer to the root.
    type Rank: Ord;

    /// Current key of this entry.
    fn rank(&self) -> Self::Rank;
}

/// Stable handle to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlotId(usize);

impl SlotId {
    /// Create a slot id from its raw index.
    #[must_use]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Raw slot index.
    #[must_use]
    pub const fn get(self) -> usize {
        self.0
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug)]
struct Slot<T> {
    item: T,
    position: Option<usize>,
}

/// Priority collection ordered by [`Ranked::rank`], smallest first.
#[derive(Debug)]
pub struct Pool<T> {
    slots: Vec<Slot<T>>,
    heap: Vec<SlotId>,
}

impl<T> Default for Pool<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            heap: Vec::new(),
        }
    }
}

impl<T: Ranked> Pool<T> {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty pool with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            heap: Vec::with_capacity(capacity),
        }
    }

    /// Store a new entry and queue it.
    pub fn insert(&mut self, item: T) -> SlotId {
        let id = SlotId(self.slots.len());
        self.slots.push(Slot {
            item,
            position: None,
        });
        let last = self.heap.len();
        self.heap.push(id);
        self.slots[id.0].position = Some(last);
        self.sift_up(last);
        id
    }

    /// Queue a detached slot, restoring the heap by sifting up.
    ///
    /// Returns the position the entry settled at.
    ///
    /// # Errors
    ///
    /// `UnknownSlot` for a foreign id, `AlreadyQueued` if the slot is in the heap.
    pub fn push(&mut self, id: SlotId) -> Result<usize, PoolError> {
        let slot = self.slots.get_mut(id.0).ok_or(PoolError::UnknownSlot(id))?;
        if slot.position.is_some() {
            return Err(PoolError::AlreadyQueued(id));
        }
        let last = self.heap.len();
        slot.position = Some(last);
        self.heap.push(id);
        Ok(self.sift_up(last))
    }

    /// Detach and return the entry with the smallest rank.
    ///
    /// # Errors
    ///
    /// `Empty` when no entry is queued.
    pub fn pop_min(&mut self) -> Result<SlotId, PoolError> {
        if self.heap.is_empty() {
            return Err(PoolError::Empty);
        }
        self.remove_at(0)
    }

    /// Detach and return the entry at heap position `index`.
    ///
    /// The last entry is swapped into `index`, the heap is truncated, and the
    /// moved entry is sifted down or up, whichever applies.
    ///
    /// # Errors
    ///
    /// `IndexOutOfBounds` if `index` is past the end of the heap.
    pub fn remove_at(&mut self, index: usize) -> Result<SlotId, PoolError> {
        let len = self.heap.len();
        if index >= len {
            return Err(PoolError::IndexOutOfBounds { index, len });
        }
        let last = len - 1;
        if index != last {
            self.swap(index, last);
        }
        let id = self.heap.pop().ok_or(PoolError::Empty)?;
        self.slots[id.0].position = None;
        if index < self.heap.len() && !self.sift_down(index) {
            self.sift_up(index);
        }
        Ok(id)
    }

    /// Id of the queued entry with the smallest rank.
    #[must_use]
    pub fn peek_min(&self) -> Option<SlotId> {
        self.heap.first().copied()
    }

    /// Current heap position of a slot, `None` when detached or unknown.
    #[must_use]
    pub fn position(&self, id: SlotId) -> Option<usize> {
        self.slots.get(id.0).and_then(|slot| slot.position)
    }

    /// Shared access to any slot.
    #[must_use]
    pub fn get(&self, id: SlotId) -> Option<&T> {
        self.slots.get(id.0).map(|slot| &slot.item)
    }

    /// Mutable access to a detached slot.
    ///
    /// Queued slots return `None`: their rank must not change in place.
    pub fn get_mut(&mut self, id: SlotId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0)
            .filter(|slot| slot.position.is_none())
            .map(|slot| &mut slot.item)
    }

    /// Iterate queued entries in heap order as `(position, id, entry)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, SlotId, &T)> + '_ {
        self.heap
            .iter()
            .enumerate()
            .map(|(position, &id)| (position, id, &self.slots[id.0].item))
    }

    /// Iterate every slot, queued or detached, in slot order.
    pub fn slots(&self) -> impl Iterator<Item = (SlotId, &T)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .map(|(index, slot)| (SlotId(index), &slot.item))
    }

    /// Number of queued entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether no entry is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Number of slots ever inserted, queued or not.
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Every non-root entry ranks no lower than its parent.
    #[must_use]
    pub fn is_heap(&self) -> bool {
        (1..self.heap.len()).all(|i| !self.less(i, (i - 1) / 2))
    }

    /// Every queued slot's cached position matches its place in the heap,
    /// and every other slot is detached.
    #[must_use]
    pub fn positions_consistent(&self) -> bool {
        let queued = self.heap.iter().enumerate().all(|(position, id)| {
            self.slots
                .get(id.0)
                .is_some_and(|slot| slot.position == Some(position))
        });
        let attached = self.slots.iter().filter(|slot| slot.position.is_some()).count();
        queued && attached == self.heap.len()
    }

    fn less(&self, i: usize, j: usize) -> bool {
        self.slots[self.heap[i].0].item.rank() < self.slots[self.heap[j].0].item.rank()
    }

    /// Exchange two heap positions and both cached positions with them.
    fn swap(&mut self, i: usize, j: usize) {
        self.heap.swap(i, j);
        self.slots[self.heap[i].0].position = Some(i);
        self.slots[self.heap[j].0].position = Some(j);
    }

    fn sift_up(&mut self, mut i: usize) -> usize {
        while i > 0 {
            let parent = (i - 1) / 2;
            if !self.less(i, parent) {
                break;
            }
            self.swap(i, parent);
            i = parent;
        }
        i
    }

    /// Returns whether the entry moved.
    fn sift_down(&mut self, start: usize) -> bool {
        let len = self.heap.len();
        let mut i = start;
        loop {
            let left = 2 * i + 1;
            if left >= len {
                break;
            }
            let right = left + 1;
            let child = if right < len && self.less(right, left) {
                right
            } else {
                left
            };
            if !self.less(child, i) {
                break;
            }
            self.swap(i, child);
            i = child;
        }
        i > start
    }
}
