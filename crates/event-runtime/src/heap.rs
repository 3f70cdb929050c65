//! Indexed binary min-heap of timers.
//!
//! Ordered by absolute expiry. Each entry remembers its own position so
//! that `erase` can remove an arbitrary element in O(log n) instead of
//! the lazy-cancellation approach used elsewhere in this codebase for
//! non-reactor timer queues — the reactor's invariants require a heap
//! entry's stored index to always equal its live position, so every
//! swap reports both moved elements through the `on_move` callback.

use crate::time::Instant;
use event_core::EventId;

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    expiry: Instant,
    event: EventId,
}

/// Binary min-heap keyed by `expiry`, supporting O(log n) erase-by-index.
///
/// Callers are expected to store the `usize` index handed back by `push`
/// (and kept current via the `on_move` callback on every later operation)
/// inside the event itself, per invariant 2 in the data model.
pub struct TimerHeap {
    entries: Vec<HeapEntry>,
}

impl TimerHeap {
    pub fn new() -> Self {
        TimerHeap { entries: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Grows backing storage by one slot without inserting, so a later
    /// `push` is guaranteed not to reallocate (and thus not to fail
    /// partway through a multi-step registration).
    pub fn reserve_one(&mut self) {
        self.entries.reserve(1);
    }

    /// Pushes a new entry and returns its final heap index.
    pub fn push(&mut self, expiry: Instant, event: EventId, mut on_move: impl FnMut(EventId, usize)) -> usize {
        let idx = self.entries.len();
        self.entries.push(HeapEntry { expiry, event });
        self.sift_up(idx, &mut on_move)
    }

    /// Removes the entry currently at `index`. Returns the removed event id.
    pub fn erase(&mut self, index: usize, mut on_move: impl FnMut(EventId, usize)) -> Option<EventId> {
        if index >= self.entries.len() {
            return None;
        }
        let last = self.entries.len() - 1;
        self.entries.swap(index, last);
        let removed = self.entries.pop().unwrap();
        if index < self.entries.len() {
            on_move(self.entries[index].event, index);
            let after_down = self.sift_down(index, &mut on_move);
            self.sift_up(after_down, &mut on_move);
        }
        Some(removed.event)
    }

    /// Returns `(event, expiry)` of the minimum element without removing it.
    pub fn peek(&self) -> Option<(EventId, Instant)> {
        self.entries.first().map(|e| (e.event, e.expiry))
    }

    /// Pops the minimum element.
    pub fn pop(&mut self, on_move: impl FnMut(EventId, usize)) -> Option<(EventId, Instant)> {
        let (event, expiry) = self.peek()?;
        self.erase(0, on_move);
        Some((event, expiry))
    }

    /// Shifts every key backward by `offset` (used by `correct_time` when
    /// the wall clock jumps backward). Order-preserving: every key moves
    /// by the same amount, so no re-heapify is required.
    pub fn shift_all_keys_backward(&mut self, offset: u64) {
        for e in &mut self.entries {
            e.expiry = Instant(e.expiry.0.saturating_sub(offset));
        }
    }

    fn sift_up(&mut self, mut idx: usize, on_move: &mut impl FnMut(EventId, usize)) -> usize {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if self.entries[parent].expiry <= self.entries[idx].expiry {
                break;
            }
            self.entries.swap(parent, idx);
            on_move(self.entries[idx].event, idx);
            on_move(self.entries[parent].event, parent);
            idx = parent;
        }
        idx
    }

    fn sift_down(&mut self, mut idx: usize, on_move: &mut impl FnMut(EventId, usize)) -> usize {
        let len = self.entries.len();
        loop {
            let left = 2 * idx + 1;
            let right = 2 * idx + 2;
            let mut smallest = idx;
            if left < len && self.entries[left].expiry < self.entries[smallest].expiry {
                smallest = left;
            }
            if right < len && self.entries[right].expiry < self.entries[smallest].expiry {
                smallest = right;
            }
            if smallest == idx {
                break;
            }
            self.entries.swap(idx, smallest);
            on_move(self.entries[idx].event, idx);
            on_move(self.entries[smallest].event, smallest);
            idx = smallest;
        }
        idx
    }
}

impl Default for TimerHeap {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn noop(_: EventId, _: usize) {}

    #[test]
    fn pops_in_expiry_order() {
        let mut heap = TimerHeap::new();
        for (i, t) in [50u64, 10, 30, 5, 40].into_iter().enumerate() {
            heap.push(Instant(t), EventId::new(i as u32), noop);
        }
        let mut popped = Vec::new();
        while let Some((id, expiry)) = heap.pop(noop) {
            popped.push((id.as_u32(), expiry.0));
        }
        let expiries: Vec<u64> = popped.iter().map(|(_, e)| *e).collect();
        assert_eq!(expiries, vec![5, 10, 30, 40, 50]);
    }

    #[test]
    fn erase_by_index_keeps_heap_consistent() {
        let mut heap = TimerHeap::new();
        let mut index_of: HashMap<u32, usize> = HashMap::new();
        for (i, t) in [20u64, 5, 15, 1, 8, 12].into_iter().enumerate() {
            let id = EventId::new(i as u32);
            let idx = heap.push(Instant(t), id, |ev, idx| {
                index_of.insert(ev.as_u32(), idx);
            });
            index_of.insert(id.as_u32(), idx);
        }
        // Event 3 carries expiry 1, the current minimum.
        let target_id = EventId::new(3);
        let target_idx = index_of[&3];
        let removed = heap.erase(target_idx, |ev, idx| {
            index_of.insert(ev.as_u32(), idx);
        });
        assert_eq!(removed, Some(target_id));
        assert_eq!(heap.len(), 5);
        assert_eq!(heap.peek().map(|(_, e)| e.0), Some(5));
    }

    #[test]
    fn stored_indices_stay_accurate_through_mutations() {
        let mut heap = TimerHeap::new();
        let mut index_of: HashMap<u32, usize> = HashMap::new();
        for (i, t) in [9u64, 3, 7, 1, 5, 2, 8, 4, 6].into_iter().enumerate() {
            let id = EventId::new(i as u32);
            let idx = heap.push(Instant(t), id, |ev, idx| {
                index_of.insert(ev.as_u32(), idx);
            });
            index_of.insert(id.as_u32(), idx);
        }
        for (id, &idx) in &index_of {
            assert_eq!(heap.entries[idx].event.as_u32(), *id);
        }
    }

    #[test]
    fn reserve_does_not_change_length() {
        let mut heap = TimerHeap::new();
        heap.reserve_one();
        assert_eq!(heap.len(), 0);
    }

    #[test]
    fn shift_all_keys_is_order_preserving() {
        let mut heap = TimerHeap::new();
        for (i, t) in [100u64, 50, 75].into_iter().enumerate() {
            heap.push(Instant(t), EventId::new(i as u32), noop);
        }
        heap.shift_all_keys_backward(10);
        let (_, top) = heap.peek().unwrap();
        assert_eq!(top.0, 40);
    }
}
