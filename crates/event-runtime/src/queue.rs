//! Per-priority active queues.
//!
//! Each priority level is an insertion-ordered list of events awaiting
//! callback dispatch this iteration. Lower-numbered priorities are
//! drained first; there is no fairness between levels. A steady stream
//! of priority-0 activity can starve lower-priority events indefinitely
//! — this is intentional, matching the reactor this crate is modeled on.

use event_core::EventId;
use std::collections::VecDeque;

pub struct ActiveQueues {
    queues: Vec<VecDeque<EventId>>,
}

impl ActiveQueues {
    pub fn new(priorities: u32) -> Self {
        let count = priorities.max(1) as usize;
        ActiveQueues { queues: (0..count).map(|_| VecDeque::new()).collect() }
    }

    pub fn priorities(&self) -> u32 {
        self.queues.len() as u32
    }

    /// Reallocates to `priorities` levels. Caller must ensure no event is
    /// currently active (checked by the reactor, per `set_priorities`'s
    /// contract) since existing queue contents would otherwise be lost.
    pub fn resize(&mut self, priorities: u32) {
        let count = priorities.max(1) as usize;
        self.queues = (0..count).map(|_| VecDeque::new()).collect();
    }

    pub fn push(&mut self, priority: event_core::Priority, event: EventId) {
        let idx = priority.as_usize().min(self.queues.len() - 1);
        self.queues[idx].push_back(event);
    }

    pub fn remove(&mut self, priority: event_core::Priority, event: EventId) -> bool {
        let idx = priority.as_usize().min(self.queues.len() - 1);
        if let Some(pos) = self.queues[idx].iter().position(|&e| e == event) {
            self.queues[idx].remove(pos);
            true
        } else {
            false
        }
    }

    /// Index of the lowest-numbered non-empty queue, chosen once per
    /// iteration; the reactor drains exactly that queue before
    /// reconsidering which level to dispatch next.
    pub fn lowest_nonempty(&self) -> Option<usize> {
        self.queues.iter().position(|q| !q.is_empty())
    }

    pub fn pop_front(&mut self, idx: usize) -> Option<EventId> {
        self.queues.get_mut(idx).and_then(|q| q.pop_front())
    }

    pub fn total_len(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }
}
