//! The reactor core: event slab, timer heap, active queues, backend and
//! signal trampoline, and the main dispatch loop.

use crate::backend::{self, Backend};
use crate::config::ReactorConfig;
use crate::event::{Binding, Callback, EventSlot, UserArg};
use crate::queue::ActiveQueues;
use crate::signal::SignalInfo;
use crate::heap::TimerHeap;
use crate::time::{Instant, TimeSource};
use event_core::{edebug, EventError, EventId, EventResult, Mask, Priority};
use std::collections::HashMap;
use std::time::Duration;

/// Result of a completed main-loop call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopOutcome {
    /// At least one iteration ran and there may be more work to do.
    Ran,
    /// No events are registered; there is nothing left to wait on.
    NoEvents,
    /// `loop_exit`/`loop_break` (or a single-pass flag) ended the loop.
    Exited,
}

pub struct Reactor {
    config: ReactorConfig,
    time: TimeSource,
    heap: TimerHeap,
    active: ActiveQueues,
    backend: Box<dyn Backend>,
    signal_info: SignalInfo,
    signal_subscribers: HashMap<i32, Vec<EventId>>,
    self_pipe_event: EventId,
    slab: Vec<Option<EventSlot>>,
    free_list: Vec<u32>,
    registered: usize,
    got_term: bool,
    got_break: bool,
}

impl Reactor {
    /// Allocates a reactor using `ReactorConfig::from_env()`. Aborts the
    /// process if no backend can be initialized, matching the source's
    /// fatal-allocation-failure semantics (there is no recoverable path).
    pub fn create() -> Self {
        Self::with_config(ReactorConfig::from_env())
    }

    pub fn with_config(config: ReactorConfig) -> Self {
        let backend = backend::select(config.no_epoll, config.no_poll, config.show_method)
            .unwrap_or_else(|e| panic!("event: no backend available: {e}"));
        let signal_info = SignalInfo::new().unwrap_or_else(|e| panic!("event: signal pipe setup failed: {e}"));

        let mut slab = Vec::new();
        let self_pipe_event = EventId::new(0);
        slab.push(None);

        let mut reactor = Reactor {
            config: config.clone(),
            time: TimeSource::new(),
            heap: TimerHeap::new(),
            active: ActiveQueues::new(config.priorities),
            backend,
            signal_info,
            signal_subscribers: HashMap::new(),
            self_pipe_event,
            slab,
            free_list: Vec::new(),
            registered: 0,
            got_term: false,
            got_break: false,
        };

        let fd = reactor.signal_info.read_fd();
        let binding = Binding::Fd { fd, interest: Mask::READABLE };
        let mut slot = EventSlot::new(binding, true, Priority::new(0), Box::new(|_, _, _, _, _| {}), Box::new(()));
        slot.internal_only = true;
        reactor.slab[0] = Some(slot);
        reactor.registered = 1;
        reactor
    }

    pub fn get_method(&self) -> &'static str {
        self.backend.name()
    }

    pub fn get_version() -> &'static str {
        env!("CARGO_PKG_VERSION")
    }

    /// May only be called while no event is active; existing events keep
    /// whatever priority number they were bound with, in range or not.
    pub fn set_priorities(&mut self, priorities: u32) -> EventResult<()> {
        if !self.active.is_empty() {
            return Err(EventError::PrioritiesBusy);
        }
        self.active.resize(priorities);
        self.config.priorities = priorities;
        Ok(())
    }

    /// Builds an event record ready for [`Reactor::bind_to_reactor`].
    /// Default priority is `priorities / 2`, mirroring `create()`'s
    /// single-priority default.
    pub fn set_event(&self, binding: Binding, persist: bool, callback: Callback, arg: UserArg) -> EventSlot {
        EventSlot::new(binding, persist, Priority::default_for(self.active.priorities()), callback, arg)
    }

    /// Associates ownership: the reactor's slab now owns `slot` and hands
    /// back an opaque [`EventId`] handle.
    pub fn bind_to_reactor(&mut self, slot: EventSlot) -> EventResult<EventId> {
        if !slot.state.initialized {
            return Err(EventError::InvalidState("event not initialized"));
        }
        let id = self.alloc_slot(slot);
        self.registered += 1;
        Ok(id)
    }

    fn alloc_slot(&mut self, slot: EventSlot) -> EventId {
        if let Some(idx) = self.free_list.pop() {
            self.slab[idx as usize] = Some(slot);
            EventId::new(idx)
        } else {
            let idx = self.slab.len() as u32;
            self.slab.push(Some(slot));
            EventId::new(idx)
        }
    }

    fn slot(&self, id: EventId) -> Option<&EventSlot> {
        self.slab.get(id.as_usize())?.as_ref()
    }

    fn slot_mut(&mut self, id: EventId) -> Option<&mut EventSlot> {
        self.slab.get_mut(id.as_usize())?.as_mut()
    }

    fn heap_push(&mut self, expiry: Instant, id: EventId) {
        let slab = &mut self.slab;
        let idx = self.heap.push(expiry, id, |ev, idx| {
            if let Some(Some(s)) = slab.get_mut(ev.as_usize()) {
                s.heap_index = Some(idx);
            }
        });
        if let Some(slot) = self.slot_mut(id) {
            slot.heap_index = Some(idx);
            slot.timeout = Some(expiry);
            slot.state.in_timer_heap = true;
        }
    }

    fn heap_erase(&mut self, index: usize) -> Option<EventId> {
        let slab = &mut self.slab;
        let removed = self.heap.erase(index, |ev, idx| {
            if let Some(Some(s)) = slab.get_mut(ev.as_usize()) {
                s.heap_index = Some(idx);
            }
        });
        if let Some(id) = removed {
            if let Some(slot) = self.slab.get_mut(id.as_usize()).and_then(|s| s.as_mut()) {
                slot.heap_index = None;
                slot.state.in_timer_heap = false;
            }
        }
        removed
    }

    /// Semi-atomic registration: see the ordering notes colocated with
    /// this method's tests.
    pub fn add(&mut self, id: EventId, timeout: Option<Duration>) -> EventResult<()> {
        let (wants_backend, wants_signal, signo, in_timer_heap, heap_index, in_active_with_timeout_only, priority) = {
            let slot = self.slot(id).ok_or(EventError::InvalidState("unknown event"))?;
            (
                slot.binding.wants_backend_registration() && !slot.state.inserted,
                slot.binding.wants_signal_registration() && !slot.state.inserted,
                slot.binding.signo(),
                slot.state.in_timer_heap,
                slot.heap_index,
                slot.state.in_active_queue && slot.delivered == Mask::TIMEOUT,
                slot.priority,
            )
        };

        // Step 1: pre-grow the heap so the later push cannot fail.
        if timeout.is_some() && !in_timer_heap {
            self.heap.reserve_one();
        }

        // Step 2: backend/signal registration.
        if wants_backend {
            let binding = self.slot(id).unwrap().binding;
            self.backend.add(id, &binding)?;
            self.slot_mut(id).unwrap().state.inserted = true;
        } else if wants_signal {
            let signo = signo.expect("signal binding carries a signo");
            self.signal_info.subscribe(signo)?;
            self.signal_subscribers.entry(signo).or_default().push(id);
            self.slot_mut(id).unwrap().state.inserted = true;
            if !self.signal_info.pipe_is_registered() {
                let pipe_binding = self.slot(self.self_pipe_event).unwrap().binding;
                self.backend.add(self.self_pipe_event, &pipe_binding)?;
                self.signal_info.mark_pipe_registered(true);
            }
        }

        // Step 3: if already in the heap, erase the stale entry.
        if timeout.is_some() && in_timer_heap {
            if let Some(idx) = heap_index {
                self.heap_erase(idx);
            }
        }

        // Step 4: drop a timeout-only active-queue membership and
        // neutralize any in-flight dispatch of it.
        if in_active_with_timeout_only {
            self.active.remove(priority, id);
            if let Some(slot) = self.slot_mut(id) {
                slot.state.in_active_queue = false;
                slot.ncalls = None;
            }
        }

        // Step 5: compute absolute expiry and push.
        if let Some(timeout) = timeout {
            let now = self.time.now();
            let expiry = now.saturating_add(timeout);
            self.heap_push(expiry, id);
        }

        Ok(())
    }

    /// Removes `id` from every queue it belongs to and, if registered,
    /// deregisters it from the backend or signal trampoline. Safe to call
    /// from within the currently-dispatching event's own callback.
    pub fn del(&mut self, id: EventId) -> EventResult<()> {
        let Some(slot) = self.slab.get(id.as_usize()).and_then(|s| s.as_ref()) else {
            return Ok(());
        };
        let priority = slot.priority;
        let in_active_queue = slot.state.in_active_queue;
        let in_timer_heap = slot.state.in_timer_heap;
        let heap_index = slot.heap_index;
        let inserted = slot.state.inserted;
        let binding = slot.binding;

        if in_active_queue {
            self.active.remove(priority, id);
        }
        if in_timer_heap {
            if let Some(idx) = heap_index {
                self.heap_erase(idx);
            }
        }
        if inserted {
            if binding.wants_backend_registration() {
                self.backend.del(id, &binding)?;
            } else if let Some(signo) = binding.signo() {
                if let Some(subs) = self.signal_subscribers.get_mut(&signo) {
                    subs.retain(|&e| e != id);
                    if subs.is_empty() {
                        self.signal_subscribers.remove(&signo);
                    }
                }
                self.signal_info.unsubscribe(signo)?;
                if !self.signal_info.has_subscribers() && self.signal_info.pipe_is_registered() {
                    let pipe_binding = self.slot(self.self_pipe_event).unwrap().binding;
                    let _ = self.backend.del(self.self_pipe_event, &pipe_binding);
                    self.signal_info.mark_pipe_registered(false);
                }
            }
        }

        if let Some(slot) = self.slot_mut(id) {
            slot.state.in_active_queue = false;
            slot.state.in_timer_heap = false;
            slot.state.inserted = false;
            slot.ncalls = None;
        }
        Ok(())
    }

    /// Force-activates `id`: if already active, the masks are combined;
    /// otherwise the event is enqueued on its priority level.
    pub fn active(&mut self, id: EventId, mask: Mask, ncalls: u32) -> EventResult<()> {
        let Some(slot) = self.slot_mut(id) else {
            return Err(EventError::InvalidState("unknown event"));
        };
        if slot.state.in_active_queue {
            slot.delivered.insert(mask);
            return Ok(());
        }
        slot.delivered = mask;
        slot.requested_calls = ncalls;
        slot.state.in_active_queue = true;
        let priority = slot.priority;
        self.active.push(priority, id);
        Ok(())
    }

    /// Whether `id` is currently registered (inserted, active, or timed).
    /// When `id` carries a timeout, `out_remaining` receives the time
    /// left until expiry.
    pub fn pending(&mut self, id: EventId, out_remaining: Option<&mut Option<Duration>>) -> bool {
        let Some(slot) = self.slot(id) else { return false };
        let is_pending = slot.state.inserted || slot.state.in_active_queue || slot.state.in_timer_heap;
        if let (Some(out), Some(expiry)) = (out_remaining, slot.timeout) {
            let now = self.time.now();
            *out = expiry.checked_sub(now);
        }
        is_pending
    }

    /// Deregisters `id` and releases its slab slot. Not part of the
    /// original's operation set (there, the caller owns event memory and
    /// frees it whenever it likes); since this reactor owns event storage
    /// in a slab, something has to play that role, and this is it.
    pub fn destroy_event(&mut self, id: EventId) -> EventResult<()> {
        self.del(id)?;
        if self.slab.get(id.as_usize()).and_then(|s| s.as_ref()).is_some() {
            self.slab[id.as_usize()] = None;
            self.free_list.push(id.as_u32());
            self.registered = self.registered.saturating_sub(1);
        }
        Ok(())
    }

    /// Registers a one-shot wrapper around `callback` that frees itself
    /// after its single invocation. Rejects signal bindings: a signal
    /// binding is inherently persistent (coalesced counts only make sense
    /// across repeated deliveries).
    pub fn once(&mut self, binding: Binding, timeout: Option<Duration>, mut callback: Callback) -> EventResult<EventId> {
        if binding.wants_signal_registration() {
            return Err(EventError::OnceRejectsSignal);
        }
        let wrapper: Callback = Box::new(move |reactor, id, b, mask, arg| {
            callback(reactor, id, b, mask, arg);
            let _ = reactor.destroy_event(id);
        });
        let slot = self.set_event(binding, false, wrapper, Box::new(()));
        let id = self.bind_to_reactor(slot)?;
        if let Some(slot) = self.slot_mut(id) {
            slot.internal_only = true;
        }
        self.add(id, timeout)?;
        Ok(id)
    }

    pub fn loop_exit(&mut self, delay: Option<Duration>) -> EventResult<()> {
        match delay {
            None => {
                self.got_term = true;
                Ok(())
            }
            Some(delay) => {
                let id = self.once(
                    Binding::Timer,
                    Some(delay),
                    Box::new(|reactor, _, _, _, _| {
                        reactor.got_term = true;
                    }),
                )?;
                if let Some(slot) = self.slot_mut(id) {
                    slot.internal_only = true;
                }
                Ok(())
            }
        }
    }

    pub fn loop_break(&mut self) {
        self.got_break = true;
    }

    /// Runs the main loop until termination or (for a single-pass flag)
    /// one iteration. See the module's tests for scenario coverage.
    pub fn run(&mut self, flags: event_core::LoopFlags) -> EventResult<LoopOutcome> {
        loop {
            if self.got_term || self.got_break {
                self.got_term = false;
                self.got_break = false;
                return Ok(LoopOutcome::Exited);
            }

            self.time.correct_time(&mut self.heap);

            let wait_for = if self.active.is_empty() && !flags.non_blocking {
                self.heap.peek().map(|(_, expiry)| expiry)
            } else {
                Some(self.time.now())
            };

            if self.registered == 0 {
                return Ok(LoopOutcome::NoEvents);
            }

            self.time.clear_cache();
            let now = self.time.now();

            let mut ready = Vec::new();
            self.backend.dispatch(wait_for, now, &mut ready)?;
            self.time.set_cache(now);

            for r in ready {
                if r.event == self.self_pipe_event {
                    self.drain_signals()?;
                } else {
                    self.active(r.event, r.delivered, 1)?;
                }
            }

            while let Some((id, expiry)) = self.heap.peek() {
                if expiry > now {
                    break;
                }
                self.del(id)?;
                self.active(id, Mask::TIMEOUT, 1)?;
            }

            if !self.active.is_empty() {
                if let Some(idx) = self.active.lowest_nonempty() {
                    self.drain_priority_level(idx)?;
                }
            }

            if flags.single_pass() {
                return Ok(LoopOutcome::Ran);
            }
        }
    }

    fn drain_signals(&mut self) -> EventResult<()> {
        for delivery in self.signal_info.drain() {
            if let Some(ids) = self.signal_subscribers.get(&delivery.signo) {
                for &id in ids.clone().iter() {
                    self.active(id, Mask::SIGNAL, delivery.ncalls)?;
                }
            }
        }
        Ok(())
    }

    fn drain_priority_level(&mut self, idx: usize) -> EventResult<()> {
        while let Some(id) = self.active.pop_front(idx) {
            let Some((persist, delivered, requested)) = self.slot_mut(id).map(|s| {
                s.state.in_active_queue = false;
                (s.persist, s.delivered, s.requested_calls)
            }) else {
                continue;
            };

            if !persist {
                self.del(id)?;
            }

            if let Some(slot) = self.slot_mut(id) {
                slot.ncalls = Some(requested);
            } else {
                continue;
            }

            self.dispatch_one(id, delivered);

            if let Some(slot) = self.slot_mut(id) {
                slot.ncalls = None;
            }

            if self.got_break || self.got_term {
                break;
            }
        }
        Ok(())
    }

    /// Invokes `id`'s callback up to `slot.ncalls` times, stopping early
    /// if a reentrant `del` (including the event deleting itself) zeroes
    /// that counter, or if the slot disappears entirely via
    /// `destroy_event` called from within the callback.
    fn dispatch_one(&mut self, id: EventId, delivered: Mask) {
        let (binding_int, mut callback, mut arg) = {
            let Some(slot) = self.slot_mut(id) else { return };
            let binding_int = slot.binding_as_int();
            let callback = std::mem::replace(&mut slot.callback, Box::new(|_, _, _, _, _| {}));
            let arg = std::mem::replace(&mut slot.arg, Box::new(()));
            (binding_int, callback, arg)
        };

        loop {
            if self.got_break || self.got_term {
                break;
            }
            let remaining = match self.slot(id).and_then(|s| s.ncalls) {
                Some(n) if n > 0 => n,
                _ => break,
            };

            callback(self, id, binding_int, delivered, arg.as_mut());

            match self.slot_mut(id) {
                Some(slot) => {
                    slot.ncalls = match slot.ncalls {
                        Some(n) if n > 1 && n <= remaining => Some(n - 1),
                        _ => None,
                    };
                }
                None => return,
            }
        }

        if let Some(slot) = self.slot_mut(id) {
            slot.callback = callback;
            slot.arg = arg;
        }
    }
}

impl Drop for Reactor {
    /// Deletes every non-internal event, drains the timer heap, and lets
    /// the backend and signal trampoline release their own resources via
    /// their own `Drop` impls.
    fn drop(&mut self) {
        let ids: Vec<EventId> = self
            .slab
            .iter()
            .enumerate()
            .filter_map(|(i, s)| match s {
                Some(slot) if !slot.internal_only => Some(EventId::new(i as u32)),
                _ => None,
            })
            .collect();
        for id in ids {
            let _ = self.del(id);
        }
        while self.heap.pop(|_, _| {}).is_some() {}
        edebug!("reactor dropped, backend {}", self.backend.name());
    }
}
