//! # event
//!
//! A single-threaded, libevent-style event-notification reactor:
//! readiness on file descriptors, process signals, and expiring timers,
//! each dispatched to a user callback from one cooperative loop.
//!
//! ## Quick Start
//!
//! ```ignore
//! use event::{Reactor, Binding, Mask, LoopFlags};
//! use std::time::Duration;
//!
//! let mut reactor = Reactor::create();
//! let slot = reactor.set_event(
//!     Binding::Timer,
//!     false,
//!     Box::new(|_reactor, _id, _binding, mask, _arg| {
//!         assert_eq!(mask, Mask::TIMEOUT);
//!         println!("fired");
//!     }),
//!     Box::new(()),
//! );
//! let id = reactor.bind_to_reactor(slot).unwrap();
//! reactor.add(id, Some(Duration::from_millis(50))).unwrap();
//! reactor.run(LoopFlags::ONCE).unwrap();
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                  User code                    │
//! │  set_event / bind_to_reactor / add / del / run │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │                    Reactor                     │
//! │   event slab, timer heap, active queues         │
//! └──────────────────────────────────────────────┘
//!            │              │              │
//!            ▼              ▼              ▼
//!      ┌──────────┐   ┌───────────┐  ┌────────────┐
//!      │ backend  │   │  signal   │  │ timer heap │
//!      │(epoll or │   │trampoline │  │ (min-heap) │
//!      │  poll)   │   │(self-pipe)│  │            │
//!      └──────────┘   └───────────┘  └────────────┘
//! ```

pub use event_core::{
    constants, eerror, edebug, einfo, etrace, ewarn, env_get, env_get_bool, env_get_opt,
    env_get_str, env_is_set, EventError, EventId, EventResult, Interest, LoopFlags, Mask,
    Priority,
};

pub use event_runtime::{Binding, Callback, Reactor, ReactorConfig, UserArg};
