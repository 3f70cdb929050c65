//! # event-runtime
//!
//! Backends, timer heap, signal trampoline and the reactor core: a
//! single-threaded, libevent-style event-notification loop over file
//! descriptor readiness, process signals, and timers.

#![allow(dead_code)]

pub mod backend;
pub mod config;
pub mod event;
pub mod heap;
pub mod queue;
pub mod reactor;
pub mod signal;
pub mod time;

pub use config::ReactorConfig;
pub use event::{Binding, Callback, UserArg};
pub use reactor::Reactor;
