//! # event-core
//!
//! Platform-agnostic types shared by the reactor crates: the event
//! handle, the interest/delivery bitmask, error taxonomy, logging
//! macros, and environment-variable helpers. All OS-specific code
//! (backends, the signal trampoline, the timer heap, the reactor
//! itself) lives in `event-runtime`.
//!
//! ## Modules
//!
//! - `id` - event handle type (`EventId`)
//! - `mask` - interest/delivered bitmask and priority
//! - `error` - error types
//! - `log` - stderr logging macros
//! - `env` - environment variable helpers

#![allow(dead_code)]

pub mod env;
pub mod error;
pub mod id;
pub mod log;
pub mod mask;

pub use env::{env_get, env_get_bool, env_get_opt, env_get_str, env_is_set};
pub use error::{EventError, EventResult};
pub use id::EventId;
pub use mask::{Interest, LoopFlags, Mask, Priority};

/// Crate-wide constants.
pub mod constants {
    /// Default number of active-queue priority levels a freshly created
    /// reactor is configured with.
    pub const DEFAULT_PRIORITIES: u32 = 1;

    /// Sentinel signal number meaning "no signal".
    pub const NO_SIGNAL: i32 = -1;
}
