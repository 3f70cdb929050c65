//! Reactor configuration.

use event_core::constants::DEFAULT_PRIORITIES;
use event_core::env::{env_get, env_is_set};

/// Configuration for a [`crate::reactor::Reactor`].
#[derive(Debug, Clone)]
pub struct ReactorConfig {
    /// Number of active-queue priority levels.
    pub priorities: u32,

    /// Skip the epoll backend during selection.
    pub no_epoll: bool,

    /// Skip the poll backend during selection.
    pub no_poll: bool,

    /// Emit the chosen backend name to the error stream at creation.
    pub show_method: bool,
}

impl Default for ReactorConfig {
    fn default() -> Self {
        Self {
            priorities: DEFAULT_PRIORITIES,
            no_epoll: false,
            no_poll: false,
            show_method: false,
        }
    }
}

impl ReactorConfig {
    /// Compiled-in defaults, no environment access.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads `EVENT_DEFAULT_PRIORITIES`, `EVENT_NOEPOLL`, `EVENT_NOPOLL`
    /// and `EVENT_SHOW_METHOD` to build a config, falling back to
    /// compiled-in defaults for anything unset. The three flags are
    /// checked for mere presence, not a truthy value, matching the
    /// original's `evutil_getenv(...) != NULL`.
    pub fn from_env() -> Self {
        Self {
            priorities: env_get("EVENT_DEFAULT_PRIORITIES", DEFAULT_PRIORITIES),
            no_epoll: env_is_set("EVENT_NOEPOLL"),
            no_poll: env_is_set("EVENT_NOPOLL"),
            show_method: env_is_set("EVENT_SHOW_METHOD"),
        }
    }

    pub fn priorities(mut self, n: u32) -> Self {
        self.priorities = n;
        self
    }

    pub fn no_epoll(mut self, disable: bool) -> Self {
        self.no_epoll = disable;
        self
    }

    pub fn no_poll(mut self, disable: bool) -> Self {
        self.no_poll = disable;
        self
    }

    pub fn show_method(mut self, show: bool) -> Self {
        self.show_method = show;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_create() {
        let config = ReactorConfig::new();
        assert_eq!(config.priorities, 1);
        assert!(!config.no_epoll);
        assert!(!config.no_poll);
        assert!(!config.show_method);
    }

    #[test]
    fn builder_overrides_fields() {
        let config = ReactorConfig::new().priorities(4).no_epoll(true).show_method(true);
        assert_eq!(config.priorities, 4);
        assert!(config.no_epoll);
        assert!(!config.no_poll);
        assert!(config.show_method);
    }
}
