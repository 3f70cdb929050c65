//! Monotonic/wall-clock time source with a per-iteration cache.
//!
//! Mirrors `gettime`/`detect_monotonic`/`timeout_correct` from the
//! reactor this crate is modeled on: prefer a monotonic clock, fall
//! back to the wall clock, and correct timer-heap keys in place if the
//! wall clock is ever observed to move backward.

use std::time::Duration;

#[cfg(unix)]
use nix::time::{clock_gettime, ClockId};

/// An absolute instant, expressed as nanoseconds since an arbitrary
/// epoch (monotonic mode) or since the Unix epoch (wall-clock mode).
/// Only differences within the same `TimeSource` are meaningful.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Instant(pub u64);

impl Instant {
    pub const ZERO: Instant = Instant(0);

    #[inline]
    pub fn checked_sub(self, other: Instant) -> Option<Duration> {
        self.0.checked_sub(other.0).map(Duration::from_nanos)
    }

    #[inline]
    pub fn saturating_add(self, d: Duration) -> Instant {
        Instant(self.0.saturating_add(d.as_nanos() as u64))
    }

    #[inline]
    pub fn saturating_sub_duration(self, d: Duration) -> Instant {
        Instant(self.0.saturating_sub(d.as_nanos() as u64))
    }
}

/// Reads the clock and caches the result for one loop iteration.
pub struct TimeSource {
    monotonic: bool,
    /// Previous iteration's reading, used to detect backward jumps.
    event_tv: Instant,
    /// Cached reading; `None` means "cache is clear, re-read on next get".
    tv_cache: Option<Instant>,
}

impl TimeSource {
    pub fn new() -> Self {
        let monotonic = detect_monotonic();
        let mut src = TimeSource { monotonic, event_tv: Instant::ZERO, tv_cache: None };
        src.event_tv = src.read_raw();
        src
    }

    pub fn is_monotonic(&self) -> bool {
        self.monotonic
    }

    /// Clears the per-iteration cache; the next `now()` call re-reads the clock.
    pub fn clear_cache(&mut self) {
        self.tv_cache = None;
    }

    /// Sets the cache to an already-known value (used right after the
    /// backend returns, so timer processing and callbacks share one
    /// instant instead of re-entering the OS).
    pub fn set_cache(&mut self, now: Instant) {
        self.tv_cache = Some(now);
    }

    /// Returns the cached value if present, else reads the clock and caches it.
    pub fn now(&mut self) -> Instant {
        if let Some(cached) = self.tv_cache {
            return cached;
        }
        let now = self.read_raw();
        self.tv_cache = Some(now);
        now
    }

    fn read_raw(&self) -> Instant {
        read_clock(self.monotonic)
    }

    /// Runs once per loop iteration before computing the next deadline.
    /// No-op under a monotonic clock. Under a wall clock: if time moved
    /// forward (or stayed put), just record it; if it moved backward,
    /// shift every key in the heap forward by the jump's magnitude so
    /// already-registered timers still fire at the same real-time instant.
    pub fn correct_time(&mut self, heap: &mut crate::heap::TimerHeap) {
        if self.monotonic {
            return;
        }
        let current = self.read_raw();
        if current >= self.event_tv {
            self.event_tv = current;
            return;
        }
        let offset = self.event_tv.0 - current.0;
        heap.shift_all_keys_backward(offset);
        self.event_tv = current;
    }
}

impl Default for TimeSource {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(unix)]
fn detect_monotonic() -> bool {
    clock_gettime(ClockId::CLOCK_MONOTONIC).is_ok()
}

#[cfg(not(unix))]
fn detect_monotonic() -> bool {
    false
}

#[cfg(unix)]
fn read_clock(monotonic: bool) -> Instant {
    let id = if monotonic { ClockId::CLOCK_MONOTONIC } else { ClockId::CLOCK_REALTIME };
    match clock_gettime(id) {
        Ok(ts) => Instant(ts.tv_sec() as u64 * 1_000_000_000 + ts.tv_nsec() as u64),
        Err(_) => Instant(0),
    }
}

#[cfg(not(unix))]
fn read_clock(_monotonic: bool) -> Instant {
    use std::time::{SystemTime, UNIX_EPOCH};
    let d = SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
    Instant(d.as_nanos() as u64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::heap::TimerHeap;

    #[test]
    fn cache_clears_and_refills() {
        let mut src = TimeSource::new();
        let a = src.now();
        let b = src.now();
        assert_eq!(a, b, "without clearing, cache should be stable within an iteration");
        src.clear_cache();
        // A fresh read is allowed to equal `a` on a fast clock; just check it doesn't panic.
        let _c = src.now();
    }

    #[test]
    fn correct_time_idempotent_when_forward() {
        let mut src = TimeSource { monotonic: false, event_tv: Instant(1_000), tv_cache: None };
        let mut heap = TimerHeap::new();
        // Simulate "now" being >= event_tv by constructing directly and calling
        // shift logic is skipped since read_clock() reads real wall time, which
        // will be far larger than the tiny event_tv used here.
        src.correct_time(&mut heap);
        assert!(src.event_tv.0 >= 1_000);
    }

    #[test]
    fn set_cache_is_observed_by_now() {
        let mut src = TimeSource::new();
        src.set_cache(Instant(42));
        assert_eq!(src.now(), Instant(42));
    }
}
