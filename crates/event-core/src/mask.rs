//! Interest/delivery bitmask and priority types.

use core::fmt;
use core::ops::{BitOr, BitOrAssign};

/// A bit in the interest/delivered mask. Values are stable across the
/// public API since callbacks observe them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum Interest {
    Readable = 0x01,
    Writable = 0x02,
    Signal = 0x04,
    Timeout = 0x08,
    Persist = 0x10,
}

/// Bitwise-OR'd set of [`Interest`] flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(transparent)]
pub struct Mask(u16);

impl Mask {
    pub const EMPTY: Mask = Mask(0);
    pub const READABLE: Mask = Mask(Interest::Readable as u16);
    pub const WRITABLE: Mask = Mask(Interest::Writable as u16);
    pub const SIGNAL: Mask = Mask(Interest::Signal as u16);
    pub const TIMEOUT: Mask = Mask(Interest::Timeout as u16);
    pub const PERSIST: Mask = Mask(Interest::Persist as u16);

    #[inline]
    pub const fn bits(self) -> u16 {
        self.0
    }

    #[inline]
    pub const fn from_bits(bits: u16) -> Self {
        Mask(bits)
    }

    #[inline]
    pub const fn contains(self, other: Mask) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn insert(self, other: Mask) -> Mask {
        Mask(self.0 | other.0)
    }

    #[inline]
    pub const fn remove(self, other: Mask) -> Mask {
        Mask(self.0 & !other.0)
    }
}

impl From<Interest> for Mask {
    fn from(i: Interest) -> Self {
        Mask(i as u16)
    }
}

impl BitOr for Mask {
    type Output = Mask;
    fn bitor(self, rhs: Mask) -> Mask {
        Mask(self.0 | rhs.0)
    }
}

impl BitOrAssign for Mask {
    fn bitor_assign(&mut self, rhs: Mask) {
        self.0 |= rhs.0;
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if self.contains(Mask::READABLE) {
            parts.push("readable");
        }
        if self.contains(Mask::WRITABLE) {
            parts.push("writable");
        }
        if self.contains(Mask::SIGNAL) {
            parts.push("signal");
        }
        if self.contains(Mask::TIMEOUT) {
            parts.push("timeout");
        }
        if self.contains(Mask::PERSIST) {
            parts.push("persist");
        }
        if parts.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", parts.join("|"))
        }
    }
}

/// Dispatch priority. Lower numerals run first. Unlike a fixed-arity
/// scheduler priority enum, this is a plain integer because the reactor's
/// priority count `P` is a runtime value set by `set_priorities`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Priority(u32);

impl Priority {
    #[inline]
    pub const fn new(n: u32) -> Self {
        Priority(n)
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Default priority for a reactor configured with `count` levels: `count / 2`.
    #[inline]
    pub const fn default_for(count: u32) -> Self {
        Priority(count / 2)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Loop-invocation flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopFlags {
    pub once: bool,
    pub non_blocking: bool,
}

impl LoopFlags {
    pub const DEFAULT: LoopFlags = LoopFlags { once: false, non_blocking: false };
    pub const ONCE: LoopFlags = LoopFlags { once: true, non_blocking: false };
    pub const NON_BLOCKING: LoopFlags = LoopFlags { once: true, non_blocking: true };

    #[inline]
    pub const fn single_pass(self) -> bool {
        self.once || self.non_blocking
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_combine_and_query() {
        let m = Mask::READABLE | Mask::TIMEOUT;
        assert!(m.contains(Mask::READABLE));
        assert!(m.contains(Mask::TIMEOUT));
        assert!(!m.contains(Mask::WRITABLE));
        assert!(!m.contains(Mask::SIGNAL));
    }

    #[test]
    fn mask_display() {
        let m = Mask::READABLE | Mask::PERSIST;
        assert_eq!(m.to_string(), "readable|persist");
        assert_eq!(Mask::EMPTY.to_string(), "none");
    }

    #[test]
    fn priority_default_is_half_count() {
        assert_eq!(Priority::default_for(1).as_u32(), 0);
        assert_eq!(Priority::default_for(4).as_u32(), 2);
    }

    #[test]
    fn loop_flags_single_pass() {
        assert!(!LoopFlags::DEFAULT.single_pass());
        assert!(LoopFlags::ONCE.single_pass());
        assert!(LoopFlags::NON_BLOCKING.single_pass());
    }
}
