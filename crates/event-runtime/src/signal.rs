//! Signal self-pipe trampoline.
//!
//! A process signal handler cannot safely touch this crate's data
//! structures, so the installed handler is restricted to writing one
//! byte to a self-pipe and bumping a couple of atomics; draining and
//! dispatch happen on the reactor's own thread on the next loop turn.
//! Modeled on the self-pipe/`pending`-bitmap pair in the vendored
//! `signal-hook` `Signals`/`Waker` iterator, adapted from a background
//! iterator thread to a single reactor's synchronous per-turn drain.

use event_core::{EventError, EventResult};
use nix::sys::signal::{self, SaFlags, SigAction, SigHandler, SigSet, Signal};
use nix::sys::socket::{socketpair, AddressFamily, SockFlag, SockType};
use std::collections::{HashMap, HashSet};
use std::os::raw::c_int;
use std::os::unix::io::{AsRawFd, OwnedFd, RawFd};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

const MAX_SIGNUM: usize = 64;

const ZERO_COUNT: AtomicU32 = AtomicU32::new(0);
static COUNTS: [AtomicU32; MAX_SIGNUM] = [ZERO_COUNT; MAX_SIGNUM];
static CAUGHT: AtomicBool = AtomicBool::new(false);

/// Which self-pipe write fd to wake for a given signal number. Distinct
/// reactors own disjoint signals (see `OWNED_SIGNALS` below) but each
/// has its own pipe, so the trampoline needs a per-signal lookup rather
/// than one global fd — otherwise two live reactors would race to own
/// the single slot and whichever lost would never see its wakeup byte.
static SIGNAL_WRITE_FDS: Mutex<Option<HashMap<i32, RawFd>>> = Mutex::new(None);

/// Which process-wide signal numbers are currently owned by some
/// `SignalInfo`, so a second reactor requesting the same signal gets a
/// clear error instead of silently stealing delivery.
static OWNED_SIGNALS: Mutex<Option<HashSet<i32>>> = Mutex::new(None);

extern "C" fn trampoline(signo: c_int) {
    let idx = signo as usize;
    if idx < MAX_SIGNUM {
        COUNTS[idx].fetch_add(1, Ordering::SeqCst);
    }
    CAUGHT.store(true, Ordering::SeqCst);
    // A signal handler must not block, so this uses try_lock and simply
    // skips the wakeup write on contention; the next drain still picks
    // up the count via COUNTS, just possibly a turn later.
    if let Ok(guard) = SIGNAL_WRITE_FDS.try_lock() {
        if let Some(fd) = guard.as_ref().and_then(|m| m.get(&signo).copied()) {
            let byte: [u8; 1] = [1];
            unsafe {
                libc::write(fd, byte.as_ptr() as *const libc::c_void, 1);
            }
        }
    }
}

fn set_signal_write_fd(signo: i32, fd: RawFd) {
    let mut guard = SIGNAL_WRITE_FDS.lock().expect("signal write-fd lock poisoned");
    guard.get_or_insert_with(HashMap::new).insert(signo, fd);
}

fn clear_signal_write_fd(signo: i32) {
    let mut guard = SIGNAL_WRITE_FDS.lock().expect("signal write-fd lock poisoned");
    if let Some(map) = guard.as_mut() {
        map.remove(&signo);
    }
}

fn claim_signal(signo: i32) -> EventResult<()> {
    let mut guard = OWNED_SIGNALS.lock().expect("signal ownership lock poisoned");
    let owned = guard.get_or_insert_with(HashSet::new);
    if owned.contains(&signo) {
        return Err(EventError::SignalAlreadyOwned(signo));
    }
    owned.insert(signo);
    Ok(())
}

fn release_signal(signo: i32) {
    let mut guard = OWNED_SIGNALS.lock().expect("signal ownership lock poisoned");
    if let Some(owned) = guard.as_mut() {
        owned.remove(&signo);
    }
}

/// One delivery batch read off the self-pipe: a signal number and how
/// many times it fired since the last drain.
pub struct SignalDelivery {
    pub signo: i32,
    pub ncalls: u32,
}

/// Owns the self-pipe and the saved previous handlers for every signal
/// this reactor currently subscribes to.
pub struct SignalInfo {
    read_fd: OwnedFd,
    write_fd: OwnedFd,
    subscriber_counts: HashMap<i32, u32>,
    saved_actions: HashMap<i32, SigAction>,
    pipe_registered: bool,
}

impl SignalInfo {
    pub fn new() -> EventResult<Self> {
        let (read, write) = socketpair(AddressFamily::Unix, SockType::Stream, None, SockFlag::SOCK_NONBLOCK)
            .map_err(|e| EventError::BackendOp(e as i32))?;
        Ok(SignalInfo {
            read_fd: read,
            write_fd: write,
            subscriber_counts: HashMap::new(),
            saved_actions: HashMap::new(),
            pipe_registered: false,
        })
    }

    pub fn read_fd(&self) -> RawFd {
        self.read_fd.as_raw_fd()
    }

    pub fn pipe_is_registered(&self) -> bool {
        self.pipe_registered
    }

    pub fn mark_pipe_registered(&mut self, registered: bool) {
        self.pipe_registered = registered;
    }

    /// Installs the trampoline for `signo` if this is its first
    /// subscriber, saving whatever handler was previously installed.
    pub fn subscribe(&mut self, signo: i32) -> EventResult<()> {
        let count = self.subscriber_counts.entry(signo).or_insert(0);
        if *count == 0 {
            claim_signal(signo)?;
            let signal = Signal::try_from(signo).map_err(|_| EventError::SignalInstall(signo))?;
            let action = SigAction::new(SigHandler::Handler(trampoline), SaFlags::SA_RESTART, SigSet::empty());
            let previous = unsafe { signal::sigaction(signal, &action) }.map_err(|e| EventError::SignalInstall(e as i32))?;
            self.saved_actions.insert(signo, previous);
            set_signal_write_fd(signo, self.write_fd.as_raw_fd());
        }
        *count += 1;
        Ok(())
    }

    /// Restores the previous handler once the last subscriber for
    /// `signo` is removed.
    pub fn unsubscribe(&mut self, signo: i32) -> EventResult<()> {
        if let Some(count) = self.subscriber_counts.get_mut(&signo) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.subscriber_counts.remove(&signo);
                if let (Ok(signal), Some(previous)) = (Signal::try_from(signo), self.saved_actions.remove(&signo)) {
                    let _ = unsafe { signal::sigaction(signal, &previous) };
                }
                clear_signal_write_fd(signo);
                release_signal(signo);
            }
        }
        Ok(())
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscriber_counts.is_empty()
    }

    /// Drains the self-pipe and every signal's caught counter, returning
    /// one [`SignalDelivery`] per signal that fired since the last call.
    pub fn drain(&self) -> Vec<SignalDelivery> {
        let mut buf = [0u8; 256];
        loop {
            match nix::unistd::read(&self.read_fd, &mut buf) {
                Ok(0) => break,
                Ok(_) => continue,
                Err(_) => break,
            }
        }

        if !CAUGHT.swap(false, Ordering::SeqCst) {
            return Vec::new();
        }

        let mut deliveries = Vec::new();
        for signo in self.subscriber_counts.keys().copied() {
            let idx = signo as usize;
            if idx >= MAX_SIGNUM {
                continue;
            }
            let n = COUNTS[idx].swap(0, Ordering::SeqCst);
            if n > 0 {
                deliveries.push(SignalDelivery { signo, ncalls: n });
            }
        }
        deliveries
    }
}

impl Drop for SignalInfo {
    fn drop(&mut self) {
        let signos: Vec<i32> = self.subscriber_counts.keys().copied().collect();
        for signo in signos {
            self.subscriber_counts.insert(signo, 1);
            let _ = self.unsubscribe(signo);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_then_unsubscribe_restores_ownership() {
        // SIGUSR2 is unused by the test harness and safe to claim here.
        let signo = libc::SIGUSR2;
        let mut info = SignalInfo::new().unwrap();
        info.subscribe(signo).unwrap();
        assert!(info.has_subscribers());
        info.unsubscribe(signo).unwrap();
        assert!(!info.has_subscribers());
    }

    #[test]
    fn second_reactor_claiming_same_signal_errors() {
        let signo = libc::SIGUSR1;
        let mut a = SignalInfo::new().unwrap();
        let mut b = SignalInfo::new().unwrap();
        a.subscribe(signo).unwrap();
        let result = b.subscribe(signo);
        assert_eq!(result, Err(EventError::SignalAlreadyOwned(signo)));
        a.unsubscribe(signo).unwrap();
    }

    #[test]
    fn drain_with_nothing_caught_is_empty() {
        let info = SignalInfo::new().unwrap();
        assert!(info.drain().is_empty());
    }

    #[test]
    fn two_reactors_wake_only_their_own_pipe() {
        let mut a = SignalInfo::new().unwrap();
        let mut b = SignalInfo::new().unwrap();
        a.subscribe(libc::SIGUSR1).unwrap();
        b.subscribe(libc::SIGUSR2).unwrap();

        nix::sys::signal::raise(Signal::SIGUSR1).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(20));

        let mut buf = [0u8; 8];
        let a_woke = matches!(nix::unistd::read(&a.read_fd, &mut buf), Ok(n) if n > 0);
        let b_woke = matches!(nix::unistd::read(&b.read_fd, &mut buf), Ok(n) if n > 0);
        assert!(a_woke, "the subscriber of SIGUSR1 should see a wakeup byte");
        assert!(!b_woke, "a reactor subscribed to a different signal must not be woken");

        a.unsubscribe(libc::SIGUSR1).unwrap();
        b.unsubscribe(libc::SIGUSR2).unwrap();
    }
}
