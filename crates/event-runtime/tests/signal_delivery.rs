//! Real-process signal delivery.
//!
//! These exercise the self-pipe trampoline against actual `kill(2)`
//! delivery, which a single-threaded in-process `#[test]` can't safely
//! share with other signal tests in the same binary — each gets its
//! own process per the crate's test-harness convention for OS-signal
//! tests.

use event_core::LoopFlags;
use event_runtime::{Binding, Reactor};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

#[test]
fn signal_coalesces_across_raises_between_iterations() {
    let mut reactor = Reactor::create();
    let invocations = Rc::new(RefCell::new(0u32));
    let invocations_cb = invocations.clone();

    let slot = reactor.set_event(
        Binding::Signal { signo: libc::SIGUSR1 },
        true,
        Box::new(move |_, _, _, _, _| {
            *invocations_cb.borrow_mut() += 1;
        }),
        Box::new(()),
    );
    let id = reactor.bind_to_reactor(slot).unwrap();
    reactor.add(id, None).unwrap();

    let pid = nix::unistd::getpid();
    for _ in 0..3 {
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGUSR1).unwrap();
    }
    std::thread::sleep(Duration::from_millis(20));

    reactor.run(LoopFlags::ONCE).unwrap();

    assert_eq!(*invocations.borrow(), 3);
}

#[test]
fn signal_delivery_invokes_persistent_handler_repeatedly() {
    let mut reactor = Reactor::create();
    let invocations = Rc::new(RefCell::new(0u32));
    let invocations_cb = invocations.clone();

    let slot = reactor.set_event(
        Binding::Signal { signo: libc::SIGUSR2 },
        true,
        Box::new(move |_, _, _, _, _| {
            *invocations_cb.borrow_mut() += 1;
        }),
        Box::new(()),
    );
    let id = reactor.bind_to_reactor(slot).unwrap();
    reactor.add(id, None).unwrap();

    let pid = nix::unistd::getpid();
    for _ in 0..2 {
        nix::sys::signal::kill(pid, nix::sys::signal::Signal::SIGUSR2).unwrap();
        std::thread::sleep(Duration::from_millis(20));
        reactor.run(LoopFlags::ONCE).unwrap();
    }

    assert_eq!(*invocations.borrow(), 2);
    assert!(reactor.pending(id, None));
}
