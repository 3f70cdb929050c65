//! Basic reactor example.
//!
//! Demonstrates a repeating timer alongside a readable-pipe event,
//! dispatched on two different priority levels.

use event::{Binding, Mask, Priority, Reactor, ReactorConfig};
use std::cell::Cell;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::rc::Rc;
use std::time::Duration;

fn main() {
    println!("=== event reactor basic example ===\n");

    let mut reactor = Reactor::with_config(ReactorConfig::new().priorities(2).show_method(true));
    println!("backend: {}", reactor.get_method());
    println!("version: {}\n", Reactor::get_version());

    let (read_end, write_end) = nix::unistd::pipe().expect("pipe");
    nix::unistd::write(&write_end, b"hello from the pipe\n").expect("write");

    let pipe_fd = read_end.as_raw_fd();
    let mut pipe_slot = reactor.set_event(
        Binding::Fd { fd: pipe_fd, interest: Mask::READABLE },
        false,
        Box::new(move |_reactor, _id, fd, mask, _arg| {
            let mut buf = [0u8; 256];
            if mask.contains(Mask::READABLE) {
                let borrowed = unsafe { BorrowedFd::borrow_raw(fd) };
                if let Ok(n) = nix::unistd::read(borrowed, &mut buf) {
                    print!("[pipe fd={fd}] {}", String::from_utf8_lossy(&buf[..n]));
                }
            }
        }),
        Box::new(()),
    );
    pipe_slot.priority = Priority::new(0);
    let pipe_id = reactor.bind_to_reactor(pipe_slot).unwrap();
    reactor.add(pipe_id, None).unwrap();

    let ticks = Rc::new(Cell::new(0u32));
    let ticks_cb = ticks.clone();
    let timer_slot = reactor.set_event(
        Binding::Timer,
        true,
        Box::new(move |reactor, id, _binding, _mask, _arg| {
            let n = ticks_cb.get() + 1;
            ticks_cb.set(n);
            println!("[timer] tick {n}");
            if n >= 3 {
                reactor.loop_exit(None).unwrap();
            } else {
                // A timer is always deleted on expiry, persistent or
                // not; re-add it here to keep ticking.
                reactor.add(id, Some(Duration::from_millis(20))).unwrap();
            }
        }),
        Box::new(()),
    );
    let mut timer_slot = timer_slot;
    timer_slot.priority = Priority::new(1);
    let timer_id = reactor.bind_to_reactor(timer_slot).unwrap();
    reactor.add(timer_id, Some(Duration::from_millis(20))).unwrap();

    reactor.run(event::LoopFlags::DEFAULT).unwrap();
    println!("\n=== Example Complete ===");
}
