//! TCP echo server built on the reactor's fd-readiness path.
//!
//! Accepts connections on a listening socket and, for each one, echoes
//! back whatever bytes it reads until the peer closes or a read/write
//! error occurs.

use event::{Binding, Mask, Reactor};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::os::fd::AsRawFd;

fn main() {
    let addr = std::env::args().nth(1).unwrap_or_else(|| "127.0.0.1:7070".to_string());
    let listener = TcpListener::bind(&addr).expect("bind");
    listener.set_nonblocking(true).expect("set_nonblocking");
    println!("echo server listening on {addr}");

    let mut reactor = Reactor::with_config(event::ReactorConfig::new().show_method(true));

    let listener_fd = listener.as_raw_fd();
    let slot = reactor.set_event(
        Binding::Fd { fd: listener_fd, interest: Mask::READABLE },
        true,
        Box::new(move |reactor, _id, _fd, _mask, _arg| loop {
            match listener.accept() {
                Ok((stream, peer)) => {
                    println!("accepted {peer}");
                    register_connection(reactor, stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    eprintln!("accept error: {e}");
                    break;
                }
            }
        }),
        Box::new(()),
    );
    let listener_id = reactor.bind_to_reactor(slot).unwrap();
    reactor.add(listener_id, None).unwrap();

    reactor.run(event::LoopFlags::DEFAULT).unwrap();
}

fn register_connection(reactor: &mut Reactor, stream: TcpStream) {
    stream.set_nonblocking(true).expect("set_nonblocking");
    let fd = stream.as_raw_fd();
    let slot = reactor.set_event(
        Binding::Fd { fd, interest: Mask::READABLE },
        true,
        Box::new(move |reactor, id, _fd, mask, _arg| {
            if !mask.contains(Mask::READABLE) {
                return;
            }
            let mut buf = [0u8; 4096];
            loop {
                match (&stream).read(&mut buf) {
                    Ok(0) => {
                        let _ = reactor.destroy_event(id);
                        break;
                    }
                    Ok(n) => {
                        if (&stream).write_all(&buf[..n]).is_err() {
                            let _ = reactor.destroy_event(id);
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                    Err(_) => {
                        let _ = reactor.destroy_event(id);
                        break;
                    }
                }
            }
        }),
        Box::new(()),
    );
    let id = reactor.bind_to_reactor(slot).unwrap();
    reactor.add(id, None).unwrap();
}
