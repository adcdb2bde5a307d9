// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

//! Exercises testable property #5 (`spec.md` §8): if the handler does not
//! call `reader(..)` again, no further read continuations are spawned for
//! that connection until it does.

use std::io::Write;
use std::net::{SocketAddr, TcpStream};
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use netsvc_core::tcp::{reader, TcpService};
use netsvc_core::{AsyncContext, AsyncWorker, Connection, Reactor, Signal, StreamHandler};
use serial_test::serial;

fn wait_for_connect(addr: SocketAddr) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(2);
    loop {
        if let Ok(stream) = TcpStream::connect(addr) {
            return stream;
        }
        if Instant::now() > deadline {
            panic!("timed out connecting to {addr}");
        }
        std::thread::sleep(Duration::from_millis(10));
    }
}

/// Never re-arms: every read it sees is the last one its connection will
/// ever produce, exercising the "blocked" half of property #5.
#[derive(Default)]
struct NeverRearmsHandler {
    reads: Arc<AtomicUsize>,
}

impl StreamHandler for NeverRearmsHandler {
    fn on_read(
        self: &Rc<Self>,
        _reactor: &mut Reactor,
        _ctx: &AsyncContext,
        _conn: &Rc<Connection<Self>>,
        _bytes: &[u8],
    ) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
#[serial]
fn handler_that_does_not_rearm_stops_further_reads() {
    let addr: SocketAddr = "127.0.0.1:19809".parse().unwrap();
    let reads = Arc::new(AtomicUsize::new(0));
    let handler = NeverRearmsHandler {
        reads: Arc::clone(&reads),
    };

    let worker = AsyncWorker::start::<TcpService<NeverRearmsHandler>>((addr, handler))
        .expect("worker should start");

    let mut stream = wait_for_connect(addr);
    stream.write_all(b"first").unwrap();

    let deadline = Instant::now() + Duration::from_millis(500);
    while reads.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    assert_eq!(reads.load(Ordering::SeqCst), 1, "exactly one read before the handler goes quiet");

    // The connection is now blocked: more bytes from the peer must not
    // produce another read, since no reader continuation is parked on this
    // socket until the handler calls `reader(..)` again — which this
    // handler never does.
    stream.write_all(b"second").unwrap();
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(
        reads.load(Ordering::SeqCst),
        1,
        "no further reads are spawned while the handler has not re-armed the reader"
    );

    drop(stream);
    worker.signal(Signal::Terminate);
}

/// Always re-arms immediately, the way `SegmentHandler` does: every read's
/// bytes are appended to a shared log in arrival order.
#[derive(Default)]
struct LoggingHandler {
    log: Arc<std::sync::Mutex<Vec<u8>>>,
}

impl StreamHandler for LoggingHandler {
    fn on_read(
        self: &Rc<Self>,
        reactor: &mut Reactor,
        ctx: &AsyncContext,
        conn: &Rc<Connection<Self>>,
        bytes: &[u8],
    ) {
        self.log.lock().expect("log mutex poisoned").extend_from_slice(bytes);
        reader(reactor, ctx, Rc::clone(conn));
    }
}

#[test]
#[serial]
fn handler_that_always_rearms_sees_every_write_in_order() {
    let addr: SocketAddr = "127.0.0.1:19811".parse().unwrap();
    let log = Arc::new(std::sync::Mutex::new(Vec::new()));
    let handler = LoggingHandler { log: Arc::clone(&log) };

    let worker =
        AsyncWorker::start::<TcpService<LoggingHandler>>((addr, handler)).expect("worker should start");

    let mut stream = wait_for_connect(addr);
    for chunk in [b"alpha".as_slice(), b"beta".as_slice(), b"gamma".as_slice()] {
        stream.write_all(chunk).unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        loop {
            if log.lock().unwrap().ends_with(chunk) {
                break;
            }
            if Instant::now() > deadline {
                panic!("chunk {chunk:?} was never observed by the handler");
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    assert_eq!(*log.lock().unwrap(), b"alphabetagamma");

    drop(stream);
    worker.signal(Signal::Terminate);
}
