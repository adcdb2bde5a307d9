// Copyright (c) 2026 netsvc-core contributors. Licensed under Apache License, Version 2.0.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::time::{Duration, Instant};

use netsvc_core::segment::SegmentHandler;
use netsvc_core::tcp::TcpService;
use netsvc_core::{AsyncWorker, Signal};
use pretty_assertions::assert_eq;
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

#[test]
#[serial]
fn echoes_bytes_back_over_loopback() {
    let addr: SocketAddr = "127.0.0.1:19801".parse().unwrap();
    let worker = AsyncWorker::start::<TcpService<SegmentHandler>>((addr, SegmentHandler::new()))
        .expect("worker should start");

    let mut stream = wait_for_connect(addr);
    stream.write_all(b"hello segment").unwrap();
    stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    let mut buf = [0u8; 32];
    let n = stream.read(&mut buf).expect("echo read should succeed");

    assert_eq!(&buf[..n], b"hello segment");

    drop(stream);
    worker.signal(Signal::Terminate);
}

#[test]
#[serial]
fn multiple_connections_are_served_independently() {
    let addr: SocketAddr = "127.0.0.1:19805".parse().unwrap();
    let worker = AsyncWorker::start::<TcpService<SegmentHandler>>((addr, SegmentHandler::new()))
        .expect("worker should start");

    let mut a = wait_for_connect(addr);
    let mut b = wait_for_connect(addr);
    a.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
    b.set_read_timeout(Some(Duration::from_secs(2))).unwrap();

    a.write_all(b"from-a").unwrap();
    b.write_all(b"from-b").unwrap();

    let mut buf_a = [0u8; 16];
    let mut buf_b = [0u8; 16];
    let n_a = a.read(&mut buf_a).unwrap();
    let n_b = b.read(&mut buf_b).unwrap();

    assert_eq!(&buf_a[..n_a], b"from-a");
    assert_eq!(&buf_b[..n_b], b"from-b");

    drop(a);
    drop(b);
    worker.signal(Signal::Terminate);
}
