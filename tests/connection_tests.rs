//! Connection Tests
//!
//! Tests for the read loop, serialized writes, pushes and teardown.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use cmdlink::network::{FrameWriter, ShutdownHandle};
use cmdlink::{Conn, Connection, Handler, LinkError, PacketOut, Router, Session};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use serde_json::json;

mod common;
use common::{memory_conn, Pong, Tick, WAIT};

#[derive(Default)]
struct Tracked {
    closes: AtomicUsize,
}

impl Session for Tracked {
    fn on_close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Writer whose writes block until its shutdown handle fires
struct Blocking {
    entered: Sender<()>,
    release: Receiver<()>,
    release_tx: Mutex<Option<Sender<()>>>,
    shut_down: Arc<AtomicBool>,
}

impl FrameWriter for Blocking {
    fn write_frame(&mut self, _frame: &[u8]) -> cmdlink::Result<()> {
        let _ = self.entered.try_send(());
        let _ = self.release.recv();
        Err(io::Error::new(io::ErrorKind::BrokenPipe, "released").into())
    }

    fn shutdown(&mut self) -> cmdlink::Result<()> {
        self.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown_handle(&self) -> Option<ShutdownHandle> {
        let release_tx = self.release_tx.lock().take();
        Some(Box::new(move || {
            drop(release_tx);
            Ok(())
        }))
    }
}

// =============================================================================
// Push Tests
// =============================================================================

#[test]
fn test_push_has_no_cid() {
    let (conn, _reader, peer) = memory_conn(());

    conn.push(&Pong::new("hello")).unwrap();
    assert_eq!(
        peer.recv_json(WAIT).unwrap(),
        json!({"cmds": [{"name": "pong", "data": {"msg": "hello"}}]})
    );
}

#[test]
fn test_push_all_batches_commands() {
    let (conn, _reader, peer) = memory_conn(());

    let cmds = vec![
        cmdlink::CommandOut::encode(&Tick { n: 1 }).unwrap(),
        cmdlink::CommandOut::encode(&Pong::new("x")).unwrap(),
    ];
    conn.push_all(cmds).unwrap();

    let packet: PacketOut = serde_json::from_slice(&peer.recv_timeout(WAIT).unwrap()).unwrap();
    assert_eq!(packet.cid, 0);
    assert_eq!(packet.commands.len(), 2);
    assert_eq!(peer.pending(), 0);
}

#[test]
fn test_concurrent_pushes_arrive_whole() {
    let (conn, _reader, peer) = memory_conn(());

    let workers: Vec<_> = (0..8)
        .map(|t| {
            let conn = Conn::clone(&conn);
            thread::spawn(move || {
                for i in 0..50 {
                    conn.push(&Tick { n: t * 100 + i }).unwrap();
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    let mut seen = Vec::new();
    while let Some(value) = peer.recv_json(WAIT) {
        seen.push(value["cmds"][0]["data"]["n"].as_u64().unwrap());
        if seen.len() == 400 {
            break;
        }
    }
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 400);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_is_idempotent() {
    let (conn, _reader, _peer) = memory_conn(Tracked::default());
    let callbacks = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&callbacks);
    conn.on_close(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    conn.close();
    conn.close();

    assert!(conn.is_closed());
    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
    assert_eq!(callbacks.load(Ordering::SeqCst), 1);
}

#[test]
fn test_send_after_close_fails() {
    let (conn, _reader, peer) = memory_conn(());
    conn.close();

    assert!(matches!(conn.push(&Pong::new("late")), Err(LinkError::ConnectionClosed)));
    assert!(matches!(conn.send(b"{}"), Err(LinkError::ConnectionClosed)));
    assert!(peer.recv().is_none());
}

#[test]
fn test_write_failure_closes() {
    let (conn, _reader, peer) = memory_conn(Tracked::default());
    drop(peer);

    assert!(conn.push(&Pong::new("nobody")).is_err());
    assert!(conn.is_closed());
    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_close() {
    let (conn, _reader, _peer) = memory_conn(Tracked::default());

    let closers: Vec<_> = (0..8)
        .map(|_| {
            let conn = Conn::clone(&conn);
            thread::spawn(move || conn.close())
        })
        .collect();
    for closer in closers {
        closer.join().unwrap();
    }

    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_close_interrupts_blocked_write() {
    let (entered_tx, entered_rx) = channel::bounded(1);
    let (release_tx, release_rx) = channel::bounded(0);
    let shut_down = Arc::new(AtomicBool::new(false));
    let writer = Blocking {
        entered: entered_tx,
        release: release_rx,
        release_tx: Mutex::new(Some(release_tx)),
        shut_down: Arc::clone(&shut_down),
    };
    let conn = Connection::new(Tracked::default(), writer, "blocked");

    let pusher = Conn::clone(&conn);
    let push = thread::spawn(move || pusher.push(&Tick { n: 1 }));
    entered_rx.recv_timeout(WAIT).unwrap();

    let (done_tx, done_rx) = channel::bounded(1);
    let closer = Conn::clone(&conn);
    thread::spawn(move || {
        closer.close();
        let _ = done_tx.send(());
    });
    assert!(done_rx.recv_timeout(WAIT).is_ok(), "close waited on the pending write");

    assert!(push.join().unwrap().is_err());
    assert!(shut_down.load(Ordering::SeqCst));
    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Read Loop Tests
// =============================================================================

fn echo_router() -> Arc<Router<Tracked>> {
    let mut router = Router::new();
    router
        .register(
            0,
            "ping",
            Handler::with_input(|_: &Conn<Tracked>, n: u32| Ok(Tick { n })),
        )
        .unwrap();
    Arc::new(router)
}

#[test]
fn test_responses_follow_arrival_order() {
    let router = echo_router();
    let (conn, reader, mut peer) = memory_conn(Tracked::default());

    let loop_conn = Conn::clone(&conn);
    let loop_router = Arc::clone(&router);
    let handle = thread::spawn(move || {
        loop_conn.run(reader, |c, frame| loop_router.process_packet(c, frame));
    });

    for i in 1..=20 {
        peer.send(format!(r#"{{"cid":{},"cmds":[{{"name":"ping","data":{}}}]}}"#, i, i))
            .unwrap();
    }
    for i in 1..=20u64 {
        let value = peer.recv_json(WAIT).unwrap();
        assert_eq!(value["cid"], i);
        assert_eq!(value["cmds"][0]["data"]["n"], i);
    }

    peer.close();
    handle.join().unwrap();
    assert!(conn.is_closed());
    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_packet_keeps_connection_open() {
    let router = echo_router();
    let (conn, reader, mut peer) = memory_conn(Tracked::default());

    let loop_conn = Conn::clone(&conn);
    let handle = thread::spawn(move || {
        loop_conn.run(reader, |c, frame| router.process_packet(c, frame));
    });

    peer.send("garbage").unwrap();
    let error = peer.recv_json(WAIT).unwrap();
    assert_eq!(error["cmds"][0]["data"]["type"], "cannot parse command");

    peer.send(r#"{"cid":2,"cmds":[{"name":"ping","data":5}]}"#).unwrap();
    assert_eq!(peer.recv_json(WAIT).unwrap()["cmds"][0]["data"]["n"], 5);
    assert!(!conn.is_closed());

    peer.close();
    handle.join().unwrap();
}

#[test]
fn test_close_stops_read_loop() {
    let (conn, reader, _peer) = memory_conn(Tracked::default());

    let loop_conn = Conn::clone(&conn);
    let handle = thread::spawn(move || {
        loop_conn.run(reader, |_, _| {});
    });

    conn.close();
    handle.join().unwrap();
    assert_eq!(conn.session().closes.load(Ordering::SeqCst), 1);
}
