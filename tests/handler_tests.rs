//! Handler Tests
//!
//! Tests for binding, invocation, output flattening and middleware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use cmdlink::handler::Middleware;
use cmdlink::{
    CommandOut, Conn, ErrorCommand, Fault, Flow, Handler, HandlerResult, LinkError, Session,
};
use serde_json::value::RawValue;
use serde_json::json;

mod common;
use common::{memory_conn, Echo, Pong, Tick};

#[derive(Default)]
struct Counter(AtomicUsize);

impl Session for Counter {}

fn raw(text: &str) -> Box<RawValue> {
    RawValue::from_string(text.to_string()).unwrap()
}

fn names(commands: &[CommandOut]) -> Vec<&str> {
    commands.iter().map(|c| c.name.as_str()).collect()
}

// =============================================================================
// Input Tests
// =============================================================================

#[test]
fn test_no_input_no_output() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| Ok(()));

    let payload = raw(r#"{"ignored":true}"#);
    assert!(handler.invoke(&conn, None).unwrap().is_empty());
    assert!(handler.invoke(&conn, Some(&*payload)).unwrap().is_empty());
    assert!(handler.input().is_none());
    assert!(handler.outputs().is_empty());
}

#[test]
fn test_input_is_decoded() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::with_input(|_: &Conn<()>, req: Echo| Ok(Pong::new(&req.ping)));

    let payload = raw(r#"{"ping":"test"}"#);
    let out = handler.invoke(&conn, Some(&*payload)).unwrap();
    assert_eq!(out, vec![CommandOut::new("pong", Some(json!({"msg": "test"})))]);
}

#[test]
fn test_missing_payload_decodes_as_null() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::with_input(|_: &Conn<()>, req: Option<Echo>| {
        Ok(Pong::new(req.map(|r| r.ping).as_deref().unwrap_or("none")))
    });

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(out[0].data, Some(json!({"msg": "none"})));
}

#[test]
fn test_bad_payload_is_decode_error() {
    let (conn, _reader, _peer) = memory_conn(());
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let handler = Handler::with_input(move |_: &Conn<()>, _: Echo| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let payload = raw(r#"{"ping":5}"#);
    assert!(matches!(handler.invoke(&conn, Some(&*payload)), Err(LinkError::Deserialize(_))));
    assert!(matches!(handler.invoke(&conn, None), Err(LinkError::Deserialize(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// =============================================================================
// Output Tests
// =============================================================================

#[test]
fn test_sequence_output_keeps_order() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| Ok((1..=3).map(|n| Tick { n }).collect::<Vec<_>>()));

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(names(&out), vec!["tick", "tick", "tick"]);
    let values: Vec<_> = out.iter().map(|c| c.data.clone().unwrap()).collect();
    assert_eq!(values, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
}

#[test]
fn test_empty_elements_are_dropped() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| {
        Ok((vec![Some(Tick { n: 1 }), None, Some(Tick { n: 3 })], None::<Pong>))
    });

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(out[1].data, Some(json!({"n": 3})));
}

#[test]
fn test_tuple_output_in_declaration_order() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| {
        Ok((Pong::new("a"), vec![Tick { n: 1 }, Tick { n: 2 }], Some(Pong::new("b"))))
    });

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(names(&out), vec!["pong", "tick", "tick", "pong"]);

    let slots: Vec<_> = handler.outputs().iter().map(|s| (s.name, s.sequence)).collect();
    assert_eq!(slots, vec![("pong", false), ("tick", true), ("pong", false)]);
}

// =============================================================================
// Error Tests
// =============================================================================

#[test]
fn test_plain_error_suppresses_outputs() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| -> HandlerResult<(Pong, Tick)> {
        Err(Fault::msg("boom"))
    });

    match handler.invoke(&conn, None) {
        Err(LinkError::Handler(e)) => assert_eq!(e.to_string(), "boom"),
        other => panic!("Expected handler error, got {:?}", other),
    }
}

#[test]
fn test_question_mark_converts_errors() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::with_input(|_: &Conn<()>, req: Echo| -> HandlerResult<Tick> {
        let n: u32 = req.ping.parse()?;
        Ok(Tick { n })
    });

    let good = raw(r#"{"ping":"7"}"#);
    assert_eq!(handler.invoke(&conn, Some(&*good)).unwrap()[0].data, Some(json!({"n": 7})));

    let bad = raw(r#"{"ping":"seven"}"#);
    assert!(matches!(handler.invoke(&conn, Some(&*bad)), Err(LinkError::Handler(_))));
}

#[test]
fn test_error_command_is_passed_through() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| -> HandlerResult<Pong> {
        Err(ErrorCommand::new("auth", "login first").into())
    });

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(
        out,
        vec![CommandOut::new("Error", Some(json!({"type": "auth", "msg": "login first"})))]
    );
}

#[test]
fn test_error_command_replaces_middleware_output() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| -> HandlerResult<Pong> {
        Err(Fault::command("auth", "login first"))
    })
    .middleware(|_: &Conn<()>| Flow::Continue(vec![CommandOut::new("audit", None)]));

    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(
        out,
        vec![CommandOut::new("Error", Some(json!({"type": "auth", "msg": "login first"})))]
    );

    let failing = Handler::new(|_: &Conn<()>| -> HandlerResult<Pong> { Err(Fault::msg("boom")) })
        .middleware(|_: &Conn<()>| Flow::Continue(vec![CommandOut::new("audit", None)]));
    assert!(matches!(failing.invoke(&conn, None), Err(LinkError::Handler(_))));
}

// =============================================================================
// Middleware Tests
// =============================================================================

#[test]
fn test_middleware_runs_in_order_before_body() {
    let (conn, _reader, _peer) = memory_conn(());
    let handler = Handler::new(|_: &Conn<()>| Ok(Pong::new("body")))
        .middleware(|_: &Conn<()>| Flow::Continue(vec![CommandOut::new("first", None)]))
        .middleware(|_: &Conn<()>| Flow::proceed())
        .middleware(|_: &Conn<()>| Flow::Continue(vec![CommandOut::new("third", None)]));

    assert_eq!(handler.middleware_count(), 3);
    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(names(&out), vec!["first", "third", "pong"]);
}

#[test]
fn test_middleware_stop_skips_body() {
    let (conn, _reader, _peer) = memory_conn(());
    let calls = Arc::new(AtomicUsize::new(0));
    let body_calls = Arc::clone(&calls);
    let later_calls = Arc::clone(&calls);

    let handler = Handler::with_input(move |_: &Conn<()>, _: Echo| {
        body_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Pong::new("body"))
    })
    .middleware(|_: &Conn<()>| Flow::deny("forbidden", "not allowed"))
    .middleware(move |_: &Conn<()>| {
        later_calls.fetch_add(1, Ordering::SeqCst);
        Flow::proceed()
    });

    // Stop wins even over a payload that would not decode
    let out = handler.invoke(&conn, Some(&*raw("12"))).unwrap();
    assert_eq!(
        out,
        vec![CommandOut::new("Error", Some(json!({"type": "forbidden", "msg": "not allowed"})))]
    );
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_shared_middleware() {
    let (conn, _reader, _peer) = memory_conn(());
    let audits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&audits);
    let audit: Middleware<()> = Arc::new(move |_: &Conn<()>| {
        counter.fetch_add(1, Ordering::SeqCst);
        Flow::proceed()
    });

    let first = Handler::new(|_: &Conn<()>| Ok(())).shared_middleware(Arc::clone(&audit));
    let second = Handler::new(|_: &Conn<()>| Ok(Pong::new("x"))).shared_middleware(audit);

    first.invoke(&conn, None).unwrap();
    second.invoke(&conn, None).unwrap();
    assert_eq!(audits.load(Ordering::SeqCst), 2);
}

#[test]
fn test_middleware_sees_session() {
    let (conn, _reader, _peer) = memory_conn(Counter::default());
    let handler = Handler::new(|conn: &Conn<Counter>| {
        Ok(Tick {
            n: conn.session().0.load(Ordering::SeqCst) as u32,
        })
    })
    .middleware(|conn: &Conn<Counter>| {
        conn.session().0.fetch_add(1, Ordering::SeqCst);
        Flow::proceed()
    });

    handler.invoke(&conn, None).unwrap();
    let out = handler.invoke(&conn, None).unwrap();
    assert_eq!(out[0].data, Some(json!({"n": 2})));
}

// =============================================================================
// Signature Tests
// =============================================================================

#[test]
fn test_signature_names_input_and_outputs() {
    let handler = Handler::with_input(|_: &Conn<()>, _: Echo| Ok((Pong::new("x"), Vec::<Tick>::new())));
    let sig = handler.signature();
    assert!(sig.contains("Echo"), "{}", sig);
    assert!(sig.contains("Pong"), "{}", sig);
    assert!(sig.contains("Tick]"), "{}", sig);
    assert!(handler.input().unwrap().type_name.ends_with("Echo"));
}
