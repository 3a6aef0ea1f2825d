// Copyright 2026 scylla-proto contributors
// SPDX-License-Identifier: Apache-2.0

//! Drives a real `ConnectionHandle` against a hand-rolled TCP server that speaks just enough
//! of the native protocol to complete STARTUP, then exercises drain-on-disconnect and
//! checkout/dispatch over a genuine socket.

use scylla_proto::connection::{self, ConnectionEvent, ConnectionOptions};
use scylla_proto::frame::{self, Envelope, OpCode, ProtocolVersion};
use scylla_proto::protocol::primitives::{write_short, write_string, write_string_list};
use scylla_proto::protocol::request::RequestBody;
use scylla_proto::protocol::response::decode_response;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

async fn read_one_frame(stream: &mut TcpStream, buf: &mut Vec<u8>) -> Envelope {
    loop {
        if let Some((envelope, consumed)) = frame::decode_frame(buf, ProtocolVersion::V4, None).unwrap() {
            buf.drain(..consumed);
            return envelope;
        }
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await.expect("server read failed");
        assert!(n > 0, "client closed before sending a full frame");
        buf.extend_from_slice(&chunk[..n]);
    }
}

fn write_string_multimap(out: &mut Vec<u8>, entries: &[(&str, &[&str])]) {
    write_short(out, entries.len() as u16);
    for (k, values) in entries {
        write_string(out, k);
        let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
        write_string_list(out, &values);
    }
}

async fn send_frame(stream: &mut TcpStream, stream_id: i16, opcode: OpCode, body: Vec<u8>) {
    let frame = frame::encode_frame(ProtocolVersion::V4, stream_id, opcode, body, None).unwrap();
    stream.write_all(&frame).await.unwrap();
}

/// The STARTUP handshake, then the server holds the socket open until the test drops it.
#[tokio::test]
async fn handshake_then_drain_on_server_close() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let options_req = read_one_frame(&mut stream, &mut buf).await;
        assert_eq!(options_req.header.opcode(), OpCode::Options);
        let mut supported = Vec::new();
        write_string_multimap(&mut supported, &[("CQL_VERSION", &["3.0.0"]), ("COMPRESSION", &[])]);
        send_frame(&mut stream, options_req.header.stream(), OpCode::Supported, supported).await;

        let startup_req = read_one_frame(&mut stream, &mut buf).await;
        assert_eq!(startup_req.header.opcode(), OpCode::Startup);
        send_frame(&mut stream, startup_req.header.stream(), OpCode::Ready, Vec::new()).await;

        // Hold the connection open briefly so the client observes `Connected`, then close it
        // to drive the drain-on-disconnect path.
        tokio::time::sleep(Duration::from_millis(200)).await;
        drop(stream);
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let options = ConnectionOptions::new(addr);
    let handle = connection::start(options, Some(event_tx));

    let first = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("timed out waiting for Connected")
        .expect("event channel closed");
    assert!(matches!(first, ConnectionEvent::Connected));

    let second = tokio::time::timeout(Duration::from_secs(2), event_rx.recv())
        .await
        .expect("timed out waiting for Disconnected")
        .expect("event channel closed");
    assert!(matches!(second, ConnectionEvent::Disconnected { .. }));

    handle.shutdown();
    server.await.unwrap();
}

/// In-flight waiters are all resolved with `Disconnected` the moment the server drops the
/// socket, rather than left to time out individually.
#[tokio::test]
async fn in_flight_waiters_are_drained_on_disconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = Vec::new();

        let options_req = read_one_frame(&mut stream, &mut buf).await;
        let mut supported = Vec::new();
        write_string_multimap(&mut supported, &[("CQL_VERSION", &["3.0.0"])]);
        send_frame(&mut stream, options_req.header.stream(), OpCode::Supported, supported).await;

        let startup_req = read_one_frame(&mut stream, &mut buf).await;
        send_frame(&mut stream, startup_req.header.stream(), OpCode::Ready, Vec::new()).await;

        // Read (and discard) the QUERY the client sends, but never answer it.
        let _query_req = read_one_frame(&mut stream, &mut buf).await;
        drop(stream);
    });

    let (event_tx, mut event_rx) = tokio::sync::mpsc::unbounded_channel();
    let options = ConnectionOptions::new(addr);
    let handle = connection::start(options, Some(event_tx));

    assert!(matches!(
        tokio::time::timeout(Duration::from_secs(2), event_rx.recv()).await.unwrap().unwrap(),
        ConnectionEvent::Connected
    ));

    let ctx = handle.checkout().await.expect("checkout while connected");
    ctx.send(
        OpCode::Query,
        RequestBody::Query {
            statement: "SELECT * FROM system.local".to_string(),
            params: Default::default(),
        },
    )
    .await
    .unwrap();

    let resolution = tokio::time::timeout(Duration::from_secs(2), ctx.waiter)
        .await
        .expect("waiter never resolved")
        .expect("waiter sender dropped without resolving");
    match resolution {
        scylla_proto::connection::WaiterResolution::Disconnected(_) => {}
        other => panic!("expected Disconnected, got {:?}", other),
    }

    handle.shutdown();
    server.await.unwrap();
}

#[tokio::test]
async fn checkout_fails_before_first_connect_completes() {
    // Port 1 is reserved and nothing listens there, so the connect attempt fails immediately
    // and the actor stays Disconnected for the duration of this check.
    let unroutable = "127.0.0.1:1".parse().unwrap();
    let options = ConnectionOptions::new(unroutable);
    let handle = connection::start(options, None);

    // checkout() races the actor's first connect attempt; both outcomes ("not yet connected"
    // and "failed to connect") must be `NotConnected` rather than a successful checkout.
    let result = handle.checkout().await;
    assert!(result.is_err());

    handle.shutdown();
}

#[test]
fn decode_response_error_helper_roundtrips_for_test_server() {
    // Sanity check for the hand-rolled SUPPORTED body builder above: a multimap with an empty
    // value list must still decode cleanly.
    let mut body = Vec::new();
    write_string_multimap(&mut body, &[("COMPRESSION", &[])]);
    let envelope = Envelope {
        header: scylla_proto::frame::Header::request(ProtocolVersion::V4, 0, OpCode::Supported),
        body,
    };
    let (response, warnings) = decode_response(&envelope).unwrap();
    assert!(warnings.is_empty());
    match response {
        scylla_proto::protocol::response::Response::Supported { options } => {
            assert_eq!(options.get("COMPRESSION"), Some(&vec![]));
        }
        other => panic!("expected Supported, got {:?}", other),
    }
}
