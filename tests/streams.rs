mod common;

use common::*;
use http2_server::{Accept, ErrorType, ReadError, ServerConfig, ServerStream, StreamState};

#[tokio::test]
async fn headers_create_a_stream_and_deliver_fields() {
    let mut server = start(ServerConfig::default());
    server
        .client
        .send_headers(
            1,
            &[
                (":method", "GET"),
                (":scheme", "http"),
                (":path", "/"),
                ("abc", "def"),
            ],
            false,
        )
        .await;

    let mut stream = server.streams.recv().await.expect("listener invoked");
    assert_eq!(stream.id(), 1);
    assert_eq!(stream.state(), StreamState::Open);

    let block = stream.read_headers().await.unwrap();
    assert!(!block.end_stream);
    assert_eq!(
        block.fields,
        owned(&[
            (":method", "GET"),
            (":scheme", "http"),
            (":path", "/"),
            ("abc", "def"),
        ])
    );

    // exactly one stream was handed out
    assert!(server.streams.try_recv().is_err());
}

#[tokio::test]
async fn end_stream_headers_half_close_immediately() {
    let mut server = start(ServerConfig::default());
    server.client.send_headers(1, BASIC_REQUEST, true).await;

    let mut stream = server.streams.recv().await.unwrap();
    let mut buf = [0u8; 16];
    let (read, end_stream) = stream.read(&mut buf).await.unwrap();
    assert_eq!(read, 0);
    assert!(end_stream);
    assert_eq!(stream.state(), StreamState::HalfClosedRemote);
}

#[tokio::test]
async fn repeated_headers_reset_the_stream() {
    let mut server = start(ServerConfig::default());
    server.client.send_headers(1, BASIC_REQUEST, false).await;
    let mut stream = server.streams.recv().await.unwrap();

    // a second block without END_STREAM cannot be trailers
    server.client.send_headers(1, &[("x", "y")], false).await;
    server.client.expect_rst(1, ErrorType::ProtocolError).await;

    let mut buf = [0u8; 4];
    let err = stream.read(&mut buf).await.unwrap_err();
    assert_eq!(err, ReadError::StreamReset(ErrorType::ProtocolError));
    while stream.state() != StreamState::Reset {
        stream.state_changed().await;
    }
}

#[tokio::test]
async fn headers_on_stream_zero_end_the_connection() {
    let mut server = start(ServerConfig::default());
    let fragment = server.client.encode(BASIC_REQUEST);
    let mut raw = Vec::new();
    raw.extend_from_slice(&(fragment.len() as u32).to_be_bytes()[1..]);
    raw.push(0x1); // HEADERS
    raw.push(0x4); // END_HEADERS
    raw.extend_from_slice(&0u32.to_be_bytes());
    raw.extend_from_slice(&fragment);
    server.client.send_raw(&raw).await;

    let last_stream = server.client.expect_goaway(ErrorType::ProtocolError).await;
    assert_eq!(last_stream, 0);
    server.client.expect_closed().await;

    assert!(server.streams.try_recv().is_err());
    assert!(server.conn.await.unwrap().is_err());
}

#[tokio::test]
async fn descending_stream_ids_are_answered_with_stream_closed() {
    let mut server = start(ServerConfig::default());
    server.client.send_headers(33, BASIC_REQUEST, false).await;
    let stream33 = server.streams.recv().await.unwrap();

    server.client.send_headers(31, BASIC_REQUEST, false).await;
    server.client.expect_rst(31, ErrorType::StreamClosed).await;

    // stream 33 is untouched, and no stream was handed out for 31
    assert_eq!(stream33.state(), StreamState::Open);
    assert!(server.streams.try_recv().is_err());
}

#[tokio::test]
async fn even_stream_ids_are_answered_with_stream_closed() {
    let mut server = start(ServerConfig::default());
    server.client.send_headers(2, BASIC_REQUEST, false).await;
    server.client.expect_rst(2, ErrorType::StreamClosed).await;
    assert!(server.streams.try_recv().is_err());
}

#[tokio::test]
async fn refusing_listener_resets_the_stream() {
    let listener = |stream: ServerStream| {
        drop(stream);
        Accept::Refuse
    };
    let (mut client, _conn) = start_with(ServerConfig::default(), listener);
    client.send_headers(1, BASIC_REQUEST, false).await;
    client.expect_rst(1, ErrorType::RefusedStream).await;

    // the refused slot is free again
    client.send_headers(3, BASIC_REQUEST, false).await;
    client.expect_rst(3, ErrorType::RefusedStream).await;
}

#[tokio::test]
async fn peer_reset_is_surfaced_to_the_handle() {
    let mut server = start(ServerConfig::default());
    server.client.send_headers(1, BASIC_REQUEST, false).await;
    let mut stream = server.streams.recv().await.unwrap();

    server.client.send_rst(1, ErrorType::Cancel).await;
    let mut buf = [0u8; 4];
    let err = stream.read(&mut buf).await.unwrap_err();
    assert_eq!(err, ReadError::StreamReset(ErrorType::Cancel));
    while stream.state() != StreamState::Reset {
        stream.state_changed().await;
    }
}
