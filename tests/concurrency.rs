mod common;

use common::*;
use http2_server::{ErrorType, ServerConfig, StreamState};

#[tokio::test]
async fn max_concurrent_streams_is_enforced() {
    let config = ServerConfig {
        max_concurrent_streams: 20,
        ..ServerConfig::default()
    };
    let mut server = start(config);

    let mut handles = Vec::new();
    for id in (1..=39).step_by(2) {
        server.client.send_headers(id, BASIC_REQUEST, false).await;
        handles.push(server.streams.recv().await.unwrap());
    }
    assert_eq!(handles.len(), 20);

    // the 21st stream is refused without touching the others
    server.client.send_headers(41, BASIC_REQUEST, false).await;
    server.client.expect_rst(41, ErrorType::RefusedStream).await;
    for handle in &handles {
        assert_eq!(handle.state(), StreamState::Open);
    }
    assert!(server.streams.try_recv().is_err());

    // resetting one of the live streams frees its slot
    server.client.send_rst(39, ErrorType::Cancel).await;
    server.client.send_headers(43, BASIC_REQUEST, false).await;
    let stream43 = server.streams.recv().await.unwrap();
    assert_eq!(stream43.id(), 43);
    assert_eq!(stream43.state(), StreamState::Open);
}

#[tokio::test]
async fn finished_streams_free_their_slot() {
    let config = ServerConfig {
        max_concurrent_streams: 1,
        ..ServerConfig::default()
    };
    let mut server = start(config);

    server.client.send_headers(1, BASIC_REQUEST, true).await;
    let mut stream = server.streams.recv().await.unwrap();

    // at capacity: a second stream is refused
    server.client.send_headers(3, BASIC_REQUEST, false).await;
    server.client.expect_rst(3, ErrorType::RefusedStream).await;

    // completing the response closes stream 1 and frees the slot, even
    // though the handle is still held
    stream
        .write_headers(owned(&[(":status", "204")]), true)
        .await
        .unwrap();
    while stream.state() != StreamState::Closed {
        stream.state_changed().await;
    }

    server.client.send_headers(5, BASIC_REQUEST, false).await;
    let stream5 = server.streams.recv().await.unwrap();
    assert_eq!(stream5.id(), 5);
}
