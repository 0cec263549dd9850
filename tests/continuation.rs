mod common;

use bytes::Bytes;
use common::*;
use http2_server::{
    ContinuationFlags, ErrorType, Frame, HeadersFlags, PingFlags, ServerConfig,
};

#[tokio::test]
async fn header_block_spans_continuations() {
    let mut server = start(ServerConfig::default());
    let fragment = server.client.encode(&[
        (":method", "GET"),
        (":scheme", "http"),
        (":path", "/split"),
        ("first", "one"),
        ("second", "two"),
    ]);
    let third = fragment.len() / 3;

    server
        .client
        .send_frame(Frame::Headers {
            stream: nz(1),
            flags: HeadersFlags::empty(),
            priority: None,
            fragment: Bytes::copy_from_slice(&fragment[..third]),
        })
        .await;
    server
        .client
        .send_frame(Frame::Continuation {
            stream: nz(1),
            flags: ContinuationFlags::empty(),
            fragment: Bytes::copy_from_slice(&fragment[third..2 * third]),
        })
        .await;
    server
        .client
        .send_frame(Frame::Continuation {
            stream: nz(1),
            flags: ContinuationFlags::END_HEADERS,
            fragment: Bytes::copy_from_slice(&fragment[2 * third..]),
        })
        .await;

    let mut stream = server.streams.recv().await.unwrap();
    let block = stream.read_headers().await.unwrap();
    assert_eq!(block.fields.len(), 5);
    assert_eq!(
        block.fields[4],
        ("second".to_owned(), "two".to_owned())
    );
}

#[tokio::test]
async fn interleaved_frame_mid_block_is_fatal() {
    let mut server = start(ServerConfig::default());
    let fragment = server.client.encode(BASIC_REQUEST);
    server
        .client
        .send_frame(Frame::Headers {
            stream: nz(1),
            flags: HeadersFlags::empty(),
            priority: None,
            fragment: fragment.into(),
        })
        .await;
    server
        .client
        .send_frame(Frame::Ping {
            flags: PingFlags::empty(),
            data: [0; 8],
        })
        .await;

    server.client.expect_goaway(ErrorType::ProtocolError).await;
    server.client.expect_closed().await;
}

#[tokio::test]
async fn continuation_without_headers_is_fatal() {
    let mut server = start(ServerConfig::default());
    server
        .client
        .send_frame(Frame::Continuation {
            stream: nz(1),
            flags: ContinuationFlags::END_HEADERS,
            fragment: Bytes::from_static(b"stray"),
        })
        .await;
    server.client.expect_goaway(ErrorType::ProtocolError).await;
}

#[tokio::test]
async fn zero_length_continuation_is_fatal() {
    let mut server = start(ServerConfig::default());
    let fragment = server.client.encode(BASIC_REQUEST);
    server
        .client
        .send_frame(Frame::Headers {
            stream: nz(1),
            flags: HeadersFlags::empty(),
            priority: None,
            fragment: fragment.into(),
        })
        .await;
    server
        .client
        .send_frame(Frame::Continuation {
            stream: nz(1),
            flags: ContinuationFlags::END_HEADERS,
            fragment: Bytes::new(),
        })
        .await;
    server.client.expect_goaway(ErrorType::ProtocolError).await;
}

#[tokio::test]
async fn truncated_header_block_is_a_compression_error() {
    let mut server = start(ServerConfig::default());
    let fragment = server
        .client
        .encode(&[(":method", "GET"), ("custom-name", "custom-value")]);
    server
        .client
        .send_frame(Frame::Headers {
            stream: nz(1),
            flags: HeadersFlags::END_HEADERS,
            priority: None,
            fragment: Bytes::copy_from_slice(&fragment[..fragment.len() - 3]),
        })
        .await;
    server.client.expect_goaway(ErrorType::CompressionError).await;
}

#[tokio::test]
async fn oversized_header_block_is_fatal() {
    let config = ServerConfig {
        max_header_fields_size: 64,
        ..ServerConfig::default()
    };
    let mut server = start(config);
    server
        .client
        .send_headers(
            1,
            &[
                (":method", "GET"),
                ("a-header-name", "a header value that is long enough to overflow"),
                ("another-header", "with another value behind it"),
            ],
            false,
        )
        .await;
    server.client.expect_goaway(ErrorType::ProtocolError).await;
    assert!(server.streams.try_recv().is_err());
}

#[tokio::test]
async fn oversized_frames_are_fatal() {
    let config = ServerConfig {
        max_frame_size: 16_384,
        ..ServerConfig::default()
    };
    let mut server = start(config);
    // a 20 000 octet DATA frame against a 16 384 limit; the header alone
    // is enough to convict, no payload needs to follow
    let mut raw = Vec::new();
    raw.extend_from_slice(&20_000u32.to_be_bytes()[1..]);
    raw.push(0x0);
    raw.push(0);
    raw.extend_from_slice(&1u32.to_be_bytes());
    server.client.send_raw(&raw).await;
    server.client.expect_goaway(ErrorType::FrameSizeError).await;
}
