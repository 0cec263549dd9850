#![allow(dead_code)]

use bytes::{Bytes, BytesMut};
use http2_server::{
    serve, Accept, ConnectionError, ErrorType, Frame, HeadersFlags, ServerConfig, ServerStream,
    StreamListener, DEFAULT_MAX_FRAME_SIZE,
};
use std::num::NonZeroU32;
use tokio::{
    io::{duplex, AsyncWriteExt, DuplexStream},
    sync::mpsc,
    task::JoinHandle,
};

pub fn nz(id: u32) -> NonZeroU32 {
    NonZeroU32::new(id).unwrap()
}

pub fn owned(fields: &[(&str, &str)]) -> Vec<(String, String)> {
    fields
        .iter()
        .map(|(name, value)| ((*name).to_owned(), (*value).to_owned()))
        .collect()
}

pub const BASIC_REQUEST: &[(&str, &str)] = &[
    (":method", "GET"),
    (":scheme", "http"),
    (":path", "/"),
];

/// Raw-frame client driving the engine over an in-memory duplex pipe, with
/// its own HPACK tables for both directions.
pub struct TestClient {
    transport: DuplexStream,
    encoder: hpack::Encoder<'static>,
    decoder: hpack::Decoder<'static>,
    scratch: BytesMut,
}

impl TestClient {
    fn new(transport: DuplexStream) -> Self {
        Self {
            transport,
            encoder: hpack::Encoder::new(),
            decoder: hpack::Decoder::new(),
            scratch: BytesMut::new(),
        }
    }

    pub fn encode(&mut self, fields: &[(&str, &str)]) -> Vec<u8> {
        self.encoder.encode(
            fields
                .iter()
                .map(|(name, value)| (name.as_bytes(), value.as_bytes())),
        )
    }

    pub fn decode(&mut self, fragment: &[u8]) -> Vec<(String, String)> {
        self.decoder
            .decode(fragment)
            .expect("response header block decodes")
            .into_iter()
            .map(|(name, value)| {
                (
                    String::from_utf8(name).unwrap(),
                    String::from_utf8(value).unwrap(),
                )
            })
            .collect()
    }

    pub async fn send_frame(&mut self, frame: Frame) {
        frame.write_into(&mut self.transport).await.unwrap();
    }

    pub async fn send_raw(&mut self, raw: &[u8]) {
        self.transport.write_all(raw).await.unwrap();
    }

    pub async fn send_headers(&mut self, id: u32, fields: &[(&str, &str)], end_stream: bool) {
        let fragment = self.encode(fields);
        let mut flags = HeadersFlags::END_HEADERS;
        if end_stream {
            flags |= HeadersFlags::END_STREAM;
        }
        self.send_frame(Frame::Headers {
            stream: nz(id),
            flags,
            priority: None,
            fragment: fragment.into(),
        })
        .await;
    }

    pub async fn send_data(&mut self, id: u32, data: &[u8], end_stream: bool) {
        self.send_frame(Frame::data(nz(id), Bytes::copy_from_slice(data), end_stream))
            .await;
    }

    /// The codec never emits padding, so padded DATA is built by hand.
    pub async fn send_padded_data(
        &mut self,
        id: u32,
        payload: &[u8],
        pad_len: u8,
        end_stream: bool,
    ) {
        let length = 1 + payload.len() + pad_len as usize;
        let mut raw = Vec::with_capacity(9 + length);
        raw.extend_from_slice(&(length as u32).to_be_bytes()[1..]);
        raw.push(0x0); // DATA
        raw.push(if end_stream { 0x9 } else { 0x8 }); // PADDED (+ END_STREAM)
        raw.extend_from_slice(&id.to_be_bytes());
        raw.push(pad_len);
        raw.extend_from_slice(payload);
        raw.extend_from_slice(&vec![0u8; pad_len as usize]);
        self.send_raw(&raw).await;
    }

    pub async fn send_rst(&mut self, id: u32, error: ErrorType) {
        self.send_frame(Frame::ResetStream {
            stream: nz(id),
            error,
        })
        .await;
    }

    pub async fn recv_frame(&mut self) -> Option<Frame> {
        Frame::read_from(&mut self.transport, DEFAULT_MAX_FRAME_SIZE, &mut self.scratch)
            .await
            .expect("client-side frame read")
    }

    /// Next frame addressed to a stream, skipping connection housekeeping
    /// (WINDOW_UPDATE, SETTINGS acks, PING acks).
    pub async fn recv_stream_frame(&mut self) -> Option<Frame> {
        loop {
            match self.recv_frame().await {
                Some(Frame::WindowUpdate { .. } | Frame::Settings { .. } | Frame::Ping { .. }) => {}
                other => return other,
            }
        }
    }

    pub async fn expect_rst(&mut self, id: u32, code: ErrorType) {
        match self.recv_stream_frame().await {
            Some(Frame::ResetStream { stream, error }) => {
                assert_eq!(stream.get(), id);
                assert_eq!(error, code);
            }
            frame => panic!("expected RST_STREAM({}), got {:?}", id, frame),
        }
    }

    /// Waits for GOAWAY, skipping anything queued ahead of it, and returns
    /// its last_stream_id.
    pub async fn expect_goaway(&mut self, code: ErrorType) -> u32 {
        loop {
            match self.recv_frame().await {
                Some(Frame::GoAway {
                    last_stream, error, ..
                }) => {
                    assert_eq!(error, code);
                    return last_stream;
                }
                Some(_) => {}
                None => panic!("transport closed before GOAWAY"),
            }
        }
    }

    /// Drains the read side until the server closes the transport.
    pub async fn expect_closed(&mut self) {
        while self.recv_frame().await.is_some() {}
    }
}

pub struct TestServer {
    pub client: TestClient,
    pub streams: mpsc::UnboundedReceiver<ServerStream>,
    pub conn: JoinHandle<Result<(), ConnectionError>>,
}

/// Boots the engine over a duplex pipe with a listener that hands every
/// admitted stream to the test.
pub fn start(config: ServerConfig) -> TestServer {
    let (tx, streams) = mpsc::unbounded_channel();
    let listener = move |stream: ServerStream| {
        if tx.send(stream).is_ok() {
            Accept::Accept
        } else {
            Accept::Refuse
        }
    };
    let (client, conn) = start_with(config, listener);
    TestServer {
        client,
        streams,
        conn,
    }
}

pub fn start_with<L>(
    config: ServerConfig,
    listener: L,
) -> (TestClient, JoinHandle<Result<(), ConnectionError>>)
where
    L: StreamListener + 'static,
{
    let (client_io, server_io) = duplex(1 << 20);
    let conn = tokio::spawn(serve(server_io, listener, config));
    (TestClient::new(client_io), conn)
}
