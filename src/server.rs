use crate::{
    assembly::HeaderBlock,
    connection::{read_loop, write_loop, Connection, ServerConfig},
    stream::{StreamEvent, StreamState},
    types::*,
};
use bytes::{Buf, Bytes, BytesMut};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    sync::{mpsc, oneshot, watch},
};

/// The listener's synchronous verdict on a freshly admitted stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accept {
    Accept,
    Refuse,
}

/// Invoked by the arbiter once per admitted stream, after the header block
/// has fully assembled. Refusing answers the peer with
/// RST_STREAM(REFUSED_STREAM).
pub trait StreamListener: Send {
    fn accept(&mut self, stream: ServerStream) -> Accept;
}

impl<F> StreamListener for F
where
    F: FnMut(ServerStream) -> Accept + Send,
{
    fn accept(&mut self, stream: ServerStream) -> Accept {
        self(stream)
    }
}

/// Operations a stream handle forwards into the arbiter.
#[derive(Debug)]
pub(crate) enum StreamCommand {
    WriteHeaders {
        id: NonZeroStreamId,
        fields: Headers,
        end_stream: bool,
        reply: oneshot::Sender<Result<(), WriteError>>,
    },
    WriteData {
        id: NonZeroStreamId,
        data: Bytes,
        end_stream: bool,
        reply: oneshot::Sender<Result<(), WriteError>>,
    },
    WriteTrailers {
        id: NonZeroStreamId,
        fields: Headers,
        reply: oneshot::Sender<Result<(), WriteError>>,
    },
    Cancel {
        id: NonZeroStreamId,
    },
    Release {
        id: NonZeroStreamId,
    },
}

/// The application's capability handle for one stream. Reads drain the
/// arbiter-fed event queue; writes round-trip through the arbiter, which
/// holds the authoritative state. Dropping the handle releases the
/// registry entry once the stream is done on the wire.
#[derive(Debug)]
pub struct ServerStream {
    id: NonZeroStreamId,
    commands: mpsc::UnboundedSender<StreamCommand>,
    events: mpsc::UnboundedReceiver<StreamEvent>,
    state: watch::Receiver<StreamState>,
    headers: Option<HeaderBlock>,
    buf: BytesMut,
    end_seen: bool,
    trailers: Option<Headers>,
    reset: Option<ErrorType>,
    detached: bool,
}

impl ServerStream {
    pub(crate) fn new(
        id: NonZeroStreamId,
        commands: mpsc::UnboundedSender<StreamCommand>,
        events: mpsc::UnboundedReceiver<StreamEvent>,
        state: watch::Receiver<StreamState>,
    ) -> Self {
        Self {
            id,
            commands,
            events,
            state,
            headers: None,
            buf: BytesMut::new(),
            end_seen: false,
            trailers: None,
            reset: None,
            detached: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id.get()
    }

    /// The state last published by the arbiter.
    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Waits for the next published state change and returns it.
    pub async fn state_changed(&mut self) -> StreamState {
        self.state.changed().await.ok();
        *self.state.borrow()
    }

    fn absorb(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Headers(block) => {
                self.end_seen |= block.end_stream;
                self.headers = Some(block);
            }
            StreamEvent::Data { data, end_stream } => {
                self.buf.extend_from_slice(&data);
                self.end_seen |= end_stream;
            }
            StreamEvent::Trailers(fields) => {
                self.trailers = Some(fields);
                self.end_seen = true;
            }
            StreamEvent::Reset(code) => {
                self.reset = Some(code);
            }
        }
    }

    async fn next_event(&mut self) {
        match self.events.recv().await {
            Some(event) => self.absorb(event),
            None => self.detached = true,
        }
    }

    /// The request header block. Available as soon as the listener sees the
    /// stream; repeated calls return the same block.
    pub async fn read_headers(&mut self) -> Result<HeaderBlock, ReadError> {
        loop {
            if let Some(block) = &self.headers {
                return Ok(block.clone());
            }
            if let Some(code) = self.reset {
                return Err(ReadError::StreamReset(code));
            }
            if self.detached {
                return Err(ReadError::ConnectionClosed);
            }
            self.next_event().await;
        }
    }

    /// Copies body bytes into `buf`, waiting for DATA when none are
    /// buffered. The flag reports whether the body is complete; a bare
    /// `(0, true)` is a clean end of stream.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<(usize, bool), ReadError> {
        loop {
            if !self.buf.is_empty() {
                let n = self.buf.len().min(buf.len());
                buf[..n].copy_from_slice(&self.buf[..n]);
                self.buf.advance(n);
                return Ok((n, self.buf.is_empty() && self.end_seen));
            }
            if self.end_seen {
                return Ok((0, true));
            }
            if let Some(code) = self.reset {
                return Err(ReadError::StreamReset(code));
            }
            if self.detached {
                return Err(ReadError::ConnectionClosed);
            }
            self.next_event().await;
        }
    }

    /// Buffers the whole body and returns it once END_STREAM arrives.
    pub async fn read_all(&mut self) -> Result<Bytes, ReadError> {
        loop {
            if self.end_seen {
                return Ok(self.buf.split().freeze());
            }
            if let Some(code) = self.reset {
                return Err(ReadError::StreamReset(code));
            }
            if self.detached {
                return Err(ReadError::ConnectionClosed);
            }
            self.next_event().await;
        }
    }

    /// Trailing headers, if the peer sent any. Waits out the body first;
    /// bytes read along the way stay buffered for `read`.
    pub async fn read_trailers(&mut self) -> Result<Option<Headers>, ReadError> {
        loop {
            if self.end_seen {
                return Ok(self.trailers.clone());
            }
            if let Some(code) = self.reset {
                return Err(ReadError::StreamReset(code));
            }
            if self.detached {
                return Err(ReadError::ConnectionClosed);
            }
            self.next_event().await;
        }
    }

    async fn roundtrip(
        &self,
        command: StreamCommand,
        reply: oneshot::Receiver<Result<(), WriteError>>,
    ) -> Result<(), WriteError> {
        self.commands
            .send(command)
            .map_err(|_| WriteError::ConnectionClosed)?;
        reply.await.map_err(|_| WriteError::ConnectionClosed)?
    }

    /// Response headers. Informational blocks (`:status` 1xx, except 101)
    /// may be sent repeatedly ahead of the final block.
    pub async fn write_headers(
        &mut self,
        fields: Headers,
        end_stream: bool,
    ) -> Result<(), WriteError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            StreamCommand::WriteHeaders {
                id: self.id,
                fields,
                end_stream,
                reply: tx,
            },
            rx,
        )
        .await
    }

    /// Body bytes. Completes once the data is handed to the writer, which
    /// may mean waiting for flow-control credit.
    pub async fn write(
        &mut self,
        data: impl Into<Bytes>,
        end_stream: bool,
    ) -> Result<(), WriteError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            StreamCommand::WriteData {
                id: self.id,
                data: data.into(),
                end_stream,
                reply: tx,
            },
            rx,
        )
        .await
    }

    /// Trailing headers; implies END_STREAM.
    pub async fn write_trailers(&mut self, fields: Headers) -> Result<(), WriteError> {
        let (tx, rx) = oneshot::channel();
        self.roundtrip(
            StreamCommand::WriteTrailers {
                id: self.id,
                fields,
                reply: tx,
            },
            rx,
        )
        .await
    }

    /// Abandons the stream with RST_STREAM(CANCEL). Inbound data is
    /// discarded and pending writes are dropped.
    pub fn cancel(&mut self) {
        self.commands.send(StreamCommand::Cancel { id: self.id }).ok();
    }
}

impl Drop for ServerStream {
    fn drop(&mut self) {
        self.commands.send(StreamCommand::Release { id: self.id }).ok();
    }
}

/// Runs one HTTP/2 connection over `transport`, which must already be past
/// the TLS/ALPN handshake and the connection preface exchange. Resolves
/// when the peer closes cleanly; protocol failures resolve to the error
/// that was also reported in the GOAWAY.
pub async fn serve<T, L>(
    transport: T,
    listener: L,
    config: ServerConfig,
) -> Result<(), ConnectionError>
where
    T: AsyncRead + AsyncWrite + Send + 'static,
    L: StreamListener,
{
    let (reader, writer) = tokio::io::split(transport);
    let (frame_tx, frame_rx) = mpsc::channel(32);
    let (write_tx, write_rx) = mpsc::unbounded_channel();
    tokio::spawn(read_loop(reader, config.max_frame_size, frame_tx));
    tokio::spawn(write_loop(writer, write_rx));
    Connection::new(config, listener, frame_rx, write_tx).run().await
}
