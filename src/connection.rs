use crate::{
    assembly::{self, HeaderBlock},
    flags::*,
    flow::*,
    frame::{Frame, DEFAULT_MAX_FRAME_SIZE, MAX_ALLOWED_FRAME_SIZE},
    hpack::{HeaderEncoder, HpackCodec},
    server::{Accept, ServerStream, StreamCommand, StreamListener},
    stream::{RemoteHeaders, StreamEvent, StreamState},
    stream_coordinator::{Admission, PendingWrite, StreamCoordinator, StreamEntry},
    types::*,
};
use bytes::{Bytes, BytesMut};
use derivative::Derivative;
use enum_map::{enum_map, EnumMap};
use log::{debug, error, trace, warn};
use tokio::{
    io::{AsyncRead, AsyncWrite, AsyncWriteExt},
    sync::{mpsc, oneshot, watch},
};

/// Local limits enforced on the peer. The preface collaborator is expected
/// to advertise the matching SETTINGS before handing the transport over.
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    /// Ceiling on concurrently live remote streams.
    pub max_concurrent_streams: u32,
    /// Largest frame payload accepted, in octets.
    pub max_frame_size: u32,
    /// Largest decoded header list accepted, counted with the 32-octet
    /// per-field overhead.
    pub max_header_fields_size: u32,
    /// Receive-window target for each stream.
    pub initial_window_size: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_streams: 100,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_fields_size: 16_384,
            initial_window_size: DEFAULT_WINDOW_SIZE,
        }
    }
}

#[derive(Debug)]
pub(crate) enum WriteCommand {
    Frame(Frame),
    /// A header block chain; stays contiguous on the wire.
    Frames(Vec<Frame>),
}

/// Owns the read half: parses frames and feeds them to the arbiter until
/// the transport closes or a fatal decode error ends the connection.
pub(crate) async fn read_loop<R: AsyncRead + Unpin>(
    mut reader: R,
    max_frame_size: u32,
    frames: mpsc::Sender<Result<Frame, ConnectionError>>,
) {
    let mut scratch = BytesMut::with_capacity(max_frame_size as usize);
    loop {
        match Frame::read_from(&mut reader, max_frame_size, &mut scratch).await {
            Ok(Some(frame)) => {
                trace!("recv {}", frame.name());
                if frames.send(Ok(frame)).await.is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(err) => {
                frames.send(Err(err)).await.ok();
                return;
            }
        }
    }
}

/// Owns the write half: serializes frame emission in submission order, then
/// shuts the transport down once the arbiter is done with it.
pub(crate) async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut commands: mpsc::UnboundedReceiver<WriteCommand>,
) {
    while let Some(command) = commands.recv().await {
        let result = match &command {
            WriteCommand::Frame(frame) => frame.write_into(&mut writer).await,
            WriteCommand::Frames(frames) => {
                let mut result = Ok(());
                for frame in frames {
                    result = frame.write_into(&mut writer).await;
                    if result.is_err() {
                        break;
                    }
                }
                result
            }
        };
        if let Err(err) = result {
            debug!("write side failed: {}", err);
            return;
        }
    }
    writer.shutdown().await.ok();
}

#[derive(Debug, derive_more::From)]
enum DispatchError {
    Connection(ConnectionError),
    Stream(StreamError),
}

enum Emission {
    Chunk {
        chunk: Bytes,
        end_stream: bool,
        consumed: u32,
        reply: Option<oneshot::Sender<Result<(), WriteError>>>,
    },
    Trailers {
        fields: Headers,
        reply: Option<oneshot::Sender<Result<(), WriteError>>>,
    },
}

/// The per-connection arbiter. Single owner of the registry, the windows
/// and the HPACK tables; everything else talks to it through channels.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Connection<L> {
    config: ServerConfig,
    #[derivative(Debug = "ignore")]
    listener: L,
    streams: StreamCoordinator,
    #[derivative(Debug = "ignore")]
    codec: HpackCodec,
    peer_settings: EnumMap<SettingsParameter, u32>,
    conn_send_window: FlowWindow,
    conn_recv_window: RecvWindow,
    #[derivative(Debug = "ignore")]
    frames: mpsc::Receiver<Result<Frame, ConnectionError>>,
    #[derivative(Debug = "ignore")]
    writes: mpsc::UnboundedSender<WriteCommand>,
    #[derivative(Debug = "ignore")]
    commands_tx: mpsc::UnboundedSender<StreamCommand>,
    #[derivative(Debug = "ignore")]
    commands: mpsc::UnboundedReceiver<StreamCommand>,
    peer_goaway: Option<StreamId>,
}

impl<L: StreamListener> Connection<L> {
    pub fn new(
        config: ServerConfig,
        listener: L,
        frames: mpsc::Receiver<Result<Frame, ConnectionError>>,
        writes: mpsc::UnboundedSender<WriteCommand>,
    ) -> Self {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        Self {
            listener,
            streams: StreamCoordinator::new(config.max_concurrent_streams),
            codec: HpackCodec::new(),
            peer_settings: enum_map! {
                SettingsParameter::HeaderTableSize => 4096,
                SettingsParameter::EnablePush => 1,
                SettingsParameter::MaxConcurrentStreams => u32::MAX,
                SettingsParameter::InitialWindowSize => 65_535,
                SettingsParameter::MaxFrameSize => 16_384,
                SettingsParameter::MaxHeaderListSize => u32::MAX,
            },
            conn_send_window: FlowWindow::new(DEFAULT_WINDOW_SIZE),
            // the connection window opens at the protocol default; SETTINGS
            // cannot resize it, only WINDOW_UPDATE moves it
            conn_recv_window: RecvWindow::new(DEFAULT_WINDOW_SIZE),
            frames,
            writes,
            commands_tx,
            commands,
            peer_goaway: None,
            config,
        }
    }

    pub async fn run(mut self) -> Result<(), ConnectionError> {
        match self.drive().await {
            Ok(()) => {
                self.finish(None);
                Ok(())
            }
            Err(err) => {
                error!("connection failed: {}", err);
                self.finish(Some(&err));
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<(), ConnectionError> {
        loop {
            tokio::select! {
                frame = self.frames.recv() => match frame {
                    Some(Ok(frame)) => self.dispatch(frame).await?,
                    Some(Err(err)) => return Err(err),
                    None => return Ok(()),
                },
                command = self.commands.recv() => {
                    if let Some(command) = command {
                        self.handle_command(command)?;
                    }
                }
            }
        }
    }

    /// Classifies dispatch failures: stream errors reset the one stream and
    /// the loop carries on, connection errors unwind into a GOAWAY.
    async fn dispatch(&mut self, frame: Frame) -> Result<(), ConnectionError> {
        match self.dispatch_frame(frame).await {
            Ok(()) => Ok(()),
            Err(DispatchError::Stream(err)) => {
                debug!("{}", err);
                self.reset_stream(err.stream, err.code)
            }
            Err(DispatchError::Connection(err)) => Err(err),
        }
    }

    async fn dispatch_frame(&mut self, frame: Frame) -> Result<(), DispatchError> {
        match frame {
            Frame::Headers {
                stream,
                flags,
                priority,
                fragment,
            } => {
                // the whole block assembles (and keeps the decoder tables in
                // step) before anything else on the connection is looked at
                let block = assembly::assemble(
                    stream,
                    flags,
                    priority,
                    fragment,
                    &mut self.frames,
                    &mut self.codec,
                    self.config.max_header_fields_size as usize,
                )
                .await?;
                self.incoming_headers(stream, block)
            }
            Frame::Data {
                stream,
                data,
                end_stream,
                flow_len,
            } => self.incoming_data(stream, data, end_stream, flow_len),
            Frame::Priority { stream, priority } => {
                // reprioritizing an untracked (possibly idle) stream is legal
                // and means nothing to us
                if let Some(entry) = self.streams.get_mut(stream) {
                    trace!(
                        "stream {} priority {:?} -> {:?}",
                        stream,
                        entry.priority,
                        priority
                    );
                    entry.priority = Some(priority);
                }
                Ok(())
            }
            Frame::ResetStream { stream, error } => {
                if !self.streams.contains(stream) {
                    if stream.get() > self.streams.highest_remote_id() {
                        return Err(ConnectionError::protocol(format!(
                            "RST_STREAM on idle stream {}",
                            stream
                        ))
                        .into());
                    }
                    return Ok(());
                }
                // unwrap: presence checked above
                let entry = self.streams.get_mut(stream).unwrap();
                warn!("stream {} reset by peer: {:?}", stream, error);
                if entry.machine.reset(error) {
                    fail_pending(entry, WriteError::StreamReset(error));
                    entry.events.send(StreamEvent::Reset(error)).ok();
                }
                self.streams.sync(stream);
                Ok(())
            }
            Frame::Settings { flags, params } => {
                if flags.contains(SettingsFlags::ACK) {
                    trace!("peer acknowledged settings");
                    return Ok(());
                }
                self.apply_settings(&params)?;
                self.send_frame(Frame::Settings {
                    flags: SettingsFlags::ACK,
                    params: Vec::new(),
                })?;
                // an INITIAL_WINDOW_SIZE bump may have unparked writes
                self.pump_all()?;
                Ok(())
            }
            Frame::Ping { flags, data } => {
                if !flags.contains(PingFlags::ACK) {
                    self.send_frame(Frame::Ping {
                        flags: PingFlags::ACK,
                        data,
                    })?;
                }
                Ok(())
            }
            Frame::GoAway {
                last_stream,
                error,
                debug,
            } => {
                error!("go away: {:?}", error);
                if !debug.is_empty() {
                    debug!("go away debug: {}", String::from_utf8_lossy(&debug));
                }
                self.peer_goaway = Some(last_stream);
                Ok(())
            }
            Frame::WindowUpdate { stream, increment } => {
                if stream == 0 {
                    if self.conn_send_window.credit(increment.get()).is_err() {
                        return Err(ConnectionError::new(
                            ErrorType::FlowControlError,
                            "connection send window overflow",
                        )
                        .into());
                    }
                    self.pump_all()?;
                    return Ok(());
                }
                // unwrap: the zero case returned above
                let id = NonZeroStreamId::new(stream).unwrap();
                if let Some(entry) = self.streams.get_mut(id) {
                    if entry.send_window.credit(increment.get()).is_err() {
                        return Err(StreamError::new(id, ErrorType::FlowControlError).into());
                    }
                    self.pump_stream(id)?;
                } else if stream > self.streams.highest_remote_id() {
                    return Err(ConnectionError::protocol(format!(
                        "WINDOW_UPDATE on idle stream {}",
                        stream
                    ))
                    .into());
                }
                // anything else is late credit for a stream we no longer track
                Ok(())
            }
            Frame::Continuation { stream, .. } => Err(ConnectionError::protocol(format!(
                "CONTINUATION on stream {} without an open header block",
                stream
            ))
            .into()),
            Frame::Unknown { typ, .. } => {
                trace!("ignoring unknown frame type {:#x}", typ);
                Ok(())
            }
        }
    }

    fn incoming_headers(
        &mut self,
        id: NonZeroStreamId,
        block: HeaderBlock,
    ) -> Result<(), DispatchError> {
        match self.streams.admit(id.get())? {
            Admission::Refuse(code) => {
                trace!("refusing stream {} with {:?}", id, code);
                self.send_frame(Frame::ResetStream { stream: id, error: code })?;
                Ok(())
            }
            Admission::Existing => {
                let entry = self.streams.get_mut(id).expect("existing stream is tracked");
                match entry.machine.recv_headers(block.end_stream) {
                    Ok(RemoteHeaders::Trailers) => {
                        entry.events.send(StreamEvent::Trailers(block.fields)).ok();
                    }
                    Ok(RemoteHeaders::Initial) => {
                        entry.events.send(StreamEvent::Headers(block)).ok();
                    }
                    Err(err) => return Err(err.into()),
                }
                self.streams.sync(id);
                Ok(())
            }
            Admission::Admit => {
                if let Some(last) = self.peer_goaway {
                    trace!(
                        "peer sent GOAWAY(last_stream={}), still admitting stream {}",
                        last,
                        id
                    );
                }
                let (events_tx, events_rx) = mpsc::unbounded_channel();
                let (state_tx, state_rx) = watch::channel(StreamState::Idle);
                let mut entry = StreamEntry::new(
                    id,
                    self.peer_settings[SettingsParameter::InitialWindowSize],
                    self.config.initial_window_size,
                    events_tx,
                    state_tx,
                );
                entry.priority = block.priority;
                entry
                    .machine
                    .recv_headers(block.end_stream)
                    .expect("fresh streams accept headers");
                entry.events.send(StreamEvent::Headers(block)).ok();
                self.streams.insert(id, entry);
                self.streams.sync(id);

                let handle = ServerStream::new(id, self.commands_tx.clone(), events_rx, state_rx);
                match self.listener.accept(handle) {
                    Accept::Accept => Ok(()),
                    Accept::Refuse => {
                        trace!("listener refused stream {}", id);
                        self.streams.evict(id);
                        self.send_frame(Frame::ResetStream {
                            stream: id,
                            error: ErrorType::RefusedStream,
                        })?;
                        Ok(())
                    }
                }
            }
        }
    }

    fn incoming_data(
        &mut self,
        id: NonZeroStreamId,
        data: Bytes,
        end_stream: bool,
        flow_len: u32,
    ) -> Result<(), DispatchError> {
        // every payload octet counts here, the pad-length octet and the
        // padding included
        if self.conn_recv_window.receive(flow_len).is_err() {
            return Err(ConnectionError::new(
                ErrorType::FlowControlError,
                "connection receive window exhausted",
            )
            .into());
        }
        if let Some(increment) = self.conn_recv_window.refill() {
            self.send_frame(Frame::WindowUpdate {
                stream: 0,
                increment,
            })?;
        }

        if !self.streams.contains(id) {
            if id.get() > self.streams.highest_remote_id() {
                return Err(
                    ConnectionError::protocol(format!("DATA on idle stream {}", id)).into(),
                );
            }
            trace!("ignoring DATA on untracked stream {}", id);
            return Ok(());
        }
        // unwrap: presence checked above
        let entry = self.streams.get_mut(id).unwrap();
        if entry.machine.state().is_terminal() {
            trace!(
                "ignoring DATA on {:?} stream {}",
                entry.machine.state(),
                id
            );
            return Ok(());
        }
        if entry.recv_window.receive(flow_len).is_err() {
            return Err(StreamError::new(id, ErrorType::FlowControlError).into());
        }
        entry.machine.recv_data(end_stream)?;
        let refill = entry.recv_window.refill();
        entry.events.send(StreamEvent::Data { data, end_stream }).ok();
        self.streams.sync(id);
        if let Some(increment) = refill {
            self.send_frame(Frame::WindowUpdate {
                stream: id.get(),
                increment,
            })?;
        }
        Ok(())
    }

    fn apply_settings(
        &mut self,
        params: &[(SettingsParameter, u32)],
    ) -> Result<(), ConnectionError> {
        for &(param, value) in params {
            match param {
                SettingsParameter::EnablePush if value > 1 => {
                    return Err(ConnectionError::protocol("ENABLE_PUSH must be 0 or 1"));
                }
                SettingsParameter::InitialWindowSize if value > U31_MAX => {
                    return Err(ConnectionError::new(
                        ErrorType::FlowControlError,
                        "INITIAL_WINDOW_SIZE above 2^31-1",
                    ));
                }
                SettingsParameter::MaxFrameSize
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_ALLOWED_FRAME_SIZE).contains(&value) =>
                {
                    return Err(ConnectionError::protocol(format!(
                        "MAX_FRAME_SIZE {} out of range",
                        value
                    )));
                }
                _ => {}
            }
            if param == SettingsParameter::InitialWindowSize {
                // the delta retro-applies to every stream's send window, and
                // may push some of them negative
                let delta = i64::from(value) - i64::from(self.peer_settings[param]);
                for id in self.streams.ids() {
                    if let Some(entry) = self.streams.get_mut(id) {
                        entry.send_window.adjust(delta);
                    }
                }
            }
            trace!("peer setting {:?} = {}", param, value);
            self.peer_settings[param] = value;
        }
        Ok(())
    }

    fn handle_command(&mut self, command: StreamCommand) -> Result<(), ConnectionError> {
        match command {
            StreamCommand::WriteHeaders {
                id,
                fields,
                end_stream,
                reply,
            } => {
                let Some(entry) = self.streams.get_mut(id) else {
                    reply.send(Err(WriteError::StreamClosed)).ok();
                    return Ok(());
                };
                let informational = is_informational(&fields);
                if let Err(err) = entry.machine.send_headers(end_stream, informational) {
                    reply.send(Err(err)).ok();
                    return Ok(());
                }
                let frames = self.encode_header_frames(id, &fields, end_stream);
                self.send_frames(frames)?;
                self.streams.sync(id);
                reply.send(Ok(())).ok();
                Ok(())
            }
            StreamCommand::WriteData {
                id,
                data,
                end_stream,
                reply,
            } => {
                let Some(entry) = self.streams.get_mut(id) else {
                    reply.send(Err(WriteError::StreamClosed)).ok();
                    return Ok(());
                };
                if let Err(err) = entry.machine.send_data(end_stream) {
                    reply.send(Err(err)).ok();
                    return Ok(());
                }
                entry.pending.push_back(PendingWrite::Data {
                    data,
                    end_stream,
                    reply: Some(reply),
                });
                self.streams.sync(id);
                self.pump_stream(id)
            }
            StreamCommand::WriteTrailers { id, fields, reply } => {
                let Some(entry) = self.streams.get_mut(id) else {
                    reply.send(Err(WriteError::StreamClosed)).ok();
                    return Ok(());
                };
                if let Err(err) = entry.machine.send_trailers() {
                    reply.send(Err(err)).ok();
                    return Ok(());
                }
                entry.pending.push_back(PendingWrite::Trailers {
                    fields,
                    reply: Some(reply),
                });
                self.streams.sync(id);
                self.pump_stream(id)
            }
            StreamCommand::Cancel { id } => {
                let Some(entry) = self.streams.get_mut(id) else {
                    return Ok(());
                };
                if entry.machine.reset(ErrorType::Cancel) {
                    fail_pending(entry, WriteError::StreamReset(ErrorType::Cancel));
                    self.send_frame(Frame::ResetStream {
                        stream: id,
                        error: ErrorType::Cancel,
                    })?;
                }
                self.streams.sync(id);
                Ok(())
            }
            StreamCommand::Release { id } => {
                self.streams.release(id);
                Ok(())
            }
        }
    }

    /// Resets one stream in response to a stream-level error, emitting the
    /// RST_STREAM even when the machine already sits in a terminal state.
    fn reset_stream(&mut self, id: NonZeroStreamId, code: ErrorType) -> Result<(), ConnectionError> {
        if let Some(entry) = self.streams.get_mut(id) {
            if entry.machine.reset(code) {
                fail_pending(entry, WriteError::StreamReset(code));
                entry.events.send(StreamEvent::Reset(code)).ok();
            }
        }
        self.send_frame(Frame::ResetStream {
            stream: id,
            error: code,
        })?;
        self.streams.sync(id);
        Ok(())
    }

    /// Splits one encoded header block into HEADERS + CONTINUATION frames
    /// sized to the peer's MAX_FRAME_SIZE. Must be queued as one unit.
    fn encode_header_frames(
        &mut self,
        id: NonZeroStreamId,
        fields: &Headers,
        end_stream: bool,
    ) -> Vec<Frame> {
        let fragment = Bytes::from(self.codec.encode_block(fields));
        let max = self.peer_settings[SettingsParameter::MaxFrameSize] as usize;
        let mut flags = HeadersFlags::empty();
        if end_stream {
            flags |= HeadersFlags::END_STREAM;
        }
        if fragment.len() <= max {
            return vec![Frame::Headers {
                stream: id,
                flags: flags | HeadersFlags::END_HEADERS,
                priority: None,
                fragment,
            }];
        }
        let mut frames = vec![Frame::Headers {
            stream: id,
            flags,
            priority: None,
            fragment: fragment.slice(..max),
        }];
        let mut offset = max;
        while offset < fragment.len() {
            let end = (offset + max).min(fragment.len());
            let mut continuation = ContinuationFlags::empty();
            if end == fragment.len() {
                continuation |= ContinuationFlags::END_HEADERS;
            }
            frames.push(Frame::Continuation {
                stream: id,
                flags: continuation,
                fragment: fragment.slice(offset..end),
            });
            offset = end;
        }
        frames
    }

    /// Drains a stream's parked writes as far as flow-control credit allows.
    fn pump_stream(&mut self, id: NonZeroStreamId) -> Result<(), ConnectionError> {
        let max_frame = self.peer_settings[SettingsParameter::MaxFrameSize] as i64;
        loop {
            let conn_available = self.conn_send_window.available();
            let emission = {
                let Some(entry) = self.streams.get_mut(id) else {
                    return Ok(());
                };
                match entry.pending.front_mut() {
                    None => return Ok(()),
                    Some(PendingWrite::Trailers { .. }) => match entry.pending.pop_front() {
                        Some(PendingWrite::Trailers { fields, reply }) => {
                            Emission::Trailers { fields, reply }
                        }
                        _ => unreachable!("front was trailers"),
                    },
                    Some(PendingWrite::Data {
                        data,
                        end_stream,
                        reply,
                    }) => {
                        if data.is_empty() {
                            // zero-length frames cost no credit and may still
                            // carry END_STREAM
                            let emission = Emission::Chunk {
                                chunk: Bytes::new(),
                                end_stream: *end_stream,
                                consumed: 0,
                                reply: reply.take(),
                            };
                            entry.pending.pop_front();
                            emission
                        } else {
                            let budget = entry
                                .send_window
                                .available()
                                .min(conn_available)
                                .min(max_frame);
                            if budget <= 0 {
                                // parked until WINDOW_UPDATE credit arrives
                                return Ok(());
                            }
                            let take = (budget as usize).min(data.len());
                            let chunk = data.split_to(take);
                            entry
                                .send_window
                                .consume(take as u32)
                                .expect("budget within window");
                            let finished = data.is_empty();
                            let end_stream = *end_stream && finished;
                            let reply = if finished { reply.take() } else { None };
                            if finished {
                                entry.pending.pop_front();
                            }
                            Emission::Chunk {
                                chunk,
                                end_stream,
                                consumed: take as u32,
                                reply,
                            }
                        }
                    }
                }
            };
            match emission {
                Emission::Trailers { fields, reply } => {
                    let frames = self.encode_header_frames(id, &fields, true);
                    self.send_frames(frames)?;
                    if let Some(reply) = reply {
                        reply.send(Ok(())).ok();
                    }
                }
                Emission::Chunk {
                    chunk,
                    end_stream,
                    consumed,
                    reply,
                } => {
                    if consumed > 0 {
                        self.conn_send_window
                            .consume(consumed)
                            .expect("budget within window");
                    }
                    self.send_frame(Frame::data(id, chunk, end_stream))?;
                    if let Some(reply) = reply {
                        reply.send(Ok(())).ok();
                    }
                }
            }
        }
    }

    fn pump_all(&mut self) -> Result<(), ConnectionError> {
        for id in self.streams.ids() {
            self.pump_stream(id)?;
        }
        Ok(())
    }

    fn send_frame(&self, frame: Frame) -> Result<(), ConnectionError> {
        trace!("send {}", frame.name());
        self.writes
            .send(WriteCommand::Frame(frame))
            .map_err(|_| ConnectionError::write_side_closed())
    }

    fn send_frames(&self, frames: Vec<Frame>) -> Result<(), ConnectionError> {
        self.writes
            .send(WriteCommand::Frames(frames))
            .map_err(|_| ConnectionError::write_side_closed())
    }

    /// Unwinds the connection: GOAWAY for protocol failures, then every
    /// remaining stream is cancelled. Queued frames flush as the writer
    /// drains its channel.
    fn finish(&mut self, error: Option<&ConnectionError>) {
        if let Some(err) = error {
            if let Some(code) = err.goaway_code() {
                self.send_frame(Frame::GoAway {
                    last_stream: self.streams.highest_remote_id(),
                    error: code,
                    debug: Bytes::from(err.to_string()),
                })
                .ok();
            }
        }
        for id in self.streams.ids() {
            if let Some(entry) = self.streams.get_mut(id) {
                if entry.machine.reset(ErrorType::Cancel) {
                    fail_pending(entry, WriteError::ConnectionClosed);
                    entry.events.send(StreamEvent::Reset(ErrorType::Cancel)).ok();
                }
            }
            self.streams.sync(id);
        }
    }
}

fn fail_pending(entry: &mut StreamEntry, err: WriteError) {
    for item in entry.pending.drain(..) {
        let (PendingWrite::Data { reply, .. } | PendingWrite::Trailers { reply, .. }) = item;
        if let Some(reply) = reply {
            reply.send(Err(err)).ok();
        }
    }
}

/// 1xx responses other than 101 are informational: they repeat freely ahead
/// of the final response headers.
fn is_informational(fields: &Headers) -> bool {
    fields
        .iter()
        .find(|(name, _)| name == ":status")
        .map_or(false, |(_, status)| status.starts_with('1') && status != "101")
}
