use crate::{assembly::HeaderBlock, types::*};
use bytes::Bytes;
use log::trace;

/// https://httpwg.org/specs/rfc7540.html#StreamStates
///
/// `Reset` is split out of `Closed` so callers can tell "we cancelled or
/// errored" apart from "the exchange finished".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
    Reset,
}

impl StreamState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Closed | Self::Reset)
    }

    /// Whether a stream in this state occupies one of the remote peer's
    /// MAX_CONCURRENT_STREAMS slots.
    pub fn occupies_slot(self) -> bool {
        matches!(
            self,
            Self::Idle | Self::Open | Self::HalfClosedLocal | Self::HalfClosedRemote | Self::ReservedRemote
        )
    }
}

/// Inbound events routed from the arbiter to a stream handle.
#[derive(Debug)]
pub(crate) enum StreamEvent {
    Headers(HeaderBlock),
    Data { data: Bytes, end_stream: bool },
    Trailers(Headers),
    Reset(ErrorType),
}

/// What an incoming HEADERS block meant for an already-tracked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemoteHeaders {
    Initial,
    Trailers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingHeaders,
    Streaming,
    Done,
}

/// Per-stream lifecycle machine. Remote events arrive in wire order from the
/// arbiter; local events come from the application handle. Flow-control and
/// buffering live elsewhere; this only owns legality and state.
#[derive(Debug)]
pub(crate) struct StreamMachine {
    id: NonZeroStreamId,
    state: StreamState,
    local: Phase,
    remote: Phase,
    sent_data: bool,
    reset_code: Option<ErrorType>,
}

impl StreamMachine {
    pub fn new(id: NonZeroStreamId) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            local: Phase::AwaitingHeaders,
            remote: Phase::AwaitingHeaders,
            sent_data: false,
            reset_code: None,
        }
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    pub fn reset_code(&self) -> Option<ErrorType> {
        self.reset_code
    }

    fn set_state(&mut self, next: StreamState) {
        if self.state != next {
            trace!("stream {} {:?} -> {:?}", self.id, self.state, next);
            self.state = next;
        }
    }

    fn close_remote_half(&mut self) {
        self.remote = Phase::Done;
        match self.state {
            StreamState::Open => self.set_state(StreamState::HalfClosedRemote),
            StreamState::HalfClosedLocal => self.set_state(StreamState::Closed),
            _ => {}
        }
    }

    fn close_local_half(&mut self) {
        self.local = Phase::Done;
        match self.state {
            StreamState::Open => self.set_state(StreamState::HalfClosedLocal),
            StreamState::HalfClosedRemote => self.set_state(StreamState::Closed),
            _ => {}
        }
    }

    /// A complete remote header block. On a fresh stream this opens it; on a
    /// streaming one it is only legal as trailers (which imply END_STREAM).
    pub fn recv_headers(&mut self, end_stream: bool) -> Result<RemoteHeaders, StreamError> {
        match self.state {
            StreamState::Idle => {
                self.remote = Phase::Streaming;
                self.set_state(StreamState::Open);
                if end_stream {
                    self.close_remote_half();
                }
                Ok(RemoteHeaders::Initial)
            }
            StreamState::Open | StreamState::HalfClosedLocal
                if self.remote == Phase::Streaming =>
            {
                if !end_stream {
                    return Err(StreamError::new(self.id, ErrorType::ProtocolError));
                }
                self.close_remote_half();
                Ok(RemoteHeaders::Trailers)
            }
            StreamState::HalfClosedRemote | StreamState::Closed | StreamState::Reset => {
                Err(StreamError::new(self.id, ErrorType::StreamClosed))
            }
            _ => Err(StreamError::new(self.id, ErrorType::ProtocolError)),
        }
    }

    pub fn recv_data(&mut self, end_stream: bool) -> Result<(), StreamError> {
        match self.state {
            StreamState::Open | StreamState::HalfClosedLocal
                if self.remote == Phase::Streaming =>
            {
                if end_stream {
                    self.close_remote_half();
                }
                Ok(())
            }
            StreamState::HalfClosedRemote | StreamState::Closed | StreamState::Reset => {
                Err(StreamError::new(self.id, ErrorType::StreamClosed))
            }
            _ => Err(StreamError::new(self.id, ErrorType::ProtocolError)),
        }
    }

    /// Moves the stream to Reset. Returns false if it was already terminal
    /// (nothing to do, nothing to emit).
    pub fn reset(&mut self, code: ErrorType) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        self.reset_code = Some(code);
        self.set_state(StreamState::Reset);
        true
    }

    fn check_writable(&self) -> Result<(), WriteError> {
        match self.state {
            StreamState::Reset => Err(WriteError::StreamReset(
                self.reset_code.unwrap_or(ErrorType::Cancel),
            )),
            StreamState::Closed => Err(WriteError::StreamClosed),
            _ => Ok(()),
        }
    }

    /// Local response headers. Informational blocks (1xx other than 101) may
    /// repeat and never transition the state.
    pub fn send_headers(&mut self, end_stream: bool, informational: bool) -> Result<(), WriteError> {
        self.check_writable()?;
        if self.local != Phase::AwaitingHeaders {
            return Err(WriteError::HeadersAlreadySent);
        }
        if informational {
            if end_stream {
                return Err(WriteError::InformationalEndStream);
            }
            return Ok(());
        }
        self.local = Phase::Streaming;
        if end_stream {
            self.close_local_half();
        }
        Ok(())
    }

    pub fn send_data(&mut self, end_stream: bool) -> Result<(), WriteError> {
        self.check_writable()?;
        match self.local {
            Phase::AwaitingHeaders => Err(WriteError::DataBeforeHeaders),
            Phase::Done => Err(WriteError::StreamClosed),
            Phase::Streaming => {
                self.sent_data = true;
                if end_stream {
                    self.close_local_half();
                }
                Ok(())
            }
        }
    }

    /// Trailers always carry END_STREAM, and need an established body phase:
    /// at least one prior data write, even a zero-length one.
    pub fn send_trailers(&mut self) -> Result<(), WriteError> {
        self.check_writable()?;
        match self.local {
            Phase::Streaming if self.sent_data => {
                self.close_local_half();
                Ok(())
            }
            Phase::AwaitingHeaders | Phase::Streaming => Err(WriteError::TrailersWithoutData),
            Phase::Done => Err(WriteError::StreamClosed),
        }
    }
}
