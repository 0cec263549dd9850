use num_derive::{FromPrimitive, ToPrimitive};

pub const U31_MAX: u32 = u32::MAX >> 1;

pub type StreamId = u32;
pub type NonZeroStreamId = std::num::NonZeroU32;

/// Decoded header fields in wire order. Names are ASCII-lowercase per the
/// HTTP/2 rule; pseudo-headers (`:`-prefixed) precede regular fields.
pub type Headers = Vec<(String, String)>;

/// https://httpwg.org/specs/rfc7540.html#FrameTypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u8)]
#[non_exhaustive]
pub enum FrameType {
    Data = 0x0,
    Headers = 0x1,
    Priority = 0x2,
    ResetStream = 0x3,
    Settings = 0x4,
    PushPromise = 0x5,
    Ping = 0x6,
    GoAway = 0x7,
    WindowUpdate = 0x8,
    Continuation = 0x9,
}

/// https://httpwg.org/specs/rfc7540.html#ErrorCodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
#[non_exhaustive]
pub enum ErrorType {
    /// The associated condition is not a result of an error.
    NoError = 0x0,
    /// The endpoint detected an unspecific protocol error.
    ProtocolError = 0x1,
    /// The endpoint encountered an unexpected internal error.
    InternalError = 0x2,
    /// The endpoint detected that its peer violated the flow-control protocol.
    FlowControlError = 0x3,
    /// The endpoint sent a SETTINGS frame but did not receive a response in a timely manner.
    SettingsTimeout = 0x4,
    /// The endpoint received a frame after a stream was half-closed.
    StreamClosed = 0x5,
    /// The endpoint received a frame with an invalid size.
    FrameSizeError = 0x6,
    /// The endpoint refused the stream prior to performing any application processing.
    RefusedStream = 0x7,
    /// Used by the endpoint to indicate that the stream is no longer needed.
    Cancel = 0x8,
    /// The endpoint is unable to maintain the header compression context for the connection.
    CompressionError = 0x9,
    /// The connection established in response to a CONNECT request was reset or abnormally closed.
    ConnectError = 0xa,
    /// The endpoint detected that its peer is exhibiting a behavior that might be generating excessive load.
    EnhanceYourCalm = 0xb,
    /// The underlying transport has properties that do not meet minimum security requirements.
    InadequateSecurity = 0xc,
    /// The endpoint requires that HTTP/1.1 be used instead of HTTP/2.
    Http11Required = 0xd,
}

/// https://httpwg.org/specs/rfc7540.html#SettingValues
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    FromPrimitive,
    ToPrimitive,
    enum_map::Enum,
)]
#[repr(u16)]
#[non_exhaustive]
pub enum SettingsParameter {
    /// Maximum size of the header compression table used to decode header blocks, in octets.
    HeaderTableSize = 0x1,
    /// Can be used to disable server push. Any value other than 0 or 1 is a
    /// connection error of type PROTOCOL_ERROR.
    EnablePush = 0x2,
    /// Maximum number of concurrent streams the sender will allow.
    MaxConcurrentStreams = 0x3,
    /// The sender's initial window size (in octets) for stream-level flow
    /// control. Values above 2^31-1 are a connection error of type
    /// FLOW_CONTROL_ERROR.
    InitialWindowSize = 0x4,
    /// Size of the largest frame payload the sender is willing to receive, in
    /// octets. Must stay within [2^14, 2^24-1].
    MaxFrameSize = 0x5,
    /// Advisory maximum size of a header list, counted uncompressed with a
    /// 32-octet overhead per field.
    MaxHeaderListSize = 0x6,
}

/// Failures while parsing a single frame off the wire. The reader converts
/// these into [`ConnectionError`]s with the matching HTTP/2 error code.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDecodeError {
    #[error("payload is shorter than expected")]
    PayloadTooShort,
    #[error("unexpected 0 stream ID")]
    ZeroStreamId,
    #[error("unexpected non-0 stream ID")]
    NonZeroStreamId,
    #[error("unexpected 0 window increment")]
    ZeroWindowIncrement,
    #[error("padding or prefix exceeds the frame payload")]
    InvalidPadding,
    #[error("SETTINGS payload is not a multiple of 6 octets")]
    BadSettingsLength,
    #[error("SETTINGS ack with a non-empty payload")]
    NonEmptySettingsAck,
    #[error("clients cannot promise pushed streams")]
    UnexpectedPushPromise,
}

impl FrameDecodeError {
    pub fn code(self) -> ErrorType {
        match self {
            Self::PayloadTooShort | Self::BadSettingsLength | Self::NonEmptySettingsAck => {
                ErrorType::FrameSizeError
            }
            Self::ZeroStreamId
            | Self::NonZeroStreamId
            | Self::ZeroWindowIncrement
            | Self::InvalidPadding
            | Self::UnexpectedPushPromise => ErrorType::ProtocolError,
        }
    }
}

/// Fatal, connection-wide failures. Protocol variants unwind the arbiter
/// loop into a GOAWAY carrying `code`; transport variants just tear down.
#[derive(thiserror::Error, Debug)]
pub enum ConnectionError {
    #[error("connection error {code:?}: {message}")]
    Protocol { code: ErrorType, message: String },
    #[error("transport closed: {0}")]
    TransportClosed(#[from] std::io::Error),
}

impl ConnectionError {
    pub fn new(code: ErrorType, message: impl Into<String>) -> Self {
        Self::Protocol {
            code,
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorType::ProtocolError, message)
    }

    /// The code to put in the GOAWAY frame, if one should be sent at all.
    pub fn goaway_code(&self) -> Option<ErrorType> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            Self::TransportClosed(_) => None,
        }
    }

    pub(crate) fn write_side_closed() -> Self {
        Self::TransportClosed(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "write side closed",
        ))
    }
}

impl From<FrameDecodeError> for ConnectionError {
    fn from(err: FrameDecodeError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// A failure scoped to one stream: the stream is reset with `code` and the
/// connection keeps running.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("stream {stream} error: {code:?}")]
pub struct StreamError {
    pub stream: NonZeroStreamId,
    pub code: ErrorType,
}

impl StreamError {
    pub fn new(stream: NonZeroStreamId, code: ErrorType) -> Self {
        Self { stream, code }
    }
}

/// Application-side failures of the write half of a stream handle. The
/// stream's wire state is unchanged unless the variant says otherwise.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteError {
    #[error("attempted to write data before headers")]
    DataBeforeHeaders,
    #[error("attempted to write trailers without data")]
    TrailersWithoutData,
    #[error("final response headers were already sent")]
    HeadersAlreadySent,
    #[error("informational headers cannot end the stream")]
    InformationalEndStream,
    #[error("stream was reset: {0:?}")]
    StreamReset(ErrorType),
    #[error("stream is closed")]
    StreamClosed,
    #[error("connection closed")]
    ConnectionClosed,
}

/// Failures of the read half of a stream handle.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadError {
    #[error("stream was reset: {0:?}")]
    StreamReset(ErrorType),
    #[error("connection closed")]
    ConnectionClosed,
}
