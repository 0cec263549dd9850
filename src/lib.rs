#![warn(future_incompatible, nonstandard_style, rust_2018_idioms, unused)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::wildcard_imports,
    clippy::similar_names,
    clippy::cast_possible_truncation,
    clippy::too_many_lines,
)]

mod assembly;
mod connection;
mod flags;
mod flow;
mod frame;
mod hpack;
mod server;
mod stream;
mod stream_coordinator;
mod types;

pub use assembly::HeaderBlock;
pub use bytes::Bytes;
pub use connection::ServerConfig;
pub use flags::{ContinuationFlags, DataFlags, HeadersFlags, PingFlags, SettingsFlags};
pub use flow::DEFAULT_WINDOW_SIZE;
pub use frame::{
    Frame, FrameHeader, PriorityUpdate, CONNECTION_PREFACE, DEFAULT_MAX_FRAME_SIZE,
    FRAME_HEADER_LEN, MAX_ALLOWED_FRAME_SIZE,
};
pub use hpack::{HeaderBlockError, HeaderDecoder, HeaderEncoder, HpackCodec};
pub use server::{serve, Accept, ServerStream, StreamListener};
pub use stream::StreamState;
pub use types::{
    ConnectionError, ErrorType, FrameDecodeError, FrameType, Headers, NonZeroStreamId, ReadError,
    SettingsParameter, StreamError, StreamId, WriteError,
};
