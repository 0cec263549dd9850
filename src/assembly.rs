use crate::{
    flags::*,
    frame::{Frame, PriorityUpdate},
    hpack::{HeaderBlockError, HeaderDecoder},
    types::*,
};
use bytes::{Bytes, BytesMut};
use std::io;
use tokio::sync::mpsc;

/// A fully assembled and decoded header block. Never observed partially:
/// the assembler runs to END_HEADERS (or an error) before anything else on
/// the connection is processed.
#[derive(Debug, Clone)]
pub struct HeaderBlock {
    pub priority: Option<PriorityUpdate>,
    pub fields: Headers,
    pub end_stream: bool,
}

/// Fuses the initial HEADERS frame with its CONTINUATION chain and decodes
/// the result. `end_stream` comes from the first frame only; CONTINUATION
/// carries no such flag.
pub(crate) async fn assemble(
    stream: NonZeroStreamId,
    flags: HeadersFlags,
    priority: Option<PriorityUpdate>,
    fragment: Bytes,
    frames: &mut mpsc::Receiver<Result<Frame, ConnectionError>>,
    decoder: &mut dyn HeaderDecoder,
    max_header_fields_size: usize,
) -> Result<HeaderBlock, ConnectionError> {
    let end_stream = flags.contains(HeadersFlags::END_STREAM);
    let mut done = flags.contains(HeadersFlags::END_HEADERS);
    // compressed fragments cannot legally outgrow the decoded limit by much;
    // the 2x cap bounds accumulation before the decoder gets to veto
    let compressed_cap = max_header_fields_size.saturating_mul(2);
    let mut block = BytesMut::with_capacity(fragment.len());

    append_fragment(&mut block, &fragment, compressed_cap)?;

    while !done {
        let frame = match frames.recv().await {
            Some(frame) => frame?,
            None => {
                return Err(ConnectionError::TransportClosed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "transport closed mid header block",
                )))
            }
        };
        match frame {
            Frame::Continuation {
                stream: continued,
                flags,
                fragment,
            } if continued == stream => {
                if fragment.is_empty() {
                    return Err(ConnectionError::protocol(format!(
                        "zero-length CONTINUATION on stream {}",
                        stream
                    )));
                }
                append_fragment(&mut block, &fragment, compressed_cap)?;
                done = flags.contains(ContinuationFlags::END_HEADERS);
            }
            other => {
                return Err(ConnectionError::protocol(format!(
                    "expected CONTINUATION on stream {}, got {} on stream {}",
                    stream,
                    other.name(),
                    frame_stream(&other),
                )))
            }
        }
    }

    let fields = decoder
        .decode_block(&block, max_header_fields_size)
        .map_err(|err| match err {
            HeaderBlockError::TooLarge { limit } => ConnectionError::protocol(format!(
                "decoded header block on stream {} exceeds {} octets",
                stream, limit
            )),
            // the decoder stopped mid-field at END_HEADERS; its table state
            // is undefined from here on
            HeaderBlockError::Malformed => ConnectionError::new(
                ErrorType::CompressionError,
                format!("truncated or malformed header block on stream {}", stream),
            ),
        })?;

    Ok(HeaderBlock {
        priority,
        fields,
        end_stream,
    })
}

fn append_fragment(
    block: &mut BytesMut,
    fragment: &[u8],
    compressed_cap: usize,
) -> Result<(), ConnectionError> {
    if block.len() + fragment.len() > compressed_cap {
        return Err(ConnectionError::protocol(format!(
            "header block fragments exceed {} octets",
            compressed_cap
        )));
    }
    block.extend_from_slice(fragment);
    Ok(())
}

fn frame_stream(frame: &Frame) -> StreamId {
    match frame {
        Frame::Data { stream, .. }
        | Frame::Headers { stream, .. }
        | Frame::Priority { stream, .. }
        | Frame::ResetStream { stream, .. }
        | Frame::Continuation { stream, .. } => stream.get(),
        Frame::WindowUpdate { stream, .. } | Frame::Unknown { stream, .. } => *stream,
        Frame::Settings { .. } | Frame::Ping { .. } | Frame::GoAway { .. } => 0,
    }
}
