use crate::{flags::*, types::*};
use bytes::{BufMut, Bytes, BytesMut};
use num_traits::{FromPrimitive, ToPrimitive};
use std::{io, num::NonZeroU32};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const FRAME_HEADER_LEN: usize = 9;
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
pub const MAX_ALLOWED_FRAME_SIZE: u32 = (1 << 24) - 1;

/// The 24-octet client magic. The preface exchange itself happens before the
/// engine takes over; the constant lives here for collaborators that do it.
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

/// https://httpwg.org/specs/rfc7540.html#FrameHeader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: u32,
    pub typ: u8,
    pub flags: u8,
    pub stream: StreamId,
}

impl FrameHeader {
    pub fn parse(raw: &[u8; FRAME_HEADER_LEN]) -> Self {
        Self {
            length: u32::from_be_bytes([0, raw[0], raw[1], raw[2]]),
            typ: raw[3],
            flags: raw[4],
            // the reserved high bit is ignored on read
            stream: u32::from_be_bytes([raw[5], raw[6], raw[7], raw[8]]) & U31_MAX,
        }
    }

    pub fn encode(&self) -> [u8; FRAME_HEADER_LEN] {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        raw[0..3].copy_from_slice(&self.length.to_be_bytes()[1..]);
        raw[3] = self.typ;
        raw[4] = self.flags;
        raw[5..9].copy_from_slice(&(self.stream & U31_MAX).to_be_bytes());
        raw
    }
}

/// The priority block carried by PRIORITY frames and flagged HEADERS frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriorityUpdate {
    pub dependency: StreamId,
    pub exclusive: bool,
    pub weight: u8,
}

impl PriorityUpdate {
    fn parse(raw: &[u8]) -> Self {
        let word = u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]);
        Self {
            dependency: word & U31_MAX,
            exclusive: word > U31_MAX,
            weight: raw[4],
        }
    }

    fn encode(&self) -> [u8; 5] {
        let mut word = self.dependency & U31_MAX;
        if self.exclusive {
            word |= !U31_MAX;
        }
        let mut raw = [0u8; 5];
        raw[0..4].copy_from_slice(&word.to_be_bytes());
        raw[4] = self.weight;
        raw
    }
}

/// A parsed frame. Padding and priority prefixes are stripped at parse time;
/// `flow_len` on DATA keeps the full wire payload length for flow control.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Data {
        stream: NonZeroStreamId,
        data: Bytes,
        end_stream: bool,
        flow_len: u32,
    },
    Headers {
        stream: NonZeroStreamId,
        flags: HeadersFlags,
        priority: Option<PriorityUpdate>,
        fragment: Bytes,
    },
    Priority {
        stream: NonZeroStreamId,
        priority: PriorityUpdate,
    },
    ResetStream {
        stream: NonZeroStreamId,
        error: ErrorType,
    },
    Settings {
        flags: SettingsFlags,
        params: Vec<(SettingsParameter, u32)>,
    },
    Ping {
        flags: PingFlags,
        data: [u8; 8],
    },
    GoAway {
        last_stream: StreamId,
        error: ErrorType,
        debug: Bytes,
    },
    WindowUpdate {
        stream: StreamId,
        increment: NonZeroU32,
    },
    Continuation {
        stream: NonZeroStreamId,
        flags: ContinuationFlags,
        fragment: Bytes,
    },
    Unknown {
        typ: u8,
        stream: StreamId,
        length: u32,
    },
}

impl Frame {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Data { .. } => "DATA",
            Self::Headers { .. } => "HEADERS",
            Self::Priority { .. } => "PRIORITY",
            Self::ResetStream { .. } => "RST_STREAM",
            Self::Settings { .. } => "SETTINGS",
            Self::Ping { .. } => "PING",
            Self::GoAway { .. } => "GOAWAY",
            Self::WindowUpdate { .. } => "WINDOW_UPDATE",
            Self::Continuation { .. } => "CONTINUATION",
            Self::Unknown { .. } => "UNKNOWN",
        }
    }

    pub fn data(stream: NonZeroStreamId, data: Bytes, end_stream: bool) -> Self {
        let flow_len = data.len() as u32;
        Self::Data {
            stream,
            data,
            end_stream,
            flow_len,
        }
    }

    /// Reads one frame. `Ok(None)` means the transport closed cleanly on a
    /// frame boundary; closing mid-frame is a transport error.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut R,
        max_frame_size: u32,
        scratch: &mut BytesMut,
    ) -> Result<Option<Self>, ConnectionError> {
        let mut raw = [0u8; FRAME_HEADER_LEN];
        let mut filled = 0;
        while filled < raw.len() {
            let n = reader.read(&mut raw[filled..]).await?;
            if n == 0 {
                if filled == 0 {
                    return Ok(None);
                }
                return Err(ConnectionError::TransportClosed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "transport closed mid frame header",
                )));
            }
            filled += n;
        }

        let header = FrameHeader::parse(&raw);
        if header.length > max_frame_size {
            return Err(ConnectionError::new(
                ErrorType::FrameSizeError,
                format!(
                    "frame of {} octets exceeds the {} octet limit",
                    header.length, max_frame_size
                ),
            ));
        }
        scratch.resize(header.length as usize, 0);
        reader.read_exact(&mut scratch[..]).await?;
        Ok(Some(Self::parse(header, &scratch[..])?))
    }

    pub fn parse(header: FrameHeader, payload: &[u8]) -> Result<Self, FrameDecodeError> {
        let typ = match FrameType::from_u8(header.typ) {
            Some(typ) => typ,
            // unknown frame types are framed and skipped, never an error
            None => {
                return Ok(Self::Unknown {
                    typ: header.typ,
                    stream: header.stream,
                    length: header.length,
                })
            }
        };
        match typ {
            FrameType::Data => {
                let stream = stream_id(&header)?;
                let flags = DataFlags::from_bits_truncate(header.flags);
                let content = if flags.contains(DataFlags::PADDED) {
                    if payload.is_empty() {
                        return Err(FrameDecodeError::PayloadTooShort);
                    }
                    let pad = payload[0] as usize;
                    if pad + 1 > payload.len() {
                        return Err(FrameDecodeError::InvalidPadding);
                    }
                    &payload[1..payload.len() - pad]
                } else {
                    payload
                };
                Ok(Self::Data {
                    stream,
                    data: Bytes::copy_from_slice(content),
                    end_stream: flags.contains(DataFlags::END_STREAM),
                    flow_len: header.length,
                })
            }
            FrameType::Headers => {
                let stream = stream_id(&header)?;
                let flags = HeadersFlags::from_bits_truncate(header.flags);
                let mut offset = 0;
                let mut end = payload.len();
                if flags.contains(HeadersFlags::PADDED) {
                    if payload.is_empty() {
                        return Err(FrameDecodeError::PayloadTooShort);
                    }
                    let pad = payload[0] as usize;
                    offset = 1;
                    if pad + offset > payload.len() {
                        return Err(FrameDecodeError::InvalidPadding);
                    }
                    end = payload.len() - pad;
                }
                let priority = if flags.contains(HeadersFlags::PRIORITY) {
                    // the fragment length would go negative
                    if offset + 5 > end {
                        return Err(FrameDecodeError::InvalidPadding);
                    }
                    let priority = PriorityUpdate::parse(&payload[offset..offset + 5]);
                    offset += 5;
                    Some(priority)
                } else {
                    None
                };
                Ok(Self::Headers {
                    stream,
                    flags,
                    priority,
                    fragment: Bytes::copy_from_slice(&payload[offset..end]),
                })
            }
            FrameType::Priority => {
                let stream = stream_id(&header)?;
                if payload.len() != 5 {
                    return Err(FrameDecodeError::PayloadTooShort);
                }
                Ok(Self::Priority {
                    stream,
                    priority: PriorityUpdate::parse(payload),
                })
            }
            FrameType::ResetStream => {
                let stream = stream_id(&header)?;
                if payload.len() != 4 {
                    return Err(FrameDecodeError::PayloadTooShort);
                }
                Ok(Self::ResetStream {
                    stream,
                    error: error_type(u32::from_be_bytes([
                        payload[0], payload[1], payload[2], payload[3],
                    ])),
                })
            }
            FrameType::Settings => {
                connection_scoped(&header)?;
                let flags = SettingsFlags::from_bits_truncate(header.flags);
                if flags.contains(SettingsFlags::ACK) && !payload.is_empty() {
                    return Err(FrameDecodeError::NonEmptySettingsAck);
                }
                if payload.len() % 6 != 0 {
                    return Err(FrameDecodeError::BadSettingsLength);
                }
                let mut params = Vec::with_capacity(payload.len() / 6);
                for chunk in payload.chunks_exact(6) {
                    // unknown parameters are ignored per the spec
                    if let Some(param) =
                        SettingsParameter::from_u16(u16::from_be_bytes([chunk[0], chunk[1]]))
                    {
                        params.push((
                            param,
                            u32::from_be_bytes([chunk[2], chunk[3], chunk[4], chunk[5]]),
                        ));
                    }
                }
                Ok(Self::Settings { flags, params })
            }
            FrameType::PushPromise => Err(FrameDecodeError::UnexpectedPushPromise),
            FrameType::Ping => {
                connection_scoped(&header)?;
                if payload.len() != 8 {
                    return Err(FrameDecodeError::PayloadTooShort);
                }
                let mut data = [0u8; 8];
                data.copy_from_slice(payload);
                Ok(Self::Ping {
                    flags: PingFlags::from_bits_truncate(header.flags),
                    data,
                })
            }
            FrameType::GoAway => {
                connection_scoped(&header)?;
                if payload.len() < 8 {
                    return Err(FrameDecodeError::PayloadTooShort);
                }
                Ok(Self::GoAway {
                    last_stream: u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]])
                        & U31_MAX,
                    error: error_type(u32::from_be_bytes([
                        payload[4], payload[5], payload[6], payload[7],
                    ])),
                    debug: Bytes::copy_from_slice(&payload[8..]),
                })
            }
            FrameType::WindowUpdate => {
                if payload.len() != 4 {
                    return Err(FrameDecodeError::PayloadTooShort);
                }
                let increment =
                    u32::from_be_bytes([payload[0], payload[1], payload[2], payload[3]]) & U31_MAX;
                Ok(Self::WindowUpdate {
                    stream: header.stream,
                    increment: NonZeroU32::new(increment)
                        .ok_or(FrameDecodeError::ZeroWindowIncrement)?,
                })
            }
            FrameType::Continuation => Ok(Self::Continuation {
                stream: stream_id(&header)?,
                flags: ContinuationFlags::from_bits_truncate(header.flags),
                fragment: Bytes::copy_from_slice(payload),
            }),
        }
    }

    pub async fn write_into<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> io::Result<()> {
        let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + 64);
        self.encode(&mut buf);
        // header and body leave as a single write so frames from other
        // streams cannot interleave mid-frame
        writer.write_all(&buf).await
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Data {
                stream,
                data,
                end_stream,
                ..
            } => {
                let mut flags = DataFlags::empty();
                if *end_stream {
                    flags |= DataFlags::END_STREAM;
                }
                put_frame_header(buf, data.len(), FrameType::Data, flags.bits(), stream.get());
                buf.extend_from_slice(data);
            }
            Self::Headers {
                stream,
                flags,
                priority,
                fragment,
            } => {
                let mut flags = *flags;
                let mut length = fragment.len();
                if priority.is_some() {
                    flags |= HeadersFlags::PRIORITY;
                    length += 5;
                }
                put_frame_header(buf, length, FrameType::Headers, flags.bits(), stream.get());
                if let Some(priority) = priority {
                    buf.extend_from_slice(&priority.encode());
                }
                buf.extend_from_slice(fragment);
            }
            Self::Priority { stream, priority } => {
                put_frame_header(buf, 5, FrameType::Priority, 0, stream.get());
                buf.extend_from_slice(&priority.encode());
            }
            Self::ResetStream { stream, error } => {
                put_frame_header(buf, 4, FrameType::ResetStream, 0, stream.get());
                // unwrap: ErrorType is repr(u32)
                buf.put_u32(error.to_u32().unwrap());
            }
            Self::Settings { flags, params } => {
                put_frame_header(buf, params.len() * 6, FrameType::Settings, flags.bits(), 0);
                for (param, value) in params {
                    // unwrap: SettingsParameter is repr(u16)
                    buf.put_u16(param.to_u16().unwrap());
                    buf.put_u32(*value);
                }
            }
            Self::Ping { flags, data } => {
                put_frame_header(buf, 8, FrameType::Ping, flags.bits(), 0);
                buf.extend_from_slice(data);
            }
            Self::GoAway {
                last_stream,
                error,
                debug,
            } => {
                put_frame_header(buf, 8 + debug.len(), FrameType::GoAway, 0, 0);
                buf.put_u32(last_stream & U31_MAX);
                // unwrap: ErrorType is repr(u32)
                buf.put_u32(error.to_u32().unwrap());
                buf.extend_from_slice(debug);
            }
            Self::WindowUpdate { stream, increment } => {
                put_frame_header(buf, 4, FrameType::WindowUpdate, 0, *stream);
                buf.put_u32(increment.get() & U31_MAX);
            }
            Self::Continuation {
                stream,
                flags,
                fragment,
            } => {
                put_frame_header(
                    buf,
                    fragment.len(),
                    FrameType::Continuation,
                    flags.bits(),
                    stream.get(),
                );
                buf.extend_from_slice(fragment);
            }
            Self::Unknown { .. } => unreachable!("unknown frames are never written"),
        }
    }
}

fn put_frame_header(buf: &mut BytesMut, length: usize, typ: FrameType, flags: u8, stream: StreamId) {
    let header = FrameHeader {
        length: length as u32,
        // unwrap: FrameType is repr(u8)
        typ: typ.to_u8().unwrap(),
        flags,
        stream,
    };
    buf.extend_from_slice(&header.encode());
}

fn stream_id(header: &FrameHeader) -> Result<NonZeroStreamId, FrameDecodeError> {
    NonZeroStreamId::new(header.stream).ok_or(FrameDecodeError::ZeroStreamId)
}

fn connection_scoped(header: &FrameHeader) -> Result<(), FrameDecodeError> {
    if header.stream != 0 {
        return Err(FrameDecodeError::NonZeroStreamId);
    }
    Ok(())
}

fn error_type(code: u32) -> ErrorType {
    // unknown error codes may be treated as INTERNAL_ERROR per the spec
    ErrorType::from_u32(code).unwrap_or(ErrorType::InternalError)
}
