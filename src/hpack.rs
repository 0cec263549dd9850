use crate::types::Headers;

/// Per-field overhead used for header-list size accounting.
/// https://httpwg.org/specs/rfc7540.html#SettingValues
pub const FIELD_OVERHEAD: usize = 32;

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderBlockError {
    /// Decoded size (name + value + 32 per field) went past the limit.
    #[error("decoded header block exceeds {limit} octets")]
    TooLarge { limit: usize },
    /// The block is malformed, or ended in the middle of a field.
    #[error("malformed or truncated header block")]
    Malformed,
}

/// Decodes one complete header-block fragment chain into a field list.
/// Table management (RFC 7541) belongs to the implementation, not the engine.
pub trait HeaderDecoder: Send {
    fn decode_block(
        &mut self,
        fragment: &[u8],
        max_fields_size: usize,
    ) -> Result<Headers, HeaderBlockError>;
}

/// Encodes an ordered field list into a header-block fragment.
pub trait HeaderEncoder {
    fn encode_block(&mut self, headers: &[(String, String)]) -> Vec<u8>;
}

/// Default codec backed by the `hpack` crate's static/dynamic tables.
pub struct HpackCodec {
    decoder: ::hpack::Decoder<'static>,
    encoder: ::hpack::Encoder<'static>,
}

impl HpackCodec {
    pub fn new() -> Self {
        Self {
            decoder: ::hpack::Decoder::new(),
            encoder: ::hpack::Encoder::new(),
        }
    }
}

impl Default for HpackCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderDecoder for HpackCodec {
    fn decode_block(
        &mut self,
        fragment: &[u8],
        max_fields_size: usize,
    ) -> Result<Headers, HeaderBlockError> {
        let mut fields = Headers::new();
        let mut size = 0usize;
        self.decoder
            .decode_with_cb(fragment, |name, value| {
                size += name.len() + value.len() + FIELD_OVERHEAD;
                fields.push((
                    String::from_utf8_lossy(&name).into_owned(),
                    String::from_utf8_lossy(&value).into_owned(),
                ));
            })
            .map_err(|_| HeaderBlockError::Malformed)?;
        if size > max_fields_size {
            return Err(HeaderBlockError::TooLarge {
                limit: max_fields_size,
            });
        }
        Ok(fields)
    }
}

impl HeaderEncoder for HpackCodec {
    fn encode_block(&mut self, headers: &[(String, String)]) -> Vec<u8> {
        self.encoder
            .encode(headers.iter().map(|(key, value)| (key.as_bytes(), value.as_bytes())))
    }
}
