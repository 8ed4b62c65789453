use super::record::DatagramRecord;
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;
use tokio_util::codec::{Decoder, Encoder};

/// Sentinel opening every buffered record
pub const MAGIC: u32 = 0xD6A7_1E5B;

/// magic (4) + source ip (4) + source port (2) + payload length (2)
pub const HEADER_LEN: usize = 12;

/// Framing errors raised while encoding or decoding records
#[derive(Debug, Error)]
pub enum FrameError {
    /// The header does not start with [`MAGIC`]
    #[error("bad record magic {found:#010x}")]
    BadMagic { found: u32 },

    /// Payload longer than the configured maximum frame length
    #[error("record payload of {len} bytes exceeds maximum of {max} bytes")]
    Oversized { len: usize, max: usize },

    /// Required by the codec traits, never produced by in-memory buffers
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Codec for the internal record format
///
/// The decoder is strict: a record is either complete and well-formed or it
/// is not returned. Callers that know their buffer only ever holds whole
/// records treat an incomplete tail as corruption and call [`RecordCodec::resync`].
#[derive(Debug, Clone, Copy)]
pub struct RecordCodec {
    max_frame_len: usize,
}

impl RecordCodec {
    /// Creates a codec accepting payloads up to `max_frame_len` bytes
    ///
    /// The length field is 16 bits wide, so larger limits are clamped.
    pub fn new(max_frame_len: usize) -> Self {
        Self {
            max_frame_len: max_frame_len.min(u16::MAX as usize),
        }
    }

    /// Maximum accepted payload length
    pub fn max_frame_len(&self) -> usize {
        self.max_frame_len
    }

    /// Bytes needed to buffer a payload of `payload_len` bytes
    pub const fn encoded_len(payload_len: usize) -> usize {
        HEADER_LEN + payload_len
    }

    /// Discards the malformed record at the head of `src`
    ///
    /// The declared payload length is trusted when it ends exactly at the end
    /// of the buffer or at another [`MAGIC`]. Otherwise everything before the
    /// next occurrence of [`MAGIC`] is dropped, or the whole buffer when none
    /// is found. Returns the number of bytes discarded.
    pub fn resync(src: &mut BytesMut) -> usize {
        let skip = Self::declared_boundary(src).unwrap_or_else(|| Self::next_magic(src));
        src.advance(skip);
        skip
    }

    fn declared_boundary(src: &[u8]) -> Option<usize> {
        let mut len_field = src.get(HEADER_LEN - 2..HEADER_LEN)?;
        let end = Self::encoded_len(len_field.get_u16_ne() as usize);
        let rest = src.get(end..)?;
        (rest.is_empty() || rest.starts_with(&MAGIC.to_ne_bytes())).then_some(end)
    }

    fn next_magic(src: &[u8]) -> usize {
        let pattern = MAGIC.to_ne_bytes();
        src.get(1..)
            .and_then(|rest| rest.windows(pattern.len()).position(|w| w == pattern))
            .map_or(src.len(), |pos| pos + 1)
    }
}

impl<'a> Encoder<&'a DatagramRecord> for RecordCodec {
    type Error = FrameError;

    fn encode(
        &mut self,
        record: &'a DatagramRecord,
        dst: &mut BytesMut,
    ) -> Result<(), FrameError> {
        let len = record.payload.len();
        if len > self.max_frame_len {
            return Err(FrameError::Oversized {
                len,
                max: self.max_frame_len,
            });
        }

        dst.reserve(Self::encoded_len(len));
        dst.put_u32_ne(MAGIC);
        dst.put_u32_ne(record.source_ip);
        dst.put_u16_ne(record.source_port);
        dst.put_u16_ne(len as u16);
        dst.put_slice(&record.payload);
        Ok(())
    }
}

impl Decoder for RecordCodec {
    type Item = DatagramRecord;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<DatagramRecord>, FrameError> {
        if src.len() < HEADER_LEN {
            return Ok(None);
        }

        let mut header = &src[..HEADER_LEN];
        let magic = header.get_u32_ne();
        if magic != MAGIC {
            return Err(FrameError::BadMagic { found: magic });
        }
        let source_ip = header.get_u32_ne();
        let source_port = header.get_u16_ne();
        let len = header.get_u16_ne() as usize;

        if len > self.max_frame_len {
            return Err(FrameError::Oversized {
                len,
                max: self.max_frame_len,
            });
        }
        if src.len() < HEADER_LEN + len {
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(DatagramRecord {
            payload,
            source_ip,
            source_port,
        }))
    }
}
