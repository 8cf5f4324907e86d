//! Record frame format shared by buffers and tapes.
//!
//! Each stored record is framed as:
//! - Length (4 bytes): big-endian `i32`, exact payload length
//! - Payload (variable): the serialized record, treated as opaque bytes
//!
//! Tapes additionally close every data chunk with an inline marker:
//! - Marker (4 bytes): `-1`
//! - Record count (4 bytes): big-endian `u32`
//! - Checksum (4 bytes): big-endian CRC32 of all frames in the chunk

use crate::error::{Error, Result};
use bytes::{Buf, BufMut, Bytes};

/// Size of the frame length prefix
pub const FRAME_HEADER_SIZE: usize = 4;

/// Length value that marks the end of a data chunk
pub const CHUNK_END_MARKER: i32 = -1;

/// Size of the chunk trailer following the marker (count + checksum)
pub const CHUNK_TRAILER_SIZE: usize = 8;

/// Total size of an inline chunk boundary
pub const CHUNK_END_SIZE: usize = FRAME_HEADER_SIZE + CHUNK_TRAILER_SIZE;

/// A decoded frame length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameHeader {
    /// A record payload of the given length follows.
    Record(usize),
    /// The chunk ends here; its trailer follows.
    ChunkEnd,
}

/// Size of the frame holding a payload of `payload_len` bytes.
pub fn frame_len(payload_len: usize) -> usize {
    FRAME_HEADER_SIZE + payload_len
}

/// Check a payload length against the record size limit.
pub fn check_payload_len(len: usize, max_record_size: usize) -> Result<()> {
    if len > max_record_size || len > i32::MAX as usize {
        return Err(Error::RecordTooLarge { size: len, limit: max_record_size });
    }
    Ok(())
}

/// Write `payload` as one frame. Returns the number of bytes written.
pub fn encode_frame(buf: &mut impl BufMut, payload: &[u8], max_record_size: usize) -> Result<usize> {
    check_payload_len(payload.len(), max_record_size)?;
    buf.put_i32(payload.len() as i32);
    buf.put_slice(payload);
    Ok(frame_len(payload.len()))
}

/// Interpret a raw length prefix.
pub fn decode_frame_header(header: [u8; FRAME_HEADER_SIZE], max_record_size: usize) -> Result<FrameHeader> {
    match i32::from_be_bytes(header) {
        CHUNK_END_MARKER => Ok(FrameHeader::ChunkEnd),
        len if len < 0 => Err(Error::corruption(format!("Negative frame length: {}", len))),
        len => {
            let len = len as usize;
            if len > max_record_size {
                return Err(Error::corruption(format!(
                    "Frame length {} exceeds the record limit of {}",
                    len, max_record_size
                )));
            }
            Ok(FrameHeader::Record(len))
        }
    }
}

/// Read one record frame from an in-memory buffer.
///
/// Returns `None` if `buf` is exhausted. A frame whose declared length
/// exceeds the remaining bytes is corruption.
pub fn decode_frame(buf: &mut Bytes, max_record_size: usize) -> Result<Option<Bytes>> {
    if !buf.has_remaining() {
        return Ok(None);
    }
    if buf.remaining() < FRAME_HEADER_SIZE {
        return Err(Error::corruption(format!("Frame header too short: {} bytes", buf.remaining())));
    }
    let mut header = [0u8; FRAME_HEADER_SIZE];
    buf.copy_to_slice(&mut header);
    match decode_frame_header(header, max_record_size)? {
        FrameHeader::ChunkEnd => Err(Error::corruption("Unexpected chunk marker in record stream")),
        FrameHeader::Record(len) => {
            if buf.remaining() < len {
                return Err(Error::corruption(format!(
                    "Incomplete frame: expected {} bytes, got {}",
                    len,
                    buf.remaining()
                )));
            }
            Ok(Some(buf.split_to(len)))
        }
    }
}

/// Write the inline boundary that closes a chunk.
pub fn encode_chunk_end(buf: &mut impl BufMut, records: u32, checksum: u32) {
    buf.put_i32(CHUNK_END_MARKER);
    buf.put_u32(records);
    buf.put_u32(checksum);
}

/// Decode a chunk trailer into `(records, checksum)`.
pub fn decode_chunk_trailer(trailer: [u8; CHUNK_TRAILER_SIZE]) -> (u32, u32) {
    let mut slice = &trailer[..];
    let records = slice.get_u32();
    let checksum = slice.get_u32();
    (records, checksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    const LIMIT: usize = 1024;

    #[test]
    fn test_frame_layout() {
        let mut buf = BytesMut::new();
        let written = encode_frame(&mut buf, b"abc", LIMIT).unwrap();
        assert_eq!(written, 7);
        assert_eq!(&buf[..], &[0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_decode_frames() {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, b"first", LIMIT).unwrap();
        encode_frame(&mut buf, b"", LIMIT).unwrap();
        encode_frame(&mut buf, b"third", LIMIT).unwrap();
        let mut frozen = buf.freeze();

        assert_eq!(decode_frame(&mut frozen, LIMIT).unwrap().unwrap(), &b"first"[..]);
        assert_eq!(decode_frame(&mut frozen, LIMIT).unwrap().unwrap(), &b""[..]);
        assert_eq!(decode_frame(&mut frozen, LIMIT).unwrap().unwrap(), &b"third"[..]);
        assert!(decode_frame(&mut frozen, LIMIT).unwrap().is_none());
    }

    #[test]
    fn test_short_payload_is_corruption() {
        let mut buf = BytesMut::new();
        encode_frame(&mut buf, b"payload", LIMIT).unwrap();
        let mut truncated = buf.freeze().slice(..6);
        assert!(matches!(decode_frame(&mut truncated, LIMIT), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_record_too_large() {
        let mut buf = BytesMut::new();
        let payload = vec![0u8; LIMIT + 1];
        let err = encode_frame(&mut buf, &payload, LIMIT).unwrap_err();
        assert!(matches!(err, Error::RecordTooLarge { size, limit } if size == LIMIT + 1 && limit == LIMIT));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_header_kinds() {
        assert_eq!(decode_frame_header((-1i32).to_be_bytes(), LIMIT).unwrap(), FrameHeader::ChunkEnd);
        assert_eq!(decode_frame_header(10i32.to_be_bytes(), LIMIT).unwrap(), FrameHeader::Record(10));
        assert!(decode_frame_header((-7i32).to_be_bytes(), LIMIT).is_err());
        assert!(decode_frame_header(2048i32.to_be_bytes(), LIMIT).is_err());
    }

    #[test]
    fn test_chunk_end_roundtrip() {
        let mut buf = BytesMut::new();
        encode_chunk_end(&mut buf, 42, 0xDEADBEEF);
        assert_eq!(buf.len(), CHUNK_END_SIZE);

        let header: [u8; 4] = buf[..4].try_into().unwrap();
        assert_eq!(decode_frame_header(header, LIMIT).unwrap(), FrameHeader::ChunkEnd);
        let trailer: [u8; 8] = buf[4..].try_into().unwrap();
        assert_eq!(decode_chunk_trailer(trailer), (42, 0xDEADBEEF));
    }
}
