//! Bolt message framing for tokio_util.
//!
//! A message is split into chunks, each carrying a 2-byte big-endian
//! length prefix, and terminated by a zero-length chunk. The codec works
//! on opaque payloads; packing and unpacking the body is done by
//! [`crate::bolt::packstream`].

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::BoltError;

/// Largest chunk body the client ever writes.
pub const MAX_CHUNK_SIZE: usize = 0x7FFF;

/// Default limit for a reassembled message (16MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// End of message marker (0x00 0x00)
pub const END_MARKER: [u8; 2] = [0x00, 0x00];

/// Chunking codec. Yields each reassembled message payload in full.
///
/// Zero-length messages (keep-alive NOOPs) are yielded as empty payloads;
/// skipping them is the caller's decision.
#[derive(Debug)]
pub struct BoltCodec {
    max_message_size: usize,
    message_buffer: BytesMut,
}

impl BoltCodec {
    pub fn new() -> Self {
        Self::with_max_size(DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a codec that rejects messages larger than `max_message_size`.
    pub fn with_max_size(max_message_size: usize) -> Self {
        Self {
            max_message_size,
            message_buffer: BytesMut::with_capacity(4096),
        }
    }

    /// True while part of a message has been consumed but not yet yielded.
    pub fn in_message(&self) -> bool {
        !self.message_buffer.is_empty()
    }

    fn write_chunks(data: &[u8], dst: &mut BytesMut) {
        dst.reserve(data.len() + 2 * (data.len() / MAX_CHUNK_SIZE + 2));
        for chunk in data.chunks(MAX_CHUNK_SIZE) {
            dst.put_u16(chunk.len() as u16);
            dst.put_slice(chunk);
        }
        dst.put_slice(&END_MARKER);
    }
}

impl Default for BoltCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for BoltCodec {
    type Item = BytesMut;
    type Error = BoltError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.len() < 2 {
                return Ok(None);
            }

            let chunk_size = u16::from_be_bytes([src[0], src[1]]) as usize;

            if chunk_size == 0 {
                src.advance(2);
                return Ok(Some(self.message_buffer.split()));
            }

            if src.len() < 2 + chunk_size {
                return Ok(None);
            }

            let size = self.message_buffer.len() + chunk_size;
            if size > self.max_message_size {
                return Err(BoltError::MessageTooLarge {
                    size,
                    max: self.max_message_size,
                });
            }

            src.advance(2);
            self.message_buffer.extend_from_slice(&src[..chunk_size]);
            src.advance(chunk_size);
        }
    }
}

impl<'a> Encoder<&'a [u8]> for BoltCodec {
    type Error = BoltError;

    fn encode(&mut self, item: &'a [u8], dst: &mut BytesMut) -> Result<(), Self::Error> {
        Self::write_chunks(item, dst);
        Ok(())
    }
}

/// Inspect buffered bytes for a complete, non-empty message.
///
/// Returns the message's tag byte (the second byte of its body) without
/// consuming anything, or `None` if no complete message is buffered yet.
/// `data` must start on a message boundary. Leading NOOPs are skipped.
pub fn peek_message(data: &[u8]) -> Option<u8> {
    let mut pos = 0;
    let mut head: [Option<u8>; 2] = [None, None];
    let mut seen = 0;

    loop {
        if data.len() < pos + 2 {
            return None;
        }
        let size = u16::from_be_bytes([data[pos], data[pos + 1]]) as usize;
        pos += 2;

        if size == 0 {
            if seen >= 2 {
                return head[1];
            }
            // Empty or truncated body: keep looking past it.
            head = [None, None];
            seen = 0;
            continue;
        }

        if data.len() < pos + size {
            return None;
        }
        for &byte in &data[pos..pos + size] {
            if seen < 2 {
                head[seen] = Some(byte);
                seen += 1;
            } else {
                break;
            }
        }
        pos += size;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(payload: &[u8]) -> BytesMut {
        let mut buf = BytesMut::new();
        BoltCodec::new().encode(payload, &mut buf).unwrap();
        buf
    }

    #[test]
    fn test_small_message_layout() {
        let buf = frame(&[0xB0, 0x0F]);
        assert_eq!(buf.to_vec(), vec![0x00, 0x02, 0xB0, 0x0F, 0x00, 0x00]);
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let mut buf = frame(&[]);
        assert_eq!(buf.to_vec(), END_MARKER.to_vec());
        let decoded = BoltCodec::new().decode(&mut buf).unwrap().unwrap();
        assert!(decoded.is_empty());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_roundtrip_across_chunk_boundaries() {
        for len in [1, MAX_CHUNK_SIZE - 1, MAX_CHUNK_SIZE, MAX_CHUNK_SIZE + 1, 3 * MAX_CHUNK_SIZE + 7] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 251) as u8).collect();
            let mut buf = frame(&payload);
            let decoded = BoltCodec::new().decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded.to_vec(), payload, "length {}", len);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_large_message_is_split_at_max_chunk_size() {
        let payload = vec![0xAB; MAX_CHUNK_SIZE + 10];
        let buf = frame(&payload);
        assert_eq!(&buf[..2], &[0x7F, 0xFF]);
        let second = 2 + MAX_CHUNK_SIZE;
        assert_eq!(&buf[second..second + 2], &[0x00, 0x0A]);
        assert_eq!(buf.len(), 2 + MAX_CHUNK_SIZE + 2 + 10 + 2);
    }

    #[test]
    fn test_partial_input_waits_for_more() {
        let full = frame(&[1, 2, 3, 4]);
        let mut codec = BoltCodec::new();

        let mut partial = BytesMut::from(&full[..3]);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        let mut body_only = BytesMut::from(&full[..6]);
        assert!(codec.decode(&mut body_only).unwrap().is_none());
        assert!(codec.in_message());

        body_only.extend_from_slice(&full[6..]);
        assert_eq!(codec.decode(&mut body_only).unwrap().unwrap().to_vec(), vec![1, 2, 3, 4]);
        assert!(!codec.in_message());
    }

    #[test]
    fn test_multiple_messages_in_one_buffer() {
        let mut buf = frame(&[0xB0, 0x01]);
        buf.extend_from_slice(&frame(&[0xB0, 0x02]));
        let mut codec = BoltCodec::new();
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()[1], 0x01);
        assert_eq!(codec.decode(&mut buf).unwrap().unwrap()[1], 0x02);
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_message_too_large() {
        let mut codec = BoltCodec::with_max_size(100);
        let mut buf = BytesMut::new();
        buf.put_u16(200);
        buf.extend_from_slice(&[0u8; 200]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(BoltError::MessageTooLarge { size: 200, max: 100 })
        ));
    }

    #[test]
    fn test_peek_complete_message() {
        let mut buf = frame(&[0xB1, 0x71, 0x91, 0x01]);
        buf.extend_from_slice(&frame(&[0xB1, 0x70, 0xA0]));
        assert_eq!(peek_message(&buf), Some(0x71));
        // Nothing consumed.
        assert_eq!(BoltCodec::new().decode(&mut buf).unwrap().unwrap()[1], 0x71);
        assert_eq!(peek_message(&buf), Some(0x70));
    }

    #[test]
    fn test_peek_incomplete_message() {
        let buf = frame(&[0xB1, 0x71, 0x91, 0x01]);
        assert_eq!(peek_message(&buf[..buf.len() - 1]), None);
        assert_eq!(peek_message(&buf[..1]), None);
        assert_eq!(peek_message(&[]), None);
    }

    #[test]
    fn test_peek_tag_split_across_chunks() {
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        buf.put_u8(0xB1);
        buf.put_u16(2);
        buf.put_slice(&[0x71, 0x90]);
        buf.put_slice(&END_MARKER);
        assert_eq!(peek_message(&buf), Some(0x71));
    }

    #[test]
    fn test_peek_skips_noop() {
        let mut buf = BytesMut::from(&END_MARKER[..]);
        buf.extend_from_slice(&frame(&[0xB0, 0x7E]));
        assert_eq!(peek_message(&buf), Some(0x7E));
    }
}
