//! Reassembly buffer for long multi-packet transfers.
//!
//! Uses `bytes::BytesMut` so the finished payload is frozen without a copy.
//! One buffer exists per long stream (text, data) while a transfer is in
//! flight:
//! - created on the first chunk,
//! - grown by each further chunk, never beyond the size cap,
//! - consumed by the End marker, which optionally verifies the chunk count.
//!
//! # Example
//!
//! ```
//! use framewire::protocol::ReassemblyBuffer;
//!
//! let mut buffer = ReassemblyBuffer::new(1024);
//! buffer.push(b"hello ").unwrap();
//! buffer.push(b"world").unwrap();
//!
//! let payload = buffer.finish(Some(2)).unwrap();
//! assert_eq!(&payload[..], b"hello world");
//! ```

use bytes::{Bytes, BytesMut};

use crate::error::ReassemblyError;

/// Accumulates the chunks of one long transfer.
#[derive(Debug)]
pub struct ReassemblyBuffer {
    /// Bytes received so far.
    buffer: BytesMut,
    /// Number of chunks received so far.
    chunks: u32,
    /// Maximum total size of the transfer.
    limit: usize,
}

impl ReassemblyBuffer {
    /// Create an empty buffer capped at `limit` bytes.
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            chunks: 0,
            limit,
        }
    }

    /// Append one chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::BufferOverflow`] if the chunk would take the
    /// transfer past the cap, or [`ReassemblyError::TooManyChunks`] if the
    /// chunk counter is exhausted. Nothing is appended in either case.
    pub fn push(&mut self, chunk: &[u8]) -> Result<(), ReassemblyError> {
        if self.buffer.len() + chunk.len() > self.limit {
            return Err(ReassemblyError::BufferOverflow { limit: self.limit });
        }
        self.chunks = self
            .chunks
            .checked_add(1)
            .ok_or(ReassemblyError::TooManyChunks)?;
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    /// Consume the buffer and return the assembled payload.
    ///
    /// `declared` is the chunk count announced by the End marker. `None`
    /// accepts the transfer without verification; this is the reduced-safety
    /// path for senders that omit the count.
    ///
    /// # Errors
    ///
    /// Returns [`ReassemblyError::ChunkCountMismatch`] when the declared count
    /// differs from the number of chunks pushed.
    pub fn finish(self, declared: Option<u32>) -> Result<Bytes, ReassemblyError> {
        if let Some(expected) = declared {
            if expected != self.chunks {
                return Err(ReassemblyError::ChunkCountMismatch {
                    expected,
                    received: self.chunks,
                });
            }
        }
        Ok(self.buffer.freeze())
    }

    /// Number of chunks received so far.
    #[inline]
    pub fn chunk_count(&self) -> u32 {
        self.chunks
    }

    /// Number of buffered bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if nothing has been buffered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Size cap of this buffer.
    #[inline]
    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_counter_cannot_wrap() {
        let mut buffer = ReassemblyBuffer::new(100);
        buffer.chunks = u32::MAX;

        assert_eq!(buffer.push(b""), Err(ReassemblyError::TooManyChunks));
        assert_eq!(buffer.chunk_count(), u32::MAX);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_chunks_concatenate_in_order() {
        let mut buffer = ReassemblyBuffer::new(100);
        buffer.push(b"first ").unwrap();
        buffer.push(b"second ").unwrap();
        buffer.push(b"third").unwrap();

        assert_eq!(buffer.chunk_count(), 3);
        assert_eq!(buffer.len(), 18);

        let payload = buffer.finish(Some(3)).unwrap();
        assert_eq!(&payload[..], b"first second third");
    }

    #[test]
    fn test_count_mismatch() {
        let mut buffer = ReassemblyBuffer::new(100);
        buffer.push(b"a").unwrap();
        buffer.push(b"b").unwrap();

        let result = buffer.finish(Some(3));
        assert_eq!(
            result,
            Err(ReassemblyError::ChunkCountMismatch {
                expected: 3,
                received: 2
            })
        );
    }

    #[test]
    fn test_unverified_finish() {
        let mut buffer = ReassemblyBuffer::new(100);
        buffer.push(b"a").unwrap();

        let payload = buffer.finish(None).unwrap();
        assert_eq!(&payload[..], b"a");
    }

    #[test]
    fn test_overflow_rejected_before_append() {
        let mut buffer = ReassemblyBuffer::new(8);
        buffer.push(b"12345").unwrap();

        let result = buffer.push(b"6789");
        assert_eq!(result, Err(ReassemblyError::BufferOverflow { limit: 8 }));
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.chunk_count(), 1);
    }

    #[test]
    fn test_exactly_at_limit() {
        let mut buffer = ReassemblyBuffer::new(4);
        buffer.push(b"1234").unwrap();
        assert_eq!(buffer.len(), buffer.limit());
    }

    #[test]
    fn test_empty_chunks_count() {
        let mut buffer = ReassemblyBuffer::new(4);
        buffer.push(b"").unwrap();
        buffer.push(b"").unwrap();

        assert!(buffer.is_empty());
        assert_eq!(buffer.finish(Some(2)).unwrap().len(), 0);
    }
}
