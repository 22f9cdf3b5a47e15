//! Inbound packet decoder.
//!
//! Turns the raw notification packets of one connection into [`Event`]s.
//! Single-packet replies and signals pass straight through; long transfers are
//! accumulated in a [`ReassemblyBuffer`] per stream until their End marker.
//!
//! A protocol violation aborts only the affected stream: its buffer is dropped,
//! the error is returned tagged with the stream, and the next packet is decoded
//! from a clean state.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use framewire::protocol::{Event, FrameDecoder};
//!
//! let mut decoder = FrameDecoder::new();
//!
//! assert!(decoder.decode(Bytes::from_static(b"\x0Ahello ")).unwrap().is_none());
//! assert!(decoder.decode(Bytes::from_static(b"\x0Aworld")).unwrap().is_none());
//!
//! let event = decoder.decode(Bytes::from_static(b"\x0B2")).unwrap();
//! assert_eq!(event, Some(Event::Text("hello world".to_string())));
//! ```

use bytes::Bytes;

use super::reassembly::ReassemblyBuffer;
use super::wire_format::{
    classify, parse_chunk_count, ReplyStream, Signal, StreamKind, DEFAULT_MAX_RECEIVE_BUFFER,
};
use crate::error::ReassemblyError;

/// A decoded notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Complete text reply (plain print or reassembled long text).
    Text(String),
    /// Complete binary reply (single packet or reassembled long data).
    Data(Bytes),
    /// Out-of-band signal with whatever followed the signal byte.
    Signal { signal: Signal, payload: Bytes },
}

/// Protocol violation on one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeError {
    /// Stream that was aborted.
    pub stream: ReplyStream,
    /// What went wrong.
    pub error: ReassemblyError,
}

impl DecodeError {
    fn new(stream: ReplyStream, error: ReassemblyError) -> Self {
        Self { stream, error }
    }
}

/// Which long transfers are in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    Idle,
    AccumulatingText,
    AccumulatingData,
    /// Text and data transfers interleaved on the same link.
    AccumulatingBoth,
}

/// Reassembly state machine for one connection.
#[derive(Debug)]
pub struct FrameDecoder {
    text: Option<ReassemblyBuffer>,
    data: Option<ReassemblyBuffer>,
    max_receive_buffer: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default 10 MiB transfer cap.
    pub fn new() -> Self {
        Self::with_max_receive_buffer(DEFAULT_MAX_RECEIVE_BUFFER)
    }

    /// Create a decoder with a custom transfer cap.
    pub fn with_max_receive_buffer(max_receive_buffer: usize) -> Self {
        Self {
            text: None,
            data: None,
            max_receive_buffer,
        }
    }

    /// Decode one packet.
    ///
    /// Returns `Ok(None)` while a long transfer is still accumulating.
    pub fn decode(&mut self, packet: Bytes) -> Result<Option<Event>, DecodeError> {
        let (kind, offset) = classify(&packet);
        let body = packet.slice(offset..);

        match kind {
            StreamKind::Signal(signal) => Ok(Some(Event::Signal {
                signal,
                payload: body,
            })),

            StreamKind::ShortText => text_event(body).map(Some),

            StreamKind::ShortData => Ok(Some(Event::Data(body))),

            StreamKind::LongTextChunk => {
                Self::accumulate(&mut self.text, self.max_receive_buffer, &body)
                    .map_err(|e| DecodeError::new(ReplyStream::Text, e))?;
                Ok(None)
            }

            StreamKind::LongTextEnd => {
                let payload = Self::complete(&mut self.text, &body)
                    .map_err(|e| DecodeError::new(ReplyStream::Text, e))?;
                tracing::debug!("Finished receiving long text: {} bytes", payload.len());
                text_event(payload).map(Some)
            }

            StreamKind::LongDataChunk => {
                Self::accumulate(&mut self.data, self.max_receive_buffer, &body)
                    .map_err(|e| DecodeError::new(ReplyStream::Data, e))?;
                Ok(None)
            }

            StreamKind::LongDataEnd => {
                let payload = Self::complete(&mut self.data, &body)
                    .map_err(|e| DecodeError::new(ReplyStream::Data, e))?;
                tracing::debug!("Finished receiving long data: {} bytes", payload.len());
                Ok(Some(Event::Data(payload)))
            }
        }
    }

    fn accumulate(
        slot: &mut Option<ReassemblyBuffer>,
        limit: usize,
        chunk: &[u8],
    ) -> Result<(), ReassemblyError> {
        let buffer = slot.get_or_insert_with(|| {
            tracing::debug!("Starting new long transfer");
            ReassemblyBuffer::new(limit)
        });

        if let Err(e) = buffer.push(chunk) {
            *slot = None;
            return Err(e);
        }

        tracing::trace!(
            "Received chunk #{}: {} bytes",
            buffer.chunk_count(),
            chunk.len()
        );
        Ok(())
    }

    fn complete(
        slot: &mut Option<ReassemblyBuffer>,
        trailer: &[u8],
    ) -> Result<Bytes, ReassemblyError> {
        let buffer = slot.take();

        let declared = parse_chunk_count(trailer).map_err(ReassemblyError::InvalidChunkCount)?;
        if declared.is_none() {
            tracing::debug!("End marker carries no chunk count, accepting unverified");
        }

        match buffer {
            Some(buffer) => buffer.finish(declared),
            // The device announces an empty transfer with a bare End marker.
            None => match declared {
                None | Some(0) => Ok(Bytes::new()),
                Some(expected) => Err(ReassemblyError::ChunkCountMismatch {
                    expected,
                    received: 0,
                }),
            },
        }
    }

    /// Which long transfers are currently in flight.
    pub fn state(&self) -> DecoderState {
        match (self.text.is_some(), self.data.is_some()) {
            (false, false) => DecoderState::Idle,
            (true, false) => DecoderState::AccumulatingText,
            (false, true) => DecoderState::AccumulatingData,
            (true, true) => DecoderState::AccumulatingBoth,
        }
    }

    /// Drop any partial transfers.
    pub fn reset(&mut self) {
        self.text = None;
        self.data = None;
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn text_event(body: Bytes) -> Result<Event, DecodeError> {
    String::from_utf8(body.to_vec())
        .map(Event::Text)
        .map_err(|_| DecodeError::new(ReplyStream::Text, ReassemblyError::InvalidUtf8))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{
        DATA_PREFIX, LONG_DATA, LONG_DATA_END, LONG_TEXT, LONG_TEXT_END, TAP,
    };
    use proptest::prelude::*;

    fn packet(parts: &[&[u8]]) -> Bytes {
        Bytes::from(parts.concat())
    }

    #[test]
    fn test_plain_text_packet() {
        let mut decoder = FrameDecoder::new();
        let event = decoder.decode(Bytes::from_static(b"hi")).unwrap();
        assert_eq!(event, Some(Event::Text("hi".to_string())));
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_short_data_packet() {
        let mut decoder = FrameDecoder::new();
        let event = decoder.decode(packet(&[&[DATA_PREFIX], b"test"])).unwrap();
        assert_eq!(event, Some(Event::Data(Bytes::from_static(b"test"))));
    }

    #[test]
    fn test_bare_tap_signal_has_empty_payload() {
        let mut decoder = FrameDecoder::new();
        let event = decoder.decode(Bytes::from_static(&[TAP])).unwrap();
        assert_eq!(
            event,
            Some(Event::Signal {
                signal: Signal::Tap,
                payload: Bytes::new()
            })
        );
    }

    #[test]
    fn test_long_data_transfer() {
        let mut decoder = FrameDecoder::new();

        assert!(decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA], b"\x00\x01"]))
            .unwrap()
            .is_none());
        assert_eq!(decoder.state(), DecoderState::AccumulatingData);
        assert!(decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA], b"\x02"]))
            .unwrap()
            .is_none());

        let event = decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA_END], b"2"]))
            .unwrap();
        assert_eq!(event, Some(Event::Data(Bytes::from_static(b"\x00\x01\x02"))));
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_interleaved_text_and_data() {
        let mut decoder = FrameDecoder::new();

        decoder.decode(packet(&[&[LONG_TEXT], b"ab"])).unwrap();
        decoder.decode(packet(&[&[DATA_PREFIX, LONG_DATA], b"xy"])).unwrap();
        assert_eq!(decoder.state(), DecoderState::AccumulatingBoth);

        let text = decoder.decode(packet(&[&[LONG_TEXT_END], b"1"])).unwrap();
        assert_eq!(text, Some(Event::Text("ab".to_string())));
        assert_eq!(decoder.state(), DecoderState::AccumulatingData);

        let data = decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA_END], b"1"]))
            .unwrap();
        assert_eq!(data, Some(Event::Data(Bytes::from_static(b"xy"))));
    }

    #[test]
    fn test_mismatch_clears_stream() {
        let mut decoder = FrameDecoder::new();

        decoder.decode(packet(&[&[LONG_TEXT], b"a"])).unwrap();
        decoder.decode(packet(&[&[LONG_TEXT], b"b"])).unwrap();

        let err = decoder.decode(packet(&[&[LONG_TEXT_END], b"3"])).unwrap_err();
        assert_eq!(err.stream, ReplyStream::Text);
        assert_eq!(
            err.error,
            ReassemblyError::ChunkCountMismatch {
                expected: 3,
                received: 2
            }
        );
        assert_eq!(decoder.state(), DecoderState::Idle);

        // Next transfer starts clean.
        decoder.decode(packet(&[&[LONG_TEXT], b"c"])).unwrap();
        let event = decoder.decode(packet(&[&[LONG_TEXT_END], b"1"])).unwrap();
        assert_eq!(event, Some(Event::Text("c".to_string())));
    }

    #[test]
    fn test_overflow_aborts_transfer() {
        let mut decoder = FrameDecoder::with_max_receive_buffer(4);

        decoder.decode(packet(&[&[DATA_PREFIX, LONG_DATA], b"abc"])).unwrap();
        let err = decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA], b"de"]))
            .unwrap_err();

        assert_eq!(err.stream, ReplyStream::Data);
        assert_eq!(err.error, ReassemblyError::BufferOverflow { limit: 4 });
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_end_without_count_is_unverified() {
        let mut decoder = FrameDecoder::new();

        decoder.decode(packet(&[&[LONG_TEXT], b"a"])).unwrap();
        decoder.decode(packet(&[&[LONG_TEXT], b"b"])).unwrap();
        let event = decoder.decode(Bytes::from_static(&[LONG_TEXT_END])).unwrap();
        assert_eq!(event, Some(Event::Text("ab".to_string())));
    }

    #[test]
    fn test_empty_transfer() {
        let mut decoder = FrameDecoder::new();
        let event = decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA_END], b"0"]))
            .unwrap();
        assert_eq!(event, Some(Event::Data(Bytes::new())));

        let err = decoder
            .decode(packet(&[&[DATA_PREFIX, LONG_DATA_END], b"2"]))
            .unwrap_err();
        assert_eq!(
            err.error,
            ReassemblyError::ChunkCountMismatch {
                expected: 2,
                received: 0
            }
        );
    }

    #[test]
    fn test_bad_count_trailer() {
        let mut decoder = FrameDecoder::new();
        decoder.decode(packet(&[&[LONG_TEXT], b"a"])).unwrap();

        let err = decoder.decode(packet(&[&[LONG_TEXT_END], b"one"])).unwrap_err();
        assert_eq!(err.error, ReassemblyError::InvalidChunkCount("one".to_string()));
        assert_eq!(decoder.state(), DecoderState::Idle);
    }

    #[test]
    fn test_invalid_utf8_text() {
        let mut decoder = FrameDecoder::new();
        let err = decoder.decode(Bytes::from_static(b"\xFF\xFE")).unwrap_err();
        assert_eq!(err.stream, ReplyStream::Text);
        assert_eq!(err.error, ReassemblyError::InvalidUtf8);
    }

    proptest! {
        #[test]
        fn prop_long_data_round_trip(chunks in proptest::collection::vec(
            proptest::collection::vec(any::<u8>(), 0..64), 1..20)
        ) {
            let mut decoder = FrameDecoder::new();
            for chunk in &chunks {
                let out = decoder.decode(packet(&[&[DATA_PREFIX, LONG_DATA], chunk])).unwrap();
                prop_assert!(out.is_none());
            }
            let count = chunks.len().to_string();
            let event = decoder
                .decode(packet(&[&[DATA_PREFIX, LONG_DATA_END], count.as_bytes()]))
                .unwrap();
            prop_assert_eq!(event, Some(Event::Data(Bytes::from(chunks.concat()))));
        }
    }
}
