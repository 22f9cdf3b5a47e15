//! Notification wire format.
//!
//! Every notification is one link-layer packet. Its leading byte(s) select the
//! logical stream:
//!
//! ```text
//! ┌──────────────────────┬────────────────────────────────────────────┐
//! │ 0x03..=0x06 ...      │ signal (wake, tap, mic data, debug print)  │
//! │ 0x0A <bytes>         │ long text chunk                            │
//! │ 0x0B <ascii count>   │ long text end                              │
//! │ 0x01 0x01 <bytes>    │ long data chunk                            │
//! │ 0x01 0x02 <ascii n>  │ long data end                              │
//! │ 0x01 0x03..=0x06 ... │ signal sent through the data channel       │
//! │ 0x01 <bytes>         │ short data                                 │
//! │ anything else        │ short text (plain print)                   │
//! └──────────────────────┴────────────────────────────────────────────┘
//! ```
//!
//! Signal ids are matched before the stream markers so a signal is never
//! mistaken for a data or text transfer.

use std::fmt;

/// Outer prefix marking a binary packet.
pub const DATA_PREFIX: u8 = 0x01;

/// Inner marker: chunk of a long binary transfer.
pub const LONG_DATA: u8 = 0x01;
/// Inner marker: end of a long binary transfer.
pub const LONG_DATA_END: u8 = 0x02;
/// Wake signal.
pub const WAKE: u8 = 0x03;
/// Tap signal.
pub const TAP: u8 = 0x04;
/// Streaming microphone chunk.
pub const MIC_DATA: u8 = 0x05;
/// Debug print.
pub const DEBUG_PRINT: u8 = 0x06;
/// Chunk of a long text transfer.
pub const LONG_TEXT: u8 = 0x0A;
/// End of a long text transfer.
pub const LONG_TEXT_END: u8 = 0x0B;

/// Bytes consumed by the link layer out of every MTU.
pub const ATT_OVERHEAD: usize = 3;

/// Default cap on a single reassembled transfer (10 MiB).
pub const DEFAULT_MAX_RECEIVE_BUFFER: usize = 10 * 1024 * 1024;

/// Out-of-band one-byte events pushed by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Wake,
    Tap,
    MicData,
    DebugPrint,
}

impl Signal {
    /// Look up a signal by its wire id.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            WAKE => Some(Signal::Wake),
            TAP => Some(Signal::Tap),
            MIC_DATA => Some(Signal::MicData),
            DEBUG_PRINT => Some(Signal::DebugPrint),
            _ => None,
        }
    }

    /// Wire id of this signal.
    #[inline]
    pub fn as_byte(self) -> u8 {
        match self {
            Signal::Wake => WAKE,
            Signal::Tap => TAP,
            Signal::MicData => MIC_DATA,
            Signal::DebugPrint => DEBUG_PRINT,
        }
    }
}

/// Classification of one inbound packet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    ShortText,
    ShortData,
    LongTextChunk,
    LongTextEnd,
    LongDataChunk,
    LongDataEnd,
    Signal(Signal),
}

/// The two reply streams a caller can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReplyStream {
    Text,
    Data,
}

impl fmt::Display for ReplyStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReplyStream::Text => f.write_str("text"),
            ReplyStream::Data => f.write_str("data"),
        }
    }
}

/// Classify a packet by its leading bytes.
///
/// Returns the kind and the offset at which the payload starts.
pub fn classify(packet: &[u8]) -> (StreamKind, usize) {
    let Some(&first) = packet.first() else {
        return (StreamKind::ShortText, 0);
    };

    if let Some(signal) = Signal::from_byte(first) {
        return (StreamKind::Signal(signal), 1);
    }

    match first {
        LONG_TEXT => (StreamKind::LongTextChunk, 1),
        LONG_TEXT_END => (StreamKind::LongTextEnd, 1),
        DATA_PREFIX => match packet.get(1).copied() {
            Some(LONG_DATA) => (StreamKind::LongDataChunk, 2),
            Some(LONG_DATA_END) => (StreamKind::LongDataEnd, 2),
            Some(inner) => match Signal::from_byte(inner) {
                Some(signal) => (StreamKind::Signal(signal), 2),
                None => (StreamKind::ShortData, 1),
            },
            None => (StreamKind::ShortData, 1),
        },
        _ => (StreamKind::ShortText, 0),
    }
}

/// Parse the ASCII decimal chunk count trailing an End marker.
///
/// An empty trailer means the sender skipped verification and yields `None`.
pub fn parse_chunk_count(trailer: &[u8]) -> std::result::Result<Option<u32>, String> {
    if trailer.is_empty() {
        return Ok(None);
    }
    let text = String::from_utf8_lossy(trailer);
    text.trim()
        .parse::<u32>()
        .map(Some)
        .map_err(|_| text.into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_plain_text() {
        assert_eq!(classify(b"hi"), (StreamKind::ShortText, 0));
        assert_eq!(classify(b""), (StreamKind::ShortText, 0));
    }

    #[test]
    fn test_classify_long_text_markers() {
        assert_eq!(classify(b"\x0Aabc"), (StreamKind::LongTextChunk, 1));
        assert_eq!(classify(b"\x0B3"), (StreamKind::LongTextEnd, 1));
    }

    #[test]
    fn test_classify_data_markers() {
        assert_eq!(classify(b"\x01\x01abc"), (StreamKind::LongDataChunk, 2));
        assert_eq!(classify(b"\x01\x0212"), (StreamKind::LongDataEnd, 2));
        assert_eq!(classify(b"\x01xyz"), (StreamKind::ShortData, 1));
        assert_eq!(classify(b"\x01"), (StreamKind::ShortData, 1));
    }

    #[test]
    fn test_signals_checked_first() {
        assert_eq!(classify(&[TAP]), (StreamKind::Signal(Signal::Tap), 1));
        assert_eq!(classify(&[WAKE]), (StreamKind::Signal(Signal::Wake), 1));
        assert_eq!(
            classify(&[DATA_PREFIX, TAP]),
            (StreamKind::Signal(Signal::Tap), 2)
        );
        assert_eq!(
            classify(&[DATA_PREFIX, MIC_DATA, 0x10, 0x20]),
            (StreamKind::Signal(Signal::MicData), 2)
        );
    }

    #[test]
    fn test_signal_byte_mapping() {
        for byte in [WAKE, TAP, MIC_DATA, DEBUG_PRINT] {
            let signal = Signal::from_byte(byte).unwrap();
            assert_eq!(signal.as_byte(), byte);
        }
        assert!(Signal::from_byte(LONG_TEXT).is_none());
    }

    #[test]
    fn test_parse_chunk_count() {
        assert_eq!(parse_chunk_count(b""), Ok(None));
        assert_eq!(parse_chunk_count(b"28"), Ok(Some(28)));
        assert_eq!(parse_chunk_count(b"x1"), Err("x1".to_string()));
    }
}
