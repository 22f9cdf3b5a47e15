//! Outbound packet builders.
//!
//! Commands travel as bare UTF-8 packets. Binary payloads carry the one-byte
//! data prefix so the device routes them to its receive callback instead of
//! the interpreter.
//!
//! # Example
//!
//! ```
//! use framewire::protocol::{build_data_packet, DATA_PREFIX};
//!
//! let packet = build_data_packet(b"hello");
//! assert_eq!(packet[0], DATA_PREFIX);
//! assert_eq!(&packet[1..], b"hello");
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use super::wire_format::DATA_PREFIX;

/// Control byte that interrupts the running script.
pub const BREAK_SIGNAL: u8 = 0x03;

/// Control byte that restarts the interpreter.
pub const RESET_SIGNAL: u8 = 0x04;

/// Build a binary packet: data prefix followed by the payload.
pub fn build_data_packet(payload: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + payload.len());
    buf.put_u8(DATA_PREFIX);
    buf.put_slice(payload);
    buf.freeze()
}

/// Build a command packet from its source text.
#[inline]
pub fn build_command_packet(command: &str) -> Bytes {
    Bytes::copy_from_slice(command.as_bytes())
}

/// Build a one-byte control packet.
#[inline]
pub fn build_signal_packet(signal: u8) -> Bytes {
    Bytes::copy_from_slice(&[signal])
}
