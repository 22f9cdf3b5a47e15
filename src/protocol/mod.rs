//! Protocol module - notification framing and reassembly.
//!
//! This module implements the packet-level protocol of the link:
//! - leading-byte classification of inbound packets
//! - reassembly of long text and data transfers
//! - the decoder state machine producing [`Event`]s
//! - builders for outbound packets

mod decoder;
mod packet;
mod reassembly;
mod wire_format;

pub use decoder::{DecodeError, DecoderState, Event, FrameDecoder};
pub use packet::{
    build_command_packet, build_data_packet, build_signal_packet, BREAK_SIGNAL, RESET_SIGNAL,
};
pub use reassembly::ReassemblyBuffer;
pub use wire_format::{
    classify, parse_chunk_count, ReplyStream, Signal, StreamKind, ATT_OVERHEAD, DATA_PREFIX,
    DEBUG_PRINT, DEFAULT_MAX_RECEIVE_BUFFER, LONG_DATA, LONG_DATA_END, LONG_TEXT, LONG_TEXT_END,
    MIC_DATA, TAP, WAKE,
};
