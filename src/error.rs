//! Error types for framewire.
//!
//! Each layer has its own enum so callers can tell a slow device
//! ([`CommandError::Timeout`]) from a broken link ([`FramewireError::Disconnected`])
//! or a corrupted reply stream ([`ReassemblyError`]). Everything funnels into
//! [`FramewireError`] through `#[from]` conversions.

use std::time::Duration;

use thiserror::Error;

use crate::protocol::ReplyStream;

/// Failure to establish a link with a device.
#[derive(Debug, Error)]
pub enum ConnectError {
    /// No device matched the address filter.
    #[error("no matching device found")]
    NoDeviceFound,

    /// The platform refused the link; the device must be paired again.
    #[error("device needs to be re-paired: {0}")]
    PairingRequired(String),

    /// Underlying platform I/O failure.
    #[error("I/O error while connecting: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure while writing a packet to the link.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Packet does not fit the negotiated maximum payload.
    #[error("payload length is too large: {len} > {max}")]
    PayloadTooLarge { len: usize, max: usize },

    /// The link is gone.
    #[error("link is not connected")]
    NotConnected,

    /// Underlying platform I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Protocol violation detected while reassembling a long transfer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReassemblyError {
    /// End marker declared a different number of chunks than were received.
    #[error("chunk count mismatch (expected {expected}, got {received})")]
    ChunkCountMismatch { expected: u32, received: u32 },

    /// Accumulated transfer exceeded the receive cap.
    #[error("buffered long transfer exceeds {limit} bytes")]
    BufferOverflow { limit: usize },

    /// More chunks than the counter can hold.
    #[error("long transfer has too many chunks")]
    TooManyChunks,

    /// End marker trailer was not an ASCII decimal number.
    #[error("invalid chunk count trailer: {0:?}")]
    InvalidChunkCount(String),

    /// Text stream payload was not valid UTF-8.
    #[error("text reply is not valid UTF-8")]
    InvalidUtf8,
}

/// Failure of a command issued to the device.
#[derive(Debug, Error)]
pub enum CommandError {
    /// No reply arrived on the awaited stream in time.
    #[error("device did not respond on the {stream} stream within {after:?}")]
    Timeout { stream: ReplyStream, after: Duration },

    /// The acknowledgment marker was not what the command asked for.
    #[error("command did not run successfully: {0}")]
    Failed(String),

    /// A staged command file could not be loaded.
    #[error("loading staged command failed: {0}")]
    LoadFailed(String),

    /// Remote file could not be opened for writing.
    #[error("couldn't open file {path:?} for writing: {response}")]
    FileOpenFailed { path: String, response: String },

    /// Remote file receive callback could not be (un)registered.
    #[error("couldn't stream data into file {path:?}: {response}")]
    FileWriteFailed { path: String, response: String },

    /// Remote file could not be closed.
    #[error("error closing file {path:?}: {response}")]
    FileCloseFailed { path: String, response: String },

    /// A helper function could not be injected.
    #[error("error injecting library function {name}: {response}")]
    InjectionFailed { name: String, response: String },
}

/// Main error type for all framewire operations.
#[derive(Debug, Error)]
pub enum FramewireError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Reassembly(#[from] ReassemblyError),

    #[error(transparent)]
    Command(#[from] CommandError),

    /// The link dropped while the call was outstanding.
    #[error("device disconnected")]
    Disconnected,

    /// No session is active.
    #[error("not connected to a device")]
    NotConnected,

    /// Another caller is already waiting on this stream.
    #[error("a wait on the {0} stream is already outstanding")]
    WaiterBusy(ReplyStream),

    /// Configuration could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type alias using FramewireError.
pub type Result<T> = std::result::Result<T, FramewireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_error_messages() {
        let mismatch: FramewireError = ReassemblyError::ChunkCountMismatch {
            expected: 3,
            received: 2,
        }
        .into();
        assert_eq!(
            mismatch.to_string(),
            "chunk count mismatch (expected 3, got 2)"
        );

        let timeout: FramewireError = CommandError::Timeout {
            stream: ReplyStream::Text,
            after: Duration::from_secs(1),
        }
        .into();
        assert!(timeout.to_string().contains("text stream"));

        let too_large: FramewireError = TransportError::PayloadTooLarge { len: 10, max: 5 }.into();
        assert!(matches!(
            too_large,
            FramewireError::Transport(TransportError::PayloadTooLarge { len: 10, max: 5 })
        ));
    }
}
