//! Client configuration.
//!
//! Every field has a default, so a config file only needs the values it
//! changes:
//!
//! ```
//! use framewire::ClientConfig;
//!
//! let config = ClientConfig::from_json(r#"{ "default_timeout_ms": 2500 }"#).unwrap();
//! assert_eq!(config.default_timeout().as_millis(), 2500);
//! assert!(config.checked_uploads);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::protocol::DEFAULT_MAX_RECEIVE_BUFFER;

/// Default wait for a reply (10 seconds).
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;

/// Default pause between upload chunks (100 ms).
pub const DEFAULT_CHUNK_DELAY_MS: u64 = 100;

/// Tunables for a [`Client`](crate::Client).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Wait applied when a call does not pass its own timeout.
    pub default_timeout_ms: u64,
    /// Pause between consecutive chunks of a file upload, so the device's
    /// receive buffer keeps up.
    pub chunk_delay_ms: u64,
    /// Cap on one reassembled long transfer.
    pub max_receive_buffer: usize,
    /// Acknowledge each step of a file upload.
    pub checked_uploads: bool,
    /// Rewrite `print(` to the long-print helper in outgoing commands.
    pub rewrite_print: bool,
    /// Break, inject helpers and set the clock right after connecting.
    pub initialize_on_connect: bool,
}

impl ClientConfig {
    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serialize to JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Default reply timeout.
    #[inline]
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Upload pacing delay.
    #[inline]
    pub fn chunk_delay(&self) -> Duration {
        Duration::from_millis(self.chunk_delay_ms)
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            chunk_delay_ms: DEFAULT_CHUNK_DELAY_MS,
            max_receive_buffer: DEFAULT_MAX_RECEIVE_BUFFER,
            checked_uploads: true,
            rewrite_print: true,
            initialize_on_connect: true,
        }
    }
}
