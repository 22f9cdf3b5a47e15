//! Transport module - the link to the device.
//!
//! The link is a pair of characteristics: one write channel and one notify
//! channel, with a small negotiated MTU. Platform radio stacks plug in by
//! implementing [`Connector`] and [`PacketSink`]; the rest of the crate only
//! sees a [`Link`].
//!
//! Disconnection is signalled by the `inbound` receiver closing. A closed link
//! is never reused: the session built on it is torn down and a new
//! [`Connector::connect`] call yields a fresh one.

mod memory;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{ConnectError, TransportError};
use crate::protocol::ATT_OVERHEAD;

pub use memory::{MemoryConnector, MemoryDevice, Responder};

/// Boxed future used at the transport seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Identifier of a connected device (platform address or name).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Write side of an established link.
pub trait PacketSink: Send + Sync + 'static {
    /// Write one packet to the device's write characteristic.
    fn write(&self, packet: Bytes) -> BoxFuture<'_, Result<(), TransportError>>;

    /// Tear the link down. Closes the inbound stream.
    fn disconnect(&self) -> BoxFuture<'_, ()>;

    /// Whether the platform still reports the link as up.
    fn is_connected(&self) -> bool;
}

/// Establishes links to devices.
pub trait Connector: Send + Sync + 'static {
    /// Connect to the nearest device whose identifier contains `address_filter`.
    fn connect<'a>(
        &'a self,
        address_filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Link, ConnectError>>;
}

/// An established link.
pub struct Link {
    /// Which device is on the other end.
    pub device_id: DeviceId,
    /// Negotiated MTU.
    pub mtu: usize,
    /// Write side.
    pub sink: Arc<dyn PacketSink>,
    /// Notifications in arrival order. Closes on disconnect.
    pub inbound: mpsc::UnboundedReceiver<Bytes>,
}

impl Link {
    /// Longest command packet the link accepts.
    #[inline]
    pub fn max_text_payload(&self) -> usize {
        max_text_payload(self.mtu)
    }

    /// Longest binary payload, leaving room for the data prefix.
    #[inline]
    pub fn max_data_payload(&self) -> usize {
        max_data_payload(self.mtu)
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("device_id", &self.device_id)
            .field("mtu", &self.mtu)
            .finish_non_exhaustive()
    }
}

/// Longest packet that fits an MTU.
#[inline]
pub fn max_text_payload(mtu: usize) -> usize {
    mtu.saturating_sub(ATT_OVERHEAD)
}

/// Longest binary payload that fits an MTU.
#[inline]
pub fn max_data_payload(mtu: usize) -> usize {
    max_text_payload(mtu).saturating_sub(1)
}
