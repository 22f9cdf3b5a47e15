//! In-memory device link.
//!
//! [`MemoryDevice`] stands in for the radio: it records every packet written
//! to it and answers through a scripted [`Responder`]. It backs the crate's
//! tests and demos and lets host applications exercise their command flows
//! without hardware.
//!
//! # Example
//!
//! ```
//! use bytes::Bytes;
//! use framewire::transport::{MemoryConnector, MemoryDevice};
//!
//! let device = MemoryDevice::new("Frame 01", 247).with_responder(|packet| {
//!     if packet == b"print('hi')" {
//!         vec![Bytes::from_static(b"hi")]
//!     } else {
//!         Vec::new()
//!     }
//! });
//! let connector = MemoryConnector::new(device.clone());
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use tokio::sync::mpsc;

use super::{max_text_payload, BoxFuture, Connector, DeviceId, Link, PacketSink};
use crate::error::{ConnectError, TransportError};

/// Maps one written packet to the notifications the device sends back.
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<Bytes> + Send>;

struct DeviceState {
    responder: Option<Responder>,
    notify: Option<mpsc::UnboundedSender<Bytes>>,
    written: Vec<Bytes>,
    generation: u64,
    pairing_required: bool,
}

struct Inner {
    name: String,
    mtu: usize,
    state: Mutex<DeviceState>,
}

/// A scripted device reachable through [`MemoryConnector`].
#[derive(Clone)]
pub struct MemoryDevice {
    inner: Arc<Inner>,
}

impl MemoryDevice {
    /// Create a silent device with the given name and MTU.
    pub fn new(name: impl Into<String>, mtu: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                name: name.into(),
                mtu,
                state: Mutex::new(DeviceState {
                    responder: None,
                    notify: None,
                    written: Vec::new(),
                    generation: 0,
                    pairing_required: false,
                }),
            }),
        }
    }

    /// Install a responder.
    pub fn with_responder<F>(self, responder: F) -> Self
    where
        F: FnMut(&[u8]) -> Vec<Bytes> + Send + 'static,
    {
        self.set_responder(responder);
        self
    }

    /// Replace the responder.
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<Bytes> + Send + 'static,
    {
        self.state().responder = Some(Box::new(responder));
    }

    /// Make the next connect attempts fail as if the bond was lost.
    pub fn require_pairing(&self, required: bool) {
        self.state().pairing_required = required;
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Negotiated MTU.
    pub fn mtu(&self) -> usize {
        self.inner.mtu
    }

    /// Push an unsolicited notification. Returns `false` if no link is up.
    pub fn notify(&self, packet: impl Into<Bytes>) -> bool {
        match &self.state().notify {
            Some(tx) => tx.send(packet.into()).is_ok(),
            None => false,
        }
    }

    /// Simulate link loss from the device side.
    pub fn drop_link(&self) {
        self.state().notify = None;
    }

    /// Whether a host is linked.
    pub fn is_linked(&self) -> bool {
        self.state()
            .notify
            .as_ref()
            .is_some_and(|tx| !tx.is_closed())
    }

    /// Every packet written so far, in order.
    pub fn written(&self) -> Vec<Bytes> {
        self.state().written.clone()
    }

    /// Written packets rendered as text (lossy).
    pub fn written_text(&self) -> Vec<String> {
        self.state()
            .written
            .iter()
            .map(|p| String::from_utf8_lossy(p).into_owned())
            .collect()
    }

    /// Forget the write log.
    pub fn clear_written(&self) {
        self.state().written.clear();
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn open(&self) -> Result<Link, ConnectError> {
        let mut state = self.state();
        if state.pairing_required {
            return Err(ConnectError::PairingRequired(format!(
                "{} rejected the link",
                self.inner.name
            )));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.notify = Some(tx);
        state.generation += 1;

        Ok(Link {
            device_id: DeviceId(self.inner.name.clone()),
            mtu: self.inner.mtu,
            sink: Arc::new(MemorySink {
                device: self.clone(),
                generation: state.generation,
            }),
            inbound: rx,
        })
    }
}

/// Write side handed out with each in-memory link.
struct MemorySink {
    device: MemoryDevice,
    generation: u64,
}

impl MemorySink {
    fn write_now(&self, packet: Bytes) -> Result<(), TransportError> {
        let max = max_text_payload(self.device.inner.mtu);
        if packet.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: packet.len(),
                max,
            });
        }

        // The responder runs outside the lock so it may call back into the device.
        let (mut responder, tx) = {
            let mut state = self.device.state();
            let tx = match (&state.notify, state.generation == self.generation) {
                (Some(tx), true) => tx.clone(),
                _ => return Err(TransportError::NotConnected),
            };
            state.written.push(packet.clone());
            (state.responder.take(), tx)
        };

        if let Some(respond) = responder.as_mut() {
            for reply in respond(&packet) {
                let _ = tx.send(reply);
            }
        }

        let mut state = self.device.state();
        if state.responder.is_none() {
            state.responder = responder;
        }
        Ok(())
    }
}

impl PacketSink for MemorySink {
    fn write(&self, packet: Bytes) -> BoxFuture<'_, Result<(), TransportError>> {
        let result = self.write_now(packet);
        Box::pin(async move { result })
    }

    fn disconnect(&self) -> BoxFuture<'_, ()> {
        let mut state = self.device.state();
        if state.generation == self.generation {
            state.notify = None;
        }
        Box::pin(async {})
    }

    fn is_connected(&self) -> bool {
        let state = self.device.state();
        state.generation == self.generation
            && state.notify.as_ref().is_some_and(|tx| !tx.is_closed())
    }
}

/// Connector over a fixed set of in-memory devices.
pub struct MemoryConnector {
    devices: Vec<MemoryDevice>,
}

impl MemoryConnector {
    /// Connector that can only reach `device`.
    pub fn new(device: MemoryDevice) -> Self {
        Self {
            devices: vec![device],
        }
    }

    /// Connector over several devices, in discovery order.
    pub fn with_devices(devices: Vec<MemoryDevice>) -> Self {
        Self { devices }
    }
}

impl Connector for MemoryConnector {
    fn connect<'a>(
        &'a self,
        address_filter: Option<&'a str>,
    ) -> BoxFuture<'a, Result<Link, ConnectError>> {
        let result = self
            .devices
            .iter()
            .find(|d| address_filter.map_or(true, |f| d.name().contains(f)))
            .ok_or(ConnectError::NoDeviceFound)
            .and_then(MemoryDevice::open);
        Box::pin(async move { result })
    }
}
