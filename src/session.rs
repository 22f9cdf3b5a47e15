//! Per-connection session.
//!
//! A [`Session`] owns everything that lives exactly as long as one link:
//! - the write side of the link,
//! - the reader task, which owns the [`FrameDecoder`] outright,
//! - the dispatcher task, which runs handler invocations one at a time in
//!   arrival order,
//! - the waiter slots and the handler registry,
//! - the command lock that serializes request/response exchanges.
//!
//! When the link drops, the reader task fails all waiters with
//! `Disconnected`, empties the handler registry and closes the dispatch
//! queue. Invocations still queued at that point are dropped. Reconnecting builds a new
//! session; nothing is carried over.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use bytes::{BufMut, Bytes, BytesMut};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

use crate::error::{FramewireError, Result, TransportError};
use crate::handler::{Handler, HandlerKey, HandlerRegistry};
use crate::protocol::{
    build_command_packet, build_data_packet, build_signal_packet, Event, FrameDecoder, Signal,
};
use crate::transport::{
    max_data_payload, max_text_payload, BoxFuture, DeviceId, Link, PacketSink,
};
use crate::waiter::{PendingReply, Waiters};

/// Handler invocations produced by one event, in registration order.
type Invocations = Vec<BoxFuture<'static, ()>>;

/// State shared between the session handle and its tasks.
struct Shared {
    waiters: Waiters,
    handlers: RwLock<HandlerRegistry>,
    connected: AtomicBool,
}

impl Shared {
    fn teardown(&self) {
        self.connected.store(false, Ordering::Release);
        self.waiters.lock().close();
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// One live connection to a device.
pub struct Session {
    device_id: DeviceId,
    mtu: usize,
    sink: Arc<dyn PacketSink>,
    shared: Arc<Shared>,
    command_lock: Mutex<()>,
    reader: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
}

impl Session {
    /// Take ownership of a link and start decoding its notifications.
    pub fn start(link: Link, max_receive_buffer: usize) -> Self {
        let Link {
            device_id,
            mtu,
            sink,
            inbound,
        } = link;

        let shared = Arc::new(Shared {
            waiters: Waiters::new(),
            handlers: RwLock::new(HandlerRegistry::new()),
            connected: AtomicBool::new(true),
        });

        let (queue, pending) = mpsc::unbounded_channel();
        let dispatcher = tokio::spawn(Self::dispatch_loop(pending, shared.clone()));

        let decoder = FrameDecoder::with_max_receive_buffer(max_receive_buffer);
        let reader = tokio::spawn(Self::read_loop(inbound, decoder, queue, shared.clone()));

        tracing::debug!("Session started with {} (mtu {})", device_id, mtu);

        Self {
            device_id,
            mtu,
            sink,
            shared,
            command_lock: Mutex::new(()),
            reader,
            dispatcher,
        }
    }

    /// Main read loop - decodes notifications and dispatches events.
    async fn read_loop(
        mut inbound: mpsc::UnboundedReceiver<Bytes>,
        mut decoder: FrameDecoder,
        queue: mpsc::UnboundedSender<Invocations>,
        shared: Arc<Shared>,
    ) {
        while let Some(packet) = inbound.recv().await {
            tracing::trace!("Received packet: {} bytes", packet.len());

            match decoder.decode(packet) {
                Ok(Some(event)) => Self::dispatch_event(event, &shared, &queue),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Aborted {} stream: {}", e.stream, e.error);
                    shared.waiters.lock().fail(e.stream, e.error);
                }
            }
        }

        tracing::debug!("Link closed, tearing down session");
        shared.teardown();
        drop(queue);
    }

    /// Run queued handler invocations strictly one after another.
    ///
    /// Each invocation runs on its own task so a panicking handler does not
    /// take the dispatcher down, but the next one starts only after it ends.
    async fn dispatch_loop(mut pending: mpsc::UnboundedReceiver<Invocations>, shared: Arc<Shared>) {
        while let Some(invocations) = pending.recv().await {
            for invocation in invocations {
                if !shared.connected.load(Ordering::Acquire) {
                    tracing::debug!("Session closed, dropping queued handler calls");
                    return;
                }
                if let Err(e) = tokio::spawn(invocation).await {
                    tracing::warn!("Handler failed: {}", e);
                }
            }
        }
    }

    /// Queue the handlers for one event, then complete the matching waiter.
    fn dispatch_event(event: Event, shared: &Shared, queue: &mpsc::UnboundedSender<Invocations>) {
        let handlers = shared
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        match event {
            Event::Text(text) => {
                enqueue(queue, handlers.for_text(&text));
                drop(handlers);
                if !shared.waiters.lock().complete_text(text) {
                    tracing::debug!("Text reply with no waiter, delivered to handlers only");
                }
            }
            Event::Data(data) => {
                enqueue(queue, handlers.for_data(&data));
                drop(handlers);
                if !shared.waiters.lock().complete_data(data) {
                    tracing::debug!("Data reply with no waiter, delivered to handlers only");
                }
            }
            Event::Signal { signal, payload } => {
                if signal == Signal::DebugPrint {
                    tracing::debug!("Device debug: {}", String::from_utf8_lossy(&payload));
                }
                let mut routed = BytesMut::with_capacity(1 + payload.len());
                routed.put_u8(signal.as_byte());
                routed.put_slice(&payload);
                enqueue(queue, handlers.for_data(&routed.freeze()));
            }
        }
    }

    /// Device on the other end.
    pub fn device_id(&self) -> &DeviceId {
        &self.device_id
    }

    /// Whether the link is still up.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire) && self.sink.is_connected()
    }

    /// Longest command packet.
    pub fn max_text_payload(&self) -> usize {
        max_text_payload(self.mtu)
    }

    /// Longest binary payload.
    pub fn max_data_payload(&self) -> usize {
        max_data_payload(self.mtu)
    }

    /// Serialize request/response exchanges on this session.
    pub async fn lock_commands(&self) -> MutexGuard<'_, ()> {
        self.command_lock.lock().await
    }

    /// Write one packet, refusing anything that exceeds the link payload.
    pub async fn write(&self, packet: Bytes) -> Result<()> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(FramewireError::Disconnected);
        }

        let max = self.max_text_payload();
        if packet.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: packet.len(),
                max,
            }
            .into());
        }

        tracing::trace!("Sending packet: {} bytes", packet.len());
        self.sink.write(packet).await?;
        Ok(())
    }

    /// Send one command without waiting for anything.
    pub async fn send_command(&self, command: &str) -> Result<()> {
        self.write(build_command_packet(command)).await
    }

    /// Send one binary payload.
    pub async fn send_data(&self, payload: &[u8]) -> Result<()> {
        let max = self.max_data_payload();
        if payload.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: payload.len(),
                max,
            }
            .into());
        }
        self.write(build_data_packet(payload)).await
    }

    /// Send a one-byte control signal.
    pub async fn send_signal(&self, signal: u8) -> Result<()> {
        self.write(build_signal_packet(signal)).await
    }

    /// Send a command and wait for its text reply.
    pub async fn query(&self, command: &str, timeout: Duration) -> Result<String> {
        let pending = self.arm_text()?;
        self.send_command(command).await?;
        pending.wait(timeout).await
    }

    /// Send a binary payload and wait for a data reply.
    pub async fn query_data(&self, payload: &[u8], timeout: Duration) -> Result<Bytes> {
        let pending = self.arm_data()?;
        self.send_data(payload).await?;
        pending.wait(timeout).await
    }

    /// Arm the text waiter slot.
    pub fn arm_text(&self) -> Result<PendingReply<String>> {
        self.shared.waiters.arm_text()
    }

    /// Arm the data waiter slot.
    pub fn arm_data(&self) -> Result<PendingReply<Bytes>> {
        self.shared.waiters.arm_data()
    }

    /// Add a notification handler.
    pub fn register_handler(&self, key: HandlerKey, handler: Handler) -> Result<()> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(FramewireError::Disconnected);
        }
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .register(key, handler);
        Ok(())
    }

    /// Remove all handlers under `key`.
    pub fn unregister_handler(&self, key: HandlerKey) -> usize {
        self.shared
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .unregister(key)
    }

    /// Disconnect and tear down immediately.
    pub async fn close(&self) {
        self.sink.disconnect().await;
        self.shared.teardown();
        self.reader.abort();
        self.dispatcher.abort();
        tracing::debug!("Session with {} closed", self.device_id);
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.reader.abort();
        self.dispatcher.abort();
    }
}

fn enqueue(queue: &mpsc::UnboundedSender<Invocations>, invocations: Invocations) {
    if invocations.is_empty() {
        return;
    }
    if queue.send(invocations).is_err() {
        tracing::debug!("Dispatcher gone, handler calls dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReassemblyError;
    use crate::transport::{Connector, MemoryConnector, MemoryDevice};

    async fn start(device: &MemoryDevice) -> Session {
        let link = MemoryConnector::new(device.clone())
            .connect(None)
            .await
            .unwrap();
        Session::start(link, 1024)
    }

    #[tokio::test]
    async fn test_query_returns_plain_print() {
        let device = MemoryDevice::new("Frame", 64).with_responder(|packet| {
            if packet == b"print('hi')" {
                vec![Bytes::from_static(b"hi")]
            } else {
                Vec::new()
            }
        });
        let session = start(&device).await;

        let reply = session
            .query("print('hi')", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, "hi");
    }

    #[tokio::test]
    async fn test_query_data_echo() {
        let device = MemoryDevice::new("Frame", 64)
            .with_responder(|packet| vec![Bytes::copy_from_slice(packet)]);
        let session = start(&device).await;

        let reply = session
            .query_data(b"test", Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(reply, Bytes::from_static(b"test"));
    }

    #[tokio::test]
    async fn test_write_too_large() {
        let device = MemoryDevice::new("Frame", 23);
        let session = start(&device).await;
        assert_eq!(session.max_text_payload(), 20);
        assert_eq!(session.max_data_payload(), 19);

        let result = session.send_command(&"a".repeat(21)).await;
        assert!(matches!(
            result,
            Err(FramewireError::Transport(TransportError::PayloadTooLarge { len: 21, max: 20 }))
        ));

        let result = session.send_data(&[0u8; 20]).await;
        assert!(matches!(
            result,
            Err(FramewireError::Transport(TransportError::PayloadTooLarge { len: 20, max: 19 }))
        ));
        assert!(device.written().is_empty());
    }

    #[tokio::test]
    async fn test_protocol_error_reaches_waiter() {
        let device = MemoryDevice::new("Frame", 64).with_responder(|_| {
            vec![
                Bytes::from_static(b"\x0Aab"),
                Bytes::from_static(b"\x0B5"),
            ]
        });
        let session = start(&device).await;

        let result = session.query("x", Duration::from_secs(1)).await;
        assert!(matches!(
            result,
            Err(FramewireError::Reassembly(ReassemblyError::ChunkCountMismatch {
                expected: 5,
                received: 1
            }))
        ));
    }

    #[tokio::test]
    async fn test_disconnect_cancels_waiter() {
        let device = MemoryDevice::new("Frame", 64);
        let session = start(&device).await;

        let pending = session.arm_text().unwrap();
        device.drop_link();

        let result = pending.wait(Duration::from_secs(5)).await;
        assert!(matches!(result, Err(FramewireError::Disconnected)));
        assert!(!session.is_connected());
        assert!(matches!(
            session.send_command("x").await,
            Err(FramewireError::Disconnected)
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_handlers_run_in_arrival_and_registration_order() {
        use crate::protocol::MIC_DATA;

        const PACKETS: u32 = 5000;

        let device = MemoryDevice::new("Frame", 64);
        let session = start(&device).await;

        let log = Arc::new(std::sync::Mutex::new(Vec::new()));
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();
        for tag in ["first", "second"] {
            let log = log.clone();
            let done_tx = done_tx.clone();
            session
                .register_handler(
                    HandlerKey::Prefix(MIC_DATA),
                    Handler::with_payload(move |payload: Bytes| {
                        let log = log.clone();
                        let done_tx = done_tx.clone();
                        async move {
                            let seq = u32::from_be_bytes([
                                payload[0], payload[1], payload[2], payload[3],
                            ]);
                            log.lock().unwrap().push((seq, tag));
                            if tag == "second" && seq == PACKETS - 1 {
                                let _ = done_tx.send(());
                            }
                        }
                    }),
                )
                .unwrap();
        }

        for seq in 0..PACKETS {
            let mut packet = vec![0x01, MIC_DATA];
            packet.extend_from_slice(&seq.to_be_bytes());
            assert!(device.notify(packet));
        }

        tokio::time::timeout(Duration::from_secs(10), done_rx.recv())
            .await
            .unwrap()
            .unwrap();

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 2 * PACKETS as usize);
        for (i, pair) in log.chunks(2).enumerate() {
            assert_eq!(pair[0], (i as u32, "first"));
            assert_eq!(pair[1], (i as u32, "second"));
        }
    }

    #[tokio::test]
    async fn test_handlers_cleared_on_disconnect() {
        let device = MemoryDevice::new("Frame", 64);
        let session = start(&device).await;
        session
            .register_handler(HandlerKey::Print, Handler::no_args(|| async {}))
            .unwrap();

        session.close().await;

        assert_eq!(session.unregister_handler(HandlerKey::Print), 0);
        assert!(session
            .register_handler(HandlerKey::Print, Handler::no_args(|| async {}))
            .is_err());
    }
}
