//! Single-slot reply waiters.
//!
//! Each reply stream (text, data) has exactly one slot. A caller arms the slot
//! *before* writing its command, writes, then awaits the returned
//! [`PendingReply`]. The decoder completes whichever slot is armed when a reply
//! finishes.
//!
//! Slots are not queues:
//! - arming clears nothing but an abandoned slot; a live one is [`FramewireError::WaiterBusy`],
//! - a timed-out or dropped wait disarms its slot, so a reply arriving later
//!   never completes it,
//! - on disconnect every armed slot fails with [`FramewireError::Disconnected`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::oneshot;

use crate::error::{CommandError, FramewireError, ReassemblyError, Result};
use crate::protocol::ReplyStream;

/// Why an armed slot was completed without a value.
#[derive(Debug, Clone)]
pub(crate) enum WaitFailure {
    Reassembly(ReassemblyError),
    Disconnected,
}

type Delivery<T> = std::result::Result<T, WaitFailure>;

struct Slot<T> {
    armed: Option<(u64, oneshot::Sender<Delivery<T>>)>,
    next_ticket: u64,
}

impl<T> Slot<T> {
    fn new() -> Self {
        Self {
            armed: None,
            next_ticket: 1,
        }
    }

    fn arm(&mut self) -> Option<(u64, oneshot::Receiver<Delivery<T>>)> {
        if let Some((_, tx)) = &self.armed {
            if !tx.is_closed() {
                return None;
            }
        }
        let ticket = self.next_ticket;
        self.next_ticket += 1;
        let (tx, rx) = oneshot::channel();
        self.armed = Some((ticket, tx));
        Some((ticket, rx))
    }

    fn complete(&mut self, value: Delivery<T>) -> bool {
        match self.armed.take() {
            Some((_, tx)) => tx.send(value).is_ok(),
            None => false,
        }
    }

    fn disarm(&mut self, ticket: u64) {
        if matches!(&self.armed, Some((t, _)) if *t == ticket) {
            self.armed = None;
        }
    }

    fn is_armed(&self) -> bool {
        self.armed.as_ref().is_some_and(|(_, tx)| !tx.is_closed())
    }
}

/// The text and data slots of one session.
pub struct WaiterRegistry {
    text: Slot<String>,
    data: Slot<Bytes>,
    closed: bool,
}

impl WaiterRegistry {
    /// Create a registry with both slots empty.
    pub fn new() -> Self {
        Self {
            text: Slot::new(),
            data: Slot::new(),
            closed: false,
        }
    }

    /// Whether a live waiter occupies the slot for `stream`.
    pub fn is_armed(&self, stream: ReplyStream) -> bool {
        match stream {
            ReplyStream::Text => self.text.is_armed(),
            ReplyStream::Data => self.data.is_armed(),
        }
    }

    /// Hand a finished text reply to the armed waiter. Returns `false` if none.
    pub fn complete_text(&mut self, text: String) -> bool {
        self.text.complete(Ok(text))
    }

    /// Hand a finished data reply to the armed waiter. Returns `false` if none.
    pub fn complete_data(&mut self, data: Bytes) -> bool {
        self.data.complete(Ok(data))
    }

    /// Fail the waiter on `stream` with a protocol error.
    pub fn fail(&mut self, stream: ReplyStream, error: ReassemblyError) -> bool {
        match stream {
            ReplyStream::Text => self.text.complete(Err(WaitFailure::Reassembly(error))),
            ReplyStream::Data => self.data.complete(Err(WaitFailure::Reassembly(error))),
        }
    }

    /// Fail every waiter with `Disconnected` and refuse new ones.
    pub fn close(&mut self) {
        self.closed = true;
        self.text.complete(Err(WaitFailure::Disconnected));
        self.data.complete(Err(WaitFailure::Disconnected));
    }

    fn disarm(&mut self, stream: ReplyStream, ticket: u64) {
        match stream {
            ReplyStream::Text => self.text.disarm(ticket),
            ReplyStream::Data => self.data.disarm(ticket),
        }
    }
}

impl Default for WaiterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a session's waiter slots.
#[derive(Clone, Default)]
pub struct Waiters {
    inner: Arc<Mutex<WaiterRegistry>>,
}

impl Waiters {
    /// Create empty slots.
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slots.
    pub fn lock(&self) -> MutexGuard<'_, WaiterRegistry> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the text slot.
    pub fn arm_text(&self) -> Result<PendingReply<String>> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(FramewireError::Disconnected);
        }
        let (ticket, rx) = registry
            .text
            .arm()
            .ok_or(FramewireError::WaiterBusy(ReplyStream::Text))?;
        Ok(PendingReply::new(rx, ticket, ReplyStream::Text, self.clone()))
    }

    /// Arm the data slot.
    pub fn arm_data(&self) -> Result<PendingReply<Bytes>> {
        let mut registry = self.lock();
        if registry.closed {
            return Err(FramewireError::Disconnected);
        }
        let (ticket, rx) = registry
            .data
            .arm()
            .ok_or(FramewireError::WaiterBusy(ReplyStream::Data))?;
        Ok(PendingReply::new(rx, ticket, ReplyStream::Data, self.clone()))
    }
}

/// An armed wait for one reply.
///
/// Dropping it without awaiting disarms the slot.
pub struct PendingReply<T> {
    rx: oneshot::Receiver<Delivery<T>>,
    ticket: u64,
    stream: ReplyStream,
    waiters: Waiters,
}

impl<T> PendingReply<T> {
    fn new(
        rx: oneshot::Receiver<Delivery<T>>,
        ticket: u64,
        stream: ReplyStream,
        waiters: Waiters,
    ) -> Self {
        Self {
            rx,
            ticket,
            stream,
            waiters,
        }
    }

    /// Stream this wait is armed on.
    pub fn stream(&self) -> ReplyStream {
        self.stream
    }

    /// Wait for the reply for at most `timeout`.
    pub async fn wait(mut self, timeout: Duration) -> Result<T> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(WaitFailure::Reassembly(e)))) => Err(e.into()),
            Ok(Ok(Err(WaitFailure::Disconnected))) | Ok(Err(_)) => {
                Err(FramewireError::Disconnected)
            }
            Err(_) => Err(CommandError::Timeout {
                stream: self.stream,
                after: timeout,
            }
            .into()),
        }
    }
}

impl<T> Drop for PendingReply<T> {
    fn drop(&mut self) {
        self.waiters.lock().disarm(self.stream, self.ticket);
    }
}
