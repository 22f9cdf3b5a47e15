//! Handler registry for push-style notifications.
//!
//! Handlers are keyed by [`HandlerKey`] and kept in registration order.
//! Several handlers may share a key; all matching ones run for every event.
//! Each invocation is spawned as its own task so a slow handler never stalls
//! the decoder.
//!
//! # Example
//!
//! ```
//! use framewire::handler::{Handler, HandlerKey, HandlerRegistry};
//! use framewire::protocol::TAP;
//!
//! let mut registry = HandlerRegistry::new();
//!
//! registry.register(HandlerKey::Prefix(TAP), Handler::no_args(|| async {
//!     println!("tapped");
//! }));
//!
//! assert_eq!(registry.len(), 1);
//! ```

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;

use crate::transport::BoxFuture;

type PayloadFn = dyn Fn(Bytes) -> BoxFuture<'static, ()> + Send + Sync;
type NoArgsFn = dyn Fn() -> BoxFuture<'static, ()> + Send + Sync;

/// An asynchronous notification callback.
///
/// The variant is fixed at registration time; dispatch goes through
/// [`Handler::invoke`] either way.
#[derive(Clone)]
pub enum Handler {
    /// Receives the payload that followed the matched prefix.
    WithPayload(Arc<PayloadFn>),
    /// Ignores the payload.
    NoArgs(Arc<NoArgsFn>),
}

impl Handler {
    /// Wrap a callback that takes the payload.
    pub fn with_payload<F, Fut>(callback: F) -> Self
    where
        F: Fn(Bytes) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::WithPayload(Arc::new(move |payload| -> BoxFuture<'static, ()> {
            Box::pin(callback(payload))
        }))
    }

    /// Wrap a callback that takes nothing.
    pub fn no_args<F, Fut>(callback: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Handler::NoArgs(Arc::new(move || -> BoxFuture<'static, ()> {
            Box::pin(callback())
        }))
    }

    /// Build the future for one invocation.
    pub fn invoke(&self, payload: Bytes) -> BoxFuture<'static, ()> {
        match self {
            Handler::WithPayload(f) => f(payload),
            Handler::NoArgs(f) => f(),
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::WithPayload(_) => f.write_str("Handler::WithPayload"),
            Handler::NoArgs(_) => f.write_str("Handler::NoArgs"),
        }
    }
}

/// Which events a handler observes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerKey {
    /// Every text reply. Payload is the UTF-8 text.
    Print,
    /// Data and signals whose first byte equals the prefix. Payload excludes it.
    Prefix(u8),
    /// Every data reply and signal. Payload is complete.
    AnyData,
}

struct Entry {
    key: HandlerKey,
    handler: Handler,
}

/// Registry of notification handlers for one session.
#[derive(Default)]
pub struct HandlerRegistry {
    entries: Vec<Entry>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler after all existing ones.
    pub fn register(&mut self, key: HandlerKey, handler: Handler) {
        self.entries.push(Entry { key, handler });
    }

    /// Remove every handler registered under `key`. Returns how many went.
    pub fn unregister(&mut self, key: HandlerKey) -> usize {
        let before = self.entries.len();
        self.entries.retain(|e| e.key != key);
        before - self.entries.len()
    }

    /// Drop all handlers.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Invocations for a text reply, in registration order.
    pub fn for_text(&self, text: &str) -> Vec<BoxFuture<'static, ()>> {
        let payload = Bytes::copy_from_slice(text.as_bytes());
        self.entries
            .iter()
            .filter(|e| e.key == HandlerKey::Print)
            .map(|e| e.handler.invoke(payload.clone()))
            .collect()
    }

    /// Invocations for a data reply or signal, in registration order.
    ///
    /// `payload` starts with the routing byte (the signal id for signals).
    pub fn for_data(&self, payload: &Bytes) -> Vec<BoxFuture<'static, ()>> {
        let first = payload.first().copied();
        self.entries
            .iter()
            .filter_map(|e| match e.key {
                HandlerKey::AnyData => Some(e.handler.invoke(payload.clone())),
                HandlerKey::Prefix(p) if Some(p) == first => {
                    Some(e.handler.invoke(payload.slice(1..)))
                }
                _ => None,
            })
            .collect()
    }
}
