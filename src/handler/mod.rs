//! Handler module - push-style notification callbacks.
//!
//! Provides:
//! - [`Handler`] - an async callback, with or without the payload
//! - [`HandlerKey`] - which events a handler observes
//! - [`HandlerRegistry`] - ordered collection dispatched on every event
//!
//! Handlers observe every matching event whether or not a caller is waiting
//! for a reply on the same stream.
//!
//! # Example
//!
//! ```ignore
//! use framewire::handler::{Handler, HandlerKey};
//! use framewire::protocol::MIC_DATA;
//!
//! client.register_handler(
//!     HandlerKey::Prefix(MIC_DATA),
//!     Handler::with_payload(|samples| async move {
//!         println!("{} bytes of audio", samples.len());
//!     }),
//! )?;
//! ```

mod registry;

pub use registry::{Handler, HandlerKey, HandlerRegistry};
