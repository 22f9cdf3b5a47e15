//! # framewire
//!
//! Host-side SDK for a Lua-scripted wearable over a BLE-style link.
//!
//! Everything the device does is driven by sending it Lua source and,
//! optionally, waiting for what it prints back. This crate handles the part
//! in between:
//!
//! - **Framing**: one notify channel multiplexes short and long text, short
//!   and long binary data, and one-byte signals (tap, wake, microphone data).
//!   Long transfers are reassembled and checked against their declared chunk
//!   count.
//! - **Request/response**: single-slot waiters per reply stream turn writes
//!   into calls with timeouts. Handlers see every event independently.
//! - **Command routing**: commands that fit one packet are written inline;
//!   longer ones are uploaded to a temporary file, loaded and deleted.
//! - **Bootstrap**: a small versioned helper library is injected after
//!   connecting.
//!
//! ## Example
//!
//! ```no_run
//! use framewire::handler::{Handler, HandlerKey};
//! use framewire::protocol::TAP;
//! use framewire::transport::{MemoryConnector, MemoryDevice};
//! use framewire::{Client, Completion};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let device = MemoryDevice::new("Frame 01", 247);
//!     let client = Client::builder(MemoryConnector::new(device)).build();
//!
//!     client.connect(None).await?;
//!     client.register_handler(
//!         HandlerKey::Prefix(TAP),
//!         Handler::no_args(|| async { println!("tapped") }),
//!     )?;
//!
//!     let battery = client.evaluate("frame.battery_level()").await?;
//!     println!("battery: {battery}");
//!
//!     client
//!         .run_command(
//!             "frame.display.text('hello', 1, 1);frame.display.show()",
//!             Completion::AwaitAck,
//!             None,
//!         )
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod command;
pub mod config;
pub mod error;
pub mod files;
pub mod handler;
pub mod library;
pub mod protocol;
pub mod transport;
pub mod waiter;

mod client;
mod session;

pub use client::{Client, ClientBuilder};
pub use command::{Completion, Delivery};
pub use config::ClientConfig;
pub use error::{FramewireError, Result};
pub use transport::DeviceId;
