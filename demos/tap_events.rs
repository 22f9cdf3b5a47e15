//! Tap events - push notifications from the device.
//!
//! This example demonstrates:
//! - Registering handlers by prefix with `register_handler`
//! - Receiving signals that arrive without any request
//! - The wildcard handler seeing every data notification
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=framewire=trace cargo run --example tap_events
//! ```

use bytes::Bytes;
use framewire::handler::{Handler, HandlerKey};
use framewire::protocol::{DATA_PREFIX, MIC_DATA, TAP};
use framewire::transport::{MemoryConnector, MemoryDevice};
use framewire::Client;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let device = MemoryDevice::new("Frame 4F", 247);
    let client = Client::builder(MemoryConnector::new(device.clone()))
        .initialize_on_connect(false)
        .build();
    client.connect(None).await?;

    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let taps = tx.clone();
    client.register_handler(
        HandlerKey::Prefix(TAP),
        Handler::no_args(move || {
            let taps = taps.clone();
            async move {
                let _ = taps.send("tap".to_string());
            }
        }),
    )?;

    let audio = tx.clone();
    client.register_handler(
        HandlerKey::Prefix(MIC_DATA),
        Handler::with_payload(move |samples: Bytes| {
            let audio = audio.clone();
            async move {
                let _ = audio.send(format!("{} bytes of audio", samples.len()));
            }
        }),
    )?;

    client.register_handler(
        HandlerKey::AnyData,
        Handler::with_payload(move |payload: Bytes| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(format!("notification {:02x?}", &payload[..payload.len().min(4)]));
            }
        }),
    )?;

    // Simulate the wearer tapping twice and a short burst of microphone data.
    device.notify(Bytes::from_static(&[TAP]));
    device.notify(Bytes::from(vec![DATA_PREFIX, MIC_DATA, 0, 1, 2, 3, 4, 5]));
    device.notify(Bytes::from_static(&[TAP]));

    for _ in 0..6 {
        match rx.recv().await {
            Some(line) => println!("{line}"),
            None => break,
        }
    }

    client.disconnect().await;
    Ok(())
}
