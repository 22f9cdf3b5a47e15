//! Loopback - run commands against a simulated device.
//!
//! This example demonstrates:
//! - Building a client with `Client::builder()`
//! - Inline commands with a reply and with an acknowledgment
//! - A command too long for one packet, delivered as a staged upload
//! - Binary payloads with `send_bytes`
//!
//! # Running
//!
//! ```sh
//! RUST_LOG=framewire=debug cargo run --example loopback
//! ```

use std::time::Duration;

use bytes::Bytes;
use framewire::transport::MemoryDevice;
use framewire::transport::MemoryConnector;
use framewire::{Client, Completion};
use tracing_subscriber::EnvFilter;

/// Answers the statements this demo sends, the way the device would.
fn respond(packet: &[u8]) -> Vec<Bytes> {
    // Binary payloads come back unchanged.
    if packet.first() == Some(&0x01) {
        return vec![Bytes::copy_from_slice(packet)];
    }

    let command = String::from_utf8_lossy(packet);
    if let Some(marker) = command
        .rsplit_once(";print(\"")
        .and_then(|(_, tail)| tail.strip_suffix("\")"))
    {
        return vec![Bytes::copy_from_slice(marker.as_bytes())];
    }
    if command.starts_with("prntLng(") {
        return vec![Bytes::from_static(b"hello from the device")];
    }
    Vec::new()
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let device = MemoryDevice::new("Frame 4F", 247).with_responder(respond);
    let client = Client::builder(MemoryConnector::new(device.clone()))
        .initialize_on_connect(false)
        .chunk_delay(Duration::from_millis(10))
        .build();

    let id = client.connect(Some("Frame")).await?;
    println!(
        "connected to {id}: {} byte commands, {} byte data",
        client.max_text_payload(),
        client.max_binary_payload()
    );

    let reply = client
        .run_command("print('hello')", Completion::AwaitReply, None)
        .await?;
    println!("reply: {reply:?}");

    client
        .run_command("frame.display.show()", Completion::AwaitAck, None)
        .await?;
    println!("display acknowledged");

    let long = format!("-- {}\nframe.display.show()", "padding ".repeat(60));
    client
        .run_command(&long, Completion::AwaitAck, None)
        .await?;
    println!(
        "staged {} byte command in {} packets",
        long.len(),
        device.written().len()
    );

    let echo = client.send_bytes(b"ping", true).await?;
    println!("data echo: {echo:?}");

    client.disconnect().await;
    Ok(())
}
