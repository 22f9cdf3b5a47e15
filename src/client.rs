//! Client builder and public surface.
//!
//! The [`ClientBuilder`] provides a fluent API for configuring the client.
//! The [`Client`] manages the connection lifecycle:
//! 1. Connect through a [`Connector`]
//! 2. Start the session reader task
//! 3. Optionally break the running script, inject the helper library and
//!    set the device clock
//! 4. Route commands, binary payloads and waits through the session
//!
//! # Example
//!
//! ```no_run
//! use framewire::transport::{MemoryConnector, MemoryDevice};
//! use framewire::{Client, Completion};
//!
//! #[tokio::main]
//! async fn main() -> framewire::Result<()> {
//!     let device = MemoryDevice::new("Frame 01", 247);
//!     let client = Client::builder(MemoryConnector::new(device))
//!         .initialize_on_connect(false)
//!         .build();
//!
//!     client.connect(None).await?;
//!     let reply = client
//!         .run_command("print('hi')", Completion::AwaitReply, None)
//!         .await?;
//!     println!("{reply:?}");
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use bytes::Bytes;

use crate::codec::PRINT_LONG;
use crate::command::{self, Completion};
use crate::config::ClientConfig;
use crate::error::{FramewireError, Result, TransportError};
use crate::files;
use crate::handler::{Handler, HandlerKey};
use crate::library::{self, HELPERS_SOURCE};
use crate::protocol::{BREAK_SIGNAL, RESET_SIGNAL};
use crate::session::Session;
use crate::transport::{Connector, DeviceId};

/// Builder for configuring and creating a [`Client`].
pub struct ClientBuilder {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Create a builder that connects through `connector`.
    pub fn new(connector: impl Connector) -> Self {
        Self {
            connector: Arc::new(connector),
            config: ClientConfig::default(),
        }
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the timeout used when a call passes none.
    ///
    /// Default: 10 seconds
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the pause between upload chunks.
    ///
    /// Default: 100 ms
    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.config.chunk_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the cap on one reassembled long transfer.
    ///
    /// Default: 10 MiB
    pub fn max_receive_buffer(mut self, limit: usize) -> Self {
        self.config.max_receive_buffer = limit;
        self
    }

    /// Acknowledge each control step of staged uploads.
    pub fn checked_uploads(mut self, checked: bool) -> Self {
        self.config.checked_uploads = checked;
        self
    }

    /// Rewrite `print(` to the long-print helper in commands.
    pub fn rewrite_print(mut self, rewrite: bool) -> Self {
        self.config.rewrite_print = rewrite;
        self
    }

    /// Break, inject helpers and set the clock after each connect.
    pub fn initialize_on_connect(mut self, initialize: bool) -> Self {
        self.config.initialize_on_connect = initialize;
        self
    }

    /// Build the client. No connection is made yet.
    pub fn build(self) -> Client {
        Client {
            connector: self.connector,
            config: self.config,
            session: Mutex::new(None),
        }
    }
}

/// A handle to at most one connected device.
///
/// Every operation except [`Client::connect`] fails with
/// [`FramewireError::NotConnected`] while no session is up.
pub struct Client {
    connector: Arc<dyn Connector>,
    config: ClientConfig,
    session: Mutex<Option<Arc<Session>>>,
}

impl Client {
    /// Create a new client builder.
    pub fn builder(connector: impl Connector) -> ClientBuilder {
        ClientBuilder::new(connector)
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<Session>>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn session(&self) -> Result<Arc<Session>> {
        match self.slot().as_ref() {
            Some(session) if session.is_connected() => Ok(session.clone()),
            _ => Err(FramewireError::NotConnected),
        }
    }

    fn timeout(&self, timeout: Option<Duration>) -> Duration {
        timeout.unwrap_or_else(|| self.config.default_timeout())
    }

    /// Connect to the first device matching `address_filter`.
    ///
    /// An existing session is closed first; nothing carries over to the new one.
    pub async fn connect(&self, address_filter: Option<&str>) -> Result<DeviceId> {
        let previous = self.slot().take();
        if let Some(previous) = previous {
            previous.close().await;
        }

        let link = self.connector.connect(address_filter).await?;
        let session = Arc::new(Session::start(link, self.config.max_receive_buffer));
        let device_id = session.device_id().clone();
        *self.slot() = Some(session.clone());

        tracing::info!("Connected to {}", device_id);

        if self.config.initialize_on_connect {
            self.initialize(&session).await?;
        }

        Ok(device_id)
    }

    async fn initialize(&self, session: &Session) -> Result<()> {
        let _guard = session.lock_commands().await;

        session.send_signal(BREAK_SIGNAL).await?;
        library::inject_library(session, &self.config).await?;

        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        command::run_command(
            session,
            &self.config,
            &format!("is_awake=true;frame.time.utc({now})"),
            Completion::AwaitAck,
            self.config.default_timeout(),
        )
        .await?;

        tracing::debug!("Initialized {}", session.device_id());
        Ok(())
    }

    /// Close the link. Outstanding waits fail with `Disconnected`.
    pub async fn disconnect(&self) {
        let session = self.slot().take();
        if let Some(session) = session {
            session.close().await;
            tracing::info!("Disconnected from {}", session.device_id());
        }
    }

    /// Whether a session is up.
    pub fn is_connected(&self) -> bool {
        self.slot().as_ref().is_some_and(|s| s.is_connected())
    }

    /// Device of the current session.
    pub fn device_id(&self) -> Option<DeviceId> {
        self.slot().as_ref().map(|s| s.device_id().clone())
    }

    /// Longest command that fits one packet, 0 when not connected.
    pub fn max_text_payload(&self) -> usize {
        self.slot().as_ref().map_or(0, |s| s.max_text_payload())
    }

    /// Longest binary payload that fits one packet, 0 when not connected.
    pub fn max_binary_payload(&self) -> usize {
        self.slot().as_ref().map_or(0, |s| s.max_data_payload())
    }

    /// Run a Lua command, inline or staged depending on its size.
    ///
    /// Returns the reply for [`Completion::AwaitReply`], `None` otherwise.
    pub async fn run_command(
        &self,
        command: &str,
        completion: Completion,
        timeout: Option<Duration>,
    ) -> Result<Option<String>> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        command::run_command(
            &session,
            &self.config,
            command,
            completion,
            self.timeout(timeout),
        )
        .await
    }

    /// Evaluate a Lua expression and return its string form.
    pub async fn evaluate(&self, expression: &str) -> Result<String> {
        let reply = self
            .run_command(
                &format!("{PRINT_LONG}(tostring({expression}))"),
                Completion::AwaitReply,
                None,
            )
            .await?;
        Ok(reply.unwrap_or_default())
    }

    /// Send a binary payload, optionally waiting for a data reply.
    pub async fn send_bytes(&self, data: &[u8], expect_reply: bool) -> Result<Option<Bytes>> {
        let session = self.session()?;
        let max = session.max_data_payload();
        if data.len() > max {
            return Err(TransportError::PayloadTooLarge {
                len: data.len(),
                max,
            }
            .into());
        }

        let _guard = session.lock_commands().await;
        if expect_reply {
            let reply = session.query_data(data, self.config.default_timeout()).await?;
            Ok(Some(reply))
        } else {
            session.send_data(data).await?;
            Ok(None)
        }
    }

    /// Wait for the next text reply.
    pub async fn wait_for_print(&self, timeout: Option<Duration>) -> Result<String> {
        let pending = self.session()?.arm_text()?;
        pending.wait(self.timeout(timeout)).await
    }

    /// Wait for the next data reply.
    pub async fn wait_for_data(&self, timeout: Option<Duration>) -> Result<Bytes> {
        let pending = self.session()?.arm_data()?;
        pending.wait(self.timeout(timeout)).await
    }

    /// Register a notification handler on the current session.
    ///
    /// Handlers do not survive a reconnect.
    pub fn register_handler(&self, key: HandlerKey, handler: Handler) -> Result<()> {
        self.session()?.register_handler(key, handler)
    }

    /// Remove every handler under `key`. Returns how many were removed.
    pub fn unregister_handler(&self, key: HandlerKey) -> Result<usize> {
        Ok(self.session()?.unregister_handler(key))
    }

    /// Interrupt the running script.
    pub async fn send_break_signal(&self) -> Result<()> {
        self.session()?.send_signal(BREAK_SIGNAL).await
    }

    /// Restart the device's interpreter.
    pub async fn send_reset_signal(&self) -> Result<()> {
        self.session()?.send_signal(RESET_SIGNAL).await
    }

    /// Write `data` to a remote file.
    pub async fn write_file(&self, path: &str, data: &[u8], checked: bool) -> Result<()> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        files::write_file(&session, &self.config, path, data, checked).await
    }

    /// Read a remote file. Needs the helper library.
    pub async fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        files::read_file(&session, &self.config, path, self.config.default_timeout()).await
    }

    /// Whether a remote file exists.
    pub async fn file_exists(&self, path: &str) -> Result<bool> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        files::file_exists(&session, path, self.config.default_timeout()).await
    }

    /// Delete a remote file. Returns `false` if the device reported a failure.
    pub async fn delete_file(&self, path: &str) -> Result<bool> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        files::delete_file(&session, path, self.config.default_timeout()).await
    }

    /// Make sure the Lua function `name` is defined, uploading `source` under
    /// the `version` directory if needed.
    pub async fn ensure_library_present(
        &self,
        name: &str,
        source: &str,
        version: &str,
    ) -> Result<()> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        library::ensure_library_present(&session, &self.config, name, source, version).await
    }

    /// Inject the bundled helper library.
    pub async fn inject_library(&self) -> Result<()> {
        let session = self.session()?;
        let _guard = session.lock_commands().await;
        library::inject_library(&session, &self.config).await
    }

    /// Version of the bundled helper library.
    pub fn library_version(&self) -> String {
        library::version_hash(HELPERS_SOURCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MemoryConnector, MemoryDevice};

    fn client(device: &MemoryDevice) -> Client {
        Client::builder(MemoryConnector::new(device.clone()))
            .initialize_on_connect(false)
            .build()
    }

    #[tokio::test]
    async fn test_calls_before_connect() {
        let client = client(&MemoryDevice::new("Frame", 64));

        assert!(!client.is_connected());
        assert_eq!(client.max_text_payload(), 0);
        assert!(matches!(
            client.run_command("x", Completion::FireAndForget, None).await,
            Err(FramewireError::NotConnected)
        ));
        assert!(matches!(
            client.send_bytes(b"x", false).await,
            Err(FramewireError::NotConnected)
        ));
        assert!(matches!(
            client.register_handler(HandlerKey::Print, Handler::no_args(|| async {})),
            Err(FramewireError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_reports_payload_sizes() {
        let device = MemoryDevice::new("Frame 7A", 247);
        let client = client(&device);

        let id = client.connect(Some("7A")).await.unwrap();
        assert_eq!(id.0, "Frame 7A");
        assert!(client.is_connected());
        assert_eq!(client.max_text_payload(), 244);
        assert_eq!(client.max_binary_payload(), 243);

        client.disconnect().await;
        assert!(!client.is_connected());
        assert_eq!(client.device_id(), None);
    }

    #[tokio::test]
    async fn test_builder_setters() {
        let client = Client::builder(MemoryConnector::new(MemoryDevice::new("Frame", 64)))
            .default_timeout(Duration::from_secs(2))
            .chunk_delay(Duration::ZERO)
            .max_receive_buffer(1024)
            .checked_uploads(false)
            .rewrite_print(false)
            .build();

        let config = client.config();
        assert_eq!(config.default_timeout_ms, 2000);
        assert_eq!(config.chunk_delay_ms, 0);
        assert_eq!(config.max_receive_buffer, 1024);
        assert!(!config.checked_uploads);
        assert!(!config.rewrite_print);
        assert!(config.initialize_on_connect);
    }

    #[tokio::test]
    async fn test_builder_saturates_huge_durations() {
        let client = Client::builder(MemoryConnector::new(MemoryDevice::new("Frame", 64)))
            .default_timeout(Duration::MAX)
            .chunk_delay(Duration::from_millis(u64::MAX) + Duration::from_secs(1))
            .build();

        let config = client.config();
        assert_eq!(config.default_timeout_ms, u64::MAX);
        assert_eq!(config.chunk_delay_ms, u64::MAX);
    }

    #[tokio::test]
    async fn test_signals_are_single_bytes() {
        let device = MemoryDevice::new("Frame", 64);
        let client = client(&device);
        client.connect(None).await.unwrap();

        client.send_break_signal().await.unwrap();
        client.send_reset_signal().await.unwrap();

        assert_eq!(
            device.written(),
            vec![Bytes::from_static(&[0x03]), Bytes::from_static(&[0x04])]
        );
    }

    #[tokio::test]
    async fn test_send_bytes_too_large() {
        let device = MemoryDevice::new("Frame", 23);
        let client = client(&device);
        client.connect(None).await.unwrap();

        let result = client.send_bytes(&[0u8; 20], false).await;
        assert!(matches!(
            result,
            Err(FramewireError::Transport(TransportError::PayloadTooLarge { len: 20, max: 19 }))
        ));
    }
}
