// ABOUTME: Narrow seam between sessions and the secure transport implementation.
// ABOUTME: Connections authenticate, report host key fingerprints, and open exec channels.

use super::error::Result;
use super::fingerprint::FingerprintAlgorithm;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Details the transport reports when the remote side goes away.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisconnectInfo {
    pub reason: String,
    pub message: String,
    pub language_tag: String,
}

/// Invoked by the transport, possibly from its own task, when the
/// connection drops.
pub type DisconnectCallback = Arc<dyn Fn(DisconnectInfo) + Send + Sync>;

/// Options forwarded verbatim to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TransportOptions {
    /// Preferred key exchange algorithms, most preferred first.
    pub kex: Vec<String>,
    /// Preferred host key algorithms.
    pub host_key_algorithms: Vec<String>,
    pub ciphers: Vec<String>,
    pub macs: Vec<String>,
    #[serde(with = "humantime_serde")]
    pub inactivity_timeout: Option<Duration>,
    #[serde(with = "humantime_serde")]
    pub keepalive_interval: Option<Duration>,
    /// How long a single line read waits for data before reporting none.
    #[serde(with = "humantime_serde")]
    pub read_poll_interval: Duration,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            kex: Vec::new(),
            host_key_algorithms: Vec::new(),
            ciphers: Vec::new(),
            macs: Vec::new(),
            inactivity_timeout: None,
            keepalive_interval: None,
            read_poll_interval: Duration::from_millis(10),
        }
    }
}

/// Opens connections to remote hosts.
#[async_trait]
pub trait Transport: Send + Sync {
    type Connection: Connection;

    /// Open a connection and register `on_disconnect` for asynchronous
    /// disconnect notifications.
    async fn open(
        &self,
        host: &str,
        port: u16,
        options: &TransportOptions,
        on_disconnect: DisconnectCallback,
    ) -> Result<Self::Connection>;
}

/// An open, possibly not yet authenticated, transport connection.
///
/// Authentication calls report `Ok(false)` for a rejected method; errors are
/// reserved for library-level failures. Callers treat both as "try the next
/// method".
#[async_trait]
pub trait Connection: Send + Sync {
    type Channel: ExecChannel;

    /// Host key fingerprint as lowercase hex, if the key is known.
    fn host_key_fingerprint(&self, algorithm: FingerprintAlgorithm) -> Option<String>;

    async fn authenticate_none(&mut self, user: &str) -> Result<bool>;

    async fn authenticate_agent(&mut self, user: &str) -> Result<bool>;

    async fn authenticate_password(&mut self, user: &str, password: &str) -> Result<bool>;

    async fn authenticate_publickey(
        &mut self,
        user: &str,
        public_key: &Path,
        private_key: &Path,
        passphrase: Option<&str>,
    ) -> Result<bool>;

    /// Start `command` on a new exec channel.
    async fn open_exec(&self, command: &str) -> Result<Self::Channel>;

    async fn disconnect(&mut self) -> Result<()>;
}

/// Line-oriented reader over one output stream of an exec channel.
#[async_trait]
pub trait OutputStream: Send {
    /// Read one line including its trailing newline, if any.
    ///
    /// `None` means no data was available on this attempt; it is not
    /// end-of-stream. Check [`OutputStream::at_eof`] for that.
    async fn read_line(&mut self) -> Option<String>;

    fn at_eof(&self) -> bool;

    async fn close(&mut self);
}

/// An exec channel. Reading the channel itself yields stdout.
pub trait ExecChannel: OutputStream {
    type ErrorStream: OutputStream;

    /// Take the paired stderr stream.
    fn error_stream(&mut self) -> Result<Self::ErrorStream>;
}
