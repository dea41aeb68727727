// ABOUTME: Transport implementation on top of russh.
// ABOUTME: Captures the host key, reports disconnects, and splits exec output into two line streams.

use super::error::{Error, Result};
use super::fingerprint::FingerprintAlgorithm;
use super::transport::{
    Connection, DisconnectCallback, DisconnectInfo, ExecChannel, OutputStream, Transport,
    TransportOptions,
};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use parking_lot::Mutex;
use russh::client::{self, Config, DisconnectReason, Handle};
use russh::keys::agent::client::AgentClient;
use russh::keys::{PrivateKeyWithHashAlg, load_public_key, load_secret_key, ssh_key};
use russh::{ChannelMsg, Disconnect, Preferred};
use std::borrow::Cow;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Host key blob seen during key exchange, shared with the connection.
type HostKeySlot = Arc<Mutex<Option<Vec<u8>>>>;

/// russh client handler.
///
/// Host identity is verified by the session against an expected fingerprint
/// after the handshake, so every key is accepted here and only recorded.
pub(crate) struct SshHandler {
    host: String,
    port: u16,
    host_key: HostKeySlot,
    on_disconnect: DisconnectCallback,
}

impl client::Handler for SshHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> std::result::Result<bool, Self::Error> {
        match server_public_key.to_bytes() {
            Ok(blob) => {
                tracing::debug!(
                    "received {} host key from {}:{}",
                    server_public_key.algorithm().as_str(),
                    self.host,
                    self.port
                );
                *self.host_key.lock() = Some(blob);
            }
            Err(e) => {
                tracing::warn!("could not encode host key from {}: {}", self.host, e);
            }
        }
        Ok(true)
    }

    async fn disconnected(
        &mut self,
        reason: DisconnectReason<Self::Error>,
    ) -> std::result::Result<(), Self::Error> {
        match reason {
            DisconnectReason::ReceivedDisconnect(info) => {
                tracing::debug!("{}:{} disconnected: {}", self.host, self.port, info.message);
                (self.on_disconnect)(DisconnectInfo {
                    reason: format!("{:?}", info.reason_code),
                    message: info.message,
                    language_tag: info.lang_tag,
                });
                Ok(())
            }
            DisconnectReason::Error(e) => {
                tracing::debug!("{}:{} connection lost: {}", self.host, self.port, e);
                (self.on_disconnect)(DisconnectInfo {
                    reason: "error".to_string(),
                    message: e.to_string(),
                    language_tag: String::new(),
                });
                Err(e)
            }
        }
    }
}

/// Opens SSH connections with russh.
#[derive(Debug, Clone, Copy, Default)]
pub struct RusshTransport;

#[async_trait]
impl Transport for RusshTransport {
    type Connection = RusshConnection;

    async fn open(
        &self,
        host: &str,
        port: u16,
        options: &TransportOptions,
        on_disconnect: DisconnectCallback,
    ) -> Result<RusshConnection> {
        let host_key: HostKeySlot = Arc::new(Mutex::new(None));
        let handler = SshHandler {
            host: host.to_string(),
            port,
            host_key: Arc::clone(&host_key),
            on_disconnect,
        };

        let russh_config = Config {
            inactivity_timeout: options.inactivity_timeout,
            keepalive_interval: options.keepalive_interval,
            preferred: preferred_algorithms(options)?,
            ..Default::default()
        };

        let handle = client::connect(Arc::new(russh_config), (host, port), handler)
            .await
            .map_err(|e| {
                if e.to_string().contains("Connection refused") {
                    Error::Connection(format!("connection refused to {}:{}", host, port))
                } else {
                    Error::Connection(e.to_string())
                }
            })?;

        Ok(RusshConnection {
            handle,
            host_key,
            read_poll_interval: options.read_poll_interval,
        })
    }
}

/// Translate algorithm names into russh preferences. Empty lists keep the
/// russh defaults.
fn preferred_algorithms(options: &TransportOptions) -> Result<Preferred> {
    let defaults = Preferred::default();
    let mut preferred = defaults.clone();

    if !options.kex.is_empty() {
        let names = options
            .kex
            .iter()
            .map(|name| {
                russh::kex::Name::try_from(name.as_str())
                    .map_err(|_| Error::Connection(format!("unsupported kex algorithm: {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        preferred.kex = Cow::Owned(names);
    }

    if !options.ciphers.is_empty() {
        let names = options
            .ciphers
            .iter()
            .map(|name| {
                russh::cipher::Name::try_from(name.as_str())
                    .map_err(|_| Error::Connection(format!("unsupported cipher: {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        preferred.cipher = Cow::Owned(names);
    }

    if !options.macs.is_empty() {
        let names = options
            .macs
            .iter()
            .map(|name| {
                russh::mac::Name::try_from(name.as_str())
                    .map_err(|_| Error::Connection(format!("unsupported MAC: {}", name)))
            })
            .collect::<Result<Vec<_>>>()?;
        preferred.mac = Cow::Owned(names);
    }

    if !options.host_key_algorithms.is_empty() {
        let algorithms = options
            .host_key_algorithms
            .iter()
            .map(|name| {
                ssh_key::Algorithm::from_str(name).map_err(|_| {
                    Error::Connection(format!("unsupported host key algorithm: {}", name))
                })
            })
            .collect::<Result<Vec<_>>>()?;
        preferred.key = Cow::Owned(algorithms);
    }

    Ok(preferred)
}

/// An open russh connection.
pub struct RusshConnection {
    handle: Handle<SshHandler>,
    host_key: HostKeySlot,
    read_poll_interval: Duration,
}

impl std::fmt::Debug for RusshConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RusshConnection")
            .field("handle", &"<russh::Handle>")
            .field("read_poll_interval", &self.read_poll_interval)
            .finish()
    }
}

#[async_trait]
impl Connection for RusshConnection {
    type Channel = RusshExecChannel;

    fn host_key_fingerprint(&self, algorithm: FingerprintAlgorithm) -> Option<String> {
        self.host_key
            .lock()
            .as_deref()
            .map(|blob| algorithm.digest_hex(blob))
    }

    async fn authenticate_none(&mut self, user: &str) -> Result<bool> {
        let result = self.handle.authenticate_none(user).await?;
        Ok(result.success())
    }

    async fn authenticate_agent(&mut self, user: &str) -> Result<bool> {
        let mut agent = AgentClient::connect_env()
            .await
            .map_err(|e| Error::AgentUnavailable(e.to_string()))?;

        let keys = agent
            .request_identities()
            .await
            .map_err(|e| Error::AgentUnavailable(format!("failed to list agent keys: {}", e)))?;

        if keys.is_empty() {
            return Err(Error::AgentUnavailable("no keys in SSH agent".to_string()));
        }

        let hash_alg = self.handle.best_supported_rsa_hash().await?.flatten();
        for key in &keys {
            match self
                .handle
                .authenticate_publickey_with(user, key.clone(), hash_alg, &mut agent)
                .await
            {
                Ok(result) if result.success() => return Ok(true),
                Ok(_) => tracing::debug!("agent key {} rejected", key.algorithm().as_str()),
                Err(e) => tracing::debug!("agent key {} failed: {}", key.algorithm().as_str(), e),
            }
        }
        Ok(false)
    }

    async fn authenticate_password(&mut self, user: &str, password: &str) -> Result<bool> {
        let result = self.handle.authenticate_password(user, password).await?;
        Ok(result.success())
    }

    async fn authenticate_publickey(
        &mut self,
        user: &str,
        public_key: &Path,
        private_key: &Path,
        passphrase: Option<&str>,
    ) -> Result<bool> {
        let key = load_secret_key(private_key, passphrase).map_err(|e| Error::KeyLoadFailed {
            path: private_key.to_path_buf(),
            reason: e.to_string(),
        })?;

        // A missing .pub file is tolerated; a mismatching one is not.
        if public_key.exists() {
            let public = load_public_key(public_key).map_err(|e| Error::KeyLoadFailed {
                path: public_key.to_path_buf(),
                reason: e.to_string(),
            })?;
            if public.key_data() != key.public_key().key_data() {
                return Err(Error::KeyLoadFailed {
                    path: public_key.to_path_buf(),
                    reason: "public key does not match private key".to_string(),
                });
            }
        }

        let hash_alg = self.handle.best_supported_rsa_hash().await?.flatten();
        let result = self
            .handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg))
            .await?;
        Ok(result.success())
    }

    async fn open_exec(&self, command: &str) -> Result<RusshExecChannel> {
        let mut channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| Error::Execution(format!("failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| Error::Execution(format!("failed to exec command: {}", e)))?;

        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (err_tx, err_rx) = mpsc::unbounded_channel();

        tokio::spawn(pump(channel, out_tx, err_tx));

        Ok(RusshExecChannel {
            stdout: ChannelStream::new(out_rx, self.read_poll_interval),
            stderr: Some(ChannelStream::new(err_rx, self.read_poll_interval)),
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
            .map_err(Error::Protocol)
    }
}

/// Where the pump reads channel messages from.
#[async_trait]
trait MessageSource: Send {
    async fn next_message(&mut self) -> Option<ChannelMsg>;
    async fn close_channel(&mut self);
}

#[async_trait]
impl MessageSource for russh::Channel<client::Msg> {
    async fn next_message(&mut self) -> Option<ChannelMsg> {
        self.wait().await
    }

    async fn close_channel(&mut self) {
        if let Err(e) = self.close().await {
            tracing::debug!("failed to close exec channel: {}", e);
        }
    }
}

/// Resolves once neither stream of an exec channel is being read.
async fn readers_gone(
    out_tx: &mpsc::UnboundedSender<Bytes>,
    err_tx: &mpsc::UnboundedSender<Bytes>,
) {
    tokio::join!(out_tx.closed(), err_tx.closed());
}

/// Forward channel data to the stdout and stderr streams until the remote
/// side finishes. If the reader drops both streams first (a timed-out task),
/// the channel is closed so the remote command does not outlive it.
async fn pump<S: MessageSource>(
    mut source: S,
    out_tx: mpsc::UnboundedSender<Bytes>,
    err_tx: mpsc::UnboundedSender<Bytes>,
) {
    let abandoned = loop {
        let msg = tokio::select! {
            msg = source.next_message() => msg,
            _ = readers_gone(&out_tx, &err_tx) => break true,
        };
        match msg {
            Some(ChannelMsg::Data { data }) => {
                let _ = out_tx.send(Bytes::copy_from_slice(&data));
            }
            Some(ChannelMsg::ExtendedData { data, ext }) => {
                if ext == 1 {
                    let _ = err_tx.send(Bytes::copy_from_slice(&data));
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status }) => {
                tracing::debug!("remote command exited with {}", exit_status);
            }
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break false,
            Some(_) => {}
        }
    };

    if abandoned {
        tracing::debug!("exec output no longer read, closing channel");
        source.close_channel().await;
    } else {
        tracing::debug!("exec channel drained");
    }
}

/// Exec channel whose stdout and stderr are fed by a pump task.
#[derive(Debug)]
pub struct RusshExecChannel {
    stdout: ChannelStream,
    stderr: Option<ChannelStream>,
}

#[async_trait]
impl OutputStream for RusshExecChannel {
    async fn read_line(&mut self) -> Option<String> {
        self.stdout.read_line().await
    }

    fn at_eof(&self) -> bool {
        self.stdout.at_eof()
    }

    async fn close(&mut self) {
        self.stdout.close().await;
    }
}

impl ExecChannel for RusshExecChannel {
    type ErrorStream = ChannelStream;

    fn error_stream(&mut self) -> Result<ChannelStream> {
        self.stderr
            .take()
            .ok_or_else(|| Error::Execution("error stream already taken".to_string()))
    }
}

/// Line reader over chunks delivered by the pump task.
#[derive(Debug)]
pub struct ChannelStream {
    rx: mpsc::UnboundedReceiver<Bytes>,
    buf: BytesMut,
    closed: bool,
    poll_interval: Duration,
}

impl ChannelStream {
    fn new(rx: mpsc::UnboundedReceiver<Bytes>, poll_interval: Duration) -> Self {
        Self {
            rx,
            buf: BytesMut::new(),
            closed: false,
            poll_interval,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let pos = self.buf.iter().position(|b| *b == b'\n')?;
        let line = self.buf.split_to(pos + 1);
        Some(String::from_utf8_lossy(&line).into_owned())
    }
}

#[async_trait]
impl OutputStream for ChannelStream {
    async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.take_line() {
                return Some(line);
            }
            if self.closed {
                if self.buf.is_empty() {
                    return None;
                }
                let rest = self.buf.split();
                return Some(String::from_utf8_lossy(&rest).into_owned());
            }
            match tokio::time::timeout(self.poll_interval, self.rx.recv()).await {
                Ok(Some(chunk)) => self.buf.extend_from_slice(&chunk),
                Ok(None) => self.closed = true,
                Err(_) => return None,
            }
        }
    }

    fn at_eof(&self) -> bool {
        self.closed && self.buf.is_empty()
    }

    async fn close(&mut self) {
        self.rx.close();
        self.closed = true;
        self.buf.clear();
    }
}
