// ABOUTME: SSH session lifecycle: connect, verify host identity, authenticate.
// ABOUTME: Tracks connection state in an atomic cell updated by disconnect callbacks.

use super::auth::AuthMethod;
use super::client::RusshTransport;
use super::error::{Error, Result};
use super::fingerprint::{self, FingerprintAlgorithm};
use super::transport::{Connection, DisconnectCallback, Transport, TransportOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unconnected,
    Connected,
}

/// Connection state shared with the transport's disconnect callback.
#[derive(Debug, Default)]
struct StateCell(AtomicBool);

impl StateCell {
    fn get(&self) -> ConnectionState {
        if self.0.load(Ordering::SeqCst) {
            ConnectionState::Connected
        } else {
            ConnectionState::Unconnected
        }
    }

    fn set(&self, state: ConnectionState) {
        self.0
            .store(state == ConnectionState::Connected, Ordering::SeqCst);
    }
}

/// An authenticated connection to one host as one user.
///
/// A session runs one command at a time: executing takes `&mut Session`.
pub struct Session<T: Transport = RusshTransport> {
    host: String,
    port: u16,
    user: String,
    auth_methods: Vec<AuthMethod>,
    expected_fingerprint: Option<String>,
    transport_options: TransportOptions,
    transport: T,
    state: Arc<StateCell>,
    connection: Option<T::Connection>,
    host_key_verified: bool,
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("auth_methods", &self.auth_methods)
            .field("expected_fingerprint", &self.expected_fingerprint)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Session<RusshTransport> {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        auth_methods: Vec<AuthMethod>,
    ) -> Self {
        Self::with_transport(RusshTransport, host, port, user, auth_methods)
    }
}

impl<T: Transport> Session<T> {
    pub fn with_transport(
        transport: T,
        host: impl Into<String>,
        port: u16,
        user: impl Into<String>,
        auth_methods: Vec<AuthMethod>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            user: user.into(),
            auth_methods,
            expected_fingerprint: None,
            transport_options: TransportOptions::default(),
            transport,
            state: Arc::new(StateCell::default()),
            connection: None,
            host_key_verified: false,
        }
    }

    /// Require the host key to match this hex fingerprint. 32 characters
    /// are compared as MD5, anything else as SHA-1. A value that is not bare
    /// hex makes `connect` fail before the server is contacted.
    pub fn expected_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.expected_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn transport_options(mut self, options: TransportOptions) -> Self {
        self.transport_options = options;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Whether the last successful connect checked the host key against an
    /// expected fingerprint.
    pub fn host_key_verified(&self) -> bool {
        self.host_key_verified
    }

    /// Open a new connection, verify the host key and authenticate.
    ///
    /// Calling this on a connected session replaces the old connection; a
    /// late disconnect notification from the old one is ignored.
    pub async fn connect(&mut self) -> Result<()> {
        if let Some(fp) = &self.expected_fingerprint {
            if !fingerprint::is_hex(fp) {
                return Err(Error::InvalidFingerprint(fp.clone()));
            }
        }

        let state = Arc::new(StateCell::default());
        self.state = Arc::clone(&state);
        self.connection = None;
        self.host_key_verified = false;

        let on_disconnect: DisconnectCallback = {
            let state = Arc::clone(&state);
            Arc::new(move |_info| state.set(ConnectionState::Unconnected))
        };

        tracing::debug!("connecting to {}:{}", self.host, self.port);
        let mut connection = self
            .transport
            .open(&self.host, self.port, &self.transport_options, on_disconnect)
            .await
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::Connection(other.to_string()),
            })?;

        self.host_key_verified = self.verify_host_key(&connection)?;

        if !self.authenticate(&mut connection).await {
            return Err(Error::AuthenticationFailed);
        }

        self.connection = Some(connection);
        state.set(ConnectionState::Connected);
        Ok(())
    }

    /// Compare the host key against the expected fingerprint, if any.
    /// Returns whether a comparison actually took place.
    fn verify_host_key(&self, connection: &T::Connection) -> Result<bool> {
        let algorithm = FingerprintAlgorithm::for_expected(self.expected_fingerprint.as_deref());
        let actual = connection.host_key_fingerprint(algorithm);

        let Some(expected) = &self.expected_fingerprint else {
            return Ok(false);
        };

        match actual {
            Some(actual) if fingerprint::matches(expected, &actual) => {
                tracing::debug!("{} host key fingerprint verified for {}", algorithm, self.host);
                Ok(true)
            }
            Some(actual) => Err(Error::FingerprintMismatch {
                expected: expected.clone(),
                actual,
            }),
            None => {
                // TODO: make an unobtainable fingerprint fatal behind a strict option.
                tracing::warn!(
                    "{} host key fingerprint unavailable for {}; skipping verification",
                    algorithm,
                    self.host
                );
                Ok(false)
            }
        }
    }

    /// Try each configured method in order until one succeeds.
    async fn authenticate(&self, connection: &mut T::Connection) -> bool {
        let user = self.user.as_str();
        for method in &self.auth_methods {
            tracing::debug!("trying {} authentication for {}", method.name(), user);
            let attempt = match method {
                AuthMethod::None => connection.authenticate_none(user).await,
                AuthMethod::Agent => connection.authenticate_agent(user).await,
                AuthMethod::Password { password } => {
                    connection.authenticate_password(user, password).await
                }
                AuthMethod::PublicKey {
                    public_key_path,
                    private_key_path,
                    passphrase,
                } => {
                    connection
                        .authenticate_publickey(
                            user,
                            public_key_path,
                            private_key_path,
                            passphrase.as_deref(),
                        )
                        .await
                }
            };

            match attempt {
                Ok(true) => {
                    tracing::info!(
                        "authenticated {}@{} with {}",
                        user,
                        self.host,
                        method.name()
                    );
                    return true;
                }
                Ok(false) => tracing::debug!("{} authentication rejected", method.name()),
                Err(e) => tracing::debug!("{} authentication failed: {}", method.name(), e),
            }
        }
        false
    }

    /// The authenticated connection.
    pub fn connection(&self) -> Result<&T::Connection> {
        if !self.is_connected() {
            return Err(Error::NotConnected);
        }
        self.connection.as_ref().ok_or(Error::NotConnected)
    }

    /// Close the connection. A no-op on an unconnected session; a handle left
    /// behind by a remote disconnect is dropped without touching it.
    pub async fn disconnect(&mut self) -> Result<()> {
        let was_connected = self.is_connected();
        self.state.set(ConnectionState::Unconnected);
        match self.connection.take() {
            Some(mut connection) if was_connected => connection.disconnect().await,
            _ => Ok(()),
        }
    }
}
