// ABOUTME: SSH client module for remote command execution.
// ABOUTME: Sessions authenticate over a pluggable transport; russh is the default.

mod auth;
mod client;
mod error;
pub mod fingerprint;
mod session;
pub mod transport;

pub use auth::AuthMethod;
pub use client::{ChannelStream, RusshConnection, RusshExecChannel, RusshTransport};
pub use error::{Error, Result};
pub use fingerprint::FingerprintAlgorithm;
pub use session::{ConnectionState, Session};
pub use transport::{
    Connection, DisconnectCallback, DisconnectInfo, ExecChannel, OutputStream, Transport,
    TransportOptions,
};
