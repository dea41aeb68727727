// ABOUTME: SSH-specific error types.
// ABOUTME: Covers connection, host identity, authentication, and execution failures.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("host key fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },

    #[error("invalid expected fingerprint {0:?}: must be hex without separators")]
    InvalidFingerprint(String),

    #[error("authentication failed: no configured method succeeded")]
    AuthenticationFailed,

    #[error("session is not connected")]
    NotConnected,

    #[error("command execution failed: {0}")]
    Execution(String),

    #[error("malformed exit status marker: {0}")]
    MalformedExitMarker(String),

    #[error("command timed out after {0:?}")]
    CommandTimeout(std::time::Duration),

    #[error("SSH agent not available: {0}")]
    AgentUnavailable(String),

    #[error("failed to load key from {path}: {reason}")]
    KeyLoadFailed { path: PathBuf, reason: String },

    #[error("SSH protocol error: {0}")]
    Protocol(#[from] russh::Error),

    #[error("SSH key error: {0}")]
    Key(#[from] russh::keys::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
