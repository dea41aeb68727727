// ABOUTME: Non-fatal problems noticed while running a command on a host.
// ABOUTME: Warnings are logged when raised and reported once the command has finished.

use crate::output::Output;
use std::fmt;

/// Warnings gathered for one host during one invocation.
#[derive(Debug)]
pub struct Diagnostics {
    host: String,
    warnings: Vec<Warning>,
}

impl Diagnostics {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            warnings: Vec::new(),
        }
    }

    /// Record a warning and log it right away.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!(host = %self.host, kind = ?warning.kind, "{}", warning.message);
        self.warnings.push(warning);
    }

    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Hand every warning to the user-facing output, prefixed with the host.
    pub fn report(&self, output: &Output) {
        for warning in &self.warnings {
            output.warning(&format!("{}: {}", self.host, warning));
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// The host key was accepted without a fingerprint to compare against.
    pub fn unverified_host_key(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::UnverifiedHostKey,
            message: message.into(),
        }
    }

    pub fn ssh_disconnect(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::SshDisconnect,
            message: message.into(),
        }
    }

    /// The command finished but its exit status could not be recovered.
    pub fn missing_exit_status(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::MissingExitStatus,
            message: message.into(),
        }
    }
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    UnverifiedHostKey,
    /// Closing the SSH session failed after the command ran.
    SshDisconnect,
    MissingExitStatus,
}
