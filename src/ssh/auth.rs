// ABOUTME: Authentication methods tried in order when a session connects.
// ABOUTME: A closed set of variants so dispatch is checked exhaustively.

use std::fmt;
use std::path::PathBuf;

/// One authentication attempt. Order in a session's list is significant:
/// methods are tried front to back and the first success wins.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// The `none` method; succeeds only on servers that require no credentials.
    None,
    /// Every identity offered by the SSH agent at `$SSH_AUTH_SOCK`.
    Agent,
    Password {
        password: String,
    },
    /// Key pair on disk. The public key is checked against the private key
    /// before anything is sent to the server.
    PublicKey {
        public_key_path: PathBuf,
        private_key_path: PathBuf,
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn password(password: impl Into<String>) -> Self {
        Self::Password {
            password: password.into(),
        }
    }

    /// Key pair whose public half sits next to the private key as `<key>.pub`.
    pub fn key_pair(private_key_path: impl Into<PathBuf>) -> Self {
        let private_key_path = private_key_path.into();
        let mut public = private_key_path.clone().into_os_string();
        public.push(".pub");
        Self::PublicKey {
            public_key_path: PathBuf::from(public),
            private_key_path,
            passphrase: None,
        }
    }

    /// Short method name as used in the SSH protocol, for logging.
    pub fn name(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::Agent => "agent",
            AuthMethod::Password { .. } => "password",
            AuthMethod::PublicKey { .. } => "publickey",
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::None => f.write_str("None"),
            AuthMethod::Agent => f.write_str("Agent"),
            AuthMethod::Password { .. } => f
                .debug_struct("Password")
                .field("password", &"<redacted>")
                .finish(),
            AuthMethod::PublicKey {
                public_key_path,
                private_key_path,
                passphrase,
            } => f
                .debug_struct("PublicKey")
                .field("public_key_path", public_key_path)
                .field("private_key_path", private_key_path)
                .field("passphrase", &passphrase.as_ref().map(|_| "<redacted>"))
                .finish(),
        }
    }
}
