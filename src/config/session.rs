// ABOUTME: Per-session configuration: target host, credentials, fingerprint, transport options.
// ABOUTME: Parses compact targets like "host", "user@host", "host:port", "user@host:port".

use super::EnvValue;
use super::deserialize::deserialize_auth;
use crate::error::{Error, Result};
use crate::ssh::{AuthMethod, Session, Transport, TransportOptions, fingerprint};
use nonempty::NonEmpty;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_auth", deserialize_with = "deserialize_auth")]
    pub auth: NonEmpty<AuthConfig>,
    #[serde(default)]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub transport: TransportOptions,
}

/// One entry of a session's `auth` list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AuthConfig {
    None,
    Agent,
    Password {
        password: EnvValue,
    },
    #[serde(alias = "publickey")]
    Pubkey {
        /// Defaults to the private key path with `.pub` appended.
        #[serde(default)]
        pubkey: Option<PathBuf>,
        privkey: PathBuf,
        #[serde(default)]
        passphrase: Option<EnvValue>,
    },
}

fn default_port() -> u16 {
    22
}

pub(super) fn default_auth() -> NonEmpty<AuthConfig> {
    NonEmpty::new(AuthConfig::Agent)
}

impl AuthConfig {
    /// Resolve secrets and expand `~/` in key paths.
    pub fn resolve(&self) -> Result<AuthMethod> {
        match self {
            AuthConfig::None => Ok(AuthMethod::None),
            AuthConfig::Agent => Ok(AuthMethod::Agent),
            AuthConfig::Password { password } => Ok(AuthMethod::password(password.resolve()?)),
            AuthConfig::Pubkey {
                pubkey,
                privkey,
                passphrase,
            } => {
                let private_key_path = expand_home(privkey);
                let public_key_path = match pubkey {
                    Some(path) => expand_home(path),
                    None => {
                        let mut public = private_key_path.clone().into_os_string();
                        public.push(".pub");
                        PathBuf::from(public)
                    }
                };
                let passphrase = passphrase.as_ref().map(EnvValue::resolve).transpose()?;
                Ok(AuthMethod::PublicKey {
                    public_key_path,
                    private_key_path,
                    passphrase,
                })
            }
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var("HOME")) {
        (Ok(rest), Ok(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}

impl SessionConfig {
    pub fn parse(s: &str) -> std::result::Result<Self, String> {
        let s = s.trim();
        if s.is_empty() {
            return Err("session target cannot be empty".to_string());
        }

        // Parse format: [user@]host[:port], IPv6 hosts as [addr] or [addr]:port
        let (user_part, rest) = if let Some(at_pos) = s.find('@') {
            (Some(&s[..at_pos]), &s[at_pos + 1..])
        } else {
            (None, s)
        };

        let (host, port_str) = if let Some(bracketed) = rest.strip_prefix('[') {
            let (host, after) = bracketed
                .split_once(']')
                .ok_or_else(|| format!("unterminated '[' in target: {}", rest))?;
            match after {
                "" => (host, None),
                _ => match after.strip_prefix(':') {
                    Some(port) => (host, Some(port)),
                    None => return Err(format!("unexpected text after ']': {}", after)),
                },
            }
        } else {
            match rest.split_once(':') {
                Some((_, tail)) if tail.contains(':') => {
                    return Err(format!(
                        "IPv6 address must be bracketed, e.g. [{}]:22",
                        rest
                    ));
                }
                Some((host, port)) => (host, Some(port)),
                None => (rest, None),
            }
        };

        let port = match port_str {
            Some(port_str) => port_str
                .parse::<u16>()
                .map_err(|_| format!("invalid port: {}", port_str))?,
            None => 22,
        };

        if host.is_empty() {
            return Err("hostname cannot be empty".to_string());
        }

        Ok(SessionConfig {
            host: host.to_string(),
            port,
            user: user_part.filter(|u| !u.is_empty()).map(|u| u.to_string()),
            auth: default_auth(),
            fingerprint: None,
            transport: TransportOptions::default(),
        })
    }

    /// Configured user, else `$USER`, else `root`.
    pub fn user_or_default(&self) -> String {
        self.user
            .clone()
            .unwrap_or_else(|| std::env::var("USER").unwrap_or_else(|_| "root".to_string()))
    }

    pub fn auth_methods(&self) -> Result<Vec<AuthMethod>> {
        self.auth.iter().map(AuthConfig::resolve).collect()
    }

    /// Build an unconnected session over russh.
    pub fn session(&self) -> Result<Session> {
        self.session_with(crate::ssh::RusshTransport)
    }

    /// Build an unconnected session over the given transport.
    pub fn session_with<T: Transport>(&self, transport: T) -> Result<Session<T>> {
        if let Some(fp) = &self.fingerprint {
            if !fingerprint::is_hex(fp) {
                return Err(Error::InvalidConfig(format!(
                    "fingerprint for {} must be hex without separators",
                    self.host
                )));
            }
        }

        let mut session = Session::with_transport(
            transport,
            self.host.clone(),
            self.port,
            self.user_or_default(),
            self.auth_methods()?,
        )
        .transport_options(self.transport.clone());
        if let Some(fp) = &self.fingerprint {
            session = session.expected_fingerprint(fp.clone());
        }
        Ok(session)
    }
}
