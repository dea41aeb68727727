// ABOUTME: Configuration types and parsing for sshtask.yml.
// ABOUTME: Named sessions with credentials, fingerprints and transport options.

mod deserialize;
mod env_value;
mod init;
mod session;

pub use env_value::EnvValue;
pub use init::init_config;
pub use session::{AuthConfig, SessionConfig};

use crate::error::{Error, Result};
use deserialize::deserialize_sessions;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

pub const CONFIG_FILENAME: &str = "sshtask.yml";
pub const CONFIG_FILENAME_ALT: &str = "sshtask.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sshtask/config.yml";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(deserialize_with = "deserialize_sessions")]
    pub sessions: BTreeMap<String, SessionConfig>,
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    pub fn session(&self, name: &str) -> Result<&SessionConfig> {
        self.sessions
            .get(name)
            .ok_or_else(|| Error::UnknownSession(name.to_string()))
    }

    /// The only configured session, for invocations that name none.
    pub fn sole_session(&self) -> Result<&SessionConfig> {
        let mut sessions = self.sessions.values();
        match (sessions.next(), sessions.next()) {
            (Some(only), None) => Ok(only),
            _ => Err(Error::InvalidConfig(format!(
                "{} sessions configured; pick one with --session",
                self.sessions.len()
            ))),
        }
    }
}
