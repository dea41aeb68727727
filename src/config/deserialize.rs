// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Handles session maps with compact targets and non-empty auth lists.

use nonempty::NonEmpty;
use serde::Deserialize;
use std::collections::BTreeMap;

use super::session::{AuthConfig, SessionConfig};

pub fn deserialize_auth<'de, D>(deserializer: D) -> Result<NonEmpty<AuthConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let methods: Vec<AuthConfig> = Vec::deserialize(deserializer)?;
    NonEmpty::from_vec(methods)
        .ok_or_else(|| serde::de::Error::custom("at least one auth method is required"))
}

pub fn deserialize_sessions<'de, D>(
    deserializer: D,
) -> Result<BTreeMap<String, SessionConfig>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let entries: BTreeMap<String, SessionEntry> = BTreeMap::deserialize(deserializer)?;
    if entries.is_empty() {
        return Err(serde::de::Error::custom("at least one session is required"));
    }

    entries
        .into_iter()
        .map(|(name, entry)| {
            entry
                .into_session_config()
                .map(|config| (name.clone(), config))
                .map_err(|e| serde::de::Error::custom(format!("session {}: {}", name, e)))
        })
        .collect()
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SessionEntry {
    Simple(String),
    Detailed(SessionConfig),
}

impl SessionEntry {
    fn into_session_config(self) -> Result<SessionConfig, String> {
        match self {
            SessionEntry::Simple(s) => SessionConfig::parse(&s),
            SessionEntry::Detailed(c) => Ok(c),
        }
    }
}
