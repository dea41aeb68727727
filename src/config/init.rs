// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates sshtask.yml template files.

use std::path::Path;

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, host: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let yaml = generate_template_yaml(host.unwrap_or("server.example.com"));
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(host: &str) -> String {
    format!(
        r#"sessions:
  default:
    host: {}
    port: 22
    user: deploy
    # Tried in order; the first method that succeeds is used.
    auth:
      - type: agent
      - type: pubkey
        privkey: ~/.ssh/id_ed25519
      # - type: password
      #   password: {{ env: SSHTASK_PASSWORD }}
    # Host key fingerprint in hex: 32 characters for MD5, 40 for SHA-1.
    # Without it the host key is not verified.
    # fingerprint: 0123456789abcdef0123456789abcdef01234567
"#,
        host
    )
}
