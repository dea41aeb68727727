// ABOUTME: Fingerprint command implementation.
// ABOUTME: Connects without authenticating and prints the server's host key digests.

use sshtask::config::SessionConfig;
use sshtask::error::{Error, Result};
use sshtask::output::{Output, OutputFormat};
use sshtask::ssh::{Connection, FingerprintAlgorithm, RusshTransport, Transport};
use std::sync::Arc;

pub async fn fingerprint_command(target: &str, output: &Output) -> Result<()> {
    let config = SessionConfig::parse(target).map_err(Error::InvalidConfig)?;

    output.progress(&format!("  → Connecting to {}:{}...", config.host, config.port));
    let mut connection = RusshTransport
        .open(
            &config.host,
            config.port,
            &config.transport,
            Arc::new(|_| {}),
        )
        .await?;

    let md5 = connection.host_key_fingerprint(FingerprintAlgorithm::Md5);
    let sha1 = connection.host_key_fingerprint(FingerprintAlgorithm::Sha1);

    if let Err(e) = connection.disconnect().await {
        tracing::debug!(error = %e, "disconnect after fingerprint lookup failed");
    }

    let (Some(md5), Some(sha1)) = (md5, sha1) else {
        return Err(Error::Ssh(sshtask::ssh::Error::Connection(format!(
            "{} did not present a host key",
            config.host
        ))));
    };

    if output.format() == OutputFormat::Json {
        let json = serde_json::json!({ "host": config.host, "md5": md5, "sha1": sha1 });
        println!("{json}");
    } else {
        println!("{} {md5}", FingerprintAlgorithm::Md5);
        println!("{} {sha1}", FingerprintAlgorithm::Sha1);
    }
    Ok(())
}
