// ABOUTME: Exec command implementation.
// ABOUTME: Resolves a session, runs the command and reports its output and exit status.

use crate::cli::{ExecArgs, ModeArg};
use nonempty::NonEmpty;
use sshtask::config::{AuthConfig, Config, EnvValue, SessionConfig};
use sshtask::diagnostics::{Diagnostics, Warning};
use sshtask::error::{Error, Result};
use sshtask::output::Output;
use sshtask::task::{OutputMode, StreamTag, Task};
use std::env;

/// Run the command and return the exit status this process should use.
pub async fn exec_command(args: ExecArgs, mut output: Output) -> Result<i32> {
    let config = resolve_session_config(&args)?;
    let mut session = config.session()?;
    let mut diag = Diagnostics::new(session.host());

    output.progress(&format!(
        "  → Connecting to {}@{}:{}...",
        session.user(),
        session.host(),
        session.port()
    ));
    output.start_timer();
    session.connect().await?;

    if !session.host_key_verified() {
        diag.warn(Warning::unverified_host_key(
            "host key was not checked against a fingerprint",
        ));
    }

    let mut task = Task::new(args.command.join(" ")).exit_code(args.exit_code);
    if let Some(timeout) = args.timeout {
        task = task.timeout(timeout);
    }

    let printer = &output;
    let mut sink = |tag: StreamTag, line: &str| printer.line(tag, line);
    let mode = match args.mode {
        ModeArg::Log => OutputMode::Log,
        ModeArg::Combined => OutputMode::Combined,
        ModeArg::Split => OutputMode::Split,
        ModeArg::Callback => OutputMode::Callback(&mut sink),
    };

    let result = task.mode(mode).execute(&mut session).await;

    // Disconnect SSH session (non-fatal if it fails)
    if let Err(e) = session.disconnect().await {
        diag.warn(Warning::ssh_disconnect(format!("SSH disconnect failed: {}", e)));
    }

    let result = match result {
        Ok(result) => result,
        Err(e) => {
            diag.report(&output);
            return Err(e.into());
        }
    };
    output.result(&result);

    let code = match (args.exit_code, result.exit_code()) {
        (false, _) => 0,
        (true, Some(code)) => code,
        (true, None) => {
            diag.warn(Warning::missing_exit_status(
                "remote exit status was not reported",
            ));
            1
        }
    };
    diag.report(&output);
    Ok(code)
}

/// Session settings from an ad-hoc target or the configuration file.
fn resolve_session_config(args: &ExecArgs) -> Result<SessionConfig> {
    let mut config = match &args.target {
        Some(target) => {
            let mut config = SessionConfig::parse(target).map_err(Error::InvalidConfig)?;
            let mut auth = Vec::new();
            if args.agent {
                auth.push(AuthConfig::Agent);
            }
            if let Some(key) = &args.key {
                auth.push(AuthConfig::Pubkey {
                    pubkey: None,
                    privkey: key.clone(),
                    passphrase: None,
                });
            }
            if let Some(var) = &args.password_env {
                auth.push(AuthConfig::Password {
                    password: EnvValue::FromEnv {
                        var: var.clone(),
                        default: None,
                    },
                });
            }
            if let Some(auth) = NonEmpty::from_vec(auth) {
                config.auth = auth;
            }
            config
        }
        None => {
            let file = match &args.config {
                Some(path) => Config::load(path)?,
                None => Config::discover(&env::current_dir()?)?,
            };
            match &args.session {
                Some(name) => file.session(name)?.clone(),
                None => file.sole_session()?.clone(),
            }
        }
    };

    if let Some(fp) = &args.fingerprint {
        config.fingerprint = Some(fp.clone());
    }
    Ok(config)
}
