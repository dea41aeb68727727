// ABOUTME: Command-line interface definition using clap derive macros.
// ABOUTME: Defines all subcommands and their arguments.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "sshtask")]
#[command(about = "Run shell commands over SSH and capture their output and exit status")]
#[command(version)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Minimal output: only the remote command's own output
    #[arg(short, long, global = true, conflicts_with = "json")]
    pub quiet: bool,

    /// Emit results as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a sshtask.yml configuration file
    Init {
        /// Host to put in the template session
        #[arg(long)]
        host: Option<String>,

        /// Overwrite an existing configuration file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a command on a remote host
    Exec(ExecArgs),

    /// Print the host key fingerprints of a server without logging in
    Fingerprint {
        /// Target as [user@]host[:port]
        target: String,
    },
}

#[derive(Args)]
pub struct ExecArgs {
    /// Configuration file (default: discover sshtask.yml in the current directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Named session from the configuration file
    #[arg(short, long, conflicts_with = "target")]
    pub session: Option<String>,

    /// Ad-hoc target as [user@]host[:port]
    #[arg(short, long)]
    pub target: Option<String>,

    /// Try the SSH agent (ad-hoc targets)
    #[arg(long, requires = "target")]
    pub agent: bool,

    /// Try this private key; its public key is expected at <KEY>.pub (ad-hoc targets)
    #[arg(long, requires = "target")]
    pub key: Option<PathBuf>,

    /// Read a password from this environment variable (ad-hoc targets)
    #[arg(long, requires = "target")]
    pub password_env: Option<String>,

    /// Expected host key fingerprint in hex (32 chars MD5, else SHA-1)
    #[arg(long)]
    pub fingerprint: Option<String>,

    /// How to capture output
    #[arg(short, long, value_enum, default_value = "split")]
    pub mode: ModeArg,

    /// Recover the remote exit status and use it as this process's exit status
    #[arg(short = 'x', long)]
    pub exit_code: bool,

    /// Give up after this long, e.g. 30s or 5m
    #[arg(long, value_parser = humantime_serde::re::humantime::parse_duration)]
    pub timeout: Option<Duration>,

    /// Command to run; joined with spaces
    #[arg(trailing_var_arg = true, required = true)]
    pub command: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    Log,
    Combined,
    Split,
    /// Stream lines while the command runs
    Callback,
}
