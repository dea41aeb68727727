// ABOUTME: Command module aggregator for the sshtask CLI.
// ABOUTME: Re-exports exec and fingerprint command handlers.

mod exec;
mod fingerprint;

pub use exec::exec_command;
pub use fingerprint::fingerprint_command;
