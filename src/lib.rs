// ABOUTME: Library root for sshtask - run shell commands over SSH and capture their output.
// ABOUTME: The main binary is in main.rs.

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod output;
pub mod ssh;
pub mod task;

pub use ssh::{AuthMethod, Session, TransportOptions};
pub use task::{
    CommandResult, LineSink, LogEvent, LogRecord, OutputMode, StreamTag, Task, execute,
};
