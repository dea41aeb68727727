// ABOUTME: Remote command execution over an SSH session.
// ABOUTME: Wraps the command, drains stdout/stderr and shapes the captured output.

mod drain;
mod exit_code;
mod wrap;

pub use wrap::{EXIT_STATUS_SUFFIX, MERGE_STDERR_SUFFIX, wrap_command};

use crate::ssh::{Connection, Error, ExecChannel, Result, Session, Transport};
use chrono::{DateTime, Utc};
use drain::Collector;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Which stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamTag {
    Out,
    Err,
    Exit,
}

impl fmt::Display for StreamTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamTag::Out => write!(f, "out"),
            StreamTag::Err => write!(f, "err"),
            StreamTag::Exit => write!(f, "exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "stream", content = "payload", rename_all = "lowercase")]
pub enum LogRecord {
    Out(String),
    Err(String),
    Exit(i32),
}

/// One entry of a log-mode result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: LogRecord,
}

impl LogEvent {
    pub fn tag(&self) -> StreamTag {
        match self.record {
            LogRecord::Out(_) => StreamTag::Out,
            LogRecord::Err(_) => StreamTag::Err,
            LogRecord::Exit(_) => StreamTag::Exit,
        }
    }
}

/// Receives lines synchronously while a command's output is drained.
pub trait LineSink {
    fn line(&mut self, tag: StreamTag, line: &str);
}

impl<F> LineSink for F
where
    F: FnMut(StreamTag, &str),
{
    fn line(&mut self, tag: StreamTag, line: &str) {
        (self)(tag, line)
    }
}

/// How captured output is shaped.
pub enum OutputMode<'a> {
    /// Timestamped events in arrival order.
    Log,
    /// Stderr merged into stdout by the remote shell.
    Combined,
    /// Stdout and stderr kept apart.
    Split,
    /// Every line handed to the sink as it is read; nothing is accumulated.
    Callback(&'a mut (dyn LineSink + Send)),
}

impl OutputMode<'_> {
    fn merges_stderr(&self) -> bool {
        matches!(self, OutputMode::Combined)
    }
}

impl fmt::Debug for OutputMode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputMode::Log => f.write_str("Log"),
            OutputMode::Combined => f.write_str("Combined"),
            OutputMode::Split => f.write_str("Split"),
            OutputMode::Callback(_) => f.write_str("Callback(<sink>)"),
        }
    }
}

/// Output of one executed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum CommandResult {
    Log {
        events: Vec<LogEvent>,
    },
    Combined {
        output: String,
        exit_code: Option<i32>,
    },
    Split {
        stdout: String,
        stderr: String,
        exit_code: Option<i32>,
    },
    Callback {
        exit_code: Option<i32>,
    },
}

impl CommandResult {
    /// The recovered exit status, if one was requested and found.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            CommandResult::Log { events } => events.iter().rev().find_map(|e| match e.record {
                LogRecord::Exit(code) => Some(code),
                _ => None,
            }),
            CommandResult::Combined { exit_code, .. }
            | CommandResult::Split { exit_code, .. }
            | CommandResult::Callback { exit_code } => *exit_code,
        }
    }
}

/// A command to run on a session.
#[derive(Debug)]
pub struct Task<'a> {
    command: String,
    want_exit_code: bool,
    mode: OutputMode<'a>,
    timeout: Option<Duration>,
}

impl<'a> Task<'a> {
    /// Split output, no exit status, no timeout.
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            want_exit_code: false,
            mode: OutputMode::Split,
            timeout: None,
        }
    }

    pub fn exit_code(mut self, want: bool) -> Self {
        self.want_exit_code = want;
        self
    }

    pub fn mode(mut self, mode: OutputMode<'a>) -> Self {
        self.mode = mode;
        self
    }

    /// Give up with [`Error::CommandTimeout`] if the command has not
    /// finished in time.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Run the command, connecting the session first if needed.
    pub async fn execute<T: Transport>(self, session: &mut Session<T>) -> Result<CommandResult> {
        let Task {
            command,
            want_exit_code,
            mode,
            timeout,
        } = self;

        let run = run(session, &command, want_exit_code, mode);
        match timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::CommandTimeout(limit))?,
            None => run.await,
        }
    }
}

/// Run `command` on `session` and capture its output in `mode`.
pub async fn execute<T: Transport>(
    session: &mut Session<T>,
    command: &str,
    want_exit_code: bool,
    mode: OutputMode<'_>,
) -> Result<CommandResult> {
    run(session, command, want_exit_code, mode).await
}

async fn run<T: Transport>(
    session: &mut Session<T>,
    command: &str,
    want_exit_code: bool,
    mode: OutputMode<'_>,
) -> Result<CommandResult> {
    if !session.is_connected() {
        session.connect().await?;
    }

    let wrapped = wrap_command(command, mode.merges_stderr(), want_exit_code);
    tracing::debug!("executing on {}: {}", session.host(), wrapped);

    let mut channel = session
        .connection()?
        .open_exec(&wrapped)
        .await
        .map_err(into_execution_error)?;
    let mut stderr = channel.error_stream().map_err(into_execution_error)?;

    let mut collector = Collector::new(mode, want_exit_code);
    drain::drain(&mut channel, &mut stderr, &mut collector).await;

    let exit_code = if want_exit_code {
        exit_code::recover(&mut collector)?
    } else {
        None
    };

    Ok(match collector {
        Collector::Log(events) => CommandResult::Log { events },
        Collector::Text {
            merged: true,
            stdout,
            stderr,
        } => {
            if !stderr.is_empty() {
                tracing::warn!("discarding {} bytes of unmerged stderr", stderr.len());
            }
            CommandResult::Combined {
                output: stdout,
                exit_code,
            }
        }
        Collector::Text {
            merged: false,
            stdout,
            stderr,
        } => CommandResult::Split {
            stdout,
            stderr,
            exit_code,
        },
        Collector::Callback { .. } => CommandResult::Callback { exit_code },
    })
}

fn into_execution_error(err: Error) -> Error {
    match err {
        Error::Execution(_) => err,
        other => Error::Execution(other.to_string()),
    }
}
