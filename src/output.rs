// ABOUTME: Output formatting for CLI feedback and command results.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use crate::task::{CommandResult, LogRecord, StreamTag};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

/// Output format for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-friendly output with progress messages
    Normal,
    /// Only the command's own output
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured format.
pub struct Output {
    format: OutputFormat,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            start_time: None,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.format == OutputFormat::Normal {
            eprintln!("{message}");
        }
    }

    /// Print a warning (JSON event in json mode).
    pub fn warning(&self, message: &str) {
        match self.format {
            OutputFormat::Normal | OutputFormat::Quiet => eprintln!("Warning: {message}"),
            OutputFormat::Json => self.emit_event("warning", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.format {
            OutputFormat::Normal | OutputFormat::Quiet => eprintln!("Error: {message}"),
            OutputFormat::Json => self.emit_event("error", message),
        }
    }

    /// Print one line as it is drained (callback mode).
    pub fn line(&self, tag: StreamTag, line: &str) {
        match self.format {
            OutputFormat::Json => {
                let event = JsonLine { stream: tag, line };
                if let Ok(json) = serde_json::to_string(&event) {
                    println!("{json}");
                }
            }
            _ => match tag {
                StreamTag::Err => {
                    eprint!("{line}");
                    let _ = std::io::stderr().flush();
                }
                _ => {
                    print!("{line}");
                    let _ = std::io::stdout().flush();
                }
            },
        }
    }

    /// Print a finished command's captured output.
    pub fn result(&self, result: &CommandResult) {
        if self.format == OutputFormat::Json {
            if let Ok(json) = serde_json::to_string(result) {
                println!("{json}");
            }
            return;
        }

        match result {
            CommandResult::Log { events } => {
                for event in events {
                    let payload = match &event.record {
                        LogRecord::Out(line) | LogRecord::Err(line) => {
                            line.trim_end_matches('\n').to_string()
                        }
                        LogRecord::Exit(code) => code.to_string(),
                    };
                    println!(
                        "{} {:<4} {}",
                        event.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                        event.tag(),
                        payload
                    );
                }
            }
            CommandResult::Combined { output, .. } => print!("{output}"),
            CommandResult::Split { stdout, stderr, .. } => {
                print!("{stdout}");
                eprint!("{stderr}");
            }
            CommandResult::Callback { .. } => {}
        }

        if self.format == OutputFormat::Normal {
            if let Some(code) = result.exit_code() {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    eprintln!("exit status {code} ({:.1}s)", elapsed);
                } else {
                    eprintln!("exit status {code}");
                }
            }
        }
    }

    /// JSON events go to stderr so stdout stays parseable command output.
    fn emit_event(&self, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: if self.start_time.is_some() {
                Some(self.elapsed_secs())
            } else {
                None
            },
        };
        if let Ok(json) = serde_json::to_string(&event) {
            eprintln!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct JsonLine<'a> {
    stream: StreamTag,
    line: &'a str,
}
