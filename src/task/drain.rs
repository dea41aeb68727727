// ABOUTME: Fair drain loop over an exec channel's stdout and stderr.
// ABOUTME: Routes each line into the collector selected by the output mode.

use super::{LineSink, LogEvent, LogRecord, OutputMode, StreamTag};
use crate::ssh::OutputStream;
use chrono::Utc;

/// Accumulates drained lines in the shape the output mode asks for.
pub(crate) enum Collector<'a> {
    Log(Vec<LogEvent>),
    Text {
        merged: bool,
        stdout: String,
        stderr: String,
    },
    Callback {
        sink: &'a mut (dyn LineSink + Send),
        /// Latest complete stdout line; it may turn out to be the marker's separator.
        held: Option<String>,
        /// Unterminated stdout fragment read at end-of-stream: the status itself.
        tail: Option<String>,
        hold_back: bool,
    },
}

impl<'a> Collector<'a> {
    pub(crate) fn new(mode: OutputMode<'a>, want_exit_code: bool) -> Self {
        match mode {
            OutputMode::Log => Collector::Log(Vec::new()),
            OutputMode::Combined => Collector::Text {
                merged: true,
                stdout: String::new(),
                stderr: String::new(),
            },
            OutputMode::Split => Collector::Text {
                merged: false,
                stdout: String::new(),
                stderr: String::new(),
            },
            OutputMode::Callback(sink) => Collector::Callback {
                sink,
                held: None,
                tail: None,
                hold_back: want_exit_code,
            },
        }
    }

    fn push(&mut self, tag: StreamTag, line: String) {
        match self {
            Collector::Log(events) => {
                let record = match tag {
                    StreamTag::Err => LogRecord::Err(line),
                    _ => LogRecord::Out(line),
                };
                events.push(LogEvent {
                    timestamp: Utc::now(),
                    record,
                });
            }
            Collector::Text { stdout, stderr, .. } => match tag {
                StreamTag::Err => stderr.push_str(&line),
                _ => stdout.push_str(&line),
            },
            Collector::Callback {
                sink,
                held,
                tail,
                hold_back,
            } => {
                if tag != StreamTag::Out || !*hold_back {
                    sink.line(tag, &line);
                } else if line.ends_with('\n') {
                    if let Some(released) = held.replace(line) {
                        sink.line(StreamTag::Out, &released);
                    }
                } else if let Some(released) = tail.replace(line) {
                    sink.line(StreamTag::Out, &released);
                }
            }
        }
    }
}

/// Read both streams until each has reached end-of-stream.
///
/// Every pass makes one read attempt on each stream that is still open, so
/// a quiet stream never starves the other. A read that yields nothing does
/// not end the loop.
pub(crate) async fn drain<O, E>(stdout: &mut O, stderr: &mut E, collector: &mut Collector<'_>)
where
    O: OutputStream + ?Sized,
    E: OutputStream + ?Sized,
{
    while !(stdout.at_eof() && stderr.at_eof()) {
        if !stdout.at_eof() {
            if let Some(line) = stdout.read_line().await {
                collector.push(StreamTag::Out, line);
            }
        }
        if !stderr.at_eof() {
            if let Some(line) = stderr.read_line().await {
                collector.push(StreamTag::Err, line);
            }
        }
    }
    stdout.close().await;
    stderr.close().await;
}
