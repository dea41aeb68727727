// ABOUTME: Recovers the remote exit status printed after the command's own output.
// ABOUTME: The only place that knows the marker layout: a newline, then the decimal status.

use super::drain::Collector;
use super::{LineSink, LogEvent, LogRecord, StreamTag};
use crate::ssh::{Error, Result};

/// Strip the status marker from collected output and return the status.
///
/// `Ok(None)` only happens when the marker never arrived in log or callback
/// mode; text modes treat a missing marker as malformed.
pub(crate) fn recover(collector: &mut Collector<'_>) -> Result<Option<i32>> {
    match collector {
        Collector::Log(events) => from_log(events),
        Collector::Text { stdout, .. } => from_text(stdout).map(Some),
        Collector::Callback {
            sink, held, tail, ..
        } => from_held(held, tail, &mut **sink),
    }
}

fn parse_status(raw: &str) -> Result<i32> {
    let trimmed = raw.trim();
    trimmed
        .parse()
        .map_err(|_| Error::MalformedExitMarker(format!("unparseable exit status {:?}", trimmed)))
}

/// Split at the last newline: the tail is the status, the head the output.
fn from_text(stdout: &mut String) -> Result<i32> {
    let pos = stdout.rfind('\n').ok_or_else(|| {
        Error::MalformedExitMarker("no newline before exit status".to_string())
    })?;
    let code = parse_status(&stdout[pos + 1..])?;
    stdout.truncate(pos);
    Ok(code)
}

/// Turn the most recent stdout event into an exit event at the end of the log.
fn from_log(events: &mut Vec<LogEvent>) -> Result<Option<i32>> {
    let found = events
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, event)| match &event.record {
            LogRecord::Out(line) => Some((i, parse_status(line))),
            _ => None,
        });

    let Some((index, code)) = found else {
        tracing::warn!("no stdout line found; exit status not recorded");
        return Ok(None);
    };
    let code = code?;

    if index + 1 == events.len() {
        events[index].record = LogRecord::Exit(code);
    } else {
        let marker = events.remove(index);
        events.push(LogEvent {
            timestamp: marker.timestamp,
            record: LogRecord::Exit(code),
        });
    }

    strip_separator_from_log(events, index);
    Ok(Some(code))
}

/// Remove the newline the marker put in front of the status from the last
/// stdout event before `before`, dropping the event if nothing else is left.
fn strip_separator_from_log(events: &mut Vec<LogEvent>, before: usize) {
    let Some(index) = events[..before]
        .iter()
        .rposition(|event| event.tag() == StreamTag::Out)
    else {
        return;
    };

    if let LogRecord::Out(line) = &mut events[index].record {
        if line.ends_with('\n') {
            line.pop();
        }
        if line.is_empty() {
            events.remove(index);
        }
    }
}

/// Parse the held-back status and release the separator's content to the sink.
///
/// Without an unterminated fragment the last complete line is taken as the
/// status.
fn from_held(
    held: &mut Option<String>,
    tail: &mut Option<String>,
    sink: &mut (dyn LineSink + Send),
) -> Result<Option<i32>> {
    let (marker, separator) = match (tail.take(), held.take()) {
        (Some(marker), separator) => (marker, separator),
        (None, Some(marker)) => (marker, None),
        (None, None) => {
            tracing::warn!("no stdout line found; exit status not recorded");
            return Ok(None);
        }
    };
    let code = parse_status(&marker)?;

    if let Some(mut separator) = separator {
        if separator.ends_with('\n') {
            separator.pop();
        }
        if !separator.is_empty() {
            sink.line(StreamTag::Out, &separator);
        }
    }
    Ok(Some(code))
}
