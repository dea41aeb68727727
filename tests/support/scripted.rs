// ABOUTME: In-memory transport that plays back scripted replies instead of talking SSH.
// ABOUTME: Emulates the remote shell's handling of the subshell, 2>&1 and exit status suffix.

use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use sshtask::ssh::{
    Connection, DisconnectCallback, DisconnectInfo, Error, ExecChannel, FingerprintAlgorithm,
    OutputStream, Result, Transport, TransportOptions,
};
use sshtask::task::{EXIT_STATUS_SUFFIX, MERGE_STDERR_SUFFIX};
use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

pub const HOST_KEY: &[u8] = b"ssh-ed25519 scripted host key blob";

/// How the scripted server answers one authentication method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Accept,
    Reject,
    Fail,
}

/// One thing the remote program does, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Out(String),
    Err(String),
    /// Both streams have nothing to offer for one read.
    Pause,
}

/// What the remote shell does for one command.
#[derive(Debug, Clone, Default)]
pub struct Reply {
    pub events: Vec<Event>,
    pub status: i32,
    /// Never reach end-of-stream.
    pub hang: bool,
    /// The shell dies with the command, so no status is printed.
    pub shell_killed: bool,
}

impl Reply {
    pub fn status(status: i32) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    pub fn out(mut self, data: &str) -> Self {
        self.events.push(Event::Out(data.to_string()));
        self
    }

    pub fn err(mut self, data: &str) -> Self {
        self.events.push(Event::Err(data.to_string()));
        self
    }

    pub fn pause(mut self, reads: usize) -> Self {
        self.events.extend(std::iter::repeat_n(Event::Pause, reads));
        self
    }

    pub fn hang(mut self) -> Self {
        self.hang = true;
        self
    }

    pub fn shell_killed(mut self) -> Self {
        self.shell_killed = true;
        self
    }
}

/// Server behavior plus everything the client did to it.
pub struct Script {
    pub host_key: Option<Vec<u8>>,
    pub open_error: Option<String>,
    pub auth: HashMap<&'static str, AuthOutcome>,
    pub replies: HashMap<String, Reply>,
    pub exec_error: Option<String>,
    pub error_stream_error: Option<String>,

    pub opened: usize,
    pub auth_attempts: Vec<String>,
    pub fingerprint_requests: Vec<FingerprintAlgorithm>,
    pub executed: Vec<String>,
    pub disconnects: usize,
    pub streams_closed: usize,
    /// Exec channels whose streams are still held by the client.
    pub live_channels: usize,
    pub callbacks: Vec<DisconnectCallback>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            host_key: Some(HOST_KEY.to_vec()),
            open_error: None,
            auth: HashMap::from([("none", AuthOutcome::Accept)]),
            replies: HashMap::new(),
            exec_error: None,
            error_stream_error: None,
            opened: 0,
            auth_attempts: Vec::new(),
            fingerprint_requests: Vec::new(),
            executed: Vec::new(),
            disconnects: 0,
            streams_closed: 0,
            live_channels: 0,
            callbacks: Vec::new(),
        }
    }
}

/// Cloneable handle; clones share one script so tests can inspect it after
/// handing the transport to a session.
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    inner: Arc<Mutex<Script>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> MutexGuard<'_, Script> {
        self.inner.lock()
    }

    pub fn reply(&self, command: &str, reply: Reply) -> &Self {
        self.script().replies.insert(command.to_string(), reply);
        self
    }

    pub fn auth(&self, method: &'static str, outcome: AuthOutcome) -> &Self {
        self.script().auth.insert(method, outcome);
        self
    }

    /// Simulate the server dropping the `index`th connection opened.
    pub fn fire_disconnect(&self, index: usize) {
        let callback = Arc::clone(&self.script().callbacks[index]);
        callback(DisconnectInfo {
            reason: "ByApplication".to_string(),
            message: "scripted disconnect".to_string(),
            language_tag: String::new(),
        });
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    type Connection = ScriptedConnection;

    async fn open(
        &self,
        _host: &str,
        _port: u16,
        _options: &TransportOptions,
        on_disconnect: DisconnectCallback,
    ) -> Result<ScriptedConnection> {
        let mut script = self.inner.lock();
        script.opened += 1;
        if let Some(message) = &script.open_error {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                message.clone(),
            )));
        }
        script.callbacks.push(on_disconnect);
        Ok(ScriptedConnection {
            script: Arc::clone(&self.inner),
        })
    }
}

pub struct ScriptedConnection {
    script: Arc<Mutex<Script>>,
}

impl ScriptedConnection {
    fn attempt(&self, method: &str) -> Result<bool> {
        let mut script = self.script.lock();
        script.auth_attempts.push(method.to_string());
        match script.auth.get(method).copied().unwrap_or(AuthOutcome::Reject) {
            AuthOutcome::Accept => Ok(true),
            AuthOutcome::Reject => Ok(false),
            AuthOutcome::Fail => Err(Error::AgentUnavailable(format!("scripted {method} failure"))),
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    type Channel = ScriptedChannel;

    fn host_key_fingerprint(&self, algorithm: FingerprintAlgorithm) -> Option<String> {
        let mut script = self.script.lock();
        script.fingerprint_requests.push(algorithm);
        script.host_key.as_deref().map(|blob| algorithm.digest_hex(blob))
    }

    async fn authenticate_none(&mut self, _user: &str) -> Result<bool> {
        self.attempt("none")
    }

    async fn authenticate_agent(&mut self, _user: &str) -> Result<bool> {
        self.attempt("agent")
    }

    async fn authenticate_password(&mut self, _user: &str, _password: &str) -> Result<bool> {
        self.attempt("password")
    }

    async fn authenticate_publickey(
        &mut self,
        _user: &str,
        _public_key: &Path,
        _private_key: &Path,
        _passphrase: Option<&str>,
    ) -> Result<bool> {
        self.attempt("publickey")
    }

    async fn open_exec(&self, command: &str) -> Result<ScriptedChannel> {
        let mut script = self.script.lock();
        script.executed.push(command.to_string());
        if let Some(message) = &script.exec_error {
            return Err(Error::Io(io::Error::other(message.clone())));
        }

        let (stdout, stderr) = run_shell(&script.replies, command);
        script.live_channels += 1;
        let lease = Arc::new(ChannelLease {
            script: Arc::clone(&self.script),
        });
        Ok(ScriptedChannel {
            stdout: ScriptedStream::new(stdout, Arc::clone(&self.script), Arc::clone(&lease)),
            stderr: Some(ScriptedStream::new(stderr, Arc::clone(&self.script), lease)),
            error_stream_error: script.error_stream_error.clone(),
        })
    }

    async fn disconnect(&mut self) -> Result<()> {
        self.script.lock().disconnects += 1;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    Data(String),
    Idle,
}

struct StreamScript {
    steps: Vec<Step>,
    hang: bool,
}

/// Keeps an exec channel counted as live until both of its streams are dropped.
struct ChannelLease {
    script: Arc<Mutex<Script>>,
}

impl Drop for ChannelLease {
    fn drop(&mut self) {
        self.script.lock().live_channels -= 1;
    }
}

/// What `sh` prints when the subshell's `)` never reaches the parser.
fn syntax_error() -> (StreamScript, StreamScript) {
    let stderr = "sh: 1: Syntax error: end of file unexpected (expecting \")\")\n";
    (
        StreamScript {
            steps: Vec::new(),
            hang: false,
        },
        StreamScript {
            steps: vec![Step::Data(stderr.to_string())],
            hang: false,
        },
    )
}

/// A `)` on the command's last line is lost to a comment or heredoc there.
fn closing_paren_swallowed(inner: &str) -> bool {
    let last = inner.lines().last().unwrap_or_default();
    last.contains('#') || inner.contains("<<")
}

/// Interpret the wrapped command the way `sh -c` would for our suffixes.
fn run_shell(replies: &HashMap<String, Reply>, command: &str) -> (StreamScript, StreamScript) {
    let (rest, print_status) = match command.strip_suffix(EXIT_STATUS_SUFFIX) {
        Some(rest) => (rest, true),
        None => (command, false),
    };
    let (rest, merge) = match rest.strip_suffix(MERGE_STDERR_SUFFIX) {
        Some(rest) => (rest, true),
        None => (rest, false),
    };
    let inner = match rest.strip_prefix('(') {
        Some(body) if print_status || merge => {
            if let Some(inner) = body.strip_suffix("\n)") {
                inner
            } else if let Some(inner) = body.strip_suffix(')') {
                if closing_paren_swallowed(inner) {
                    return syntax_error();
                }
                inner
            } else {
                rest
            }
        }
        _ => rest,
    };

    let reply = replies.get(inner).cloned().unwrap_or_else(|| {
        Reply::status(127).err(&format!("sh: 1: {inner}: not found\n"))
    });

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    for event in reply.events {
        match event {
            Event::Out(data) => stdout.push(Step::Data(data)),
            Event::Err(data) if merge => stdout.push(Step::Data(data)),
            Event::Err(data) => stderr.push(Step::Data(data)),
            Event::Pause => {
                stdout.push(Step::Idle);
                stderr.push(Step::Idle);
            }
        }
    }
    if print_status && !reply.shell_killed {
        stdout.push(Step::Data(format!("\n{}", reply.status)));
    }

    (
        StreamScript {
            steps: stdout,
            hang: reply.hang,
        },
        StreamScript {
            steps: stderr,
            hang: reply.hang,
        },
    )
}

pub struct ScriptedStream {
    steps: VecDeque<Step>,
    buf: String,
    hang: bool,
    closed: bool,
    script: Arc<Mutex<Script>>,
    _lease: Arc<ChannelLease>,
}

impl ScriptedStream {
    fn new(stream: StreamScript, script: Arc<Mutex<Script>>, lease: Arc<ChannelLease>) -> Self {
        Self {
            steps: stream.steps.into(),
            buf: String::new(),
            hang: stream.hang,
            closed: false,
            script,
            _lease: lease,
        }
    }

    fn take_line(&mut self) -> Option<String> {
        let end = self.buf.find('\n')? + 1;
        Some(self.buf.drain(..end).collect())
    }
}

#[async_trait]
impl OutputStream for ScriptedStream {
    async fn read_line(&mut self) -> Option<String> {
        loop {
            if let Some(line) = self.take_line() {
                return Some(line);
            }
            match self.steps.pop_front() {
                Some(Step::Data(data)) => self.buf.push_str(&data),
                Some(Step::Idle) => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    return None;
                }
                None if self.hang => {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                    return None;
                }
                None if self.buf.is_empty() => return None,
                None => return Some(std::mem::take(&mut self.buf)),
            }
        }
    }

    fn at_eof(&self) -> bool {
        self.closed || (!self.hang && self.steps.is_empty() && self.buf.is_empty())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.script.lock().streams_closed += 1;
        }
    }
}

pub struct ScriptedChannel {
    stdout: ScriptedStream,
    stderr: Option<ScriptedStream>,
    error_stream_error: Option<String>,
}

#[async_trait]
impl OutputStream for ScriptedChannel {
    async fn read_line(&mut self) -> Option<String> {
        self.stdout.read_line().await
    }

    fn at_eof(&self) -> bool {
        self.stdout.at_eof()
    }

    async fn close(&mut self) {
        self.stdout.close().await
    }
}

impl ExecChannel for ScriptedChannel {
    type ErrorStream = ScriptedStream;

    fn error_stream(&mut self) -> Result<ScriptedStream> {
        if let Some(message) = &self.error_stream_error {
            return Err(Error::Io(io::Error::other(message.clone())));
        }
        self.stderr
            .take()
            .ok_or_else(|| Error::Execution("stderr stream already taken".to_string()))
    }
}
