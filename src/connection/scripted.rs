//! Scripted session doubles.
//!
//! Device CLIs are awkward to stand up in tests, so the crate ships
//! scripted implementations of the connection seams. A
//! [`ScriptedSession`] replays canned replies in order and records every
//! line it was asked to send; a [`ScriptedFactory`] hands out prepared
//! sessions per connection attempt; a [`StaticProbe`] answers liveness
//! checks from a fixed script.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

use super::probe::LivenessProbe;
use super::session::{
    CommandOutput, DeviceSession, InteractStep, SessionError, SessionFactory, SessionSettings,
};
use super::transport::{TransportEndpoint, TransportKind};

type Reply = Result<CommandOutput, SessionError>;

/// Session that replays scripted replies. Replies are consumed one per
/// command in send order; when the script runs dry, commands succeed with
/// empty output.
#[derive(Default)]
pub struct ScriptedSession {
    replies: VecDeque<Reply>,
    reopen_replies: VecDeque<Result<(), SessionError>>,
    sent: Arc<Mutex<Vec<String>>>,
}

impl ScriptedSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful reply.
    pub fn reply_ok(mut self, text: impl Into<String>) -> Self {
        self.replies.push_back(Ok(CommandOutput::ok(text)));
        self
    }

    /// Queue a driver-level failure reply.
    pub fn reply_failed(mut self, text: impl Into<String>) -> Self {
        self.replies.push_back(Ok(CommandOutput::failure(text)));
        self
    }

    /// Queue a session error.
    pub fn reply_err(mut self, err: SessionError) -> Self {
        self.replies.push_back(Err(err));
        self
    }

    pub fn reopen_err(mut self, err: SessionError) -> Self {
        self.reopen_replies.push_back(Err(err));
        self
    }

    /// Shared handle to the list of sent lines, for assertions after the
    /// session has been moved into the engine.
    pub fn sent_log(&self) -> Arc<Mutex<Vec<String>>> {
        self.sent.clone()
    }

    fn next_reply(&mut self) -> Reply {
        self.replies
            .pop_front()
            .unwrap_or_else(|| Ok(CommandOutput::ok("")))
    }

    async fn record(&self, line: impl Into<String>) {
        self.sent.lock().await.push(line.into());
    }
}

#[async_trait]
impl DeviceSession for ScriptedSession {
    async fn send_command(&mut self, command: &str) -> Result<CommandOutput, SessionError> {
        self.record(command).await;
        self.next_reply()
    }

    async fn send_commands(
        &mut self,
        commands: &[&str],
    ) -> Result<Vec<CommandOutput>, SessionError> {
        let mut outputs = Vec::with_capacity(commands.len());
        for command in commands {
            self.record(*command).await;
            outputs.push(self.next_reply()?);
        }
        Ok(outputs)
    }

    async fn send_configs(&mut self, configs: &[String]) -> Result<CommandOutput, SessionError> {
        for config in configs {
            self.record(config.clone()).await;
        }
        self.next_reply()
    }

    async fn send_interactive(
        &mut self,
        steps: &[InteractStep],
    ) -> Result<CommandOutput, SessionError> {
        for step in steps {
            self.record(format!("interactive: {}", step.input)).await;
        }
        self.next_reply()
    }

    fn set_ops_timeout(&mut self, _timeout: Duration) {}

    async fn reopen(&mut self) -> Result<(), SessionError> {
        self.record("<reopen>").await;
        self.reopen_replies.pop_front().unwrap_or(Ok(()))
    }

    async fn close(&mut self) {
        self.record("<close>").await;
    }
}

#[derive(Default)]
struct FactoryInner {
    outcomes: VecDeque<Result<ScriptedSession, SessionError>>,
    opened: Vec<(TransportKind, u16)>,
}

/// Factory that hands out prepared sessions, one per connection attempt,
/// and records which endpoints were tried.
#[derive(Clone, Default)]
pub struct ScriptedFactory {
    inner: Arc<Mutex<FactoryInner>>,
}

impl ScriptedFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push_session(&self, session: ScriptedSession) {
        self.inner.lock().await.outcomes.push_back(Ok(session));
    }

    pub async fn push_failure(&self, err: SessionError) {
        self.inner.lock().await.outcomes.push_back(Err(err));
    }

    /// Endpoints open was called with, in order.
    pub async fn opened(&self) -> Vec<(TransportKind, u16)> {
        self.inner.lock().await.opened.clone()
    }
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    async fn open(
        &self,
        endpoint: &TransportEndpoint,
        _settings: &SessionSettings,
    ) -> Result<Box<dyn DeviceSession>, SessionError> {
        let mut inner = self.inner.lock().await;
        inner.opened.push((endpoint.transport, endpoint.port));
        match inner.outcomes.pop_front() {
            Some(Ok(session)) => Ok(Box::new(session)),
            Some(Err(err)) => Err(err),
            None => Err(SessionError::Other("no scripted session available".into())),
        }
    }
}

/// Probe that answers from a script, then falls back to a default.
#[derive(Clone)]
pub struct StaticProbe {
    results: Arc<Mutex<VecDeque<bool>>>,
    default: bool,
    calls: Arc<AtomicU64>,
}

impl StaticProbe {
    pub fn always(default: bool) -> Self {
        Self {
            results: Arc::new(Mutex::new(VecDeque::new())),
            default,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_results(results: impl IntoIterator<Item = bool>) -> Self {
        Self {
            results: Arc::new(Mutex::new(results.into_iter().collect())),
            default: false,
            calls: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Number of probe calls seen so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LivenessProbe for StaticProbe {
    async fn probe(&self, _host: &str, _port: u16, _timeout: Duration) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.results.lock().await.pop_front().unwrap_or(self.default)
    }
}
