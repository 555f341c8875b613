//! Device CLI session abstraction.
//!
//! The engine drives sessions only through [`DeviceSession`] and opens
//! them through [`SessionFactory`]. Production deployments plug in their
//! platform driver; tests use the scripted doubles in
//! [`scripted`](super::scripted).

use async_trait::async_trait;
use std::time::Duration;

use super::transport::TransportEndpoint;

/// Errors a session can surface. The engine cares about the distinction
/// between authentication trouble, the peer closing, and command timeouts;
/// everything else is `Other`.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SessionError {
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),
    #[error("connection closed: {0}")]
    ConnectionClosed(String),
    #[error("operation timed out: {0}")]
    Timeout(String),
    #[error("session error: {0}")]
    Other(String),
}

/// Result of one CLI command.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Driver-level failure indication (bad prompt, rejected command).
    pub failed: bool,
    /// Raw text the device returned.
    pub result: String,
}

impl CommandOutput {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            failed: false,
            result: result.into(),
        }
    }

    pub fn failure(result: impl Into<String>) -> Self {
        Self {
            failed: true,
            result: result.into(),
        }
    }
}

/// One step of an interactive exchange: send `input`, wait for `expect`.
#[derive(Debug, Clone)]
pub struct InteractStep {
    pub input: String,
    pub expect: String,
}

impl InteractStep {
    pub fn new(input: impl Into<String>, expect: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            expect: expect.into(),
        }
    }
}

/// True if any output in a batch failed.
pub fn any_failed(outputs: &[CommandOutput]) -> bool {
    outputs.iter().any(|o| o.failed)
}

/// Concatenated raw text of a batch, for journal dumps.
pub fn combined_text(outputs: &[CommandOutput]) -> String {
    outputs
        .iter()
        .map(|o| o.result.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Open CLI session against one device.
#[async_trait]
pub trait DeviceSession: Send {
    /// Run one exec-mode command.
    async fn send_command(&mut self, command: &str) -> Result<CommandOutput, SessionError>;

    /// Run several exec-mode commands, one output each.
    async fn send_commands(&mut self, commands: &[&str])
    -> Result<Vec<CommandOutput>, SessionError>;

    /// Apply configuration lines, combined output.
    async fn send_configs(&mut self, configs: &[String]) -> Result<CommandOutput, SessionError>;

    /// Drive an interactive prompt exchange.
    async fn send_interactive(
        &mut self,
        steps: &[InteractStep],
    ) -> Result<CommandOutput, SessionError>;

    /// Change the per-command timeout for subsequent commands.
    fn set_ops_timeout(&mut self, timeout: Duration);

    /// Re-establish a session the device dropped, same endpoint.
    async fn reopen(&mut self) -> Result<(), SessionError>;

    /// Close the session. Errors on close are ignored.
    async fn close(&mut self);
}

/// Session connection parameters handed to the factory.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub host: String,
    pub username: String,
    pub password: String,
    pub ops_timeout: Duration,
}

/// Opens sessions over a specific transport endpoint.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(
        &self,
        endpoint: &TransportEndpoint,
        settings: &SessionSettings,
    ) -> Result<Box<dyn DeviceSession>, SessionError>;
}
