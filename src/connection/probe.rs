//! TCP liveness probes.

use async_trait::async_trait;
use std::time::Duration;
use tokio::net::TcpStream;

/// Answers "does anything accept on host:port right now".
#[async_trait]
pub trait LivenessProbe: Send + Sync {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool;
}

/// Real probe, a bounded TCP connect.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpProbe;

#[async_trait]
impl LivenessProbe for TcpProbe {
    async fn probe(&self, host: &str, port: u16, timeout: Duration) -> bool {
        matches!(
            tokio::time::timeout(timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}
