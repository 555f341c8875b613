//! Transports a device CLI can be reached over.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Ssh,
    Telnet,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Ssh => write!(f, "ssh"),
            TransportKind::Telnet => write!(f, "telnet"),
        }
    }
}

/// One concrete way to reach a device CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransportEndpoint {
    pub transport: TransportKind,
    pub port: u16,
}

impl TransportEndpoint {
    pub fn ssh(port: u16) -> Self {
        Self {
            transport: TransportKind::Ssh,
            port,
        }
    }

    pub fn telnet(port: u16) -> Self {
        Self {
            transport: TransportKind::Telnet,
            port,
        }
    }
}

impl std::fmt::Display for TransportEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/TCP/{}", self.transport, self.port)
    }
}
