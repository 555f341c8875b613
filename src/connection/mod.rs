//! Device connectivity: CLI sessions, liveness probes, and the
//! SSH-then-Telnet fallback policy.

pub mod manager;
pub mod probe;
pub mod scripted;
pub mod session;
pub mod transport;

pub use manager::ConnectionManager;
pub use probe::{LivenessProbe, TcpProbe};
pub use scripted::{ScriptedFactory, ScriptedSession, StaticProbe};
pub use session::{
    CommandOutput, DeviceSession, InteractStep, SessionError, SessionFactory, SessionSettings,
    any_failed, combined_text,
};
pub use transport::{TransportEndpoint, TransportKind};
