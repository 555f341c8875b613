//! Connection establishment with transport fallback.

use std::sync::Arc;
use std::time::Duration;

use crate::config::{ConnectionConfig, DeviceCredentials};
use crate::journal::TaskJournal;

use super::probe::LivenessProbe;
use super::session::{DeviceSession, SessionError, SessionFactory, SessionSettings};
use super::transport::TransportEndpoint;

/// Opens sessions and probes liveness for one device.
///
/// The attempt order is fixed: SSH on the primary port, then exactly one
/// Telnet fallback. The same order is used for login attempts and for
/// reachability probes, so "reachable" and "connectable" agree on which
/// ports matter.
pub struct ConnectionManager {
    host: String,
    config: ConnectionConfig,
    credentials: DeviceCredentials,
    factory: Arc<dyn SessionFactory>,
    probe: Arc<dyn LivenessProbe>,
}

impl ConnectionManager {
    pub fn new(
        host: impl Into<String>,
        config: ConnectionConfig,
        credentials: DeviceCredentials,
        factory: Arc<dyn SessionFactory>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        Self {
            host: host.into(),
            config,
            credentials,
            factory,
            probe,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Ordered transport attempt list.
    pub fn attempts(&self) -> Vec<TransportEndpoint> {
        vec![
            TransportEndpoint::ssh(self.config.primary_port),
            TransportEndpoint::telnet(self.config.fallback_port),
        ]
    }

    /// Try to open a CLI session, falling back once. `None` means every
    /// transport was tried and none produced a session; the journal holds
    /// the per-attempt detail.
    pub async fn connect(
        &self,
        journal: &mut TaskJournal,
        ops_timeout: Duration,
    ) -> Option<Box<dyn DeviceSession>> {
        let settings = SessionSettings {
            host: self.host.clone(),
            username: self.credentials.username.clone(),
            password: self.credentials.password.clone(),
            ops_timeout,
        };

        for (attempt, endpoint) in self.attempts().into_iter().enumerate() {
            if attempt > 0 {
                journal
                    .debug(&format!("Switching to {}", endpoint.transport))
                    .await;
            }
            journal
                .debug(&format!("Trying to connect to the device via TCP/{}", endpoint.port))
                .await;

            match self.factory.open(&endpoint, &settings).await {
                Ok(session) => {
                    journal
                        .debug(&format!(
                            "Login successful while connecting to the device via TCP/{}",
                            endpoint.port
                        ))
                        .await;
                    return Some(session);
                }
                Err(SessionError::AuthenticationFailed(detail)) => {
                    journal
                        .debug(&format!(
                            "Authentication failed while connecting via TCP/{}: {detail}",
                            endpoint.port
                        ))
                        .await;
                }
                Err(SessionError::ConnectionClosed(detail)) => {
                    journal
                        .debug(&format!(
                            "Device closed connection on TCP/{}: {detail}",
                            endpoint.port
                        ))
                        .await;
                }
                Err(err) => {
                    journal
                        .debug(&format!(
                            "Unknown error while connecting to the device via TCP/{}: {err}",
                            endpoint.port
                        ))
                        .await;
                }
            }
        }
        None
    }

    /// One liveness check over the same attempt list. Returns on the first
    /// port that answers; a fixed settle delay follows either outcome.
    pub async fn is_alive(&self, journal: &mut TaskJournal) -> bool {
        let timeout = self.config.socket_timeout();
        for endpoint in self.attempts() {
            if self.probe.probe(&self.host, endpoint.port, timeout).await {
                journal
                    .debug(&format!("got response on TCP/{}", endpoint.port))
                    .await;
                tokio::time::sleep(self.config.probe_settle()).await;
                return true;
            }
            journal
                .debug(&format!("no response on TCP/{}", endpoint.port))
                .await;
        }
        tokio::time::sleep(self.config.probe_settle()).await;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::scripted::{ScriptedFactory, ScriptedSession, StaticProbe};
    use crate::connection::transport::TransportKind;
    use crate::journal::TaskJournal;
    use crate::record::{DeviceRef, InMemoryRecordStore, ScheduledTask, TaskType};
    use chrono::Utc;

    fn journal() -> TaskJournal {
        let task = ScheduledTask::new(
            DeviceRef {
                name: "edge-1".into(),
                model: "C2960X".into(),
                serial: "FOC1111".into(),
                mgmt_addr: Some("192.0.2.10".into()),
            },
            TaskType::Upgrade,
            Utc::now(),
            1,
            "ops",
        );
        TaskJournal::new(task, Arc::new(InMemoryRecordStore::new()))
    }

    fn manager(factory: ScriptedFactory, probe: StaticProbe) -> ConnectionManager {
        let config = ConnectionConfig {
            probe_settle_secs: 0,
            ..ConnectionConfig::default()
        };
        ConnectionManager::new(
            "192.0.2.10",
            config,
            DeviceCredentials::default(),
            Arc::new(factory),
            Arc::new(probe),
        )
    }

    #[tokio::test]
    async fn falls_back_to_telnet_exactly_once() {
        let factory = ScriptedFactory::new();
        factory
            .push_failure(SessionError::ConnectionClosed("reset by peer".into()))
            .await;
        factory.push_session(ScriptedSession::new()).await;

        let mgr = manager(factory.clone(), StaticProbe::always(true));
        let mut journal = journal();
        let session = mgr.connect(&mut journal, Duration::from_secs(10)).await;
        assert!(session.is_some());

        let opened = factory.opened().await;
        assert_eq!(opened.len(), 2);
        assert_eq!(opened[0], (TransportKind::Ssh, 22));
        assert_eq!(opened[1], (TransportKind::Telnet, 23));
    }

    #[tokio::test]
    async fn gives_up_after_both_transports_fail() {
        let factory = ScriptedFactory::new();
        factory
            .push_failure(SessionError::AuthenticationFailed("bad creds".into()))
            .await;
        factory
            .push_failure(SessionError::Other("telnet refused".into()))
            .await;

        let mgr = manager(factory.clone(), StaticProbe::always(true));
        let mut journal = journal();
        assert!(mgr.connect(&mut journal, Duration::from_secs(10)).await.is_none());
        assert_eq!(factory.opened().await.len(), 2);
    }

    #[tokio::test]
    async fn is_alive_stops_at_first_answering_port() {
        let probe = StaticProbe::with_results([true]);
        let mgr = manager(ScriptedFactory::new(), probe.clone());
        let mut journal = journal();
        assert!(mgr.is_alive(&mut journal).await);
        assert_eq!(probe.calls(), 1);
    }

    #[tokio::test]
    async fn is_alive_tries_fallback_port_before_giving_up() {
        let probe = StaticProbe::with_results([false, false]);
        let mgr = manager(ScriptedFactory::new(), probe.clone());
        let mut journal = journal();
        assert!(!mgr.is_alive(&mut journal).await);
        assert_eq!(probe.calls(), 2);
    }
}
