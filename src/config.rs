//! Engine configuration.
//!
//! Everything tunable lives here and is passed explicitly into
//! constructors. Defaults match the behavior the timers were tuned for in
//! production; tests shrink them to zero.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// CLI login credentials for managed devices.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceCredentials {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// FTP endpoint images are staged from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransferConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Transport ports and timeouts for device CLI sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// SSH port tried first.
    #[serde(default = "default_primary_port")]
    pub primary_port: u16,
    /// Telnet port tried once if SSH fails.
    #[serde(default = "default_fallback_port")]
    pub fallback_port: u16,
    /// TCP connect timeout for liveness probes, in seconds.
    #[serde(default = "default_socket_timeout_secs")]
    pub socket_timeout_secs: u64,
    /// Pause after each liveness check, in seconds.
    #[serde(default = "default_probe_settle_secs")]
    pub probe_settle_secs: u64,
    /// Per-command timeout for interactive sessions, in seconds.
    #[serde(default = "default_ops_timeout_secs")]
    pub ops_timeout_secs: u64,
    /// Per-command timeout while an image transfer runs, in seconds.
    #[serde(default = "default_transfer_ops_timeout_secs")]
    pub transfer_ops_timeout_secs: u64,
    /// Per-command timeout for on-box digest computation, in seconds.
    #[serde(default = "default_verify_ops_timeout_secs")]
    pub verify_ops_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            primary_port: default_primary_port(),
            fallback_port: default_fallback_port(),
            socket_timeout_secs: default_socket_timeout_secs(),
            probe_settle_secs: default_probe_settle_secs(),
            ops_timeout_secs: default_ops_timeout_secs(),
            transfer_ops_timeout_secs: default_transfer_ops_timeout_secs(),
            verify_ops_timeout_secs: default_verify_ops_timeout_secs(),
        }
    }
}

impl ConnectionConfig {
    pub fn socket_timeout(&self) -> Duration {
        Duration::from_secs(self.socket_timeout_secs)
    }

    pub fn probe_settle(&self) -> Duration {
        Duration::from_secs(self.probe_settle_secs)
    }

    pub fn ops_timeout(&self) -> Duration {
        Duration::from_secs(self.ops_timeout_secs)
    }

    pub fn transfer_ops_timeout(&self) -> Duration {
        Duration::from_secs(self.transfer_ops_timeout_secs)
    }

    pub fn verify_ops_timeout(&self) -> Duration {
        Duration::from_secs(self.verify_ops_timeout_secs)
    }
}

/// Admission controller knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Headroom of unconfirmed failures tolerated above the number of
    /// currently active jobs before upgrades stop being admitted.
    #[serde(default = "default_upgrade_threshold")]
    pub upgrade_threshold: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            upgrade_threshold: default_upgrade_threshold(),
        }
    }
}

/// Post-reload recovery wait knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReloadConfig {
    /// Blind hold before the first reachability probe, in seconds.
    #[serde(default = "default_hold_secs")]
    pub hold_secs: u64,
    /// Reachability probe attempts before the device is declared lost.
    #[serde(default = "default_max_probe_attempts")]
    pub max_probe_attempts: u32,
    /// Wait between failed probe attempts, in seconds.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,
    /// Settle time after the device is seen online, in seconds.
    #[serde(default = "default_post_online_settle_secs")]
    pub post_online_settle_secs: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            hold_secs: default_hold_secs(),
            max_probe_attempts: default_max_probe_attempts(),
            probe_interval_secs: default_probe_interval_secs(),
            post_online_settle_secs: default_post_online_settle_secs(),
        }
    }
}

impl ReloadConfig {
    pub fn hold(&self) -> Duration {
        Duration::from_secs(self.hold_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn post_online_settle(&self) -> Duration {
        Duration::from_secs(self.post_online_settle_secs)
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub device: DeviceCredentials,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub reload: ReloadConfig,
}

impl EngineConfig {
    /// Load configuration from a TOML file. Missing keys fall back to
    /// defaults.
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: EngineConfig = toml::from_str(&raw)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        Ok(config)
    }

    /// Zeroed timers for tests; ports and thresholds keep their defaults.
    pub fn with_zero_delays(mut self) -> Self {
        self.connection.probe_settle_secs = 0;
        self.reload.hold_secs = 0;
        self.reload.probe_interval_secs = 0;
        self.reload.post_online_settle_secs = 0;
        self
    }
}

fn default_primary_port() -> u16 {
    22
}

fn default_fallback_port() -> u16 {
    23
}

fn default_socket_timeout_secs() -> u64 {
    5
}

fn default_probe_settle_secs() -> u64 {
    2
}

fn default_ops_timeout_secs() -> u64 {
    10
}

fn default_transfer_ops_timeout_secs() -> u64 {
    7200
}

fn default_verify_ops_timeout_secs() -> u64 {
    600
}

fn default_upgrade_threshold() -> u64 {
    2
}

fn default_hold_secs() -> u64 {
    240
}

fn default_max_probe_attempts() -> u32 {
    10
}

fn default_probe_interval_secs() -> u64 {
    60
}

fn default_post_online_settle_secs() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_production_tuning() {
        let config = EngineConfig::default();
        assert_eq!(config.connection.primary_port, 22);
        assert_eq!(config.connection.fallback_port, 23);
        assert_eq!(config.connection.socket_timeout(), Duration::from_secs(5));
        assert_eq!(config.connection.transfer_ops_timeout(), Duration::from_secs(7200));
        assert_eq!(config.admission.upgrade_threshold, 2);
        assert_eq!(config.reload.hold(), Duration::from_secs(240));
        assert_eq!(config.reload.max_probe_attempts, 10);
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[device]
username = "netops"
password = "secret"

[transfer]
server = "203.0.113.5"

[reload]
hold_secs = 120
"#
        )
        .unwrap();

        let config = EngineConfig::from_toml_file(file.path()).unwrap();
        assert_eq!(config.device.username, "netops");
        assert_eq!(config.transfer.server, "203.0.113.5");
        assert_eq!(config.reload.hold_secs, 120);
        assert_eq!(config.reload.max_probe_attempts, 10);
        assert_eq!(config.connection.primary_port, 22);
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(EngineConfig::from_toml_file("/nonexistent/engine.toml").is_err());
    }
}
