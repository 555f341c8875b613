//! Record types shared with the external system of record.
//!
//! The string forms of the enums here are wire vocabulary: they are what
//! gets persisted and what operators filter on, so the literals must not
//! drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a scheduled task.
///
/// Declaration order is meaningful only for deterministic summary output.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Unknown,
    Scheduled,
    Failed,
    Running,
    Succeeded,
    Skipped,
}

impl TaskStatus {
    /// Terminal statuses never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Failed | TaskStatus::Succeeded | TaskStatus::Skipped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskStatus::Unknown => "unknown",
            TaskStatus::Scheduled => "scheduled",
            TaskStatus::Failed => "failed",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(TaskStatus::Unknown),
            "scheduled" => Ok(TaskStatus::Scheduled),
            "failed" => Ok(TaskStatus::Failed),
            "running" => Ok(TaskStatus::Running),
            "succeeded" => Ok(TaskStatus::Succeeded),
            "skipped" => Ok(TaskStatus::Skipped),
            other => Err(anyhow::anyhow!("unknown task status: {other}")),
        }
    }
}

/// Classified cause recorded when a task halts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailReason {
    FailUnknown,
    FailCheck,
    FailLogin,
    FailConfig,
    FailConnect,
    FailGeneral,
    FailAdd,
    FailUpgrade,
    FailUpload,
}

impl std::fmt::Display for FailReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FailReason::FailUnknown => "fail-unknown",
            FailReason::FailCheck => "fail-check",
            FailReason::FailLogin => "fail-login",
            FailReason::FailConfig => "fail-config",
            FailReason::FailConnect => "fail-connect",
            FailReason::FailGeneral => "fail-general",
            FailReason::FailAdd => "fail-add",
            FailReason::FailUpgrade => "fail-upgrade",
            FailReason::FailUpload => "fail-upload",
        };
        write!(f, "{s}")
    }
}

/// What a scheduled task is supposed to do on the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    /// Stage the image on the device file system and verify it.
    Upload,
    /// Rewrite boot configuration, reload, and post-check.
    Upgrade,
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskType::Upload => write!(f, "upload"),
            TaskType::Upgrade => write!(f, "upgrade"),
        }
    }
}

/// Transfer protocol used to stage images.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    #[default]
    Ftp,
}

impl std::fmt::Display for TransferMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferMethod::Ftp => write!(f, "ftp"),
        }
    }
}

/// The device a task operates on, as known to the system of record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRef {
    /// Inventory name, used as the stable device key.
    pub name: String,
    /// Hardware model (product id) the inventory claims.
    pub model: String,
    /// Inventory serial number.
    pub serial: String,
    /// Management address; tasks for devices without one are skipped
    /// before any connection attempt.
    pub mgmt_addr: Option<String>,
}

/// A firmware image registered in the image catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareImage {
    pub filename: String,
    /// Operator-supplied digest; compared byte for byte against the digest
    /// the device computes.
    pub md5sum: String,
    pub version: String,
    pub size_bytes: u64,
}

/// Binding of a device model to the image it should be running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldenImage {
    pub model: String,
    pub image: SoftwareImage,
}

/// One unit of scheduled work against one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: Uuid,
    /// Queue job backing this task, set once enqueued.
    pub job_id: Option<Uuid>,
    pub device: DeviceRef,
    pub task_type: TaskType,
    pub transfer_method: TransferMethod,
    pub status: TaskStatus,
    pub fail_reason: FailReason,
    /// One-line outcome shown to operators.
    pub message: String,
    /// Append-only execution journal, persisted line by line.
    pub log: String,
    pub scheduled_time: DateTime<Utc>,
    /// Maintenance window length in hours from `scheduled_time`.
    pub mw_duration_hours: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Operator acknowledgement. Skipped and succeeded tasks are
    /// auto-confirmed; failed ones wait for a human.
    pub confirmed: bool,
    /// Who scheduled the task.
    pub user: String,
}

impl ScheduledTask {
    /// Fresh task in the `scheduled` state, not yet enqueued.
    pub fn new(
        device: DeviceRef,
        task_type: TaskType,
        scheduled_time: DateTime<Utc>,
        mw_duration_hours: i64,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id: None,
            device,
            task_type,
            transfer_method: TransferMethod::Ftp,
            status: TaskStatus::Scheduled,
            fail_reason: FailReason::FailUnknown,
            message: String::new(),
            log: String::new(),
            scheduled_time,
            mw_duration_hours,
            start_time: None,
            end_time: None,
            confirmed: false,
            user: user.into(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// End of the maintenance window this task must start within.
    pub fn window_end(&self) -> DateTime<Utc> {
        self.scheduled_time + chrono::Duration::hours(self.mw_duration_hours)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_literals_are_stable() {
        assert_eq!(serde_json::to_string(&TaskStatus::Succeeded).unwrap(), "\"succeeded\"");
        assert_eq!(
            serde_json::from_str::<TaskStatus>("\"skipped\"").unwrap(),
            TaskStatus::Skipped
        );
        assert_eq!("running".parse::<TaskStatus>().unwrap(), TaskStatus::Running);
        assert!("bogus".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn fail_reason_wire_literals_are_kebab_case() {
        assert_eq!(serde_json::to_string(&FailReason::FailCheck).unwrap(), "\"fail-check\"");
        assert_eq!(serde_json::to_string(&FailReason::FailUpload).unwrap(), "\"fail-upload\"");
        assert_eq!(
            serde_json::from_str::<FailReason>("\"fail-unknown\"").unwrap(),
            FailReason::FailUnknown
        );
        assert_eq!(FailReason::FailUpgrade.to_string(), "fail-upgrade");
    }

    #[test]
    fn terminal_statuses() {
        assert!(TaskStatus::Skipped.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Succeeded.is_terminal());
        assert!(!TaskStatus::Running.is_terminal());
        assert!(!TaskStatus::Scheduled.is_terminal());
    }

    #[test]
    fn window_end_honours_duration() {
        let device = DeviceRef {
            name: "edge-1".into(),
            model: "C2960X".into(),
            serial: "FOC1234".into(),
            mgmt_addr: Some("192.0.2.10".into()),
        };
        let scheduled = Utc::now();
        let task = ScheduledTask::new(device, TaskType::Upgrade, scheduled, 3, "ops");
        assert_eq!(task.window_end(), scheduled + chrono::Duration::hours(3));
        assert_eq!(task.status, TaskStatus::Scheduled);
        assert!(!task.confirmed);
    }
}
