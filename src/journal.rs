//! Per-task execution journal.
//!
//! Every significant engine action is appended to the task's log field and
//! persisted right away, so a task record that stops mid-flight still
//! carries its full history. Lines are mirrored to the process log through
//! `tracing`, prefixed with a `{job_id} - {device}` correlation id.

use chrono::Utc;
use std::sync::Arc;

use crate::error::{ExecutionError, HaltDisposition, TaskHalt};
use crate::record::{FailReason, RecordStore, ScheduledTask, TaskStatus};

const LINE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Single writer for one task's record during execution.
///
/// The journal owns the working copy of the task. Log appends and halt
/// classification both go through it, which keeps the record and the log
/// from diverging.
pub struct TaskJournal {
    task: ScheduledTask,
    store: Arc<dyn RecordStore>,
    log_id: String,
}

impl TaskJournal {
    pub fn new(task: ScheduledTask, store: Arc<dyn RecordStore>) -> Self {
        let job = task
            .job_id
            .map(|id| id.to_string())
            .unwrap_or_else(|| task.id.to_string());
        let log_id = format!("{} - {}", job, task.device.name);
        Self { task, store, log_id }
    }

    pub fn task(&self) -> &ScheduledTask {
        &self.task
    }

    pub fn task_mut(&mut self) -> &mut ScheduledTask {
        &mut self.task
    }

    pub fn into_task(self) -> ScheduledTask {
        self.task
    }

    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    pub async fn debug(&mut self, msg: &str) {
        tracing::debug!("{} - {}", self.log_id, msg);
        self.append("DEBUG", msg).await;
    }

    pub async fn info(&mut self, msg: &str) {
        tracing::info!("{} - {}", self.log_id, msg);
        self.append("INFO", msg).await;
    }

    pub async fn warning(&mut self, msg: &str) {
        tracing::warn!("{} - {}", self.log_id, msg);
        self.append("WARNING", msg).await;
    }

    pub async fn error(&mut self, msg: &str) {
        tracing::error!("{} - {}", self.log_id, msg);
        self.append("ERROR", msg).await;
    }

    /// Stop before any destructive change. Writes the terminal record and
    /// returns the halt for the caller to raise.
    pub async fn skip(&mut self, msg: &str, reason: FailReason) -> ExecutionError {
        self.halt(HaltDisposition::Skip, msg, reason).await
    }

    /// Stop after a destructive change may have landed.
    pub async fn fail(&mut self, msg: &str, reason: FailReason) -> ExecutionError {
        self.halt(HaltDisposition::Fail, msg, reason).await
    }

    async fn halt(
        &mut self,
        disposition: HaltDisposition,
        msg: &str,
        reason: FailReason,
    ) -> ExecutionError {
        self.task.status = match disposition {
            HaltDisposition::Skip => TaskStatus::Skipped,
            HaltDisposition::Fail => TaskStatus::Failed,
        };
        self.task.fail_reason = reason;
        self.task.message = msg.to_string();
        self.persist().await;
        ExecutionError::Halted(TaskHalt {
            disposition,
            reason,
            message: msg.to_string(),
        })
    }

    async fn append(&mut self, level: &str, msg: &str) {
        let line = format!(
            "{} - {} - {}\n",
            Utc::now().format(LINE_TIME_FORMAT),
            level,
            msg
        );
        self.task.log.push_str(&line);
        self.persist().await;
    }

    /// Best-effort save of the working copy. A broken store must not stop
    /// a device operation mid-flight, so failures only hit the process log.
    pub async fn persist(&self) {
        if let Err(err) = self.store.save_task(&self.task).await {
            tracing::error!("{} - failed to persist task record: {err:#}", self.log_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{DeviceRef, InMemoryRecordStore, TaskType};

    fn task() -> ScheduledTask {
        ScheduledTask::new(
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
        )
    }

    #[tokio::test]
    async fn lines_are_appended_and_persisted() {
        let store = Arc::new(InMemoryRecordStore::new());
        let task = task();
        let id = task.id;
        store.insert_task(task.clone()).await;

        let mut journal = TaskJournal::new(task, store.clone());
        journal.info("Initial task checking...").await;
        journal.debug("got response on TCP/22").await;

        let saved = store.get_task(id).await.unwrap();
        let lines: Vec<&str> = saved.log.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(" - INFO - Initial task checking..."));
        assert!(lines[1].contains(" - DEBUG - got response on TCP/22"));
    }

    #[tokio::test]
    async fn skip_writes_terminal_record() {
        let store = Arc::new(InMemoryRecordStore::new());
        let task = task();
        let id = task.id;

        let mut journal = TaskJournal::new(task, store.clone());
        let err = journal
            .skip("Maintenance Window is over", FailReason::FailCheck)
            .await;

        let halt = err.halt().unwrap();
        assert!(halt.is_skip());
        assert_eq!(halt.reason, FailReason::FailCheck);

        let saved = store.get_task(id).await.unwrap();
        assert_eq!(saved.status, TaskStatus::Skipped);
        assert_eq!(saved.fail_reason, FailReason::FailCheck);
        assert_eq!(saved.message, "Maintenance Window is over");
    }

    #[tokio::test]
    async fn fail_marks_task_failed() {
        let store = Arc::new(InMemoryRecordStore::new());
        let task = task();
        let id = task.id;

        let mut journal = TaskJournal::new(task, store.clone());
        let err = journal
            .fail("Unable to change bootvar", FailReason::FailUpgrade)
            .await;

        assert!(!err.halt().unwrap().is_skip());
        let saved = store.get_task(id).await.unwrap();
        assert_eq!(saved.status, TaskStatus::Failed);
        assert_eq!(saved.fail_reason, FailReason::FailUpgrade);
    }

    #[test]
    fn log_id_prefers_job_id() {
        let store: Arc<dyn RecordStore> = Arc::new(InMemoryRecordStore::new());
        let mut t = task();
        t.job_id = Some(uuid::Uuid::new_v4());
        let expected = format!("{} - edge-1", t.job_id.unwrap());
        let journal = TaskJournal::new(t, store);
        assert_eq!(journal.log_id(), expected);
    }
}
