//! Admission gates evaluated before any device contact.
//!
//! Three gates run in order: the golden-image gate, the maintenance-window
//! gate, and (for upgrades only) the failure-threshold circuit breaker.
//! Every rejection is a pre-destructive skip.

use std::sync::Arc;

use crate::config::AdmissionConfig;
use crate::error::ExecutionError;
use crate::journal::TaskJournal;
use crate::queue::JobQueue;
use crate::record::{FailReason, GoldenImage, RecordStore, TaskType};

pub struct AdmissionController {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn JobQueue>,
    config: AdmissionConfig,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
        config: AdmissionConfig,
    ) -> Self {
        Self { store, queue, config }
    }

    /// Run all gates. On success returns the golden image the task will
    /// work towards.
    pub async fn check(&self, journal: &mut TaskJournal) -> Result<GoldenImage, ExecutionError> {
        let golden = self.check_golden_image(journal).await?;
        self.check_maintenance_window(journal).await?;
        let task_type = journal.task().task_type;
        if task_type == TaskType::Upgrade {
            self.check_failure_threshold(journal).await?;
        } else {
            journal
                .debug(&format!(
                    "Task type is {task_type}, check against threshold was skipped"
                ))
                .await;
        }
        Ok(golden)
    }

    async fn check_golden_image(
        &self,
        journal: &mut TaskJournal,
    ) -> Result<GoldenImage, ExecutionError> {
        let model = journal.task().device.model.clone();
        match self.store.golden_image(&model).await? {
            Some(golden) => {
                journal
                    .debug(&format!("Golden Image for {model}: {}", golden.image.filename))
                    .await;
                Ok(golden)
            }
            None => {
                let msg = format!("No Golden Image for model {model}");
                journal.warning(&msg).await;
                Err(journal.skip(&msg, FailReason::FailCheck).await)
            }
        }
    }

    /// A task that starts after its window closed must not touch the
    /// device. Started tasks are never interrupted by this gate; it only
    /// looks at the start time.
    async fn check_maintenance_window(
        &self,
        journal: &mut TaskJournal,
    ) -> Result<(), ExecutionError> {
        let task = journal.task();
        let start = task.start_time.unwrap_or_else(chrono::Utc::now);
        if start > task.window_end() {
            let msg = "Maintenance Window is over";
            journal.warning(msg).await;
            return Err(journal.skip(msg, FailReason::FailCheck).await);
        }
        Ok(())
    }

    /// Circuit breaker: too many started-but-unconfirmed tasks means
    /// something is going wrong fleet-wide, so stop admitting upgrades
    /// until an operator acknowledges the failures.
    async fn check_failure_threshold(
        &self,
        journal: &mut TaskJournal,
    ) -> Result<(), ExecutionError> {
        let unconfirmed = self.store.count_unconfirmed_started().await?;
        let active = self.queue.active_count().await?;
        let threshold = self.config.upgrade_threshold;
        if unconfirmed >= active + threshold {
            let msg = format!(
                "Reached failure threshold: Unconfirmed: {unconfirmed}, active: {active}, failed: {}, threshold: {threshold}",
                unconfirmed.saturating_sub(active)
            );
            journal.warning(&msg).await;
            return Err(journal.skip(&msg, FailReason::FailCheck).await);
        }
        journal
            .debug(&format!(
                "Failure threshold not reached: Unconfirmed: {unconfirmed}, active: {active}, threshold: {threshold}"
            ))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use crate::record::{
        DeviceRef, InMemoryRecordStore, ScheduledTask, SoftwareImage, TaskStatus,
    };
    use chrono::{Duration, Utc};

    fn device() -> DeviceRef {
        DeviceRef {
            name: "edge-1".into(),
            model: "C2960X".into(),
            serial: "FOC1111".into(),
            mgmt_addr: Some("192.0.2.10".into()),
        }
    }

    fn golden() -> GoldenImage {
        GoldenImage {
            model: "C2960X".into(),
            image: SoftwareImage {
                filename: "c2960x-universalk9-mz.152-7.E4.bin".into(),
                md5sum: "0123456789abcdef0123456789abcdef".into(),
                version: "15.2(7)E4".into(),
                size_bytes: 26_000_000,
            },
        }
    }

    fn started_task(task_type: TaskType) -> ScheduledTask {
        let mut task = ScheduledTask::new(device(), task_type, Utc::now(), 2, "ops");
        task.start_time = Some(Utc::now());
        task.status = TaskStatus::Running;
        task
    }

    fn controller(
        store: Arc<InMemoryRecordStore>,
        queue: Arc<InMemoryJobQueue>,
    ) -> AdmissionController {
        AdmissionController::new(store, queue, AdmissionConfig { upgrade_threshold: 2 })
    }

    #[tokio::test]
    async fn missing_golden_image_names_the_model() {
        let store = Arc::new(InMemoryRecordStore::new());
        let queue = Arc::new(InMemoryJobQueue::new());
        let ctl = controller(store.clone(), queue);

        let mut journal = TaskJournal::new(started_task(TaskType::Upgrade), store);
        let err = ctl.check(&mut journal).await.unwrap_err();
        let halt = err.halt().unwrap();
        assert!(halt.is_skip());
        assert_eq!(halt.reason, FailReason::FailCheck);
        assert!(halt.message.contains("C2960X"));
    }

    #[tokio::test]
    async fn late_start_is_rejected() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_golden_image(golden()).await;
        let queue = Arc::new(InMemoryJobQueue::new());
        let ctl = controller(store.clone(), queue);

        let mut task = started_task(TaskType::Upgrade);
        task.scheduled_time = Utc::now() - Duration::hours(5);
        task.mw_duration_hours = 2;

        let mut journal = TaskJournal::new(task, store);
        let err = ctl.check(&mut journal).await.unwrap_err();
        assert_eq!(err.halt().unwrap().message, "Maintenance Window is over");
    }

    #[tokio::test]
    async fn start_within_window_passes() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_golden_image(golden()).await;
        let queue = Arc::new(InMemoryJobQueue::new());
        let ctl = controller(store.clone(), queue);

        let mut task = started_task(TaskType::Upgrade);
        task.scheduled_time = Utc::now() - Duration::minutes(30);
        task.mw_duration_hours = 2;

        let mut journal = TaskJournal::new(task, store);
        assert!(ctl.check(&mut journal).await.is_ok());
    }

    #[tokio::test]
    async fn threshold_counts_active_jobs_as_headroom() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_golden_image(golden()).await;
        let queue = Arc::new(InMemoryJobQueue::new());

        // Three started-but-unconfirmed records besides the task under
        // admission, only one job active.
        for name in ["a", "b", "c"] {
            let mut t = started_task(TaskType::Upgrade);
            t.device.name = name.into();
            store.insert_task(t).await;
        }
        let job = queue.enqueue(uuid::Uuid::new_v4()).await.unwrap();
        queue.mark_started(job).await.unwrap();

        let ctl = controller(store.clone(), queue);
        // The task under admission persists itself on the first journal
        // line, so it counts towards unconfirmed as well.
        let mut journal = TaskJournal::new(started_task(TaskType::Upgrade), store);
        let err = ctl.check(&mut journal).await.unwrap_err();
        let halt = err.halt().unwrap();
        assert!(halt.message.starts_with("Reached failure threshold"));
        assert!(halt.message.contains("Unconfirmed: 4"));
        assert!(halt.message.contains("active: 1"));
        assert!(halt.message.contains("threshold: 2"));
    }

    #[tokio::test]
    async fn threshold_gate_skips_upload_tasks() {
        let store = Arc::new(InMemoryRecordStore::new());
        store.insert_golden_image(golden()).await;
        let queue = Arc::new(InMemoryJobQueue::new());

        for name in ["a", "b", "c", "d"] {
            let mut t = started_task(TaskType::Upgrade);
            t.device.name = name.into();
            store.insert_task(t).await;
        }

        let ctl = controller(store.clone(), queue);
        let mut journal = TaskJournal::new(started_task(TaskType::Upload), store);
        assert!(ctl.check(&mut journal).await.is_ok());
        // The bypass itself leaves a rationale line in the task log.
        assert!(
            journal
                .task()
                .log
                .contains("Task type is upload, check against threshold was skipped")
        );
    }
}
