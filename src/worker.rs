//! Worker boundary.
//!
//! [`TaskRunner::run`] is the entry point a queue worker invokes with a
//! task id. It stamps the start time, hands the task to the engine, and
//! translates the engine outcome into the terminal record: skips are
//! auto-confirmed and reported as a normal return, failures stay
//! unconfirmed and propagate as errors, and anything unclassified becomes
//! a generic `fail-unknown` failure.
//!
//! Scheduling and cancellation helpers live here too because they are the
//! other half of the queue contract: a task is enqueued for its scheduled
//! time, and may be cancelled only while its job has not started.

use anyhow::{Context, Result};
use chrono::{DateTime, Timelike, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::connection::{LivenessProbe, SessionFactory};
use crate::error::ExecutionError;
use crate::executor::TaskExecutor;
use crate::journal::TaskJournal;
use crate::queue::JobQueue;
use crate::record::{DeviceRef, FailReason, RecordStore, ScheduledTask, TaskStatus, TaskType};

/// What to schedule.
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub device: DeviceRef,
    pub task_type: TaskType,
    pub scheduled_time: DateTime<Utc>,
    pub mw_duration_hours: i64,
    pub user: String,
}

/// Create the task record and enqueue its job for the scheduled time.
pub async fn schedule_task(
    store: &dyn RecordStore,
    queue: &dyn JobQueue,
    spec: TaskSpec,
) -> Result<ScheduledTask> {
    let mut task = ScheduledTask::new(
        spec.device,
        spec.task_type,
        spec.scheduled_time,
        spec.mw_duration_hours,
        spec.user,
    );
    let job_id = queue.enqueue_at(task.scheduled_time, task.id).await?;
    task.job_id = Some(job_id);
    store.save_task(&task).await?;
    Ok(task)
}

/// Cancel a task that has not started. Returns `false` without touching
/// anything when the backing job already started.
pub async fn cancel_task(
    store: &dyn RecordStore,
    queue: &dyn JobQueue,
    task_id: Uuid,
) -> Result<bool> {
    let task = store.get_task(task_id).await?;
    if let Some(job_id) = task.job_id {
        match queue.fetch(job_id).await? {
            Some(job) if job.is_started() => return Ok(false),
            Some(_) => {
                queue.delete(job_id).await?;
            }
            None => {}
        }
    }
    store.delete_task(task_id).await?;
    Ok(true)
}

/// Runs tasks handed out by the job queue.
pub struct TaskRunner {
    store: Arc<dyn RecordStore>,
    queue: Arc<dyn JobQueue>,
    config: EngineConfig,
    factory: Arc<dyn SessionFactory>,
    probe: Arc<dyn LivenessProbe>,
}

impl TaskRunner {
    pub fn new(
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
        config: EngineConfig,
        factory: Arc<dyn SessionFactory>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            factory,
            probe,
        }
    }

    /// Execute one task end to end.
    ///
    /// Returns a human-readable result line on success or skip; failures
    /// come back as errors so the queue records the job as failed.
    pub async fn run(&self, task_id: Uuid) -> Result<String> {
        let mut task = self
            .store
            .get_task(task_id)
            .await
            .context("loading the scheduled task")?;
        let job_id = task.job_id;
        if let Some(id) = job_id {
            self.queue.mark_started(id).await?;
        }

        task.start_time = Some(truncate_to_seconds(Utc::now()));
        task.status = TaskStatus::Running;
        self.store.save_task(&task).await?;

        let executor = TaskExecutor::new(
            task,
            self.store.clone(),
            self.queue.clone(),
            self.config.clone(),
            self.factory.clone(),
            self.probe.clone(),
        );
        let (task, outcome) = executor.execute().await;
        let result = self.finalize(task, outcome).await;

        if let Some(id) = job_id {
            self.queue.mark_finished(id).await?;
        }
        result
    }

    /// Write the terminal record and classify the outcome.
    async fn finalize(
        &self,
        mut task: ScheduledTask,
        outcome: Result<(), ExecutionError>,
    ) -> Result<String> {
        task.end_time = Some(truncate_to_seconds(Utc::now()));

        let result = match outcome {
            Ok(()) => {
                task.status = TaskStatus::Succeeded;
                task.confirmed = true;
                Ok(format!("{}/{}: Done", task.device.name, task.task_type))
            }
            Err(ExecutionError::Halted(halt)) if halt.is_skip() => {
                // Nothing destructive happened; no acknowledgement needed.
                task.confirmed = true;
                Ok(format!("Task was skipped. {}: {}", halt.reason, halt.message))
            }
            Err(ExecutionError::Halted(halt)) => Err(anyhow::Error::new(halt)),
            Err(ExecutionError::Internal(err)) => {
                tracing::error!("task {} failed with an unclassified error: {err:#}", task.id);
                task.status = TaskStatus::Failed;
                task.fail_reason = FailReason::FailUnknown;
                task.message = "Unknown Error".to_string();
                Err(err)
            }
        };

        self.store.save_task(&task).await?;
        self.add_summary(task).await;
        result
    }

    /// Append the batch summary and queue depth to the task log.
    async fn add_summary(&self, task: ScheduledTask) {
        let status = task.status;
        let scheduled_time = task.scheduled_time;
        let mut journal = TaskJournal::new(task, self.store.clone());

        journal
            .info(&format!("Task ended with status \"{status}\""))
            .await;

        if let Ok(counts) = self.store.status_counts_for_batch(scheduled_time).await {
            let total: u64 = counts.values().sum();
            let mut summary = format!("total {total}");
            for (status, count) in &counts {
                summary.push_str(&format!(" / {status} {count}"));
            }
            journal.info(&format!("Summary: {summary}")).await;
        }

        // This job is still counted as active while summarizing.
        match (
            self.queue.pending_count().await,
            self.queue.active_count().await,
        ) {
            (Ok(0), Ok(active)) if active <= 1 => {
                journal.info("All tasks have been completed.").await;
            }
            (Ok(0), Ok(_)) => {
                journal.info("No queued tasks were remained").await;
            }
            (Ok(pending), _) => {
                journal
                    .info(&format!("Remained task: {pending}. Taking the next one."))
                    .await;
            }
            _ => {}
        }
    }
}

fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::InMemoryJobQueue;
    use crate::record::InMemoryRecordStore;

    fn device() -> DeviceRef {
        DeviceRef {
            name: "edge-1".into(),
            model: "C2960X".into(),
            serial: "FOC1111".into(),
            mgmt_addr: Some("192.0.2.10".into()),
        }
    }

    fn spec() -> TaskSpec {
        TaskSpec {
            device: device(),
            task_type: TaskType::Upgrade,
            scheduled_time: Utc::now() + chrono::Duration::hours(1),
            mw_duration_hours: 2,
            user: "ops".into(),
        }
    }

    #[tokio::test]
    async fn schedule_persists_record_and_job() {
        let store = InMemoryRecordStore::new();
        let queue = InMemoryJobQueue::new();

        let task = schedule_task(&store, &queue, spec()).await.unwrap();
        assert_eq!(task.status, TaskStatus::Scheduled);
        let job_id = task.job_id.unwrap();

        let saved = store.get_task(task.id).await.unwrap();
        assert_eq!(saved.job_id, Some(job_id));

        let job = queue.fetch(job_id).await.unwrap().unwrap();
        assert_eq!(job.task_id, task.id);
        assert_eq!(job.run_at, Some(task.scheduled_time));
    }

    #[tokio::test]
    async fn cancel_removes_queued_task() {
        let store = InMemoryRecordStore::new();
        let queue = InMemoryJobQueue::new();
        let task = schedule_task(&store, &queue, spec()).await.unwrap();

        assert!(cancel_task(&store, &queue, task.id).await.unwrap());
        assert!(store.get_task(task.id).await.is_err());
        assert!(queue.fetch(task.job_id.unwrap()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cancel_refuses_started_task() {
        let store = InMemoryRecordStore::new();
        let queue = InMemoryJobQueue::new();
        let task = schedule_task(&store, &queue, spec()).await.unwrap();
        queue.mark_started(task.job_id.unwrap()).await.unwrap();

        assert!(!cancel_task(&store, &queue, task.id).await.unwrap());
        assert!(store.get_task(task.id).await.is_ok());
    }

    #[test]
    fn second_precision_timestamps() {
        let ts = truncate_to_seconds(Utc::now());
        assert_eq!(ts.nanosecond(), 0);
    }
}
