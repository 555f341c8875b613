//! In-memory [`JobQueue`] used by tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{JobInfo, JobQueue, JobState};

#[derive(Default)]
pub struct InMemoryJobQueue {
    jobs: Mutex<HashMap<Uuid, JobInfo>>,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    async fn insert(&self, task_id: Uuid, run_at: Option<DateTime<Utc>>) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().await.insert(
            id,
            JobInfo {
                id,
                task_id,
                run_at,
                state: JobState::Queued,
            },
        );
        id
    }
}

#[async_trait]
impl JobQueue for InMemoryJobQueue {
    async fn enqueue(&self, task_id: Uuid) -> Result<Uuid> {
        Ok(self.insert(task_id, None).await)
    }

    async fn enqueue_at(&self, run_at: DateTime<Utc>, task_id: Uuid) -> Result<Uuid> {
        Ok(self.insert(task_id, Some(run_at)).await)
    }

    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobInfo>> {
        Ok(self.jobs.lock().await.get(&job_id).cloned())
    }

    async fn delete(&self, job_id: Uuid) -> Result<bool> {
        let mut jobs = self.jobs.lock().await;
        match jobs.get(&job_id) {
            Some(job) if !job.is_started() => {
                jobs.remove(&job_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn pending_count(&self) -> Result<u64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.values().filter(|j| j.state == JobState::Queued).count() as u64)
    }

    async fn active_count(&self) -> Result<u64> {
        let jobs = self.jobs.lock().await;
        Ok(jobs.values().filter(|j| j.state == JobState::Started).count() as u64)
    }

    async fn mark_started(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.state = JobState::Started;
        }
        Ok(())
    }

    async fn mark_finished(&self, job_id: Uuid) -> Result<()> {
        let mut jobs = self.jobs.lock().await;
        if let Some(job) = jobs.get_mut(&job_id) {
            job.state = JobState::Finished;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delete_only_removes_jobs_that_have_not_started() {
        let queue = InMemoryJobQueue::new();
        let queued = queue.enqueue(Uuid::new_v4()).await.unwrap();
        let started = queue.enqueue(Uuid::new_v4()).await.unwrap();
        queue.mark_started(started).await.unwrap();

        assert!(queue.delete(queued).await.unwrap());
        assert!(!queue.delete(started).await.unwrap());
        assert!(!queue.delete(Uuid::new_v4()).await.unwrap());

        assert!(queue.fetch(queued).await.unwrap().is_none());
        assert!(queue.fetch(started).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn counts_track_job_state() {
        let queue = InMemoryJobQueue::new();
        let a = queue.enqueue_at(Utc::now(), Uuid::new_v4()).await.unwrap();
        let _b = queue.enqueue(Uuid::new_v4()).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 2);
        assert_eq!(queue.active_count().await.unwrap(), 0);

        queue.mark_started(a).await.unwrap();
        assert_eq!(queue.pending_count().await.unwrap(), 1);
        assert_eq!(queue.active_count().await.unwrap(), 1);

        queue.mark_finished(a).await.unwrap();
        assert_eq!(queue.active_count().await.unwrap(), 0);
    }
}
