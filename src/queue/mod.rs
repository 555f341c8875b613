//! Job queue seam.
//!
//! Tasks run through an external job queue. The engine only schedules,
//! inspects, and deletes jobs through [`JobQueue`]; dispatching queued jobs
//! to workers is the queue's business.

pub mod memory;

pub use memory::InMemoryJobQueue;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Started,
    Finished,
}

#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: Uuid,
    pub task_id: Uuid,
    /// Earliest time the queue may hand the job to a worker. `None` means
    /// immediately.
    pub run_at: Option<DateTime<Utc>>,
    pub state: JobState,
}

impl JobInfo {
    pub fn is_started(&self) -> bool {
        self.state != JobState::Queued
    }
}

#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Enqueue for immediate execution, returning the job id.
    async fn enqueue(&self, task_id: Uuid) -> Result<Uuid>;

    /// Enqueue for execution at `run_at`, returning the job id.
    async fn enqueue_at(&self, run_at: DateTime<Utc>, task_id: Uuid) -> Result<Uuid>;

    async fn fetch(&self, job_id: Uuid) -> Result<Option<JobInfo>>;

    /// Remove a job that has not started yet. Returns `false` if the job
    /// already started or does not exist; started jobs are never removed.
    async fn delete(&self, job_id: Uuid) -> Result<bool>;

    /// Jobs waiting to run.
    async fn pending_count(&self) -> Result<u64>;

    /// Jobs currently executing on a worker.
    async fn active_count(&self) -> Result<u64>;

    async fn mark_started(&self, job_id: Uuid) -> Result<()>;

    async fn mark_finished(&self, job_id: Uuid) -> Result<()>;
}
