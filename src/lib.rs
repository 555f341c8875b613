//! # swupgrade
//!
//! Workflow engine for firmware upgrades on remote network devices. A
//! scheduled task is pulled from a job queue, admitted against a set of
//! safety gates, and then driven over the device CLI: identity
//! validation, image staging with on-box digest verification, boot
//! configuration rewrite, reload, and post-reload checks.
//!
//! ## Architecture Overview
//!
//! - **[`record`]**: Task, device, and image records plus the seam to the
//!   external system of record
//! - **[`queue`]**: Job queue seam for scheduling and worker dispatch
//! - **[`admission`]**: Golden-image, maintenance-window, and
//!   failure-threshold gates
//! - **[`connection`]**: CLI sessions, liveness probes, and the
//!   SSH-then-Telnet fallback policy
//! - **[`executor`]**: The phase engine plus the exact CLI command
//!   surface and output parsers
//! - **[`worker`]**: Queue-facing entry point that classifies outcomes
//!   into the two-tier skip/fail taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use swupgrade::{EngineConfig, InMemoryJobQueue, InMemoryRecordStore, TaskRunner};
//! use swupgrade::connection::{ScriptedFactory, TcpProbe};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(InMemoryRecordStore::new());
//!     let queue = Arc::new(InMemoryJobQueue::new());
//!     let runner = TaskRunner::new(
//!         store,
//!         queue,
//!         EngineConfig::default(),
//!         Arc::new(ScriptedFactory::new()),
//!         Arc::new(TcpProbe),
//!     );
//!
//!     let outcome = runner.run(uuid::Uuid::new_v4()).await?;
//!     println!("{outcome}");
//!     Ok(())
//! }
//! ```

pub mod admission;
pub mod config;
pub mod connection;
pub mod error;
pub mod executor;
pub mod journal;
pub mod queue;
pub mod record;
pub mod worker;

pub use admission::AdmissionController;
pub use config::{
    AdmissionConfig, ConnectionConfig, DeviceCredentials, EngineConfig, ReloadConfig,
    TransferConfig,
};
pub use connection::{ConnectionManager, DeviceSession, SessionFactory, TcpProbe};
pub use error::{ExecutionError, HaltDisposition, TaskHalt};
pub use executor::{ExecutionPhase, TaskExecutor};
pub use journal::TaskJournal;
pub use queue::{InMemoryJobQueue, JobInfo, JobQueue, JobState};
pub use record::{
    DeviceRef, FailReason, GoldenImage, InMemoryRecordStore, RecordStore, ScheduledTask,
    SoftwareImage, TaskStatus, TaskType, TransferMethod, rollout_progress,
};
pub use worker::{TaskRunner, TaskSpec, cancel_task, schedule_task};

/// Install a `tracing` subscriber honoring `RUST_LOG`. Safe to call more
/// than once; later calls are no-ops.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}
