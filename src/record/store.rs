//! Persistence seam towards the system of record.
//!
//! Storage itself lives outside this crate. The engine only needs the
//! operations below; production deployments implement them against their
//! own inventory database, tests use [`InMemoryRecordStore`].
//!
//! [`InMemoryRecordStore`]: super::InMemoryRecordStore

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::types::{GoldenImage, ScheduledTask, TaskStatus};

/// External record store the engine reads and writes through.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_task(&self, id: Uuid) -> Result<ScheduledTask>;

    /// Upsert by task id. Called once per journal line, so implementations
    /// should make this cheap.
    async fn save_task(&self, task: &ScheduledTask) -> Result<()>;

    async fn delete_task(&self, id: Uuid) -> Result<()>;

    /// Started-but-unconfirmed tasks, the circuit breaker input. Counts
    /// every unconfirmed record with a start time regardless of age.
    async fn count_unconfirmed_started(&self) -> Result<u64>;

    /// Status histogram over all tasks sharing one scheduled time.
    async fn status_counts_for_batch(
        &self,
        scheduled_time: DateTime<Utc>,
    ) -> Result<BTreeMap<TaskStatus, u64>>;

    /// Golden image registered for a device model, if any.
    async fn golden_image(&self, model: &str) -> Result<Option<GoldenImage>>;

    /// Last observed firmware version of a device.
    async fn device_version(&self, device: &str) -> Result<Option<String>>;

    /// Record the firmware version observed on a device.
    async fn set_device_version(&self, device: &str, version: &str) -> Result<()>;

    async fn count_devices_of_model(&self, model: &str) -> Result<u64>;

    async fn count_devices_at_version(&self, model: &str, version: &str) -> Result<u64>;
}

/// Percentage of a model's fleet already running the golden version,
/// rounded to two decimal places. A fleet of zero devices is 0 percent.
pub async fn rollout_progress(store: &dyn RecordStore, golden: &GoldenImage) -> Result<f64> {
    let total = store.count_devices_of_model(&golden.model).await?;
    if total == 0 {
        return Ok(0.0);
    }
    let upgraded = store
        .count_devices_at_version(&golden.model, &golden.image.version)
        .await?;
    let pct = upgraded as f64 / total as f64 * 100.0;
    Ok((pct * 100.0).round() / 100.0)
}
