//! In-memory [`RecordStore`] used by tests and local runs.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::RecordStore;
use super::types::{GoldenImage, ScheduledTask, TaskStatus};

#[derive(Debug, Clone)]
struct DeviceRecord {
    model: String,
    version: Option<String>,
}

#[derive(Default)]
struct StoreInner {
    tasks: HashMap<Uuid, ScheduledTask>,
    golden_images: HashMap<String, GoldenImage>,
    devices: HashMap<String, DeviceRecord>,
}

/// Hash-map backed record store.
#[derive(Default)]
pub struct InMemoryRecordStore {
    inner: RwLock<StoreInner>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_task(&self, task: ScheduledTask) {
        self.inner.write().await.tasks.insert(task.id, task);
    }

    /// Golden images are keyed by upper-cased model so lookups are
    /// case-insensitive like the rest of the model handling.
    pub async fn insert_golden_image(&self, golden: GoldenImage) {
        self.inner
            .write()
            .await
            .golden_images
            .insert(golden.model.to_uppercase(), golden);
    }

    pub async fn insert_device(&self, name: &str, model: &str, version: Option<&str>) {
        self.inner.write().await.devices.insert(
            name.to_string(),
            DeviceRecord {
                model: model.to_string(),
                version: version.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn get_task(&self, id: Uuid) -> Result<ScheduledTask> {
        self.inner
            .read()
            .await
            .tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("no scheduled task with id {id}"))
    }

    async fn save_task(&self, task: &ScheduledTask) -> Result<()> {
        self.inner.write().await.tasks.insert(task.id, task.clone());
        Ok(())
    }

    async fn delete_task(&self, id: Uuid) -> Result<()> {
        self.inner.write().await.tasks.remove(&id);
        Ok(())
    }

    async fn count_unconfirmed_started(&self) -> Result<u64> {
        let inner = self.inner.read().await;
        Ok(inner
            .tasks
            .values()
            .filter(|t| !t.confirmed && t.start_time.is_some())
            .count() as u64)
    }

    async fn status_counts_for_batch(
        &self,
        scheduled_time: DateTime<Utc>,
    ) -> Result<BTreeMap<TaskStatus, u64>> {
        let inner = self.inner.read().await;
        let mut counts = BTreeMap::new();
        for task in inner.tasks.values() {
            if task.scheduled_time == scheduled_time {
                *counts.entry(task.status).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn golden_image(&self, model: &str) -> Result<Option<GoldenImage>> {
        Ok(self
            .inner
            .read()
            .await
            .golden_images
            .get(&model.to_uppercase())
            .cloned())
    }

    async fn device_version(&self, device: &str) -> Result<Option<String>> {
        Ok(self
            .inner
            .read()
            .await
            .devices
            .get(device)
            .and_then(|d| d.version.clone()))
    }

    async fn set_device_version(&self, device: &str, version: &str) -> Result<()> {
        let mut inner = self.inner.write().await;
        match inner.devices.get_mut(device) {
            Some(record) => record.version = Some(version.to_string()),
            None => {
                inner.devices.insert(
                    device.to_string(),
                    DeviceRecord {
                        model: String::new(),
                        version: Some(version.to_string()),
                    },
                );
            }
        }
        Ok(())
    }

    async fn count_devices_of_model(&self, model: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .await
            .devices
            .values()
            .filter(|d| d.model.eq_ignore_ascii_case(model))
            .count() as u64)
    }

    async fn count_devices_at_version(&self, model: &str, version: &str) -> Result<u64> {
        Ok(self
            .inner
            .read()
            .await
            .devices
            .values()
            .filter(|d| {
                d.model.eq_ignore_ascii_case(model) && d.version.as_deref() == Some(version)
            })
            .count() as u64)
    }
}
