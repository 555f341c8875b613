//! Task, device, and image records plus the persistence seam.

pub mod memory;
pub mod store;
pub mod types;

pub use memory::InMemoryRecordStore;
pub use store::{RecordStore, rollout_progress};
pub use types::{
    DeviceRef, FailReason, GoldenImage, ScheduledTask, SoftwareImage, TaskStatus, TaskType,
    TransferMethod,
};
