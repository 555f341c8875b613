//! The task execution engine.
//!
//! One [`TaskExecutor`] drives one scheduled task through a linear phase
//! sequence: admission, reachability, device validation, then the
//! type-specific action (upload or upgrade with its post-reload checks).
//! Each step either completes or raises a single classified halt through
//! the journal.

use std::sync::Arc;

use crate::admission::AdmissionController;
use crate::config::EngineConfig;
use crate::connection::{
    ConnectionManager, DeviceSession, LivenessProbe, SessionError, SessionFactory, any_failed,
    combined_text,
};
use crate::error::ExecutionError;
use crate::journal::TaskJournal;
use crate::queue::JobQueue;
use crate::record::{FailReason, GoldenImage, RecordStore, ScheduledTask, SoftwareImage, TaskType};

use super::{commands, parse};

/// How far a task got. Phases only ever advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExecutionPhase {
    Init,
    Admitted,
    ReachabilityVerified,
    DeviceValidated,
    ActionComplete,
    PostChecked,
}

impl std::fmt::Display for ExecutionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExecutionPhase::Init => "init",
            ExecutionPhase::Admitted => "admitted",
            ExecutionPhase::ReachabilityVerified => "reachability-verified",
            ExecutionPhase::DeviceValidated => "device-validated",
            ExecutionPhase::ActionComplete => "action-complete",
            ExecutionPhase::PostChecked => "post-checked",
        };
        write!(f, "{s}")
    }
}

/// Facts established during device validation, consumed by the action
/// steps.
#[derive(Debug, Clone)]
struct ValidatedDevice {
    file_system: String,
    total_free: u64,
    image_present: bool,
    image: SoftwareImage,
}

/// Truncation applied when dumping large command outputs to the journal.
const OUTPUT_TAIL: usize = 200;

pub struct TaskExecutor {
    journal: TaskJournal,
    store: Arc<dyn RecordStore>,
    admission: AdmissionController,
    config: EngineConfig,
    factory: Arc<dyn SessionFactory>,
    probe: Arc<dyn LivenessProbe>,
    phase: ExecutionPhase,
}

impl TaskExecutor {
    pub fn new(
        task: ScheduledTask,
        store: Arc<dyn RecordStore>,
        queue: Arc<dyn JobQueue>,
        config: EngineConfig,
        factory: Arc<dyn SessionFactory>,
        probe: Arc<dyn LivenessProbe>,
    ) -> Self {
        let admission =
            AdmissionController::new(store.clone(), queue, config.admission.clone());
        let journal = TaskJournal::new(task, store.clone());
        Self {
            journal,
            store,
            admission,
            config,
            factory,
            probe,
            phase: ExecutionPhase::Init,
        }
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    /// Run the task to completion or to its first halt. Returns the final
    /// task record together with the outcome; terminal status fields are
    /// already written for halts, the caller finalizes the success path.
    pub async fn execute(mut self) -> (ScheduledTask, Result<(), ExecutionError>) {
        let result = self.run().await;
        (self.journal.into_task(), result)
    }

    async fn run(&mut self) -> Result<(), ExecutionError> {
        let task_type = self.journal.task().task_type;
        self.journal
            .info(&format!("New job was started. Type: {task_type}"))
            .await;

        let connection = self.init().await?;

        self.journal.info("Initial task checking...").await;
        let golden = self.admission.check(&mut self.journal).await?;
        self.advance(ExecutionPhase::Admitted).await;
        self.journal.info("Initial task check has been completed").await;

        self.journal.info("Checking if the device is alive...").await;
        if !connection.is_alive(&mut self.journal).await {
            let msg = format!(
                "Device {}:{} is not reachable",
                self.journal.task().device.name,
                connection.host()
            );
            self.journal.warning(&msg).await;
            return Err(self.journal.skip(&msg, FailReason::FailConnect).await);
        }
        self.advance(ExecutionPhase::ReachabilityVerified).await;
        self.journal.info("The device is alive").await;

        self.journal.info("Device validation...").await;
        let validated = self.check_device(&connection, golden).await?;
        self.advance(ExecutionPhase::DeviceValidated).await;
        self.journal.info("The device has been validated").await;

        match task_type {
            TaskType::Upload => {
                self.journal.info("Uploading the image on the box...").await;
                self.file_upload(&connection, &validated).await?;
                self.advance(ExecutionPhase::ActionComplete).await;
            }
            TaskType::Upgrade => {
                self.journal.info("Upgrading the box...").await;
                self.device_reload(&connection, &validated).await?;
                self.advance(ExecutionPhase::ActionComplete).await;
                self.await_reload(&connection).await?;
                self.journal.info("Checks after the reload").await;
                self.post_check(&connection).await?;
                self.advance(ExecutionPhase::PostChecked).await;
            }
        }
        Ok(())
    }

    async fn advance(&mut self, phase: ExecutionPhase) {
        self.phase = phase;
        self.journal
            .debug(&format!("Execution phase: {phase}"))
            .await;
    }

    /// Builds the connection manager. A device without a management
    /// address can not be worked on at all.
    async fn init(&mut self) -> Result<ConnectionManager, ExecutionError> {
        let Some(host) = self.journal.task().device.mgmt_addr.clone() else {
            let msg = "Device has no management address";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailCheck).await);
        };
        Ok(ConnectionManager::new(
            host,
            self.config.connection.clone(),
            self.config.device.clone(),
            self.factory.clone(),
            self.probe.clone(),
        ))
    }

    /// Collect `show version` and `dir /all`, compare identity against the
    /// inventory, and locate the target image on the file system.
    async fn check_device(
        &mut self,
        connection: &ConnectionManager,
        golden: GoldenImage,
    ) -> Result<ValidatedDevice, ExecutionError> {
        let ops_timeout = self.config.connection.ops_timeout();
        let Some(mut cli) = connection.connect(&mut self.journal, ops_timeout).await else {
            let msg = "Can not connect to the device CLI";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConnect).await);
        };

        let outputs = match cli
            .send_commands(&[commands::SHOW_VERSION, commands::DIR_ALL])
            .await
        {
            Ok(outputs) if !any_failed(&outputs) => outputs,
            _ => {
                cli.close().await;
                let msg = "Can not collect outputs from the device";
                self.journal.error(msg).await;
                return Err(self.journal.skip(msg, FailReason::FailConfig).await);
            }
        };
        cli.close().await;

        self.journal.debug("----------vv Outputs vv----------").await;
        self.journal.debug(&combined_text(&outputs)).await;
        self.journal.debug("----------^^ Outputs ^^----------").await;

        let version_out = outputs[0].result.clone();
        let dir_out = outputs[1].result.clone();

        let Some(pid) = parse::product_id(&version_out) else {
            let msg = "Can not get the device PID";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConfig).await);
        };
        self.journal.info(&format!("PID: {pid}")).await;

        let Some(serial) = parse::serial_number(&version_out) else {
            let msg = "Can not get the device SN";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConfig).await);
        };
        self.journal.info(&format!("SN: {serial}")).await;

        let device = self.journal.task().device.clone();
        if !pid.eq_ignore_ascii_case(&device.model)
            || !serial.eq_ignore_ascii_case(&device.serial)
        {
            let msg = "Device PID/SN does not match the inventory data";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConfig).await);
        }
        self.journal
            .info(&format!("Device {pid}/{serial} matches the inventory data"))
            .await;

        let Some(listing) = parse::directory_listing(&dir_out) else {
            let msg = "Can not parse the file system listing";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConfig).await);
        };
        let image_present = listing.contains(&golden.image.filename);
        self.journal
            .debug(&format!("File system: {}", listing.file_system))
            .await;
        self.journal
            .debug(&format!("Target image: {}", golden.image.filename))
            .await;
        self.journal
            .debug(&format!("Target image on the box: {image_present}"))
            .await;

        Ok(ValidatedDevice {
            file_system: listing.file_system,
            total_free: listing.total_free,
            image_present,
            image: golden.image,
        })
    }

    /// Stage the image over FTP if it is missing, then verify its digest
    /// on the box. Pre-destructive from start to finish.
    async fn file_upload(
        &mut self,
        connection: &ConnectionManager,
        device: &ValidatedDevice,
    ) -> Result<(), ExecutionError> {
        let transfer_timeout = self.config.connection.transfer_ops_timeout();
        let Some(mut cli) = connection.connect(&mut self.journal, transfer_timeout).await else {
            let msg = "Unable to connect to the device";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConnect).await);
        };

        if !device.image_present {
            self.journal.info("No image on the device. Need to transfer").await;

            // 10 percent headroom over the image size.
            let required = (device.image.size_bytes as f64 * 1.1) as u64;
            self.journal
                .debug(&format!(
                    "Free on {}: {}. Required: {required}",
                    device.file_system, device.total_free
                ))
                .await;
            if device.total_free < required {
                cli.close().await;
                let msg = format!("No enough space on {}", device.file_system);
                self.journal.error(&msg).await;
                return Err(self.journal.skip(&msg, FailReason::FailUpload).await);
            }

            self.journal.info("Downloading the image from FTP...").await;
            match cli.send_configs(&commands::transfer_prep()).await {
                Ok(out) if !out.failed => {
                    self.journal
                        .debug(&format!("Preparing for the copy:\n{}", out.result))
                        .await;
                }
                _ => {
                    cli.close().await;
                    let msg = "Can not change the configuration";
                    self.journal.error(msg).await;
                    return Err(self.journal.skip(msg, FailReason::FailUpload).await);
                }
            }

            // The copy command carries FTP credentials, so it is never
            // written to the journal.
            let copy_cmd =
                commands::copy_ftp(&self.config.transfer, &device.file_system, &device.image.filename);
            let mut copied = false;
            if let Ok(out) = cli.send_command(&copy_cmd).await {
                if !out.failed {
                    self.journal
                        .debug(&format!(
                            "Copying process:\n{}",
                            parse::tail(&out.result, OUTPUT_TAIL)
                        ))
                        .await;
                    copied = out.result.contains("OK");
                }
            }
            if !copied {
                cli.close().await;
                let msg = "Can not download the image from FTP";
                self.journal.error(msg).await;
                return Err(self.journal.skip(msg, FailReason::FailUpload).await);
            }

            match cli.send_configs(&commands::transfer_rollback()).await {
                Ok(out) if !out.failed => {
                    self.journal
                        .debug(&format!("Rollback configuration:\n{}", out.result))
                        .await;
                }
                _ => {
                    cli.close().await;
                    let msg = "Can not roll back the configuration";
                    self.journal.error(msg).await;
                    return Err(self.journal.skip(msg, FailReason::FailUpload).await);
                }
            }
        } else {
            self.journal
                .info(&format!("Image {} already exists on the box", device.image.filename))
                .await;
        }

        self.journal.info("Verifying the image checksum...").await;
        self.verify_image(cli.as_mut(), device).await?;
        cli.close().await;
        self.journal.info("The image was uploaded and verified").await;
        Ok(())
    }

    /// On-box digest check. The device must report the `Verified` marker
    /// and the digest must equal the catalog digest byte for byte.
    async fn verify_image(
        &mut self,
        cli: &mut dyn DeviceSession,
        device: &ValidatedDevice,
    ) -> Result<(), ExecutionError> {
        cli.set_ops_timeout(self.config.connection.verify_ops_timeout());
        let cmd = commands::verify_md5(
            &device.file_system,
            &device.image.filename,
            &device.image.md5sum,
        );
        let output = match cli.send_command(&cmd).await {
            Ok(out) if !out.failed => out,
            _ => {
                cli.close().await;
                let msg = "Can not verify the MD5 checksum";
                self.journal.error(msg).await;
                return Err(self.journal.skip(msg, FailReason::FailCheck).await);
            }
        };
        cli.set_ops_timeout(self.config.connection.ops_timeout());

        self.journal
            .debug(&format!(
                "Verification result:\n{}",
                parse::tail(&output.result, OUTPUT_TAIL)
            ))
            .await;
        if parse::verified_digest(&output.result).as_deref()
            != Some(device.image.md5sum.as_str())
        {
            cli.close().await;
            let msg = "Wrong MD5 checksum";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailCheck).await);
        }
        self.journal.info("MD5 checksum was verified").await;
        Ok(())
    }

    /// Rewrite the boot configuration to the target image and request a
    /// reload. The boot rewrite is the first destructive step; from there
    /// on, halts are failures.
    async fn device_reload(
        &mut self,
        connection: &ConnectionManager,
        device: &ValidatedDevice,
    ) -> Result<(), ExecutionError> {
        let ops_timeout = self.config.connection.ops_timeout();
        let Some(mut cli) = connection.connect(&mut self.journal, ops_timeout).await else {
            let msg = "Unable to connect to the device";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailConnect).await);
        };

        let outputs = match cli
            .send_commands(&[commands::SHOW_BOOT_SYSTEM, commands::SHOW_VERSION])
            .await
        {
            Ok(outputs) if !any_failed(&outputs) => outputs,
            _ => {
                cli.close().await;
                let msg = "Can not collect outputs for the upgrade";
                self.journal.error(msg).await;
                return Err(self.journal.skip(msg, FailReason::FailUpgrade).await);
            }
        };

        let current = parse::os_version(&outputs[1].result).unwrap_or_else(|| "N/A".to_string());
        self.journal
            .debug(&format!(
                "Current version: {current}. Target version: {}",
                device.image.version
            ))
            .await;

        if current.eq_ignore_ascii_case(&device.image.version) {
            cli.close().await;
            let msg = format!(
                "Current version {current} already matches the target {}",
                device.image.version
            );
            self.journal.warning(&msg).await;
            self.journal.info("Updating the recorded device version").await;
            let name = self.journal.task().device.name.clone();
            self.store.set_device_version(&name, &current).await?;
            return Err(self.journal.skip(&msg, FailReason::FailUpgrade).await);
        }

        if !device.image_present {
            cli.close().await;
            let msg = "No target image on the box";
            self.journal.error(msg).await;
            return Err(self.journal.skip(msg, FailReason::FailUpgrade).await);
        }
        self.journal.info("The target image exists on the box").await;

        self.verify_image(cli.as_mut(), device).await?;

        self.journal.info("Preparing the boot system configuration").await;
        let old_boot = parse::boot_lines(&outputs[0].result);
        self.journal
            .debug(&format!("Current boot lines:\n{}", old_boot.join("\n")))
            .await;

        let mut new_boot: Vec<String> = old_boot.iter().map(|l| commands::negate(l)).collect();
        new_boot.push(commands::boot_system(&device.file_system, &device.image.filename));
        if let Some(previous) = old_boot.first() {
            // The previous image stays as a fallback boot entry.
            new_boot.push(previous.clone());
        }
        self.journal
            .debug(&format!("New boot lines:\n{}", new_boot.join("\n")))
            .await;

        match cli.send_configs(&new_boot).await {
            Ok(out) if !out.failed => {
                self.journal
                    .debug(&format!("Changing boot variables:\n{}", out.result))
                    .await;
            }
            _ => {
                cli.close().await;
                let msg = "Unable to change the bootvar";
                self.journal.error(msg).await;
                return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
            }
        }
        self.journal.info("Boot variables were changed").await;

        self.journal.info("Writing memory before the reload").await;
        self.write_memory(cli.as_mut()).await?;

        self.journal.info("Reloading the box...").await;
        match cli.send_interactive(&commands::reload_interactive()).await {
            Ok(_) => self.journal.info("The reload was requested").await,
            Err(_) => {
                cli.close().await;
                let msg = "Unable to request the reload";
                self.journal.error(msg).await;
                return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
            }
        }
        cli.close().await;
        Ok(())
    }

    /// Persist the running configuration. Some platforms answer with an
    /// interactive confirmation prompt instead, which surfaces as a
    /// timeout or a dropped session; those get the interactive retry.
    async fn write_memory(&mut self, cli: &mut dyn DeviceSession) -> Result<(), ExecutionError> {
        let output = match cli.send_command(commands::WRITE_MEMORY).await {
            Ok(out) => out,
            Err(SessionError::Timeout(_)) | Err(SessionError::ConnectionClosed(_)) => {
                self.journal.info("An interactive prompt was detected").await;
                tokio::time::sleep(self.config.connection.probe_settle()).await;
                if cli.reopen().await.is_err() {
                    let msg = "Unable to write memory: the session was lost";
                    self.journal.error(msg).await;
                    return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
                }
                match cli.send_interactive(&commands::write_memory_interactive()).await {
                    Ok(out) => out,
                    Err(_) => {
                        let msg = "Unable to write memory: session timeout";
                        self.journal.error(msg).await;
                        return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
                    }
                }
            }
            Err(_) => {
                let msg = "Unable to write memory";
                self.journal.error(msg).await;
                return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
            }
        };
        if output.failed || !output.result.contains("[OK]") {
            let msg = "Can not save the configuration";
            self.journal.error(msg).await;
            return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
        }
        self.journal.info("The configuration was saved").await;
        Ok(())
    }

    /// Blind hold, then a bounded number of reachability probes. The probe
    /// loop stops at the first success and never probes more than the
    /// configured attempt count.
    async fn await_reload(&mut self, connection: &ConnectionManager) -> Result<(), ExecutionError> {
        let hold = self.config.reload.hold();
        self.journal
            .info(&format!("Holding for {} seconds while the device reloads", hold.as_secs()))
            .await;
        tokio::time::sleep(hold).await;

        let attempts = self.config.reload.max_probe_attempts;
        let interval = self.config.reload.probe_interval();
        let mut online = false;
        for attempt in 1..=attempts {
            self.journal
                .info(&format!("Connecting after the reload, attempt {attempt}/{attempts}..."))
                .await;
            if connection.is_alive(&mut self.journal).await {
                self.journal.info("The device is online").await;
                tokio::time::sleep(self.config.reload.post_online_settle()).await;
                online = true;
                break;
            }
            self.journal
                .info(&format!(
                    "The device is not online yet, next try in {} seconds",
                    interval.as_secs()
                ))
                .await;
            tokio::time::sleep(interval).await;
        }

        if !online {
            let msg = "Device was lost after the reload";
            self.journal.error(msg).await;
            return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
        }
        Ok(())
    }

    /// Re-read the version after the reload, save the configuration, and
    /// record the observed version.
    async fn post_check(&mut self, connection: &ConnectionManager) -> Result<(), ExecutionError> {
        let ops_timeout = self.config.connection.ops_timeout();
        let Some(mut cli) = connection.connect(&mut self.journal, ops_timeout).await else {
            let msg = "Unable to connect to the device after the reload";
            self.journal.error(msg).await;
            return Err(self.journal.fail(msg, FailReason::FailConnect).await);
        };

        let output = match cli.send_command(commands::SHOW_VERSION).await {
            Ok(out) if !out.failed => out,
            _ => {
                cli.close().await;
                let msg = "Can not collect outputs for the post-check";
                self.journal.error(msg).await;
                return Err(self.journal.fail(msg, FailReason::FailUpgrade).await);
            }
        };
        let version = parse::os_version(&output.result).unwrap_or_else(|| "N/A".to_string());
        self.journal.info(&format!("New version: {version}")).await;

        self.journal.info("Writing memory after the reload").await;
        self.write_memory(cli.as_mut()).await?;
        cli.close().await;

        self.journal.info("Updating the recorded device version").await;
        let name = self.journal.task().device.name.clone();
        self.store.set_device_version(&name, &version).await?;
        self.journal.info("Post-checks have been done").await;
        Ok(())
    }
}
