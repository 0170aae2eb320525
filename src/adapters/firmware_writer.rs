//! Flash side of an OTA session.
//!
//! On ESP-IDF the image streams into the inactive app partition through
//! `esp-ota`, which validates the image header on finalize and switches
//! the boot partition on apply. The host build keeps the image in memory
//! and checks its length, which is enough to drive the controller in tests.

#[cfg(target_os = "espidf")]
use log::warn;
use log::{info, debug};

use crate::app::ports::FirmwareWriter;
use crate::sync::ota::OtaError;

pub struct OtaPartitionWriter {
    expected_size: u32,
    written: u32,
    #[cfg(target_os = "espidf")]
    update: Option<esp_ota::OtaUpdate>,
    #[cfg(target_os = "espidf")]
    completed: Option<esp_ota::CompletedOtaUpdate>,
    #[cfg(not(target_os = "espidf"))]
    image: Vec<u8>,
    #[cfg(not(target_os = "espidf"))]
    applied: bool,
}

impl OtaPartitionWriter {
    pub fn new() -> Self {
        Self {
            expected_size: 0,
            written: 0,
            #[cfg(target_os = "espidf")]
            update: None,
            #[cfg(target_os = "espidf")]
            completed: None,
            #[cfg(not(target_os = "espidf"))]
            image: Vec::new(),
            #[cfg(not(target_os = "espidf"))]
            applied: false,
        }
    }

    pub fn bytes_written(&self) -> u32 {
        self.written
    }

    /// Image received so far (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Whether the image was committed as the next boot target (simulation only).
    #[cfg(not(target_os = "espidf"))]
    pub fn is_applied(&self) -> bool {
        self.applied
    }
}

impl Default for OtaPartitionWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl FirmwareWriter for OtaPartitionWriter {
    fn begin(&mut self, size: u32) -> Result<(), OtaError> {
        self.abort();
        let update = esp_ota::OtaUpdate::begin().map_err(|e| {
            warn!("OTA: esp-ota begin failed: {:?}", e);
            OtaError::BeginFailed
        })?;
        self.update = Some(update);
        self.expected_size = size;
        self.written = 0;
        info!("OTA: partition opened for {} bytes", size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        let update = self.update.as_mut().ok_or(OtaError::WriteFailed)?;
        update.write(data).map_err(|e| {
            warn!("OTA: esp-ota write failed: {:?}", e);
            OtaError::WriteFailed
        })?;
        self.written += data.len() as u32;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), OtaError> {
        if self.written != self.expected_size {
            return Err(OtaError::FirmwareVerificationFailure);
        }
        let update = self.update.take().ok_or(OtaError::FirmwareVerificationFailure)?;
        let completed = update.finalize().map_err(|e| {
            warn!("OTA: esp-ota finalize failed: {:?}", e);
            OtaError::FirmwareVerificationFailure
        })?;
        self.completed = Some(completed);
        Ok(())
    }

    fn apply(&mut self) -> Result<(), OtaError> {
        let mut completed = self.completed.take().ok_or(OtaError::ApplyFailed)?;
        completed.set_as_boot_partition().map_err(|e| {
            warn!("OTA: set_as_boot_partition failed: {:?}", e);
            OtaError::ApplyFailed
        })?;
        info!("OTA: boot partition switched");
        Ok(())
    }

    fn abort(&mut self) {
        // esp-ota aborts the update when OtaUpdate is dropped.
        if self.update.take().is_some() || self.completed.take().is_some() {
            debug!("OTA: partition write aborted");
        }
        self.written = 0;
    }
}

#[cfg(not(target_os = "espidf"))]
impl FirmwareWriter for OtaPartitionWriter {
    fn begin(&mut self, size: u32) -> Result<(), OtaError> {
        self.image.clear();
        self.image.reserve(size as usize);
        self.expected_size = size;
        self.written = 0;
        self.applied = false;
        info!("OTA(sim): partition opened for {} bytes", size);
        Ok(())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), OtaError> {
        if self.written as usize + data.len() > self.expected_size as usize {
            return Err(OtaError::WriteFailed);
        }
        self.image.extend_from_slice(data);
        self.written += data.len() as u32;
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), OtaError> {
        if self.written == self.expected_size {
            Ok(())
        } else {
            Err(OtaError::FirmwareVerificationFailure)
        }
    }

    fn apply(&mut self) -> Result<(), OtaError> {
        self.applied = true;
        Ok(())
    }

    fn abort(&mut self) {
        debug!("OTA(sim): partition write aborted");
        self.image.clear();
        self.written = 0;
    }
}

// ── Boot validation ───────────────────────────────────────────

/// Mark the running image as good so the bootloader does not roll back.
#[cfg(target_os = "espidf")]
pub fn check_rollback() {
    match esp_ota::mark_app_valid() {
        Ok(()) => info!("OTA: firmware marked valid (rollback cancelled)"),
        Err(e) => warn!("OTA: mark_app_valid failed: {:?}", e),
    }
}

#[cfg(not(target_os = "espidf"))]
pub fn check_rollback() {
    info!("OTA rollback check (simulation): skipped");
}
