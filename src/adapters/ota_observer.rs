//! Device-side reactions to OTA session events.

use log::{info, warn};

use crate::app::ports::OtaObserver;
use crate::sync::ota::{OtaError, OtaStage};

/// Logs progress every `log_every` chunks and restarts into the new image
/// on success.
pub struct RestartingObserver {
    log_every: u32,
}

impl RestartingObserver {
    pub fn new(log_every: u32) -> Self {
        Self {
            log_every: log_every.max(1),
        }
    }
}

impl OtaObserver for RestartingObserver {
    fn on_progress(&mut self, received: u32, total: u32) {
        if received == total || received % self.log_every == 0 {
            info!("OTA: {}/{} chunks", received, total);
        }
    }

    fn on_failure(&mut self, stage: OtaStage, error: OtaError) {
        warn!("OTA: session failed in {:?}: {}", stage, error);
    }

    #[cfg(target_os = "espidf")]
    fn on_success(&mut self) {
        info!("OTA: rebooting into new firmware");
        esp_ota::restart();
    }

    #[cfg(not(target_os = "espidf"))]
    fn on_success(&mut self) {
        info!("OTA(sim): restart requested");
    }
}
