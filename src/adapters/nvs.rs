//! NVS (Non-Volatile Storage) config store.
//!
//! Implements [`ConfigPort`]: the whole [`NodeConfig`] is kept as one
//! postcard blob under `smarthome::nodecfg`. A missing blob loads the
//! build-time defaults. A blob that fails to decode or validate is
//! reported, never silently repaired.
//!
//! The simulation backend keeps the blob in memory.

use std::sync::Mutex;

use log::{info, warn};

use crate::app::ports::{ConfigError, ConfigPort};
use crate::config::NodeConfig;
use crate::sync::lock;

#[cfg(target_os = "espidf")]
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};

const CONFIG_NAMESPACE: &str = "smarthome";
const CONFIG_KEY: &str = "nodecfg";
const MAX_BLOB_SIZE: usize = 1024;

fn decode(blob: &[u8]) -> Result<NodeConfig, ConfigError> {
    let config: NodeConfig = postcard::from_bytes(blob).map_err(|_| ConfigError::Corrupted)?;
    config.validate().map_err(ConfigError::ValidationFailed)?;
    Ok(config)
}

fn encode(config: &NodeConfig) -> Result<Vec<u8>, ConfigError> {
    config.validate().map_err(ConfigError::ValidationFailed)?;
    let blob = postcard::to_allocvec(config).map_err(|_| ConfigError::IoError)?;
    if blob.len() > MAX_BLOB_SIZE {
        return Err(ConfigError::ValidationFailed("config blob too large"));
    }
    Ok(blob)
}

pub struct NvsConfigStore {
    #[cfg(target_os = "espidf")]
    nvs: Mutex<EspNvs<NvsDefault>>,
    #[cfg(not(target_os = "espidf"))]
    blob: Mutex<Option<Vec<u8>>>,
}

impl NvsConfigStore {
    #[cfg(target_os = "espidf")]
    pub fn new(partition: EspDefaultNvsPartition) -> Result<Self, ConfigError> {
        let nvs = EspNvs::new(partition, CONFIG_NAMESPACE, true).map_err(|e| {
            warn!("NVS: open '{}' failed: {}", CONFIG_NAMESPACE, e);
            ConfigError::IoError
        })?;
        info!("NVS: namespace '{}' opened", CONFIG_NAMESPACE);
        Ok(Self {
            nvs: Mutex::new(nvs),
        })
    }

    #[cfg(not(target_os = "espidf"))]
    pub fn new() -> Result<Self, ConfigError> {
        info!("NVS: simulation backend");
        Ok(Self {
            blob: Mutex::new(None),
        })
    }

    /// Simulation store preloaded with raw bytes.
    #[cfg(not(target_os = "espidf"))]
    pub fn with_blob(blob: Vec<u8>) -> Self {
        Self {
            blob: Mutex::new(Some(blob)),
        }
    }

    #[cfg(target_os = "espidf")]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        let nvs = lock(&self.nvs);
        let mut buf = [0u8; MAX_BLOB_SIZE];
        match nvs.get_blob(CONFIG_KEY, &mut buf) {
            Ok(found) => Ok(found.map(<[u8]>::to_vec)),
            Err(e) => {
                warn!("NVS: read '{}' failed: {}", CONFIG_KEY, e);
                Err(ConfigError::IoError)
            }
        }
    }

    #[cfg(target_os = "espidf")]
    fn write_blob(&self, blob: &[u8]) -> Result<(), ConfigError> {
        lock(&self.nvs).set_blob(CONFIG_KEY, blob).map_err(|e| {
            warn!("NVS: write '{}' failed: {}", CONFIG_KEY, e);
            ConfigError::IoError
        })
    }

    #[cfg(not(target_os = "espidf"))]
    fn read_blob(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        Ok(lock(&self.blob).clone())
    }

    #[cfg(not(target_os = "espidf"))]
    fn write_blob(&self, blob: &[u8]) -> Result<(), ConfigError> {
        *lock(&self.blob) = Some(blob.to_vec());
        Ok(())
    }
}

impl ConfigPort for NvsConfigStore {
    fn load(&self) -> Result<NodeConfig, ConfigError> {
        match self.read_blob()? {
            Some(blob) => {
                let config = decode(&blob)?;
                info!("NVS: config loaded ({} bytes)", blob.len());
                Ok(config)
            }
            None => {
                info!("NVS: no stored config, using defaults");
                Ok(NodeConfig::default())
            }
        }
    }

    fn save(&self, config: &NodeConfig) -> Result<(), ConfigError> {
        let blob = encode(config)?;
        self.write_blob(&blob)?;
        info!("NVS: config saved ({} bytes)", blob.len());
        Ok(())
    }
}
