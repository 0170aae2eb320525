//! Application context.
//!
//! Everything the sync tasks share is built once at startup into a
//! [`NodeContext`] and handed to each task as an `Arc`. There are no
//! module-level singletons; tests build their own context around mocks.

use core::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::app::ports::{FirmwareWriter, OtaObserver};
use crate::config::NodeConfig;
use crate::state::DeviceStateStore;
use crate::sync::attributes::AttributeSyncManager;
use crate::sync::channels::Outbox;
use crate::sync::lock;
use crate::sync::ota::OtaUpdateController;
use crate::sync::rpc::RpcDispatcher;

/// Broker session flags shared between the supervisor and the other tasks.
#[derive(Default)]
pub struct SessionFlags {
    connected: AtomicBool,
    established: AtomicBool,
    firmware_info_sent: AtomicBool,
}

impl SessionFlags {
    /// Transport-level connection is up.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Connected and the startup sequence completed.
    pub fn is_established(&self) -> bool {
        self.established.load(Ordering::Acquire)
    }

    pub fn firmware_info_sent(&self) -> bool {
        self.firmware_info_sent.load(Ordering::Acquire)
    }

    pub(crate) fn set_connected(&self, up: bool) {
        self.connected.store(up, Ordering::Release);
        if !up {
            self.established.store(false, Ordering::Release);
        }
    }

    pub(crate) fn set_established(&self, done: bool) {
        self.established.store(done, Ordering::Release);
    }

    pub(crate) fn mark_firmware_info_sent(&self) {
        self.firmware_info_sent.store(true, Ordering::Release);
    }
}

/// Shared state of the synchronisation engine.
pub struct NodeContext {
    pub config: NodeConfig,
    pub store: DeviceStateStore,
    pub outbox: Outbox,
    pub rpc: RpcDispatcher,
    pub session: SessionFlags,
    attributes: Mutex<AttributeSyncManager>,
    ota: Mutex<OtaUpdateController>,
}

impl NodeContext {
    pub fn new(
        config: NodeConfig,
        writer: Box<dyn FirmwareWriter + Send>,
        observer: Box<dyn OtaObserver + Send>,
    ) -> Self {
        let attributes = AttributeSyncManager::new(config.request_timeout_ms);
        let rpc = RpcDispatcher::new(&config.capabilities);
        let ota = OtaUpdateController::new(&config.firmware, writer, observer);
        Self {
            config,
            store: DeviceStateStore::new(),
            outbox: Outbox::new(),
            rpc,
            session: SessionFlags::default(),
            attributes: Mutex::new(attributes),
            ota: Mutex::new(ota),
        }
    }

    /// Lock the attribute manager. Lock order: transport, attributes, OTA.
    pub fn attributes(&self) -> MutexGuard<'_, AttributeSyncManager> {
        lock(&self.attributes)
    }

    /// Lock the OTA controller.
    pub fn ota(&self) -> MutexGuard<'_, OtaUpdateController> {
        lock(&self.ota)
    }
}
