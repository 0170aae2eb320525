//! Device–cloud synchronisation engine.
//!
//! ```text
//!  ConnectionSupervisor ──connect/subscribe/initial pull──▶ CloudTransport
//!         │                                                    ▲   │
//!         ▼                                            send    │   │ poll
//!  AttributeSyncManager ◀──responses── SessionLoop ────────────┘   │
//!  RpcDispatcher        ◀──rpc──────── (routes inbound, drains ◀───┘
//!  OtaUpdateController  ◀──chunks───── the Outbox)
//!         │
//!         ▼ set_desired
//!  DeviceStateStore ──drain_changes──▶ ActuationReconciler ──ack──▶ Outbox
//!  TelemetryPublisher ─────────────────────────────────────────────▶ Outbox
//! ```
//!
//! Only the supervisor and the session loop touch the transport. Every other
//! component enqueues [`Outbound`](crate::app::events::Outbound) intents.

pub mod attributes;
pub mod channels;
pub mod ota;
pub mod reconciler;
pub mod rpc;
pub mod session;
pub mod supervisor;
pub mod telemetry;
pub mod version;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a shared collaborator, recovering from poisoning.
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
