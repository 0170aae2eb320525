//! Inter-task queues.
//!
//! `embassy-sync` bounded channels decouple producers (handlers, reconciler,
//! telemetry, MQTT callback) from the single task that owns the broker
//! session. Both sides are non-blocking: producers use `try_send`, the
//! session loop drains with `try_receive`.
//!
//! ```text
//! ┌────────────┐  Outbound  ┌──────────────┐  Inbound  ┌───────────────┐
//! │ components │──────────▶│ session loop │◀──────────│ MQTT callback │
//! └────────────┘   Outbox   └──────────────┘   Inbox   └───────────────┘
//! ```
//!
//! The broker has already acknowledged anything the callback hands over,
//! so an overflowing [`Inbox`] counts what it drops and keeps the request
//! id of every shed RPC for a `{"error":"busy"}` reply.

use core::sync::atomic::{AtomicU32, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, TrySendError};
use log::warn;

use crate::app::commands::Inbound;
use crate::app::events::Outbound;
use crate::error::SyncError;

/// Depth of the outbound intent queue.
pub const OUTBOX_DEPTH: usize = 16;

/// Depth of the inbound message queue fed by the transport callback.
pub const INBOUND_DEPTH: usize = 16;

/// Shed RPC ids awaiting a busy reply.
pub const SHED_DEPTH: usize = 8;

/// Outbound intents: any task → session loop.
pub type Outbox = Channel<CriticalSectionRawMutex, Outbound, OUTBOX_DEPTH>;

/// Decoded inbound messages: transport callback → session loop.
pub type InboundQueue = Channel<CriticalSectionRawMutex, Inbound, INBOUND_DEPTH>;

/// Queue an intent without blocking.
pub fn enqueue(outbox: &Outbox, message: Outbound) -> Result<(), SyncError> {
    outbox.try_send(message).map_err(|_| SyncError::OutboxFull)
}

/// Inbound queue with overflow accounting.
pub struct Inbox {
    queue: InboundQueue,
    shed_rpcs: Channel<CriticalSectionRawMutex, u32, SHED_DEPTH>,
    dropped: AtomicU32,
}

impl Inbox {
    pub const fn new() -> Self {
        Self {
            queue: Channel::new(),
            shed_rpcs: Channel::new(),
            dropped: AtomicU32::new(0),
        }
    }

    /// Queue one message. Returns `false` when it was dropped.
    pub fn push(&self, message: Inbound) -> bool {
        let Err(TrySendError::Full(lost)) = self.queue.try_send(message) else {
            return true;
        };
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        match lost {
            Inbound::Rpc { request_id, .. } => {
                if self.shed_rpcs.try_send(request_id).is_err() {
                    warn!("INBOX: full, rpc {} dropped unanswered", request_id);
                } else {
                    warn!("INBOX: full, rpc {} shed", request_id);
                }
            }
            other => warn!("INBOX: full, dropped {} ({} total)", kind(&other), total),
        }
        false
    }

    pub fn pop(&self) -> Option<Inbound> {
        self.queue.try_receive().ok()
    }

    /// Next RPC that was shed and still owes a reply.
    pub fn take_shed_rpc(&self) -> Option<u32> {
        self.shed_rpcs.try_receive().ok()
    }

    /// Messages lost to overflow since boot.
    pub fn dropped(&self) -> u32 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for Inbox {
    fn default() -> Self {
        Self::new()
    }
}

fn kind(message: &Inbound) -> &'static str {
    match message {
        Inbound::Rpc { .. } => "rpc",
        Inbound::AttributeResponse { .. } => "attribute response",
        Inbound::SharedAttributes(_) => "shared attributes",
        Inbound::FirmwareChunk { .. } => "firmware chunk",
    }
}
