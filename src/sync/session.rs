//! Transport processing loop.
//!
//! Each tick: route inbound messages, expire attribute requests, flush the
//! outbox while connected, then let the OTA controller check its chunk
//! deadline. The outbox is flushed before the OTA tick so that state
//! reports queued by a finishing session reach the broker before the
//! restart is signalled.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{debug, warn};

use crate::app::commands::Inbound;
use crate::app::context::NodeContext;
use crate::app::events::Outbound;
use crate::app::ports::{Clock, CloudTransport};
use crate::error::{Error, SyncError};
use crate::sync::attributes::apply_shared_attributes;
use crate::sync::channels::enqueue;
use crate::sync::lock;
use crate::sync::rpc::RpcFault;

/// Inbound messages handled per tick.
const INBOUND_BUDGET: usize = 16;

/// What one tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TickReport {
    pub routed: usize,
    pub expired: usize,
    pub sent: usize,
}

pub struct SessionLoop<T> {
    ctx: Arc<NodeContext>,
    transport: Arc<Mutex<T>>,
}

impl<T: CloudTransport> SessionLoop<T> {
    pub fn new(ctx: Arc<NodeContext>, transport: Arc<Mutex<T>>) -> Self {
        Self { ctx, transport }
    }

    pub fn tick(&mut self, now_ms: u64) -> TickReport {
        let mut report = TickReport::default();

        for _ in 0..INBOUND_BUDGET {
            // Released before routing so handlers never hold the transport.
            let next = lock(&self.transport).poll();
            let Some(message) = next else {
                break;
            };
            self.route(message);
            report.routed += 1;
        }

        report.expired = self.ctx.attributes().sweep(now_ms);
        report.sent = self.flush();
        self.ctx.ota().poll(now_ms, &self.ctx.outbox);
        report
    }

    pub fn run(mut self, clock: &impl Clock) -> ! {
        let period = Duration::from_millis(u64::from(self.ctx.config.cadence.session_poll_ms));
        loop {
            self.tick(clock.now_ms());
            std::thread::sleep(period);
        }
    }

    fn route(&self, message: Inbound) {
        let ctx = &self.ctx;
        match message {
            Inbound::Rpc {
                request_id,
                method,
                params,
            } => {
                let body = match ctx.rpc.call(&method, &params, &ctx.store) {
                    Ok(body) => body,
                    Err(fault) => {
                        if fault == RpcFault::UnknownMethod {
                            debug!("SESSION: {}", Error::Sync(SyncError::UnknownRpcMethod));
                        }
                        fault.into()
                    }
                };
                if let Err(e) = enqueue(&ctx.outbox, Outbound::RpcResponse { request_id, body }) {
                    warn!("SESSION: RPC {} response dropped: {}", request_id, e);
                }
            }
            Inbound::AttributeResponse {
                correlation_id,
                payload,
            } => {
                ctx.attributes().on_message(correlation_id, &payload);
            }
            Inbound::SharedAttributes(attrs) => apply_shared_attributes(ctx, &attrs),
            Inbound::FirmwareChunk {
                request_id,
                chunk,
                data,
            } => ctx.ota().on_chunk(request_id, chunk, &data, &ctx.outbox),
        }
    }

    /// Send queued intents while the transport is up. A failed send is
    /// logged and the intent dropped.
    fn flush(&self) -> usize {
        let mut transport = lock(&self.transport);
        let mut sent = 0;
        while transport.is_connected() {
            let Ok(message) = self.ctx.outbox.try_receive() else {
                break;
            };
            match transport.send(&message) {
                Ok(()) => sent += 1,
                Err(e) => warn!("SESSION: send failed, dropped: {}", e),
            }
        }
        sent
    }
}
