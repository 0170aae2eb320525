//! Over-the-air firmware update session controller.
//!
//! ```text
//! Idle ─▶ Checking ─▶ Downloading ─▶ Verifying ─▶ Applying ─▶ Rebooting
//!            │             │             │            │
//!            └─────────────┴──── Failed ─┴────────────┘ ─▶ Idle
//! ```
//!
//! A session starts when a shared-attribute push advertises firmware with
//! this device's title and a strictly newer version. The image is pulled in
//! fixed-size chunks; a chunk that arrives malformed or not at all within
//! the chunk timeout costs one retry and is re-requested. The retry budget
//! refills after every good chunk. Exhausting it fails the session.
//!
//! Flash writes and image validation belong to the [`FirmwareWriter`];
//! restarting belongs to the [`OtaObserver`].

use core::fmt;
use log::{debug, info, warn};

use crate::app::events::{AttributeMap, Outbound};
use crate::app::ports::{FirmwareWriter, OtaObserver};
use crate::config::FirmwareConfig;
use crate::sync::channels::{Outbox, enqueue};
use crate::sync::version;

const MAX_FIRMWARE_SIZE: u32 = 4 * 1024 * 1024; // 4 MB

/// Shared-attribute keys that make up a firmware advertisement.
pub const FW_TITLE_KEY: &str = "fw_title";
pub const FW_VERSION_KEY: &str = "fw_version";
pub const FW_SIZE_KEY: &str = "fw_size";
pub const FW_CHECKSUM_KEY: &str = "fw_checksum";
pub const FW_CHECKSUM_ALGORITHM_KEY: &str = "fw_checksum_algorithm";

// ── Error type ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaError {
    /// Advertised size missing, zero, or larger than the partition.
    InvalidSize,
    /// The writer could not open an update partition.
    BeginFailed,
    /// A chunk exhausted its retry budget.
    ChunkTransferFailure,
    /// Flash write failed.
    WriteFailed,
    /// Checksum mismatch or image rejected by the writer.
    FirmwareVerificationFailure,
    /// The image could not be made the boot target.
    ApplyFailed,
}

impl fmt::Display for OtaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidSize => write!(f, "firmware size missing or out of range (max 4 MB)"),
            Self::BeginFailed => write!(f, "OTA begin failed"),
            Self::ChunkTransferFailure => write!(f, "chunk retry budget exhausted"),
            Self::WriteFailed => write!(f, "OTA write failed"),
            Self::FirmwareVerificationFailure => write!(f, "firmware verification failed"),
            Self::ApplyFailed => write!(f, "set boot partition failed"),
        }
    }
}

/// Session phase at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaStage {
    Checking,
    Downloading,
    Verifying,
    Applying,
}

/// Why an advertisement did not start a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfferRejected {
    AlreadyInProgress,
    TitleMismatch,
    NotNewer,
}

// ── State machine ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtaState {
    Idle,
    Checking,
    Downloading,
    Verifying,
    Applying,
    Rebooting,
    /// Transient; the controller passes through it back to `Idle`.
    Failed,
}

/// Firmware advertised through shared attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareAdvert {
    pub title: String,
    pub version: String,
    pub size: Option<u32>,
    pub checksum: Option<String>,
    pub checksum_algorithm: Option<String>,
}

impl FirmwareAdvert {
    /// Extract an advertisement from a shared-attribute map. Needs both
    /// `fw_title` and `fw_version` as strings.
    pub fn from_attributes(map: &AttributeMap) -> Option<Self> {
        let title = map.get(FW_TITLE_KEY)?.as_str()?;
        let version = map.get(FW_VERSION_KEY)?.as_str()?;
        let size = map
            .get(FW_SIZE_KEY)
            .and_then(serde_json::Value::as_u64)
            .and_then(|s| u32::try_from(s).ok());
        let text = |key: &str| map.get(key).and_then(|v| v.as_str()).map(str::to_owned);
        Some(Self {
            title: title.to_owned(),
            version: version.to_owned(),
            size,
            checksum: text(FW_CHECKSUM_KEY),
            checksum_algorithm: text(FW_CHECKSUM_ALGORITHM_KEY),
        })
    }
}

struct OtaSession {
    version: String,
    size: u32,
    total_chunks: u32,
    received_chunks: u32,
    retries_remaining: u8,
    request_id: u32,
    /// Deadline of the outstanding chunk request; armed by `poll`.
    deadline_ms: Option<u64>,
    hasher: hmac_sha256::Hash,
    checksum: Option<String>,
    checksum_algorithm: Option<String>,
}

impl OtaSession {
    fn bytes_received(&self, chunk_size: u16) -> u32 {
        self.received_chunks.saturating_mul(u32::from(chunk_size))
    }
}

// ── Controller ────────────────────────────────────────────────

/// Drives at most one firmware-update session at a time.
pub struct OtaUpdateController {
    title: String,
    version: String,
    chunk_size: u16,
    chunk_retries: u8,
    chunk_timeout_ms: u32,
    state: OtaState,
    session: Option<OtaSession>,
    next_request_id: u32,
    restart_signalled: bool,
    last_failure: Option<(OtaStage, OtaError)>,
    writer: Box<dyn FirmwareWriter + Send>,
    observer: Box<dyn OtaObserver + Send>,
}

impl OtaUpdateController {
    pub fn new(
        firmware: &FirmwareConfig,
        writer: Box<dyn FirmwareWriter + Send>,
        observer: Box<dyn OtaObserver + Send>,
    ) -> Self {
        Self {
            title: firmware.title.clone(),
            version: firmware.version.clone(),
            chunk_size: firmware.chunk_size,
            chunk_retries: firmware.chunk_retries,
            chunk_timeout_ms: firmware.chunk_timeout_ms,
            state: OtaState::Idle,
            session: None,
            next_request_id: 0,
            restart_signalled: false,
            last_failure: None,
            writer,
            observer,
        }
    }

    pub fn state(&self) -> OtaState {
        self.state
    }

    /// `(received, total)` chunk counts of the active session.
    pub fn progress(&self) -> Option<(u32, u32)> {
        self.session
            .as_ref()
            .map(|s| (s.received_chunks, s.total_chunks))
    }

    pub fn retries_remaining(&self) -> Option<u8> {
        self.session.as_ref().map(|s| s.retries_remaining)
    }

    pub fn last_failure(&self) -> Option<(OtaStage, OtaError)> {
        self.last_failure
    }

    pub fn is_active(&self) -> bool {
        self.state != OtaState::Idle
    }

    /// Announcement of the running firmware, sent once per boot.
    pub fn firmware_info(&self) -> Outbound {
        let mut map = AttributeMap::new();
        map.insert("current_fw_title".into(), self.title.clone().into());
        map.insert("current_fw_version".into(), self.version.clone().into());
        Outbound::Telemetry(map)
    }

    /// Consider an advertisement. `Ok` means a session was started; it may
    /// still have failed in `Checking` (see [`last_failure`](Self::last_failure)).
    pub fn offer(&mut self, advert: &FirmwareAdvert, outbox: &Outbox) -> Result<(), OfferRejected> {
        if self.state != OtaState::Idle {
            debug!("OTA: advert {} ignored, session active", advert.version);
            return Err(OfferRejected::AlreadyInProgress);
        }
        if advert.title != self.title {
            debug!("OTA: advert title '{}' is not ours", advert.title);
            return Err(OfferRejected::TitleMismatch);
        }
        if !version::is_newer(&self.version, &advert.version) {
            debug!(
                "OTA: advert {} not newer than running {}",
                advert.version, self.version
            );
            return Err(OfferRejected::NotNewer);
        }

        info!("OTA: {} -> {} available", self.version, advert.version);
        self.state = OtaState::Checking;

        let size = match advert.size {
            Some(s) if s > 0 && s <= MAX_FIRMWARE_SIZE => s,
            _ => {
                self.fail(OtaStage::Checking, OtaError::InvalidSize, outbox);
                return Ok(());
            }
        };
        if let Err(e) = self.writer.begin(size) {
            self.fail(OtaStage::Checking, e, outbox);
            return Ok(());
        }

        self.next_request_id = self.next_request_id.wrapping_add(1);
        let total_chunks = size.div_ceil(u32::from(self.chunk_size));
        self.session = Some(OtaSession {
            version: advert.version.clone(),
            size,
            total_chunks,
            received_chunks: 0,
            retries_remaining: self.chunk_retries,
            request_id: self.next_request_id,
            deadline_ms: None,
            hasher: hmac_sha256::Hash::new(),
            checksum: advert.checksum.clone(),
            checksum_algorithm: advert.checksum_algorithm.clone(),
        });
        self.state = OtaState::Downloading;
        self.restart_signalled = false;
        info!("OTA: downloading {} bytes in {} chunks", size, total_chunks);
        self.report_state("DOWNLOADING", None, outbox);
        self.request_current_chunk(outbox);
        Ok(())
    }

    /// Deliver one chunk. Deliveries for another session or chunk index
    /// are stale duplicates and ignored.
    pub fn on_chunk(&mut self, request_id: u32, chunk: u32, data: &[u8], outbox: &Outbox) {
        if self.state != OtaState::Downloading {
            return;
        }
        let chunk_size = self.chunk_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if request_id != session.request_id || chunk != session.received_chunks {
            debug!("OTA: stale chunk {} (req {}) ignored", chunk, request_id);
            return;
        }

        let remaining = session.size - session.bytes_received(chunk_size).min(session.size);
        let expected = remaining.min(u32::from(chunk_size));
        if data.len() as u32 != expected {
            warn!(
                "OTA: chunk {} has {} bytes, expected {}",
                chunk,
                data.len(),
                expected
            );
            self.report_chunk_failure(outbox);
            return;
        }

        if let Err(e) = self.writer.write(data) {
            self.fail(OtaStage::Downloading, e, outbox);
            return;
        }

        session.hasher.update(data);
        session.received_chunks += 1;
        session.retries_remaining = self.chunk_retries;
        session.deadline_ms = None;
        let (received, total) = (session.received_chunks, session.total_chunks);
        self.observer.on_progress(received, total);

        if received == total {
            self.finish(outbox);
        } else {
            self.request_current_chunk(outbox);
        }
    }

    /// Count one failed attempt at the current chunk and re-request it, or
    /// fail the session once the budget is spent.
    pub fn report_chunk_failure(&mut self, outbox: &Outbox) {
        if self.state != OtaState::Downloading {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.retries_remaining = session.retries_remaining.saturating_sub(1);
        warn!(
            "OTA: chunk {} failed, {} retries left",
            session.received_chunks, session.retries_remaining
        );
        if session.retries_remaining == 0 {
            self.fail(OtaStage::Downloading, OtaError::ChunkTransferFailure, outbox);
        } else {
            self.request_current_chunk(outbox);
        }
    }

    /// Periodic tick from the session loop: arms and checks the chunk
    /// deadline, and signals the restart once `Rebooting` is reached.
    pub fn poll(&mut self, now_ms: u64, outbox: &Outbox) {
        match self.state {
            OtaState::Downloading => {
                let timeout = u64::from(self.chunk_timeout_ms);
                let Some(session) = self.session.as_mut() else {
                    return;
                };
                let chunk = session.received_chunks;
                let expired = match session.deadline_ms {
                    None => {
                        session.deadline_ms = Some(now_ms + timeout);
                        false
                    }
                    Some(deadline) => now_ms >= deadline,
                };
                if expired {
                    warn!("OTA: chunk {} timed out", chunk);
                    self.report_chunk_failure(outbox);
                }
            }
            OtaState::Rebooting if !self.restart_signalled => {
                self.restart_signalled = true;
                self.observer.on_success();
            }
            _ => {}
        }
    }

    // ── Internals ─────────────────────────────────────────────

    fn request_current_chunk(&mut self, outbox: &Outbox) {
        let size = self.chunk_size;
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.deadline_ms = None;
        let request = Outbound::FirmwareChunkRequest {
            request_id: session.request_id,
            chunk: session.received_chunks,
            size,
        };
        // A dropped request surfaces as a chunk timeout.
        if let Err(e) = enqueue(outbox, request) {
            warn!("OTA: chunk request not queued: {}", e);
        }
    }

    fn finish(&mut self, outbox: &Outbox) {
        let Some(session) = self.session.take() else {
            return;
        };
        self.report_state("DOWNLOADED", None, outbox);
        self.state = OtaState::Verifying;

        let digest = session.hasher.finalize();
        match session.checksum_algorithm.as_deref() {
            Some(alg) if alg.eq_ignore_ascii_case("SHA256") => {
                let expected = session.checksum.as_deref().unwrap_or_default();
                if !hex_eq(&digest, expected) {
                    warn!("OTA: SHA-256 mismatch");
                    self.fail(OtaStage::Verifying, OtaError::FirmwareVerificationFailure, outbox);
                    return;
                }
            }
            Some(alg) => warn!("OTA: checksum algorithm {} not verified", alg),
            None => warn!("OTA: no checksum advertised"),
        }
        if self.writer.finalize().is_err() {
            self.fail(OtaStage::Verifying, OtaError::FirmwareVerificationFailure, outbox);
            return;
        }
        self.report_state("VERIFIED", None, outbox);

        self.state = OtaState::Applying;
        self.report_state("UPDATING", None, outbox);
        if let Err(e) = self.writer.apply() {
            self.fail(OtaStage::Applying, e, outbox);
            return;
        }

        info!("OTA: {} applied, restarting", session.version);
        self.state = OtaState::Rebooting;
    }

    fn fail(&mut self, stage: OtaStage, error: OtaError, outbox: &Outbox) {
        warn!("OTA: failed in {:?}: {}", stage, error);
        self.state = OtaState::Failed;
        if stage != OtaStage::Checking {
            self.writer.abort();
        }
        self.session = None;
        self.last_failure = Some((stage, error));
        self.report_state("FAILED", Some(error), outbox);
        self.observer.on_failure(stage, error);
        self.state = OtaState::Idle;
    }

    fn report_state(&self, fw_state: &str, error: Option<OtaError>, outbox: &Outbox) {
        let mut map = AttributeMap::new();
        map.insert("fw_state".into(), fw_state.into());
        if let Some(e) = error {
            map.insert("fw_error".into(), e.to_string().into());
        }
        if let Err(e) = enqueue(outbox, Outbound::Telemetry(map)) {
            debug!("OTA: fw_state {} not queued: {}", fw_state, e);
        }
    }
}

/// Case-insensitive comparison of a digest against its hex rendering.
fn hex_eq(digest: &[u8], hex: &str) -> bool {
    const DIGITS: &[u8; 16] = b"0123456789abcdef";
    let hex = hex.trim().as_bytes();
    hex.len() == digest.len() * 2
        && digest.iter().zip(hex.chunks(2)).all(|(byte, pair)| {
            pair[0].to_ascii_lowercase() == DIGITS[usize::from(byte >> 4)]
                && pair[1].to_ascii_lowercase() == DIGITS[usize::from(byte & 0x0F)]
        })
}

// ── Tests ─────────────────────────────────────────────────────
