//! Agent service: the control loop and its recovery boundary.
//!
//! [`AgentService`] owns the [`AgentContext`] and the diagnostics reporter.
//! Every iteration runs the same fixed sequence against the board's ports:
//!
//! ```text
//!  feed ─▶ ensure link ─▶ command ─▶ OTA (if due) ─▶ heartbeat (if due)
//!                │                                        │
//!            no link                                  flush diagnostics
//!                │                                        │
//!                └──────────────▶ feed ─▶ idle(poll interval) ◀┘
//! ```
//!
//! [`supervise`] wraps the whole loop in the only recovery boundary: a
//! panic anywhere inside becomes [`RestartReason::Fault`], the relay is
//! forced released, and the caller restarts the chip after the configured
//! delay.

use core::fmt;
use std::panic::{self, AssertUnwindSafe};

use log::{error, info, warn};

use crate::command;
use crate::config::{AgentConfig, FACTORY_CONFIG_VERSION, FIRMWARE_VERSION, RemoteSettings};
use crate::connectivity;
use crate::diagnostics::{self, DiagnosticsReporter};
use crate::ota::{self, versions};
use crate::protocol::ArtifactKind;

use super::context::AgentContext;
use super::events::{AgentEvent, HeartbeatData};
use super::ports::{Board, EventSink};

/// Longest single sleep while idling; the watchdog is fed between slices.
pub const IDLE_SLICE_MS: u32 = 1_000;

/// Why the loop handed control back to the binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestartReason {
    /// New firmware is in place and must be booted.
    FirmwareUpdated { version: String },
    /// A panic escaped the loop.
    Fault(String),
}

impl fmt::Display for RestartReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FirmwareUpdated { version } => write!(f, "firmware {version} installed"),
            Self::Fault(msg) => write!(f, "fault: {msg}"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// AgentService
// ───────────────────────────────────────────────────────────────

pub struct AgentService {
    ctx: AgentContext,
    reporter: DiagnosticsReporter,
}

impl AgentService {
    pub fn new(config: AgentConfig, boot_ms: u64) -> Self {
        Self {
            ctx: AgentContext::new(config, boot_ms),
            reporter: DiagnosticsReporter::new(FIRMWARE_VERSION),
        }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub fn reporter(&self) -> &DiagnosticsReporter {
        &self.reporter
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Load installed versions, apply installed settings, and report the
    /// boot (with the previous run's crash reason, if any).
    pub fn boot(&mut self, board: &mut Board<'_>) {
        let (fw_version, fw_checksum) =
            versions::load_or_seed(board.storage, ArtifactKind::Firmware, FIRMWARE_VERSION);
        let (cfg_version, cfg_checksum) =
            versions::load_or_seed(board.storage, ArtifactKind::Config, FACTORY_CONFIG_VERSION);
        self.ctx.firmware.version = fw_version;
        self.ctx.firmware.checksum = fw_checksum;
        self.ctx.config_artifact.version = cfg_version;
        self.ctx.config_artifact.checksum = cfg_checksum;
        self.reporter.set_firmware_version(&self.ctx.firmware.version);

        self.apply_installed_settings(board);

        let last_crash = diagnostics::take_crash_report(board.storage);
        info!(
            "Agent booted: firmware={} config={}",
            self.ctx.firmware.version, self.ctx.config_artifact.version
        );
        self.reporter.emit(&AgentEvent::Booted {
            firmware_version: self.ctx.firmware.version.clone(),
            config_version: self.ctx.config_artifact.version.clone(),
            last_crash,
        });
    }

    /// Merge the installed config artifact over the base configuration.
    /// A document that does not parse or validate leaves the running
    /// configuration as it is.
    fn apply_installed_settings(&mut self, board: &mut Board<'_>) {
        let raw = match board.storage.read(versions::live_file(ArtifactKind::Config)) {
            Ok(Some(raw)) => raw,
            Ok(None) => return,
            Err(e) => {
                warn!("CFG  | installed settings unreadable: {e}");
                return;
            }
        };
        let merged = RemoteSettings::parse(&raw).and_then(|s| self.ctx.base_config.with_remote(&s));
        match merged {
            Ok(config) => {
                if config != self.ctx.config {
                    info!(
                        "CFG  | settings {} applied (poll={}ms ota={}ms beat={}ms networks={})",
                        self.ctx.config_artifact.version,
                        config.poll_interval_ms,
                        config.ota_check_interval_ms,
                        config.heartbeat_interval_ms,
                        config.networks.len()
                    );
                }
                self.ctx.config = config;
            }
            Err(e) => self.reporter.emit(&AgentEvent::SettingsRejected {
                version: self.ctx.config_artifact.version.clone(),
                reason: e.to_string(),
            }),
        }
    }

    // ── Per-iteration orchestration ───────────────────────────

    /// Sleep `ms` in watchdog-fed slices.
    fn idle(board: &mut Board<'_>, ms: u32) {
        let mut left = ms;
        while left > 0 {
            let slice = left.min(IDLE_SLICE_MS);
            board.clock.sleep_ms(slice);
            board.watchdog.feed();
            left -= slice;
        }
    }

    fn heartbeat(&mut self, board: &mut Board<'_>, now: u64) {
        let data = HeartbeatData {
            uptime_ms: self.ctx.uptime_ms(now),
            iterations: self.ctx.stats.iterations,
            reconnects: self.ctx.link.reconnects,
            commands_executed: self.ctx.stats.commands_executed,
            firmware_version: self.ctx.firmware.version.clone(),
            config_version: self.ctx.config_artifact.version.clone(),
            ssid: self.ctx.link.ssid.clone(),
            rssi: board.wifi.rssi(),
        };
        self.reporter.emit(&AgentEvent::Heartbeat(data));
        self.ctx.last_heartbeat_ms = now;
    }

    /// Run one loop iteration. Returns `Some` when the agent must restart.
    pub fn iterate(&mut self, board: &mut Board<'_>) -> Option<RestartReason> {
        self.ctx.stats.iterations += 1;
        board.watchdog.feed();

        if let Err(e) = connectivity::ensure_connected(&mut self.ctx, board, &mut self.reporter) {
            warn!("Loop: {e}; retrying after {}ms", self.ctx.config.poll_interval_ms);
            board.watchdog.feed();
            Self::idle(board, self.ctx.config.poll_interval_ms);
            return None;
        }

        command::service(&mut self.ctx, board, &mut self.reporter);

        let report = ota::check(&mut self.ctx, board, &mut self.reporter);
        if report.config_installed {
            self.apply_installed_settings(board);
        }
        if report.firmware_installed {
            let version = self.ctx.firmware.version.clone();
            let reason = RestartReason::FirmwareUpdated { version };
            self.reporter.emit(&AgentEvent::Restarting {
                reason: reason.to_string(),
            });
            self.reporter.flush(board.backend, board.watchdog);
            return Some(reason);
        }

        let now = board.clock.now_ms();
        if self.ctx.heartbeat_due(now) {
            self.heartbeat(board, now);
        }

        self.reporter.flush(board.backend, board.watchdog);

        board.watchdog.feed();
        Self::idle(board, self.ctx.config.poll_interval_ms);
        None
    }

    /// Iterate until a restart is required.
    pub fn run(&mut self, board: &mut Board<'_>) -> RestartReason {
        loop {
            if let Some(reason) = self.iterate(board) {
                return reason;
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Supervision
// ───────────────────────────────────────────────────────────────

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Boot the agent and run it until it must restart.
///
/// This is the single recovery boundary: a panic in boot or in any
/// iteration is caught here, logged, and turned into
/// [`RestartReason::Fault`]. In every case the relay is left released and
/// the restart delay has elapsed (watchdog fed) when this returns.
pub fn supervise(config: AgentConfig, board: &mut Board<'_>) -> RestartReason {
    let reset_delay_ms = config.reset_delay_ms;
    let boot_ms = board.clock.now_ms();
    let mut service = AgentService::new(config, boot_ms);

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        service.boot(board);
        service.run(board)
    }));

    let reason = match outcome {
        Ok(reason) => {
            info!("Supervisor: {reason}");
            reason
        }
        Err(payload) => {
            let reason = RestartReason::Fault(panic_message(payload.as_ref()));
            error!("Supervisor: loop aborted, {reason}");
            service.reporter.emit(&AgentEvent::Restarting {
                reason: reason.to_string(),
            });
            // Best effort: the link may be what failed.
            service.reporter.flush(board.backend, board.watchdog);
            reason
        }
    };

    board.relay.release();
    AgentService::idle(board, reset_delay_ms);
    reason
}
