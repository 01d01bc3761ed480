//! Diagnostics reporting and crash capture.
//!
//! [`DiagnosticsReporter`] is the agent's [`EventSink`]: every event is
//! logged locally through [`LogEventSink`], and the ones the backend cares
//! about are converted into [`LogSubmission`]s and queued in a bounded
//! outbox. The control loop calls [`DiagnosticsReporter::flush`] once per
//! iteration; records that cannot be delivered stay queued (oldest dropped
//! first once the outbox is full) and go out after the next success.
//!
//! A panic hook writes the panic reason to `last_crash.txt` before the
//! reset; the next boot reports it with the `boot` event and clears it.

use heapless::Deque;
use log::{debug, warn};
use serde_json::{Map, Value, json};

use crate::adapters::log_sink::LogEventSink;
use crate::app::events::{AgentEvent, HeartbeatData};
use crate::app::ports::{BackendPort, EventSink, StoragePort, WatchdogPort};
use crate::protocol::{LogLevel, LogSubmission};

/// Records retained while the backend is unreachable.
pub const OUTBOX_CAPACITY: usize = 8;

/// Crash reason left behind by the panic hook.
pub const CRASH_FILE: &str = "last_crash.txt";

const MAX_CRASH_REASON: usize = 256;

// ───────────────────────────────────────────────────────────────
// Local record → wire submission
// ───────────────────────────────────────────────────────────────

/// One diagnostic record before it is stamped with the firmware version.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub event_type: &'static str,
    pub message: String,
    pub metadata: Map<String, Value>,
}

impl LogRecord {
    fn new(level: LogLevel, event_type: &'static str, message: String) -> Self {
        Self {
            level,
            event_type,
            message,
            metadata: Map::new(),
        }
    }

    fn with(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }

    fn into_submission(self, firmware_version: &str) -> LogSubmission {
        LogSubmission {
            message: self.message,
            level: Some(self.level),
            event_type: Some(self.event_type.to_string()),
            firmware_version: Some(firmware_version.to_string()),
            metadata: (!self.metadata.is_empty()).then_some(Value::Object(self.metadata)),
        }
    }
}

fn heartbeat_record(h: &HeartbeatData) -> LogRecord {
    LogRecord::new(LogLevel::Info, "heartbeat", "heartbeat".to_string())
        .with("uptime_ms", json!(h.uptime_ms))
        .with("iterations", json!(h.iterations))
        .with("reconnects", json!(h.reconnects))
        .with("commands_executed", json!(h.commands_executed))
        .with("firmware_version", json!(h.firmware_version))
        .with("config_version", json!(h.config_version))
        .with("ssid", json!(h.ssid))
        .with("rssi", json!(h.rssi))
}

/// Map an event to the record the backend should receive, if any.
///
/// Purely local events (skips, sweeps that found nothing, poll errors that
/// could not reach the backend anyway) return `None`.
pub fn record_for(event: &AgentEvent) -> Option<LogRecord> {
    let record = match event {
        AgentEvent::Booted {
            firmware_version,
            config_version,
            last_crash,
        } => {
            let level = if last_crash.is_some() {
                LogLevel::Warning
            } else {
                LogLevel::Info
            };
            LogRecord::new(level, "boot", format!("booted firmware {firmware_version}"))
                .with("config_version", json!(config_version))
                .with("last_crash", json!(last_crash))
        }
        AgentEvent::Heartbeat(h) => heartbeat_record(h),
        AgentEvent::LinkUp {
            ssid,
            rssi,
            recovered: true,
            ..
        } => LogRecord::new(LogLevel::Warning, "wifi", format!("link recovered on {ssid}"))
            .with("ssid", json!(ssid))
            .with("rssi", json!(rssi)),
        AgentEvent::DriverFault { ssid, code } => LogRecord::new(
            LogLevel::Warning,
            "wifi",
            format!("driver fault {code}, interface power-cycled"),
        )
        .with("ssid", json!(ssid))
        .with("status", json!(code)),
        AgentEvent::DoorOpened {
            command_id,
            pulse_ms,
        } => LogRecord::new(LogLevel::Info, "command", "door opened".to_string())
            .with("command_id", json!(command_id))
            .with("pulse_ms", json!(pulse_ms)),
        AgentEvent::AckFailed { command_id, error } => LogRecord::new(
            LogLevel::Warning,
            "command",
            format!("acknowledgement failed: {error}"),
        )
        .with("command_id", json!(command_id)),
        AgentEvent::OtaRejected {
            kind,
            version,
            error,
        } => LogRecord::new(
            LogLevel::Error,
            "ota",
            format!("{} {version} rejected: {error}", kind.as_str()),
        )
        .with("kind", json!(kind.as_str()))
        .with("version", json!(version)),
        AgentEvent::OtaApplied { kind, version } => LogRecord::new(
            LogLevel::Info,
            "ota",
            format!("{} {version} installed", kind.as_str()),
        )
        .with("kind", json!(kind.as_str()))
        .with("version", json!(version)),
        AgentEvent::OtaFailed {
            kind,
            version,
            error,
        } => LogRecord::new(
            LogLevel::Error,
            "ota",
            format!("{} {version} failed: {error}", kind.as_str()),
        )
        .with("kind", json!(kind.as_str()))
        .with("version", json!(version)),
        AgentEvent::SettingsRejected { version, reason } => LogRecord::new(
            LogLevel::Warning,
            "ota",
            format!("config {version} not applied: {reason}"),
        )
        .with("version", json!(version)),
        AgentEvent::Restarting { reason } => {
            LogRecord::new(LogLevel::Warning, "boot", format!("restarting: {reason}"))
        }
        AgentEvent::LinkUp { .. }
        | AgentEvent::LinkDown
        | AgentEvent::DuplicateOffer { .. }
        | AgentEvent::BackendError { .. }
        | AgentEvent::OtaSkipped { .. } => return None,
    };
    Some(record)
}

// ───────────────────────────────────────────────────────────────
// Reporter
// ───────────────────────────────────────────────────────────────

pub struct DiagnosticsReporter {
    local: LogEventSink,
    outbox: Deque<LogSubmission, OUTBOX_CAPACITY>,
    firmware_version: String,
    dropped: u32,
}

impl DiagnosticsReporter {
    pub fn new(firmware_version: &str) -> Self {
        Self {
            local: LogEventSink::new(),
            outbox: Deque::new(),
            firmware_version: firmware_version.to_string(),
            dropped: 0,
        }
    }

    /// Version stamped on every submission queued from now on.
    pub fn set_firmware_version(&mut self, version: &str) {
        self.firmware_version = version.to_string();
    }

    pub fn pending(&self) -> usize {
        self.outbox.len()
    }

    /// Records discarded because the outbox was full.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    fn enqueue(&mut self, submission: LogSubmission) {
        if self.outbox.is_full() {
            self.outbox.pop_front();
            self.dropped = self.dropped.saturating_add(1);
        }
        // Cannot fail: a slot was just freed if needed.
        let _ = self.outbox.push_back(submission);
    }

    /// Deliver queued records in order, stopping at the first failure.
    ///
    /// Feeds the watchdog around each blocking submission. Returns the
    /// number delivered; a failure never propagates to the caller.
    pub fn flush(&mut self, backend: &mut dyn BackendPort, watchdog: &mut dyn WatchdogPort) -> usize {
        let mut sent = 0;
        while let Some(next) = self.outbox.front() {
            watchdog.feed();
            let result = backend.submit_log(next);
            watchdog.feed();
            match result {
                Ok(()) => {
                    self.outbox.pop_front();
                    sent += 1;
                }
                Err(e) => {
                    debug!("DIAG | submit deferred ({} queued): {e}", self.outbox.len());
                    break;
                }
            }
        }
        sent
    }
}

impl EventSink for DiagnosticsReporter {
    fn emit(&mut self, event: &AgentEvent) {
        self.local.emit(event);
        if let Some(record) = record_for(event) {
            let submission = record.into_submission(&self.firmware_version);
            self.enqueue(submission);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Crash file
// ───────────────────────────────────────────────────────────────

/// Read and clear the crash reason a previous run left behind.
pub fn take_crash_report(storage: &mut dyn StoragePort) -> Option<String> {
    let raw = match storage.read(CRASH_FILE) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return None,
        Err(e) => {
            warn!("DIAG | crash file unreadable: {e}");
            return None;
        }
    };
    if let Err(e) = storage.remove(CRASH_FILE) {
        warn!("DIAG | crash file not cleared: {e}");
    }
    let reason = String::from_utf8_lossy(&raw).trim().to_string();
    (!reason.is_empty()).then_some(reason)
}

fn truncate_reason(reason: &str) -> &str {
    if reason.len() <= MAX_CRASH_REASON {
        return reason;
    }
    let mut end = MAX_CRASH_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    &reason[..end]
}

/// Install a panic hook that persists the panic reason to [`CRASH_FILE`].
///
/// `open_storage` is called from the hook itself, so it must not rely on
/// anything the panicking code may hold. A failed write is logged and
/// otherwise ignored.
pub fn install_panic_handler<F, S>(open_storage: F)
where
    F: Fn() -> Option<S> + Send + Sync + 'static,
    S: StoragePort + 'static,
{
    std::panic::set_hook(Box::new(move |info| {
        let reason = if let Some(msg) = info.payload().downcast_ref::<&str>() {
            *msg
        } else if let Some(msg) = info.payload().downcast_ref::<String>() {
            msg.as_str()
        } else {
            "unknown panic"
        };
        let location = info
            .location()
            .map(|l| format!(" at {}:{}", l.file(), l.line()))
            .unwrap_or_default();
        let entry = format!("{}{location}", truncate_reason(reason));

        log::error!("PANIC: {entry}");

        match open_storage() {
            Some(mut storage) => {
                if let Err(e) = storage.write(CRASH_FILE, entry.as_bytes()) {
                    log::error!("Panic handler: crash file not written: {e}");
                }
            }
            None => log::error!("Panic handler: storage unavailable, crash not persisted"),
        }
    }));
}
