//! Outbound agent events.
//!
//! Subsystems emit these through the [`EventSink`](super::ports::EventSink)
//! port. The [`DiagnosticsReporter`](crate::diagnostics::DiagnosticsReporter)
//! logs every event locally and forwards the ones the backend cares about.

use core::net::Ipv4Addr;

use crate::error::Error;
use crate::protocol::ArtifactKind;

#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// The agent finished boot; carries installed versions.
    Booted {
        firmware_version: String,
        config_version: String,
        last_crash: Option<String>,
    },

    /// Periodic liveness snapshot.
    Heartbeat(HeartbeatData),

    /// Connectivity converged on a network.
    LinkUp {
        ssid: String,
        ip: Option<Ipv4Addr>,
        rssi: Option<i8>,
        /// True when this follows a detected outage rather than first boot.
        recovered: bool,
    },

    /// A candidate attempt hit an internal driver fault; the radio was power-cycled.
    DriverFault { ssid: String, code: i32 },

    /// A full candidate sweep ended without a link.
    LinkDown,

    /// The relay was pulsed for an open command.
    DoorOpened { command_id: Option<u64>, pulse_ms: u32 },

    /// A re-offered command whose relay pulse already happened.
    DuplicateOffer { command_id: u64 },

    /// Acknowledgement could not be recorded.
    AckFailed { command_id: u64, error: Error },

    /// A backend call failed; the next iteration retries.
    BackendError { operation: &'static str, error: Error },

    /// Fetched artifact version equals the installed one.
    OtaSkipped { kind: ArtifactKind, version: String },

    /// Checksum mismatch; artifact discarded.
    OtaRejected {
        kind: ArtifactKind,
        version: String,
        error: Error,
    },

    /// Artifact written and its version persisted.
    OtaApplied { kind: ArtifactKind, version: String },

    /// Write/rename/persist step failed; previous artifact kept.
    OtaFailed {
        kind: ArtifactKind,
        version: String,
        error: Error,
    },

    /// An installed config artifact could not be applied to the running settings.
    SettingsRejected { version: String, reason: String },

    /// The loop is about to hand control back for a restart.
    Restarting { reason: String },
}

/// A point-in-time loop snapshot suitable for logging or transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct HeartbeatData {
    pub uptime_ms: u64,
    pub iterations: u64,
    pub reconnects: u32,
    pub commands_executed: u32,
    pub firmware_version: String,
    pub config_version: String,
    pub ssid: Option<String>,
    pub rssi: Option<i8>,
}
