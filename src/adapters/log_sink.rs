//! Log-based event sink adapter.
//!
//! Implements [`EventSink`] by writing each [`AgentEvent`] as one tagged
//! line through the `log` facade (ESP-IDF logger on the device, whatever
//! logger the test harness installs on the host).

use log::{error, info, warn};

use crate::app::events::AgentEvent;
use crate::app::ports::EventSink;

/// Adapter that logs every [`AgentEvent`] to the serial console.
#[derive(Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn emit(&mut self, event: &AgentEvent) {
        match event {
            AgentEvent::Booted {
                firmware_version,
                config_version,
                last_crash,
            } => {
                info!("BOOT | firmware={firmware_version} config={config_version}");
                if let Some(reason) = last_crash {
                    warn!("BOOT | previous run crashed: {reason}");
                }
            }
            AgentEvent::Heartbeat(h) => {
                info!(
                    "BEAT | up={}s iter={} reconnects={} opens={} | fw={} cfg={} | ssid={} rssi={}",
                    h.uptime_ms / 1000,
                    h.iterations,
                    h.reconnects,
                    h.commands_executed,
                    h.firmware_version,
                    h.config_version,
                    h.ssid.as_deref().unwrap_or("-"),
                    h.rssi.map_or_else(|| "-".to_string(), |r| format!("{r}dBm")),
                );
            }
            AgentEvent::LinkUp {
                ssid,
                ip,
                rssi,
                recovered,
            } => {
                let ip = ip.map_or_else(|| "?".to_string(), |a| a.to_string());
                if *recovered {
                    info!("WIFI | recovered on {ssid} ip={ip} rssi={rssi:?}");
                } else {
                    info!("WIFI | connected to {ssid} ip={ip} rssi={rssi:?}");
                }
            }
            AgentEvent::DriverFault { ssid, code } => {
                warn!("WIFI | driver fault {code} on {ssid}, interface power-cycled");
            }
            AgentEvent::LinkDown => {
                warn!("WIFI | no candidate network reachable");
            }
            AgentEvent::DoorOpened {
                command_id,
                pulse_ms,
            } => {
                info!("CMD  | open id={command_id:?} pulse={pulse_ms}ms");
            }
            AgentEvent::DuplicateOffer { command_id } => {
                info!("CMD  | id={command_id} already executed, retrying ack only");
            }
            AgentEvent::AckFailed { command_id, error } => {
                warn!("CMD  | ack id={command_id} failed: {error}");
            }
            AgentEvent::BackendError { operation, error } => {
                if matches!(error, crate::error::Error::Auth) {
                    error!("API  | {operation}: {error}");
                } else {
                    warn!("API  | {operation}: {error}");
                }
            }
            AgentEvent::OtaSkipped { kind, version } => {
                info!("OTA  | {} {version} already installed", kind.as_str());
            }
            AgentEvent::OtaRejected {
                kind,
                version,
                error,
            } => {
                error!("OTA  | {} {version} rejected: {error}", kind.as_str());
            }
            AgentEvent::OtaApplied { kind, version } => {
                info!("OTA  | {} {version} installed", kind.as_str());
            }
            AgentEvent::OtaFailed {
                kind,
                version,
                error,
            } => {
                error!("OTA  | {} {version} failed: {error}", kind.as_str());
            }
            AgentEvent::SettingsRejected { version, reason } => {
                warn!("CFG  | settings {version} not applied: {reason}");
            }
            AgentEvent::Restarting { reason } => {
                warn!("BOOT | restarting: {reason}");
            }
        }
    }
}
