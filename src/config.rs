//! Agent configuration parameters
//!
//! All tunable parameters for the DoorLink agent. Build-time defaults come
//! from `option_env!` so a flash image can be provisioned without editing
//! source; the OTA config artifact can later override the remote-tunable
//! subset (see [`RemoteSettings`]).

use serde::{Deserialize, Serialize};

use crate::pins;

/// Firmware version compiled into this image. Seeds the version file on
/// first boot.
pub const FIRMWARE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Config version assumed before any config artifact has been installed.
pub const FACTORY_CONFIG_VERSION: &str = "factory";

const DEFAULT_SERVER_URL: &str = match option_env!("DOORLINK_SERVER_URL") {
    Some(url) => url,
    None => "https://doorlink.example.com",
};
const DEFAULT_DEVICE_TOKEN: &str = match option_env!("DOORLINK_DEVICE_TOKEN") {
    Some(token) => token,
    None => "CHANGE_ME",
};
const DEFAULT_SSID: &str = match option_env!("DOORLINK_WIFI_SSID") {
    Some(ssid) => ssid,
    None => "CHANGE_ME",
};
const DEFAULT_PASSWORD: &str = match option_env!("DOORLINK_WIFI_PASS") {
    Some(pass) => pass,
    None => "",
};

/// One configured WiFi network. Lower `priority` is preferred.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkCandidate {
    pub ssid: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub priority: u8,
}

impl NetworkCandidate {
    pub fn new(ssid: &str, password: &str, priority: u8) -> Self {
        Self {
            ssid: ssid.to_string(),
            password: password.to_string(),
            priority,
        }
    }
}

/// Timing of the connectivity convergence pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WifiTiming {
    /// Status polls per candidate before giving up on it.
    pub max_attempts: u32,
    /// Delay between status polls (milliseconds).
    pub retry_delay_ms: u32,
    /// How long to wait for an existing association to settle (milliseconds).
    pub existing_wait_ms: u32,
    /// Poll interval while waiting for an existing association (milliseconds).
    pub existing_check_ms: u32,
    /// Off-time when power-cycling the radio (milliseconds).
    pub power_cycle_delay_ms: u32,
}

impl Default for WifiTiming {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            retry_delay_ms: 500,
            existing_wait_ms: 2000,
            existing_check_ms: 200,
            power_cycle_delay_ms: 200,
        }
    }
}

/// Core agent configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    // --- Backend ---
    /// Base URL of the backend, without trailing slash.
    pub server_base_url: String,
    /// Opaque bearer token issued by the backend for this device.
    pub device_token: String,
    /// Per-request timeout (milliseconds).
    pub request_timeout_ms: u32,

    // --- Relay ---
    pub relay_gpio: i32,
    /// True if the relay module energises on a low output.
    pub relay_active_low: bool,
    /// Upper bound on any offered pulse (milliseconds).
    pub max_pulse_ms: u32,

    // --- Connectivity ---
    pub networks: Vec<NetworkCandidate>,
    pub wifi: WifiTiming,

    // --- Timing ---
    /// Sleep between command polls (milliseconds).
    pub poll_interval_ms: u32,
    pub ota_enabled: bool,
    /// Minimum spacing between OTA checks (milliseconds).
    pub ota_check_interval_ms: u32,
    /// Heartbeat diagnostic interval (milliseconds).
    pub heartbeat_interval_ms: u32,

    // --- Reliability ---
    /// Hardware watchdog timeout (milliseconds).
    pub watchdog_timeout_ms: u32,
    /// Pause before a supervised restart (milliseconds).
    pub reset_delay_ms: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            // Backend
            server_base_url: DEFAULT_SERVER_URL.to_string(),
            device_token: DEFAULT_DEVICE_TOKEN.to_string(),
            request_timeout_ms: 10_000,

            // Relay
            relay_gpio: pins::RELAY_GPIO,
            relay_active_low: true,
            max_pulse_ms: 5_000,

            // Connectivity
            networks: vec![NetworkCandidate::new(DEFAULT_SSID, DEFAULT_PASSWORD, 0)],
            wifi: WifiTiming::default(),

            // Timing
            poll_interval_ms: 5_000,
            ota_enabled: true,
            ota_check_interval_ms: 300_000, // 5 min
            heartbeat_interval_ms: 60_000,  // 1/min

            // Reliability
            watchdog_timeout_ms: 30_000,
            reset_delay_ms: 2_000,
        }
    }
}

/// Why a configuration was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError(pub &'static str);

impl core::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "validation failed: {}", self.0)
    }
}

fn is_printable_ascii(s: &str) -> bool {
    s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

fn validate_network(candidate: &NetworkCandidate) -> Result<(), ConfigError> {
    if candidate.ssid.is_empty() || candidate.ssid.len() > 32 || !is_printable_ascii(&candidate.ssid)
    {
        return Err(ConfigError("SSID must be 1-32 printable ASCII bytes"));
    }
    let pw = candidate.password.len();
    if pw != 0 && !(8..=64).contains(&pw) {
        return Err(ConfigError("password must be empty or 8-64 bytes"));
    }
    Ok(())
}

impl AgentConfig {
    /// Longest single blocking step between two watchdog feeds.
    pub fn worst_blocking_step_ms(&self) -> u32 {
        self.request_timeout_ms
            .max(self.max_pulse_ms)
            .max(self.wifi.retry_delay_ms)
            .max(self.wifi.existing_check_ms)
            .max(self.wifi.power_cycle_delay_ms)
    }

    /// Range-check every field. Invalid configs are rejected, not clamped.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_base_url.trim().is_empty() {
            return Err(ConfigError("server_base_url must not be empty"));
        }
        if self.device_token.trim().is_empty() {
            return Err(ConfigError("device_token must not be empty"));
        }
        if self.networks.is_empty() {
            return Err(ConfigError("at least one network is required"));
        }
        for candidate in &self.networks {
            validate_network(candidate)?;
        }
        if self.poll_interval_ms == 0
            || self.ota_check_interval_ms == 0
            || self.heartbeat_interval_ms == 0
            || self.request_timeout_ms == 0
        {
            return Err(ConfigError("intervals and timeouts must be non-zero"));
        }
        if self.wifi.max_attempts == 0 || self.wifi.existing_check_ms == 0 {
            return Err(ConfigError("wifi attempts and check interval must be non-zero"));
        }
        if self.max_pulse_ms == 0 {
            return Err(ConfigError("max_pulse_ms must be non-zero"));
        }
        if self.watchdog_timeout_ms <= self.worst_blocking_step_ms() {
            return Err(ConfigError(
                "watchdog_timeout_ms must exceed the longest blocking step",
            ));
        }
        Ok(())
    }

    /// Merge remote settings over this config, returning the merged copy
    /// only if it validates.
    pub fn with_remote(&self, remote: &RemoteSettings) -> Result<Self, ConfigError> {
        let mut merged = self.clone();
        if let Some(v) = remote.poll_interval_ms {
            merged.poll_interval_ms = v;
        }
        if let Some(v) = remote.ota_check_interval_ms {
            merged.ota_check_interval_ms = v;
        }
        if let Some(v) = remote.heartbeat_interval_ms {
            merged.heartbeat_interval_ms = v;
        }
        if let Some(networks) = &remote.networks {
            merged.networks.clone_from(networks);
        }
        merged.validate()?;
        Ok(merged)
    }
}

/// The remote-tunable subset carried by the OTA config artifact.
///
/// Backend URL, token, GPIO and watchdog settings are deliberately absent:
/// a bad config push must not be able to lock the device out of its backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RemoteSettings {
    #[serde(default)]
    pub poll_interval_ms: Option<u32>,
    #[serde(default)]
    pub ota_check_interval_ms: Option<u32>,
    #[serde(default)]
    pub heartbeat_interval_ms: Option<u32>,
    #[serde(default)]
    pub networks: Option<Vec<NetworkCandidate>>,
}

impl RemoteSettings {
    pub fn parse(content: &[u8]) -> Result<Self, ConfigError> {
        serde_json::from_slice(content)
            .map_err(|_| ConfigError("config artifact is not valid settings JSON"))
    }
}
