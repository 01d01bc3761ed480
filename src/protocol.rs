//! Device ↔ backend wire protocol.
//!
//! JSON over HTTPS. Every device request carries its bearer token in
//! [`DEVICE_TOKEN_HEADER`]. Both the agent and `doorlink-server` use these
//! types, so a field rename is a compile error on both sides.
//!
//! ```text
//!  GET  /api/device/command/      → CommandOffer
//!  POST /api/device/command/ack/  AckRequest      → StatusReply | 404
//!  GET  /api/device/firmware/     → FirmwarePayload
//!  POST /api/device/logs/         LogSubmission   → StatusReply | 400
//! ```

use serde::{Deserialize, Serialize};

pub const DEVICE_TOKEN_HEADER: &str = "X-DEVICE-TOKEN";

pub const COMMAND_ENDPOINT: &str = "/api/device/command/";
pub const ACK_ENDPOINT: &str = "/api/device/command/ack/";
pub const FIRMWARE_ENDPOINT: &str = "/api/device/firmware/";
pub const LOG_ENDPOINT: &str = "/api/device/logs/";

/// Relay energise time offered with every open command.
pub const DEFAULT_PULSE_MS: u32 = 1000;

/// A pending command not collected within this window is expired.
pub const COMMAND_EXPIRY_SECS: u64 = 15;

// ── Command channel ───────────────────────────────────────────

/// Response to a poll. `open == false` is the empty offer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CommandOffer {
    pub open: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pulse_ms: Option<u32>,
}

impl CommandOffer {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn open(command_id: u64, pulse_ms: u32) -> Self {
        Self {
            open: true,
            command_id: Some(command_id),
            pulse_ms: Some(pulse_ms),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AckRequest {
    pub command_id: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReply {
    pub status: String,
}

impl StatusReply {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub error: String,
}

impl ErrorReply {
    pub fn new(message: &str) -> Self {
        Self {
            error: message.to_string(),
        }
    }
}

// ── OTA ───────────────────────────────────────────────────────

/// The device's current release. Every field is optional; a device
/// without a configured release receives `{}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FirmwarePayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_checksum: Option<String>,
}

/// Which of the two independently versioned artifacts a payload half is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Firmware,
    Config,
}

impl ArtifactKind {
    pub const ALL: [Self; 2] = [Self::Firmware, Self::Config];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Firmware => "firmware",
            Self::Config => "config",
        }
    }
}

/// One artifact extracted from a [`FirmwarePayload`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactCandidate {
    pub kind: ArtifactKind,
    pub version: String,
    pub content: String,
    /// Empty when the release predates checksum support.
    pub checksum: String,
}

impl FirmwarePayload {
    /// Extract the candidate for `kind`, if the payload carries content for it.
    ///
    /// A payload with content but no version label yields `"unknown"` as the
    /// label so it is still comparable against the installed version.
    pub fn candidate(&self, kind: ArtifactKind) -> Option<ArtifactCandidate> {
        let (version, content, checksum) = match kind {
            ArtifactKind::Firmware => (&self.version, &self.content, &self.checksum),
            ArtifactKind::Config => (&self.config_version, &self.config, &self.config_checksum),
        };
        let content = content.as_deref().filter(|c| !c.is_empty())?;
        let version = version
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .unwrap_or("unknown");
        Some(ArtifactCandidate {
            kind,
            version: version.to_string(),
            content: content.to_string(),
            checksum: checksum.clone().unwrap_or_default(),
        })
    }
}

// ── Diagnostics ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    /// Parse a level label case-insensitively; unknown labels map to `Info`.
    pub fn parse_lenient(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "warning" | "warn" => Self::Warning,
            "error" => Self::Error,
            "critical" | "fatal" => Self::Critical,
            _ => Self::Info,
        }
    }
}

/// Event category used when a submission does not name one.
pub const DEFAULT_EVENT_TYPE: &str = "general";

/// Body of `POST /api/device/logs/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSubmission {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<LogLevel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub firmware_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Join a base URL and an endpoint path with exactly one slash between them.
pub fn endpoint_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}
