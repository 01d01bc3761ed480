//! Command queue service.
//!
//! Every device operation goes through [`CommandQueue`]. It owns no state
//! of its own beyond the database handle and the clock; per-command
//! exclusivity comes from conditional updates in the storage layer.
//!
//! ```text
//!   PENDING ──ack──▶ EXECUTED
//!      │
//!      └──poll at ≥ created+15s──▶ EXPIRED
//! ```

use std::sync::Arc;

use doorlink::protocol::{
    COMMAND_EXPIRY_SECS, CommandOffer, DEFAULT_EVENT_TYPE, DEFAULT_PULSE_MS, FirmwarePayload,
    LogLevel,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::error::ApiError;
use crate::sanitize;
use crate::storage::{
    Command, DatabaseError, Device, DoorLinkDatabase, FirmwareRelease, NewDeviceLog,
};

/// Age at which an uncollected command is abandoned.
pub const COMMAND_EXPIRY_MS: i64 = COMMAND_EXPIRY_SECS as i64 * 1000;

/// Metadata keys added to every ingested log.
pub const META_CLIENT_IP: &str = "ip_address";
pub const META_USER_AGENT: &str = "user_agent";

/// Request context recorded with ingested logs. Empty strings when unknown.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClientInfo {
    pub ip: String,
    pub user_agent: String,
}

#[derive(Clone)]
pub struct CommandQueue {
    db: DoorLinkDatabase,
    clock: Arc<dyn Clock>,
}

/// The message of a log submission: `message`, or the legacy `log` field.
/// A field that is absent, null, or an empty string counts as missing.
fn log_message(payload: &Value) -> Option<String> {
    ["message", "log"]
        .iter()
        .filter_map(|key| payload.get(key))
        .find_map(|v| match v {
            Value::Null => None,
            Value::String(s) if s.is_empty() => None,
            Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        })
}

fn text_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload.get(key).and_then(Value::as_str)
}

/// Accepts `7` or `"7"`.
fn command_id_field(payload: &Value) -> Option<i64> {
    match payload.get("command_id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn non_empty(s: String) -> Option<String> {
    (!s.is_empty()).then_some(s)
}

impl From<FirmwareRelease> for FirmwarePayload {
    fn from(release: FirmwareRelease) -> Self {
        Self {
            version: Some(release.version),
            content: Some(release.content),
            checksum: Some(release.checksum),
            config: non_empty(release.config),
            config_version: non_empty(release.config_version),
            config_checksum: non_empty(release.config_checksum),
        }
    }
}

impl CommandQueue {
    pub fn new(db: DoorLinkDatabase, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    pub fn db(&self) -> &DoorLinkDatabase {
        &self.db
    }

    pub fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // =========================================================================
    // Device operations
    // =========================================================================

    /// Resolve the device owning `token`.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Device, ApiError> {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return Err(ApiError::InvalidToken);
        };
        self.db
            .device_by_token(token)
            .await?
            .ok_or(ApiError::InvalidToken)
    }

    /// Record the poll, expire stale commands, and offer the oldest
    /// remaining pending one.
    pub async fn poll(&self, device: &Device) -> Result<CommandOffer, ApiError> {
        let now = self.now_ms();
        self.db.touch_device(device.id, now).await?;

        let expired = self
            .db
            .expire_stale_commands(device.id, now - COMMAND_EXPIRY_MS, now)
            .await?;
        if expired > 0 {
            info!(device_id = device.id, expired, "Expired uncollected commands");
        }

        let Some(command) = self.db.oldest_pending_command(device.id).await? else {
            return Ok(CommandOffer::empty());
        };
        let command_id = u64::try_from(command.id)
            .map_err(|_| DatabaseError::Query(format!("invalid command id {}", command.id)))?;
        debug!(device_id = device.id, command_id, "Offering command");
        Ok(CommandOffer::open(command_id, DEFAULT_PULSE_MS))
    }

    /// Mark the device's pending command `command_id` executed.
    pub async fn acknowledge(&self, device: &Device, payload: &Value) -> Result<(), ApiError> {
        let Some(command_id) = command_id_field(payload) else {
            return Err(ApiError::CommandNotFound);
        };
        if !self
            .db
            .mark_executed(device.id, command_id, self.now_ms())
            .await?
        {
            debug!(device_id = device.id, command_id, "Ack for non-pending command");
            return Err(ApiError::CommandNotFound);
        }
        info!(device_id = device.id, command_id, "Command executed");
        Ok(())
    }

    /// Persist one diagnostic record with sanitised, enriched metadata.
    pub async fn ingest_log(
        &self,
        device: &Device,
        payload: &Value,
        client: &ClientInfo,
    ) -> Result<(), ApiError> {
        let message = log_message(payload).ok_or(ApiError::MissingMessage)?;
        let level = text_field(payload, "level").map_or(LogLevel::Info, LogLevel::parse_lenient);
        let event_type = text_field(payload, "event_type")
            .filter(|t| !t.is_empty())
            .unwrap_or(DEFAULT_EVENT_TYPE);
        let firmware_version = text_field(payload, "firmware_version").unwrap_or_default();

        let mut metadata = payload
            .get("metadata")
            .cloned()
            .map(sanitize::sanitize_json)
            .unwrap_or_default();
        metadata.insert(META_CLIENT_IP.to_string(), Value::String(client.ip.clone()));
        metadata.insert(
            META_USER_AGENT.to_string(),
            Value::String(client.user_agent.clone()),
        );
        let metadata = Value::Object(metadata).to_string();

        let now = self.now_ms();
        let entry = NewDeviceLog {
            level: level.as_str(),
            event_type,
            message: &message,
            firmware_version,
            metadata: &metadata,
        };
        self.db.insert_log(device.id, &entry, now).await?;
        self.db.touch_device(device.id, now).await?;
        debug!(device_id = device.id, level = level.as_str(), event_type, "Log ingested");
        Ok(())
    }

    /// The device's current release, or the empty payload.
    pub async fn fetch_firmware(&self, device: &Device) -> Result<FirmwarePayload, ApiError> {
        Ok(self
            .db
            .release_for(device.id)
            .await?
            .map(FirmwarePayload::from)
            .unwrap_or_default())
    }

    // =========================================================================
    // Collaborator operations
    // =========================================================================

    /// Register a device under a fresh random token.
    pub async fn register_device(&self, label: &str) -> Result<Device, DatabaseError> {
        let token = uuid::Uuid::new_v4().simple().to_string();
        let device = self.db.create_device(label, &token, self.now_ms()).await?;
        info!(device_id = device.id, label, "Device registered");
        Ok(device)
    }

    /// Queue an open command for `device_id`.
    pub async fn create_command(
        &self,
        device_id: i64,
        requested_by: Option<&str>,
    ) -> Result<Command, DatabaseError> {
        let command = self
            .db
            .create_command(
                device_id,
                requested_by,
                i64::from(DEFAULT_PULSE_MS),
                self.now_ms(),
            )
            .await?;
        info!(device_id, command_id = command.id, "Command queued");
        Ok(command)
    }

    /// Replace the device's release; checksums are recomputed.
    pub async fn publish_release(
        &self,
        device_id: i64,
        version: &str,
        content: &str,
        config: &str,
        config_version: &str,
    ) -> Result<FirmwareRelease, DatabaseError> {
        let release = self
            .db
            .upsert_release(
                device_id,
                version,
                content,
                config,
                config_version,
                self.now_ms(),
            )
            .await?;
        info!(device_id, version, config_version, "Release published");
        Ok(release)
    }
}
