//! Row types.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Device {
    pub id: i64,
    pub label: String,
    pub api_token: String,
    pub last_seen: Option<i64>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandState {
    Pending,
    Executed,
    Expired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Command {
    pub id: i64,
    pub device_id: i64,
    /// `None` for system-issued commands.
    pub requested_by: Option<String>,
    pub executed: bool,
    pub expired: bool,
    pub pulse_ms: i64,
    pub created_at: i64,
    pub executed_at: Option<i64>,
}

impl Command {
    pub fn state(&self) -> CommandState {
        if self.executed {
            CommandState::Executed
        } else if self.expired {
            CommandState::Expired
        } else {
            CommandState::Pending
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct FirmwareRelease {
    pub device_id: i64,
    pub version: String,
    pub content: String,
    pub checksum: String,
    pub config: String,
    pub config_version: String,
    pub config_checksum: String,
    pub updated_at: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DeviceLog {
    pub id: i64,
    pub device_id: i64,
    pub level: String,
    pub event_type: String,
    pub message: String,
    pub firmware_version: String,
    /// Sanitised JSON object.
    pub metadata: String,
    pub created_at: i64,
}

/// Fields of a log row before insertion.
#[derive(Debug, Clone)]
pub struct NewDeviceLog<'a> {
    pub level: &'a str,
    pub event_type: &'a str,
    pub message: &'a str,
    pub firmware_version: &'a str,
    pub metadata: &'a str,
}
