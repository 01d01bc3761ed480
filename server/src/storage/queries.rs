//! Database queries for the DoorLink backend.

use doorlink::integrity;

use super::db::{DatabaseError, DoorLinkDatabase};
use super::models::{Command, Device, DeviceLog, FirmwareRelease, NewDeviceLog};

/// Digest of `content`, or empty when there is no content to describe.
fn checksum_of(content: &str) -> String {
    if content.is_empty() {
        String::new()
    } else {
        integrity::digest_hex(content.as_bytes())
    }
}

impl DoorLinkDatabase {
    // =========================================================================
    // Device queries
    // =========================================================================

    pub async fn create_device(
        &self,
        label: &str,
        api_token: &str,
        now: i64,
    ) -> Result<Device, DatabaseError> {
        let result =
            sqlx::query("INSERT INTO devices (label, api_token, created_at) VALUES (?, ?, ?)")
                .bind(label)
                .bind(api_token)
                .bind(now)
                .execute(self.pool())
                .await?;

        self.get_device(result.last_insert_rowid()).await
    }

    pub async fn get_device(&self, id: i64) -> Result<Device, DatabaseError> {
        sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Device {id}")))
    }

    /// Exact-match token lookup.
    pub async fn device_by_token(&self, api_token: &str) -> Result<Option<Device>, DatabaseError> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE api_token = ?")
            .bind(api_token)
            .fetch_optional(self.pool())
            .await?;

        Ok(device)
    }

    pub async fn list_devices(&self) -> Result<Vec<Device>, DatabaseError> {
        let devices = sqlx::query_as::<_, Device>("SELECT * FROM devices ORDER BY id")
            .fetch_all(self.pool())
            .await?;

        Ok(devices)
    }

    /// Delete a device with its commands, release, and logs.
    pub async fn delete_device(&self, id: i64) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM devices WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn touch_device(&self, id: i64, now: i64) -> Result<(), DatabaseError> {
        sqlx::query("UPDATE devices SET last_seen = ? WHERE id = ?")
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;

        Ok(())
    }

    // =========================================================================
    // Command queries
    // =========================================================================

    pub async fn create_command(
        &self,
        device_id: i64,
        requested_by: Option<&str>,
        pulse_ms: i64,
        now: i64,
    ) -> Result<Command, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO commands (device_id, requested_by, pulse_ms, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(requested_by)
        .bind(pulse_ms)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get_command(result.last_insert_rowid()).await
    }

    pub async fn get_command(&self, id: i64) -> Result<Command, DatabaseError> {
        sqlx::query_as::<_, Command>("SELECT * FROM commands WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Command {id}")))
    }

    /// Mark every pending command of `device_id` created at or before
    /// `cutoff` as expired. Returns the number of commands expired.
    pub async fn expire_stale_commands(
        &self,
        device_id: i64,
        cutoff: i64,
        now: i64,
    ) -> Result<u64, DatabaseError> {
        let result = sqlx::query(
            "UPDATE commands SET expired = 1, executed_at = ? \
             WHERE device_id = ? AND executed = 0 AND expired = 0 AND created_at <= ?",
        )
        .bind(now)
        .bind(device_id)
        .bind(cutoff)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected())
    }

    pub async fn oldest_pending_command(
        &self,
        device_id: i64,
    ) -> Result<Option<Command>, DatabaseError> {
        let command = sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE device_id = ? AND executed = 0 AND expired = 0 \
             ORDER BY created_at, id LIMIT 1",
        )
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(command)
    }

    /// Transition a pending command of `device_id` to executed.
    ///
    /// The update is guarded by the pending predicate, so of two racing
    /// acknowledgements (or an acknowledgement racing the expiry sweep)
    /// exactly one sees a row affected. Returns whether this call won.
    pub async fn mark_executed(
        &self,
        device_id: i64,
        command_id: i64,
        now: i64,
    ) -> Result<bool, DatabaseError> {
        let result = sqlx::query(
            "UPDATE commands SET executed = 1, executed_at = ? \
             WHERE id = ? AND device_id = ? AND executed = 0 AND expired = 0",
        )
        .bind(now)
        .bind(command_id)
        .bind(device_id)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_commands(&self, device_id: i64) -> Result<Vec<Command>, DatabaseError> {
        let commands = sqlx::query_as::<_, Command>(
            "SELECT * FROM commands WHERE device_id = ? ORDER BY created_at, id",
        )
        .bind(device_id)
        .fetch_all(self.pool())
        .await?;

        Ok(commands)
    }

    // =========================================================================
    // Release queries
    // =========================================================================

    /// Create or replace the device's release. Both checksums are
    /// recomputed from the content being written.
    pub async fn upsert_release(
        &self,
        device_id: i64,
        version: &str,
        content: &str,
        config: &str,
        config_version: &str,
        now: i64,
    ) -> Result<FirmwareRelease, DatabaseError> {
        sqlx::query(
            "INSERT INTO firmware_releases \
             (device_id, version, content, checksum, config, config_version, config_checksum, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(device_id) DO UPDATE SET \
             version = excluded.version, content = excluded.content, checksum = excluded.checksum, \
             config = excluded.config, config_version = excluded.config_version, \
             config_checksum = excluded.config_checksum, updated_at = excluded.updated_at",
        )
        .bind(device_id)
        .bind(version)
        .bind(content)
        .bind(checksum_of(content))
        .bind(config)
        .bind(config_version)
        .bind(checksum_of(config))
        .bind(now)
        .execute(self.pool())
        .await?;

        self.release_for(device_id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Release for device {device_id}")))
    }

    pub async fn release_for(
        &self,
        device_id: i64,
    ) -> Result<Option<FirmwareRelease>, DatabaseError> {
        let release = sqlx::query_as::<_, FirmwareRelease>(
            "SELECT * FROM firmware_releases WHERE device_id = ?",
        )
        .bind(device_id)
        .fetch_optional(self.pool())
        .await?;

        Ok(release)
    }

    // =========================================================================
    // Log queries
    // =========================================================================

    pub async fn insert_log(
        &self,
        device_id: i64,
        entry: &NewDeviceLog<'_>,
        now: i64,
    ) -> Result<i64, DatabaseError> {
        let result = sqlx::query(
            "INSERT INTO device_logs \
             (device_id, level, event_type, message, firmware_version, metadata, created_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(device_id)
        .bind(entry.level)
        .bind(entry.event_type)
        .bind(entry.message)
        .bind(entry.firmware_version)
        .bind(entry.metadata)
        .bind(now)
        .execute(self.pool())
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Most recent logs first.
    pub async fn recent_logs(
        &self,
        device_id: i64,
        limit: i64,
    ) -> Result<Vec<DeviceLog>, DatabaseError> {
        let logs = sqlx::query_as::<_, DeviceLog>(
            "SELECT * FROM device_logs WHERE device_id = ? ORDER BY created_at DESC, id DESC LIMIT ?",
        )
        .bind(device_id)
        .bind(limit)
        .fetch_all(self.pool())
        .await?;

        Ok(logs)
    }
}
