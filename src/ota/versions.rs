//! Persisted artifact versions.
//!
//! Each artifact kind has a live file plus a version label file and a
//! checksum file:
//!
//! | Kind       | Live           | Version                | Checksum                |
//! |------------|----------------|------------------------|-------------------------|
//! | firmware   | `firmware.img` | `firmware_version.txt` | `firmware_checksum.txt` |
//! | config     | `config.json`  | `config_version.txt`   | `config_checksum.txt`   |
//!
//! `firmware.img` is only written by the file-backed firmware slot; on the
//! device the image goes to an OTA app partition and only the label files
//! live here. Every write goes through [`write_atomic`], so a reset
//! mid-write leaves either the old or the new file.

use log::warn;

use crate::app::ports::{StorageError, StoragePort};
use crate::protocol::ArtifactKind;

pub fn live_file(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Firmware => "firmware.img",
        ArtifactKind::Config => "config.json",
    }
}

pub fn version_file(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Firmware => "firmware_version.txt",
        ArtifactKind::Config => "config_version.txt",
    }
}

pub fn checksum_file(kind: ArtifactKind) -> &'static str {
    match kind {
        ArtifactKind::Firmware => "firmware_checksum.txt",
        ArtifactKind::Config => "config_checksum.txt",
    }
}

pub fn temp_name(name: &str) -> String {
    format!("{name}.tmp")
}

/// Write `data` to `<name>.tmp`, then rename over `name`.
///
/// On failure the temp file is removed best-effort and the destination is
/// untouched.
pub fn write_atomic(
    storage: &mut dyn StoragePort,
    name: &str,
    data: &[u8],
) -> Result<(), StorageError> {
    let tmp = temp_name(name);
    let result = storage
        .write(&tmp, data)
        .and_then(|()| storage.rename(&tmp, name));
    if result.is_err() {
        let _ = storage.remove(&tmp);
    }
    result
}

fn read_trimmed(storage: &dyn StoragePort, name: &str) -> Result<Option<String>, StorageError> {
    Ok(storage
        .read(name)?
        .map(|raw| String::from_utf8_lossy(&raw).trim().to_string())
        .filter(|s| !s.is_empty()))
}

/// Installed version and checksum for `kind`.
///
/// A missing or empty version file is seeded with `default` and persisted,
/// so the agent never runs without a version. A missing checksum reads as
/// empty. Storage errors fall back to `default` without persisting.
pub fn load_or_seed(
    storage: &mut dyn StoragePort,
    kind: ArtifactKind,
    default: &str,
) -> (String, String) {
    let version = match read_trimmed(storage, version_file(kind)) {
        Ok(Some(version)) => version,
        Ok(None) => {
            if let Err(e) = write_atomic(storage, version_file(kind), default.as_bytes()) {
                warn!("OTA  | cannot seed {}: {e}", version_file(kind));
            }
            default.to_string()
        }
        Err(e) => {
            warn!("OTA  | cannot read {}: {e}", version_file(kind));
            default.to_string()
        }
    };
    let checksum = read_trimmed(storage, checksum_file(kind))
        .ok()
        .flatten()
        .unwrap_or_default();
    (version, checksum)
}

/// Record a newly installed artifact. Checksum first, so a reset between
/// the two writes leaves the old version label and the next check simply
/// re-applies.
pub fn persist(
    storage: &mut dyn StoragePort,
    kind: ArtifactKind,
    version: &str,
    checksum: &str,
) -> Result<(), StorageError> {
    write_atomic(storage, checksum_file(kind), checksum.as_bytes())?;
    write_atomic(storage, version_file(kind), version.as_bytes())
}
