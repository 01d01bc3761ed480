//! Fuzz target: OTA apply pipeline
//!
//! Builds a firmware candidate from arbitrary content and checksum bytes
//! and runs it through `apply_candidate` against an in-memory store:
//! - A candidate is installed only if its checksum is empty or matches
//! - A rejected candidate leaves the installed version, every file, and the
//!   firmware slot untouched
//! - No temp file survives any outcome
//!
//! cargo fuzz run fuzz_ota_payload

#![no_main]

use std::collections::HashMap;

use doorlink::app::context::AgentContext;
use doorlink::app::events::AgentEvent;
use doorlink::app::ports::{EventSink, FirmwarePort, FlashError, StorageError, StoragePort};
use doorlink::config::AgentConfig;
use doorlink::integrity;
use doorlink::ota::{ApplyOutcome, apply_candidate};
use doorlink::protocol::{ArtifactCandidate, ArtifactKind};
use libfuzzer_sys::fuzz_target;

// ── In-memory StoragePort for fuzz testing ────────────────────

#[derive(Default)]
struct MemStore {
    files: HashMap<String, Vec<u8>>,
}

impl StoragePort for MemStore {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.files.get(name).cloned())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let data = self.files.remove(from).ok_or(StorageError::Io)?;
        self.files.insert(to.to_string(), data);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        self.files.remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

/// Firmware slot that keeps the last image it was given.
#[derive(Default)]
struct Slot {
    image: Option<Vec<u8>>,
}

impl FirmwarePort for Slot {
    fn install(&mut self, image: &[u8]) -> Result<(), FlashError> {
        self.image = Some(image.to_vec());
        Ok(())
    }
}

struct Discard;

impl EventSink for Discard {
    fn emit(&mut self, _event: &AgentEvent) {}
}

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte picks the checksum mode, the rest is content.
    let content = String::from_utf8_lossy(&data[1..]).into_owned();
    if content.is_empty() {
        return;
    }
    let checksum = match data[0] % 3 {
        0 => String::new(),
        1 => integrity::digest_hex(content.as_bytes()),
        _ => String::from_utf8_lossy(&data[..data.len().min(64)]).into_owned(),
    };

    let mut store = MemStore::default();
    let mut slot = Slot::default();
    let mut ctx = AgentContext::new(AgentConfig::default(), 0);
    ctx.firmware.version = "1.0.0".into();
    let before = store.files.clone();

    let candidate = ArtifactCandidate {
        kind: ArtifactKind::Firmware,
        version: "2.0.0".into(),
        content: content.clone(),
        checksum: checksum.clone(),
    };
    let outcome = apply_candidate(&mut ctx, &mut store, &mut slot, &mut Discard, &candidate);

    let should_install = integrity::verify(content.as_bytes(), &checksum).is_ok();
    if should_install {
        assert_eq!(outcome, ApplyOutcome::Installed);
        assert_eq!(ctx.firmware.version, "2.0.0");
        assert_eq!(slot.image.as_deref(), Some(content.as_bytes()));
        assert_eq!(store.files["firmware_version.txt"], b"2.0.0");
    } else {
        assert_eq!(outcome, ApplyOutcome::Rejected);
        assert_eq!(ctx.firmware.version, "1.0.0");
        assert_eq!(store.files, before);
        assert!(slot.image.is_none());
    }
    assert!(!store.files.keys().any(|k| k.ends_with(".tmp")));
});
