//! OTA updater: fetch, verify, apply.
//!
//! Firmware and config are tracked independently. For each artifact the
//! pipeline is:
//!
//! ```text
//!   candidate ── same version label? ──yes──▶ skip (no storage write)
//!       │ no
//!       ▼
//!   verify checksum ──mismatch──▶ reject (error diagnostic, retried next interval)
//!       │ ok
//!       ▼
//!   install ─▶ persist checksum + version
//!     config:   write config.json.tmp ─▶ rename over config.json
//!     firmware: FirmwarePort (OTA slot on the device, image file on host)
//! ```
//!
//! Any install failure leaves the installed artifact untouched, and the
//! version label is only recorded after the install returned. Config is
//! processed before firmware so a release carrying both gets its config in
//! place before the firmware restart.

pub mod versions;

use crate::app::context::{AgentContext, ArtifactState};
use crate::app::events::AgentEvent;
use crate::app::ports::{Board, EventSink, FirmwarePort, StoragePort};
use crate::error::Error;
use crate::integrity;
use crate::protocol::{ArtifactCandidate, ArtifactKind};

/// Order in which artifacts of one release are applied.
pub const APPLY_ORDER: [ArtifactKind; 2] = [ArtifactKind::Config, ArtifactKind::Firmware];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Version label already installed.
    Skipped,
    /// Checksum mismatch; nothing written.
    Rejected,
    /// Storage failed; previous artifact kept.
    Failed,
    Installed,
}

/// What one OTA check did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OtaReport {
    /// The check ran (it was due and enabled).
    pub checked: bool,
    pub fetch_failed: bool,
    pub config_installed: bool,
    pub firmware_installed: bool,
}

/// Put one verified artifact in place, then record it.
fn install(
    storage: &mut dyn StoragePort,
    firmware: &mut dyn FirmwarePort,
    candidate: &ArtifactCandidate,
    checksum: &str,
) -> Result<(), Error> {
    let content = candidate.content.as_bytes();
    match candidate.kind {
        ArtifactKind::Config => {
            versions::write_atomic(storage, versions::live_file(candidate.kind), content)?;
        }
        ArtifactKind::Firmware => firmware.install(content)?,
    }
    versions::persist(storage, candidate.kind, &candidate.version, checksum)?;
    Ok(())
}

/// Run one candidate through skip → verify → install.
pub fn apply_candidate(
    ctx: &mut AgentContext,
    storage: &mut dyn StoragePort,
    firmware: &mut dyn FirmwarePort,
    events: &mut dyn EventSink,
    candidate: &ArtifactCandidate,
) -> ApplyOutcome {
    let kind = candidate.kind;
    let version = candidate.version.clone();
    let track = ctx.track_mut(kind);
    track.state = ArtifactState::CandidateAvailable;

    if candidate.version == track.version {
        track.state = ArtifactState::UnknownInstalled;
        events.emit(&AgentEvent::OtaSkipped { kind, version });
        return ApplyOutcome::Skipped;
    }

    if let Err(e) = integrity::verify(candidate.content.as_bytes(), &candidate.checksum) {
        track.state = ArtifactState::Rejected;
        events.emit(&AgentEvent::OtaRejected {
            kind,
            version,
            error: Error::Integrity(e),
        });
        return ApplyOutcome::Rejected;
    }
    track.state = ArtifactState::Verified;

    let digest = integrity::digest_hex(candidate.content.as_bytes());
    match install(storage, firmware, candidate, &digest) {
        Ok(()) => {
            track.version = version.clone();
            track.checksum = digest;
            track.state = ArtifactState::Installed;
            events.emit(&AgentEvent::OtaApplied { kind, version });
            ApplyOutcome::Installed
        }
        Err(error) => {
            track.state = ArtifactState::UnknownInstalled;
            events.emit(&AgentEvent::OtaFailed {
                kind,
                version,
                error,
            });
            ApplyOutcome::Failed
        }
    }
}

/// Run an OTA check if one is due.
pub fn check(
    ctx: &mut AgentContext,
    board: &mut Board<'_>,
    events: &mut dyn EventSink,
) -> OtaReport {
    let now = board.clock.now_ms();
    if !ctx.ota_due(now) {
        return OtaReport::default();
    }
    ctx.last_ota_check_ms = Some(now);
    let mut report = OtaReport {
        checked: true,
        ..OtaReport::default()
    };

    board.watchdog.feed();
    let fetched = board.backend.fetch_release();
    board.watchdog.feed();

    let payload = match fetched {
        Ok(payload) => payload,
        Err(error) => {
            events.emit(&AgentEvent::BackendError {
                operation: "firmware",
                error,
            });
            report.fetch_failed = true;
            return report;
        }
    };

    for kind in APPLY_ORDER {
        let Some(candidate) = payload.candidate(kind) else {
            continue;
        };
        let outcome = apply_candidate(ctx, board.storage, board.firmware, events, &candidate);
        board.watchdog.feed();
        if outcome == ApplyOutcome::Installed {
            match kind {
                ArtifactKind::Config => report.config_installed = true,
                ArtifactKind::Firmware => report.firmware_installed = true,
            }
        }
    }
    report
}
