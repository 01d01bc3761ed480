//! OTA checks: verification, install through the firmware slot, and rate
//! limiting.

use doorlink::app::context::{AgentContext, ArtifactState};
use doorlink::app::events::AgentEvent;
use doorlink::app::ports::FlashError;
use doorlink::error::{Error, TransportError};
use doorlink::ota::{self, OtaReport};
use doorlink::protocol::{ArtifactKind, FirmwarePayload};

use crate::mock_hw::{BackendCall, RecordingSink, Rig, test_config};

// sha256("X")
const X_DIGEST: &str = "4b68ab3847feda7d6c62c1fbcbeebfa35eab7351ed5e78f4ddadea5df64b8015";

fn ctx() -> AgentContext {
    let mut ctx = AgentContext::new(test_config(), 0);
    ctx.firmware.version = "1.0.0".into();
    ctx
}

fn release(version: &str, content: &str, checksum: &str) -> FirmwarePayload {
    FirmwarePayload {
        version: Some(version.into()),
        content: Some(content.into()),
        checksum: Some(checksum.into()),
        ..Default::default()
    }
}

#[test]
fn verified_release_is_installed_then_skipped() {
    let mut rig = Rig::online();
    rig.backend.release = Ok(release("2.0.0", "X", X_DIGEST));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.checked && report.firmware_installed);
    assert_eq!(ctx.firmware.version, "2.0.0");
    assert_eq!(ctx.firmware.checksum, X_DIGEST);
    assert_eq!(rig.firmware.last_text().as_deref(), Some("X"));
    assert_eq!(rig.storage.text("firmware_version.txt").as_deref(), Some("2.0.0"));
    assert_eq!(rig.storage.text("firmware_checksum.txt").as_deref(), Some(X_DIGEST));
    let writes = rig.storage.writes;

    rig.advance(ctx.config.ota_check_interval_ms);
    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.checked && !report.firmware_installed);
    assert_eq!(rig.storage.writes, writes);
    assert_eq!(rig.firmware.images.len(), 1);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::OtaSkipped { kind: ArtifactKind::Firmware, version } if version == "2.0.0"
    )));
}

#[test]
fn checksum_mismatch_changes_nothing_and_retries_next_interval() {
    let mut rig = Rig::online();
    rig.backend.release = Ok(release("2.0.0", "X", &"0".repeat(64)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(!report.firmware_installed);
    assert_eq!(ctx.firmware.version, "1.0.0");
    assert_eq!(ctx.firmware.state, ArtifactState::Rejected);
    assert_eq!(rig.storage.writes, 0);
    assert!(rig.firmware.images.is_empty());
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, AgentEvent::OtaRejected { .. }))
    );

    rig.advance(ctx.config.ota_check_interval_ms);
    ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(rig.backend.count(&BackendCall::Fetch), 2);
    assert_eq!(rig.storage.writes, 0);
}

#[test]
fn checks_are_rate_limited() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ota::check(&mut ctx, &mut rig.board(), &mut sink);
    rig.advance(ctx.config.ota_check_interval_ms - 1);
    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(report, OtaReport::default());
    assert_eq!(rig.backend.count(&BackendCall::Fetch), 1);
}

#[test]
fn disabled_updates_never_fetch() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    ctx.config.ota_enabled = false;
    let mut sink = RecordingSink::default();

    ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(rig.backend.calls.is_empty());
}

#[test]
fn config_is_installed_before_firmware() {
    let mut rig = Rig::online();
    let mut payload = release("2.0.0", "X", X_DIGEST);
    payload.config = Some(r#"{"poll_interval_ms":2000}"#.into());
    payload.config_version = Some("c2".into());
    rig.backend.release = Ok(payload);
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.config_installed && report.firmware_installed);

    let applied: Vec<ArtifactKind> = sink
        .events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::OtaApplied { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(applied, [ArtifactKind::Config, ArtifactKind::Firmware]);
    assert_eq!(rig.storage.text("config_version.txt").as_deref(), Some("c2"));
}

#[test]
fn flash_failure_keeps_previous_version() {
    let mut rig = Rig::online();
    rig.firmware.fail = Some(FlashError::Write);
    rig.backend.release = Ok(release("2.0.0", "X", X_DIGEST));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(!report.firmware_installed);
    assert_eq!(ctx.firmware.version, "1.0.0");
    assert_eq!(ctx.firmware.state, ArtifactState::UnknownInstalled);
    assert!(!rig.storage.exists_file("firmware_version.txt"));
    assert!(!rig.storage.exists_file("firmware_checksum.txt"));
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::OtaFailed {
            kind: ArtifactKind::Firmware,
            error: Error::Flash(FlashError::Write),
            ..
        }
    )));

    // The next interval tries again and succeeds.
    rig.firmware.fail = None;
    rig.advance(ctx.config.ota_check_interval_ms);
    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.firmware_installed);
    assert_eq!(ctx.firmware.version, "2.0.0");
}

#[test]
fn failed_config_rename_keeps_previous_config() {
    let mut rig = Rig::online();
    rig.storage.put("config.json", "{}");
    rig.storage.fail_rename = true;
    rig.backend.release = Ok(FirmwarePayload {
        config: Some(r#"{"poll_interval_ms":2000}"#.into()),
        config_version: Some("c2".into()),
        ..Default::default()
    });
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(!report.config_installed);
    assert_eq!(rig.storage.text("config.json").as_deref(), Some("{}"));
    assert!(!rig.storage.exists_tmp());
    assert!(!rig.storage.exists_file("config_version.txt"));
    assert!(
        sink.events
            .iter()
            .any(|e| matches!(e, AgentEvent::OtaFailed { kind: ArtifactKind::Config, .. }))
    );
}

#[test]
fn fetch_error_is_reported() {
    let mut rig = Rig::online();
    rig.backend.release = Err(Error::Transport(TransportError::Status(502)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.fetch_failed);
    assert!(matches!(
        sink.events[0],
        AgentEvent::BackendError {
            operation: "firmware",
            ..
        }
    ));
}

#[test]
fn empty_release_is_a_no_op() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let report = ota::check(&mut ctx, &mut rig.board(), &mut sink);
    assert!(report.checked);
    assert!(!report.fetch_failed && !report.firmware_installed && !report.config_installed);
    assert!(sink.events.is_empty());
    assert_eq!(rig.storage.writes, 0);
}
