//! Whole-loop behaviour: boot, iteration order, settings, supervision.

use doorlink::app::service::{AgentService, IDLE_SLICE_MS, RestartReason, supervise};
use doorlink::config::{AgentConfig, FACTORY_CONFIG_VERSION, FIRMWARE_VERSION};
use doorlink::diagnostics::CRASH_FILE;
use doorlink::protocol::{CommandOffer, FirmwarePayload, LogLevel};

use crate::mock_hw::{BackendCall, RelayCall, Rig, test_config};

// sha256("X")
const X_DIGEST: &str = "4b68ab3847feda7d6c62c1fbcbeebfa35eab7351ed5e78f4ddadea5df64b8015";

fn firmware_release() -> FirmwarePayload {
    FirmwarePayload {
        version: Some("2.0.0".into()),
        content: Some("X".into()),
        checksum: Some(X_DIGEST.into()),
        ..Default::default()
    }
}

fn booted(rig: &mut Rig, config: AgentConfig) -> AgentService {
    let mut service = AgentService::new(config, rig.now());
    service.boot(&mut rig.board());
    service
}

#[test]
fn first_boot_seeds_version_files() {
    let mut rig = Rig::online();
    let service = booted(&mut rig, test_config());

    assert_eq!(
        rig.storage.text("firmware_version.txt").as_deref(),
        Some(FIRMWARE_VERSION)
    );
    assert_eq!(
        rig.storage.text("config_version.txt").as_deref(),
        Some(FACTORY_CONFIG_VERSION)
    );
    assert_eq!(service.context().firmware.version, FIRMWARE_VERSION);
    assert_eq!(service.reporter().pending(), 1);
}

#[test]
fn previous_crash_is_reported_once() {
    let mut rig = Rig::online();
    rig.storage.put(CRASH_FILE, "boom at src/command.rs:40");
    let mut service = booted(&mut rig, test_config());
    assert!(!rig.storage.exists_file(CRASH_FILE));

    service.iterate(&mut rig.board());

    let boots = rig.backend.logs_of_type("boot");
    let boot = boots[0];
    assert_eq!(boot.level, Some(LogLevel::Warning));
    assert_eq!(
        boot.metadata.as_ref().unwrap()["last_crash"],
        "boom at src/command.rs:40"
    );
}

#[test]
fn iteration_polls_before_checking_updates() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer::open(7, 750)));
    let mut service = booted(&mut rig, test_config());

    assert_eq!(service.iterate(&mut rig.board()), None);

    let poll = rig.backend.calls.iter().position(|c| *c == BackendCall::Poll);
    let fetch = rig.backend.calls.iter().position(|c| *c == BackendCall::Fetch);
    assert!(poll.unwrap() < fetch.unwrap());
    assert_eq!(rig.relay.pulses(), 1);
    assert_eq!(rig.backend.logs_of_type("command").len(), 1);
    assert_eq!(service.reporter().pending(), 0);
}

#[test]
fn firmware_install_requests_restart() {
    let mut rig = Rig::online();
    rig.backend.release = Ok(firmware_release());
    let mut service = booted(&mut rig, test_config());

    let reason = service.iterate(&mut rig.board());

    assert_eq!(
        reason,
        Some(RestartReason::FirmwareUpdated {
            version: "2.0.0".into()
        })
    );
    assert!(
        rig.backend
            .logs
            .last()
            .unwrap()
            .message
            .starts_with("restarting")
    );
    assert!(
        rig.backend
            .logs_of_type("ota")
            .iter()
            .any(|l| l.message == "firmware 2.0.0 installed")
    );
}

#[test]
fn installed_settings_override_defaults_at_boot() {
    let mut rig = Rig::online();
    rig.storage
        .put("config.json", r#"{"poll_interval_ms": 2000}"#);
    rig.storage.put("config_version.txt", "c1");
    let service = booted(&mut rig, test_config());

    assert_eq!(service.context().config.poll_interval_ms, 2_000);
    assert_eq!(service.context().config_artifact.version, "c1");
}

#[test]
fn invalid_settings_keep_running_config() {
    let mut rig = Rig::online();
    rig.storage.put("config.json", r#"{"poll_interval_ms": 0}"#);
    let mut service = booted(&mut rig, test_config());
    assert_eq!(service.context().config.poll_interval_ms, 1_000);

    service.iterate(&mut rig.board());
    assert!(
        rig.backend
            .logs_of_type("ota")
            .iter()
            .any(|l| l.message.contains("not applied"))
    );
}

#[test]
fn settings_may_not_touch_backend_credentials() {
    let mut rig = Rig::online();
    rig.storage
        .put("config.json", r#"{"device_token": "stolen"}"#);
    let service = booted(&mut rig, test_config());
    assert_eq!(service.context().config.device_token, "tok");
}

#[test]
fn config_artifact_applies_without_restart() {
    let mut rig = Rig::online();
    rig.backend.release = Ok(FirmwarePayload {
        config: Some(r#"{"heartbeat_interval_ms": 30000}"#.into()),
        config_version: Some("c2".into()),
        ..Default::default()
    });
    let mut service = booted(&mut rig, test_config());

    assert_eq!(service.iterate(&mut rig.board()), None);
    assert_eq!(service.context().config.heartbeat_interval_ms, 30_000);
    assert_eq!(service.context().config_artifact.version, "c2");
}

#[test]
fn no_link_skips_backend_and_waits() {
    let mut rig = Rig::new();
    let mut service = booted(&mut rig, test_config());

    assert_eq!(service.iterate(&mut rig.board()), None);
    assert!(rig.backend.calls.is_empty());
    assert!(rig.clock.sleeps.ends_with(&[IDLE_SLICE_MS]));
}

#[test]
fn heartbeat_is_sent_once_due() {
    let mut rig = Rig::online();
    let config = AgentConfig {
        heartbeat_interval_ms: 3_000,
        ..test_config()
    };
    let mut service = booted(&mut rig, config);

    for _ in 0..5 {
        service.iterate(&mut rig.board());
    }

    let beats = rig.backend.logs_of_type("heartbeat");
    assert!(!beats.is_empty());
    let meta = beats[0].metadata.as_ref().unwrap();
    assert_eq!(meta["ssid"], "Primary");
    assert!(meta["iterations"].as_u64().unwrap() >= 1);
}

#[test]
fn watchdog_never_starves_across_iterations() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer::open(1, 1_500)));
    let mut service = booted(&mut rig, test_config());

    for _ in 0..4 {
        service.iterate(&mut rig.board());
    }
    assert!(rig.watchdog.max_gap_ms <= u64::from(IDLE_SLICE_MS.max(1_500)));
    assert!(rig.watchdog.max_gap_ms < u64::from(test_config().watchdog_timeout_ms));
}

#[test]
fn supervised_panic_becomes_fault_with_relay_released() {
    let mut rig = Rig::online();
    rig.backend.panic_on_poll = true;
    let config = test_config();
    let reset_delay = u64::from(config.reset_delay_ms);

    let reason = supervise(config, &mut rig.board());

    match reason {
        RestartReason::Fault(msg) => assert!(msg.contains("injected poll panic")),
        other => panic!("expected fault, got {other:?}"),
    }
    assert_eq!(rig.relay.calls.last(), Some(&RelayCall::Release));
    assert!(rig.backend.logs.last().unwrap().message.starts_with("restarting"));
    assert!(rig.now() >= reset_delay);
}

#[test]
fn supervised_firmware_update_returns_after_reset_delay() {
    let mut rig = Rig::online();
    rig.backend.release = Ok(firmware_release());

    let reason = supervise(test_config(), &mut rig.board());

    assert!(matches!(reason, RestartReason::FirmwareUpdated { .. }));
    assert_eq!(rig.relay.calls.last(), Some(&RelayCall::Release));
    assert_eq!(rig.storage.text("firmware_version.txt").as_deref(), Some("2.0.0"));
}
