//! Connectivity convergence against a scripted radio.

use doorlink::app::context::AgentContext;
use doorlink::app::events::AgentEvent;
use doorlink::connectivity::{ConnectivityError, ensure_connected};

use crate::mock_hw::{RecordingSink, Rig, test_config};

fn ctx() -> AgentContext {
    AgentContext::new(test_config(), 0)
}

fn link_ups(sink: &RecordingSink) -> Vec<(String, bool)> {
    sink.events
        .iter()
        .filter_map(|e| match e {
            AgentEvent::LinkUp {
                ssid, recovered, ..
            } => Some((ssid.clone(), *recovered)),
            _ => None,
        })
        .collect()
}

#[test]
fn connects_to_preferred_visible_network() {
    let mut rig = Rig::new();
    rig.wifi.offer("Backup", "password2");
    rig.wifi.offer("Primary", "password1");
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    assert!(ensure_connected(&mut ctx, &mut rig.board(), &mut sink).is_ok());

    assert_eq!(rig.wifi.connect_calls, ["Primary"]);
    assert_eq!(ctx.link.ssid.as_deref(), Some("Primary"));
    assert!(ctx.link.up);
    assert_eq!(link_ups(&sink), [("Primary".to_string(), false)]);
}

#[test]
fn invisible_networks_are_not_attempted() {
    let mut rig = Rig::new();
    rig.wifi.offer("Backup", "password2");
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();
    assert_eq!(rig.wifi.connect_calls, ["Backup"]);
}

#[test]
fn failed_scan_tries_every_network_in_priority_order() {
    let mut rig = Rig::new();
    rig.wifi.scan_fails = true;
    rig.wifi
        .reachable
        .insert("Backup".into(), "password2".into());
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();
    assert_eq!(rig.wifi.connect_calls, ["Primary", "Backup"]);
    assert_eq!(ctx.link.ssid.as_deref(), Some("Backup"));
}

#[test]
fn driver_fault_power_cycles_and_moves_on() {
    let mut rig = Rig::new();
    rig.wifi.offer("Primary", "password1");
    rig.wifi.offer("Backup", "password2");
    rig.wifi.faulty.insert("Primary".into());
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();

    assert_eq!(rig.wifi.set_active_calls, [true, false, true]);
    assert_eq!(rig.wifi.power_cycles(), 1);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::DriverFault { ssid, code: -3 } if ssid == "Primary"
    )));
    assert_eq!(ctx.link.ssid.as_deref(), Some("Backup"));
}

#[test]
fn exhausted_sweep_reports_link_down() {
    let mut rig = Rig::new();
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let err = ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap_err();

    assert_eq!(err, ConnectivityError::Exhausted { attempted: 2 });
    assert_eq!(rig.wifi.connect_calls, ["Primary", "Backup"]);
    assert_eq!(sink.events.last(), Some(&AgentEvent::LinkDown));
    assert!(!ctx.link.up);
}

#[test]
fn existing_association_is_accepted_without_scanning() {
    let mut rig = Rig::new();
    rig.wifi.active = true;
    rig.wifi.connected = true;
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();
    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();

    assert_eq!(rig.wifi.scans, 0);
    assert!(rig.wifi.connect_calls.is_empty());
    assert!(rig.wifi.set_active_calls.is_empty());
    assert_eq!(link_ups(&sink).len(), 1);
}

#[test]
fn lost_link_is_recovered_and_counted() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();
    rig.wifi.drop_link();
    ensure_connected(&mut ctx, &mut rig.board(), &mut sink).unwrap();

    assert_eq!(ctx.link.reconnects, 1);
    assert_eq!(
        link_ups(&sink),
        [
            ("Primary".to_string(), false),
            ("Primary".to_string(), true)
        ]
    );
}

#[test]
fn watchdog_is_fed_throughout_a_failing_sweep() {
    let mut rig = Rig::new();
    rig.wifi.faulty.insert("Primary".into());
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let _ = ensure_connected(&mut ctx, &mut rig.board(), &mut sink);

    let timing = &ctx.config.wifi;
    let longest_sleep = timing
        .retry_delay_ms
        .max(timing.existing_check_ms)
        .max(timing.power_cycle_delay_ms);
    assert!(rig.now() > u64::from(ctx.config.watchdog_timeout_ms) / 10);
    assert!(rig.watchdog.max_gap_ms <= u64::from(longest_sleep));
}
