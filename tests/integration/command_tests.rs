//! Command channel: relay pulses, acknowledgements, duplicate offers.

use doorlink::app::context::AgentContext;
use doorlink::app::events::AgentEvent;
use doorlink::command::{CommandOutcome, service};
use doorlink::error::{Error, TransportError};
use doorlink::protocol::{CommandOffer, DEFAULT_PULSE_MS};

use crate::mock_hw::{BackendCall, RecordingSink, RelayCall, Rig, test_config};

fn ctx() -> AgentContext {
    AgentContext::new(test_config(), 0)
}

#[test]
fn open_offer_pulses_then_acknowledges() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer::open(7, 750)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let outcome = service(&mut ctx, &mut rig.board(), &mut sink);

    assert_eq!(
        outcome,
        CommandOutcome::Executed {
            command_id: Some(7),
            pulse_ms: 750,
            acked: true
        }
    );
    assert_eq!(rig.relay.calls, [RelayCall::Energize, RelayCall::Release]);
    assert_eq!(rig.clock.sleeps, [750]);
    assert_eq!(rig.backend.calls, [BackendCall::Poll, BackendCall::Ack(7)]);
    assert_eq!(ctx.stats.commands_executed, 1);
    assert_eq!(ctx.pending_ack, None);
}

#[test]
fn empty_offer_leaves_relay_alone() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    assert_eq!(
        service(&mut ctx, &mut rig.board(), &mut sink),
        CommandOutcome::Idle
    );
    assert!(rig.relay.calls.is_empty());
    assert_eq!(rig.backend.calls, [BackendCall::Poll]);
}

#[test]
fn poll_failure_is_reported_and_harmless() {
    let mut rig = Rig::online();
    rig.backend
        .offers
        .push_back(Err(Error::Transport(TransportError::Timeout)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    assert_eq!(
        service(&mut ctx, &mut rig.board(), &mut sink),
        CommandOutcome::PollFailed
    );
    assert!(rig.relay.calls.is_empty());
    assert!(matches!(
        sink.events[0],
        AgentEvent::BackendError {
            operation: "poll",
            ..
        }
    ));
}

#[test]
fn lost_ack_is_retried_without_a_second_pulse() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer::open(7, 500)));
    rig.backend.offers.push_back(Ok(CommandOffer::open(7, 500)));
    rig.backend
        .ack_results
        .push_back(Err(Error::Transport(TransportError::Io)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let first = service(&mut ctx, &mut rig.board(), &mut sink);
    assert!(matches!(
        first,
        CommandOutcome::Executed { acked: false, .. }
    ));
    assert_eq!(ctx.pending_ack, Some(7));

    let second = service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(
        second,
        CommandOutcome::Duplicate {
            command_id: 7,
            acked: true
        }
    );
    assert_eq!(rig.relay.pulses(), 1);
    assert_eq!(rig.backend.count(&BackendCall::Ack(7)), 2);
    assert_eq!(ctx.pending_ack, None);
    assert!(
        sink.events
            .iter()
            .any(|e| *e == AgentEvent::DuplicateOffer { command_id: 7 })
    );
}

#[test]
fn not_found_ack_is_final() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer::open(9, 500)));
    rig.backend.offers.push_back(Ok(CommandOffer::open(9, 500)));
    rig.backend.ack_results.push_back(Err(Error::NotFound));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(ctx.pending_ack, None);
    assert!(sink.events.iter().any(|e| matches!(
        e,
        AgentEvent::AckFailed {
            command_id: 9,
            error: Error::NotFound
        }
    )));

    // A genuine re-offer after a final ack failure opens again.
    service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(rig.relay.pulses(), 2);
}

#[test]
fn empty_offer_clears_pending_ack() {
    let mut rig = Rig::online();
    let mut ctx = ctx();
    ctx.pending_ack = Some(3);
    let mut sink = RecordingSink::default();

    service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(ctx.pending_ack, None);
}

#[test]
fn oversized_pulse_is_clamped() {
    let mut rig = Rig::online();
    rig.backend
        .offers
        .push_back(Ok(CommandOffer::open(1, 60_000)));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(rig.clock.sleeps, [ctx.config.max_pulse_ms]);
    assert!(!rig.relay.calls.is_empty());
    assert_eq!(rig.relay.calls.last(), Some(&RelayCall::Release));
}

#[test]
fn offer_without_id_pulses_default_and_skips_ack() {
    let mut rig = Rig::online();
    rig.backend.offers.push_back(Ok(CommandOffer {
        open: true,
        command_id: None,
        pulse_ms: None,
    }));
    let mut ctx = ctx();
    let mut sink = RecordingSink::default();

    let outcome = service(&mut ctx, &mut rig.board(), &mut sink);
    assert_eq!(
        outcome,
        CommandOutcome::Executed {
            command_id: None,
            pulse_ms: DEFAULT_PULSE_MS,
            acked: false
        }
    );
    assert_eq!(rig.backend.calls, [BackendCall::Poll]);
}
