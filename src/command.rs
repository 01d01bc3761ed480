//! Command channel client.
//!
//! One poll per loop iteration: fetch the offer, pulse the relay if it
//! says open, then acknowledge. Delivery is at-least-once, so the client
//! remembers a command whose pulse ran but whose ack was lost in transit;
//! if the backend offers that id again the door is not opened twice, only
//! the acknowledgement is retried.

use log::debug;

use crate::app::context::AgentContext;
use crate::app::events::AgentEvent;
use crate::app::ports::{Board, EventSink};
use crate::protocol::DEFAULT_PULSE_MS;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Poll failed; nothing happened locally.
    PollFailed,
    /// No actionable command.
    Idle,
    /// Relay pulsed. `acked` is false if the ack still has to be delivered.
    Executed {
        command_id: Option<u64>,
        pulse_ms: u32,
        acked: bool,
    },
    /// Re-offer of an already pulsed command; only the ack was retried.
    Duplicate { command_id: u64, acked: bool },
}

/// Clamp an offered pulse to what the hardware is allowed to do.
pub fn effective_pulse_ms(offered: Option<u32>, max_pulse_ms: u32) -> u32 {
    offered.unwrap_or(DEFAULT_PULSE_MS).clamp(1, max_pulse_ms.max(1))
}

fn pulse(board: &mut Board<'_>, duration_ms: u32) {
    board.relay.energize();
    board.clock.sleep_ms(duration_ms);
    board.relay.release();
}

/// Send the ack and update `pending_ack` from the outcome. Returns whether
/// the backend recorded it.
fn acknowledge(
    ctx: &mut AgentContext,
    board: &mut Board<'_>,
    events: &mut dyn EventSink,
    command_id: u64,
) -> bool {
    board.watchdog.feed();
    let result = board.backend.acknowledge(command_id);
    board.watchdog.feed();
    match result {
        Ok(()) => {
            ctx.pending_ack = None;
            true
        }
        Err(error) => {
            // Only a lost-in-transit ack may be retried; NotFound and Auth
            // are final for this id.
            ctx.pending_ack = error.is_transient().then_some(command_id);
            events.emit(&AgentEvent::AckFailed { command_id, error });
            false
        }
    }
}

/// Poll once and act on the offer.
pub fn service(
    ctx: &mut AgentContext,
    board: &mut Board<'_>,
    events: &mut dyn EventSink,
) -> CommandOutcome {
    board.watchdog.feed();
    let polled = board.backend.poll_command();
    board.watchdog.feed();

    let offer = match polled {
        Ok(offer) => offer,
        Err(error) => {
            events.emit(&AgentEvent::BackendError {
                operation: "poll",
                error,
            });
            return CommandOutcome::PollFailed;
        }
    };

    if !offer.open {
        // Anything we still owed an ack for has left the queue.
        ctx.pending_ack = None;
        return CommandOutcome::Idle;
    }

    if let Some(id) = offer.command_id.filter(|id| ctx.pending_ack == Some(*id)) {
        events.emit(&AgentEvent::DuplicateOffer { command_id: id });
        let acked = acknowledge(ctx, board, events, id);
        return CommandOutcome::Duplicate {
            command_id: id,
            acked,
        };
    }

    let pulse_ms = effective_pulse_ms(offer.pulse_ms, ctx.config.max_pulse_ms);
    if offer.pulse_ms.is_some_and(|p| p != pulse_ms) {
        debug!("CMD  | pulse {:?}ms clamped to {pulse_ms}ms", offer.pulse_ms);
    }
    pulse(board, pulse_ms);
    board.watchdog.feed();
    ctx.stats.commands_executed = ctx.stats.commands_executed.saturating_add(1);
    events.emit(&AgentEvent::DoorOpened {
        command_id: offer.command_id,
        pulse_ms,
    });

    let acked = match offer.command_id {
        Some(id) => acknowledge(ctx, board, events, id),
        None => {
            ctx.pending_ack = None;
            false
        }
    };
    CommandOutcome::Executed {
        command_id: offer.command_id,
        pulse_ms,
        acked,
    }
}
