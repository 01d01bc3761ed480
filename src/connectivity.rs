//! Connectivity manager.
//!
//! Converges on an IP-addressed WiFi link from the ranked candidate list
//! and recovers from driver faults without operator intervention.
//!
//! ```text
//!   already connected? ──yes──▶ accept (bounded settle wait)
//!          │ no
//!          ▼
//!   scan ──▶ select_order(configured, visible) ──▶ for each candidate:
//!                                                   connect, poll status
//!                                                   ├─ GotIp      → done
//!                                                   ├─ status < 0 → power-cycle, next
//!                                                   └─ attempts exhausted → next
//! ```
//!
//! Every sleep inside a pass is followed by a watchdog feed, so a full
//! sweep never starves the TWDT regardless of candidate count.

use core::fmt;

use log::{debug, info, warn};

use crate::app::context::AgentContext;
use crate::app::events::AgentEvent;
use crate::app::ports::{Board, EventSink, LinkStatus, WifiDriver, WifiError};
use crate::config::{NetworkCandidate, WifiTiming};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityError {
    /// The radio could not be enabled.
    Radio(WifiError),
    /// Every candidate was tried without reaching `GotIp`.
    Exhausted { attempted: usize },
}

impl fmt::Display for ConnectivityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Radio(e) => write!(f, "radio unavailable: {e}"),
            Self::Exhausted { attempted } => {
                write!(f, "no link after trying {attempted} network(s)")
            }
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Candidate ordering
// ───────────────────────────────────────────────────────────────

/// Order in which to attempt the configured networks.
///
/// Candidates are sorted by ascending priority (stable, so ties keep their
/// configured order). With a scan result, only visible candidates are
/// kept; if none of them is visible, or the scan failed (`None`), the full
/// ranked list is returned.
pub fn select_order(
    configured: &[NetworkCandidate],
    scanned: Option<&[String]>,
) -> Vec<NetworkCandidate> {
    let mut ranked = configured.to_vec();
    ranked.sort_by_key(|c| c.priority);

    let Some(visible) = scanned else {
        return ranked;
    };
    let present: Vec<NetworkCandidate> = ranked
        .iter()
        .filter(|c| visible.iter().any(|ssid| *ssid == c.ssid))
        .cloned()
        .collect();
    if present.is_empty() { ranked } else { present }
}

// ───────────────────────────────────────────────────────────────
// Convergence
// ───────────────────────────────────────────────────────────────

enum AttemptFailure {
    DriverFault(i32),
    Rejected(WifiError),
    TimedOut,
}

fn power_cycle(board: &mut Board<'_>, timing: &WifiTiming) {
    if let Err(e) = board.wifi.set_active(false) {
        warn!("WIFI | disable failed during power cycle: {e}");
    }
    board.clock.sleep_ms(timing.power_cycle_delay_ms);
    board.watchdog.feed();
    if let Err(e) = board.wifi.set_active(true) {
        warn!("WIFI | enable failed during power cycle: {e}");
    }
}

/// Give an association the driver already has in flight a bounded chance
/// to come up on its own.
fn wait_for_existing(board: &mut Board<'_>, timing: &WifiTiming) -> bool {
    if board.wifi.is_connected() {
        return true;
    }
    let mut waited = 0;
    while waited < timing.existing_wait_ms {
        match board.wifi.status() {
            Ok(status) if status.may_settle() => {}
            _ => break,
        }
        board.clock.sleep_ms(timing.existing_check_ms);
        board.watchdog.feed();
        waited += timing.existing_check_ms;
        if board.wifi.is_connected() {
            return true;
        }
    }
    false
}

fn attempt(
    board: &mut Board<'_>,
    candidate: &NetworkCandidate,
    timing: &WifiTiming,
) -> Result<(), AttemptFailure> {
    board.wifi.disconnect();
    match board.wifi.connect(&candidate.ssid, &candidate.password) {
        Ok(()) => {}
        Err(WifiError::Driver(code)) => return Err(AttemptFailure::DriverFault(code)),
        Err(e) => return Err(AttemptFailure::Rejected(e)),
    }

    for tick in 1..=timing.max_attempts {
        board.clock.sleep_ms(timing.retry_delay_ms);
        board.watchdog.feed();
        if board.wifi.is_connected() {
            return Ok(());
        }
        match board.wifi.status() {
            Ok(LinkStatus::DriverFault(code)) => return Err(AttemptFailure::DriverFault(code)),
            Ok(status) => debug!("WIFI | {} status {:?}", candidate.ssid, status),
            Err(WifiError::Driver(code)) => return Err(AttemptFailure::DriverFault(code)),
            Err(e) => debug!("WIFI | {} status unavailable: {e}", candidate.ssid),
        }
        if tick % 5 == 0 {
            info!("WIFI | {} attempt {tick}/{}", candidate.ssid, timing.max_attempts);
        }
    }
    Err(AttemptFailure::TimedOut)
}

fn mark_up(
    ctx: &mut AgentContext,
    wifi: &dyn WifiDriver,
    ssid: Option<String>,
    events: &mut dyn EventSink,
) {
    let was_up = ctx.link.up;
    if let Some(ssid) = ssid {
        ctx.link.ssid = Some(ssid);
    }
    ctx.link.up = true;
    if was_up {
        return;
    }
    let recovered = ctx.link.had_link;
    if recovered {
        ctx.link.reconnects = ctx.link.reconnects.saturating_add(1);
    }
    ctx.link.had_link = true;
    events.emit(&AgentEvent::LinkUp {
        ssid: ctx.link.ssid.clone().unwrap_or_default(),
        ip: wifi.ip_address(),
        rssi: wifi.rssi(),
        recovered,
    });
}

/// Confirm the link or perform one full candidate sweep.
///
/// Safe to call every loop iteration: an established link returns after
/// one status query. On `Err` the caller sleeps its own interval and
/// calls again.
pub fn ensure_connected(
    ctx: &mut AgentContext,
    board: &mut Board<'_>,
    events: &mut dyn EventSink,
) -> Result<(), ConnectivityError> {
    if !board.wifi.is_active() {
        board.wifi.set_active(true).map_err(ConnectivityError::Radio)?;
    }

    let timing = ctx.config.wifi.clone();
    if wait_for_existing(board, &timing) {
        mark_up(ctx, &*board.wifi, None, events);
        return Ok(());
    }

    if ctx.link.up {
        warn!("WIFI | link lost, reconnecting");
        ctx.link.up = false;
    }

    let scanned = match board.wifi.scan() {
        Ok(visible) => Some(visible),
        Err(e) => {
            warn!("WIFI | scan failed ({e}), trying every configured network");
            None
        }
    };
    board.watchdog.feed();
    let order = select_order(&ctx.config.networks, scanned.as_deref());

    for candidate in &order {
        info!("WIFI | trying {} (priority {})", candidate.ssid, candidate.priority);
        match attempt(board, candidate, &timing) {
            Ok(()) => {
                mark_up(ctx, &*board.wifi, Some(candidate.ssid.clone()), events);
                return Ok(());
            }
            Err(AttemptFailure::DriverFault(code)) => {
                events.emit(&AgentEvent::DriverFault {
                    ssid: candidate.ssid.clone(),
                    code,
                });
                power_cycle(board, &timing);
            }
            Err(AttemptFailure::Rejected(e)) => {
                warn!("WIFI | {} rejected by driver: {e}", candidate.ssid);
            }
            Err(AttemptFailure::TimedOut) => {
                warn!(
                    "WIFI | {} not connected after {} attempts",
                    candidate.ssid, timing.max_attempts
                );
            }
        }
    }

    events.emit(&AgentEvent::LinkDown);
    Err(ConnectivityError::Exhausted {
        attempted: order.len(),
    })
}
