//! Door-strike relay driver.
//!
//! Generic over any `embedded_hal` output pin: an `esp_idf_hal`
//! `PinDriver` on the board, a recording pin in tests.
//!
//! ## Polarity
//!
//! Most relay modules sold for 3.3 V logic energise on a LOW input.
//! `active_low` selects which level means "energised"; the driver forces
//! the released level at construction so a reboot never leaves the door
//! unlocked.

use embedded_hal::digital::OutputPin;
use log::warn;

use crate::app::ports::RelayPort;

pub struct RelayDriver<P: OutputPin> {
    pin: P,
    active_low: bool,
    energized: bool,
}

impl<P: OutputPin> RelayDriver<P> {
    pub fn new(pin: P, active_low: bool) -> Self {
        let mut relay = Self {
            pin,
            active_low,
            energized: true,
        };
        relay.release();
        relay
    }

    fn drive(&mut self, energize: bool) {
        let high = energize != self.active_low;
        let result = if high {
            self.pin.set_high()
        } else {
            self.pin.set_low()
        };
        match result {
            Ok(()) => self.energized = energize,
            Err(e) => warn!("Relay: pin write failed: {e:?}"),
        }
    }

    pub fn into_inner(self) -> P {
        self.pin
    }
}

impl<P: OutputPin> RelayPort for RelayDriver<P> {
    fn energize(&mut self) {
        self.drive(true);
    }

    fn release(&mut self) {
        self.drive(false);
    }

    fn is_energized(&self) -> bool {
        self.energized
    }
}
