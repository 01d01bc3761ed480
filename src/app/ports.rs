//! Port traits: the hexagonal boundary between the agent core and the board.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ AgentService (domain)
//! ```
//!
//! Driven adapters (WiFi radio, HTTP backend, flash filesystem, relay,
//! watchdog, clock) implement these traits. The subsystems take them as
//! `&mut dyn Port`, so the whole control loop runs on the host against the
//! recording mocks in `tests/integration/mock_hw.rs`.
//!
//! All blocking happens behind these traits: WiFi connect/scan, HTTP
//! round-trips, and clock sleeps are the loop's only suspension points.

use core::fmt;
use core::net::Ipv4Addr;

use crate::error::Result;
use crate::protocol::{CommandOffer, FirmwarePayload, LogSubmission};

use super::events::AgentEvent;

// ───────────────────────────────────────────────────────────────
// WiFi driver port (driven adapter: domain ↔ radio)
// ───────────────────────────────────────────────────────────────

/// Link-layer status as reported by the station interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    Idle,
    Connecting,
    WrongPassword,
    NoApFound,
    ConnectFailed,
    /// Associated and addressed.
    GotIp,
    /// Negative status code from the driver: an internal fault that only a
    /// power cycle of the interface clears.
    DriverFault(i32),
}

impl LinkStatus {
    /// Statuses during which an existing association may still come up on
    /// its own, so it is worth waiting before forcing a new connect.
    pub fn may_settle(self) -> bool {
        matches!(self, Self::Idle | Self::Connecting | Self::GotIp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiError {
    /// The driver call returned an ESP-IDF error code.
    Driver(i32),
    /// The interface has not been started.
    Inactive,
    /// SSID/password rejected by the driver before association.
    InvalidCredentials,
}

impl fmt::Display for WifiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(code) => write!(f, "driver error {code}"),
            Self::Inactive => write!(f, "interface inactive"),
            Self::InvalidCredentials => write!(f, "credentials rejected"),
        }
    }
}

/// Station-mode WiFi interface.
///
/// `connect` only *starts* association; the connectivity manager polls
/// [`status`](WifiDriver::status) and [`is_connected`](WifiDriver::is_connected)
/// with its own bounded retry loop.
pub trait WifiDriver {
    fn is_active(&self) -> bool;

    /// Enable or disable the radio. Disable → delay → enable is a power cycle.
    fn set_active(&mut self, active: bool) -> core::result::Result<(), WifiError>;

    /// Associated *and* holding an IP address.
    fn is_connected(&self) -> bool;

    fn status(&self) -> core::result::Result<LinkStatus, WifiError>;

    /// SSIDs currently visible, strongest first.
    fn scan(&mut self) -> core::result::Result<Vec<String>, WifiError>;

    fn connect(&mut self, ssid: &str, password: &str) -> core::result::Result<(), WifiError>;

    fn disconnect(&mut self);

    fn ip_address(&self) -> Option<Ipv4Addr>;

    fn rssi(&self) -> Option<i8>;
}

// ───────────────────────────────────────────────────────────────
// Backend port (driven adapter: domain ↔ HTTPS API)
// ───────────────────────────────────────────────────────────────

/// The four device endpoints. Implementations attach the device token,
/// enforce the per-request timeout, and classify failures into
/// [`crate::error::Error`].
pub trait BackendPort {
    fn poll_command(&mut self) -> Result<CommandOffer>;

    /// `Err(Error::NotFound)` when the command is unknown, foreign, or terminal.
    fn acknowledge(&mut self, command_id: u64) -> Result<()>;

    fn fetch_release(&mut self) -> Result<FirmwarePayload>;

    fn submit_log(&mut self, entry: &LogSubmission) -> Result<()>;
}

// ───────────────────────────────────────────────────────────────
// Storage port (driven adapter: domain ↔ flash filesystem)
// ───────────────────────────────────────────────────────────────

/// Flat, name-keyed file storage rooted at the agent's data directory.
///
/// `rename` must replace the destination atomically: this is what makes an
/// interrupted OTA apply leave either the old or the new artifact, never a
/// torn one.
pub trait StoragePort {
    /// `Ok(None)` if the file does not exist.
    fn read(&self, name: &str) -> core::result::Result<Option<Vec<u8>>, StorageError>;

    fn write(&mut self, name: &str, data: &[u8]) -> core::result::Result<(), StorageError>;

    fn rename(&mut self, from: &str, to: &str) -> core::result::Result<(), StorageError>;

    /// Remove a file. Returns `Ok(())` even if it didn't exist.
    fn remove(&mut self, name: &str) -> core::result::Result<(), StorageError>;

    fn exists(&self, name: &str) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Firmware slot port (driven adapter: domain → boot flash)
// ───────────────────────────────────────────────────────────────

/// Where a verified firmware image goes.
///
/// `install` returns only once the image is written and selected for the
/// next boot; on error the running image stays the boot image.
pub trait FirmwarePort {
    fn install(&mut self, image: &[u8]) -> core::result::Result<(), FlashError>;
}

// ───────────────────────────────────────────────────────────────
// Relay port (driven adapter: domain → door strike)
// ───────────────────────────────────────────────────────────────

pub trait RelayPort {
    fn energize(&mut self);
    fn release(&mut self);
    fn is_energized(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Watchdog and clock ports
// ───────────────────────────────────────────────────────────────

/// Hardware countdown that resets the chip unless fed in time.
pub trait WatchdogPort {
    fn feed(&mut self);
}

/// Monotonic milliseconds plus a blocking sleep.
pub trait ClockPort {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&mut self, ms: u32);
}

// ───────────────────────────────────────────────────────────────
// Event sink port (driven adapter: domain → logging / diagnostics)
// ───────────────────────────────────────────────────────────────

/// The domain emits structured [`AgentEvent`]s through this port.
pub trait EventSink {
    fn emit(&mut self, event: &AgentEvent);
}

// ───────────────────────────────────────────────────────────────
// Board: one set of adapters for one agent instance
// ───────────────────────────────────────────────────────────────

/// Borrowed bundle of every driven adapter the loop touches.
///
/// Fields are public so a subsystem can borrow the two or three ports it
/// needs side by side.
pub struct Board<'a> {
    pub wifi: &'a mut dyn WifiDriver,
    pub backend: &'a mut dyn BackendPort,
    pub storage: &'a mut dyn StoragePort,
    pub firmware: &'a mut dyn FirmwarePort,
    pub relay: &'a mut dyn RelayPort,
    pub watchdog: &'a mut dyn WatchdogPort,
    pub clock: &'a mut dyn ClockPort,
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Filesystem partition is full.
    Full,
    /// Generic I/O error.
    Io,
    /// Name contains a path separator or is empty.
    InvalidName,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "storage full"),
            Self::Io => write!(f, "I/O error"),
            Self::InvalidName => write!(f, "invalid file name"),
        }
    }
}

/// Errors from [`FirmwarePort::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// No inactive slot could be opened.
    Begin,
    Write,
    /// The written image did not validate.
    Finalize,
    /// The slot could not be marked for the next boot.
    BootSelect,
    /// Image file staging failed (file-backed slot).
    Storage(StorageError),
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Begin => write!(f, "no update slot available"),
            Self::Write => write!(f, "image write failed"),
            Self::Finalize => write!(f, "image validation failed"),
            Self::BootSelect => write!(f, "boot slot selection failed"),
            Self::Storage(e) => write!(f, "image staging: {e}"),
        }
    }
}
