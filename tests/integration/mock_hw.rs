//! Mock board adapters for integration tests.
//!
//! Every adapter records what the agent did to it so tests can assert on
//! the full call history. The clock and the watchdog share one simulated
//! timeline, which lets tests measure the longest stretch between feeds.

use std::cell::Cell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::net::Ipv4Addr;
use std::rc::Rc;

use doorlink::app::events::AgentEvent;
use doorlink::app::ports::{
    BackendPort, Board, ClockPort, EventSink, FirmwarePort, FlashError, LinkStatus, RelayPort,
    StorageError, StoragePort, WatchdogPort, WifiDriver, WifiError,
};
use doorlink::config::{AgentConfig, NetworkCandidate, WifiTiming};
use doorlink::error::{Error, Result};
use doorlink::protocol::{CommandOffer, FirmwarePayload, LogSubmission};

// ── Config ────────────────────────────────────────────────────

/// A valid configuration with short timings: two networks, Primary
/// preferred over Backup.
pub fn test_config() -> AgentConfig {
    AgentConfig {
        server_base_url: "https://door.test".into(),
        device_token: "tok".into(),
        request_timeout_ms: 2_000,
        max_pulse_ms: 1_500,
        networks: vec![
            NetworkCandidate::new("Backup", "password2", 2),
            NetworkCandidate::new("Primary", "password1", 1),
        ],
        wifi: WifiTiming {
            max_attempts: 4,
            retry_delay_ms: 100,
            existing_wait_ms: 200,
            existing_check_ms: 100,
            power_cycle_delay_ms: 50,
        },
        poll_interval_ms: 1_000,
        ota_enabled: true,
        ota_check_interval_ms: 10_000,
        heartbeat_interval_ms: 60_000,
        watchdog_timeout_ms: 5_000,
        reset_delay_ms: 500,
        ..AgentConfig::default()
    }
}

// ── WiFi ──────────────────────────────────────────────────────

pub struct MockWifi {
    pub active: bool,
    pub connected: bool,
    /// SSIDs returned by `scan`.
    pub visible: Vec<String>,
    pub scan_fails: bool,
    /// SSID → password of networks that associate on connect.
    pub reachable: HashMap<String, String>,
    /// SSIDs whose association ends in a negative driver status.
    pub faulty: HashSet<String>,
    target: Option<String>,
    pub connect_calls: Vec<String>,
    pub set_active_calls: Vec<bool>,
    pub scans: u32,
}

#[allow(dead_code)]
impl MockWifi {
    pub fn new() -> Self {
        Self {
            active: false,
            connected: false,
            visible: Vec::new(),
            scan_fails: false,
            reachable: HashMap::new(),
            faulty: HashSet::new(),
            target: None,
            connect_calls: Vec::new(),
            set_active_calls: Vec::new(),
            scans: 0,
        }
    }

    /// Make `ssid` visible and reachable with `password`.
    pub fn offer(&mut self, ssid: &str, password: &str) {
        self.visible.push(ssid.to_string());
        self.reachable.insert(ssid.to_string(), password.to_string());
    }

    /// Drop the association as if the access point vanished.
    pub fn drop_link(&mut self) {
        self.connected = false;
        self.target = None;
    }

    pub fn power_cycles(&self) -> usize {
        self.set_active_calls.iter().filter(|on| !**on).count()
    }
}

impl WifiDriver for MockWifi {
    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) -> core::result::Result<(), WifiError> {
        self.set_active_calls.push(active);
        self.active = active;
        if !active {
            self.drop_link();
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn status(&self) -> core::result::Result<LinkStatus, WifiError> {
        if !self.active {
            return Err(WifiError::Inactive);
        }
        Ok(match &self.target {
            _ if self.connected => LinkStatus::GotIp,
            None => LinkStatus::Idle,
            Some(ssid) if self.faulty.contains(ssid) => LinkStatus::DriverFault(-3),
            Some(ssid) if self.reachable.contains_key(ssid) => LinkStatus::WrongPassword,
            Some(_) => LinkStatus::NoApFound,
        })
    }

    fn scan(&mut self) -> core::result::Result<Vec<String>, WifiError> {
        self.scans += 1;
        if self.scan_fails {
            return Err(WifiError::Driver(-1));
        }
        Ok(self.visible.clone())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> core::result::Result<(), WifiError> {
        if !self.active {
            return Err(WifiError::Inactive);
        }
        self.connect_calls.push(ssid.to_string());
        self.target = Some(ssid.to_string());
        self.connected = !self.faulty.contains(ssid)
            && self.reachable.get(ssid).is_some_and(|p| p == password);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.drop_link();
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.connected.then_some(Ipv4Addr::new(192, 168, 1, 50))
    }

    fn rssi(&self) -> Option<i8> {
        self.connected.then_some(-55)
    }
}

// ── Backend ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    Poll,
    Ack(u64),
    Fetch,
    Submit,
}

pub struct MockBackend {
    /// Poll results in order; an empty queue answers with the empty offer.
    pub offers: VecDeque<Result<CommandOffer>>,
    /// Ack results in order; an empty queue answers `Ok`.
    pub ack_results: VecDeque<Result<()>>,
    /// Answer to every release fetch.
    pub release: Result<FirmwarePayload>,
    pub logs_fail: bool,
    pub panic_on_poll: bool,
    pub calls: Vec<BackendCall>,
    pub logs: Vec<LogSubmission>,
}

#[allow(dead_code)]
impl MockBackend {
    pub fn new() -> Self {
        Self {
            offers: VecDeque::new(),
            ack_results: VecDeque::new(),
            release: Ok(FirmwarePayload::default()),
            logs_fail: false,
            panic_on_poll: false,
            calls: Vec::new(),
            logs: Vec::new(),
        }
    }

    pub fn count(&self, call: &BackendCall) -> usize {
        self.calls.iter().filter(|c| *c == call).count()
    }

    pub fn logs_of_type(&self, event_type: &str) -> Vec<&LogSubmission> {
        self.logs
            .iter()
            .filter(|l| l.event_type.as_deref() == Some(event_type))
            .collect()
    }
}

impl BackendPort for MockBackend {
    fn poll_command(&mut self) -> Result<CommandOffer> {
        self.calls.push(BackendCall::Poll);
        if self.panic_on_poll {
            panic!("injected poll panic");
        }
        self.offers.pop_front().unwrap_or_else(|| Ok(CommandOffer::empty()))
    }

    fn acknowledge(&mut self, command_id: u64) -> Result<()> {
        self.calls.push(BackendCall::Ack(command_id));
        self.ack_results.pop_front().unwrap_or(Ok(()))
    }

    fn fetch_release(&mut self) -> Result<FirmwarePayload> {
        self.calls.push(BackendCall::Fetch);
        self.release.clone()
    }

    fn submit_log(&mut self, entry: &LogSubmission) -> Result<()> {
        self.calls.push(BackendCall::Submit);
        if self.logs_fail {
            return Err(Error::Transport(doorlink::error::TransportError::Connect));
        }
        self.logs.push(entry.clone());
        Ok(())
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Default)]
pub struct MemStorage {
    pub files: HashMap<String, Vec<u8>>,
    pub writes: usize,
    pub fail_rename: bool,
}

#[allow(dead_code)]
impl MemStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&mut self, name: &str, data: &str) {
        self.files.insert(name.to_string(), data.as_bytes().to_vec());
    }

    pub fn exists_file(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }

    pub fn exists_tmp(&self) -> bool {
        self.files.keys().any(|k| k.ends_with(".tmp"))
    }

    pub fn text(&self, name: &str) -> Option<String> {
        self.files
            .get(name)
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl StoragePort for MemStorage {
    fn read(&self, name: &str) -> core::result::Result<Option<Vec<u8>>, StorageError> {
        Ok(self.files.get(name).cloned())
    }

    fn write(&mut self, name: &str, data: &[u8]) -> core::result::Result<(), StorageError> {
        self.writes += 1;
        self.files.insert(name.to_string(), data.to_vec());
        Ok(())
    }

    fn rename(&mut self, from: &str, to: &str) -> core::result::Result<(), StorageError> {
        if self.fail_rename {
            return Err(StorageError::Full);
        }
        let data = self.files.remove(from).ok_or(StorageError::Io)?;
        self.files.insert(to.to_string(), data);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> core::result::Result<(), StorageError> {
        self.files.remove(name);
        Ok(())
    }

    fn exists(&self, name: &str) -> bool {
        self.files.contains_key(name)
    }
}

// ── Firmware slot ─────────────────────────────────────────────

/// Records every image handed to the slot; `fail` rejects the next ones.
#[derive(Default)]
pub struct MockFlash {
    pub images: Vec<Vec<u8>>,
    pub fail: Option<FlashError>,
}

#[allow(dead_code)]
impl MockFlash {
    pub fn last_text(&self) -> Option<String> {
        self.images
            .last()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }
}

impl FirmwarePort for MockFlash {
    fn install(&mut self, image: &[u8]) -> core::result::Result<(), FlashError> {
        if let Some(e) = self.fail {
            return Err(e);
        }
        self.images.push(image.to_vec());
        Ok(())
    }
}

// ── Relay ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RelayCall {
    Energize,
    Release,
}

#[derive(Default)]
pub struct MockRelay {
    pub calls: Vec<RelayCall>,
    energized: bool,
}

#[allow(dead_code)]
impl MockRelay {
    pub fn pulses(&self) -> usize {
        self.calls.iter().filter(|c| **c == RelayCall::Energize).count()
    }
}

impl RelayPort for MockRelay {
    fn energize(&mut self) {
        self.calls.push(RelayCall::Energize);
        self.energized = true;
    }

    fn release(&mut self) {
        self.calls.push(RelayCall::Release);
        self.energized = false;
    }

    fn is_energized(&self) -> bool {
        self.energized
    }
}

// ── Clock + watchdog on a shared timeline ─────────────────────

pub struct FakeClock {
    now: Rc<Cell<u64>>,
    pub sleeps: Vec<u32>,
}

impl ClockPort for FakeClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn sleep_ms(&mut self, ms: u32) {
        self.sleeps.push(ms);
        self.now.set(self.now.get() + u64::from(ms));
    }
}

pub struct MockWatchdog {
    now: Rc<Cell<u64>>,
    last_feed: u64,
    pub feeds: u64,
    /// Longest simulated time between two feeds.
    pub max_gap_ms: u64,
}

impl WatchdogPort for MockWatchdog {
    fn feed(&mut self) {
        let now = self.now.get();
        self.max_gap_ms = self.max_gap_ms.max(now - self.last_feed);
        self.last_feed = now;
        self.feeds += 1;
    }
}

// ── Event capture ─────────────────────────────────────────────

#[derive(Default)]
pub struct RecordingSink {
    pub events: Vec<AgentEvent>,
}

impl EventSink for RecordingSink {
    fn emit(&mut self, event: &AgentEvent) {
        self.events.push(event.clone());
    }
}

// ── Rig ───────────────────────────────────────────────────────

/// One complete set of mock adapters.
pub struct Rig {
    pub wifi: MockWifi,
    pub backend: MockBackend,
    pub storage: MemStorage,
    pub firmware: MockFlash,
    pub relay: MockRelay,
    pub watchdog: MockWatchdog,
    pub clock: FakeClock,
}

#[allow(dead_code)]
impl Rig {
    pub fn new() -> Self {
        let now = Rc::new(Cell::new(0));
        Self {
            wifi: MockWifi::new(),
            backend: MockBackend::new(),
            storage: MemStorage::new(),
            firmware: MockFlash::default(),
            relay: MockRelay::default(),
            watchdog: MockWatchdog {
                now: Rc::clone(&now),
                last_feed: 0,
                feeds: 0,
                max_gap_ms: 0,
            },
            clock: FakeClock {
                now,
                sleeps: Vec::new(),
            },
        }
    }

    /// A rig whose Primary network is visible and reachable.
    pub fn online() -> Self {
        let mut rig = Self::new();
        rig.wifi.offer("Primary", "password1");
        rig
    }

    pub fn now(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn advance(&mut self, ms: u32) {
        self.clock.sleep_ms(ms);
        self.watchdog.feed();
    }

    pub fn board(&mut self) -> Board<'_> {
        Board {
            wifi: &mut self.wifi,
            backend: &mut self.backend,
            storage: &mut self.storage,
            firmware: &mut self.firmware,
            relay: &mut self.relay,
            watchdog: &mut self.watchdog,
            clock: &mut self.clock,
        }
    }
}
