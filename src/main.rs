//! DoorLink Firmware: Main Entry Point
//!
//! Wires the ESP-IDF adapters to the agent core and hands control to the
//! supervisor. When the supervisor returns, the chip restarts.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  WifiAdapter     HttpBackend    FileStorage    SystemClock     │
//! │  (WifiDriver)    (BackendPort)  (StoragePort)  (ClockPort)     │
//! │  OtaPartition    RelayDriver    Watchdog                       │
//! │  (FirmwarePort)  (RelayPort)    (WatchdogPort)                 │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │        supervise() ─▶ AgentService (pure logic)        │    │
//! │  │  connectivity · command · OTA · diagnostics            │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::gpio::{AnyOutputPin, PinDriver};
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::{error, info, warn};

use doorlink::adapters::board_id::BoardId;
use doorlink::adapters::firmware::{self, OtaPartition};
use doorlink::adapters::http::{self, HttpBackend};
use doorlink::adapters::storage::{DEVICE_DATA_DIR, FileStorage};
use doorlink::adapters::time::SystemClock;
use doorlink::adapters::wifi::WifiAdapter;
use doorlink::app::ports::Board;
use doorlink::app::service::supervise;
use doorlink::config::{AgentConfig, FIRMWARE_VERSION};
use doorlink::diagnostics;
use doorlink::drivers::relay::RelayDriver;
use doorlink::drivers::watchdog::Watchdog;

/// Pause before restarting when bring-up itself failed.
const BRINGUP_RETRY_DELAY: Duration = Duration::from_secs(10);

fn main() {
    esp_idf_svc::sys::link_patches();
    if let Err(e) = esp_idf_logger::init() {
        // Nothing to log through yet.
        println!("logger init failed: {e:?}");
    }

    info!("╔══════════════════════════════════════╗");
    info!("║  DoorLink v{:<26}║", FIRMWARE_VERSION);
    info!("╚══════════════════════════════════════╝");

    if let Err(e) = run() {
        error!("Bring-up failed: {e:#}");
        error!("Restarting in {}s", BRINGUP_RETRY_DELAY.as_secs());
        std::thread::sleep(BRINGUP_RETRY_DELAY);
    }

    unsafe {
        esp_idf_svc::sys::esp_restart();
    }
}

/// Mount the LittleFS `data` partition at [`DEVICE_DATA_DIR`].
fn mount_data_partition() -> Result<()> {
    use esp_idf_svc::sys::*;

    let mut conf = esp_vfs_littlefs_conf_t {
        base_path: c"/data".as_ptr(),
        partition_label: c"data".as_ptr(),
        ..Default::default()
    };
    conf.set_format_if_mount_failed(1);
    // SAFETY: both strings are 'static and the struct outlives the call.
    let ret = unsafe { esp_vfs_littlefs_register(&conf) };
    if ret != ESP_OK {
        return Err(anyhow!("LittleFS mount failed ({ret})"));
    }
    Ok(())
}

fn run() -> Result<()> {
    // Reaching bring-up counts as a healthy boot of this image.
    firmware::mark_running_valid();
    mount_data_partition()?;
    diagnostics::install_panic_handler(|| FileStorage::open(DEVICE_DATA_DIR).ok());

    let config = AgentConfig::default();
    config
        .validate()
        .map_err(|e| anyhow!("compiled configuration rejected: {e}"))?;

    let peripherals = Peripherals::take()?;
    let sys_loop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    // Armed before the first connect: a hung association resets the chip.
    let mut watchdog = Watchdog::arm(config.watchdog_timeout_ms);

    let mut wifi = WifiAdapter::new(peripherals.modem, sys_loop, Some(nvs))
        .context("wifi driver init failed")?;

    // SAFETY: `relay_gpio` is a board constant not claimed by any other driver.
    let relay_pin = unsafe { AnyOutputPin::new(config.relay_gpio) };
    let mut relay = RelayDriver::new(PinDriver::output(relay_pin)?, config.relay_active_low);

    let mut storage =
        FileStorage::open(DEVICE_DATA_DIR).map_err(|e| anyhow!("data directory: {e}"))?;

    let id = BoardId::local();
    info!("Board {} -> {}", id, config.server_base_url);
    let mut backend = HttpBackend::new(
        &config.server_base_url,
        &config.device_token,
        http::user_agent(FIRMWARE_VERSION, id.as_str()),
        config.request_timeout_ms,
    );
    let mut clock = SystemClock::new();
    let mut flash = OtaPartition;

    let mut board = Board {
        wifi: &mut wifi,
        backend: &mut backend,
        storage: &mut storage,
        firmware: &mut flash,
        relay: &mut relay,
        watchdog: &mut watchdog,
        clock: &mut clock,
    };
    let reason = supervise(config, &mut board);
    warn!("Restarting: {reason}");
    Ok(())
}
