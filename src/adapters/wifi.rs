//! WiFi station-mode adapter.
//!
//! Implements [`WifiDriver`], the port the connectivity manager drives.
//! `connect` only starts association; progress is observed through
//! `status`/`is_connected` polling, which is what lets the manager feed
//! the watchdog between ticks.
//!
//! ## cfg gating
//!
//! - **`target_os = "espidf"`**: `esp_idf_svc::wifi::EspWifi` wrapped in
//!   `BlockingWifi` (scan and start/stop block, connect does not).
//! - **all other targets**: an in-memory simulation that associates on the
//!   first status poll after `connect`.

use core::net::Ipv4Addr;

use log::info;

use crate::app::ports::{LinkStatus, WifiDriver, WifiError};

// ───────────────────────────────────────────────────────────────
// ESP-IDF adapter
// ───────────────────────────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub struct WifiAdapter {
    wifi: esp_idf_svc::wifi::BlockingWifi<esp_idf_svc::wifi::EspWifi<'static>>,
    connecting: bool,
}

#[cfg(target_os = "espidf")]
impl WifiAdapter {
    pub fn new(
        modem: esp_idf_svc::hal::modem::Modem,
        sys_loop: esp_idf_svc::eventloop::EspSystemEventLoop,
        nvs: Option<esp_idf_svc::nvs::EspDefaultNvsPartition>,
    ) -> Result<Self, esp_idf_svc::sys::EspError> {
        let esp_wifi = esp_idf_svc::wifi::EspWifi::new(modem, sys_loop.clone(), nvs)?;
        let wifi = esp_idf_svc::wifi::BlockingWifi::wrap(esp_wifi, sys_loop)?;
        Ok(Self {
            wifi,
            connecting: false,
        })
    }

    fn driver_err(e: esp_idf_svc::sys::EspError) -> WifiError {
        WifiError::Driver(e.code())
    }
}

#[cfg(target_os = "espidf")]
impl WifiDriver for WifiAdapter {
    fn is_active(&self) -> bool {
        self.wifi.is_started().unwrap_or(false)
    }

    fn set_active(&mut self, active: bool) -> Result<(), WifiError> {
        self.connecting = false;
        if active {
            if self.wifi.is_started().map_err(Self::driver_err)? {
                return Ok(());
            }
            self.wifi.start().map_err(Self::driver_err)
        } else {
            self.wifi.stop().map_err(Self::driver_err)
        }
    }

    fn is_connected(&self) -> bool {
        self.wifi.is_connected().unwrap_or(false) && self.wifi.is_up().unwrap_or(false)
    }

    fn status(&self) -> Result<LinkStatus, WifiError> {
        if !self.wifi.is_started().map_err(Self::driver_err)? {
            return Err(WifiError::Inactive);
        }
        let associated = self.wifi.is_connected().map_err(Self::driver_err)?;
        let addressed = self.wifi.is_up().map_err(Self::driver_err)?;
        Ok(match (associated, addressed, self.connecting) {
            (true, true, _) => LinkStatus::GotIp,
            (true, false, _) | (false, _, true) => LinkStatus::Connecting,
            (false, _, false) => LinkStatus::Idle,
        })
    }

    fn scan(&mut self) -> Result<Vec<String>, WifiError> {
        let mut found = self.wifi.scan().map_err(Self::driver_err)?;
        found.sort_by(|a, b| b.signal_strength.cmp(&a.signal_strength));
        Ok(found.into_iter().map(|ap| ap.ssid.to_string()).collect())
    }

    fn connect(&mut self, ssid: &str, password: &str) -> Result<(), WifiError> {
        use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration};

        let auth_method = if password.is_empty() {
            AuthMethod::None
        } else {
            AuthMethod::WPAWPA2Personal
        };
        let config = Configuration::Client(ClientConfiguration {
            ssid: ssid.try_into().map_err(|_| WifiError::InvalidCredentials)?,
            password: password
                .try_into()
                .map_err(|_| WifiError::InvalidCredentials)?,
            auth_method,
            ..Default::default()
        });
        self.wifi
            .set_configuration(&config)
            .map_err(Self::driver_err)?;
        self.wifi.wifi_mut().connect().map_err(Self::driver_err)?;
        self.connecting = true;
        info!("WiFi: associating with '{}'", ssid);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connecting = false;
        if self.wifi.is_connected().unwrap_or(false) {
            let _ = self.wifi.wifi_mut().disconnect();
        }
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }

    fn rssi(&self) -> Option<i8> {
        use esp_idf_svc::sys::*;
        let mut ap_info: wifi_ap_record_t = unsafe { core::mem::zeroed() };
        let ret = unsafe { esp_wifi_sta_get_ap_info(&mut ap_info) };
        (ret == ESP_OK).then_some(ap_info.rssi)
    }
}

// ───────────────────────────────────────────────────────────────
// Host simulation
// ───────────────────────────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub struct WifiAdapter {
    active: bool,
    visible: Vec<String>,
    target: Option<String>,
    associated: bool,
}

#[cfg(not(target_os = "espidf"))]
impl WifiAdapter {
    /// Simulated radio that sees `visible` networks and joins any of them.
    pub fn new(visible: &[&str]) -> Self {
        Self {
            active: false,
            visible: visible.iter().map(|s| s.to_string()).collect(),
            target: None,
            associated: false,
        }
    }

    fn settle(&self) -> bool {
        self.target
            .as_ref()
            .is_some_and(|ssid| self.visible.contains(ssid))
    }
}

#[cfg(not(target_os = "espidf"))]
impl WifiDriver for WifiAdapter {
    fn is_active(&self) -> bool {
        self.active
    }

    fn set_active(&mut self, active: bool) -> Result<(), WifiError> {
        self.active = active;
        if !active {
            self.target = None;
            self.associated = false;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.associated || (self.active && self.settle())
    }

    fn status(&self) -> Result<LinkStatus, WifiError> {
        if !self.active {
            return Err(WifiError::Inactive);
        }
        Ok(match (&self.target, self.is_connected()) {
            (_, true) => LinkStatus::GotIp,
            (Some(_), false) => LinkStatus::NoApFound,
            (None, false) => LinkStatus::Idle,
        })
    }

    fn scan(&mut self) -> Result<Vec<String>, WifiError> {
        if !self.active {
            return Err(WifiError::Inactive);
        }
        Ok(self.visible.clone())
    }

    fn connect(&mut self, ssid: &str, _password: &str) -> Result<(), WifiError> {
        if !self.active {
            return Err(WifiError::Inactive);
        }
        self.target = Some(ssid.to_string());
        self.associated = self.settle();
        info!("WiFi(sim): associating with '{}'", ssid);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.target = None;
        self.associated = false;
    }

    fn ip_address(&self) -> Option<Ipv4Addr> {
        self.is_connected().then_some(Ipv4Addr::new(192, 168, 4, 2))
    }

    fn rssi(&self) -> Option<i8> {
        self.is_connected().then_some(-60)
    }
}
