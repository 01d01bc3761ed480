//! Board identity for logs and the `User-Agent` header.
//!
//! The backend authenticates by token, so this is only a label an operator
//! can match to a physical unit: `DL-` followed by the NIC-specific half of
//! the factory MAC.

use core::fmt::{self, Write as _};

/// Station MAC as burned into eFuse.
pub type Mac = [u8; 6];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardId(heapless::String<9>);

impl BoardId {
    pub fn from_mac(mac: &Mac) -> Self {
        let mut label = heapless::String::new();
        // "DL-" plus six digits fills the buffer exactly.
        let _ = write!(label, "DL-{:02X}{:02X}{:02X}", mac[3], mac[4], mac[5]);
        Self(label)
    }

    /// Identity of the board this runs on.
    pub fn local() -> Self {
        Self::from_mac(&factory_mac())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(target_os = "espidf")]
fn factory_mac() -> Mac {
    let mut mac = [0u8; 6];
    // SAFETY: the call writes exactly six bytes into `mac`.
    let ret = unsafe { esp_idf_svc::sys::esp_efuse_mac_get_default(mac.as_mut_ptr()) };
    if ret != esp_idf_svc::sys::ESP_OK {
        log::warn!("eFuse MAC unreadable ({ret}), board id falls back to DL-000000");
        return [0; 6];
    }
    mac
}

/// No eFuse on the host; a fixed locally-administered address.
#[cfg(not(target_os = "espidf"))]
fn factory_mac() -> Mac {
    [0x02, 0x00, 0x00, 0xD0, 0x0A, 0x01]
}
