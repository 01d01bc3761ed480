//! Firmware slot adapters.
//!
//! On the device a verified image is streamed into the inactive OTA app
//! partition through `esp-ota`, and that partition is selected for the next
//! boot. [`ImageFileSlot`] stages the image as a file on any
//! [`StoragePort`] instead; host tests and the fuzz harness run on it.

use crate::app::ports::{FirmwarePort, FlashError, StoragePort};
use crate::ota::versions;
use crate::protocol::ArtifactKind;

/// File-backed slot: the image lands in `firmware.img` via temp + rename.
pub struct ImageFileSlot<S> {
    storage: S,
}

impl<S: StoragePort> ImageFileSlot<S> {
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<S: StoragePort> FirmwarePort for ImageFileSlot<S> {
    fn install(&mut self, image: &[u8]) -> Result<(), FlashError> {
        versions::write_atomic(
            &mut self.storage,
            versions::live_file(ArtifactKind::Firmware),
            image,
        )
        .map_err(FlashError::Storage)
    }
}

#[cfg(target_os = "espidf")]
pub use esp::{OtaPartition, mark_running_valid};

#[cfg(target_os = "espidf")]
mod esp {
    use log::{info, warn};

    use crate::app::ports::{FirmwarePort, FlashError};

    /// Flash writes are issued in blocks of this size.
    const WRITE_CHUNK: usize = 4096;

    /// The inactive app partition of the two-slot OTA layout.
    #[derive(Default)]
    pub struct OtaPartition;

    impl FirmwarePort for OtaPartition {
        fn install(&mut self, image: &[u8]) -> Result<(), FlashError> {
            let mut update = esp_ota::OtaUpdate::begin().map_err(|e| {
                warn!("OTA  | esp-ota begin failed: {:?}", e);
                FlashError::Begin
            })?;
            for chunk in image.chunks(WRITE_CHUNK) {
                update.write(chunk).map_err(|e| {
                    warn!("OTA  | esp-ota write failed: {:?}", e);
                    FlashError::Write
                })?;
            }
            let mut completed = update.finalize().map_err(|e| {
                warn!("OTA  | esp-ota finalize failed: {:?}", e);
                FlashError::Finalize
            })?;
            completed.set_as_boot_partition().map_err(|e| {
                warn!("OTA  | set_as_boot_partition failed: {:?}", e);
                FlashError::BootSelect
            })?;
            info!("OTA  | {} bytes written, slot selected for next boot", image.len());
            Ok(())
        }
    }

    /// Confirm the running image so the bootloader does not roll it back.
    pub fn mark_running_valid() {
        match esp_ota::mark_app_valid() {
            Ok(()) => info!("OTA  | running image marked valid"),
            Err(e) => warn!("OTA  | mark_app_valid failed: {:?}", e),
        }
    }
}
