//! Flat file storage adapter.
//!
//! Implements [`StoragePort`] on top of `std::fs` rooted at one directory:
//! the LittleFS mount point through the ESP-IDF VFS on the device, a temp
//! dir on the host. Both replace an existing destination on rename. Names are single path components; anything
//! that could escape the root is refused.

use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use log::warn;

use crate::app::ports::{StorageError, StoragePort};

/// VFS mount point of the LittleFS data partition on the device.
pub const DEVICE_DATA_DIR: &str = "/data";

pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open storage rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| {
            warn!("Storage: cannot create {}: {e}", root.display());
            map_io(&e)
        })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> Result<PathBuf, StorageError> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && !name.contains(['/', '\\', '\0']);
        if valid {
            Ok(self.root.join(name))
        } else {
            Err(StorageError::InvalidName)
        }
    }
}

fn map_io(e: &io::Error) -> StorageError {
    match e.kind() {
        ErrorKind::StorageFull | ErrorKind::QuotaExceeded => StorageError::Full,
        _ => StorageError::Io,
    }
}

impl StoragePort for FileStorage {
    fn read(&self, name: &str) -> Result<Option<Vec<u8>>, StorageError> {
        match fs::read(self.path(name)?) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(map_io(&e)),
        }
    }

    fn write(&mut self, name: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.path(name)?;
        let mut file = fs::File::create(&path).map_err(|e| map_io(&e))?;
        file.write_all(data).map_err(|e| map_io(&e))?;
        file.sync_all().map_err(|e| map_io(&e))
    }

    fn rename(&mut self, from: &str, to: &str) -> Result<(), StorageError> {
        let from = self.path(from)?;
        let to = self.path(to)?;
        fs::rename(from, to).map_err(|e| map_io(&e))
    }

    fn remove(&mut self, name: &str) -> Result<(), StorageError> {
        match fs::remove_file(self.path(name)?) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(map_io(&e)),
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.path(name).is_ok_and(|p| p.is_file())
    }
}
