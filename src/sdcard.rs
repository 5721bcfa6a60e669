//! SD card storage over SPI via `embedded-sdmmc`.
//!
//! Implements the [`Storage`] seam with the crate's handle-based raw API
//! so open files can be carried across timer ticks without borrowing the
//! volume manager. A card that fails to mount at boot degrades every
//! operation to `NotMounted` instead of taking the controller down; the
//! log file is opened, appended and closed per write, and only the
//! streaming engine holds a file open across calls.

use crate::error::StorageError;
use crate::storage::Storage;
use crate::{info, warn};
use embedded_hal::delay::DelayNs;
use embedded_hal::spi::SpiDevice;
use embedded_sdmmc::{
    Mode, RawDirectory, RawFile, SdCard, TimeSource, Timestamp, VolumeIdx, VolumeManager,
};

/// Fixed timestamp source for FAT metadata. Directory timestamps are not
/// part of the log format; the real time lives inside the log lines.
pub struct FixedTimeSource;

impl TimeSource for FixedTimeSource {
    fn get_timestamp(&self) -> Timestamp {
        Timestamp {
            year_since_1970: 55,
            zero_indexed_month: 0,
            zero_indexed_day: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
        }
    }
}

/// SD card filesystem, rooted in the first volume's root directory.
pub struct SdStorage<S: SpiDevice<u8>, D: DelayNs> {
    volume_mgr: VolumeManager<SdCard<S, D>, FixedTimeSource>,
    /// Root directory handle; `None` when the card never mounted.
    root: Option<RawDirectory>,
}

impl<S: SpiDevice<u8>, D: DelayNs> SdStorage<S, D> {
    /// Probe and mount the card. Mount failure is not fatal: the storage
    /// comes up empty-handed and every operation reports `NotMounted`.
    pub fn new(spi: S, delay: D) -> Self {
        let card = SdCard::new(spi, delay);
        let mut volume_mgr = VolumeManager::new(card, FixedTimeSource);
        let volume = volume_mgr.open_raw_volume(VolumeIdx(0));
        let root = match volume.map(|v| volume_mgr.open_root_dir(v)) {
            Ok(Ok(root)) => {
                info!("sd card mounted");
                Some(root)
            }
            _ => {
                warn!("sd card mount failed, logging disabled");
                None
            }
        };
        Self { volume_mgr, root }
    }
}

impl<S: SpiDevice<u8>, D: DelayNs> Storage for SdStorage<S, D> {
    type File = RawFile;

    fn open(&mut self, name: &str) -> Result<RawFile, StorageError> {
        let root = self.root.ok_or(StorageError::NotMounted)?;
        self.volume_mgr
            .open_file_in_dir(root, name, Mode::ReadOnly)
            .map_err(|_| StorageError::NotFound)
    }

    fn read(&mut self, file: &mut RawFile, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.volume_mgr.read(*file, buf) {
            Ok(n) => Ok(n),
            // The trait reports end of file as a clean zero-length read.
            Err(embedded_sdmmc::Error::EndOfFile) => Ok(0),
            Err(_) => Err(StorageError::Read),
        }
    }

    fn close(&mut self, file: RawFile) {
        if self.volume_mgr.close_file(file).is_err() {
            warn!("sd card close failed");
        }
    }

    fn append(&mut self, name: &str, data: &str) -> Result<(), StorageError> {
        let root = self.root.ok_or(StorageError::NotMounted)?;
        let file = self
            .volume_mgr
            .open_file_in_dir(root, name, Mode::ReadWriteCreateOrAppend)
            .map_err(|_| StorageError::Write)?;
        let result = self
            .volume_mgr
            .write(file, data.as_bytes())
            .map_err(|_| StorageError::Write);
        if self.volume_mgr.close_file(file).is_err() {
            warn!("sd card close failed after append");
        }
        result
    }
}
