//! Storage seam between the controller and the SD card driver.
//!
//! The controller needs exactly four operations: open a named file for
//! streaming reads, read from it, close it, and append one line to the
//! reading log. The embedded build implements this over `embedded-sdmmc`
//! (see `sdcard.rs`); host tests substitute an in-memory store.

use crate::error::StorageError;

pub trait Storage {
    /// Open-file handle for streaming reads.
    type File;

    /// Open the named file for reading, positioned at the start.
    fn open(&mut self, name: &str) -> Result<Self::File, StorageError>;

    /// Read up to `buf.len()` bytes. `Ok(0)` means end of file.
    fn read(&mut self, file: &mut Self::File, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Close an open file. Must be infallible from the caller's point of
    /// view; a failed close is the driver's problem to log.
    fn close(&mut self, file: Self::File);

    /// Append `data` to the named file, creating it if missing.
    fn append(&mut self, name: &str, data: &str) -> Result<(), StorageError>;
}
