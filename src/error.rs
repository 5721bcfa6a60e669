//! Unified error type for floralog.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` for efficient on-target logging when the
//! `defmt` feature is enabled.

/// Top-level error type used across the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error {
    /// SD card / filesystem operation failed.
    Storage(StorageError),

    /// Calendar clock could not be read or set.
    Clock(ClockError),
}

/// Storage failures, kept coarse: the caller only ever abandons the
/// operation at hand, it never retries a specific cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StorageError {
    /// The card never mounted (or the volume is gone).
    NotMounted,
    /// Named file does not exist.
    NotFound,
    /// Read failed mid-file.
    Read,
    /// Append/write failed.
    Write,
}

/// Calendar clock failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ClockError {
    /// The clock has never been set; there is no time to read.
    NotRunning,
    /// The supplied calendar time was out of range.
    InvalidTime,
}

// Convenience conversions

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Error::Storage(e)
    }
}

impl From<ClockError> for Error {
    fn from(e: ClockError) -> Self {
        Error::Clock(e)
    }
}
