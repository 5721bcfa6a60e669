//! Log sink: one CSV-style line appended per completed sensor session.
//!
//! Line format:
//! `<ISO-8601|unknown>,Temp:<d.d>,Light:<u>,Moisture:<u>,Conductivity:<u>,Battery:<u>`
//!
//! The timestamp degrades to the literal `unknown` when the clock cannot
//! be read; a reading is never dropped just because the clock is down.

use crate::clock::Clock;
use crate::config::LOG_FILE_NAME;
use crate::error::StorageError;
use crate::sensor::SensorReading;
use crate::storage::Storage;
use crate::warn;
use core::fmt::Write;
use heapless::String;

/// Upper bound on one rendered log line.
pub const LINE_BYTES: usize = 96;

/// Render one log line, trailing newline included.
pub fn format_line(reading: &SensorReading, timestamp: &str) -> String<LINE_BYTES> {
    let sign = if reading.deci_celsius < 0 { "-" } else { "" };
    let deci = reading.deci_celsius.unsigned_abs();
    let mut line = String::new();
    // Infallible: worst-case field widths stay inside LINE_BYTES.
    let _ = write!(
        line,
        "{},Temp:{}{}.{},Light:{},Moisture:{},Conductivity:{},Battery:{}\n",
        timestamp,
        sign,
        deci / 10,
        deci % 10,
        reading.lux,
        reading.moisture_pct,
        reading.conductivity_us_cm,
        reading.battery_pct,
    );
    line
}

/// Append one completed reading to the log file.
pub fn append_reading<S: Storage, C: Clock>(
    storage: &mut S,
    clock: &C,
    reading: &SensorReading,
) -> Result<(), StorageError> {
    let stamp = match clock.now() {
        Ok(t) => t.format_iso8601(),
        Err(_) => {
            warn!("clock unreadable, logging with unknown timestamp");
            let mut s = String::new();
            let _ = s.push_str("unknown");
            s
        }
    };
    let line = format_line(reading, stamp.as_str());
    storage.append(LOG_FILE_NAME, line.as_str())
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
