//! Calendar time: the clock-set wire format, ISO-8601 rendering and the
//! arithmetic backing the soft RTC.
//!
//! The companion app syncs the device clock by writing 7 bytes to the
//! clock characteristic: a little-endian u16 year followed by month, day,
//! hour, minute and second bytes. Day-of-week is not carried on the wire.

use crate::error::ClockError;
use core::fmt::Write;
use heapless::String;

/// Exact length of a clock-set write.
pub const SYNC_PAYLOAD_BYTES: usize = 7;

/// A calendar timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CalendarTime {
    pub year: u16,
    pub month: u8,
    pub day: u8,
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

impl CalendarTime {
    /// Decode a clock-set write. Anything but exactly 7 bytes is rejected.
    pub fn from_sync_payload(data: &[u8]) -> Option<Self> {
        if data.len() != SYNC_PAYLOAD_BYTES {
            return None;
        }
        Some(Self {
            year: u16::from_le_bytes([data[0], data[1]]),
            month: data[2],
            day: data[3],
            hour: data[4],
            minute: data[5],
            second: data[6],
        })
    }

    /// Field-range check used by the clock commit path.
    pub fn is_valid(&self) -> bool {
        (1..=12).contains(&self.month)
            && self.day >= 1
            && self.day <= days_in_month(self.year, self.month)
            && self.hour < 24
            && self.minute < 60
            && self.second < 60
    }

    /// Render as `YYYY-MM-DDTHH:MM:SS`.
    pub fn format_iso8601(&self) -> String<20> {
        let mut s = String::new();
        // Infallible: the buffer fits the fixed-width format.
        let _ = write!(
            s,
            "{:04}-{:02}-{:02}T{:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        );
        s
    }

    /// This time advanced by `secs` seconds of wall clock.
    pub fn plus_seconds(&self, secs: u64) -> Self {
        let total = self.second as u64 + self.minute as u64 * 60 + self.hour as u64 * 3600 + secs;
        let mut t = Self {
            second: (total % 60) as u8,
            minute: ((total / 60) % 60) as u8,
            hour: ((total / 3600) % 24) as u8,
            ..*self
        };
        let mut days = total / 86_400;
        while days > 0 {
            let in_month = days_in_month(t.year, t.month);
            if t.day < in_month {
                // Remaining carry fits inside the current month.
                let room = (in_month - t.day) as u64;
                let step = if days < room { days } else { room };
                t.day += step as u8;
                days -= step;
                if days == 0 {
                    break;
                }
            }
            // Roll over into the next month.
            t.day = 1;
            days -= 1;
            if t.month == 12 {
                t.month = 1;
                t.year += 1;
            } else {
                t.month += 1;
            }
        }
        t
    }
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Calendar clock peripheral seam. The embedded build implements this with
/// a soft RTC over the monotonic timer; tests substitute a fixed clock.
pub trait Clock {
    /// Current calendar time, if the clock has ever been set.
    fn now(&self) -> Result<CalendarTime, ClockError>;

    /// Commit a new calendar time.
    fn set(&mut self, t: &CalendarTime) -> Result<(), ClockError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
