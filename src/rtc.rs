//! Soft calendar clock.
//!
//! The nRF52840 has no battery-backed calendar RTC, so the device keeps a
//! base timestamp (set by the companion's clock-sync write) plus the
//! monotonic uptime elapsed since it was set. Until the first sync the
//! clock reads as not running and log lines fall back to `unknown`.

use crate::clock::{CalendarTime, Clock};
use crate::error::ClockError;
use embassy_time::Instant;

#[derive(Default)]
pub struct SoftRtc {
    base: Option<(CalendarTime, Instant)>,
}

impl SoftRtc {
    pub const fn new() -> Self {
        Self { base: None }
    }
}

impl Clock for SoftRtc {
    fn now(&self) -> Result<CalendarTime, ClockError> {
        let (base, set_at) = self.base.as_ref().ok_or(ClockError::NotRunning)?;
        Ok(base.plus_seconds(set_at.elapsed().as_secs()))
    }

    fn set(&mut self, t: &CalendarTime) -> Result<(), ClockError> {
        if !t.is_valid() {
            return Err(ClockError::InvalidTime);
        }
        self.base = Some((*t, Instant::now()));
        Ok(())
    }
}
