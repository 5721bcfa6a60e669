//! Bluetooth Low Energy subsystem (embedded build only).
//!
//! This module drives the Nordic SoftDevice S140 in both roles, one at a
//! time, under the pure controller's direction:
//!
//! 1. **Server** - advertises the datalogger service and relays the
//!    companion app's characteristic writes into controller events.
//! 2. **Sensor link** - executes the central-role commands (scan, connect,
//!    discovery, reads, the mode write) against the plant sensor and
//!    synthesizes the matching query events.
//!
//! Neither task decides anything: every transition lives in
//! [`crate::controller::ModeController`]. Communication runs over Embassy
//! channels owned by the binary's crate root.

pub mod sensor_link;
pub mod server;

use crate::controller::event::{Command, ConnHandle, Event};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use nrf_softdevice::ble::Connection;

/// Events from both radio tasks into the controller loop.
pub type EventChannel = Channel<CriticalSectionRawMutex, Event, 8>;
pub type EventSender = Sender<'static, CriticalSectionRawMutex, Event, 8>;

/// Commands from the controller loop to one radio task.
pub type CommandChannel = Channel<CriticalSectionRawMutex, Command, 8>;
pub type CommandReceiver = Receiver<'static, CriticalSectionRawMutex, Command, 8>;

/// Controller-facing handle for a SoftDevice connection.
pub fn conn_handle(conn: &Connection) -> ConnHandle {
    ConnHandle(conn.handle().unwrap_or(u16::MAX))
}
