//! Radio events in, radio commands out.
//!
//! The link-layer stack (and the timer loop) is reduced to one tagged
//! event union fed into [`ModeController::step`], which answers with the
//! commands to issue. Nothing in here talks to hardware, so the whole
//! protocol is drivable from host tests.
//!
//! [`ModeController::step`]: crate::controller::ModeController::step

use crate::config::{ATT_WRITE_MAX_BYTES, STREAM_CHUNK_BYTES, VALUE_BUF_BYTES};
use crate::timers::TimerTag;
use heapless::Vec;

/// Hardware (BLE) address of a remote device.
pub type Addr = [u8; 6];

/// Opaque identifier for one active radio link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ConnHandle(pub u16);

/// Opaque reference to a discovered remote service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ServiceRef(pub u16);

/// Status of one completed ATT operation; zero is success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AttStatus(pub u8);

impl AttStatus {
    pub const SUCCESS: AttStatus = AttStatus(0x00);
    /// Catch-all for stack-level failures with no ATT code of their own.
    pub const FAILED: AttStatus = AttStatus(0x0E);

    pub fn is_success(self) -> bool {
        self.0 == 0
    }
}

/// Which of our writable characteristics an inbound write targeted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum WriteTarget {
    Clock,
    Command,
}

/// Everything the outside world can tell the controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The link-layer stack finished powering up.
    StackUp,
    /// An advertising report was seen while scanning.
    AdvReport { addr: Addr },
    /// A connection completed. Either role; the controller decides whose
    /// it is from its current state.
    Connected { handle: ConnHandle },
    /// A connection closed.
    Disconnected { handle: ConnHandle },
    /// Primary-service discovery produced a service.
    ServiceFound { service: ServiceRef },
    /// Characteristic discovery produced one characteristic.
    CharacteristicFound { uuid16: u16, value_handle: u16 },
    /// The in-flight GATT query (discovery, read or write) finished.
    QueryComplete { status: AttStatus },
    /// A characteristic read produced a value.
    CharacteristicValue { data: Vec<u8, VALUE_BUF_BYTES> },
    /// The companion wrote to one of our characteristics.
    AttWrite {
        target: WriteTarget,
        data: Vec<u8, ATT_WRITE_MAX_BYTES>,
    },
    /// A scheduled one-shot timer fired.
    TimerFired(TimerTag),
}

/// Everything the controller can ask the outside world to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    StartAdvertising,
    StopAdvertising,
    StartScan,
    StopScan,
    Connect {
        addr: Addr,
    },
    Disconnect {
        handle: ConnHandle,
    },
    DiscoverService {
        conn: ConnHandle,
        uuid16: u16,
    },
    DiscoverCharacteristics {
        conn: ConnHandle,
        service: ServiceRef,
    },
    WriteCharacteristic {
        conn: ConnHandle,
        value_handle: u16,
        data: Vec<u8, 8>,
    },
    ReadCharacteristic {
        conn: ConnHandle,
        value_handle: u16,
    },
    /// Push one notification on the stream characteristic.
    Notify {
        conn: ConnHandle,
        data: Vec<u8, STREAM_CHUNK_BYTES>,
    },
    /// Drive the pump output pin.
    SetPump(bool),
    StartTimer {
        tag: TimerTag,
        after_ms: u32,
    },
    CancelTimer(TimerTag),
}

/// Commands produced by one `step` call, in issue order.
pub type Commands = Vec<Command, 8>;
