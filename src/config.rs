//! Application-wide constants and compile-time configuration.
//!
//! All protocol constants, timing parameters and buffer bounds live here
//! so they can be tuned in one place.

// Identity & advertising

/// Complete local name carried in the advertising payload.
pub const DEVICE_NAME: &str = "MiFlora Logger";

/// Static advertising payload: general-discoverable flags, complete local
/// name, complete list with our single 16-bit service UUID.
pub const ADV_DATA: [u8; 23] = [
    // Flags: LE general discoverable, BR/EDR not supported
    0x02, 0x01, 0x06,
    // Complete local name
    0x0F, 0x09, b'M', b'i', b'F', b'l', b'o', b'r', b'a', b' ', b'L', b'o', b'g', b'g', b'e', b'r',
    // Complete list of 16-bit service UUIDs: 0xAAA0
    0x03, 0x03, 0xA0, 0xAA,
];

// Hard BLE limit on legacy advertising payloads.
const _: () = assert!(ADV_DATA.len() <= 31);

/// Companion-facing GATT layout.
pub const LOGGER_SERVICE_UUID: u16 = 0xAAA0;
pub const CLOCK_CHAR_UUID: u16 = 0xAAA1;
pub const COMMAND_CHAR_UUID: u16 = 0xAAA2;
pub const STREAM_CHAR_UUID: u16 = 0xAAA3;

// Plant sensor (client role)

/// Fixed hardware address of the sensor we poll. Change to your sensor's.
pub const SENSOR_ADDR: [u8; 6] = [0x5C, 0x85, 0x7E, 0x13, 0x17, 0xF9];

/// Sensor GATT layout (Xiaomi Mi Flora).
pub const SENSOR_SERVICE_UUID: u16 = 0x1204;
pub const SENSOR_CHAR_MODE_UUID: u16 = 0x1A00;
pub const SENSOR_CHAR_DATA_UUID: u16 = 0x1A01;
pub const SENSOR_CHAR_BATTERY_UUID: u16 = 0x1A02;

/// Two-byte command that switches the sensor into live-measurement mode.
pub const SENSOR_MODE_COMMAND: [u8; 2] = [0xA0, 0x1F];

/// Largest value we stage from a sensor characteristic read.
pub const VALUE_BUF_BYTES: usize = 32;

// Mode timing

/// Advertising window while the clock has never been synced (ms).
pub const SYNC_WINDOW_MS: u32 = 30_000;

/// Advertising window between log cycles once the clock is synced (ms).
pub const LOG_INTERVAL_MS: u32 = 15 * 60 * 1000;

/// Settle delay between stopping advertising and starting the scan, so the
/// stack can fully quiesce (ms).
pub const SCAN_SETTLE_MS: u32 = 100;

// File streaming

/// Bytes per stream notification.
pub const STREAM_CHUNK_BYTES: usize = 64;

/// Delay between stream chunks (ms).
pub const STREAM_TICK_MS: u32 = 1;

/// Final notification closing a file transfer.
pub const STREAM_EOT: &[u8] = b"$$EOT$$";

// Companion commands

/// Upper bound on one inbound ATT write we accept.
pub const ATT_WRITE_MAX_BYTES: usize = 64;

/// Command buffer bound (bytes before the terminator).
pub const COMMAND_MAX_BYTES: usize = 63;

// Pump

/// Duration of one pump pulse (ms).
pub const PUMP_PULSE_MS: u32 = 5_000;

// Storage

/// Append-only reading log on the card.
pub const LOG_FILE_NAME: &str = "miflora_log.txt";
