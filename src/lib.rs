//! floralog - a dual-role BLE datalogger for a plant sensor.
//!
//! The device spends most of its life advertising as a peripheral so a
//! companion app can sync the clock, trigger the pump and download log
//! files. Once the clock is trustworthy, a periodic timer flips the radio
//! into the central role for one five-step read of a fixed Xiaomi MiFlora
//! sensor, logs the reading to the SD card, and returns to advertising.
//!
//! Everything that can be tested on the host lives in this library: the
//! mode/session state machine ([`controller`]), the payload parsers
//! ([`sensor`], [`clock`], [`command`]), the file streaming engine
//! ([`stream`]) and the timer bookkeeping ([`timers`]). The controller is a
//! pure `step(event) -> commands` function over the radio, so the whole
//! protocol can be driven in unit tests without a SoftDevice.
//!
//! The embedded binary (`main.rs`, feature `embedded`) wires the library to
//! the nRF52840: SoftDevice S140 for the radio, an SPI SD card for storage,
//! and a GPIO for the pump.
//!
//! Usage: `cargo test` on the host, `cargo run --features embedded` on
//! target via probe-rs.

#![cfg_attr(not(test), no_std)]

// Logging facade: defmt on target, `log` everywhere else. Modules pull the
// macros in with `use crate::{info, warn}` and stick to `{}` with primitive
// arguments so both backends accept the format strings.
#[cfg(feature = "defmt")]
pub(crate) use defmt::{debug, info, warn};
#[cfg(not(feature = "defmt"))]
pub(crate) use log::{debug, info, warn};

pub mod clock;
pub mod command;
pub mod config;
pub mod controller;
pub mod error;
pub mod logger;
pub mod sensor;
pub mod storage;
pub mod stream;
pub mod timers;

// Embedded adapters: SoftDevice radio tasks, SD card storage, soft RTC.
#[cfg(feature = "embedded")]
pub mod ble;
#[cfg(feature = "embedded")]
pub mod rtc;
#[cfg(feature = "embedded")]
pub mod sdcard;

pub use controller::ModeController;
pub use sensor::SensorReading;
