//! Host integration tests: whole device lifecycles driven through the
//! controller with mock storage/clock and real timer bookkeeping.
//!
//! The harness plays the role of the embedded event loop: it applies
//! timer commands to a `TimerSet`, latches the pump pin, and captures
//! every radio command for inspection.

use floralog::clock::{CalendarTime, Clock};
use floralog::config::{
    LOG_FILE_NAME, LOG_INTERVAL_MS, SCAN_SETTLE_MS, SENSOR_ADDR, SENSOR_CHAR_BATTERY_UUID,
    SENSOR_CHAR_DATA_UUID, SENSOR_CHAR_MODE_UUID, STREAM_CHUNK_BYTES, STREAM_EOT, SYNC_WINDOW_MS,
};
use floralog::controller::event::{AttStatus, Command, Event, ServiceRef, WriteTarget};
use floralog::controller::{ModeController, SessionState};
use floralog::error::{ClockError, StorageError};
use floralog::storage::Storage;
use floralog::timers::{TimerSet, TimerTag};
use std::collections::BTreeMap;

// ── Mock collaborators ──────────────────────────────────────────────────

struct MemFile {
    data: Vec<u8>,
    pos: usize,
}

#[derive(Default)]
struct MemStorage {
    files: BTreeMap<String, Vec<u8>>,
    open_files: usize,
    appends: Vec<(String, String)>,
}

impl Storage for MemStorage {
    type File = MemFile;

    fn open(&mut self, name: &str) -> Result<MemFile, StorageError> {
        let data = self.files.get(name).ok_or(StorageError::NotFound)?.clone();
        self.open_files += 1;
        Ok(MemFile { data, pos: 0 })
    }

    fn read(&mut self, file: &mut MemFile, buf: &mut [u8]) -> Result<usize, StorageError> {
        let n = buf.len().min(file.data.len() - file.pos);
        buf[..n].copy_from_slice(&file.data[file.pos..file.pos + n]);
        file.pos += n;
        Ok(n)
    }

    fn close(&mut self, _file: MemFile) {
        self.open_files -= 1;
    }

    fn append(&mut self, name: &str, data: &str) -> Result<(), StorageError> {
        self.appends.push((name.into(), data.into()));
        Ok(())
    }
}

#[derive(Default)]
struct MockClock {
    now: Option<CalendarTime>,
    /// Commit succeeds but the readback fails, as on a stopped RTC.
    fail_now: bool,
}

impl Clock for MockClock {
    fn now(&self) -> Result<CalendarTime, ClockError> {
        if self.fail_now {
            return Err(ClockError::NotRunning);
        }
        self.now.ok_or(ClockError::NotRunning)
    }

    fn set(&mut self, t: &CalendarTime) -> Result<(), ClockError> {
        self.now = Some(*t);
        Ok(())
    }
}

// ── Harness: the event loop without the hardware ────────────────────────

const COMPANION: Event = Event::Connected {
    handle: floralog::controller::event::ConnHandle(0x80),
};
const COMPANION_HANDLE: floralog::controller::event::ConnHandle =
    floralog::controller::event::ConnHandle(0x80);
const SENSOR_HANDLE: floralog::controller::event::ConnHandle =
    floralog::controller::event::ConnHandle(0x41);

struct Harness {
    controller: ModeController<MemStorage, MockClock>,
    timers: TimerSet,
    now_ms: u64,
    issued: Vec<Command>,
    pump_pin: bool,
    pump_edges: usize,
}

impl Harness {
    fn new() -> Self {
        Self {
            controller: ModeController::new(MemStorage::default(), MockClock::default()),
            timers: TimerSet::new(),
            now_ms: 0,
            issued: Vec::new(),
            pump_pin: false,
            pump_edges: 0,
        }
    }

    fn with_file(name: &str, content: &[u8]) -> Self {
        let mut h = Self::new();
        let mut storage = MemStorage::default();
        storage.files.insert(name.into(), content.into());
        h.controller = ModeController::new(storage, MockClock::default());
        h
    }

    fn step(&mut self, event: Event) {
        let commands = self.controller.step(event);
        for command in commands {
            match command {
                Command::StartTimer { tag, after_ms } => {
                    self.timers.schedule(tag, self.now_ms + after_ms as u64);
                }
                Command::CancelTimer(tag) => self.timers.cancel(tag),
                Command::SetPump(on) => {
                    if self.pump_pin != on {
                        self.pump_edges += 1;
                    }
                    self.pump_pin = on;
                }
                other => self.issued.push(other),
            }
        }
    }

    /// Advance wall-clock time, firing due timers strictly in order.
    fn advance(&mut self, ms: u64) {
        let target = self.now_ms + ms;
        loop {
            match self.timers.next_deadline() {
                Some(at) if at <= target => {
                    self.now_ms = at;
                    if let Some(tag) = self.timers.pop_due(at) {
                        self.step(Event::TimerFired(tag));
                    }
                }
                _ => break,
            }
        }
        self.now_ms = target;
    }

    /// Drain the captured radio commands.
    fn issued(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.issued)
    }

    fn sync_clock(&mut self) {
        // 2025-10-23T20:20:00
        self.step(Event::AttWrite {
            target: WriteTarget::Clock,
            data: heapless::Vec::from_slice(&[0xE9, 0x07, 10, 23, 20, 20, 0]).unwrap(),
        });
    }

    fn write_command(&mut self, text: &[u8]) {
        self.step(Event::AttWrite {
            target: WriteTarget::Command,
            data: heapless::Vec::from_slice(text).unwrap(),
        });
    }

    /// Play the sensor side of one successful five-step read session.
    fn complete_sensor_session(&mut self, measurement: &[u8], battery: &[u8]) {
        self.step(Event::Connected {
            handle: SENSOR_HANDLE,
        });
        self.step(Event::ServiceFound {
            service: ServiceRef(0x10),
        });
        self.step(Event::QueryComplete {
            status: AttStatus::SUCCESS,
        });
        for (uuid16, value_handle) in [
            (SENSOR_CHAR_MODE_UUID, 0x11),
            (SENSOR_CHAR_DATA_UUID, 0x13),
            (SENSOR_CHAR_BATTERY_UUID, 0x15),
        ] {
            self.step(Event::CharacteristicFound {
                uuid16,
                value_handle,
            });
        }
        // Characteristic discovery complete, then the mode write.
        self.step(Event::QueryComplete {
            status: AttStatus::SUCCESS,
        });
        self.step(Event::QueryComplete {
            status: AttStatus::SUCCESS,
        });
        // Data read.
        self.step(Event::CharacteristicValue {
            data: heapless::Vec::from_slice(measurement).unwrap(),
        });
        self.step(Event::QueryComplete {
            status: AttStatus::SUCCESS,
        });
        // Battery read.
        self.step(Event::CharacteristicValue {
            data: heapless::Vec::from_slice(battery).unwrap(),
        });
        self.step(Event::QueryComplete {
            status: AttStatus::SUCCESS,
        });
        // The disconnect we requested comes back as an event.
        self.step(Event::Disconnected {
            handle: SENSOR_HANDLE,
        });
    }
}

fn measurement_payload() -> [u8; 16] {
    let mut p = [0u8; 16];
    p[0..2].copy_from_slice(&(-12i16).to_le_bytes());
    p[3..7].copy_from_slice(&1000u32.to_le_bytes());
    p[7] = 42;
    p[8..10].copy_from_slice(&300u16.to_le_bytes());
    p
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[test]
fn sync_window_loops_until_the_clock_is_set() {
    let mut h = Harness::new();
    h.step(Event::StackUp);

    // Three sync windows elapse; the device keeps advertising and never
    // leaves idle.
    h.advance(3 * SYNC_WINDOW_MS as u64 + 5);
    assert_eq!(h.controller.state(), SessionState::Idle);
    let issued = h.issued();
    let starts = issued
        .iter()
        .filter(|c| matches!(c, Command::StartAdvertising))
        .count();
    assert_eq!(starts, 4); // boot + three restarts
    assert!(!issued.iter().any(|c| matches!(c, Command::StartScan)));
    assert!(h.timers.is_pending(TimerTag::Mode));
}

#[test]
fn full_lifecycle_sync_then_poll_then_log() {
    let mut h = Harness::new();
    h.step(Event::StackUp);

    // Companion arrives mid-window, syncs the clock, leaves.
    h.advance(5_000);
    h.step(COMPANION);
    assert!(!h.timers.is_pending(TimerTag::Mode));
    h.sync_clock();
    assert!(h.controller.clock_synced());
    h.step(Event::Disconnected {
        handle: COMPANION_HANDLE,
    });
    h.issued();

    // The long interval elapses; after the settle delay the scan starts.
    h.advance(LOG_INTERVAL_MS as u64);
    assert!(h.timers.is_pending(TimerTag::ScanDelay));
    h.advance(SCAN_SETTLE_MS as u64);
    assert_eq!(h.controller.state(), SessionState::Scanning);
    assert!(h.issued().contains(&Command::StartScan));

    // The sensor shows up and the whole five-step read plays out.
    h.step(Event::AdvReport { addr: SENSOR_ADDR });
    h.complete_sensor_session(&measurement_payload(), &[77]);

    // Exactly one line was logged, stamped by the synced clock.
    let appends = &h.controller.storage().appends;
    assert_eq!(appends.len(), 1);
    assert_eq!(appends[0].0, LOG_FILE_NAME);
    assert_eq!(
        appends[0].1,
        "2025-10-23T20:20:00,Temp:-1.2,Light:1000,Moisture:42,Conductivity:300,Battery:77\n"
    );

    // Back in idle with the long window armed again.
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.timers.is_pending(TimerTag::Mode));
    let issued = h.issued();
    assert!(issued.contains(&Command::StartAdvertising));

    // No stray session state survives the cycle.
    assert_eq!(h.controller.client_conn(), None);
    assert_eq!(h.controller.storage().open_files, 0);
}

#[test]
fn unreadable_clock_logs_unknown_timestamp() {
    let mut h = Harness::new();
    h.controller = ModeController::new(
        MemStorage::default(),
        MockClock {
            now: None,
            fail_now: true,
        },
    );
    h.step(Event::StackUp);
    h.step(COMPANION);
    h.sync_clock();
    assert!(h.controller.clock_synced());
    h.step(Event::Disconnected {
        handle: COMPANION_HANDLE,
    });
    h.advance(LOG_INTERVAL_MS as u64 + SCAN_SETTLE_MS as u64);
    h.step(Event::AdvReport { addr: SENSOR_ADDR });
    h.complete_sensor_session(&measurement_payload(), &[77]);

    // The reading still lands in the log, stamped `unknown`.
    let appends = &h.controller.storage().appends;
    assert_eq!(appends.len(), 1);
    assert!(appends[0].1.starts_with("unknown,"));
}

#[test]
fn stream_transfer_end_to_end() {
    let mut h = Harness::with_file("plant.log", &[0x42; 150]);
    h.step(Event::StackUp);
    h.step(COMPANION);
    h.issued();

    h.write_command(b"GET:plant.log");
    assert!(h.controller.streaming());
    assert!(h.timers.is_pending(TimerTag::StreamChunk));

    // Let the 1 ms tick drain the whole file.
    h.advance(50);
    let issued = h.issued();
    let chunks: Vec<_> = issued
        .iter()
        .filter_map(|c| match c {
            Command::Notify { data, .. } => Some(data.as_slice().to_vec()),
            _ => None,
        })
        .collect();

    // 150 bytes = two full chunks + one remainder + one end marker.
    assert_eq!(chunks.len(), 4);
    assert_eq!(chunks[0].len(), STREAM_CHUNK_BYTES);
    assert_eq!(chunks[1].len(), STREAM_CHUNK_BYTES);
    assert_eq!(chunks[2].len(), 150 - 2 * STREAM_CHUNK_BYTES);
    assert_eq!(chunks[3], STREAM_EOT);

    // Stream is finished: file closed, tick gone, no further traffic.
    assert!(!h.controller.streaming());
    assert_eq!(h.controller.storage().open_files, 0);
    assert!(!h.timers.is_pending(TimerTag::StreamChunk));
    h.advance(50);
    assert!(h.issued().is_empty());
}

#[test]
fn disconnect_mid_stream_leaves_no_pending_tick_and_no_open_file() {
    let mut h = Harness::with_file("plant.log", &[0x42; 5_000]);
    h.step(Event::StackUp);
    h.step(COMPANION);
    h.write_command(b"GET:plant.log");
    h.advance(3);
    assert!(h.controller.streaming());

    h.step(Event::Disconnected {
        handle: COMPANION_HANDLE,
    });

    assert!(!h.controller.streaming());
    assert_eq!(h.controller.storage().open_files, 0);
    assert!(!h.timers.is_pending(TimerTag::StreamChunk));

    // Idle again, and quiet: time passing produces no stream traffic.
    h.issued();
    h.advance(100);
    assert!(h
        .issued()
        .iter()
        .all(|c| !matches!(c, Command::Notify { .. })));
}

#[test]
fn concurrent_get_requests_serve_only_the_first_file() {
    let mut h = Harness::with_file("b.log", &[1; 30]);
    h.controller = {
        let mut storage = MemStorage::default();
        storage.files.insert("b.log".into(), vec![1; 30]);
        storage.files.insert("a.log".into(), vec![2; 30]);
        ModeController::new(storage, MockClock::default())
    };
    h.step(Event::StackUp);
    h.step(COMPANION);
    h.issued();

    h.write_command(b"GET:b.log");
    h.write_command(b"GET:a.log");
    assert_eq!(h.controller.storage().open_files, 1);

    h.advance(10);
    let issued = h.issued();
    for c in &issued {
        if let Command::Notify { data, .. } = c {
            if data.as_slice() != STREAM_EOT {
                assert!(data.iter().all(|&b| b == 1), "stream mixed in wrong file");
            }
        }
    }
}

#[test]
fn pump_pulse_fires_once_for_back_to_back_commands() {
    let mut h = Harness::new();
    h.step(Event::StackUp);
    h.step(COMPANION);

    h.write_command(b"PUMP");
    assert!(h.pump_pin);
    h.write_command(b"PUMP");
    assert!(h.pump_pin);
    assert_eq!(h.pump_edges, 1);

    // One nominal duration later the output drops, exactly once.
    h.advance(10_000);
    assert!(!h.pump_pin);
    assert_eq!(h.pump_edges, 2);
    assert!(!h.timers.is_pending(TimerTag::PumpOff));
}

#[test]
fn sensor_vanishing_mid_discovery_recovers_to_advertising() {
    let mut h = Harness::new();
    h.step(Event::StackUp);
    h.sync_clock();
    h.advance(LOG_INTERVAL_MS as u64 + SCAN_SETTLE_MS as u64);
    h.step(Event::AdvReport { addr: SENSOR_ADDR });
    h.step(Event::Connected {
        handle: SENSOR_HANDLE,
    });
    h.issued();

    // Link drops while service discovery is in flight.
    h.step(Event::Disconnected {
        handle: SENSOR_HANDLE,
    });
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.issued().contains(&Command::StartAdvertising));
    assert!(h.timers.is_pending(TimerTag::Mode));

    // Late discovery results from the dead session are ignored.
    h.step(Event::ServiceFound {
        service: ServiceRef(0x10),
    });
    h.step(Event::QueryComplete {
        status: AttStatus::SUCCESS,
    });
    assert_eq!(h.controller.state(), SessionState::Idle);
    assert!(h.issued().is_empty());
}
