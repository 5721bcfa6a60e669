//! Mode/session controller.
//!
//! One radio, two mutually exclusive roles. The controller owns every
//! piece of session state - the peripheral and client connection slots,
//! the in-flight sensor read, the file stream, the pump flag and the
//! synced-clock flag - and advances on exactly one entry point:
//! [`ModeController::step`] consumes one event and returns the commands to
//! issue. Events are processed strictly in delivery order and no handler
//! ever runs concurrently with another, so none of this state needs a
//! lock.
//!
//! The five-step sensor read (discover service, discover characteristics,
//! write mode, read data, read battery) is not a call chain; it is a
//! sequence of callback invocations tied together by [`SessionState`]. An
//! ATT error at any step funnels into one shared abort path: disconnect
//! and fall back to idle.

pub mod event;

use crate::clock::{CalendarTime, Clock};
use crate::command::{self, CompanionCommand};
use crate::config::{
    LOG_INTERVAL_MS, PUMP_PULSE_MS, SCAN_SETTLE_MS, SENSOR_ADDR, SENSOR_CHAR_BATTERY_UUID,
    SENSOR_CHAR_DATA_UUID, SENSOR_CHAR_MODE_UUID, SENSOR_MODE_COMMAND, SENSOR_SERVICE_UUID,
    STREAM_EOT, STREAM_TICK_MS, SYNC_WINDOW_MS, VALUE_BUF_BYTES,
};
use crate::logger;
use crate::sensor::SensorReading;
use crate::storage::Storage;
use crate::stream::{StreamSession, StreamStep};
use crate::timers::TimerTag;
use crate::{debug, info, warn};
use event::{Addr, AttStatus, Command, Commands, ConnHandle, Event, ServiceRef, WriteTarget};
use heapless::Vec;

/// Where the controller currently is in the advertise/poll cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    /// Peripheral role: advertising, or serving a connected companion.
    Idle,
    /// Central role: scanning for the sensor.
    Scanning,
    /// Connect issued, waiting for connection-complete.
    Connecting,
    /// Primary-service discovery in flight.
    DiscoverService,
    /// Characteristic discovery in flight.
    DiscoverCharacteristics,
    /// Waiting for the measurement-mode write to complete.
    WriteMode,
    /// Waiting for the data characteristic read.
    ReadData,
    /// Waiting for the battery characteristic read.
    ReadBattery,
}

/// Client-role GATT state for one sensor session. Reset at session start
/// and on completion or abort.
struct ClientSession {
    conn: Option<ConnHandle>,
    service: Option<ServiceRef>,
    mode_handle: Option<u16>,
    data_handle: Option<u16>,
    battery_handle: Option<u16>,
    /// Staging buffer for the value of the read in flight.
    value: Vec<u8, VALUE_BUF_BYTES>,
}

impl ClientSession {
    const fn empty() -> Self {
        Self {
            conn: None,
            service: None,
            mode_handle: None,
            data_handle: None,
            battery_handle: None,
            value: Vec::new(),
        }
    }

    fn reset(&mut self) {
        *self = Self::empty();
    }

    fn has_all_characteristics(&self) -> bool {
        self.mode_handle.is_some() && self.data_handle.is_some() && self.battery_handle.is_some()
    }
}

/// The mode/session controller. Generic over the two collaborators that
/// answer synchronously; everything radio-shaped goes through commands.
pub struct ModeController<S: Storage, C: Clock> {
    state: SessionState,
    peripheral_conn: Option<ConnHandle>,
    client: ClientSession,
    reading: SensorReading,
    clock_synced: bool,
    stream: Option<StreamSession<S::File>>,
    pump_on: bool,
    storage: S,
    clock: C,
}

impl<S: Storage, C: Clock> ModeController<S, C> {
    pub fn new(storage: S, clock: C) -> Self {
        Self {
            state: SessionState::Idle,
            peripheral_conn: None,
            client: ClientSession::empty(),
            reading: SensorReading::zeroed(),
            clock_synced: false,
            stream: None,
            pump_on: false,
            storage,
            clock,
        }
    }

    /// Feed one event through the state machine.
    pub fn step(&mut self, event: Event) -> Commands {
        let mut out = Commands::new();
        match event {
            Event::StackUp => {
                info!("stack up, entering idle");
                self.enter_idle(&mut out);
            }
            Event::TimerFired(tag) => self.on_timer(tag, &mut out),
            Event::AdvReport { addr } => self.on_adv_report(addr, &mut out),
            Event::Connected { handle } => self.on_connected(handle, &mut out),
            Event::Disconnected { handle } => self.on_disconnected(handle, &mut out),
            Event::ServiceFound { service } => self.on_service_found(service),
            Event::CharacteristicFound {
                uuid16,
                value_handle,
            } => self.on_characteristic_found(uuid16, value_handle),
            Event::QueryComplete { status } => self.on_query_complete(status, &mut out),
            Event::CharacteristicValue { data } => self.on_characteristic_value(data),
            Event::AttWrite { target, data } => self.on_att_write(target, &data, &mut out),
        }
        out
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn clock_synced(&self) -> bool {
        self.clock_synced
    }

    pub fn pump_on(&self) -> bool {
        self.pump_on
    }

    pub fn streaming(&self) -> bool {
        self.stream.is_some()
    }

    pub fn peripheral_conn(&self) -> Option<ConnHandle> {
        self.peripheral_conn
    }

    pub fn client_conn(&self) -> Option<ConnHandle> {
        self.client.conn
    }

    /// Active link count, for the status LED.
    pub fn connection_count(&self) -> usize {
        self.peripheral_conn.iter().count() + self.client.conn.iter().count()
    }

    pub fn last_reading(&self) -> &SensorReading {
        &self.reading
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    // ── Idle / mode timing ────────────────────────────────────────────────

    /// (Re-)enter the advertising state and arm the mode timer. The timer
    /// is always withdrawn before being re-armed so one arming can never
    /// fire twice.
    fn enter_idle(&mut self, out: &mut Commands) {
        self.state = SessionState::Idle;
        self.client.reset();
        let window_ms = if self.clock_synced {
            info!(
                "idle: advertising, next log cycle in {} min",
                LOG_INTERVAL_MS / 60_000
            );
            LOG_INTERVAL_MS
        } else {
            info!(
                "idle: advertising for clock sync ({} s window)",
                SYNC_WINDOW_MS / 1_000
            );
            SYNC_WINDOW_MS
        };
        push(out, Command::CancelTimer(TimerTag::Mode));
        push(out, Command::StartAdvertising);
        push(
            out,
            Command::StartTimer {
                tag: TimerTag::Mode,
                after_ms: window_ms,
            },
        );
    }

    fn on_timer(&mut self, tag: TimerTag, out: &mut Commands) {
        match tag {
            TimerTag::Mode => {
                if self.state != SessionState::Idle {
                    debug!("ignoring mode timer outside idle");
                    return;
                }
                push(out, Command::StopAdvertising);
                if self.clock_synced {
                    // Give the stack a moment to quiesce before scanning.
                    info!("log cycle due, clock synced: scanning shortly");
                    push(
                        out,
                        Command::StartTimer {
                            tag: TimerTag::ScanDelay,
                            after_ms: SCAN_SETTLE_MS,
                        },
                    );
                } else {
                    info!("sync window over, clock not synced: restarting");
                    self.enter_idle(out);
                }
            }
            TimerTag::ScanDelay => {
                info!("settle delay over, scanning for sensor");
                self.state = SessionState::Scanning;
                push(out, Command::StartScan);
            }
            TimerTag::StreamChunk => self.on_stream_tick(out),
            TimerTag::PumpOff => {
                info!("pump off");
                self.pump_on = false;
                push(out, Command::SetPump(false));
            }
        }
    }

    // ── Client role: the five-step sensor read ────────────────────────────

    fn on_adv_report(&mut self, addr: Addr, out: &mut Commands) {
        if self.state != SessionState::Scanning {
            debug!("ignoring advertising report outside scan");
            return;
        }
        if addr != SENSOR_ADDR {
            return; // not our device
        }
        info!("found plant sensor, connecting");
        self.state = SessionState::Connecting;
        push(out, Command::StopScan);
        push(out, Command::Connect { addr });
    }

    fn on_connected(&mut self, handle: ConnHandle, out: &mut Commands) {
        match self.state {
            SessionState::Connecting => {
                info!("connected to sensor, discovering service");
                self.client.conn = Some(handle);
                self.state = SessionState::DiscoverService;
                push(
                    out,
                    Command::DiscoverService {
                        conn: handle,
                        uuid16: SENSOR_SERVICE_UUID,
                    },
                );
            }
            SessionState::Idle if self.peripheral_conn.is_none() => {
                // A companion connected to us: hold the peripheral role
                // until it leaves, and stop the clock on mode switching.
                info!("companion connected, staying in peripheral role");
                self.peripheral_conn = Some(handle);
                push(out, Command::StopAdvertising);
                push(out, Command::CancelTimer(TimerTag::Mode));
            }
            _ => {
                // The link layer occasionally redelivers a connection event
                // after the first one was consumed.
                warn!(
                    "ignoring duplicate connection event for handle {}",
                    handle.0
                );
            }
        }
    }

    fn on_service_found(&mut self, service: ServiceRef) {
        if self.state == SessionState::DiscoverService {
            self.client.service = Some(service);
        } else {
            debug!("ignoring service result outside discovery");
        }
    }

    fn on_characteristic_found(&mut self, uuid16: u16, value_handle: u16) {
        if self.state != SessionState::DiscoverCharacteristics {
            debug!("ignoring characteristic result outside discovery");
            return;
        }
        match uuid16 {
            SENSOR_CHAR_MODE_UUID => self.client.mode_handle = Some(value_handle),
            SENSOR_CHAR_DATA_UUID => self.client.data_handle = Some(value_handle),
            SENSOR_CHAR_BATTERY_UUID => self.client.battery_handle = Some(value_handle),
            _ => {}
        }
    }

    fn on_characteristic_value(&mut self, data: Vec<u8, VALUE_BUF_BYTES>) {
        match self.state {
            SessionState::ReadData | SessionState::ReadBattery => {
                self.client.value = data;
            }
            _ => debug!("ignoring characteristic value outside read"),
        }
    }

    fn on_query_complete(&mut self, status: AttStatus, out: &mut Commands) {
        match self.state {
            SessionState::DiscoverService => {
                if !self.att_ok(status, out) {
                    return;
                }
                let (Some(conn), Some(service)) = (self.client.conn, self.client.service) else {
                    warn!("service discovery yielded no service");
                    self.abort_session(out);
                    return;
                };
                info!("found sensor service, discovering characteristics");
                self.state = SessionState::DiscoverCharacteristics;
                push(out, Command::DiscoverCharacteristics { conn, service });
            }
            SessionState::DiscoverCharacteristics => {
                if !self.att_ok(status, out) {
                    return;
                }
                if !self.client.has_all_characteristics() {
                    warn!("sensor is missing expected characteristics");
                    self.abort_session(out);
                    return;
                }
                let (Some(conn), Some(value_handle)) = (self.client.conn, self.client.mode_handle)
                else {
                    self.abort_session(out);
                    return;
                };
                info!("found all characteristics, activating measurement");
                self.state = SessionState::WriteMode;
                let mut data = Vec::new();
                let _ = data.extend_from_slice(&SENSOR_MODE_COMMAND);
                push(
                    out,
                    Command::WriteCharacteristic {
                        conn,
                        value_handle,
                        data,
                    },
                );
            }
            SessionState::WriteMode => {
                if !self.att_ok(status, out) {
                    return;
                }
                let (Some(conn), Some(value_handle)) = (self.client.conn, self.client.data_handle)
                else {
                    self.abort_session(out);
                    return;
                };
                info!("measurement mode active, reading data");
                self.state = SessionState::ReadData;
                self.client.value.clear();
                push(out, Command::ReadCharacteristic { conn, value_handle });
            }
            SessionState::ReadData => {
                if !self.att_ok(status, out) {
                    return;
                }
                if !self.reading.apply_measurement(&self.client.value) {
                    warn!(
                        "measurement payload too short: {} bytes",
                        self.client.value.len()
                    );
                }
                let (Some(conn), Some(value_handle)) =
                    (self.client.conn, self.client.battery_handle)
                else {
                    self.abort_session(out);
                    return;
                };
                info!("data read complete, reading battery");
                self.state = SessionState::ReadBattery;
                self.client.value.clear();
                push(out, Command::ReadCharacteristic { conn, value_handle });
            }
            SessionState::ReadBattery => {
                // Best effort: a failed battery read still completes the
                // session with whatever was parsed so far.
                if status.is_success() {
                    self.reading.apply_battery(&self.client.value);
                } else {
                    warn!("battery read failed, att status {}", status.0);
                }
                self.finish_session(out);
            }
            _ => debug!("ignoring query completion outside session"),
        }
    }

    /// Shared ATT-status gate for every step of the sensor sequence. A
    /// non-success status drops the session through the one abort path.
    fn att_ok(&mut self, status: AttStatus, out: &mut Commands) -> bool {
        if status.is_success() {
            return true;
        }
        warn!("att error {} from sensor, dropping session", status.0);
        self.abort_session(out);
        false
    }

    /// The one abort path for the whole sensor sequence: disconnect and go
    /// idle. The connection slot stays set until the disconnection event
    /// actually arrives and clears it.
    fn abort_session(&mut self, out: &mut Commands) {
        self.state = SessionState::Idle;
        if let Some(handle) = self.client.conn {
            push(out, Command::Disconnect { handle });
        }
    }

    /// Session complete: log the reading and drop the sensor link.
    fn finish_session(&mut self, out: &mut Commands) {
        let r = &self.reading;
        info!(
            "reading: {} dC, {} lux, moisture {} %, {} uS/cm, battery {} %",
            r.deci_celsius, r.lux, r.moisture_pct, r.conductivity_us_cm, r.battery_pct
        );
        if logger::append_reading(&mut self.storage, &self.clock, &self.reading).is_err() {
            warn!("could not append reading to log");
        }
        self.abort_session(out);
    }

    fn on_disconnected(&mut self, handle: ConnHandle, out: &mut Commands) {
        if self.peripheral_conn == Some(handle) {
            info!("companion disconnected");
            self.peripheral_conn = None;
            // A stream must never outlive its connection.
            self.abort_stream(out);
        }
        if self.client.conn == Some(handle) {
            info!("sensor link closed");
            self.client.reset();
            self.state = SessionState::Idle;
        }
        // Only advertise again once no connection remains.
        if self.peripheral_conn.is_none() && self.client.conn.is_none() {
            self.enter_idle(out);
        }
    }

    // ── Peripheral role: companion writes ─────────────────────────────────

    fn on_att_write(&mut self, target: WriteTarget, data: &[u8], out: &mut Commands) {
        match target {
            WriteTarget::Clock => self.on_clock_write(data),
            WriteTarget::Command => self.on_command_write(data, out),
        }
    }

    fn on_clock_write(&mut self, data: &[u8]) {
        let Some(t) = CalendarTime::from_sync_payload(data) else {
            warn!("clock write rejected: expected 7 bytes, got {}", data.len());
            return;
        };
        match self.clock.set(&t) {
            Ok(()) => {
                info!(
                    "clock synced to {}-{}-{} {}:{}:{}",
                    t.year, t.month, t.day, t.hour, t.minute, t.second
                );
                self.clock_synced = true;
            }
            Err(_) => warn!("clock commit failed"),
        }
    }

    fn on_command_write(&mut self, data: &[u8], out: &mut Commands) {
        match command::parse(data) {
            Some(CompanionCommand::Get(name)) => self.start_stream(name.as_str(), out),
            Some(CompanionCommand::Pump) => self.start_pump(out),
            Some(CompanionCommand::List) => info!("LIST not implemented"),
            None => debug!("unrecognized command write dropped"),
        }
    }

    // ── File streaming ────────────────────────────────────────────────────

    /// Begin serving the named file, one chunk per tick. A request while a
    /// stream is active is rejected outright, never queued.
    fn start_stream(&mut self, name: &str, out: &mut Commands) {
        if self.stream.is_some() {
            warn!("stream already active, rejecting request");
            return;
        }
        match StreamSession::open(&mut self.storage, name) {
            Ok(session) => {
                info!("streaming file to companion");
                self.stream = Some(session);
                push(
                    out,
                    Command::StartTimer {
                        tag: TimerTag::StreamChunk,
                        after_ms: STREAM_TICK_MS,
                    },
                );
            }
            // No reply channel exists for a failed open; the companion
            // reads silence as failure.
            Err(_) => warn!("could not open requested file"),
        }
    }

    fn on_stream_tick(&mut self, out: &mut Commands) {
        let Some(conn) = self.peripheral_conn else {
            // Connection went away before the tick fired.
            self.abort_stream(out);
            return;
        };
        let Some(stream) = self.stream.as_mut() else {
            debug!("stale stream tick");
            return;
        };
        match stream.next_chunk(&mut self.storage) {
            StreamStep::Chunk(data) => {
                push(out, Command::Notify { conn, data });
                push(
                    out,
                    Command::StartTimer {
                        tag: TimerTag::StreamChunk,
                        after_ms: STREAM_TICK_MS,
                    },
                );
            }
            StreamStep::End => {
                info!("stream complete, sending end marker");
                let mut data = Vec::new();
                let _ = data.extend_from_slice(STREAM_EOT);
                push(out, Command::Notify { conn, data });
                self.stream = None;
            }
            StreamStep::Failed => {
                warn!("stream read failed, aborting transfer");
                self.stream = None;
            }
        }
    }

    /// Tear down any active stream: close the file and withdraw the tick.
    fn abort_stream(&mut self, out: &mut Commands) {
        if let Some(mut stream) = self.stream.take() {
            warn!("aborting active stream");
            stream.close(&mut self.storage);
            push(out, Command::CancelTimer(TimerTag::StreamChunk));
        }
    }

    // ── Pump ──────────────────────────────────────────────────────────────

    /// Pulse the pump output. Re-triggering while on is a no-op; the
    /// running shutoff timer is never extended or stacked.
    fn start_pump(&mut self, out: &mut Commands) {
        if self.pump_on {
            info!("pump command ignored, already running");
            return;
        }
        info!("pump on for {} ms", PUMP_PULSE_MS);
        self.pump_on = true;
        push(out, Command::SetPump(true));
        push(
            out,
            Command::StartTimer {
                tag: TimerTag::PumpOff,
                after_ms: PUMP_PULSE_MS,
            },
        );
    }
}

fn push(out: &mut Commands, cmd: Command) {
    if out.push(cmd).is_err() {
        warn!("command buffer full, dropping command");
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Unit Tests (run on host, not embedded)
// ═══════════════════════════════════════════════════════════════════════════
