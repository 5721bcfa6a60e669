//! Embedded entry point for the nRF52840 datalogger.
//!
//! Boot order mirrors the hardware bring-up: pump output driven low before
//! anything can trigger it, SD card probed, SoftDevice enabled, radio
//! tasks spawned, then the controller loop takes over. The controller
//! itself is pure (see the library crate); this binary only moves events
//! in and commands out.

#![no_std]
#![no_main]

use defmt_rtt as _;
use panic_probe as _;

use core::future::pending;
use core::sync::atomic::{AtomicUsize, Ordering};
use defmt::{info, unwrap};
use embassy_executor::Spawner;
use embassy_futures::select::{select, Either};
use embassy_nrf::gpio::{Level, Output, OutputDrive};
use embassy_nrf::{bind_interrupts, peripherals, spim};
use embassy_time::{Delay, Duration, Instant, Timer};
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use floralog::ble::server::{companion_task, Server};
use floralog::ble::sensor_link::sensor_task;
use floralog::ble::{CommandChannel, EventChannel};
use floralog::config::DEVICE_NAME;
use floralog::controller::event::{Command, Commands, Event};
use floralog::controller::ModeController;
use floralog::rtc::SoftRtc;
use floralog::sdcard::SdStorage;
use floralog::timers::TimerSet;
use nrf_softdevice::{raw, Softdevice};
use static_cell::StaticCell;

// GPIO assignment (nRF52840-DK defaults; adjust for your PCB):
//   Pump MOSFET    → P0.16
//   Status LED     → P0.06
//   SD card SCK    → P0.19
//   SD card MISO   → P0.21
//   SD card MOSI   → P0.20
//   SD card CS     → P0.17

type SdSpi = ExclusiveDevice<spim::Spim<'static, peripherals::SPI3>, Output<'static>, NoDelay>;
type AppStorage = SdStorage<SdSpi, Delay>;

bind_interrupts!(struct Irqs {
    SPIM3 => spim::InterruptHandler<peripherals::SPI3>;
});

/// Events from the radio tasks into the controller loop.
static EVENTS: EventChannel = EventChannel::new();
/// Peripheral-role commands (advertising, notifications).
static COMPANION_CMDS: CommandChannel = CommandChannel::new();
/// Central-role commands (scan, connect, GATT queries).
static SENSOR_CMDS: CommandChannel = CommandChannel::new();

/// Active link count, read by the heartbeat LED.
static CONNECTIONS: AtomicUsize = AtomicUsize::new(0);

#[embassy_executor::task]
async fn softdevice_task(sd: &'static Softdevice) -> ! {
    sd.run().await
}

/// Status LED: slow blink while idle, quick flash while either link is up.
#[embassy_executor::task]
async fn heartbeat_task(mut led: Output<'static>) -> ! {
    loop {
        led.toggle();
        let period_ms = if CONNECTIONS.load(Ordering::Relaxed) > 0 {
            100
        } else {
            1_000
        };
        Timer::after(Duration::from_millis(period_ms)).await;
    }
}

fn softdevice_config() -> nrf_softdevice::Config {
    nrf_softdevice::Config {
        clock: Some(raw::nrf_clock_lf_cfg_t {
            source: raw::NRF_CLOCK_LF_SRC_RC as u8,
            rc_ctiv: 16,
            rc_temp_ctiv: 2,
            accuracy: raw::NRF_CLOCK_LF_ACCURACY_500_PPM as u8,
        }),
        // One companion link plus one sensor link.
        conn_gap: Some(raw::ble_gap_conn_cfg_t {
            conn_count: 2,
            event_length: 24,
        }),
        gap_role_count: Some(raw::ble_gap_cfg_role_count_t {
            adv_set_count: 1,
            periph_role_count: 1,
            central_role_count: 1,
            central_sec_count: 0,
            _bitfield_1: raw::ble_gap_cfg_role_count_t::new_bitfield_1(0),
        }),
        gap_device_name: Some(raw::ble_gap_cfg_device_name_t {
            p_value: DEVICE_NAME.as_ptr() as _,
            current_len: DEVICE_NAME.len() as u16,
            max_len: DEVICE_NAME.len() as u16,
            write_perm: unsafe { core::mem::zeroed() },
            _bitfield_1: raw::ble_gap_cfg_device_name_t::new_bitfield_1(
                raw::BLE_GATTS_VLOC_STACK as u8,
            ),
        }),
        ..Default::default()
    }
}

#[embassy_executor::main]
async fn main(spawner: Spawner) {
    // Interrupt priorities P0/P1/P4 are reserved by the SoftDevice.
    let mut config = embassy_nrf::config::Config::default();
    config.gpiote_interrupt_priority = embassy_nrf::interrupt::Priority::P2;
    config.time_interrupt_priority = embassy_nrf::interrupt::Priority::P2;
    let p = embassy_nrf::init(config);

    info!("--- floralog datalogger ---");

    // Pump off before anything can trigger it.
    let pump = Output::new(p.P0_16, Level::Low, OutputDrive::Standard);
    let led = Output::new(p.P0_06, Level::Low, OutputDrive::Standard);

    // SD card on SPI3.
    let mut spi_config = spim::Config::default();
    spi_config.frequency = spim::Frequency::M8;
    let spi = spim::Spim::new(p.SPI3, Irqs, p.P0_19, p.P0_21, p.P0_20, spi_config);
    let cs = Output::new(p.P0_17, Level::High, OutputDrive::Standard);
    let spi_dev = ExclusiveDevice::new_no_delay(spi, cs);
    let storage = AppStorage::new(spi_dev, Delay);

    let sd = Softdevice::enable(&softdevice_config());
    static SERVER: StaticCell<Server> = StaticCell::new();
    let server: &'static Server = SERVER.init(unwrap!(Server::new(sd)));

    unwrap!(spawner.spawn(softdevice_task(sd)));
    unwrap!(spawner.spawn(heartbeat_task(led)));
    unwrap!(spawner.spawn(companion_task(
        sd,
        server,
        COMPANION_CMDS.receiver(),
        EVENTS.sender(),
    )));
    unwrap!(spawner.spawn(sensor_task(sd, SENSOR_CMDS.receiver(), EVENTS.sender())));

    let controller = ModeController::new(storage, SoftRtc::new());
    run_controller(controller, pump).await
}

/// The single logical thread of control: dispatch radio events and due
/// timers into the state machine, then fan its commands back out.
async fn run_controller(mut controller: ModeController<AppStorage, SoftRtc>, mut pump: Output<'static>) -> ! {
    let mut timers = TimerSet::new();

    // The SoftDevice is up once the tasks are running.
    let boot = controller.step(Event::StackUp);
    dispatch_all(boot, &mut timers, &mut pump).await;

    loop {
        let timer_wait = async {
            match timers.next_deadline() {
                Some(at) => Timer::at(Instant::from_millis(at)).await,
                None => pending::<()>().await,
            }
        };

        let event = match select(EVENTS.receive(), timer_wait).await {
            Either::First(event) => event,
            Either::Second(()) => match timers.pop_due(Instant::now().as_millis()) {
                Some(tag) => Event::TimerFired(tag),
                None => continue,
            },
        };

        let commands = controller.step(event);
        CONNECTIONS.store(controller.connection_count(), Ordering::Relaxed);
        dispatch_all(commands, &mut timers, &mut pump).await;
    }
}

async fn dispatch_all(commands: Commands, timers: &mut TimerSet, pump: &mut Output<'static>) {
    for command in commands {
        match command {
            Command::StartTimer { tag, after_ms } => {
                timers.schedule(tag, Instant::now().as_millis() + after_ms as u64);
            }
            Command::CancelTimer(tag) => timers.cancel(tag),
            Command::SetPump(on) => {
                pump.set_level(if on { Level::High } else { Level::Low });
            }
            // Peripheral-role commands.
            Command::StartAdvertising | Command::StopAdvertising | Command::Notify { .. } => {
                COMPANION_CMDS.send(command).await;
            }
            // Either role may own the handle; both tasks filter by it.
            Command::Disconnect { .. } => {
                COMPANION_CMDS.send(command.clone()).await;
                SENSOR_CMDS.send(command).await;
            }
            // Central-role commands.
            other => SENSOR_CMDS.send(other).await,
        }
    }
}
