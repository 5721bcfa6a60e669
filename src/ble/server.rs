//! Companion-facing GATT server.
//!
//! Advertises the datalogger service, accepts one companion connection at
//! a time, relays its characteristic writes (clock sync, commands) into
//! controller events and pushes file-stream notifications back out.

use crate::ble::{conn_handle, CommandReceiver, EventSender};
use crate::config::ADV_DATA;
use crate::controller::event::{Command, Event, WriteTarget};
use crate::{info, warn};
use embassy_futures::select::{select, Either};
use heapless::Vec;
use nrf_softdevice::ble::{gatt_server, peripheral, Connection};
use nrf_softdevice::Softdevice;

/// Custom datalogger service exposed to the companion app.
#[nrf_softdevice::gatt_service(uuid = "aaa0")]
pub struct DataloggerService {
    /// Calendar sync: u16 LE year, month, day, hour, minute, second.
    /// Deliberately wider than 7 bytes so wrong-length writes reach the
    /// controller and get logged there instead of dying at the ATT layer.
    #[characteristic(uuid = "aaa1", write)]
    pub clock_sync: Vec<u8, 16>,

    /// ASCII command string: `GET:<file>` | `PUMP` | `LIST`.
    #[characteristic(uuid = "aaa2", write)]
    pub command: Vec<u8, 64>,

    /// File-stream chunks; the final chunk is the literal `$$EOT$$`.
    #[characteristic(uuid = "aaa3", notify)]
    pub stream: Vec<u8, 64>,
}

#[nrf_softdevice::gatt_server]
pub struct Server {
    pub datalogger: DataloggerService,
}

/// Peripheral-role task: advertise when told to, serve one companion,
/// repeat. All decisions come from the controller as commands.
#[embassy_executor::task]
pub async fn companion_task(
    sd: &'static Softdevice,
    server: &'static Server,
    commands: CommandReceiver,
    events: EventSender,
) -> ! {
    loop {
        match commands.receive().await {
            Command::StartAdvertising => {
                advertise_and_serve(sd, server, &commands, &events).await;
            }
            // Not advertising and not connected: nothing to do for the
            // rest of the command set.
            _ => {}
        }
    }
}

async fn advertise_and_serve(
    sd: &'static Softdevice,
    server: &'static Server,
    commands: &CommandReceiver,
    events: &EventSender,
) {
    let adv = peripheral::ConnectableAdvertisement::ScannableUndirected {
        adv_data: &ADV_DATA,
        scan_data: &[],
    };
    let config = peripheral::Config::default();

    let conn = match select(
        peripheral::advertise_connectable(sd, adv, &config),
        wait_for_stop(commands),
    )
    .await
    {
        Either::First(Ok(conn)) => conn,
        Either::First(Err(_)) => {
            warn!("advertising failed to start");
            return;
        }
        // StopAdvertising: drop the advertising future and go quiet.
        Either::Second(()) => return,
    };

    let handle = conn_handle(&conn);
    events.send(Event::Connected { handle }).await;

    serve(&conn, server, commands, events).await;

    events.send(Event::Disconnected { handle }).await;
}

/// Wait for `StopAdvertising`. Every other command is meaningless without
/// a connection and is dropped.
async fn wait_for_stop(commands: &CommandReceiver) {
    loop {
        if matches!(commands.receive().await, Command::StopAdvertising) {
            return;
        }
    }
}

/// Run the GATT server for one connection. Ends when the companion leaves
/// or the controller asks us to drop the link.
async fn serve(
    conn: &Connection,
    server: &'static Server,
    commands: &CommandReceiver,
    events: &EventSender,
) {
    let handle = conn_handle(conn);

    let gatt = gatt_server::run(conn, server, |e| match e {
        ServerEvent::Datalogger(DataloggerServiceEvent::ClockSyncWrite(data)) => {
            forward_write(events, WriteTarget::Clock, &data);
        }
        ServerEvent::Datalogger(DataloggerServiceEvent::CommandWrite(data)) => {
            forward_write(events, WriteTarget::Command, &data);
        }
        ServerEvent::Datalogger(DataloggerServiceEvent::StreamCccdWrite { notifications }) => {
            info!("stream notifications enabled: {}", notifications);
        }
    });

    let command_loop = async {
        loop {
            match commands.receive().await {
                Command::Notify { conn: target, data } if target == handle => {
                    if server.datalogger.stream_notify(conn, &data).is_err() {
                        warn!("stream notify failed");
                    }
                }
                Command::Disconnect { handle: target } if target == handle => return,
                _ => {}
            }
        }
    };

    match select(gatt, command_loop).await {
        Either::First(_e) => info!("companion link closed"),
        // Dropping our Connection reference terminates the link.
        Either::Second(()) => info!("dropping companion link on request"),
    }
}

fn forward_write(events: &EventSender, target: WriteTarget, data: &[u8]) {
    let mut buf = Vec::new();
    if buf.extend_from_slice(data).is_err() {
        warn!("oversized att write dropped");
        return;
    }
    // This callback cannot await; if the controller loop is that far
    // behind, dropping the write is the only option.
    if events.try_send(Event::AttWrite { target, data: buf }).is_err() {
        warn!("event channel full - dropping att write");
    }
}
