//! Central-role link to the plant sensor.
//!
//! Executes the controller's client-role commands one at a time - scan,
//! connect, service and characteristic discovery, the mode write and the
//! two reads - and answers each with the matching events. The sequencing
//! itself lives in the controller; this task is a dumb pair of hands.

use crate::ble::{conn_handle, CommandReceiver, EventSender};
use crate::config::{
    SENSOR_ADDR, SENSOR_CHAR_BATTERY_UUID, SENSOR_CHAR_DATA_UUID, SENSOR_CHAR_MODE_UUID,
    VALUE_BUF_BYTES,
};
use crate::controller::event::{AttStatus, Command, ConnHandle, Event};
use crate::{info, warn};
use heapless::Vec;
use nrf_softdevice::ble::{central, gatt_client, Address, AddressType, Connection, Uuid};
use nrf_softdevice::Softdevice;

/// State of the active sensor link, if any.
struct SensorLink {
    conn: Connection,
    service: Option<gatt_client::Service>,
}

/// Central-role task.
#[embassy_executor::task]
pub async fn sensor_task(
    sd: &'static Softdevice,
    commands: CommandReceiver,
    events: EventSender,
) -> ! {
    let mut link: Option<SensorLink> = None;

    loop {
        match commands.receive().await {
            Command::StartScan => scan_for_sensor(sd, &events).await,
            // The scan already stopped when it reported the sensor.
            Command::StopScan => {}
            Command::Connect { addr } => link = connect(sd, addr, &events).await,
            Command::DiscoverService { uuid16, .. } => {
                discover_service(link.as_mut(), uuid16, &events).await;
            }
            Command::DiscoverCharacteristics { .. } => {
                discover_characteristics(link.as_ref(), &events).await;
            }
            Command::WriteCharacteristic {
                value_handle, data, ..
            } => {
                write_characteristic(link.as_ref(), value_handle, &data, &events).await;
            }
            Command::ReadCharacteristic { value_handle, .. } => {
                read_characteristic(link.as_ref(), value_handle, &events).await;
            }
            Command::Disconnect { handle } => {
                if link.as_ref().map(|l| conn_handle(&l.conn)) == Some(handle) {
                    if let Some(l) = link.take() {
                        let _ = l.conn.disconnect();
                    }
                    events.send(Event::Disconnected { handle }).await;
                }
            }
            _ => {}
        }
    }
}

/// Scan until the fixed sensor address shows up. The scan stops itself on
/// the first matching report, mirroring the stop-scan-then-connect flow.
async fn scan_for_sensor(sd: &Softdevice, events: &EventSender) {
    info!("scanning for plant sensor");
    let config = central::ScanConfig::default();
    let result = central::scan(sd, &config, |params| {
        let addr = params.peer_addr.addr;
        if addr == SENSOR_ADDR {
            Some(addr)
        } else {
            None
        }
    })
    .await;

    match result {
        Ok(addr) => events.send(Event::AdvReport { addr }).await,
        Err(_) => warn!("scan ended with error"),
    }
}

async fn connect(sd: &Softdevice, addr: [u8; 6], events: &EventSender) -> Option<SensorLink> {
    let target = Address::new(AddressType::Public, addr);
    let whitelist = [&target];
    let config = central::ConnectConfig {
        scan_config: central::ScanConfig {
            whitelist: Some(&whitelist),
            ..Default::default()
        },
        ..Default::default()
    };

    match central::connect(sd, &config).await {
        Ok(conn) => {
            events
                .send(Event::Connected {
                    handle: conn_handle(&conn),
                })
                .await;
            Some(SensorLink {
                conn,
                service: None,
            })
        }
        Err(_) => {
            warn!("sensor connect failed");
            // No handle ever existed; a synthetic disconnection returns
            // the controller to idle.
            events
                .send(Event::Disconnected {
                    handle: ConnHandle(u16::MAX),
                })
                .await;
            None
        }
    }
}

async fn discover_service(link: Option<&mut SensorLink>, uuid16: u16, events: &EventSender) {
    let Some(link) = link else { return };
    match gatt_client::discover_service(&link.conn, Uuid::new_16(uuid16)).await {
        Ok(service) => {
            events
                .send(Event::ServiceFound {
                    service: crate::controller::event::ServiceRef(service.start_handle),
                })
                .await;
            link.service = Some(service);
            events
                .send(Event::QueryComplete {
                    status: AttStatus::SUCCESS,
                })
                .await;
        }
        Err(_) => {
            events
                .send(Event::QueryComplete {
                    status: AttStatus::FAILED,
                })
                .await;
        }
    }
}

async fn discover_characteristics(link: Option<&SensorLink>, events: &EventSender) {
    let Some(link) = link else { return };
    let Some(service) = link.service.as_ref() else {
        events
            .send(Event::QueryComplete {
                status: AttStatus::FAILED,
            })
            .await;
        return;
    };

    match gatt_client::discover_characteristics(&link.conn, service).await {
        Ok(characteristics) => {
            for ch in characteristics.iter() {
                for uuid16 in [
                    SENSOR_CHAR_MODE_UUID,
                    SENSOR_CHAR_DATA_UUID,
                    SENSOR_CHAR_BATTERY_UUID,
                ] {
                    if ch.uuid == Uuid::new_16(uuid16) {
                        events
                            .send(Event::CharacteristicFound {
                                uuid16,
                                value_handle: ch.handle_value,
                            })
                            .await;
                    }
                }
            }
            events
                .send(Event::QueryComplete {
                    status: AttStatus::SUCCESS,
                })
                .await;
        }
        Err(_) => {
            events
                .send(Event::QueryComplete {
                    status: AttStatus::FAILED,
                })
                .await;
        }
    }
}

async fn write_characteristic(
    link: Option<&SensorLink>,
    value_handle: u16,
    data: &[u8],
    events: &EventSender,
) {
    let Some(link) = link else { return };
    let status = match gatt_client::write(&link.conn, value_handle, data).await {
        Ok(()) => AttStatus::SUCCESS,
        Err(_) => AttStatus::FAILED,
    };
    events.send(Event::QueryComplete { status }).await;
}

async fn read_characteristic(link: Option<&SensorLink>, value_handle: u16, events: &EventSender) {
    let Some(link) = link else { return };
    let mut buf = [0u8; VALUE_BUF_BYTES];
    match gatt_client::read(&link.conn, value_handle, &mut buf).await {
        Ok(len) => {
            let mut data = Vec::new();
            let _ = data.extend_from_slice(&buf[..len.min(VALUE_BUF_BYTES)]);
            events.send(Event::CharacteristicValue { data }).await;
            events
                .send(Event::QueryComplete {
                    status: AttStatus::SUCCESS,
                })
                .await;
        }
        Err(_) => {
            events
                .send(Event::QueryComplete {
                    status: AttStatus::FAILED,
                })
                .await;
        }
    }
}
