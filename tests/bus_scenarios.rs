//! End-to-end exchanges between the master and simulated devices over the
//! in-process bus.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rs485_bus::modbus::crc::append_crc;
use rs485_bus::modbus::protocol::{SlaveId, EXCEPTION_FLAG, ILLEGAL_DATA_ADDRESS, READ_HOLDING_REGISTERS};
use rs485_bus::modbus::registers::registers_to_float;
use rs485_bus::output::TelemetrySink;
use rs485_bus::storage::StorageSink;
use rs485_bus::{
    BusScanner, LoopbackTransport, ModbusClient, ModbusClientTrait, ModbusError, PollingCycle, RegisterBank,
    RequestHandler, SlaveAddressTable,
};

const TIMEOUT: Duration = Duration::from_millis(50);

fn bus(table: SlaveAddressTable, exceptions: bool) -> (Arc<ModbusClient>, Arc<LoopbackTransport>) {
    let handler = RequestHandler::new(Arc::new(table)).with_exception_responses(exceptions);
    let transport = Arc::new(LoopbackTransport::new(handler));
    (Arc::new(ModbusClient::new(transport.clone())), transport)
}

fn request(bytes: &[u8]) -> Vec<u8> {
    let mut frame = bytes.to_vec();
    append_crc(&mut frame);
    frame
}

#[tokio::test]
async fn read_float_from_two_register_bank() {
    let table = SlaveAddressTable::build(&[1], |_| RegisterBank::new(vec![0x4228, 0x0000])).unwrap();
    let (client, _) = bus(table, false);

    let registers = client.read_holding_registers(1, 0, 2, TIMEOUT).await.unwrap();
    assert_eq!(registers, vec![0x4228, 0x0000]);
    assert_eq!(registers_to_float(registers[0], registers[1]), 42.0);
}

#[tokio::test]
async fn single_register_reply_bytes() {
    let table = SlaveAddressTable::build(&[1], |_| RegisterBank::new(vec![0x0064])).unwrap();
    let (_, transport) = bus(table, false);

    let reply = transport
        .handler()
        .handle(&request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x01]))
        .unwrap();
    assert_eq!(reply, request(&[0x01, 0x03, 0x02, 0x00, 0x64]));
}

#[tokio::test]
async fn out_of_range_read_is_silent_by_default() {
    let table = SlaveAddressTable::build(&[1], |_| RegisterBank::from_floats(&[1.5])).unwrap();
    let (client, transport) = bus(table, false);

    assert!(transport.handler().handle(&request(&[0x01, 0x03, 0x00, 0x05, 0x00, 0x01])).is_none());
    let err = client.read_holding_registers(1, 5, 1, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ModbusError::Timeout));
}

#[tokio::test]
async fn out_of_range_read_with_exception_replies() {
    let table = SlaveAddressTable::build(&[1], |_| RegisterBank::from_floats(&[1.5])).unwrap();
    let (client, transport) = bus(table, true);

    let reply = transport
        .handler()
        .handle(&request(&[0x01, 0x03, 0x00, 0x05, 0x00, 0x01]))
        .unwrap();
    assert_eq!(reply[1], READ_HOLDING_REGISTERS | EXCEPTION_FLAG);
    assert_eq!(reply[2], ILLEGAL_DATA_ADDRESS);

    let err = client.read_holding_registers(1, 5, 1, TIMEOUT).await.unwrap_err();
    assert!(matches!(err, ModbusError::OutOfRange { start: 5, count: 1 }));
}

#[tokio::test]
async fn scan_finds_only_present_devices() {
    let table = SlaveAddressTable::build(&[2], |_| RegisterBank::from_floats(&[7.0])).unwrap();
    let (client, _) = bus(table, false);

    let found = BusScanner::new(client).with_timeout(TIMEOUT).scan(1..=3).await;
    assert_eq!(found.into_iter().collect::<Vec<_>>(), vec![2]);
}

#[tokio::test]
async fn unknown_device_never_answers() {
    let table = SlaveAddressTable::build(&[1, 2], |_| RegisterBank::from_floats(&[0.0])).unwrap();
    let (client, transport) = bus(table, true);

    assert!(transport.handler().handle(&request(&[0x09, 0x03, 0x00, 0x00, 0x00, 0x02])).is_none());
    assert!(matches!(
        client.read_holding_registers(9, 0, 2, TIMEOUT).await,
        Err(ModbusError::Timeout)
    ));
}

#[tokio::test]
async fn corrupted_request_is_ignored() {
    let table = SlaveAddressTable::build(&[1], |_| RegisterBank::from_floats(&[0.0])).unwrap();
    let (_, transport) = bus(table, true);

    let mut frame = request(&[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
    frame[7] ^= 0xFF;
    assert!(transport.handler().handle(&frame).is_none());
}

#[tokio::test]
async fn write_then_read_back() {
    let table = SlaveAddressTable::build(&[3], |_| RegisterBank::new(vec![0; 4])).unwrap();
    let (client, _) = bus(table, false);

    client.write_single_register(3, 2, 0xBEEF, TIMEOUT).await.unwrap();
    let registers = client.read_holding_registers(3, 0, 4, TIMEOUT).await.unwrap();
    assert_eq!(registers, vec![0, 0, 0xBEEF, 0]);
}

#[derive(Default)]
struct Collected(std::sync::Mutex<Vec<(SlaveId, f32)>>);

#[async_trait]
impl TelemetrySink for Collected {
    async fn publish(&self, slave_id: SlaveId, value: f32) {
        self.0.lock().unwrap().push((slave_id, value));
    }

    fn sink_type(&self) -> &str {
        "collected"
    }
}

#[async_trait]
impl StorageSink for Collected {
    async fn record(&self, _slave_id: SlaveId, _value: f32) {}

    fn sink_type(&self) -> &str {
        "collected"
    }
}

#[tokio::test]
async fn discovery_then_polling_skips_silent_devices() {
    let table = SlaveAddressTable::build(&[1, 4], |id| RegisterBank::from_floats(&[id as f32 + 0.5])).unwrap();
    let (client, transport) = bus(table, false);

    let found = BusScanner::new(client.clone()).with_timeout(TIMEOUT).scan(1..=5).await;
    let mut ids: Vec<SlaveId> = found.into_iter().collect();
    // A device listed but gone from the bus must not stall the pass.
    ids.insert(1, 3);

    let sink = Arc::new(Collected::default());
    let cycle = PollingCycle::new(client, sink.clone(), sink.clone(), ids).with_timeout(TIMEOUT);
    let report = cycle.run_once().await;

    assert_eq!(report.succeeded(), vec![1, 4]);
    assert_eq!(report.failed(), vec![3]);
    assert_eq!(*sink.0.lock().unwrap(), vec![(1, 1.5), (4, 4.5)]);

    // Banks refreshed between passes are picked up on the next one.
    transport.handler().table().resolve(4).unwrap().replace_floats(&[9.0]);
    let report = cycle.run_once().await;
    assert_eq!(report.readings[1], (4, vec![9.0]));
}
