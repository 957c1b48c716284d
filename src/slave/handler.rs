use log::{debug, warn};
use std::sync::Arc;

use super::table::SlaveAddressTable;
use crate::modbus::protocol::{
    decode_request, encode_exception_response, encode_read_response, RequestFrame, ILLEGAL_DATA_ADDRESS,
};
use crate::utils::error::ModbusError;

/// Turns one inbound frame into at most one reply frame.
///
/// Unparseable frames and unknown IDs never get an answer. Out-of-range
/// addresses are dropped too unless exception replies are enabled, in which
/// case the device answers with exception 0x02 (illegal data address).
#[derive(Debug, Clone)]
pub struct RequestHandler {
    table: Arc<SlaveAddressTable>,
    exception_responses: bool,
}

impl RequestHandler {
    pub fn new(table: Arc<SlaveAddressTable>) -> Self {
        Self {
            table,
            exception_responses: false,
        }
    }

    pub fn with_exception_responses(mut self, enabled: bool) -> Self {
        self.exception_responses = enabled;
        self
    }

    pub fn table(&self) -> &Arc<SlaveAddressTable> {
        &self.table
    }

    pub fn handle(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let request = match decode_request(bytes) {
            Some(request) => request,
            None => {
                debug!("🔇 Dropping unrecognized frame: {}", hex::encode(bytes));
                return None;
            }
        };

        let bank = match self.table.resolve(request.slave_id()) {
            Ok(bank) => bank,
            Err(_) => {
                debug!("🔇 No device at address {}, ignoring", request.slave_id());
                return None;
            }
        };

        let result = match request {
            RequestFrame::ReadHoldingRegisters { slave_id, start_address, quantity } => {
                debug!(
                    "📨 Read request: device {}, start {}, quantity {}",
                    slave_id, start_address, quantity
                );
                bank.read(start_address, quantity)
                    .map(|registers| encode_read_response(slave_id, &registers))
            }
            RequestFrame::WriteSingleRegister { slave_id, address, value } => {
                debug!("📝 Write request: device {}, register {} = 0x{:04X}", slave_id, address, value);
                bank.write(address, value).map(|_| request.encode())
            }
        };

        match result {
            Ok(response) => Some(response),
            Err(ModbusError::OutOfRange { start, count }) => {
                warn!(
                    "⚠️  Device {}: registers {}+{} beyond bank of {}",
                    request.slave_id(),
                    start,
                    count,
                    bank.len()
                );
                self.exception_responses.then(|| {
                    encode_exception_response(request.slave_id(), request.function_code(), ILLEGAL_DATA_ADDRESS)
                })
            }
            Err(e) => {
                warn!("⚠️  Device {}: {}", request.slave_id(), e);
                None
            }
        }
    }
}
