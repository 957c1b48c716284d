use async_trait::async_trait;
use log::{debug, info};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use super::protocol::{
    decode_read_response, decode_write_response, encode_read_request, encode_write_request,
    is_valid_slave_id, ILLEGAL_DATA_ADDRESS, MAX_READ_QUANTITY,
};
use super::registers::Register;
use super::transport::Transport;
use crate::utils::error::{FrameError, ModbusError};

#[async_trait]
pub trait ModbusClientTrait: Send + Sync {
    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<Register>, ModbusError>;

    async fn write_single_register(
        &self,
        slave_id: u8,
        register_addr: u16,
        value: u16,
        timeout: Duration,
    ) -> Result<(), ModbusError>;
}

/// Bus master. Holds the transport and serializes transactions: the bus
/// lock is held from request send until the response (or timeout), so at
/// most one request is ever outstanding.
pub struct ModbusClient {
    transport: Arc<dyn Transport>,
    bus: Mutex<()>,
}

impl ModbusClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            bus: Mutex::new(()),
        }
    }

    async fn transact(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>, ModbusError> {
        let _bus = self.bus.lock().await;
        self.transport.clear().await?;
        self.transport.send(request).await?;
        self.transport.receive(timeout).await
    }
}

fn map_exception(err: FrameError, start: u16, count: u16) -> ModbusError {
    match err {
        FrameError::Exception { code, .. } if code == ILLEGAL_DATA_ADDRESS => ModbusError::OutOfRange { start, count },
        other => ModbusError::Frame(other),
    }
}

#[async_trait]
impl ModbusClientTrait for ModbusClient {
    async fn read_holding_registers(
        &self,
        slave_id: u8,
        start_addr: u16,
        count: u16,
        timeout: Duration,
    ) -> Result<Vec<Register>, ModbusError> {
        if !is_valid_slave_id(slave_id) {
            return Err(ModbusError::InvalidSlaveId(slave_id));
        }
        if count == 0 || count > MAX_READ_QUANTITY {
            return Err(ModbusError::InvalidLength(count as usize));
        }
        debug!("📊 Reading {} registers from device {} starting at address {}", count, slave_id, start_addr);

        let request = encode_read_request(slave_id, start_addr, count);
        let response = self.transact(&request, timeout).await?;

        let frame = decode_read_response(&response, slave_id, count)
            .map_err(|e| map_exception(e, start_addr, count))?;
        Ok(frame.registers)
    }

    async fn write_single_register(
        &self,
        slave_id: u8,
        register_addr: u16,
        value: u16,
        timeout: Duration,
    ) -> Result<(), ModbusError> {
        if !is_valid_slave_id(slave_id) {
            return Err(ModbusError::InvalidSlaveId(slave_id));
        }

        let request = encode_write_request(slave_id, register_addr, value);
        let response = self.transact(&request, timeout).await?;

        decode_write_response(&response, &request).map_err(|e| map_exception(e, register_addr, 1))?;
        info!("✅ Wrote 0x{:04X} to register {} on device {}", value, register_addr, slave_id);
        Ok(())
    }
}
