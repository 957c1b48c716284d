pub mod client;
pub mod crc;
pub mod protocol;
pub mod registers;
pub mod transport;

pub use client::{ModbusClient, ModbusClientTrait};
pub use crc::crc16_modbus;
pub use protocol::{RequestFrame, ResponseFrame, SlaveId};
pub use registers::{float_to_registers, registers_to_float, registers_to_floats, Register};
pub use transport::{SerialTransport, Transport};
