//! RTU frame construction and validation for function codes 0x03 (read
//! holding registers) and 0x06 (write single register).
//!
//! Request:  `ID | FC | AddrHi | AddrLo | CountHi/ValHi | CountLo/ValLo | CRCLo | CRCHi`
//! Response: `ID | 0x03 | ByteCount | Data(ByteCount) | CRCLo | CRCHi`

use super::crc::{append_crc, crc16_modbus, has_valid_crc};
use super::registers::{bytes_to_registers, registers_to_bytes, Register};
use crate::utils::error::FrameError;

pub type SlaveId = u8;

pub const READ_HOLDING_REGISTERS: u8 = 0x03;
pub const WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const EXCEPTION_FLAG: u8 = 0x80;
pub const ILLEGAL_DATA_ADDRESS: u8 = 0x02;

pub const MIN_SLAVE_ID: SlaveId = 1;
pub const MAX_SLAVE_ID: SlaveId = 247;
/// Largest read whose byte count still fits the one-byte field.
pub const MAX_READ_QUANTITY: u16 = 125;
pub const REQUEST_FRAME_LEN: usize = 8;
pub const EXCEPTION_FRAME_LEN: usize = 5;

pub fn is_valid_slave_id(id: u8) -> bool {
    (MIN_SLAVE_ID..=MAX_SLAVE_ID).contains(&id)
}

/// Wire length of a read response carrying `count` registers.
pub fn read_response_len(count: u16) -> usize {
    3 + 2 * count as usize + 2
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFrame {
    ReadHoldingRegisters {
        slave_id: SlaveId,
        start_address: u16,
        quantity: u16,
    },
    WriteSingleRegister {
        slave_id: SlaveId,
        address: u16,
        value: u16,
    },
}

impl RequestFrame {
    pub fn slave_id(&self) -> SlaveId {
        match *self {
            RequestFrame::ReadHoldingRegisters { slave_id, .. } => slave_id,
            RequestFrame::WriteSingleRegister { slave_id, .. } => slave_id,
        }
    }

    pub fn function_code(&self) -> u8 {
        match self {
            RequestFrame::ReadHoldingRegisters { .. } => READ_HOLDING_REGISTERS,
            RequestFrame::WriteSingleRegister { .. } => WRITE_SINGLE_REGISTER,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match *self {
            RequestFrame::ReadHoldingRegisters { slave_id, start_address, quantity } => {
                encode_read_request(slave_id, start_address, quantity)
            }
            RequestFrame::WriteSingleRegister { slave_id, address, value } => {
                encode_write_request(slave_id, address, value)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseFrame {
    pub slave_id: SlaveId,
    pub function_code: u8,
    pub byte_count: u8,
    pub registers: Vec<Register>,
    pub checksum: u16,
}

fn encode_word_request(slave_id: SlaveId, function: u8, first: u16, second: u16) -> Vec<u8> {
    let mut request = Vec::with_capacity(REQUEST_FRAME_LEN);
    request.push(slave_id);
    request.push(function);
    request.extend_from_slice(&first.to_be_bytes());
    request.extend_from_slice(&second.to_be_bytes());
    append_crc(&mut request);
    request
}

pub fn encode_read_request(slave_id: SlaveId, start_address: u16, count: u16) -> Vec<u8> {
    encode_word_request(slave_id, READ_HOLDING_REGISTERS, start_address, count)
}

pub fn encode_write_request(slave_id: SlaveId, address: u16, value: u16) -> Vec<u8> {
    encode_word_request(slave_id, WRITE_SINGLE_REGISTER, address, value)
}

/// Validate a read holding registers response addressed from
/// `expected_slave` carrying `expected_count` registers.
///
/// Checks run in order: exception reply, length, slave ID, CRC, function
/// code, byte count. The first failure rejects the whole frame.
pub fn decode_read_response(
    bytes: &[u8],
    expected_slave: SlaveId,
    expected_count: u16,
) -> Result<ResponseFrame, FrameError> {
    check_exception(bytes, expected_slave, READ_HOLDING_REGISTERS)?;

    let min_len = read_response_len(expected_count);
    if bytes.len() < min_len {
        return Err(FrameError::TooShort { expected: min_len, actual: bytes.len() });
    }
    if bytes[0] != expected_slave {
        return Err(FrameError::SlaveMismatch { expected: expected_slave, actual: bytes[0] });
    }

    let checksum = check_crc(bytes)?;

    if bytes[1] != READ_HOLDING_REGISTERS {
        return Err(FrameError::FunctionMismatch { expected: READ_HOLDING_REGISTERS, actual: bytes[1] });
    }
    let expected_bytes = 2 * expected_count as usize;
    if bytes[2] as usize != expected_bytes {
        return Err(FrameError::ByteCountMismatch { expected: expected_bytes, actual: bytes[2] as usize });
    }

    let data = &bytes[3..3 + expected_bytes];
    let registers = bytes_to_registers(data).map_err(|_| FrameError::ByteCountMismatch {
        expected: expected_bytes,
        actual: data.len(),
    })?;

    Ok(ResponseFrame {
        slave_id: bytes[0],
        function_code: bytes[1],
        byte_count: bytes[2],
        registers,
        checksum,
    })
}

/// Validate the echo a device sends back for a write single register.
pub fn decode_write_response(bytes: &[u8], request: &[u8]) -> Result<(), FrameError> {
    let expected_slave = request.first().copied().unwrap_or_default();
    check_exception(bytes, expected_slave, WRITE_SINGLE_REGISTER)?;

    if bytes.len() < REQUEST_FRAME_LEN {
        return Err(FrameError::TooShort { expected: REQUEST_FRAME_LEN, actual: bytes.len() });
    }
    if bytes[0] != expected_slave {
        return Err(FrameError::SlaveMismatch { expected: expected_slave, actual: bytes[0] });
    }
    check_crc(bytes)?;
    if bytes[1] != WRITE_SINGLE_REGISTER {
        return Err(FrameError::FunctionMismatch { expected: WRITE_SINGLE_REGISTER, actual: bytes[1] });
    }
    if bytes != request {
        return Err(FrameError::EchoMismatch);
    }
    Ok(())
}

fn check_crc(bytes: &[u8]) -> Result<u16, FrameError> {
    let data_len = bytes.len() - 2;
    let received = u16::from_le_bytes([bytes[data_len], bytes[data_len + 1]]);
    let calculated = crc16_modbus(&bytes[..data_len]);
    if calculated != received {
        return Err(FrameError::CrcMismatch { calculated, received });
    }
    Ok(received)
}

fn check_exception(bytes: &[u8], expected_slave: SlaveId, function: u8) -> Result<(), FrameError> {
    if bytes.len() == EXCEPTION_FRAME_LEN
        && bytes[0] == expected_slave
        && bytes[1] == function | EXCEPTION_FLAG
        && has_valid_crc(bytes)
    {
        return Err(FrameError::Exception { function, code: bytes[2] });
    }
    Ok(())
}

/// Slave-side parse of one inbound frame. Anything that is not a
/// well-formed 0x03/0x06 request returns `None`; the caller drops it.
pub fn decode_request(bytes: &[u8]) -> Option<RequestFrame> {
    if bytes.len() < REQUEST_FRAME_LEN {
        return None;
    }
    let frame = &bytes[..REQUEST_FRAME_LEN];
    if !has_valid_crc(frame) {
        return None;
    }

    let slave_id = frame[0];
    let first = u16::from_be_bytes([frame[2], frame[3]]);
    let second = u16::from_be_bytes([frame[4], frame[5]]);

    match frame[1] {
        READ_HOLDING_REGISTERS if (1..=MAX_READ_QUANTITY).contains(&second) => {
            Some(RequestFrame::ReadHoldingRegisters { slave_id, start_address: first, quantity: second })
        }
        WRITE_SINGLE_REGISTER => Some(RequestFrame::WriteSingleRegister { slave_id, address: first, value: second }),
        _ => None,
    }
}

/// Build a read response: `ID | 0x03 | 2n | regs... | CRCLo | CRCHi`.
/// `registers` holds at most `MAX_READ_QUANTITY` values so the byte count
/// fits in one byte.
pub fn encode_read_response(slave_id: SlaveId, registers: &[Register]) -> Vec<u8> {
    debug_assert!(
        registers.len() <= MAX_READ_QUANTITY as usize,
        "read response of {} registers exceeds {}",
        registers.len(),
        MAX_READ_QUANTITY
    );
    let mut response = Vec::with_capacity(read_response_len(registers.len() as u16));
    response.push(slave_id);
    response.push(READ_HOLDING_REGISTERS);
    response.push((registers.len() * 2) as u8);
    response.extend_from_slice(&registers_to_bytes(registers));
    append_crc(&mut response);
    response
}

pub fn encode_exception_response(slave_id: SlaveId, function: u8, code: u8) -> Vec<u8> {
    let mut response = vec![slave_id, function | EXCEPTION_FLAG, code];
    append_crc(&mut response);
    response
}
