//! IEEE-754 single-precision values carried in pairs of holding registers,
//! most-significant register first, each register big-endian.

use crate::utils::error::ModbusError;

/// One 16-bit holding register.
pub type Register = u16;

pub fn float_to_registers(value: f32) -> (Register, Register) {
    let bytes = value.to_be_bytes();
    (
        u16::from_be_bytes([bytes[0], bytes[1]]),
        u16::from_be_bytes([bytes[2], bytes[3]]),
    )
}

pub fn registers_to_float(hi: Register, lo: Register) -> f32 {
    let [a, b] = hi.to_be_bytes();
    let [c, d] = lo.to_be_bytes();
    f32::from_be_bytes([a, b, c, d])
}

/// Decode every consecutive register pair. An odd-length sequence has no
/// valid decoding and is rejected whole.
pub fn registers_to_floats(registers: &[Register]) -> Result<Vec<f32>, ModbusError> {
    if registers.len() % 2 != 0 {
        return Err(ModbusError::InvalidLength(registers.len()));
    }
    Ok(registers
        .chunks_exact(2)
        .map(|pair| registers_to_float(pair[0], pair[1]))
        .collect())
}

pub fn floats_to_registers(values: &[f32]) -> Vec<Register> {
    values
        .iter()
        .flat_map(|&v| {
            let (hi, lo) = float_to_registers(v);
            [hi, lo]
        })
        .collect()
}

/// Registers as they appear in a frame's data section.
pub fn registers_to_bytes(registers: &[Register]) -> Vec<u8> {
    registers.iter().flat_map(|r| r.to_be_bytes()).collect()
}

pub fn bytes_to_registers(data: &[u8]) -> Result<Vec<Register>, ModbusError> {
    if data.len() % 2 != 0 {
        return Err(ModbusError::InvalidLength(data.len()));
    }
    Ok(data
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_float_encoding() {
        assert_eq!(float_to_registers(42.0), (0x4228, 0x0000));
        assert_eq!(registers_to_float(0x4228, 0x0000), 42.0);
        assert_eq!(float_to_registers(-1.5), (0xBFC0, 0x0000));
        assert_eq!(registers_to_float(0x3F80, 0x0000), 1.0);
    }

    #[test]
    fn test_float_bits_survive_round_trip() {
        for value in [0.0f32, -0.0, 1.0e-38, 3.402_823_5e38, f32::MIN_POSITIVE, 99.987_65, f32::INFINITY] {
            let (hi, lo) = float_to_registers(value);
            assert_eq!(registers_to_float(hi, lo).to_bits(), value.to_bits());
        }
    }

    #[test]
    fn test_register_pairs_survive_round_trip() {
        for (hi, lo) in [(0x0000, 0x0001), (0x4248, 0x0000), (0xC2C8, 0x1234), (0x7F7F, 0xFFFF)] {
            let value = registers_to_float(hi, lo);
            assert!(!value.is_nan());
            assert_eq!(float_to_registers(value), (hi, lo));
        }
    }

    #[test]
    fn test_registers_to_floats_batch() {
        let regs = floats_to_registers(&[1.0, 42.0, -2.5]);
        assert_eq!(regs.len(), 6);
        assert_eq!(registers_to_floats(&regs).unwrap(), vec![1.0, 42.0, -2.5]);
        assert!(registers_to_floats(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_odd_register_count_rejected() {
        let err = registers_to_floats(&[0x4228, 0x0000, 0x3F80]).unwrap_err();
        assert!(matches!(err, ModbusError::InvalidLength(3)));
    }

    #[test]
    fn test_register_bytes_are_big_endian() {
        assert_eq!(registers_to_bytes(&[0x0064, 0xABCD]), vec![0x00, 0x64, 0xAB, 0xCD]);
        assert_eq!(bytes_to_registers(&[0x00, 0x64, 0xAB, 0xCD]).unwrap(), vec![0x0064, 0xABCD]);
        assert!(bytes_to_registers(&[0x01]).is_err());
    }
}
