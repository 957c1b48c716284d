/// CRC-16/MODBUS: init 0xFFFF, reflected polynomial 0xA001, no final XOR.
///
/// Computed over every byte preceding the checksum field. On the wire the
/// result is appended low byte first.
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Append the checksum of `frame` to itself, low byte first.
pub fn append_crc(frame: &mut Vec<u8>) {
    let crc = crc16_modbus(frame);
    frame.extend_from_slice(&crc.to_le_bytes());
}

/// True when the last two bytes of `frame` are the little-endian CRC of
/// everything before them.
pub fn has_valid_crc(frame: &[u8]) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    crc16_modbus(&frame[..data_len]) == received
}
