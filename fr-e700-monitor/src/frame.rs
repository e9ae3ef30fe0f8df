//! Modbus RTU request framing.
//!
//! The transport itself is handled by `tokio-modbus`; this module renders the
//! exact ADU that goes on the wire so it can be logged and checked.

use crate::config::RegisterReadRequest;

/// Function code for Read Holding Registers.
pub const READ_HOLDING_REGISTERS: u8 = 0x03;

const fn build_crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if (crc & 0x0001) != 0 {
                crc = (crc >> 1) ^ 0xA001;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const CRC16_TABLE: [u16; 256] = build_crc16_table();

/// Modbus CRC-16 over `data`.
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc = 0xFFFFu16;
    for byte in data {
        let idx = ((crc ^ (*byte as u16)) & 0x00FF) as usize;
        crc = (crc >> 8) ^ CRC16_TABLE[idx];
    }
    crc
}

impl RegisterReadRequest {
    /// Protocol data unit: function code, start address, quantity.
    pub fn pdu(&self) -> [u8; 5] {
        let [addr_hi, addr_lo] = self.address.to_be_bytes();
        let [count_hi, count_lo] = self.count.to_be_bytes();
        [READ_HOLDING_REGISTERS, addr_hi, addr_lo, count_hi, count_lo]
    }

    /// Full RTU frame: unit id, PDU, CRC (low byte first).
    pub fn to_rtu_frame(&self) -> Vec<u8> {
        rtu_adu(self.unit_id, &self.pdu())
    }
}

/// Wrap a PDU into an RTU ADU: unit id, PDU, CRC (low byte first).
pub fn rtu_adu(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(pdu.len() + 3);
    frame.push(unit_id);
    frame.extend_from_slice(pdu);
    let crc = crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

/// Space separated upper-case hex dump.
pub fn hex(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
