/// CCITT CRC-16 as used by P25 TSBK and PDU header blocks (x^16 + x^12 + x^5 + 1).
/// Running it over a block including its trailing CRC yields zero for an intact block.
pub fn crc16(data: &[u8]) -> u16 {
    const POLY: u32 = (1 << 12) | (1 << 5) | 1;
    let mut crc: u32 = 0;
    for byte in data {
        for j in 0..8 {
            let bit = ((*byte >> (7 - j)) & 1) as u32;
            crc = ((crc << 1) | bit) & 0x1ffff;
            if crc & 0x10000 != 0 {
                crc = (crc & 0xffff) ^ POLY;
            }
        }
    }
    (crc ^ 0xffff) as u16
}
