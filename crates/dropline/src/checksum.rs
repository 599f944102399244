//! Checksums used on the two transports.
//!
//! Wired packets carry a CRC-16 trailer, computed a nibble at a time over
//! everything before it. The radio tunnel adds its own 8-bit additive
//! checksum around the whole API frame; that one lives in `stuff_acc` and is
//! re-exported here.

use crate::packet::{self, PacketError, CRC_LEN};

pub use stuff_acc::{checksum as additive_checksum, checksum_ok as additive_checksum_ok};

/// One entry per nibble value, each the polynomial product for that nibble.
const CRC16_TABLE: [u16; 16] = [
    0x0000, 0xA001, 0xE003, 0x4002, 0x6007, 0xC006, 0x8004, 0x2005, //
    0xC00E, 0x600F, 0x200D, 0x800C, 0xA009, 0x0008, 0x400A, 0xE00B,
];

/// Fold one byte into a running CRC, high nibble first.
#[inline]
pub const fn crc16_update(crc: u16, byte: u8) -> u16 {
    let hi = ((crc >> 12) as u8 ^ (byte >> 4)) as usize;
    let crc = (crc << 4) ^ CRC16_TABLE[hi];
    let lo = ((crc >> 12) as u8 ^ (byte & 0x0F)) as usize;
    (crc << 4) ^ CRC16_TABLE[lo]
}

/// CRC over an arbitrary byte run, seeded with zero.
pub fn crc16_over(data: &[u8]) -> u16 {
    data.iter().fold(0, |crc, b| crc16_update(crc, *b))
}

/// The span of `pkt` that is covered by the CRC, honouring its length byte.
fn covered(pkt: &[u8]) -> Result<usize, PacketError> {
    let len = packet::declared_len(pkt);
    if !packet::is_valid_len(len) {
        return Err(PacketError::BadLength);
    }
    if pkt.len() < len {
        return Err(PacketError::Truncated);
    }
    Ok(len - CRC_LEN)
}

/// CRC of a packet: every byte before the two trailer bytes.
pub fn crc16(pkt: &[u8]) -> Result<u16, PacketError> {
    let end = covered(pkt)?;
    Ok(crc16_over(&pkt[..end]))
}

/// Compute the CRC and write it into the trailer, low byte first.
pub fn stamp_crc(pkt: &mut [u8]) -> Result<(), PacketError> {
    let end = covered(pkt)?;
    let [lo, hi] = crc16_over(&pkt[..end]).to_le_bytes();
    pkt[end] = lo;
    pkt[end + 1] = hi;
    Ok(())
}

/// Does the trailer match the contents? Packets with an impossible length
/// are never valid.
pub fn crc_is_valid(pkt: &[u8]) -> bool {
    match covered(pkt) {
        Ok(end) => crc16_over(&pkt[..end]).to_le_bytes() == [pkt[end], pkt[end + 1]],
        Err(_) => false,
    }
}
