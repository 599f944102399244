//! The packet shared by both transports.
//!
//! ```text
//! [0] dest | [1] src | [2] len | [3] type | payload.. | crc lo | crc hi
//! ```
//!
//! `len` counts every byte, header and CRC trailer included.

use crate::checksum;

/// Capacity of every packet buffer and queue slot.
pub const BUFFER_SIZE: usize = 20;

pub const DEST: usize = 0;
pub const SRC: usize = 1;
pub const LEN: usize = 2;
pub const TYPE: usize = 3;

pub const HEADER_LEN: usize = 4;
pub const CRC_LEN: usize = 2;
/// Header plus CRC, the smallest packet that means anything.
pub const MIN_LEN: usize = HEADER_LEN + CRC_LEN;
pub const MAX_PAYLOAD: usize = BUFFER_SIZE - MIN_LEN;

pub const BROADCAST: u8 = 0xFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[non_exhaustive]
pub enum PacketError {
    /// The payload does not fit in a [`BUFFER_SIZE`] packet.
    TooLong,
    /// The length byte is outside `MIN_LEN..=BUFFER_SIZE`.
    BadLength,
    /// Fewer bytes than the length byte promises.
    Truncated,
}

/// The length byte of a raw packet, or 0 if it does not even have one.
#[inline]
pub fn declared_len(pkt: &[u8]) -> usize {
    pkt.get(LEN).copied().unwrap_or(0) as usize
}

#[inline]
pub const fn is_valid_len(len: usize) -> bool {
    len >= MIN_LEN && len <= BUFFER_SIZE
}

/// An owned packet, always with a valid length byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Packet {
    buf: [u8; BUFFER_SIZE],
}

impl Packet {
    /// Build a packet and stamp its CRC.
    pub fn new(dest: u8, src: u8, kind: u8, payload: &[u8]) -> Result<Self, PacketError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(PacketError::TooLong);
        }
        let len = MIN_LEN + payload.len();
        let mut buf = [0u8; BUFFER_SIZE];
        buf[DEST] = dest;
        buf[SRC] = src;
        buf[LEN] = len as u8;
        buf[TYPE] = kind;
        buf[HEADER_LEN..][..payload.len()].copy_from_slice(payload);
        checksum::stamp_crc(&mut buf)?;
        Ok(Self { buf })
    }

    /// Copy a raw packet, as popped from a queue. The CRC is not checked,
    /// see [`Packet::crc_ok`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PacketError> {
        let len = declared_len(bytes);
        if !is_valid_len(len) {
            return Err(PacketError::BadLength);
        }
        if bytes.len() < len {
            return Err(PacketError::Truncated);
        }
        let mut buf = [0u8; BUFFER_SIZE];
        buf[..len].copy_from_slice(&bytes[..len]);
        Ok(Self { buf })
    }

    pub fn dest(&self) -> u8 {
        self.buf[DEST]
    }

    pub fn src(&self) -> u8 {
        self.buf[SRC]
    }

    pub fn len(&self) -> usize {
        self.buf[LEN] as usize
    }

    /// The type tag in byte 3.
    pub fn kind(&self) -> u8 {
        self.buf[TYPE]
    }

    pub fn payload(&self) -> &[u8] {
        &self.buf[HEADER_LEN..self.len() - CRC_LEN]
    }

    pub fn is_broadcast(&self) -> bool {
        self.dest() == BROADCAST
    }

    /// The packet bytes, exactly `len()` of them.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len()]
    }

    pub fn crc_ok(&self) -> bool {
        checksum::crc_is_valid(&self.buf)
    }

    /// Should a node at `addr` act on this packet?
    ///
    /// Its own transmissions echo back on a half-duplex line, so packets
    /// from `addr` are refused, as are unicasts for other nodes and
    /// anything with a bad CRC.
    pub fn accepts(&self, addr: u8) -> bool {
        self.src() != addr && (self.is_broadcast() || self.dest() == addr) && self.crc_ok()
    }
}

impl AsRef<[u8]> for Packet {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}
