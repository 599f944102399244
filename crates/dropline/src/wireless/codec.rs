//! API frame layout for packets tunnelled over the radio.
//!
//! Outgoing frames are "transmit request, 16-bit address" frames to the
//! broadcast address:
//!
//! ```text
//! 7E | len(2) | 01 | frame id | FF FF | options | packet | checksum
//! ```
//!
//! Incoming frames are one of two "receive packet" variants, differing only
//! in the size of the source address in front of the packet:
//!
//! ```text
//! 80: 7E | len(2) | 80 | src(8) | rssi | options | packet | checksum
//! 81: 7E | len(2) | 81 | src(2) | rssi | options | packet | checksum
//! ```
//!
//! Escaping and the frame checksum are handled by `stuff_acc`; offsets in
//! this module are into the unescaped frame, delimiter included.

use stuff_acc::{max_encoded_len, HEADER_LEN as FRAME_HEADER_LEN};

use crate::{
    checksum,
    packet::{self, PacketError, BUFFER_SIZE, LEN},
};

/// API identifiers.
pub mod api {
    /// Transmit request, 16-bit destination.
    pub const TX_16: u8 = 0x01;
    /// Received packet, 64-bit source.
    pub const RX_64: u8 = 0x80;
    /// Received packet, 16-bit source.
    pub const RX_16: u8 = 0x81;
}

/// Offset of the API identifier.
pub const API_ID: usize = FRAME_HEADER_LEN;

/// API id, frame id, destination and options in front of the packet.
pub const TX_FIELDS_LEN: usize = 5;
const TX_PACKET: usize = FRAME_HEADER_LEN + TX_FIELDS_LEN;

/// Largest unescaped transmit frame.
pub const TX_FRAME_MAX: usize = TX_PACKET + BUFFER_SIZE + 1;

/// Staging size for escaped frames in either direction.
pub const FRAME_BUFFER_SIZE: usize = 64;

const _: () = assert!(max_encoded_len(TX_FRAME_MAX) <= FRAME_BUFFER_SIZE);

/// Default first byte on the wire for outgoing frames.
///
/// Radio modules resynchronise on any leading byte before a `7E` they have
/// not seen, and accept `FE` in the delimiter slot; existing nodes send it.
pub const DEFAULT_START_SENTINEL: u8 = 0xFE;

/// Source address size of a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum Addressing {
    /// 64-bit source address, API id `0x80`.
    Long,
    /// 16-bit source address, API id `0x81`.
    Short,
}

impl Addressing {
    pub const fn from_api_id(id: u8) -> Option<Self> {
        match id {
            api::RX_64 => Some(Self::Long),
            api::RX_16 => Some(Self::Short),
            _ => None,
        }
    }

    pub const fn api_id(self) -> u8 {
        match self {
            Self::Long => api::RX_64,
            Self::Short => api::RX_16,
        }
    }

    const fn address_len(self) -> usize {
        match self {
            Self::Long => 8,
            Self::Short => 2,
        }
    }

    pub const fn rssi_offset(self) -> usize {
        API_ID + 1 + self.address_len()
    }

    /// Offset of the embedded packet, past the rssi and options bytes.
    pub const fn packet_offset(self) -> usize {
        self.rssi_offset() + 2
    }
}

/// A packet found in a received frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Inbound<'a> {
    pub addressing: Addressing,
    /// Exactly as many bytes as the packet's length byte says.
    pub packet: &'a [u8],
    pub rssi: u8,
}

/// Find the packet in a verified, unescaped receive frame.
///
/// `frame` runs from the delimiter through the checksum, as handed out by
/// [`stuff_acc::Accumulator`]. Frames of other API types, and packets whose
/// length byte is impossible or runs past the frame, give `None`.
pub fn parse_rx_frame(frame: &[u8]) -> Option<Inbound<'_>> {
    let addressing = Addressing::from_api_id(*frame.get(API_ID)?)?;
    // Everything between the header and the checksum
    let body = frame.get(..frame.len().checked_sub(1)?)?;
    let start = addressing.packet_offset();
    let declared = *body.get(start + LEN)? as usize;
    if !packet::is_valid_len(declared) {
        return None;
    }
    let packet = body.get(start..start + declared)?;
    Some(Inbound {
        addressing,
        packet,
        rssi: body[addressing.rssi_offset()],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[non_exhaustive]
pub enum EncodeError {
    Packet(PacketError),
    /// The output buffer cannot hold the escaped frame.
    NoSpace,
}

impl From<PacketError> for EncodeError {
    fn from(e: PacketError) -> Self {
        EncodeError::Packet(e)
    }
}

/// Wrap a packet into an escaped transmit frame, returning the bytes used.
///
/// The packet's CRC is stamped on the way, so callers may leave the trailer
/// empty. `start` is written in the delimiter slot.
pub fn encode_tx_frame(pkt: &[u8], start: u8, out: &mut [u8]) -> Result<usize, EncodeError> {
    let len = packet::declared_len(pkt);
    if !packet::is_valid_len(len) {
        return Err(PacketError::BadLength.into());
    }
    if pkt.len() < len {
        return Err(PacketError::Truncated.into());
    }

    let mut raw = [0u8; TX_FRAME_MAX];
    let data_len = (TX_FIELDS_LEN + len) as u16;
    raw[0] = stuff_acc::START;
    raw[1..3].copy_from_slice(&data_len.to_be_bytes());
    raw[API_ID] = api::TX_16;
    // frame id 0: no transmit status wanted
    raw[4] = 0;
    raw[5..7].copy_from_slice(&[0xFF, 0xFF]);
    // options
    raw[7] = 0;
    let end = TX_PACKET + len;
    raw[TX_PACKET..end].copy_from_slice(&pkt[..len]);
    checksum::stamp_crc(&mut raw[TX_PACKET..end])?;
    raw[end] = checksum::additive_checksum(&raw[API_ID..end]);

    let used = stuff_acc::encode(&raw[..end + 1], out).map_err(|_| EncodeError::NoSpace)?;
    out[0] = start;
    Ok(used)
}

#[cfg(test)]
mod test {
    use stuff_acc::{Accumulator, FeedResult};

    use super::*;
    use crate::packet::Packet;

    fn decode(wire: &[u8]) -> Vec<u8> {
        let mut acc = Accumulator::new([0u8; FRAME_BUFFER_SIZE]);
        let mut frames = vec![];
        for &b in wire {
            if let FeedResult::Success(f) = acc.feed(b) {
                frames.push(f.to_vec());
            }
        }
        assert_eq!(frames.len(), 1);
        frames.remove(0)
    }

    #[test]
    fn offsets() {
        assert_eq!(Addressing::Long.rssi_offset(), 12);
        assert_eq!(Addressing::Long.packet_offset(), 14);
        assert_eq!(Addressing::Short.rssi_offset(), 6);
        assert_eq!(Addressing::Short.packet_offset(), 8);
        assert_eq!(Addressing::from_api_id(0x81), Some(Addressing::Short));
        assert_eq!(Addressing::from_api_id(api::TX_16), None);
    }

    #[test]
    fn tx_frame_layout() {
        let pkt = Packet::new(0xFF, 0x03, b'A', &[0x10, 0x20]).unwrap();
        let mut out = [0u8; FRAME_BUFFER_SIZE];
        let used = encode_tx_frame(pkt.as_bytes(), stuff_acc::START, &mut out).unwrap();
        let raw = decode(&out[..used]);

        assert_eq!(&raw[..8], &[0x7E, 0x00, 13, 0x01, 0x00, 0xFF, 0xFF, 0x00]);
        assert_eq!(&raw[8..16], pkt.as_bytes());
        assert_eq!(raw.len(), 17);
        assert!(checksum::additive_checksum_ok(&raw[3..]));
    }

    #[test]
    fn crc_is_stamped() {
        // Trailer left blank by the caller
        let blank = [0x10, 0x03, 7, b'B', 0x7E, 0, 0];
        let mut out = [0u8; FRAME_BUFFER_SIZE];
        let used = encode_tx_frame(&blank, stuff_acc::START, &mut out).unwrap();
        let raw = decode(&out[..used]);
        assert!(checksum::crc_is_valid(&raw[8..15]));
        assert_eq!(&raw[8..13], &blank[..5]);
    }

    #[test]
    fn sentinel_and_escapes() {
        let pkt = Packet::new(0x7D, 0x11, 0x13, &[0x7E]).unwrap();
        let mut out = [0u8; FRAME_BUFFER_SIZE];
        let used = encode_tx_frame(pkt.as_bytes(), DEFAULT_START_SENTINEL, &mut out).unwrap();
        let wire = &out[..used];
        assert_eq!(wire[0], 0xFE);
        assert!(wire[1..].iter().all(|b| *b != 0x7E && *b != 0x11 && *b != 0x13));
        assert!(wire.windows(2).any(|w| w == [0x7D, 0x7D ^ 0x20]));
    }

    #[test]
    fn rejects_bad_packets() {
        let mut out = [0u8; FRAME_BUFFER_SIZE];
        assert_eq!(
            encode_tx_frame(&[1, 2, 3, 4, 5], 0x7E, &mut out),
            Err(EncodeError::Packet(PacketError::BadLength))
        );
        assert_eq!(
            encode_tx_frame(&[1, 2, 9, 4, 5, 6], 0x7E, &mut out),
            Err(EncodeError::Packet(PacketError::Truncated))
        );
        let pkt = Packet::new(1, 2, 3, &[0; 10]).unwrap();
        let mut tiny = [0u8; 8];
        assert_eq!(
            encode_tx_frame(pkt.as_bytes(), 0x7E, &mut tiny),
            Err(EncodeError::NoSpace)
        );
    }

    #[test]
    fn reserved_bytes_anywhere_survive() {
        let reserved = [0x7E, 0x7D, 0x11, 0x13];
        let mut payloads: Vec<Vec<u8>> = vec![];
        for &r in &reserved {
            for pos in 0..6 {
                let mut p = vec![0x42; 6];
                p[pos] = r;
                payloads.push(p);
            }
            for &r2 in &reserved {
                payloads.push(vec![r, r2]);
            }
        }
        payloads.push(reserved.repeat(3));

        for payload in payloads {
            let pkt = Packet::new(0x7E, 0x7D, 0x11, &payload).unwrap();
            let mut out = [0u8; FRAME_BUFFER_SIZE];
            let used = encode_tx_frame(pkt.as_bytes(), stuff_acc::START, &mut out).unwrap();
            let raw = decode(&out[..used]);
            assert_eq!(&raw[TX_PACKET..raw.len() - 1], pkt.as_bytes(), "{payload:02X?}");
        }
    }

    #[test]
    fn any_changed_byte_fails_the_checksum() {
        let pkt = Packet::new(0xFF, 0x03, b'A', &[1, 2, 3]).unwrap();
        let mut out = [0u8; FRAME_BUFFER_SIZE];
        let used = encode_tx_frame(pkt.as_bytes(), stuff_acc::START, &mut out).unwrap();
        let raw = decode(&out[..used]);

        for i in API_ID..raw.len() {
            let mut bad = raw.clone();
            bad[i] ^= 0x04;
            let mut wire = vec![0u8; max_encoded_len(bad.len())];
            let n = stuff_acc::encode(&bad, &mut wire).unwrap();

            let mut acc = Accumulator::new([0u8; FRAME_BUFFER_SIZE]);
            let results: Vec<bool> = wire[..n]
                .iter()
                .map(|b| matches!(acc.feed(*b), FeedResult::ChecksumError))
                .collect();
            assert_eq!(results.last(), Some(&true), "byte {i}");
        }
    }

    fn rx_frame(addressing: Addressing, rssi: u8, pkt: &[u8]) -> Vec<u8> {
        let mut data = vec![addressing.api_id()];
        data.extend(core::iter::repeat(0xA0).take(addressing.address_len()));
        data.push(rssi);
        data.push(0x00);
        data.extend_from_slice(pkt);
        let len = (data.len() as u16).to_be_bytes();
        let mut frame = vec![0x7E, len[0], len[1]];
        frame.extend_from_slice(&data);
        frame.push(checksum::additive_checksum(&data));
        frame
    }

    #[test]
    fn parses_both_variants() {
        let pkt = Packet::new(0xFF, 0x42, b'S', &[1, 2, 3, 4]).unwrap();
        for addressing in [Addressing::Long, Addressing::Short] {
            let frame = rx_frame(addressing, 0x28, pkt.as_bytes());
            let got = parse_rx_frame(&frame).unwrap();
            assert_eq!(got.addressing, addressing);
            assert_eq!(got.rssi, 0x28);
            assert_eq!(got.packet, pkt.as_bytes());
        }
    }

    #[test]
    fn ignores_unusable_frames() {
        let pkt = Packet::new(0xFF, 0x42, b'S', &[]).unwrap();

        let mut other = rx_frame(Addressing::Short, 0, pkt.as_bytes());
        other[API_ID] = 0x8A;
        assert_eq!(parse_rx_frame(&other), None);

        // Length byte promises more than the frame carries
        let mut long = rx_frame(Addressing::Short, 0, pkt.as_bytes());
        long[Addressing::Short.packet_offset() + LEN] = 12;
        assert_eq!(parse_rx_frame(&long), None);

        let mut short = rx_frame(Addressing::Short, 0, pkt.as_bytes());
        short[Addressing::Short.packet_offset() + LEN] = 2;
        assert_eq!(parse_rx_frame(&short), None);

        assert_eq!(parse_rx_frame(&[0x7E, 0, 1]), None);
        assert_eq!(parse_rx_frame(&[]), None);
    }
}
