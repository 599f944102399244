//! The radio tunnel
//!
//! A [`RadioBridge`] carries bus packets through a radio module running in
//! escaped API mode. Platform wiring mirrors the wired side:
//!
//! * UART receive interrupt: [`RadioBridge::on_rx_byte`]
//! * UART "data register empty" interrupt: [`RadioBridge::on_tx_ready`]
//! * main loop: [`RadioBridge::transmit`]
//!
//! The module's clear-to-send line is honoured byte by byte, so there is no
//! need for a transmit complete interrupt.

use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};
use stuff_acc::{Accumulator, FeedResult};

use crate::{
    hal::RadioLink,
    logging::{debug, trace, warn},
    packet::{self, BUFFER_SIZE},
    queue::PacketQueue,
    sender::{ByteSender, TxStep},
    TransmitStatus,
};

pub mod codec;

pub use codec::{Addressing, EncodeError, DEFAULT_START_SENTINEL, FRAME_BUFFER_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub struct RadioConfig {
    /// Byte written in the delimiter slot of outgoing frames.
    pub start_sentinel: u8,
}

impl RadioConfig {
    pub const DEFAULT: Self = Self {
        start_sentinel: DEFAULT_START_SENTINEL,
    };
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

struct RadioState {
    acc: Accumulator<[u8; FRAME_BUFFER_SIZE]>,
    sender: ByteSender<FRAME_BUFFER_SIZE>,
    config: RadioConfig,
}

/// One node's attachment to a radio module, with `RX` and `TX` queue slots.
pub struct RadioBridge<R: ScopedRawMutex, const RX: usize, const TX: usize> {
    rx: PacketQueue<R, RX>,
    tx: PacketQueue<R, TX>,
    state: BlockingMutex<R, RadioState>,
}

impl<R: ScopedRawMutex + ConstInit, const RX: usize, const TX: usize> RadioBridge<R, RX, TX> {
    pub const fn new() -> Self {
        Self::with_config(RadioConfig::DEFAULT)
    }

    pub const fn with_config(config: RadioConfig) -> Self {
        Self {
            rx: PacketQueue::new(),
            tx: PacketQueue::new(),
            state: BlockingMutex::new(RadioState {
                acc: Accumulator::new([0; FRAME_BUFFER_SIZE]),
                sender: ByteSender::new(),
                config,
            }),
        }
    }
}

impl<R: ScopedRawMutex + ConstInit, const RX: usize, const TX: usize> Default
    for RadioBridge<R, RX, TX>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ScopedRawMutex, const RX: usize, const TX: usize> RadioBridge<R, RX, TX> {
    /// Packets received over the radio, tagged with their rssi.
    pub fn rx_queue(&self) -> &PacketQueue<R, RX> {
        &self.rx
    }

    /// Packets waiting for [`RadioBridge::transmit`].
    pub fn tx_queue(&self) -> &PacketQueue<R, TX> {
        &self.tx
    }

    pub fn config(&self) -> RadioConfig {
        self.state.with_lock(|st| st.config)
    }

    /// Wait for the module to come up, as signalled by clear-to-send.
    pub fn init<L: RadioLink>(&self, radio: &mut L) {
        self.state.with_lock(|st| {
            st.acc.reset();
            st.sender.finish();
        });
        radio.disable_tx_interrupt();
        while !radio.clear_to_send() {
            radio.service_watchdog();
        }
    }

    /// Is a frame being shifted out?
    pub fn is_transmitting(&self) -> bool {
        self.state.with_lock(|st| st.sender.is_active())
    }

    /// Receive interrupt handler.
    ///
    /// A byte flagged with a line error is dropped along with any partial
    /// frame. Packets go to the receive queue with the frame's rssi, and
    /// are dropped with a warning if it is full.
    pub fn on_rx_byte(&self, byte: u8, line_error: bool) {
        let mut found = [0u8; BUFFER_SIZE];
        let got = self.state.with_lock(|st| {
            if line_error {
                st.acc.reset();
                trace!("radio rx: line error, frame dropped");
                return None;
            }
            match st.acc.feed(byte) {
                FeedResult::Consumed => None,
                FeedResult::OverFull => {
                    debug!("radio rx: frame too large");
                    None
                }
                FeedResult::Malformed => {
                    debug!("radio rx: bad frame length");
                    None
                }
                FeedResult::ChecksumError => {
                    debug!("radio rx: frame checksum mismatch");
                    None
                }
                FeedResult::Success(frame) => match codec::parse_rx_frame(frame) {
                    Some(inbound) => {
                        let len = inbound.packet.len();
                        found[..len].copy_from_slice(inbound.packet);
                        Some((len, inbound.rssi))
                    }
                    None => {
                        trace!("radio rx: ignoring api frame without a packet");
                        None
                    }
                },
            }
        });

        if let Some((len, rssi)) = got {
            if self.rx.push(&found[..len], rssi).is_err() {
                warn!("radio rx: queue full, dropping packet");
            }
        }
    }

    /// Frame the oldest queued packet and start sending it.
    pub fn transmit<L: RadioLink>(&self, radio: &mut L) -> TransmitStatus {
        if self.tx.is_empty() {
            return TransmitStatus::Idle;
        }
        if self.is_transmitting() {
            return TransmitStatus::Busy;
        }

        let mut pkt = [0u8; BUFFER_SIZE];
        if self.tx.peek(&mut pkt).is_err() {
            return TransmitStatus::Idle;
        }
        let len = packet::declared_len(&pkt);

        let res = self.state.with_lock(|st| {
            let mut out = [0u8; FRAME_BUFFER_SIZE];
            let used = codec::encode_tx_frame(&pkt, st.config.start_sentinel, &mut out)?;
            st.sender.load(&out[..used]);
            Ok::<_, EncodeError>(used)
        });
        let _ = self.tx.discard();

        match res {
            Ok(used) => {
                trace!("radio tx: {} byte packet in a {} byte frame", len, used);
                radio.enable_tx_interrupt();
                TransmitStatus::Sent
            }
            Err(e) => {
                debug!("radio tx: discarding packet: {:?}", e);
                TransmitStatus::Discarded
            }
        }
    }

    /// Transmit interrupt handler: the next byte to write, if any.
    ///
    /// Spins until the module asserts clear-to-send. The tx interrupt is
    /// disabled once the last byte is handed out.
    pub fn on_tx_ready<L: RadioLink>(&self, radio: &mut L) -> TxStep {
        if !self.is_transmitting() {
            radio.disable_tx_interrupt();
            return TxStep::Idle;
        }
        while !radio.clear_to_send() {
            radio.service_watchdog();
        }

        let step = self.state.with_lock(|st| {
            let step = st.sender.next_step();
            if !matches!(step, TxStep::Byte(_)) {
                st.sender.finish();
            }
            step
        });
        if !matches!(step, TxStep::Byte(_)) {
            radio.disable_tx_interrupt();
        }
        step
    }
}
