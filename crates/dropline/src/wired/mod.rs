//! The wired transport
//!
//! A [`WiredBus`] owns a receive queue, a transmit queue and the state the
//! interrupt handlers and the transmit loop share. The platform wires it up
//! like this:
//!
//! * UART receive interrupt: [`WiredBus::on_rx_byte`]
//! * UART "data register empty" interrupt: [`WiredBus::on_tx_ready`], and
//!   on [`TxStep::Final`] switch to the transmit complete interrupt
//! * UART transmit complete interrupt: [`WiredBus::on_tx_complete`]
//! * main loop: [`WiredBus::transmit`] while the transmit queue is not empty

use embedded_hal::delay::DelayNs;
use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::{
    checksum,
    hal::BusLine,
    logging::{debug, trace, warn},
    packet::{self, BUFFER_SIZE, SRC},
    queue::PacketQueue,
    sender::{ByteSender, TxStep},
    ConfigError, TransmitStatus,
};

pub mod arbitration;
pub mod framer;

pub use arbitration::{ArbitrationTiming, Contention, WiredConfig};

use arbitration::Arbiter;
use framer::{FrameEvent, Framer};

/// What the receiver has seen since the last transmit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum Activity {
    Idle,
    /// Bytes arrived and the packet they belong to has not completed.
    Receiving,
}

struct WiredState {
    framer: Framer,
    sender: ByteSender<BUFFER_SIZE>,
    arbiter: Arbiter,
    activity: Activity,
    /// Any byte since the settle window opened, completed packets included.
    rx_seen: bool,
    timing: ArbitrationTiming,
}

impl WiredState {
    const fn new(config: WiredConfig) -> Self {
        Self {
            framer: Framer::new(),
            sender: ByteSender::new(),
            arbiter: Arbiter::new(config.priority),
            activity: Activity::Idle,
            rx_seen: false,
            timing: config.timing,
        }
    }
}

/// One node's attachment to the wired bus, with `RX` and `TX` queue slots.
pub struct WiredBus<R: ScopedRawMutex, const RX: usize, const TX: usize> {
    rx: PacketQueue<R, RX>,
    tx: PacketQueue<R, TX>,
    state: BlockingMutex<R, WiredState>,
}

impl<R: ScopedRawMutex + ConstInit, const RX: usize, const TX: usize> WiredBus<R, RX, TX> {
    /// Create a bus handle with [`WiredConfig::DEFAULT`].
    ///
    /// ```rust
    /// use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
    /// use dropline::WiredBus;
    ///
    /// static BUS: WiredBus<CSRMutex, 4, 4> = WiredBus::new();
    /// assert!(BUS.is_bus_idle());
    /// ```
    pub const fn new() -> Self {
        Self::with_config(WiredConfig::DEFAULT)
    }

    /// Create a bus handle. An out of range priority falls back to the
    /// default class, use [`WiredBus::set_priority`] to have it checked.
    pub const fn with_config(config: WiredConfig) -> Self {
        Self {
            rx: PacketQueue::new(),
            tx: PacketQueue::new(),
            state: BlockingMutex::new(WiredState::new(config)),
        }
    }
}

impl<R: ScopedRawMutex + ConstInit, const RX: usize, const TX: usize> Default
    for WiredBus<R, RX, TX>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ScopedRawMutex, const RX: usize, const TX: usize> WiredBus<R, RX, TX> {
    /// Packets received from the line, for the application to pop.
    pub fn rx_queue(&self) -> &PacketQueue<R, RX> {
        &self.rx
    }

    /// Packets waiting for [`WiredBus::transmit`].
    pub fn tx_queue(&self) -> &PacketQueue<R, TX> {
        &self.tx
    }

    pub fn set_priority(&self, priority: u8) -> Result<(), ConfigError> {
        self.state.with_lock(|st| st.arbiter.set_priority(priority))
    }

    pub fn priority(&self) -> u8 {
        self.state.with_lock(|st| st.arbiter.priority())
    }

    pub fn loneliness(&self) -> u8 {
        self.state.with_lock(|st| st.arbiter.loneliness())
    }

    pub fn timing(&self) -> ArbitrationTiming {
        self.state.with_lock(|st| st.timing)
    }

    pub fn set_timing(&self, timing: ArbitrationTiming) {
        self.state.with_lock(|st| st.timing = timing);
    }

    /// Has nothing been received since the last transmit attempt started,
    /// or since the last completed packet?
    pub fn is_bus_idle(&self) -> bool {
        self.state.with_lock(|st| st.activity == Activity::Idle)
    }

    /// Is a packet being shifted out?
    pub fn is_transmitting(&self) -> bool {
        self.state.with_lock(|st| st.sender.is_active())
    }

    /// Receive interrupt handler.
    ///
    /// `line_error` is the UART's framing or overrun flag for this byte.
    /// Completed packets go to the receive queue, and are dropped with a
    /// warning if it is full.
    pub fn on_rx_byte(&self, byte: u8, line_error: bool) {
        let mut done = [0u8; BUFFER_SIZE];
        let len = self.state.with_lock(|st| {
            st.activity = Activity::Receiving;
            st.rx_seen = true;
            match st.framer.feed(byte, line_error) {
                FrameEvent::Pending => None,
                FrameEvent::Dropped => {
                    trace!("wired rx: partial packet dropped");
                    None
                }
                FrameEvent::Complete(pkt) => {
                    done[..pkt.len()].copy_from_slice(pkt);
                    st.activity = Activity::Idle;
                    Some(pkt.len())
                }
            }
        });

        if let Some(len) = len {
            if self.rx.push(&done[..len], 0).is_err() {
                warn!("wired rx: queue full, dropping packet");
            }
        }
    }

    /// Transmit interrupt handler: the next byte to write, if any.
    pub fn on_tx_ready(&self) -> TxStep {
        self.state.with_lock(|st| st.sender.next_step())
    }

    /// Transmit complete interrupt handler.
    pub fn on_tx_complete<L: BusLine>(&self, line: &mut L) {
        self.state.with_lock(|st| {
            st.sender.finish();
            st.arbiter.transmitted();
        });
        line.end_transmit();
    }

    /// Try to get the oldest queued packet onto the line.
    ///
    /// Returns [`TransmitStatus::Busy`] when the line was taken or
    /// arbitration was lost; the packet stays queued and the caller should
    /// simply try again later. This blocks for the settle and probe windows,
    /// a few milliseconds at most. Interrupts are masked for the address
    /// arbitration itself.
    pub fn transmit<L: BusLine, D: DelayNs>(&self, line: &mut L, delay: &mut D) -> TransmitStatus {
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
        if let Err(e) = checksum::stamp_crc(&mut pkt) {
            debug!("wired tx: discarding malformed packet: {:?}", e);
            let _ = self.tx.discard();
            return TransmitStatus::Discarded;
        }
        let len = packet::declared_len(&pkt);
        let src = pkt[SRC];

        // Settle: anything heard in this window means the line is in use
        let timing = self.state.with_lock(|st| {
            st.activity = Activity::Idle;
            st.rx_seen = false;
            st.timing
        });
        line.service_watchdog();
        delay.delay_us(timing.settle_us);
        if self.state.with_lock(|st| st.rx_seen) {
            return self.back_off("activity while settling");
        }

        line.enter_arbitration();
        let wait = self.state.with_lock(|st| {
            st.framer.reset();
            st.arbiter.wait_probes(timing.wait_unit, src)
        });

        let quiet = arbitration::line_quiet(line, delay, timing.idle_probes, timing.probe_us)
            && arbitration::line_quiet(line, delay, wait, timing.probe_us);
        if !quiet {
            line.release();
            return self.back_off("line driven while probing");
        }

        let outcome = self.state.with_lock(|st| {
            let outcome = arbitration::contend(line, delay, &timing, src);
            if outcome == Contention::Won {
                st.sender.load(&pkt[..len]);
                line.begin_transmit();
            }
            outcome
        });

        match outcome {
            Contention::Won => {
                let _ = self.tx.discard();
                trace!("wired tx: won arbitration, sending {} bytes", len);
                TransmitStatus::Sent
            }
            Contention::Lost => self.back_off("lost arbitration"),
        }
    }

    fn back_off(&self, why: &'static str) -> TransmitStatus {
        let loneliness = self.state.with_lock(|st| {
            st.arbiter.back_off();
            st.arbiter.loneliness()
        });
        trace!("wired tx: backing off, {}, loneliness {}", why, loneliness);
        TransmitStatus::Busy
    }
}
