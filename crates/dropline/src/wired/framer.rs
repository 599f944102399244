//! Receive framing for the wired bus.
//!
//! The wired line has no delimiters. A packet is simply the bytes received
//! since the last line error, complete once its own length byte is
//! satisfied. Senders always precede a packet with a bit-banged arbitration
//! sequence, which the receiving UART sees as framing errors, so a line
//! error is also the resynchronisation point.

use crate::packet::{BUFFER_SIZE, LEN, MIN_LEN};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum FramerState {
    Idle,
    Accumulating,
    /// Overflowed, ignoring bytes until the next resynchronisation.
    Discarding,
}

/// Outcome of feeding one byte to a [`Framer`].
#[derive(Debug, PartialEq, Eq)]
pub enum FrameEvent<'a> {
    Pending,
    /// A packet of exactly its declared length.
    Complete(&'a [u8]),
    /// A partial packet was thrown away.
    Dropped,
}

pub struct Framer {
    buf: [u8; BUFFER_SIZE],
    idx: usize,
    state: FramerState,
}

impl Framer {
    pub const fn new() -> Self {
        Self {
            buf: [0; BUFFER_SIZE],
            idx: 0,
            state: FramerState::Idle,
        }
    }

    pub fn state(&self) -> FramerState {
        self.state
    }

    /// Forget any partial packet.
    pub fn reset(&mut self) {
        self.idx = 0;
        self.state = FramerState::Idle;
    }

    /// Feed one byte as read from the UART, along with whether the UART
    /// flagged a framing or overrun error for it.
    pub fn feed(&mut self, byte: u8, line_error: bool) -> FrameEvent<'_> {
        if line_error {
            let dropped = self.state != FramerState::Idle;
            self.reset();
            return if dropped {
                FrameEvent::Dropped
            } else {
                FrameEvent::Pending
            };
        }

        if self.state == FramerState::Discarding {
            return FrameEvent::Pending;
        }

        self.buf[self.idx] = byte;
        self.idx += 1;
        self.state = FramerState::Accumulating;

        if self.idx >= MIN_LEN && self.idx == self.buf[LEN] as usize {
            let len = self.idx;
            self.reset();
            return FrameEvent::Complete(&self.buf[..len]);
        }

        if self.idx >= BUFFER_SIZE {
            self.idx = 0;
            self.state = FramerState::Discarding;
            return FrameEvent::Dropped;
        }

        FrameEvent::Pending
    }
}

impl Default for Framer {
    fn default() -> Self {
        Self::new()
    }
}
