//! Byte-at-a-time transmit staging, driven from "ready for next byte"
//! interrupts.

/// What the transmit interrupt should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum TxStep {
    /// Write this byte, more will follow.
    Byte(u8),
    /// Write this byte, it is the last one.
    Final(u8),
    /// Nothing staged.
    Idle,
}

/// A staged frame and a cursor into it.
pub struct ByteSender<const SIZE: usize> {
    buf: [u8; SIZE],
    idx: usize,
    len: usize,
    active: bool,
}

impl<const SIZE: usize> ByteSender<SIZE> {
    pub const fn new() -> Self {
        Self {
            buf: [0; SIZE],
            idx: 0,
            len: 0,
            active: false,
        }
    }

    /// Stage `data`, cut to `SIZE` bytes. Any previous frame is forgotten.
    pub fn load(&mut self, data: &[u8]) {
        let len = data.len().min(SIZE);
        self.buf[..len].copy_from_slice(&data[..len]);
        self.len = len;
        self.idx = 0;
        self.active = len > 0;
    }

    /// Is a frame staged or still on its way out?
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Bytes not yet handed out.
    pub fn remaining(&self) -> usize {
        self.len - self.idx
    }

    pub fn next_step(&mut self) -> TxStep {
        if self.idx >= self.len {
            return TxStep::Idle;
        }
        let byte = self.buf[self.idx];
        self.idx += 1;
        if self.idx >= self.len {
            TxStep::Final(byte)
        } else {
            TxStep::Byte(byte)
        }
    }

    /// The frame has fully left the hardware.
    pub fn finish(&mut self) {
        self.idx = 0;
        self.len = 0;
        self.active = false;
    }
}

impl<const SIZE: usize> Default for ByteSender<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}
