//! The packet ring buffer
//!
//! A [`PacketQueue`] is a fixed-capacity FIFO of packet slots, shared
//! between an interrupt handler and the main loop. One side only pushes and
//! the other only pops, and every access to the head, tail and full flag
//! happens with the [`BlockingMutex`] held. With a
//! `CriticalSectionRawMutex` that means with interrupts masked, so the two
//! sides never see each other half way through an update.
//!
//! Queues are intended to live in `static`s:
//!
//! ```rust
//! use mutex::raw_impls::cs::CriticalSectionRawMutex as CSRMutex;
//! use dropline::queue::PacketQueue;
//!
//! static RX: PacketQueue<CSRMutex, 4> = PacketQueue::new();
//!
//! RX.push(&[0xFF, 0x03, 6, b'A', 0x12, 0x34], 0).unwrap();
//! let mut buf = [0u8; 20];
//! let got = RX.pop(&mut buf).unwrap();
//! assert_eq!(got.len, 6);
//! assert!(RX.is_empty());
//! ```

use mutex::{BlockingMutex, ConstInit, ScopedRawMutex};

use crate::packet::{BUFFER_SIZE, LEN};

/// One queue entry: a packet buffer and the signal strength it arrived with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketSlot {
    pub pkt: [u8; BUFFER_SIZE],
    /// Zero for packets that did not come in over the radio.
    pub rssi: u8,
}

impl PacketSlot {
    pub const EMPTY: Self = Self {
        pkt: [0; BUFFER_SIZE],
        rssi: 0,
    };
}

/// What [`PacketQueue::pop`] and [`PacketQueue::peek`] copied out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub struct Popped {
    /// Bytes written to the caller's buffer.
    pub len: usize,
    pub rssi: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[non_exhaustive]
pub enum QueueError {
    Full,
    Empty,
}

struct Ring<const N: usize> {
    slots: [PacketSlot; N],
    head: usize,
    tail: usize,
    full: bool,
}

impl<const N: usize> Ring<N> {
    const fn new() -> Self {
        assert!(N > 0, "a packet queue needs at least one slot");
        Self {
            slots: [PacketSlot::EMPTY; N],
            head: 0,
            tail: 0,
            full: false,
        }
    }

    fn next(idx: usize) -> usize {
        let idx = idx + 1;
        if idx >= N {
            0
        } else {
            idx
        }
    }

    fn depth(&self) -> usize {
        if self.full {
            N
        } else {
            (self.head + N - self.tail) % N
        }
    }

    fn is_empty(&self) -> bool {
        !self.full && self.head == self.tail
    }

    /// Copy the tail slot out, zeroing the rest of `buf`.
    fn copy_tail(&self, buf: &mut [u8]) -> Popped {
        let slot = &self.slots[self.tail];
        let len = buf
            .len()
            .min(slot.pkt[LEN] as usize)
            .min(BUFFER_SIZE);
        buf[..len].copy_from_slice(&slot.pkt[..len]);
        Popped {
            len,
            rssi: slot.rssi,
        }
    }

    fn advance_tail(&mut self) {
        self.tail = Self::next(self.tail);
        self.full = false;
    }
}

/// A fixed-capacity FIFO of `N` packets.
pub struct PacketQueue<R: ScopedRawMutex, const N: usize> {
    inner: BlockingMutex<R, Ring<N>>,
}

impl<R: ScopedRawMutex + ConstInit, const N: usize> PacketQueue<R, N> {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            inner: BlockingMutex::new(Ring::new()),
        }
    }
}

impl<R: ScopedRawMutex + ConstInit, const N: usize> Default for PacketQueue<R, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: ScopedRawMutex, const N: usize> PacketQueue<R, N> {
    /// Create an empty queue with a manually constructed mutex.
    pub const fn const_new(r: R) -> Self {
        Self {
            inner: BlockingMutex::const_new(r, Ring::new()),
        }
    }

    pub const fn capacity(&self) -> usize {
        N
    }

    /// Empty the queue and zero every slot.
    pub fn initialize(&self) {
        self.inner.with_lock(|ring| *ring = Ring::new());
    }

    /// Same as [`PacketQueue::initialize`].
    pub fn clear(&self) {
        self.initialize();
    }

    pub fn depth(&self) -> usize {
        self.inner.with_lock(|ring| ring.depth())
    }

    pub fn is_empty(&self) -> bool {
        self.inner.with_lock(|ring| ring.is_empty())
    }

    pub fn is_full(&self) -> bool {
        self.inner.with_lock(|ring| ring.full)
    }

    /// Copy `data` into the next free slot.
    ///
    /// At most [`BUFFER_SIZE`] bytes are kept, and the remainder of the slot
    /// is zeroed. A full queue is left untouched.
    pub fn push(&self, data: &[u8], rssi: u8) -> Result<(), QueueError> {
        self.inner.with_lock(|ring| {
            if ring.full {
                return Err(QueueError::Full);
            }
            let len = data.len().min(BUFFER_SIZE);
            let slot = &mut ring.slots[ring.head];
            slot.pkt = [0; BUFFER_SIZE];
            slot.pkt[..len].copy_from_slice(&data[..len]);
            slot.rssi = rssi;

            ring.head = Ring::<N>::next(ring.head);
            ring.full = ring.head == ring.tail;
            Ok(())
        })
    }

    /// Remove the oldest packet, copying it into `buf`.
    ///
    /// `buf` is zeroed first, also when the queue is empty. The copy stops at
    /// the shorter of `buf` and the packet's own length byte.
    pub fn pop(&self, buf: &mut [u8]) -> Result<Popped, QueueError> {
        buf.fill(0);
        self.inner.with_lock(|ring| {
            if ring.is_empty() {
                return Err(QueueError::Empty);
            }
            let popped = ring.copy_tail(buf);
            ring.advance_tail();
            Ok(popped)
        })
    }

    /// Like [`PacketQueue::pop`], but the packet stays queued.
    pub fn peek(&self, buf: &mut [u8]) -> Result<Popped, QueueError> {
        buf.fill(0);
        self.inner.with_lock(|ring| {
            if ring.is_empty() {
                return Err(QueueError::Empty);
            }
            Ok(ring.copy_tail(buf))
        })
    }

    /// Remove the oldest packet without looking at it.
    pub fn discard(&self) -> Result<(), QueueError> {
        self.inner.with_lock(|ring| {
            if ring.is_empty() {
                return Err(QueueError::Empty);
            }
            ring.advance_tail();
            Ok(())
        })
    }
}
