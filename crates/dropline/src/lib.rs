#![doc = include_str!("../README.md")]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

pub mod checksum;
pub mod hal;
pub(crate) mod logging;
pub mod packet;
pub mod queue;
pub mod sender;
pub mod wired;
pub mod wireless;

pub use hal::{BusLine, RadioLink};
pub use packet::{Packet, PacketError, BROADCAST, BUFFER_SIZE};
pub use queue::{PacketQueue, Popped, QueueError};
pub use sender::TxStep;
pub use wired::{WiredBus, WiredConfig};
pub use wireless::{RadioBridge, RadioConfig};

/// The outcome of one `transmit` call on either transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum TransmitStatus {
    /// Nothing was queued.
    Idle,
    /// The packet is on its way and has left the queue.
    Sent,
    /// The head packet had an impossible length and was dropped.
    Discarded,
    /// The line or the sender was busy. The packet stays queued.
    Busy,
}

impl TransmitStatus {
    /// Should the caller try again later?
    pub fn is_busy(&self) -> bool {
        matches!(self, TransmitStatus::Busy)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
#[non_exhaustive]
pub enum ConfigError {
    /// Priority class above [`wired::arbitration::MAX_PRIORITY`].
    Priority,
}
