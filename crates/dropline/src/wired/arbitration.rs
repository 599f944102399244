//! Carrier sense and bit-level address arbitration.
//!
//! The wired bus is wired-AND: a node driving low always wins over a node
//! letting the line float high. Before each packet, a sender:
//!
//! 1. waits a settle period and gives up if any byte arrived meanwhile,
//! 2. probes the line for a fixed idle window,
//! 3. probes for a further, priority-weighted window,
//! 4. clocks out a start bit, its address LSB first and two stop bits,
//!    reading each bit back. Reading high while driving low cannot happen,
//!    reading low while floating high means a node with a lower address bit
//!    is also talking, so we step aside.
//!
//! Every way of stepping aside is a back-off, which lowers the loneliness
//! counter and so shortens the wait of our next attempt.

use embedded_hal::delay::DelayNs;

use crate::{hal::BusLine, ConfigError};

/// Highest accepted priority class. Lower classes wait less.
pub const MAX_PRIORITY: u8 = 11;
pub const DEFAULT_PRIORITY: u8 = 6;
/// Loneliness after a completed transmission.
pub const LONELINESS_RESET: u8 = 6;

/// Timing of the transmit sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub struct ArbitrationTiming {
    /// Quiet time required before arbitration starts.
    pub settle_us: u32,
    /// Probes in the fixed idle window.
    pub idle_probes: u32,
    /// Time between two probes.
    pub probe_us: u32,
    /// Probes per unit of loneliness plus priority.
    pub wait_unit: u32,
    /// Slices per arbitration bit.
    pub bit_slices: u8,
    /// First slice in which the line is read back; earlier slices let the
    /// line settle after a level change.
    pub first_sample_slice: u8,
    pub slice_us: u32,
}

impl ArbitrationTiming {
    pub const DEFAULT: Self = Self {
        settle_us: 2_000,
        idle_probes: 44,
        probe_us: 10,
        wait_unit: 10,
        bit_slices: 10,
        first_sample_slice: 3,
        slice_us: 20,
    };
}

impl Default for ArbitrationTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Run-time configuration of a [`WiredBus`](crate::wired::WiredBus).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub struct WiredConfig {
    pub priority: u8,
    pub timing: ArbitrationTiming,
}

impl WiredConfig {
    pub const DEFAULT: Self = Self {
        priority: DEFAULT_PRIORITY,
        timing: ArbitrationTiming::DEFAULT,
    };
}

impl Default for WiredConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// How a contention attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-v1", derive(defmt::Format))]
pub enum Contention {
    Won,
    /// Another node was seen on the line, during probing or while clocking
    /// out address bits.
    Lost,
}

/// Back-off bookkeeping for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arbiter {
    loneliness: u8,
    priority: u8,
}

impl Arbiter {
    /// Out of range priorities fall back to [`DEFAULT_PRIORITY`].
    pub const fn new(priority: u8) -> Self {
        Self {
            loneliness: LONELINESS_RESET,
            priority: if priority <= MAX_PRIORITY {
                priority
            } else {
                DEFAULT_PRIORITY
            },
        }
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u8) -> Result<(), ConfigError> {
        if priority > MAX_PRIORITY {
            return Err(ConfigError::Priority);
        }
        self.priority = priority;
        Ok(())
    }

    pub fn loneliness(&self) -> u8 {
        self.loneliness
    }

    /// Probes in the priority-weighted window for a node at `src`.
    ///
    /// The low nibble of the address breaks ties between nodes that are
    /// otherwise in lockstep.
    pub fn wait_probes(&self, wait_unit: u32, src: u8) -> u32 {
        (self.loneliness as u32 + self.priority as u32) * wait_unit + (src & 0x0F) as u32
    }

    pub fn back_off(&mut self) {
        self.loneliness = self.loneliness.saturating_sub(1);
    }

    pub fn transmitted(&mut self) {
        self.loneliness = LONELINESS_RESET;
    }
}

impl Default for Arbiter {
    fn default() -> Self {
        Self::new(DEFAULT_PRIORITY)
    }
}

/// The bits clocked out for `address`: start bit, eight address bits LSB
/// first, two stop bits. `false` is the dominant level.
pub fn arbitration_bits(address: u8) -> impl Iterator<Item = bool> {
    core::iter::once(false)
        .chain((0..8).map(move |i| (address >> i) & 1 == 1))
        .chain([true, true])
}

/// Sample the line `probes` times, `probe_us` apart. False as soon as the
/// line is seen driven.
pub fn line_quiet<L: BusLine, D: DelayNs>(
    line: &mut L,
    delay: &mut D,
    probes: u32,
    probe_us: u32,
) -> bool {
    for _ in 0..probes {
        line.service_watchdog();
        delay.delay_us(probe_us);
        if !line.rx_level() {
            return false;
        }
    }
    true
}

/// Clock out one arbitration bit and read it back.
///
/// Once the line has been seen high in a bit it counts as high for the rest
/// of that bit. Any disagreement with `level` releases the line and returns
/// false.
pub fn send_bit<L: BusLine, D: DelayNs>(
    line: &mut L,
    delay: &mut D,
    timing: &ArbitrationTiming,
    level: bool,
) -> bool {
    line.service_watchdog();
    line.drive(!level);
    let mut seen_high = false;
    for slice in 0..timing.bit_slices {
        if slice >= timing.first_sample_slice {
            seen_high |= line.rx_level();
            if seen_high != level {
                line.release();
                return false;
            }
        }
        delay.delay_us(timing.slice_us);
    }
    true
}

/// Clock out the whole arbitration sequence for `address`.
pub fn contend<L: BusLine, D: DelayNs>(
    line: &mut L,
    delay: &mut D,
    timing: &ArbitrationTiming,
    address: u8,
) -> Contention {
    for level in arbitration_bits(address) {
        if !send_bit(line, delay, timing, level) {
            return Contention::Lost;
        }
    }
    Contention::Won
}
