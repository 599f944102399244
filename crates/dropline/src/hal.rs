//! Hardware capabilities the link layer needs from the platform
//!
//! Register access, pin muxing and baud rate setup stay with the platform.
//! The link layer only asks for the handful of line operations below, and
//! for time through [`embedded_hal::delay::DelayNs`].

/// The wired bus transceiver and its UART.
///
/// Levels are as seen on the receive pin: `true` is the released, idle
/// (recessive) level, `false` means some node is driving the line.
pub trait BusLine {
    /// Sample the receive pin.
    fn rx_level(&mut self) -> bool;

    /// Take the line over for bit-banged arbitration: UART transmitter
    /// off, transmit pin a low output, driver disabled.
    fn enter_arbitration(&mut self);

    /// During arbitration, drive the line low (`true`) or let it float
    /// high (`false`).
    fn drive(&mut self, dominant: bool);

    /// Stop driving and give the pin back, after a lost arbitration.
    fn release(&mut self);

    /// Won: hand the pin back to the UART transmitter, enable the driver
    /// and the "ready for next byte" interrupt.
    fn begin_transmit(&mut self);

    /// The last byte has left the shift register: driver off, receiver on.
    fn end_transmit(&mut self);

    /// Called before the settle delay, before each idle probe and at the
    /// start of each arbitration bit.
    fn service_watchdog(&mut self) {}
}

/// The serial link to a radio module in escaped API mode.
pub trait RadioLink {
    /// Is the module's clear-to-send line asserted?
    fn clear_to_send(&mut self) -> bool;

    /// Enable the "ready for next byte" interrupt.
    fn enable_tx_interrupt(&mut self);

    fn disable_tx_interrupt(&mut self);

    /// Called on every poll of clear-to-send that reads deasserted.
    fn service_watchdog(&mut self) {}
}

impl<T: BusLine + ?Sized> BusLine for &mut T {
    fn rx_level(&mut self) -> bool {
        T::rx_level(self)
    }

    fn enter_arbitration(&mut self) {
        T::enter_arbitration(self)
    }

    fn drive(&mut self, dominant: bool) {
        T::drive(self, dominant)
    }

    fn release(&mut self) {
        T::release(self)
    }

    fn begin_transmit(&mut self) {
        T::begin_transmit(self)
    }

    fn end_transmit(&mut self) {
        T::end_transmit(self)
    }

    fn service_watchdog(&mut self) {
        T::service_watchdog(self)
    }
}

impl<T: RadioLink + ?Sized> RadioLink for &mut T {
    fn clear_to_send(&mut self) -> bool {
        T::clear_to_send(self)
    }

    fn enable_tx_interrupt(&mut self) {
        T::enable_tx_interrupt(self)
    }

    fn disable_tx_interrupt(&mut self) {
        T::disable_tx_interrupt(self)
    }

    fn service_watchdog(&mut self) {
        T::service_watchdog(self)
    }
}
