//! Platform seams the controllers are written against
//!
//! Pins and delays use the `embedded-hal` traits directly; everything that
//! has no `embedded-hal` equivalent (sleep entry, watchdog, reset cause,
//! monotonic time) is defined here and implemented by the firmware and by
//! [`crate::sim`].

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::InputPin;
use log::warn;

use crate::power::WakeSources;

/// Monotonic time since boot.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// Hardware watchdog that resets the chip when not fed in time.
pub trait Watchdog {
    fn enable(&mut self, timeout: Duration);
    fn feed(&mut self);
    fn disable(&mut self);
}

/// Access to the chip's record of why it last reset.
pub trait ResetCause {
    /// `true` when the last reset was forced by a watchdog.
    fn watchdog_reset(&mut self) -> bool;
    /// Clear the watchdog fault flag so the next boot starts clean.
    fn clear(&mut self);
}

/// Ownership hand-off of the sensor/display bus around a rail cut.
pub trait BusControl {
    /// Stop the bus peripheral and tri-state its lines.
    fn release(&mut self);
    /// Re-attach the lines and restart the bus peripheral.
    fn restore(&mut self);
}

/// Bus that needs no hand-off (peripherals stay powered).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBus;

impl BusControl for NoBus {
    fn release(&mut self) {}
    fn restore(&mut self) {}
}

/// Entry into the deepest sleep mode that keeps edge wake sources alive.
///
/// The edge handlers installed by `arm` must only write the shared
/// [`WakeLatch`](crate::power::WakeLatch).
pub trait SleepDriver {
    /// Arm each source as a rising-edge interrupt.
    fn arm(&mut self, sources: WakeSources);
    /// Block until an armed source fires.
    fn sleep(&mut self);
    /// Disarm the sources armed before sleeping.
    fn disarm(&mut self, sources: WakeSources);
}

/// Timer-driven sleep used by the pulse-timer board.
pub trait TimedSleep {
    fn sleep_for(&mut self, duration: Duration);
}

/// Busy-wait for an `embassy_time` duration.
pub(crate) fn pause<D: DelayNs>(delay: &mut D, duration: Duration) {
    let micros = duration.as_micros();
    delay.delay_us(micros.min(u32::MAX as u64) as u32);
}

/// Sample an input, treating read errors as a low level.
pub(crate) fn is_high<P: InputPin>(pin: &mut P) -> bool {
    pin.is_high().unwrap_or_else(|e| {
        warn!("Input read failed: {:?}", e);
        false
    })
}
