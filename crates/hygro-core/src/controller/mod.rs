//! Board controllers
//!
//! Each hardware variant is driven by exactly one [`Controller`]. The firmware
//! selects the variant at build time and hands it to [`run`]:
//! `setup` once, then `tick` until a [`Step::Halt`].

mod lifecycle;
mod pulse_timer;
mod state;

pub use lifecycle::*;
pub use pulse_timer::*;
pub use state::*;

use core::fmt::Debug;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use embedded_storage::Storage;

use crate::display::Display;
use crate::hal::{BusControl, Clock, ResetCause, SleepDriver, Watchdog};
use crate::sensors::Sensor;

/// Why a controller stopped for good.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// A measurement requested while off was taken and the latch released.
    BootMeasurement,
    /// The previous reset came from the watchdog; the device stays off.
    WatchdogTrap,
    /// The awake on-time guard expired.
    AwakeLimit,
}

/// Outcome of one controller step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// Power has been released; the caller must park the CPU.
    Halt(HaltReason),
}

/// One board's control loop.
pub trait Controller {
    fn setup(&mut self) -> Step;
    fn tick(&mut self) -> Step;
}

/// Drive a controller until it halts.
///
/// On hardware the latch cut removes power before this returns; the caller
/// parks the CPU in case it does not.
pub fn run<C: Controller>(controller: &mut C) -> HaltReason {
    let mut step = controller.setup();
    loop {
        if let Step::Halt(reason) = step {
            return reason;
        }
        step = controller.tick();
    }
}

/// Peripheral types of the main logger board.
pub trait Board {
    /// User button, active high.
    type Button: InputPin;
    /// Externally driven measurement request line, active high.
    type Pulse: InputPin;
    /// Maintenance strap sampled at boot, active low.
    type Maintenance: InputPin;
    /// Power latch holding the board's supply on.
    type Latch: OutputPin;
    /// Gate of the peripheral power rail.
    type Gate: OutputPin;
    type Storage: Storage<Error: Debug>;
    type Sensor: Sensor;
    type Display: Display;
    type Sleep: SleepDriver;
    type Bus: BusControl;
    type Watchdog: Watchdog;
    type Reset: ResetCause;
    type Clock: Clock;
    type Delay: DelayNs;
}
