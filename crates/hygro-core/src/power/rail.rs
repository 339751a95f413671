//! Gated power rail feeding the sensor and display.

use embedded_hal::digital::{ErrorType, OutputPin};
use log::{debug, warn};

/// Placeholder gate for boards whose peripherals are always powered.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoGate;

impl ErrorType for NoGate {
    type Error = core::convert::Infallible;
}

impl OutputPin for NoGate {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }
}

/// High-side switch (PMOS) in front of the peripherals.
///
/// The gate is active-low: driving it low powers the rail.
pub struct PowerRail<G> {
    gate: Option<G>,
    on: bool,
}

impl PowerRail<NoGate> {
    /// A rail without a switch; on/off requests are ignored.
    pub fn ungated() -> Self {
        Self {
            gate: None,
            on: true,
        }
    }
}

impl<G: OutputPin> PowerRail<G> {
    /// Take over the gate line and switch the rail off.
    pub fn new(gate: G) -> Self {
        let mut rail = Self {
            gate: Some(gate),
            on: true,
        };
        rail.off();
        rail
    }

    pub fn is_gated(&self) -> bool {
        self.gate.is_some()
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn on(&mut self) {
        if let Some(gate) = self.gate.as_mut() {
            if let Err(e) = gate.set_low() {
                warn!("Power rail gate failed to switch on: {:?}", e);
            }
            debug!("Power rail on");
            self.on = true;
        }
    }

    pub fn off(&mut self) {
        if let Some(gate) = self.gate.as_mut() {
            if let Err(e) = gate.set_high() {
                warn!("Power rail gate failed to switch off: {:?}", e);
            }
            debug!("Power rail off");
            self.on = false;
        }
    }
}
