//! Temperature/humidity sensor interface

#[cfg(feature = "sensor-sht40")]
mod sht40;

#[cfg(feature = "sensor-sht40")]
pub use sht40::SHT40Sensor;

/// One compensated reading.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Reading {
    /// Degrees Celsius
    pub temperature: f32,
    /// Percent relative humidity
    pub humidity: f32,
}

impl Reading {
    pub const fn new(temperature: f32, humidity: f32) -> Self {
        Self {
            temperature,
            humidity,
        }
    }
}

/// A temperature/humidity sensor on the gated bus.
///
/// Drivers absorb transient bus errors: `read_data` logs them and returns a
/// zeroed [`Reading`] instead of failing, and the next tick simply reads again.
pub trait Sensor {
    /// (Re)initialise after power-up or wake.
    fn setup(&mut self);

    fn read_data(&mut self) -> Reading;

    /// Put the sensor in its lowest-power state before the rail is cut.
    fn power_off(&mut self);

    /// Bring the sensor out of its sleep mode after `setup`.
    fn wake(&mut self) {}

    /// Whether the sensor answered after wake.
    fn is_ready(&mut self) -> bool {
        true
    }
}
