use super::{Reading, Sensor};
use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{error, warn};
use sht4x::{Precision, Sht4x};

/// Sensirion SHT40 on I2C.
///
/// The SHT40 idles at under 1 µA between single-shot measurements, so
/// power-off only has to stop talking to it before the rail is cut.
pub struct SHT40Sensor<I, D> {
    sensor: Sht4x<I, D>,
    delay: D,
    ready: bool,
}

impl<I: I2c, D: DelayNs + Clone> SHT40Sensor<I, D> {
    pub fn new(i2c: I, delay: D) -> Self {
        Self {
            sensor: Sht4x::new(i2c),
            delay,
            ready: false,
        }
    }
}

impl<I: I2c, D: DelayNs + Clone> Sensor for SHT40Sensor<I, D> {
    fn setup(&mut self) {
        let mut delay = self.delay.clone();
        self.ready = match self.sensor.soft_reset(&mut delay) {
            Ok(()) => true,
            Err(e) => {
                warn!("SHT40 soft reset failed: {:?}", e);
                false
            }
        };
    }

    fn read_data(&mut self) -> Reading {
        let mut delay = self.delay.clone();
        match self.sensor.measure(Precision::High, &mut delay) {
            Ok(measurement) => {
                self.ready = true;
                Reading::new(
                    measurement.temperature_celsius().to_num::<f32>(),
                    measurement.humidity_percent().to_num::<f32>(),
                )
            }
            Err(e) => {
                error!("SHT40 measurement failed: {:?}", e);
                self.ready = false;
                Reading::default()
            }
        }
    }

    fn power_off(&mut self) {
        self.ready = false;
    }

    fn is_ready(&mut self) -> bool {
        self.ready
    }
}
