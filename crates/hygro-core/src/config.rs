//! Tunable constants and configuration structs
//!
//! Defaults mirror the production logger board. Every struct can be built with
//! `Default::default()` and adjusted with the `with_*` methods.

use embassy_time::Duration;

use crate::error::{HygroError, Result};
use crate::power::WakeSources;

/// Number of samples held by one log sector.
pub const SAMPLE_DEPTH: usize = 28;

/// Number of sectors that may coexist in the non-volatile store.
pub const MAX_SECTORS: u8 = 4;

/// Inclusive value range mapped onto one stored byte.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuantizationRange {
    pub min: f32,
    pub max: f32,
}

impl QuantizationRange {
    /// Default temperature span in °C.
    pub const TEMPERATURE: Self = Self {
        min: -50.0,
        max: 60.0,
    };

    /// Default relative humidity span in %RH.
    pub const HUMIDITY: Self = Self {
        min: 0.0,
        max: 100.0,
    };

    /// Create a range, rejecting empty or inverted spans.
    pub fn new(min: f32, max: f32) -> Result<Self> {
        // Written so that NaN bounds are rejected too
        if !(max > min) {
            return Err(HygroError::InvalidRange { min, max });
        }
        Ok(Self { min, max })
    }

    /// Width of the range.
    pub fn span(&self) -> f32 {
        self.max - self.min
    }
}

/// Placement and encoding of the persistent sample log.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LogConfig {
    /// Sector selected at boot (out-of-range values fall back to 0)
    pub sector: u8,
    pub temperature: QuantizationRange,
    pub humidity: QuantizationRange,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            sector: 0,
            temperature: QuantizationRange::TEMPERATURE,
            humidity: QuantizationRange::HUMIDITY,
        }
    }
}

impl LogConfig {
    pub fn with_sector(mut self, sector: u8) -> Self {
        self.sector = sector;
        self
    }

    pub fn with_temperature(mut self, range: QuantizationRange) -> Self {
        self.temperature = range;
        self
    }

    pub fn with_humidity(mut self, range: QuantizationRange) -> Self {
        self.humidity = range;
        self
    }
}

/// What the maintenance pin does to the log sector when asserted at boot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MaintenanceReset {
    /// Pointer and every slot set to `0x00`
    Zeroes,
    /// Pointer set to 0, slots filled with the encoded defaults
    Defaults { temperature: f32, humidity: f32 },
}

impl Default for MaintenanceReset {
    fn default() -> Self {
        Self::Defaults {
            temperature: 20.0,
            humidity: 30.0,
        }
    }
}

/// Timing of the main logger board's control loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LifecycleConfig {
    /// Repaint period of the current screen
    pub display_refresh: Duration,
    /// Idle time before the device enters deep sleep
    pub inactivity_timeout: Duration,
    /// Minimum spacing between accepted button or pulse edges
    pub debounce: Duration,
    /// Button presses are ignored for this long after boot
    pub boot_grace: Duration,
    /// Hard cap on continuous awake time, enforced from the 1 Hz tick counter
    pub max_awake: Option<Duration>,
    /// Hardware watchdog timeout armed after setup
    pub watchdog_timeout: Duration,
    /// Sensor settle time before a boot-time measurement
    pub boot_settle: Duration,
    /// Hold time after a boot-time measurement before cutting power
    pub boot_measure_hold: Duration,
    pub maintenance_reset: MaintenanceReset,
    /// Lines armed as wake sources before sleeping
    pub wake_sources: WakeSources,
    pub log: LogConfig,
    pub sleep: SleepTiming,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            display_refresh: Duration::from_millis(250),
            inactivity_timeout: Duration::from_secs(10),
            debounce: Duration::from_millis(500),
            boot_grace: Duration::from_millis(1500),
            max_awake: Some(Duration::from_secs(60)),
            watchdog_timeout: Duration::from_secs(4),
            boot_settle: Duration::from_millis(250),
            boot_measure_hold: Duration::from_millis(500),
            maintenance_reset: MaintenanceReset::default(),
            wake_sources: WakeSources::ALL,
            log: LogConfig::default(),
            sleep: SleepTiming::default(),
        }
    }
}

impl LifecycleConfig {
    pub fn with_display_refresh(mut self, period: Duration) -> Self {
        self.display_refresh = period;
        self
    }

    pub fn with_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.inactivity_timeout = timeout;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_boot_grace(mut self, grace: Duration) -> Self {
        self.boot_grace = grace;
        self
    }

    pub fn with_max_awake(mut self, limit: Option<Duration>) -> Self {
        self.max_awake = limit;
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = timeout;
        self
    }

    pub fn with_maintenance_reset(mut self, reset: MaintenanceReset) -> Self {
        self.maintenance_reset = reset;
        self
    }

    pub fn with_wake_sources(mut self, sources: WakeSources) -> Self {
        self.wake_sources = sources;
        self
    }

    pub fn with_log(mut self, log: LogConfig) -> Self {
        self.log = log;
        self
    }

    pub fn with_sleep_timing(mut self, timing: SleepTiming) -> Self {
        self.sleep = timing;
        self
    }
}

/// Settle delays used around the deep-sleep transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SleepTiming {
    /// Bus lines float for this long before the rail is cut
    pub bus_release: Duration,
    /// Wait after arming the wake edges before sleeping
    pub arm_settle: Duration,
    /// Rail settle time before the bus is restarted
    pub rail_settle: Duration,
    /// Gap between display and sensor setup on wake
    pub peripheral_gap: Duration,
    /// Poll period while waiting for wake lines to return low
    pub idle_poll: Duration,
}

impl Default for SleepTiming {
    fn default() -> Self {
        Self {
            bus_release: Duration::from_millis(20),
            arm_settle: Duration::from_millis(10),
            rail_settle: Duration::from_millis(50),
            peripheral_gap: Duration::from_millis(10),
            idle_poll: Duration::from_millis(1),
        }
    }
}

/// Timing of the pulse-timer board.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseTimerConfig {
    /// How long the pulse line is held high
    pub pulse_length: Duration,
    /// Sleep time between pulses
    pub interval: Duration,
}

impl Default for PulseTimerConfig {
    fn default() -> Self {
        Self {
            pulse_length: Duration::from_millis(1500),
            interval: Duration::from_secs(5),
        }
    }
}

impl PulseTimerConfig {
    pub fn with_pulse_length(mut self, length: Duration) -> Self {
        self.pulse_length = length;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_rejects_inverted_span() {
        assert!(QuantizationRange::new(10.0, 10.0).is_err());
        assert!(QuantizationRange::new(10.0, -5.0).is_err());
        assert!(QuantizationRange::new(f32::NAN, 1.0).is_err());
        assert_eq!(
            QuantizationRange::new(-50.0, 60.0).unwrap(),
            QuantizationRange::TEMPERATURE
        );
    }

    #[test]
    fn test_defaults_match_board() {
        let cfg = LifecycleConfig::default();
        assert_eq!(cfg.display_refresh, Duration::from_millis(250));
        assert_eq!(cfg.inactivity_timeout, Duration::from_secs(10));
        assert_eq!(cfg.debounce, Duration::from_millis(500));
        assert_eq!(LogConfig::default().sector, 0);
        assert_eq!(QuantizationRange::TEMPERATURE.span(), 110.0);
    }
}
