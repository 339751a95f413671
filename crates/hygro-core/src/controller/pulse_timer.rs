//! Pulse-timer board: wakes the logger board at a fixed interval.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use log::{debug, info, warn};

use super::{Controller, Step};
use crate::config::PulseTimerConfig;
use crate::hal::{TimedSleep, pause};

/// Drives the measurement request line of a logger board.
///
/// Every cycle the line is held high for `pulse_length`, then the board
/// sleeps for `interval` on its own timer.
pub struct PulseTimerController<P, T, D> {
    line: P,
    sleep: T,
    delay: D,
    config: PulseTimerConfig,
    pulses: u32,
}

impl<P, T, D> PulseTimerController<P, T, D>
where
    P: OutputPin,
    T: TimedSleep,
    D: DelayNs,
{
    pub fn new(line: P, sleep: T, delay: D, config: PulseTimerConfig) -> Self {
        Self {
            line,
            sleep,
            delay,
            config,
            pulses: 0,
        }
    }

    /// Pulses emitted since setup.
    pub fn pulses(&self) -> u32 {
        self.pulses
    }

    fn drive(&mut self, high: bool) {
        let result = if high {
            self.line.set_high()
        } else {
            self.line.set_low()
        };
        if let Err(e) = result {
            warn!("Pulse line write failed: {:?}", e);
        }
    }
}

impl<P, T, D> Controller for PulseTimerController<P, T, D>
where
    P: OutputPin,
    T: TimedSleep,
    D: DelayNs,
{
    fn setup(&mut self) -> Step {
        self.drive(false);
        info!(
            "Pulse timer: {} ms pulse every {} s",
            self.config.pulse_length.as_millis(),
            self.config.interval.as_secs()
        );
        Step::Continue
    }

    fn tick(&mut self) -> Step {
        self.drive(true);
        pause(&mut self.delay, self.config.pulse_length);
        self.drive(false);
        self.pulses = self.pulses.wrapping_add(1);
        debug!("Pulse {} sent", self.pulses);

        self.sleep.sleep_for(self.config.interval);
        Step::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::WakeLatch;
    use crate::sim::*;
    use embassy_time::Duration;

    #[test]
    fn test_pulse_then_sleep() {
        let latch = WakeLatch::new();
        let journal = SimJournal::new();
        let clock = SimClock::new();
        let line = SimPin::traced(true, "pulse", &journal);
        let mut timer = PulseTimerController::new(
            line.clone(),
            SimSleep::new(&latch, &clock, &journal),
            SimDelay::new(&clock),
            PulseTimerConfig::default(),
        );

        assert_eq!(timer.setup(), Step::Continue);
        assert!(!line.level());
        for _ in 0..2 {
            assert_eq!(timer.tick(), Step::Continue);
        }

        let high = Event::Pin {
            name: "pulse",
            high: true,
        };
        let low = Event::Pin {
            name: "pulse",
            high: false,
        };
        let nap = Event::TimedSleep(Duration::from_secs(5));
        assert_eq!(
            journal.events(),
            vec![
                low.clone(),
                high.clone(),
                low.clone(),
                nap.clone(),
                high,
                low,
                nap
            ]
        );
        assert_eq!(timer.pulses(), 2);
        assert_eq!(clock.elapsed(), Duration::from_millis(2 * (1500 + 5000)));
    }
}
