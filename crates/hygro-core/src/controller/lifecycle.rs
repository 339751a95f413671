//! Main logger board: screens, measurements, sleep and the watchdog trap.

use embassy_time::{Duration, Instant};
use embedded_hal::digital::OutputPin;
use log::{debug, error, info, warn};

use super::state::{MeasurementState, ScreenState, Timestamps};
use super::{Board, Controller, HaltReason, Step};
use crate::config::{LifecycleConfig, MaintenanceReset, SAMPLE_DEPTH};
use crate::display::Display;
use crate::hal::{Clock, ResetCause, Watchdog, is_high, pause};
use crate::power::{PowerRail, TickCounter, WakeArbiter, WakeLatch, WakeReason};
use crate::sensors::{Reading, Sensor};
use crate::storage::CircularLog;

/// Delay between the last action and releasing the power latch.
const POWER_OFF_DELAY: Duration = Duration::from_millis(10);

/// Everything the logger board's controller takes ownership of.
pub struct LoggerParts<'a, B: Board> {
    pub button: B::Button,
    pub pulse: B::Pulse,
    pub maintenance: B::Maintenance,
    pub latch: B::Latch,
    pub rail: PowerRail<B::Gate>,
    pub storage: B::Storage,
    pub sensor: B::Sensor,
    pub display: B::Display,
    pub sleep: B::Sleep,
    pub bus: B::Bus,
    pub watchdog: B::Watchdog,
    pub reset: B::Reset,
    pub clock: B::Clock,
    pub delay: B::Delay,
    /// Written by the wake-edge interrupt handlers
    pub wake_latch: &'a WakeLatch,
    /// Advanced by the 1 Hz timer interrupt
    pub awake_ticks: &'a TickCounter,
}

/// Cooperative state machine of the main logger board.
///
/// Each [`tick`](Controller::tick) evaluates, in order: the on-time guard,
/// inactivity (deep sleep), the button, the periodic repaint and the pulse
/// line. A rule never undoes what an earlier rule did in the same tick.
pub struct LifecycleController<'a, B: Board> {
    config: LifecycleConfig,
    button: B::Button,
    pulse: B::Pulse,
    maintenance: B::Maintenance,
    latch: B::Latch,
    log: CircularLog<B::Storage>,
    sensor: B::Sensor,
    display: B::Display,
    arbiter: WakeArbiter<'a, B::Gate, B::Sleep, B::Bus, B::Delay>,
    watchdog: B::Watchdog,
    reset: B::Reset,
    clock: B::Clock,
    awake_ticks: &'a TickCounter,

    measurement: MeasurementState,
    screen: ScreenState,
    wake_reason: WakeReason,
    times: Timestamps,
    booted_at: Instant,
    pulse_was_high: bool,
    return_to_sleep: bool,
}

impl<'a, B: Board> LifecycleController<'a, B> {
    pub fn new(parts: LoggerParts<'a, B>, config: LifecycleConfig) -> Self {
        let now = parts.clock.now();
        Self {
            log: CircularLog::new(parts.storage, &config.log),
            arbiter: WakeArbiter::new(
                parts.rail,
                parts.sleep,
                parts.bus,
                parts.delay,
                parts.wake_latch,
                config.sleep,
            ),
            config,
            button: parts.button,
            pulse: parts.pulse,
            maintenance: parts.maintenance,
            latch: parts.latch,
            sensor: parts.sensor,
            display: parts.display,
            watchdog: parts.watchdog,
            reset: parts.reset,
            clock: parts.clock,
            awake_ticks: parts.awake_ticks,
            measurement: MeasurementState::default(),
            screen: ScreenState::default(),
            wake_reason: WakeReason::None,
            times: Timestamps::new(now),
            booted_at: now,
            pulse_was_high: false,
            return_to_sleep: false,
        }
    }

    pub fn measurement_state(&self) -> MeasurementState {
        self.measurement
    }

    pub fn screen(&self) -> ScreenState {
        self.screen
    }

    /// Reason the most recent sleep cycle ended.
    pub fn wake_reason(&self) -> WakeReason {
        self.wake_reason
    }

    pub fn timestamps(&self) -> &Timestamps {
        &self.times
    }

    pub fn log(&self) -> &CircularLog<B::Storage> {
        &self.log
    }

    pub fn log_mut(&mut self) -> &mut CircularLog<B::Storage> {
        &mut self.log
    }

    pub fn arbiter(&self) -> &WakeArbiter<'a, B::Gate, B::Sleep, B::Bus, B::Delay> {
        &self.arbiter
    }

    fn since(&self, then: Instant) -> Duration {
        self.clock.now().saturating_duration_since(then)
    }

    fn drive_latch(&mut self, high: bool) {
        let result = if high {
            self.latch.set_high()
        } else {
            self.latch.set_low()
        };
        if let Err(e) = result {
            warn!("Power latch write failed: {:?}", e);
        }
    }

    /// Release the power latch. On hardware the supply collapses shortly
    /// after; anything that still runs must not touch the peripherals.
    fn power_off(&mut self) {
        info!("Releasing power latch");
        pause(self.arbiter.delay_mut(), POWER_OFF_DELAY);
        self.drive_latch(false);
    }

    fn take_measurement(&mut self) -> Reading {
        let reading = self.sensor.read_data();
        if let Err(e) = self.log.push(reading.temperature, reading.humidity) {
            error!("Failed to log measurement: {}", e);
        }
        reading
    }

    fn maintenance_reset(&mut self) {
        let result = match self.config.maintenance_reset {
            MaintenanceReset::Zeroes => self.log.reset(),
            MaintenanceReset::Defaults {
                temperature,
                humidity,
            } => self.log.reset_with_defaults(temperature, humidity),
        };
        if let Err(e) = result {
            error!("Maintenance reset of the log failed: {}", e);
        }
    }

    fn refresh_display(&mut self, now: Instant) {
        self.times.last_display = now;
        match self.screen.chart() {
            None => {
                let reading = self.sensor.read_data();
                self.display
                    .display_main(reading.temperature, reading.humidity);
            }
            Some((channel, kind)) => {
                let mut history = [0.0; SAMPLE_DEPTH];
                match self.log.read_history(channel, &mut history) {
                    Ok(()) => self.display.display_chart(&history, kind),
                    Err(e) => error!("Failed to read {:?} history: {}", channel, e),
                }
            }
        }
    }

    /// Sleep until a wake edge, then resume in the branch it selects.
    fn sleep_cycle(&mut self) {
        self.return_to_sleep = false;
        self.watchdog.disable();

        let reason = self.arbiter.enter_deep_sleep(
            self.config.wake_sources,
            &mut self.sensor,
            &mut self.display,
            &mut self.button,
            &mut self.pulse,
        );

        self.watchdog.enable(self.config.watchdog_timeout);
        let now = self.clock.now();
        self.times.reset(now);
        self.awake_ticks.reset();
        self.measurement = MeasurementState::NoMeasurement;
        self.pulse_was_high = false;
        self.wake_reason = reason;

        match reason {
            WakeReason::Button => {
                self.screen = ScreenState::Main;
                self.refresh_display(now);
            }
            WakeReason::Pulse => {
                let reading = self.take_measurement();
                info!(
                    "Pulse wake sample: {:.1} C / {:.1} %RH",
                    reading.temperature, reading.humidity
                );
                self.measurement = MeasurementState::MeasureOnStart;
                self.return_to_sleep = true;
            }
            WakeReason::None => {
                debug!("Woke without a recorded source, sleeping again");
                self.return_to_sleep = true;
            }
        }
    }

    fn awake_limit_reached(&self) -> bool {
        self.config
            .max_awake
            .is_some_and(|limit| u64::from(self.awake_ticks.count()) >= limit.as_secs())
    }
}

impl<B: Board> Controller for LifecycleController<'_, B> {
    fn setup(&mut self) -> Step {
        self.drive_latch(true);

        if self.reset.watchdog_reset() {
            warn!("Last reset was forced by the watchdog, staying powered off");
            self.reset.clear();
            self.watchdog.disable();
            self.power_off();
            return Step::Halt(HaltReason::WatchdogTrap);
        }

        // Sampled first, the request line may drop while peripherals start
        if is_high(&mut self.pulse) {
            self.measurement = MeasurementState::MeasureOnStart;
        }

        self.arbiter.rail_mut().on();
        if self.arbiter.rail().is_gated() {
            pause(self.arbiter.delay_mut(), self.config.sleep.rail_settle);
        }
        self.sensor.setup();
        self.display.setup();
        if let Err(e) = self.log.begin(self.config.log.sector) {
            error!("Log unavailable: {}", e);
        }

        // Strapped low to request a reset
        if !is_high(&mut self.maintenance) {
            self.maintenance_reset();
        }

        if self.measurement == MeasurementState::MeasureOnStart {
            pause(self.arbiter.delay_mut(), self.config.boot_settle);
            let reading = self.take_measurement();
            info!(
                "Boot measurement: {:.1} C / {:.1} %RH",
                reading.temperature, reading.humidity
            );
            pause(self.arbiter.delay_mut(), self.config.boot_measure_hold);
            self.power_off();
            return Step::Halt(HaltReason::BootMeasurement);
        }

        self.watchdog.enable(self.config.watchdog_timeout);
        self.awake_ticks.reset();
        let now = self.clock.now();
        self.booted_at = now;
        self.times.reset(now);
        info!("Logger running");
        Step::Continue
    }

    fn tick(&mut self) -> Step {
        self.watchdog.feed();

        if self.awake_limit_reached() {
            warn!(
                "Awake for {} s without sleeping, powering off",
                self.awake_ticks.count()
            );
            self.power_off();
            return Step::Halt(HaltReason::AwakeLimit);
        }

        if self.return_to_sleep
            || self.since(self.times.last_activity) > self.config.inactivity_timeout
        {
            self.sleep_cycle();
            return Step::Continue;
        }

        let now = self.clock.now();

        if is_high(&mut self.button)
            && self.since(self.times.last_button) > self.config.debounce
            && self.since(self.booted_at) > self.config.boot_grace
        {
            self.times.last_button = now;
            self.times.last_activity = now;
            self.return_to_sleep = false;
            self.screen = self.screen.next();
            debug!("Screen -> {:?}", self.screen);
            self.refresh_display(now);
        }

        if self.since(self.times.last_display) > self.config.display_refresh {
            self.refresh_display(now);
        }

        let pulse_high = is_high(&mut self.pulse);
        let rising = pulse_high && !self.pulse_was_high;
        self.pulse_was_high = pulse_high;
        let settled = self
            .times
            .last_pulse
            .is_none_or(|last| self.since(last) > self.config.debounce);
        if rising && settled {
            self.times.last_pulse = Some(now);
            self.measurement = MeasurementState::MeasureInMain;
            let reading = self.take_measurement();
            debug!(
                "Pulse sample: {:.1} C / {:.1} %RH",
                reading.temperature, reading.humidity
            );
        }

        Step::Continue
    }
}
