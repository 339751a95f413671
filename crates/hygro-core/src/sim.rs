//! Simulated peripherals for host tests and the desktop simulator
//!
//! Every handle is cheap to clone and shares its state with the original, so
//! a test can hand one copy to a controller and keep another to drive inputs
//! and inspect what the controller did. Time only moves when a [`SimDelay`]
//! or [`SimSleep`] advances the shared [`SimClock`].

use alloc::collections::VecDeque;
use alloc::rc::Rc;
use alloc::vec::Vec;
use core::cell::{Cell, RefCell};
use core::convert::Infallible;
use core::marker::PhantomData;

use embassy_time::{Duration, Instant};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::controller::{Board, LoggerParts};
use crate::display::{ChartKind, Display};
use crate::hal::{BusControl, Clock, ResetCause, SleepDriver, TimedSleep, Watchdog};
use crate::power::{PowerRail, TickCounter, WakeLatch, WakeSource, WakeSources};
use crate::sensors::{Reading, Sensor};
use crate::storage::MemStorage;

/// Something a simulated peripheral was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Pin { name: &'static str, high: bool },
    SensorSetup,
    SensorOff,
    SensorWake,
    DisplaySetup,
    DisplayDown,
    BusRelease,
    BusRestore,
    Arm(WakeSources),
    Sleep,
    Disarm(WakeSources),
    TimedSleep(Duration),
    WatchdogEnable(Duration),
    WatchdogDisable,
}

/// Ordered record of peripheral events shared by all sim handles.
#[derive(Debug, Clone, Default)]
pub struct SimJournal {
    events: Rc<RefCell<Vec<Event>>>,
}

impl SimJournal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: Event) {
        self.events.borrow_mut().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.borrow().clone()
    }

    /// Index of the first occurrence of `event`.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events.borrow().iter().position(|e| e == event)
    }

    pub fn count(&self, event: &Event) -> usize {
        self.events.borrow().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }
}

/// Virtual monotonic clock.
#[derive(Debug, Clone)]
pub struct SimClock {
    now: Rc<Cell<Instant>>,
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            now: Rc::new(Cell::new(Instant::from_ticks(0))),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.now.get() - Instant::from_ticks(0)
    }
}

impl Clock for SimClock {
    fn now(&self) -> Instant {
        self.now.get()
    }
}

/// Delay that advances the virtual clock instead of blocking.
#[derive(Debug, Clone)]
pub struct SimDelay {
    clock: SimClock,
}

impl SimDelay {
    pub fn new(clock: &SimClock) -> Self {
        Self {
            clock: clock.clone(),
        }
    }
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.clock.advance(Duration::from_nanos(ns as u64));
    }
}

#[derive(Debug, Default)]
struct PinState {
    high: Cell<bool>,
    /// Reads left before a held line drops low by itself
    hold_reads: Cell<u32>,
    reads: Cell<u32>,
}

/// A digital line usable both as input and output.
#[derive(Debug, Clone)]
pub struct SimPin {
    state: Rc<PinState>,
    trace: Option<(&'static str, SimJournal)>,
}

impl SimPin {
    pub fn new(high: bool) -> Self {
        let state = PinState::default();
        state.high.set(high);
        Self {
            state: Rc::new(state),
            trace: None,
        }
    }

    /// A pin whose output changes are written to `journal` under `name`.
    pub fn traced(high: bool, name: &'static str, journal: &SimJournal) -> Self {
        let mut pin = Self::new(high);
        pin.trace = Some((name, journal.clone()));
        pin
    }

    pub fn level(&self) -> bool {
        self.state.high.get()
    }

    pub fn set(&self, high: bool) {
        self.state.hold_reads.set(0);
        self.state.high.set(high);
    }

    /// Drive the line high for the next `reads` samples, then let it drop.
    pub fn hold_high_for(&self, reads: u32) {
        self.state.high.set(reads > 0);
        self.state.hold_reads.set(reads);
    }

    pub fn reads(&self) -> u32 {
        self.state.reads.get()
    }

    fn drive(&mut self, high: bool) {
        self.state.high.set(high);
        if let Some((name, journal)) = &self.trace {
            journal.record(Event::Pin { name: *name, high });
        }
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl InputPin for SimPin {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        let state = &self.state;
        state.reads.set(state.reads.get() + 1);
        let high = state.high.get();
        let hold = state.hold_reads.get();
        if hold > 0 {
            state.hold_reads.set(hold - 1);
            if hold == 1 {
                state.high.set(false);
            }
        }
        Ok(high)
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        self.is_high().map(|high| !high)
    }
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.drive(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.drive(true);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct SensorState {
    reading: Cell<Reading>,
    failing: Cell<bool>,
    ready: Cell<bool>,
    powered: Cell<bool>,
    reads: Cell<u32>,
    setups: Cell<u32>,
}

/// Sensor returning a scripted reading.
#[derive(Debug, Clone)]
pub struct SimSensor {
    state: Rc<SensorState>,
    journal: SimJournal,
}

impl SimSensor {
    pub fn new(reading: Reading, journal: &SimJournal) -> Self {
        let state = SensorState::default();
        state.reading.set(reading);
        state.ready.set(true);
        Self {
            state: Rc::new(state),
            journal: journal.clone(),
        }
    }

    pub fn set_reading(&self, reading: Reading) {
        self.state.reading.set(reading);
    }

    /// While failing, reads return a zeroed reading like a bus error would.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.set(failing);
    }

    pub fn set_ready(&self, ready: bool) {
        self.state.ready.set(ready);
    }

    pub fn is_powered(&self) -> bool {
        self.state.powered.get()
    }

    pub fn reads(&self) -> u32 {
        self.state.reads.get()
    }

    pub fn setups(&self) -> u32 {
        self.state.setups.get()
    }
}

impl Sensor for SimSensor {
    fn setup(&mut self) {
        self.state.setups.set(self.state.setups.get() + 1);
        self.state.powered.set(true);
        self.journal.record(Event::SensorSetup);
    }

    fn read_data(&mut self) -> Reading {
        self.state.reads.set(self.state.reads.get() + 1);
        if self.state.failing.get() {
            return Reading::default();
        }
        self.state.reading.get()
    }

    fn power_off(&mut self) {
        self.state.powered.set(false);
        self.journal.record(Event::SensorOff);
    }

    fn wake(&mut self) {
        self.journal.record(Event::SensorWake);
    }

    fn is_ready(&mut self) -> bool {
        self.state.ready.get()
    }
}

/// Last image pushed to a [`SimDisplay`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Frame {
    #[default]
    Blank,
    Main {
        temperature: f32,
        humidity: f32,
    },
    Chart {
        kind: ChartKind,
        history: Vec<f32>,
    },
}

#[derive(Debug, Default)]
struct DisplayState {
    frame: RefCell<Frame>,
    frames: Cell<u32>,
    awake: Cell<bool>,
}

/// Display that remembers the last frame instead of drawing it.
#[derive(Debug, Clone)]
pub struct SimDisplay {
    state: Rc<DisplayState>,
    journal: SimJournal,
}

impl SimDisplay {
    pub fn new(journal: &SimJournal) -> Self {
        Self {
            state: Rc::new(DisplayState::default()),
            journal: journal.clone(),
        }
    }

    pub fn frame(&self) -> Frame {
        self.state.frame.borrow().clone()
    }

    /// Number of frames drawn so far.
    pub fn frames(&self) -> u32 {
        self.state.frames.get()
    }

    pub fn is_awake(&self) -> bool {
        self.state.awake.get()
    }

    fn show(&self, frame: Frame) {
        *self.state.frame.borrow_mut() = frame;
        self.state.frames.set(self.state.frames.get() + 1);
    }
}

impl Display for SimDisplay {
    fn setup(&mut self) {
        self.state.awake.set(true);
        self.journal.record(Event::DisplaySetup);
    }

    fn display_main(&mut self, temperature: f32, humidity: f32) {
        self.show(Frame::Main {
            temperature,
            humidity,
        });
    }

    fn display_chart(&mut self, history: &[f32], kind: ChartKind) {
        self.show(Frame::Chart {
            kind,
            history: history.to_vec(),
        });
    }

    fn power_down(&mut self) {
        self.state.awake.set(false);
        *self.state.frame.borrow_mut() = Frame::Blank;
        self.journal.record(Event::DisplayDown);
    }
}

/// One scripted wake: sleep for `after`, then fire `source` (if armed).
#[derive(Debug, Clone)]
pub struct ScriptedWake {
    pub after: Duration,
    pub source: Option<WakeSource>,
    /// Line left high after the edge, for this many reads
    held: Option<(SimPin, u32)>,
}

impl ScriptedWake {
    pub const fn new(after: Duration, source: WakeSource) -> Self {
        Self {
            after,
            source: Some(source),
            held: None,
        }
    }

    /// Keep `pin` high for `reads` reads once the wake fires.
    pub fn holding(mut self, pin: &SimPin, reads: u32) -> Self {
        self.held = Some((pin.clone(), reads));
        self
    }
}

/// Sleep driver that plays back a queue of wake events.
///
/// Firing a source writes to the shared [`WakeLatch`] exactly like the
/// firmware's edge handler. Edges on lines that were not armed are dropped.
/// With an empty script, sleep returns immediately without a wake edge.
#[derive(Debug, Clone)]
pub struct SimSleep<'a> {
    latch: &'a WakeLatch,
    clock: SimClock,
    journal: SimJournal,
    script: Rc<RefCell<VecDeque<ScriptedWake>>>,
    armed: WakeSources,
}

impl<'a> SimSleep<'a> {
    pub fn new(latch: &'a WakeLatch, clock: &SimClock, journal: &SimJournal) -> Self {
        Self {
            latch,
            clock: clock.clone(),
            journal: journal.clone(),
            script: Rc::new(RefCell::new(VecDeque::new())),
            armed: WakeSources::NONE,
        }
    }

    pub fn push(&self, wake: ScriptedWake) {
        self.script.borrow_mut().push_back(wake);
    }

    pub fn pending(&self) -> usize {
        self.script.borrow().len()
    }
}

impl SleepDriver for SimSleep<'_> {
    fn arm(&mut self, sources: WakeSources) {
        self.armed = sources;
        self.journal.record(Event::Arm(sources));
    }

    fn sleep(&mut self) {
        self.journal.record(Event::Sleep);
        let next = self.script.borrow_mut().pop_front();
        if let Some(wake) = next {
            self.clock.advance(wake.after);
            if let Some(source) = wake.source.filter(|s| self.armed.contains(*s)) {
                self.latch.record(source);
            }
            if let Some((pin, reads)) = wake.held {
                pin.hold_high_for(reads);
            }
        }
    }

    fn disarm(&mut self, sources: WakeSources) {
        self.armed = WakeSources::NONE;
        self.journal.record(Event::Disarm(sources));
    }
}

impl TimedSleep for SimSleep<'_> {
    fn sleep_for(&mut self, duration: Duration) {
        self.journal.record(Event::TimedSleep(duration));
        self.clock.advance(duration);
    }
}

/// Bus hand-off that only journals.
#[derive(Debug, Clone)]
pub struct SimBus {
    journal: SimJournal,
}

impl SimBus {
    pub fn new(journal: &SimJournal) -> Self {
        Self {
            journal: journal.clone(),
        }
    }
}

impl BusControl for SimBus {
    fn release(&mut self) {
        self.journal.record(Event::BusRelease);
    }

    fn restore(&mut self) {
        self.journal.record(Event::BusRestore);
    }
}

#[derive(Debug, Default)]
struct WatchdogState {
    timeout: Cell<Option<Duration>>,
    feeds: Cell<u32>,
}

/// Watchdog that records its configuration and feeds.
#[derive(Debug, Clone)]
pub struct SimWatchdog {
    state: Rc<WatchdogState>,
    journal: SimJournal,
}

impl SimWatchdog {
    pub fn new(journal: &SimJournal) -> Self {
        Self {
            state: Rc::new(WatchdogState::default()),
            journal: journal.clone(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.timeout.get().is_some()
    }

    pub fn feeds(&self) -> u32 {
        self.state.feeds.get()
    }
}

impl Watchdog for SimWatchdog {
    fn enable(&mut self, timeout: Duration) {
        self.state.timeout.set(Some(timeout));
        self.journal.record(Event::WatchdogEnable(timeout));
    }

    fn feed(&mut self) {
        self.state.feeds.set(self.state.feeds.get() + 1);
    }

    fn disable(&mut self) {
        self.state.timeout.set(None);
        self.journal.record(Event::WatchdogDisable);
    }
}

/// Reset-cause register with a settable watchdog flag.
#[derive(Debug, Clone, Default)]
pub struct SimResetCause {
    watchdog: Rc<Cell<bool>>,
}

impl SimResetCause {
    pub fn new(watchdog: bool) -> Self {
        Self {
            watchdog: Rc::new(Cell::new(watchdog)),
        }
    }

    pub fn set_watchdog(&self, flagged: bool) {
        self.watchdog.set(flagged);
    }

    pub fn is_flagged(&self) -> bool {
        self.watchdog.get()
    }
}

impl ResetCause for SimResetCause {
    fn watchdog_reset(&mut self) -> bool {
        self.watchdog.get()
    }

    fn clear(&mut self) {
        self.watchdog.set(false);
    }
}

/// Size of the simulated non-volatile store, enough for every sector.
pub const SIM_STORE_SIZE: usize = 256;

/// Logger board assembled from simulated peripherals.
pub struct SimBoard<'a>(PhantomData<&'a ()>);

impl<'a> Board for SimBoard<'a> {
    type Button = SimPin;
    type Pulse = SimPin;
    type Maintenance = SimPin;
    type Latch = SimPin;
    type Gate = SimPin;
    type Storage = MemStorage<SIM_STORE_SIZE>;
    type Sensor = SimSensor;
    type Display = SimDisplay;
    type Sleep = SimSleep<'a>;
    type Bus = SimBus;
    type Watchdog = SimWatchdog;
    type Reset = SimResetCause;
    type Clock = SimClock;
    type Delay = SimDelay;
}

/// Handles to every simulated peripheral of one logger board.
///
/// [`parts`](Self::parts) hands clones to a controller; the fields stay
/// connected to them.
pub struct SimHarness<'a> {
    pub journal: SimJournal,
    pub clock: SimClock,
    pub button: SimPin,
    pub pulse: SimPin,
    /// Pulled up; set low to request a maintenance reset at boot
    pub maintenance: SimPin,
    pub latch: SimPin,
    pub gate: SimPin,
    pub sensor: SimSensor,
    pub display: SimDisplay,
    pub sleep: SimSleep<'a>,
    pub watchdog: SimWatchdog,
    pub reset: SimResetCause,
    wake_latch: &'a WakeLatch,
    awake_ticks: &'a TickCounter,
}

impl<'a> SimHarness<'a> {
    pub fn new(wake_latch: &'a WakeLatch, awake_ticks: &'a TickCounter) -> Self {
        let journal = SimJournal::new();
        let clock = SimClock::new();
        Self {
            button: SimPin::new(false),
            pulse: SimPin::new(false),
            maintenance: SimPin::new(true),
            latch: SimPin::traced(false, "latch", &journal),
            gate: SimPin::traced(true, "gate", &journal),
            sensor: SimSensor::new(Reading::new(21.5, 45.0), &journal),
            display: SimDisplay::new(&journal),
            sleep: SimSleep::new(wake_latch, &clock, &journal),
            watchdog: SimWatchdog::new(&journal),
            reset: SimResetCause::default(),
            journal,
            clock,
            wake_latch,
            awake_ticks,
        }
    }

    pub fn parts(&self, storage: MemStorage<SIM_STORE_SIZE>) -> LoggerParts<'a, SimBoard<'a>> {
        LoggerParts {
            button: self.button.clone(),
            pulse: self.pulse.clone(),
            maintenance: self.maintenance.clone(),
            latch: self.latch.clone(),
            rail: PowerRail::new(self.gate.clone()),
            storage,
            sensor: self.sensor.clone(),
            display: self.display.clone(),
            sleep: self.sleep.clone(),
            bus: SimBus::new(&self.journal),
            watchdog: self.watchdog.clone(),
            reset: self.reset.clone(),
            clock: self.clock.clone(),
            delay: SimDelay::new(&self.clock),
            wake_latch: self.wake_latch,
            awake_ticks: self.awake_ticks,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_advances_clock() {
        let clock = SimClock::new();
        let mut delay = SimDelay::new(&clock);
        delay.delay_ms(250);
        assert_eq!(clock.elapsed(), Duration::from_millis(250));
    }

    #[test]
    fn test_held_pin_drops_after_reads() {
        let mut pin = SimPin::new(false);
        pin.hold_high_for(2);
        assert!(pin.is_high().unwrap());
        assert!(pin.is_high().unwrap());
        assert!(!pin.is_high().unwrap());
        assert_eq!(pin.reads(), 3);
    }

    #[test]
    fn test_sleep_drops_unarmed_edges() {
        let latch = WakeLatch::new();
        let clock = SimClock::new();
        let journal = SimJournal::new();
        let mut sleep = SimSleep::new(&latch, &clock, &journal);
        sleep.push(ScriptedWake::new(Duration::from_secs(3), WakeSource::Pulse));

        sleep.arm(WakeSources::BUTTON);
        sleep.sleep();
        assert_eq!(latch.take(), crate::power::WakeReason::None);
        assert_eq!(clock.elapsed(), Duration::from_secs(3));
    }
}
