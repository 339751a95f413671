//! Deep-sleep transition of the logger board.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};
use log::{info, warn};

use super::rail::PowerRail;
use super::wake::{WakeLatch, WakeReason, WakeSources};
use crate::config::SleepTiming;
use crate::display::Display;
use crate::hal::{BusControl, SleepDriver, is_high, pause};
use crate::sensors::Sensor;

/// Owns everything involved in putting the board to sleep and waking it up.
///
/// The sequence in [`enter_deep_sleep`](Self::enter_deep_sleep) is strictly
/// ordered: peripherals are suspended before the rail is cut, the rail is
/// settled before the bus restarts, and the armed wake lines are idle both
/// before they are armed and before the call returns.
pub struct WakeArbiter<'a, G, SD, B, D> {
    rail: PowerRail<G>,
    driver: SD,
    bus: B,
    delay: D,
    latch: &'a WakeLatch,
    timing: SleepTiming,
}

impl<'a, G, SD, B, D> WakeArbiter<'a, G, SD, B, D>
where
    G: OutputPin,
    SD: SleepDriver,
    B: BusControl,
    D: DelayNs,
{
    pub fn new(
        rail: PowerRail<G>,
        driver: SD,
        bus: B,
        delay: D,
        latch: &'a WakeLatch,
        timing: SleepTiming,
    ) -> Self {
        Self {
            rail,
            driver,
            bus,
            delay,
            latch,
            timing,
        }
    }

    pub fn rail(&self) -> &PowerRail<G> {
        &self.rail
    }

    pub fn rail_mut(&mut self) -> &mut PowerRail<G> {
        &mut self.rail
    }

    /// Board delay, shared with the controller for its own settle times.
    pub fn delay_mut(&mut self) -> &mut D {
        &mut self.delay
    }

    pub fn driver(&self) -> &SD {
        &self.driver
    }

    /// Suspend the peripherals, sleep until an armed line rises, and bring
    /// everything back up.
    ///
    /// Blocks until a wake edge fires. Returns the reason the edge handler
    /// recorded, or [`WakeReason::None`] when the core woke without one.
    pub fn enter_deep_sleep<S, Dp, Bt, P>(
        &mut self,
        sources: WakeSources,
        sensor: &mut S,
        display: &mut Dp,
        button: &mut Bt,
        pulse: &mut P,
    ) -> WakeReason
    where
        S: Sensor,
        Dp: Display,
        Bt: InputPin,
        P: InputPin,
    {
        info!("Entering deep sleep (wake on {:?})", sources);
        if sources.is_empty() {
            warn!("No wake source armed");
        }

        display.power_down();
        sensor.power_off();

        let gated = self.rail.is_gated();
        if gated {
            self.bus.release();
            pause(&mut self.delay, self.timing.bus_release);
            self.rail.off();
        }

        // Wake is level triggered; a line still high from the last edge would
        // wake the core straight away and report that edge a second time.
        self.wait_for_idle(sources, button, pulse);

        self.latch.clear();
        self.driver.arm(sources);
        pause(&mut self.delay, self.timing.arm_settle);

        self.driver.sleep();

        self.driver.disarm(sources);

        if gated {
            self.rail.on();
            pause(&mut self.delay, self.timing.rail_settle);
            self.bus.restore();
        }

        display.setup();
        pause(&mut self.delay, self.timing.peripheral_gap);
        sensor.setup();
        pause(&mut self.delay, self.timing.peripheral_gap);
        sensor.wake();
        if !sensor.is_ready() {
            warn!("Sensor not ready after wake");
        }

        self.wait_for_idle(sources, button, pulse);

        let reason = self.latch.take();
        info!("Woke up: {:?}", reason);
        reason
    }

    /// Spin until every armed line has returned low.
    fn wait_for_idle<Bt: InputPin, P: InputPin>(
        &mut self,
        sources: WakeSources,
        button: &mut Bt,
        pulse: &mut P,
    ) {
        loop {
            let busy = (sources.button && is_high(button)) || (sources.pulse && is_high(pulse));
            if !busy {
                break;
            }
            pause(&mut self.delay, self.timing.idle_poll);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::power::{NoGate, WakeSource};
    use crate::sensors::Reading;
    use crate::sim::*;
    use embassy_time::Duration;

    struct Rig<'a> {
        journal: SimJournal,
        clock: SimClock,
        sleep: SimSleep<'a>,
        sensor: SimSensor,
        display: SimDisplay,
        button: SimPin,
        pulse: SimPin,
    }

    impl<'a> Rig<'a> {
        fn new(latch: &'a WakeLatch) -> Self {
            let journal = SimJournal::new();
            let clock = SimClock::new();
            Self {
                sleep: SimSleep::new(latch, &clock, &journal),
                sensor: SimSensor::new(Reading::new(21.0, 40.0), &journal),
                display: SimDisplay::new(&journal),
                button: SimPin::new(false),
                pulse: SimPin::new(false),
                journal,
                clock,
            }
        }

        fn gated_arbiter(&self, latch: &'a WakeLatch) -> WakeArbiter<'a, SimPin, SimSleep<'a>, SimBus, SimDelay> {
            let gate = SimPin::traced(false, "gate", &self.journal);
            WakeArbiter::new(
                PowerRail::new(gate),
                self.sleep.clone(),
                SimBus::new(&self.journal),
                SimDelay::new(&self.clock),
                latch,
                SleepTiming::default(),
            )
        }

        fn sleep_once<G: OutputPin>(
            &mut self,
            arbiter: &mut WakeArbiter<'a, G, SimSleep<'a>, SimBus, SimDelay>,
            sources: WakeSources,
        ) -> WakeReason {
            arbiter.enter_deep_sleep(
                sources,
                &mut self.sensor,
                &mut self.display,
                &mut self.button,
                &mut self.pulse,
            )
        }
    }

    #[test]
    fn test_button_wake_reports_button() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(30), WakeSource::Button));

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::ALL), WakeReason::Button);
        assert!(rig.display.is_awake());
        assert!(rig.sensor.is_powered());
        assert!(arbiter.rail().is_on());
    }

    #[test]
    fn test_pulse_wake_reports_pulse() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(5), WakeSource::Pulse));

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::ALL), WakeReason::Pulse);
    }

    #[test]
    fn test_wake_without_edge_reports_none() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        // Stale reason from before the sleep must not leak through
        latch.record(WakeSource::Button);

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::ALL), WakeReason::None);
    }

    #[test]
    fn test_suspend_before_cut_and_settle_before_resume() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.journal.clear();
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(1), WakeSource::Button));
        rig.sleep_once(&mut arbiter, WakeSources::BUTTON);

        let gate_off = Event::Pin {
            name: "gate",
            high: true,
        };
        let gate_on = Event::Pin {
            name: "gate",
            high: false,
        };
        let j = &rig.journal;
        let at = |e: &Event| j.position(e).unwrap();

        assert_eq!(
            j.events(),
            vec![
                Event::DisplayDown,
                Event::SensorOff,
                Event::BusRelease,
                gate_off.clone(),
                Event::Arm(WakeSources::BUTTON),
                Event::Sleep,
                Event::Disarm(WakeSources::BUTTON),
                gate_on.clone(),
                Event::BusRestore,
                Event::DisplaySetup,
                Event::SensorSetup,
                Event::SensorWake,
            ]
        );
        assert!(at(&Event::SensorOff) < at(&gate_off));
        assert!(at(&gate_on) < at(&Event::BusRestore));
    }

    #[test]
    fn test_settle_delays_are_observed() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(1), WakeSource::Button));
        rig.sleep_once(&mut arbiter, WakeSources::BUTTON);

        // 20 bus + 10 arm + 1000 asleep + 50 rail + 2 * 10 setup gaps
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(1100));
    }

    #[test]
    fn test_waits_for_held_line_to_drop() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        // Button still held for five polls after wake
        rig.sleep.push(
            ScriptedWake::new(Duration::from_secs(1), WakeSource::Button).holding(&rig.button, 5),
        );
        rig.sleep_once(&mut arbiter, WakeSources::BUTTON);

        assert!(!rig.button.level());
        // One idle read before arming, six after wake
        assert_eq!(rig.button.reads(), 7);
        // Five idle polls of 1 ms on top of the plain sequence
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(1105));
    }

    #[test]
    fn test_line_high_at_entry_drops_before_arming() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(1), WakeSource::Button));
        // Measurement pulse still high when the controller decides to sleep
        rig.pulse.hold_high_for(3);

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::ALL), WakeReason::Button);
        // Three high reads and one low read before arming, one after wake
        assert_eq!(rig.pulse.reads(), 5);
        assert_eq!(rig.clock.elapsed(), Duration::from_millis(1103));
    }

    #[test]
    fn test_unarmed_line_is_not_waited_on() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter = rig.gated_arbiter(&latch);
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(1), WakeSource::Button));
        rig.pulse.set(true);

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::BUTTON), WakeReason::Button);
        assert_eq!(rig.pulse.reads(), 0);
    }

    #[test]
    fn test_ungated_board_skips_bus_hand_off() {
        let latch = WakeLatch::new();
        let mut rig = Rig::new(&latch);
        let mut arbiter: WakeArbiter<'_, NoGate, _, _, _> = WakeArbiter::new(
            PowerRail::ungated(),
            rig.sleep.clone(),
            SimBus::new(&rig.journal),
            SimDelay::new(&rig.clock),
            &latch,
            SleepTiming::default(),
        );
        rig.sleep
            .push(ScriptedWake::new(Duration::from_secs(1), WakeSource::Pulse));

        assert_eq!(rig.sleep_once(&mut arbiter, WakeSources::ALL), WakeReason::Pulse);
        assert_eq!(rig.journal.count(&Event::BusRelease), 0);
        assert_eq!(rig.journal.count(&Event::BusRestore), 0);
        assert!(rig.display.is_awake());
    }
}
