//! Interrupt handlers and the state they share with the main loop
//!
//! The handlers here only ever clear their interrupt and write one of the two
//! atomic cells from `hygro-core` ([`WAKE_LATCH`], [`AWAKE_TICKS`]). The pins
//! and the timer they need to acknowledge live in critical-section protected
//! statics so the main loop can still read the wake lines.

use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::digital::{ErrorType, InputPin};
use esp_hal::Blocking;
use esp_hal::gpio::{Event, Input, WakeEvent};
use esp_hal::handler;
use esp_hal::time::Duration;
use esp_hal::timer::PeriodicTimer;
use hygro_core::power::{TickCounter, WakeLatch, WakeSource, WakeSources};
use log::{error, warn};

/// Written by [`wake_edge`], consumed by the wake arbiter.
pub static WAKE_LATCH: WakeLatch = WakeLatch::new();

/// Advanced once per second by [`awake_tick`] while the board is awake.
pub static AWAKE_TICKS: TickCounter = TickCounter::new();

static BUTTON: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));
static PULSE: Mutex<RefCell<Option<Input<'static>>>> = Mutex::new(RefCell::new(None));
static AWAKE_TIMER: Mutex<RefCell<Option<PeriodicTimer<'static, Blocking>>>> =
    Mutex::new(RefCell::new(None));

fn slot(source: WakeSource) -> &'static Mutex<RefCell<Option<Input<'static>>>> {
    match source {
        WakeSource::Button => &BUTTON,
        WakeSource::Pulse => &PULSE,
    }
}

/// Hand a wake line over to the interrupt side and get back a reader for it.
pub fn install_wake_line(source: WakeSource, input: Input<'static>) -> WakeLine {
    critical_section::with(|cs| slot(source).borrow_ref_mut(cs).replace(input));
    WakeLine { source }
}

/// Start the 1 Hz on-time counter.
pub fn start_awake_timer(mut timer: PeriodicTimer<'static, Blocking>) {
    timer.set_interrupt_handler(awake_tick);
    timer.listen();
    if let Err(e) = timer.start(Duration::from_secs(1)) {
        error!("Awake timer failed to start: {:?}", e);
        return;
    }
    critical_section::with(|cs| AWAKE_TIMER.borrow_ref_mut(cs).replace(timer));
}

/// Arm every line in `sources` for a rising edge and for light-sleep wake.
pub fn arm(sources: WakeSources) {
    critical_section::with(|cs| {
        for source in [WakeSource::Button, WakeSource::Pulse] {
            if !sources.contains(source) {
                continue;
            }
            if let Some(pin) = slot(source).borrow_ref_mut(cs).as_mut() {
                pin.clear_interrupt();
                pin.listen(Event::RisingEdge);
                if let Err(e) = pin.wakeup_enable(true, WakeEvent::HighLevel) {
                    warn!("{:?} cannot wake the chip: {:?}", source, e);
                }
            }
        }
    });
}

pub fn disarm(sources: WakeSources) {
    critical_section::with(|cs| {
        for source in [WakeSource::Button, WakeSource::Pulse] {
            if !sources.contains(source) {
                continue;
            }
            if let Some(pin) = slot(source).borrow_ref_mut(cs).as_mut() {
                pin.unlisten();
                pin.clear_interrupt();
                let _ = pin.wakeup_enable(false, WakeEvent::HighLevel);
            }
        }
    });
}

/// Current level of a wake line, `false` when it was never installed.
pub fn level(source: WakeSource) -> bool {
    critical_section::with(|cs| {
        slot(source)
            .borrow_ref(cs)
            .as_ref()
            .is_some_and(|pin| pin.is_high())
    })
}

/// Wake-edge handler, registered with `Io::set_interrupt_handler`.
#[handler]
pub fn wake_edge() {
    critical_section::with(|cs| {
        for source in [WakeSource::Button, WakeSource::Pulse] {
            if let Some(pin) = slot(source).borrow_ref_mut(cs).as_mut()
                && pin.is_interrupt_set()
            {
                pin.clear_interrupt();
                WAKE_LATCH.record(source);
            }
        }
    });
}

#[handler]
fn awake_tick() {
    critical_section::with(|cs| {
        if let Some(timer) = AWAKE_TIMER.borrow_ref_mut(cs).as_mut() {
            timer.clear_interrupt();
        }
    });
    AWAKE_TICKS.tick();
}

/// Readable handle on a wake line owned by the interrupt side.
#[derive(Debug, Clone, Copy)]
pub struct WakeLine {
    source: WakeSource,
}

impl ErrorType for WakeLine {
    type Error = core::convert::Infallible;
}

impl InputPin for WakeLine {
    fn is_high(&mut self) -> Result<bool, Self::Error> {
        Ok(level(self.source))
    }

    fn is_low(&mut self) -> Result<bool, Self::Error> {
        Ok(!level(self.source))
    }
}
