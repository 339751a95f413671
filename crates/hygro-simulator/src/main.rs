//! Desktop simulator for the hygro logger.
//!
//! Runs the core controllers against simulated peripherals on a virtual
//! clock, so hours of sleep take no wall time. Each invocation is one power
//! cycle of the device: the non-volatile store is loaded from a state file,
//! the scripted scenario runs until the device falls asleep for good (or
//! halts), and the store is written back.
//!
//! # Usage
//!
//! ```text
//! hygro-simulator [logger|timer] [--state FILE] [--frames DIR] [--pulse-at-boot]
//! ```
//!
//! | Option            | Effect                                                |
//! |-------------------|-------------------------------------------------------|
//! | `logger`          | Main logger board scenario (default)                  |
//! | `timer`           | Pulse-timer board, three cycles                       |
//! | `--state FILE`    | Store image to load and save (`hygro-sim.bin`)        |
//! | `--frames DIR`    | Write every rendered screen to `DIR` as PNG           |
//! | `--pulse-at-boot` | Hold the pulse line high at power-on                  |
//!
//! Set `RUST_LOG=debug` to see every logged sample.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use embassy_time::Duration;
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics_simulator::{
    BinaryColorTheme, OutputSettings, OutputSettingsBuilder, SimulatorDisplay,
};
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use hygro_core::config::{LifecycleConfig, PulseTimerConfig, SAMPLE_DEPTH};
use hygro_core::controller::{
    Board, Controller, HaltReason, LifecycleController, LoggerParts, PulseTimerController, Step,
};
use hygro_core::display::{GraphicsDisplay, Panel};
use hygro_core::hal::Clock;
use hygro_core::power::{PowerRail, TickCounter, WakeLatch, WakeSource};
use hygro_core::sensors::Reading;
use hygro_core::sim::{
    Event, SIM_STORE_SIZE, ScriptedWake, SimBus, SimClock, SimDelay, SimHarness, SimJournal,
    SimPin, SimResetCause, SimSensor, SimSleep, SimWatchdog,
};
use hygro_core::storage::MemStorage;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const PANEL_WIDTH_PX: u32 = 128;
const PANEL_HEIGHT_PX: u32 = 64;

/// Pixel scale of written PNG frames.
const FRAME_SCALE: u32 = 4;

/// Virtual time between two controller ticks.
const TICK: Duration = Duration::from_millis(50);

/// Reads of the pulse line during one 1.5 s pulse at the tick rate.
const PULSE_READS: u32 = 30;

const DEFAULT_STATE_FILE: &str = "hygro-sim.bin";

// ---------------------------------------------------------------------------
// Persisted state
// ---------------------------------------------------------------------------

/// Everything that survives a simulated power cycle.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SimImage {
    boots: u32,
    store: Vec<u8>,
}

impl SimImage {
    fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(_) => {
                info!("No state at {}, starting with an erased store", path.display());
                return Self::default();
            }
        };

        match postcard::from_bytes::<SimImage>(&bytes) {
            Ok(image) if image.store.len() == SIM_STORE_SIZE => image,
            Ok(image) => {
                warn!(
                    "Stored image is {} bytes, expected {}; starting erased",
                    image.store.len(),
                    SIM_STORE_SIZE
                );
                Self {
                    boots: image.boots,
                    store: Vec::new(),
                }
            }
            Err(e) => {
                warn!("Could not decode {}: {}", path.display(), e);
                Self::default()
            }
        }
    }

    fn storage(&self) -> MemStorage<SIM_STORE_SIZE> {
        if self.store.is_empty() {
            MemStorage::new()
        } else {
            MemStorage::from_image(&self.store)
        }
    }

    fn save(&self, path: &Path) {
        let bytes = match postcard::to_stdvec(self) {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Could not encode state: {}", e);
                return;
            }
        };
        if let Err(e) = std::fs::write(path, bytes) {
            error!("Could not write {}: {}", path.display(), e);
        }
    }
}

// ---------------------------------------------------------------------------
// Panel
// ---------------------------------------------------------------------------

/// 128x64 monochrome panel that optionally dumps each flushed frame as PNG.
struct PngPanel {
    display: SimulatorDisplay<BinaryColor>,
    settings: OutputSettings,
    frames_dir: Option<PathBuf>,
    frames: u32,
}

impl PngPanel {
    fn new(frames_dir: Option<PathBuf>) -> Self {
        Self {
            display: SimulatorDisplay::new(Size::new(PANEL_WIDTH_PX, PANEL_HEIGHT_PX)),
            settings: OutputSettingsBuilder::new()
                .scale(FRAME_SCALE)
                .theme(BinaryColorTheme::OledWhite)
                .build(),
            frames_dir,
            frames: 0,
        }
    }
}

impl OriginDimensions for PngPanel {
    fn size(&self) -> Size {
        self.display.size()
    }
}

impl DrawTarget for PngPanel {
    type Color = BinaryColor;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        self.display.draw_iter(pixels)
    }
}

impl Panel for PngPanel {
    type PanelError = String;

    fn init(&mut self) -> Result<(), Self::PanelError> {
        Ok(())
    }

    fn power_save(&mut self) -> Result<(), Self::PanelError> {
        self.display
            .clear(BinaryColor::Off)
            .map_err(|e| format!("{:?}", e))
    }

    fn flush(&mut self) -> Result<(), Self::PanelError> {
        let Some(dir) = &self.frames_dir else {
            return Ok(());
        };
        let path = dir.join(format!("frame-{:04}.png", self.frames));
        self.frames += 1;
        self.display
            .to_rgb_output_image(&self.settings)
            .save_png(&path)
            .map_err(|e| format!("{}: {}", path.display(), e))
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// Simulated logger board with a rendering display.
#[allow(dead_code, reason = "type-level peripheral set, never instantiated")]
struct DesktopBoard<'a>(PhantomData<&'a ()>);

impl<'a> Board for DesktopBoard<'a> {
    type Button = SimPin;
    type Pulse = SimPin;
    type Maintenance = SimPin;
    type Latch = SimPin;
    type Gate = SimPin;
    type Storage = MemStorage<SIM_STORE_SIZE>;
    type Sensor = SimSensor;
    type Display = GraphicsDisplay<PngPanel, BinaryColor>;
    type Sleep = SimSleep<'a>;
    type Bus = SimBus;
    type Watchdog = SimWatchdog;
    type Reset = SimResetCause;
    type Clock = SimClock;
    type Delay = SimDelay;
}

fn desktop_parts<'a>(
    rig: &SimHarness<'a>,
    storage: MemStorage<SIM_STORE_SIZE>,
    frames_dir: Option<PathBuf>,
    wake_latch: &'a WakeLatch,
    awake_ticks: &'a TickCounter,
) -> LoggerParts<'a, DesktopBoard<'a>> {
    LoggerParts {
        button: rig.button.clone(),
        pulse: rig.pulse.clone(),
        maintenance: rig.maintenance.clone(),
        latch: rig.latch.clone(),
        rail: PowerRail::new(rig.gate.clone()),
        storage,
        sensor: rig.sensor.clone(),
        display: GraphicsDisplay::new(PngPanel::new(frames_dir), BinaryColor::On, BinaryColor::Off),
        sleep: rig.sleep.clone(),
        bus: SimBus::new(&rig.journal),
        watchdog: rig.watchdog.clone(),
        reset: rig.reset.clone(),
        clock: rig.clock.clone(),
        delay: SimDelay::new(&rig.clock),
        wake_latch,
        awake_ticks,
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Input applied once the virtual clock passes `at` (time since boot).
#[derive(Debug, Clone, Copy)]
enum Input {
    Press,
    Pulse,
}

const AWAKE_SCRIPT: [(u64, Input); 4] = [
    (2_000, Input::Press),
    (3_000, Input::Press),
    (4_000, Input::Press),
    (5_000, Input::Pulse),
];

/// Wake edges delivered while asleep, in order.
fn sleep_script() -> [ScriptedWake; 3] {
    [
        ScriptedWake::new(Duration::from_secs(15 * 60), WakeSource::Pulse),
        ScriptedWake::new(Duration::from_secs(15 * 60), WakeSource::Pulse),
        ScriptedWake::new(Duration::from_secs(60 * 60), WakeSource::Button),
    ]
}

/// Slowly drifting room climate.
fn climate(clock: &SimClock) -> Reading {
    let t = clock.elapsed().as_secs() as f32;
    Reading::new(
        21.0 + 3.0 * (t / 1800.0).sin() + 0.3 * (t / 97.0).cos(),
        45.0 + 10.0 * (t / 2700.0).sin(),
    )
}

struct Options {
    timer: bool,
    state: PathBuf,
    frames: Option<PathBuf>,
    pulse_at_boot: bool,
}

fn parse_args() -> Options {
    let mut options = Options {
        timer: false,
        state: PathBuf::from(DEFAULT_STATE_FILE),
        frames: None,
        pulse_at_boot: false,
    };

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "logger" => options.timer = false,
            "timer" => options.timer = true,
            "--state" => match args.next() {
                Some(path) => options.state = PathBuf::from(path),
                None => warn!("--state needs a file name"),
            },
            "--frames" => match args.next() {
                Some(dir) => options.frames = Some(PathBuf::from(dir)),
                None => warn!("--frames needs a directory"),
            },
            "--pulse-at-boot" => options.pulse_at_boot = true,
            other => warn!("Ignoring unknown argument {:?}", other),
        }
    }
    options
}

fn run_logger(options: &Options) {
    let mut image = SimImage::load(&options.state);
    image.boots += 1;
    info!("Power cycle #{}", image.boots);

    if let Some(dir) = &options.frames
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        error!("Could not create {}: {}", dir.display(), e);
    }

    let wake_latch = WakeLatch::new();
    let awake_ticks = TickCounter::new();
    let rig = SimHarness::new(&wake_latch, &awake_ticks);
    for wake in sleep_script() {
        rig.sleep.push(wake);
    }
    let scripted_sleeps = rig.sleep.pending();
    if options.pulse_at_boot {
        rig.pulse.set(true);
    }

    let parts = desktop_parts(
        &rig,
        image.storage(),
        options.frames.clone(),
        &wake_latch,
        &awake_ticks,
    );
    let mut logger = LifecycleController::new(parts, LifecycleConfig::default());

    rig.sensor.set_reading(climate(&rig.clock));
    let mut step = logger.setup();
    let booted_at = rig.clock.now();
    let mut next_input = 0;
    let mut next_second = booted_at + Duration::from_secs(1);
    let mut sleeps = 0;

    while step == Step::Continue {
        if let Some(&(at, input)) = AWAKE_SCRIPT.get(next_input)
            && rig.clock.now() >= booted_at + Duration::from_millis(at)
        {
            match input {
                Input::Press => rig.button.hold_high_for(1),
                Input::Pulse => rig.pulse.hold_high_for(PULSE_READS),
            }
            next_input += 1;
        }

        rig.sensor.set_reading(climate(&rig.clock));
        step = logger.tick();

        let slept = rig.journal.count(&Event::Sleep);
        if slept != sleeps {
            sleeps = slept;
            // The on-time timer does not run while asleep
            next_second = rig.clock.now() + Duration::from_secs(1);
            if sleeps > scripted_sleeps {
                info!("No more wake edges scripted, device stays asleep");
                break;
            }
        }

        rig.clock.advance(TICK);
        while rig.clock.now() >= next_second {
            awake_ticks.tick();
            next_second += Duration::from_secs(1);
        }
    }

    if let Step::Halt(reason) = step {
        match reason {
            HaltReason::BootMeasurement => info!("Halted after boot measurement"),
            HaltReason::WatchdogTrap => warn!("Halted in watchdog trap"),
            HaltReason::AwakeLimit => warn!("Halted by the awake limit"),
        }
    }

    let mut temperatures = [0.0; SAMPLE_DEPTH];
    let mut humidities = [0.0; SAMPLE_DEPTH];
    let log = logger.log_mut();
    match (
        log.read_temperature_history(&mut temperatures),
        log.read_humidity_history(&mut humidities),
    ) {
        (Ok(()), Ok(())) => {
            info!("History, oldest first:");
            for (t, h) in temperatures.iter().zip(&humidities) {
                info!("  {:6.2} C  {:6.2} %RH", t, h);
            }
        }
        (Err(e), _) | (_, Err(e)) => error!("Could not read history: {}", e),
    }

    info!(
        "Virtual time elapsed: {} s, {} store writes",
        rig.clock.elapsed().as_secs(),
        logger.log().storage().write_count()
    );
    image.store = logger.log().storage().as_bytes().to_vec();
    image.save(&options.state);
}

fn run_timer() {
    let wake_latch = WakeLatch::new();
    let journal = SimJournal::new();
    let clock = SimClock::new();
    let line = SimPin::traced(false, "pulse", &journal);
    let mut timer = PulseTimerController::new(
        line,
        SimSleep::new(&wake_latch, &clock, &journal),
        SimDelay::new(&clock),
        PulseTimerConfig::default(),
    );

    timer.setup();
    for _ in 0..3 {
        timer.tick();
    }
    for event in journal.events() {
        info!("{:?}", event);
    }
    info!(
        "{} pulses in {} ms",
        timer.pulses(),
        clock.elapsed().as_millis()
    );
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    info!("Starting hygro simulator");

    let options = parse_args();
    if options.timer {
        run_timer();
    } else {
        run_logger(&options);
    }

    info!("Simulator exiting");
}
