#![no_std]
#![no_main]
#![deny(
    clippy::mem_forget,
    reason = "mem::forget is generally not safe to do with esp_hal types, especially those \
    holding buffers for the duration of a data transfer."
)]
#![deny(clippy::large_stack_frames)]

#[cfg(any(
    all(feature = "board-logger", feature = "board-pulse-timer"),
    not(any(feature = "board-logger", feature = "board-pulse-timer"))
))]
compile_error!("select exactly one of `board-logger` and `board-pulse-timer`");

use esp_hal::clock::CpuClock;
use esp_hal::delay::Delay;
use log::{LevelFilter, info};

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    rtt_target::rprintln!("PANIC: {}", info);
    loop {}
}

// This creates a default app-descriptor required by the esp-idf bootloader.
// For more information see: <https://docs.espressif.com/projects/esp-idf/en/stable/esp32/api-reference/system/app_image_format.html#application-description>
esp_bootloader_esp_idf::esp_app_desc!();

#[allow(
    clippy::large_stack_frames,
    reason = "the controller owns every peripheral driver for the life of the program"
)]
#[esp_hal::main]
fn main() -> ! {
    rtt_target::rtt_init_log!(LevelFilter::Info);

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::_80MHz);
    let peripherals = esp_hal::init(config);

    #[cfg(feature = "board-logger")]
    let reason = logger::start(peripherals);

    #[cfg(feature = "board-pulse-timer")]
    let reason = pulse_timer::start(peripherals);

    info!("Controller halted: {:?}", reason);

    // Power is gone once the latch drops; park in case the supply lingers.
    let delay = Delay::new();
    loop {
        delay.delay_millis(1000);
    }
}

#[cfg(feature = "board-logger")]
mod logger {
    use embedded_graphics::pixelcolor::Rgb565;
    use embedded_graphics::prelude::RgbColor;
    use embedded_hal_bus::spi::ExclusiveDevice;
    use esp_hal::delay::Delay;
    use esp_hal::gpio::{Input, InputConfig, Io, Level, Output, OutputConfig, Pull};
    use esp_hal::i2c::master::{Config as I2cConfig, I2c};
    use esp_hal::peripherals::Peripherals;
    use esp_hal::rtc_cntl::Rtc;
    use esp_hal::spi::master::{Config as SpiConfig, Spi};
    use esp_hal::time::Rate;
    use esp_hal::timer::PeriodicTimer;
    use esp_hal::timer::timg::TimerGroup;
    use esp_storage::FlashStorage;
    use hygro_core::config::LifecycleConfig;
    use hygro_core::controller::{HaltReason, LifecycleController, LoggerParts, run};
    use hygro_core::display::GraphicsDisplay;
    use hygro_core::power::{PowerRail, WakeSource};
    use hygro_core::sensors::SHT40Sensor;
    use hygro_firmware::board::{GATED_BUS_GPIOS, LOG_STORE_OFFSET, LOG_STORE_SIZE, LoggerBoard};
    use hygro_firmware::bus::BusPins;
    use hygro_firmware::irq;
    use hygro_firmware::panel::TftPanel;
    use hygro_firmware::platform::{
        ChipResetCause, FlashRegion, LightSleep, MwdtWatchdog, SystemClock,
    };
    use log::info;
    use mipidsi::interface::SpiInterface;
    use static_cell::StaticCell;

    static SPI_BUFFER: StaticCell<[u8; 512]> = StaticCell::new();

    pub fn start(peripherals: Peripherals) -> HaltReason {
        // Hold the supply on before anything else; the power button only
        // bridges the latch for as long as it is pressed.
        let latch = Output::new(peripherals.GPIO7, Level::High, OutputConfig::default());
        let reset = ChipResetCause::read();

        // Wake lines are owned by the edge handler from here on
        let mut io = Io::new(peripherals.IO_MUX);
        io.set_interrupt_handler(irq::wake_edge);
        let wake_config = InputConfig::default().with_pull(Pull::Down);
        let button = irq::install_wake_line(
            WakeSource::Button,
            Input::new(peripherals.GPIO4, wake_config),
        );
        let pulse = irq::install_wake_line(
            WakeSource::Pulse,
            Input::new(peripherals.GPIO5, wake_config),
        );
        let maintenance = Input::new(
            peripherals.GPIO6,
            InputConfig::default().with_pull(Pull::Up),
        );

        // P-channel high-side switch: low turns the rail on
        let gate = Output::new(peripherals.GPIO15, Level::High, OutputConfig::default());

        let delay = Delay::new();

        let i2c = I2c::new(
            peripherals.I2C0,
            I2cConfig::default().with_frequency(Rate::from_khz(100)),
        )
        .expect("Failed to configure I2C")
        .with_sda(peripherals.GPIO8)
        .with_scl(peripherals.GPIO9);
        let sensor = SHT40Sensor::new(i2c, delay);

        let spi_bus = Spi::new(
            peripherals.SPI2,
            SpiConfig::default().with_frequency(Rate::from_mhz(20)),
        )
        .expect("Failed to configure SPI")
        .with_sck(peripherals.GPIO12)
        .with_mosi(peripherals.GPIO11);
        let cs = Output::new(peripherals.GPIO10, Level::High, OutputConfig::default());
        let spi_device =
            ExclusiveDevice::new_no_delay(spi_bus, cs).expect("Failed to create SPI device");
        let dc = Output::new(peripherals.GPIO13, Level::Low, OutputConfig::default());
        let di = SpiInterface::new(spi_device, dc, SPI_BUFFER.init([0; 512]));
        let display = GraphicsDisplay::new(
            TftPanel::new(di, delay),
            Rgb565::WHITE,
            Rgb565::BLACK,
        );

        let timg0 = TimerGroup::new(peripherals.TIMG0);
        let watchdog = MwdtWatchdog::new(timg0.wdt);
        let timg1 = TimerGroup::new(peripherals.TIMG1);
        irq::start_awake_timer(PeriodicTimer::new(timg1.timer0));

        let storage = FlashRegion::new(
            FlashStorage::new(peripherals.FLASH),
            LOG_STORE_OFFSET,
            LOG_STORE_SIZE,
        );

        let parts = LoggerParts::<LoggerBoard> {
            button,
            pulse,
            maintenance,
            latch,
            rail: PowerRail::new(gate),
            storage,
            sensor,
            display,
            sleep: LightSleep::new(Rtc::new(peripherals.LPWR)),
            bus: BusPins::new(GATED_BUS_GPIOS),
            watchdog,
            reset,
            clock: SystemClock,
            delay,
            wake_latch: &irq::WAKE_LATCH,
            awake_ticks: &irq::AWAKE_TICKS,
        };

        info!("Logger board initialized");
        let mut controller = LifecycleController::new(parts, LifecycleConfig::default());
        run(&mut controller)
    }
}

#[cfg(feature = "board-pulse-timer")]
mod pulse_timer {
    use esp_hal::delay::Delay;
    use esp_hal::gpio::{Level, Output, OutputConfig};
    use esp_hal::peripherals::Peripherals;
    use esp_hal::rtc_cntl::Rtc;
    use hygro_core::config::PulseTimerConfig;
    use hygro_core::controller::{HaltReason, PulseTimerController, run};
    use hygro_firmware::platform::TimerSleep;
    use log::info;

    pub fn start(peripherals: Peripherals) -> HaltReason {
        // Same PCB as the logger; the supply stays latched while the timer runs
        let _latch = Output::new(peripherals.GPIO7, Level::High, OutputConfig::default());

        let line = Output::new(peripherals.GPIO5, Level::Low, OutputConfig::default());
        let sleep = TimerSleep::new(Rtc::new(peripherals.LPWR));

        info!("Pulse timer board initialized");
        let mut controller =
            PulseTimerController::new(line, sleep, Delay::new(), PulseTimerConfig::default());
        run(&mut controller)
    }
}
