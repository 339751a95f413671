//! Pin map and peripheral types of the hygro boards

use esp_hal::Blocking;
use esp_hal::i2c::master::I2c;

#[cfg(feature = "board-logger")]
pub use logger::LoggerBoard;

/// GPIO numbers of the lines wired to the gated rail, needed for the raw bus
/// hand-off. They must match the pins handed to the drivers in `main`.
pub const I2C_SDA_GPIO: u8 = 8;
pub const I2C_SCL_GPIO: u8 = 9;
pub const SPI_SCK_GPIO: u8 = 12;
pub const SPI_MOSI_GPIO: u8 = 11;
pub const TFT_CS_GPIO: u8 = 10;
pub const TFT_DC_GPIO: u8 = 13;

pub const GATED_BUS_LINES: usize = 6;

/// Lines floated while the rail is off: the sensor's I2C pair, then the
/// display's SPI clock and data, then its chip select and data/command.
pub const GATED_BUS_GPIOS: [u8; GATED_BUS_LINES] = [
    I2C_SDA_GPIO,
    I2C_SCL_GPIO,
    SPI_SCK_GPIO,
    SPI_MOSI_GPIO,
    TFT_CS_GPIO,
    TFT_DC_GPIO,
];

const fn floats(pin: u8) -> bool {
    let mut i = 0;
    while i < GATED_BUS_GPIOS.len() {
        if GATED_BUS_GPIOS[i] == pin {
            return true;
        }
        i += 1;
    }
    false
}

// A gated device left with a driven line is back-powered through it
const _: () = assert!(
    floats(I2C_SDA_GPIO)
        && floats(I2C_SCL_GPIO)
        && floats(SPI_SCK_GPIO)
        && floats(SPI_MOSI_GPIO)
        && floats(TFT_CS_GPIO)
        && floats(TFT_DC_GPIO),
    "every line of the gated rail must be released before the cut"
);

/// Flash window holding the sample log, past the end of the factory app.
pub const LOG_STORE_OFFSET: u32 = 0x3F_0000;
pub const LOG_STORE_SIZE: u32 = 0x1000;

pub type SensorBus = I2c<'static, Blocking>;

#[cfg(feature = "board-logger")]
mod logger {
    use embedded_graphics::pixelcolor::Rgb565;
    use esp_hal::delay::Delay;
    use esp_hal::gpio::{Input, Output};
    use hygro_core::controller::Board;
    use hygro_core::display::GraphicsDisplay;
    use hygro_core::sensors::SHT40Sensor;

    use super::{GATED_BUS_LINES, SensorBus};
    use crate::bus::BusPins;
    use crate::irq::WakeLine;
    use crate::panel::TftPanel;
    use crate::platform::{ChipResetCause, FlashRegion, LightSleep, MwdtWatchdog, SystemClock};

    /// Main logger board: SHT40 and ST7735S on a gated rail, button and pulse
    /// wake lines, power latch.
    pub struct LoggerBoard;

    impl Board for LoggerBoard {
        type Button = WakeLine;
        type Pulse = WakeLine;
        type Maintenance = Input<'static>;
        type Latch = Output<'static>;
        type Gate = Output<'static>;
        type Storage = FlashRegion<'static>;
        type Sensor = SHT40Sensor<SensorBus, Delay>;
        type Display = GraphicsDisplay<TftPanel, Rgb565>;
        type Sleep = LightSleep<'static>;
        type Bus = BusPins<GATED_BUS_LINES>;
        type Watchdog = MwdtWatchdog;
        type Reset = ChipResetCause;
        type Clock = SystemClock;
        type Delay = Delay;
    }
}
