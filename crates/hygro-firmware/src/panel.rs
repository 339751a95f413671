//! ST7735S TFT on SPI2, drawn through `hygro-core`'s graphics renderer

use embedded_graphics::pixelcolor::Rgb565;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::Rectangle;
use embedded_hal_bus::spi::{ExclusiveDevice, NoDelay};
use esp_hal::Blocking;
use esp_hal::delay::Delay;
use esp_hal::gpio::Output;
use esp_hal::spi::master::Spi;
use hygro_core::display::Panel;
use log::warn;
use mipidsi::interface::SpiInterface;
use mipidsi::models::ST7735s;
use mipidsi::options::ColorInversion;
use mipidsi::{Builder as MipidsiBuilder, NoResetPin};

pub const DISPLAY_WIDTH: u16 = 128;
pub const DISPLAY_HEIGHT: u16 = 160;

type DisplaySpi = ExclusiveDevice<Spi<'static, Blocking>, Output<'static>, NoDelay>;
type Interface = SpiInterface<'static, DisplaySpi, Output<'static>>;
type Tft = mipidsi::Display<Interface, ST7735s, NoResetPin>;

pub type TftError = <Tft as DrawTarget>::Error;

/// The panel loses its configuration whenever the gated rail is cut, so
/// [`init`](Panel::init) runs the full mipidsi init sequence every time.
pub struct TftPanel {
    display: Option<Tft>,
    delay: Delay,
}

impl TftPanel {
    pub fn new(interface: Interface, delay: Delay) -> Self {
        let mut panel = Self {
            display: None,
            delay,
        };
        panel.build(interface);
        panel
    }

    fn build(&mut self, interface: Interface) {
        match MipidsiBuilder::new(ST7735s, interface)
            .display_size(DISPLAY_WIDTH, DISPLAY_HEIGHT)
            .invert_colors(ColorInversion::Normal)
            .init(&mut self.delay)
        {
            Ok(display) => self.display = Some(display),
            // The interface moved into the failed builder; the panel stays dark
            // until the next reset.
            Err(e) => warn!("Display init failed: {:?}", e),
        }
    }
}

impl Panel for TftPanel {
    type PanelError = TftError;

    fn init(&mut self) -> Result<(), Self::PanelError> {
        if let Some(display) = self.display.take() {
            let (interface, _model, _rst) = display.release();
            self.build(interface);
        }
        Ok(())
    }

    fn power_save(&mut self) -> Result<(), Self::PanelError> {
        match self.display.as_mut() {
            Some(display) => display.sleep(&mut self.delay),
            None => Ok(()),
        }
    }
}

impl OriginDimensions for TftPanel {
    fn size(&self) -> Size {
        Size::new(DISPLAY_WIDTH as u32, DISPLAY_HEIGHT as u32)
    }
}

impl DrawTarget for TftPanel {
    type Color = Rgb565;
    type Error = TftError;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        match self.display.as_mut() {
            Some(display) => display.draw_iter(pixels),
            None => Ok(()),
        }
    }

    fn fill_solid(&mut self, area: &Rectangle, color: Self::Color) -> Result<(), Self::Error> {
        match self.display.as_mut() {
            Some(display) => display.fill_solid(area, color),
            None => Ok(()),
        }
    }

    fn clear(&mut self, color: Self::Color) -> Result<(), Self::Error> {
        match self.display.as_mut() {
            Some(display) => display.clear(color),
            None => Ok(()),
        }
    }
}
