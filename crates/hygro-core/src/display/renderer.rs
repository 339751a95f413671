//! Main screen and history chart drawn with embedded-graphics.
//!
//! Layout scales with the panel's bounding box. On the 128x64 reference panel
//! the chart uses a 16 px label column, a 10 px title band and one 3 px bar
//! per history slot.

use core::fmt::{Debug, Write};

use embedded_graphics::mono_font::MonoTextStyle;
use embedded_graphics::mono_font::iso_8859_1::{FONT_6X10, FONT_10X20};
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{Line, PrimitiveStyle, Rectangle};
use embedded_graphics::text::{Baseline, Text};
use heapless::String;
use log::{debug, error, warn};

use super::{ChartKind, Display};

/// Width of the axis-label column on the chart screen.
const LABEL_COLUMN_PX: i32 = 16;

/// Height of the title band above the plot area.
const TITLE_BAND_PX: i32 = 10;

/// Range the main screen can show in its value field.
const SHOWN_TEMPERATURE: (f32, f32) = (-99.9, 999.9);

/// Replace `text` with the formatted arguments, logging if it does not fit.
fn set_text<const N: usize>(text: &mut String<N>, args: core::fmt::Arguments<'_>) {
    text.clear();
    if text.write_fmt(args).is_err() {
        warn!("Label truncated to {:?}", text.as_str());
    }
}

fn temperature_text(temperature: f32) -> String<16> {
    let mut text = String::new();
    let (lo, hi) = SHOWN_TEMPERATURE;
    set_text(&mut text, format_args!("{:.1}\u{b0}C", temperature.clamp(lo, hi)));
    text
}

fn humidity_text(humidity: f32) -> String<16> {
    let mut text = String::new();
    set_text(&mut text, format_args!("{:.1}%", humidity.clamp(0.0, 100.0)));
    text
}

/// Power and refresh control of a panel, next to its `DrawTarget` side.
pub trait Panel {
    type PanelError: Debug;

    /// Run the controller's init sequence (also used after wake).
    fn init(&mut self) -> Result<(), Self::PanelError>;

    /// Enter the controller's power-save mode.
    fn power_save(&mut self) -> Result<(), Self::PanelError>;

    /// Push buffered pixels to the glass. Unbuffered panels do nothing.
    fn flush(&mut self) -> Result<(), Self::PanelError> {
        Ok(())
    }
}

/// [`Display`] implementation for any panel that embedded-graphics can draw on.
pub struct GraphicsDisplay<D, C> {
    target: D,
    foreground: C,
    background: C,
}

impl<D, C> GraphicsDisplay<D, C>
where
    D: DrawTarget<Color = C> + Panel,
    D::Error: Debug,
    C: PixelColor,
{
    pub fn new(target: D, foreground: C, background: C) -> Self {
        Self {
            target,
            foreground,
            background,
        }
    }

    pub fn target(&self) -> &D {
        &self.target
    }

    pub fn target_mut(&mut self) -> &mut D {
        &mut self.target
    }

    fn draw_main(&mut self, temperature: f32, humidity: f32) -> Result<(), D::Error> {
        let area = self.target.bounding_box();
        let label = MonoTextStyle::new(&FONT_6X10, self.foreground);
        let value = MonoTextStyle::new(&FONT_10X20, self.foreground);
        let half = area.size.height as i32 / 2;

        self.target.clear(self.background)?;

        let text = temperature_text(temperature);
        Text::with_baseline("T", area.top_left, label, Baseline::Top).draw(&mut self.target)?;
        Text::with_baseline(
            &text,
            area.top_left + Point::new(12, 0),
            value,
            Baseline::Top,
        )
        .draw(&mut self.target)?;

        let text = humidity_text(humidity);
        Text::with_baseline(
            "H",
            area.top_left + Point::new(0, half),
            label,
            Baseline::Top,
        )
        .draw(&mut self.target)?;
        Text::with_baseline(
            &text,
            area.top_left + Point::new(12, half),
            value,
            Baseline::Top,
        )
        .draw(&mut self.target)?;

        Ok(())
    }

    fn draw_chart(&mut self, history: &[f32], kind: ChartKind) -> Result<(), D::Error> {
        let area = self.target.bounding_box();
        let origin = area.top_left;
        let width = area.size.width as i32;
        let height = area.size.height as i32;
        let bottom = origin.y + height - 1;
        let stroke = PrimitiveStyle::with_stroke(self.foreground, 1);
        let fill = PrimitiveStyle::with_fill(self.foreground);
        let small = MonoTextStyle::new(&FONT_6X10, self.foreground);

        self.target.clear(self.background)?;

        let (lo, hi) = history
            .iter()
            .fold((f32::MAX, f32::MIN), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let spread = hi - lo;

        let plot_left = origin.x + LABEL_COLUMN_PX;
        let plot_top = origin.y + TITLE_BAND_PX;
        let max_bar = (bottom - plot_top).max(0);

        if !history.is_empty() {
            let slot = ((width - LABEL_COLUMN_PX) / history.len() as i32).max(1);
            let bar_width = (slot - 1).max(1) as u32;

            for (i, &value) in history.iter().enumerate() {
                let fraction = if spread > 0.0 {
                    (value - lo) / spread
                } else {
                    0.0
                };
                let bar = ((fraction * max_bar as f32) as i32).clamp(0, max_bar);
                if bar == 0 {
                    continue;
                }
                let x = plot_left + 1 + i as i32 * slot;
                Rectangle::new(
                    Point::new(x, bottom - bar + 1),
                    Size::new(bar_width, bar as u32),
                )
                .into_styled(fill)
                .draw(&mut self.target)?;
            }

            let mut label: String<12> = String::new();
            set_text(&mut label, format_args!("{}", hi as i32));
            Text::with_baseline(
                &label,
                Point::new(origin.x, plot_top + 2),
                small,
                Baseline::Top,
            )
            .draw(&mut self.target)?;

            set_text(&mut label, format_args!("{}", lo as i32));
            Text::with_baseline(&label, Point::new(origin.x, bottom), small, Baseline::Bottom)
                .draw(&mut self.target)?;
        }

        let title = kind.title();
        let title_width = title.len() as i32 * 6;
        let title_x = plot_left + (width - LABEL_COLUMN_PX - title_width) / 2;
        Text::with_baseline(title, Point::new(title_x, origin.y), small, Baseline::Top)
            .draw(&mut self.target)?;

        let right = origin.x + width - 1;
        Line::new(Point::new(plot_left, bottom), Point::new(plot_left, origin.y))
            .into_styled(stroke)
            .draw(&mut self.target)?;
        Line::new(Point::new(origin.x, bottom), Point::new(right, bottom))
            .into_styled(stroke)
            .draw(&mut self.target)?;
        Line::new(Point::new(plot_left, plot_top), Point::new(right, plot_top))
            .into_styled(stroke)
            .draw(&mut self.target)?;

        Ok(())
    }

    fn flush(&mut self) {
        if let Err(e) = self.target.flush() {
            error!("Display flush failed: {:?}", e);
        }
    }
}

impl<D, C> Display for GraphicsDisplay<D, C>
where
    D: DrawTarget<Color = C> + Panel,
    D::Error: Debug,
    C: PixelColor,
{
    fn setup(&mut self) {
        if let Err(e) = self.target.init() {
            error!("Display init failed: {:?}", e);
        }
    }

    fn display_main(&mut self, temperature: f32, humidity: f32) {
        if let Err(e) = self.draw_main(temperature, humidity) {
            error!("Drawing main screen failed: {:?}", e);
            return;
        }
        self.flush();
    }

    fn display_chart(&mut self, history: &[f32], kind: ChartKind) {
        if let Err(e) = self.draw_chart(history, kind) {
            error!("Drawing {:?} chart failed: {:?}", kind, e);
            return;
        }
        self.flush();
    }

    fn power_down(&mut self) {
        debug!("Display entering power save");
        if let Err(e) = self.target.power_save() {
            error!("Display power save failed: {:?}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use embedded_graphics::mock_display::MockDisplay;
    use embedded_graphics::pixelcolor::BinaryColor;

    struct TestPanel {
        display: MockDisplay<BinaryColor>,
        inits: usize,
        asleep: bool,
    }

    impl TestPanel {
        fn new() -> Self {
            let mut display = MockDisplay::new();
            display.set_allow_overdraw(true);
            display.set_allow_out_of_bounds_drawing(true);
            Self {
                display,
                inits: 0,
                asleep: false,
            }
        }

        fn lit(&self, x: i32, y: i32) -> bool {
            self.display.get_pixel(Point::new(x, y)) == Some(BinaryColor::On)
        }
    }

    impl OriginDimensions for TestPanel {
        fn size(&self) -> Size {
            self.display.size()
        }
    }

    impl DrawTarget for TestPanel {
        type Color = BinaryColor;
        type Error = core::convert::Infallible;

        fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
        where
            I: IntoIterator<Item = Pixel<Self::Color>>,
        {
            self.display.draw_iter(pixels)
        }
    }

    impl Panel for TestPanel {
        type PanelError = core::convert::Infallible;

        fn init(&mut self) -> Result<(), Self::PanelError> {
            self.inits += 1;
            self.asleep = false;
            Ok(())
        }

        fn power_save(&mut self) -> Result<(), Self::PanelError> {
            self.asleep = true;
            Ok(())
        }
    }

    fn display() -> GraphicsDisplay<TestPanel, BinaryColor> {
        GraphicsDisplay::new(TestPanel::new(), BinaryColor::On, BinaryColor::Off)
    }

    #[test]
    fn test_setup_and_power_down() {
        let mut display = display();
        display.setup();
        display.power_down();
        assert_eq!(display.target().inits, 1);
        assert!(display.target().asleep);
        display.setup();
        assert!(!display.target().asleep);
    }

    #[test]
    fn test_main_screen_draws_both_rows() {
        let mut display = display();
        display.display_main(21.4, 48.0);
        let panel = display.target();
        let top = (0..64).any(|x| (0..20).any(|y| panel.lit(x, y)));
        let bottom = (0..64).any(|x| (32..52).any(|y| panel.lit(x, y)));
        assert!(top && bottom);
    }

    #[test]
    fn test_chart_scales_bars_between_min_and_max() {
        let mut display = display();
        let history = [10.0, 20.0, 30.0, 40.0];
        display.display_chart(&history, ChartKind::Temperature);
        let panel = display.target();

        // 48 px plot width / 4 slots = 12 px per slot, bars start at x = 17
        let first_bar_x = 17 + 5;
        let last_bar_x = 17 + 3 * 12 + 5;
        // Lowest value has no bar above the x axis
        assert!(!panel.lit(first_bar_x, 62));
        // Highest value reaches just below the top cap
        assert!(panel.lit(last_bar_x, 62));
        assert!(panel.lit(last_bar_x, 12));
        // Axes
        assert!(panel.lit(16, 40));
        assert!(panel.lit(40, 63));
    }

    #[test]
    fn test_out_of_range_values_are_clamped_before_formatting() {
        assert_eq!(temperature_text(1.0e30).as_str(), "999.9\u{b0}C");
        assert_eq!(temperature_text(-1.0e30).as_str(), "-99.9\u{b0}C");
        assert_eq!(temperature_text(21.44).as_str(), "21.4\u{b0}C");
        assert_eq!(humidity_text(250.0).as_str(), "100.0%");
    }

    #[test]
    fn test_huge_history_values_still_draw_labels() {
        let mut display = display();
        display.display_chart(&[-3.0e9, 3.0e9], ChartKind::Temperature);
        let panel = display.target();
        // Max label in the label column
        assert!((0..16).any(|x| (12..22).any(|y| panel.lit(x, y))));
    }

    #[test]
    fn test_flat_history_draws_no_bars() {
        let mut display = display();
        display.display_chart(&[0.0; 28], ChartKind::Humidity);
        let panel = display.target();
        // Column inside the plot, away from the labels and the axes
        assert!((12..62).all(|y| !panel.lit(40, y)));
    }
}
