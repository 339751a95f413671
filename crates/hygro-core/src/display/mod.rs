//! Display interface and the embedded-graphics renderer

mod renderer;

pub use renderer::*;

/// Which history a chart screen plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Temperature,
    Humidity,
}

impl ChartKind {
    pub const fn title(self) -> &'static str {
        match self {
            Self::Temperature => "TEMP",
            Self::Humidity => "HUMID",
        }
    }
}

/// The screen on the gated bus.
pub trait Display {
    /// (Re)initialise after power-up or wake.
    fn setup(&mut self);

    /// Current temperature (°C) and humidity (%RH).
    fn display_main(&mut self, temperature: f32, humidity: f32);

    /// Bar chart of a history, oldest value first.
    fn display_chart(&mut self, history: &[f32], kind: ChartKind);

    /// Blank the panel and enter its power-save mode.
    fn power_down(&mut self);
}
