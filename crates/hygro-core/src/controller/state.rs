//! State owned by the logger board's lifecycle controller.

use embassy_time::Instant;

use crate::display::ChartKind;
use crate::storage::Channel;

/// Whether, and where, a measurement was taken this awake cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MeasurementState {
    #[default]
    NoMeasurement,
    /// Requested by the pulse line while the device was off or asleep
    MeasureOnStart,
    /// Requested by the pulse line while the main loop was running
    MeasureInMain,
}

/// Screen currently shown; the button cycles through them in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScreenState {
    #[default]
    Main,
    TempGraph,
    HumidityGraph,
}

impl ScreenState {
    pub const fn next(self) -> Self {
        match self {
            Self::Main => Self::TempGraph,
            Self::TempGraph => Self::HumidityGraph,
            Self::HumidityGraph => Self::Main,
        }
    }

    /// History plotted by a graph screen, `None` for the main screen.
    pub const fn chart(self) -> Option<(Channel, ChartKind)> {
        match self {
            Self::Main => None,
            Self::TempGraph => Some((Channel::Temperature, ChartKind::Temperature)),
            Self::HumidityGraph => Some((Channel::Humidity, ChartKind::Humidity)),
        }
    }
}

/// Instants of the last event of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamps {
    pub last_activity: Instant,
    pub last_display: Instant,
    pub last_button: Instant,
    /// Last accepted pulse edge, `None` until one is seen this awake cycle
    pub last_pulse: Option<Instant>,
}

impl Timestamps {
    pub const fn new(now: Instant) -> Self {
        Self {
            last_activity: now,
            last_display: now,
            last_button: now,
            last_pulse: None,
        }
    }

    pub fn reset(&mut self, now: Instant) {
        *self = Self::new(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_cycle_wraps() {
        let mut screen = ScreenState::default();
        let mut seen = [ScreenState::Main; 4];
        for slot in seen.iter_mut() {
            *slot = screen;
            screen = screen.next();
        }
        assert_eq!(
            seen,
            [
                ScreenState::Main,
                ScreenState::TempGraph,
                ScreenState::HumidityGraph,
                ScreenState::Main
            ]
        );
        assert_eq!(ScreenState::Main.chart(), None);
    }

    #[test]
    fn test_reset_forgets_the_last_pulse() {
        let mut times = Timestamps::new(Instant::from_millis(0));
        times.last_pulse = Some(Instant::from_millis(40));
        times.reset(Instant::from_millis(900));
        assert_eq!(times.last_pulse, None);
        assert_eq!(times.last_button, Instant::from_millis(900));
    }
}
