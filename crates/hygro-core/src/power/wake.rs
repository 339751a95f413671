//! Interrupt-visible wake state
//!
//! Interrupt handlers only ever touch the two cells defined here: the
//! [`WakeLatch`] written by the wake-edge handlers and the [`TickCounter`]
//! advanced by the periodic 1 Hz timer. All decisions are made by the main
//! tick after it observes them.

use core::sync::atomic::{AtomicU8, AtomicU32, Ordering};

/// A line that can bring the device out of deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    Button,
    Pulse,
}

/// Why the last sleep cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WakeReason {
    #[default]
    None,
    Button,
    Pulse,
}

impl From<WakeSource> for WakeReason {
    fn from(source: WakeSource) -> Self {
        match source {
            WakeSource::Button => Self::Button,
            WakeSource::Pulse => Self::Pulse,
        }
    }
}

impl WakeReason {
    const fn to_raw(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Button => 1,
            Self::Pulse => 2,
        }
    }

    const fn from_raw(raw: u8) -> Self {
        match raw {
            1 => Self::Button,
            2 => Self::Pulse,
            _ => Self::None,
        }
    }
}

/// Set of lines armed as rising-edge wake sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeSources {
    pub button: bool,
    pub pulse: bool,
}

impl WakeSources {
    pub const NONE: Self = Self {
        button: false,
        pulse: false,
    };
    pub const BUTTON: Self = Self {
        button: true,
        pulse: false,
    };
    pub const PULSE: Self = Self {
        button: false,
        pulse: true,
    };
    pub const ALL: Self = Self {
        button: true,
        pulse: true,
    };

    pub const fn contains(&self, source: WakeSource) -> bool {
        match source {
            WakeSource::Button => self.button,
            WakeSource::Pulse => self.pulse,
        }
    }

    pub const fn is_empty(&self) -> bool {
        !self.button && !self.pulse
    }
}

/// Single-slot record of which wake edge fired.
///
/// Only one reason is kept per sleep cycle; when two edges fire before the
/// main loop resumes, the last writer wins.
#[derive(Debug, Default)]
pub struct WakeLatch {
    reason: AtomicU8,
}

impl WakeLatch {
    pub const fn new() -> Self {
        Self {
            reason: AtomicU8::new(0),
        }
    }

    /// Called from the wake-edge interrupt handler. Does nothing else.
    #[inline]
    pub fn record(&self, source: WakeSource) {
        self.reason
            .store(WakeReason::from(source).to_raw(), Ordering::Release);
    }

    /// Current reason without consuming it.
    pub fn peek(&self) -> WakeReason {
        WakeReason::from_raw(self.reason.load(Ordering::Acquire))
    }

    /// Consume the recorded reason, leaving [`WakeReason::None`].
    pub fn take(&self) -> WakeReason {
        WakeReason::from_raw(self.reason.swap(0, Ordering::AcqRel))
    }

    pub fn clear(&self) {
        self.reason.store(0, Ordering::Release);
    }
}

/// Seconds awake, counted by the periodic timer interrupt.
#[derive(Debug, Default)]
pub struct TickCounter {
    ticks: AtomicU32,
}

impl TickCounter {
    pub const fn new() -> Self {
        Self {
            ticks: AtomicU32::new(0),
        }
    }

    /// Called from the periodic timer interrupt.
    #[inline]
    pub fn tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u32 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn reset(&self) {
        self.ticks.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_defaults_to_none() {
        let latch = WakeLatch::new();
        assert_eq!(latch.peek(), WakeReason::None);
        assert_eq!(latch.take(), WakeReason::None);
    }

    #[test]
    fn test_latch_records_and_consumes() {
        let latch = WakeLatch::new();
        latch.record(WakeSource::Button);
        assert_eq!(latch.peek(), WakeReason::Button);
        assert_eq!(latch.take(), WakeReason::Button);
        assert_eq!(latch.take(), WakeReason::None);

        latch.record(WakeSource::Pulse);
        assert_eq!(latch.take(), WakeReason::Pulse);
    }

    #[test]
    fn test_latch_last_writer_wins() {
        let latch = WakeLatch::new();
        latch.record(WakeSource::Button);
        latch.record(WakeSource::Pulse);
        assert_eq!(latch.take(), WakeReason::Pulse);
    }

    #[test]
    fn test_tick_counter() {
        let ticks = TickCounter::new();
        for _ in 0..3 {
            ticks.tick();
        }
        assert_eq!(ticks.count(), 3);
        ticks.reset();
        assert_eq!(ticks.count(), 0);
    }

    #[test]
    fn test_wake_sources() {
        assert!(WakeSources::ALL.contains(WakeSource::Pulse));
        assert!(!WakeSources::BUTTON.contains(WakeSource::Pulse));
        assert!(WakeSources::NONE.is_empty());
    }
}
