//! ESP32-S3 implementations of the `hygro-core` platform seams

use embassy_time::Instant;
use embedded_storage::{ReadStorage, Storage};
use esp_hal::peripherals::TIMG0;
use esp_hal::rtc_cntl::sleep::{GpioWakeupSource, TimerWakeupSource};
use esp_hal::rtc_cntl::{Rtc, SocResetReason, reset_reason};
use esp_hal::system::Cpu;
use esp_hal::timer::timg::{MwdtStage, Wdt};
use esp_storage::{FlashStorage, FlashStorageError};
use hygro_core::hal::{Clock, ResetCause, SleepDriver, TimedSleep, Watchdog};
use hygro_core::power::{WakeReason, WakeSource, WakeSources};
use log::{debug, info, warn};
use thiserror_no_std::Error;

use crate::irq;

// ---------------------------------------------------------------------------
// Sleep
// ---------------------------------------------------------------------------

/// Light sleep with GPIO wake on the button and pulse lines.
///
/// Light sleep keeps RAM and the CPU state, so [`sleep`](SleepDriver::sleep)
/// returns to the caller instead of rebooting.
pub struct LightSleep<'d> {
    rtc: Rtc<'d>,
    armed: WakeSources,
}

impl<'d> LightSleep<'d> {
    pub fn new(rtc: Rtc<'d>) -> Self {
        Self {
            rtc,
            armed: WakeSources::NONE,
        }
    }
}

impl SleepDriver for LightSleep<'_> {
    fn arm(&mut self, sources: WakeSources) {
        irq::arm(sources);
        self.armed = sources;
    }

    fn sleep(&mut self) {
        self.rtc.sleep_light(&[&GpioWakeupSource::new()]);

        // The edge interrupt is serviced as soon as the core resumes. When the
        // line rose while the GPIO block was clock gated no edge is latched,
        // so fall back to the line levels.
        if irq::WAKE_LATCH.peek() == WakeReason::None {
            for source in [WakeSource::Pulse, WakeSource::Button] {
                if self.armed.contains(source) && irq::level(source) {
                    debug!("No edge latched, {:?} line is high", source);
                    irq::WAKE_LATCH.record(source);
                    break;
                }
            }
        }
    }

    fn disarm(&mut self, sources: WakeSources) {
        irq::disarm(sources);
        self.armed = WakeSources::NONE;
    }
}

/// Timer-only light sleep of the pulse-timer board.
pub struct TimerSleep<'d> {
    rtc: Rtc<'d>,
}

impl<'d> TimerSleep<'d> {
    pub fn new(rtc: Rtc<'d>) -> Self {
        Self { rtc }
    }
}

impl TimedSleep for TimerSleep<'_> {
    fn sleep_for(&mut self, duration: embassy_time::Duration) {
        let timer = TimerWakeupSource::new(core::time::Duration::from_micros(duration.as_micros()));
        self.rtc.sleep_light(&[&timer]);
    }
}

// ---------------------------------------------------------------------------
// Watchdog and reset cause
// ---------------------------------------------------------------------------

/// Main-system watchdog of timer group 0.
pub struct MwdtWatchdog {
    wdt: Wdt<TIMG0<'static>>,
}

impl MwdtWatchdog {
    pub fn new(mut wdt: Wdt<TIMG0<'static>>) -> Self {
        // The bootloader may leave it running
        wdt.disable();
        Self { wdt }
    }
}

impl Watchdog for MwdtWatchdog {
    fn enable(&mut self, timeout: embassy_time::Duration) {
        self.wdt.set_timeout(
            MwdtStage::Stage0,
            esp_hal::time::Duration::from_millis(timeout.as_millis()),
        );
        self.wdt.enable();
    }

    fn feed(&mut self) {
        self.wdt.feed();
    }

    fn disable(&mut self) {
        self.wdt.disable();
    }
}

/// Reset cause as reported by the RTC controller for the PRO CPU.
///
/// The hardware register cannot be written, so clearing only masks it for the
/// rest of this boot.
pub struct ChipResetCause {
    reason: Option<SocResetReason>,
    cleared: bool,
}

impl ChipResetCause {
    pub fn read() -> Self {
        let reason = reset_reason(Cpu::ProCpu);
        info!("Reset reason: {:?}", reason);
        Self {
            reason,
            cleared: false,
        }
    }
}

impl ResetCause for ChipResetCause {
    fn watchdog_reset(&mut self) -> bool {
        if self.cleared {
            return false;
        }
        matches!(
            self.reason,
            Some(
                SocResetReason::CoreMwdt0
                    | SocResetReason::CoreMwdt1
                    | SocResetReason::CoreRtcWdt
                    | SocResetReason::Cpu0Mwdt0
                    | SocResetReason::Cpu0Mwdt1
                    | SocResetReason::Cpu0RtcWdt
                    | SocResetReason::SysRtcWdt
                    | SocResetReason::SysSuperWdt
            )
        )
    }

    fn clear(&mut self) {
        self.cleared = true;
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Microseconds since boot from the system timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        let since_boot = esp_hal::time::Instant::now().duration_since_epoch();
        Instant::from_micros(since_boot.as_micros())
    }
}

// ---------------------------------------------------------------------------
// Sample store
// ---------------------------------------------------------------------------

#[derive(Error, Debug)]
pub enum RegionError {
    #[error("access of {len} bytes at {offset:#x} leaves the region")]
    OutOfBounds { offset: u32, len: usize },
    #[error("flash access failed: {0:?}")]
    Flash(FlashStorageError),
}

/// Window of the SPI flash reserved for the sample log.
///
/// Offsets are relative to the start of the window. Writes go through
/// [`FlashStorage`], which performs the read-modify-erase-write cycle for
/// partial sectors.
pub struct FlashRegion<'d> {
    flash: FlashStorage<'d>,
    base: u32,
    len: u32,
}

impl<'d> FlashRegion<'d> {
    pub fn new(flash: FlashStorage<'d>, base: u32, len: u32) -> Self {
        if (base + len) as usize > flash.capacity() {
            warn!(
                "Sample store {:#x}..{:#x} exceeds flash capacity {:#x}",
                base,
                base + len,
                flash.capacity()
            );
        }
        Self { flash, base, len }
    }

    fn absolute(&self, offset: u32, len: usize) -> Result<u32, RegionError> {
        let end = offset as usize + len;
        if end > self.len as usize {
            return Err(RegionError::OutOfBounds { offset, len });
        }
        Ok(self.base + offset)
    }
}

impl ReadStorage for FlashRegion<'_> {
    type Error = RegionError;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let at = self.absolute(offset, bytes.len())?;
        ReadStorage::read(&mut self.flash, at, bytes).map_err(RegionError::Flash)
    }

    fn capacity(&self) -> usize {
        self.len as usize
    }
}

impl Storage for FlashRegion<'_> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let at = self.absolute(offset, bytes.len())?;
        Storage::write(&mut self.flash, at, bytes).map_err(RegionError::Flash)
    }
}
