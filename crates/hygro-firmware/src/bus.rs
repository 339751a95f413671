//! Bus line hand-off around a peripheral rail cut
//!
//! The sensor and the display controller are powered from the gated rail.
//! With the rail off, any MCU pin still driving the I2C lines (SDA/SCL) or the
//! display's SPI and control lines (SCK/MOSI/CS/DC) would back-power them
//! through their protection diodes, so every such line is tri-stated first.
//!
//! esp-hal has no API to detach a pin from a running peripheral and hand it
//! back later, so this works on the GPIO matrix registers directly: setting a
//! pin's OEN_SEL bit moves its output enable from the peripheral to the
//! `GPIO_ENABLE` register, which is then cleared. The previous routing word
//! and enable bit are saved and written back on restore, which covers both
//! peripheral-routed pins and plain GPIO outputs.

use core::ptr::{read_volatile, write_volatile};

use hygro_core::hal::BusControl;
use log::debug;

// ESP32-S3 GPIO output enable registers for GPIO 0-31 (low bank)
const GPIO_ENABLE_REG: u32 = 0x6000_4020;
const GPIO_ENABLE_W1TS_REG: u32 = 0x6000_4024;
const GPIO_ENABLE_W1TC_REG: u32 = 0x6000_4028;

// ESP32-S3 GPIO output enable registers for GPIO 32-48 (high bank)
const GPIO_ENABLE1_REG: u32 = 0x6000_402C;
const GPIO_ENABLE1_W1TS_REG: u32 = 0x6000_4030;
const GPIO_ENABLE1_W1TC_REG: u32 = 0x6000_4034;

/// `GPIO_FUNC0_OUT_SEL_CFG_REG`; one word per pin follows.
const GPIO_FUNC_OUT_SEL_CFG_BASE: u32 = 0x6000_4554;

/// Output enable taken from `GPIO_ENABLE` instead of the peripheral.
const OEN_SEL: u32 = 1 << 10;

/// Highest GPIO number on the ESP32-S3.
const MAX_GPIO: u8 = 48;

/// Routing of one line captured when it was floated.
#[derive(Debug, Clone, Copy)]
struct Saved {
    out_sel: u32,
    enabled: bool,
}

/// Register addresses of one line addressed by GPIO number.
#[derive(Debug, Clone, Copy)]
struct BusLine {
    enable: u32,
    enable_set: u32,
    enable_clr: u32,
    bit: u32,
    out_sel: u32,
}

impl BusLine {
    const fn new(pin: u8) -> Self {
        let (enable, enable_set, enable_clr, bit) = if pin < 32 {
            (
                GPIO_ENABLE_REG,
                GPIO_ENABLE_W1TS_REG,
                GPIO_ENABLE_W1TC_REG,
                1u32 << pin,
            )
        } else {
            (
                GPIO_ENABLE1_REG,
                GPIO_ENABLE1_W1TS_REG,
                GPIO_ENABLE1_W1TC_REG,
                1u32 << (pin - 32),
            )
        };
        Self {
            enable,
            enable_set,
            enable_clr,
            bit,
            out_sel: GPIO_FUNC_OUT_SEL_CFG_BASE + 4 * pin as u32,
        }
    }

    /// Take the output enable away from the peripheral and float the pin.
    fn float(&self) -> Saved {
        critical_section::with(|_| unsafe {
            let out_sel = read_volatile(self.out_sel as *const u32);
            let enabled = read_volatile(self.enable as *const u32) & self.bit != 0;
            write_volatile(self.out_sel as *mut u32, out_sel | OEN_SEL);
            write_volatile(self.enable_clr as *mut u32, self.bit);
            Saved { out_sel, enabled }
        })
    }

    /// Put back the routing captured by [`float`](Self::float).
    fn attach(&self, saved: Saved) {
        critical_section::with(|_| unsafe {
            if saved.enabled {
                write_volatile(self.enable_set as *mut u32, self.bit);
            }
            write_volatile(self.out_sel as *mut u32, saved.out_sel);
        });
    }
}

/// Every MCU line wired to a device on the gated rail.
///
/// Lines are floated in the order given and re-attached in reverse.
///
/// # Safety
/// The caller must ensure the GPIO numbers are the pins the bus drivers were
/// built with and that no other driver reconfigures them meanwhile.
pub struct BusPins<const N: usize> {
    lines: [BusLine; N],
    saved: [Saved; N],
    released: bool,
}

impl<const N: usize> BusPins<N> {
    pub const fn new(pins: [u8; N]) -> Self {
        let mut lines = [BusLine::new(0); N];
        let mut i = 0;
        while i < N {
            assert!(pins[i] <= MAX_GPIO, "no such GPIO on the ESP32-S3");
            lines[i] = BusLine::new(pins[i]);
            i += 1;
        }
        Self {
            lines,
            saved: [Saved {
                out_sel: 0,
                enabled: false,
            }; N],
            released: false,
        }
    }
}

impl<const N: usize> BusControl for BusPins<N> {
    fn release(&mut self) {
        if self.released {
            return;
        }
        debug!("Releasing {} gated bus lines", N);
        for (line, saved) in self.lines.iter().zip(self.saved.iter_mut()) {
            *saved = line.float();
        }
        self.released = true;
    }

    fn restore(&mut self) {
        if !self.released {
            return;
        }
        debug!("Restoring gated bus lines");
        for (line, saved) in self.lines.iter().zip(self.saved.iter()).rev() {
            line.attach(*saved);
        }
        self.released = false;
    }
}
