//! ESP32-S3 firmware-specific modules for hygro
//!
//! This crate contains the hardware-specific halves of the seams defined in
//! `hygro-core`: interrupt handlers, light sleep and watchdog drivers, raw
//! GPIO register access for the bus hand-off, the flash-backed sample store
//! and the TFT panel.

#![no_std]

pub mod board;
pub mod bus;
pub mod irq;
pub mod panel;
pub mod platform;
