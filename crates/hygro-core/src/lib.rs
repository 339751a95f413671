//! Hardware-independent core library for the hygro logger
//!
//! This crate contains all platform-agnostic logic of the battery-powered
//! temperature/humidity logger: the persistent circular sample log, the
//! deep-sleep wake arbiter, the lifecycle controllers, and the collaborator
//! traits (sensor, display, sleep, watchdog) the firmware implements.
//!
//! It is `#![no_std]` so it compiles on both embedded targets (ESP32-S3) and
//! desktop hosts (for the simulator and tests).

#![cfg_attr(not(test), no_std)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

pub mod config;
pub mod controller;
pub mod display;
pub mod error;
pub mod hal;
pub mod power;
pub mod sensors;
pub mod storage;

#[cfg(any(test, feature = "sim"))]
pub mod sim;

pub use error::{HygroError, Result};
