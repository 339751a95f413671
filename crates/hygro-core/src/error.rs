//! Error types shared across the core crate

use thiserror_no_std::Error;

/// Device and configuration failures.
///
/// Recoverable data conditions (corrupted front pointer, out-of-range sector
/// index, sensor glitches) never show up here; they are corrected where they
/// are detected.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum HygroError {
    #[error("non-volatile storage access failed at offset {offset} ({len} bytes)")]
    Storage { offset: u32, len: usize },
    #[error("sector {sector} needs {required} bytes but the store holds {capacity}")]
    SectorOutOfCapacity {
        sector: u8,
        required: usize,
        capacity: usize,
    },
    #[error("invalid quantization range: min {min} must be below max {max}")]
    InvalidRange { min: f32, max: f32 },
}

pub type Result<T> = core::result::Result<T, HygroError>;
