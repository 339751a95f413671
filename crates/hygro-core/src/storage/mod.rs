//! Persistent sample storage
//!
//! The log lives in a byte-addressable non-volatile store accessed through
//! [`embedded_storage::Storage`]. The on-device layout of one sector is:
//!
//! | Offset        | Size | Content                                   |
//! |---------------|------|-------------------------------------------|
//! | 0             | 1    | front pointer (next slot to write, 0..N)  |
//! | 1             | N    | encoded temperatures                      |
//! | 1 + N         | N    | encoded humidities                        |
//!
//! Sectors are packed back to back starting at offset 0. This layout must stay
//! byte-exact across firmware versions.

pub mod circular_log;
pub mod codec;

pub use circular_log::*;
pub use codec::*;

use embedded_storage::{ReadStorage, Storage};

/// Size in bytes of one sector holding `depth` samples.
pub const fn sector_size(depth: usize) -> usize {
    2 * depth + 1
}

/// RAM-backed byte store.
///
/// Starts erased (`0xFF`, like a fresh EEPROM) and counts physical byte
/// writes and write calls so wear behaviour can be checked.
#[derive(Debug, Clone)]
pub struct MemStorage<const SIZE: usize> {
    bytes: [u8; SIZE],
    writes: usize,
    write_ops: usize,
}

/// Error returned for accesses beyond the end of a [`MemStorage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfBounds {
    pub offset: u32,
    pub len: usize,
}

impl<const SIZE: usize> Default for MemStorage<SIZE> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const SIZE: usize> MemStorage<SIZE> {
    /// An erased store.
    pub const fn new() -> Self {
        Self::filled(codec::EMPTY_SLOT)
    }

    /// A store with every byte set to `value`.
    pub const fn filled(value: u8) -> Self {
        Self {
            bytes: [value; SIZE],
            writes: 0,
            write_ops: 0,
        }
    }

    /// Restore a previously captured image; shorter images leave the tail erased.
    pub fn from_image(image: &[u8]) -> Self {
        let mut store = Self::new();
        let len = image.len().min(SIZE);
        store.bytes[..len].copy_from_slice(&image[..len]);
        store
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Direct mutable access, bypassing write accounting.
    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Number of bytes physically written since creation.
    pub fn write_count(&self) -> usize {
        self.writes
    }

    /// Number of `write` calls since creation. Each one is a page erase on flash.
    pub fn write_ops(&self) -> usize {
        self.write_ops
    }

    fn span(&self, offset: u32, len: usize) -> Result<core::ops::Range<usize>, OutOfBounds> {
        let start = offset as usize;
        match start.checked_add(len) {
            Some(end) if end <= SIZE => Ok(start..end),
            _ => Err(OutOfBounds { offset, len }),
        }
    }
}

impl<const SIZE: usize> ReadStorage for MemStorage<SIZE> {
    type Error = OutOfBounds;

    fn read(&mut self, offset: u32, bytes: &mut [u8]) -> Result<(), Self::Error> {
        let span = self.span(offset, bytes.len())?;
        bytes.copy_from_slice(&self.bytes[span]);
        Ok(())
    }

    fn capacity(&self) -> usize {
        SIZE
    }
}

impl<const SIZE: usize> Storage for MemStorage<SIZE> {
    fn write(&mut self, offset: u32, bytes: &[u8]) -> Result<(), Self::Error> {
        let span = self.span(offset, bytes.len())?;
        self.bytes[span].copy_from_slice(bytes);
        self.writes += bytes.len();
        self.write_ops += 1;
        Ok(())
    }
}
