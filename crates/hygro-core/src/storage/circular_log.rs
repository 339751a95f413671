//! Persistent circular buffer of temperature/humidity samples.

use core::fmt::Debug;

use embedded_storage::Storage;
use log::{debug, error, info, warn};

use super::codec::Quantizer;
use super::sector_size;
use crate::config::{LogConfig, MAX_SECTORS, SAMPLE_DEPTH};
use crate::error::{HygroError, Result};

/// Largest sector any supported depth can have.
const IMAGE_MAX: usize = sector_size(u8::MAX as usize);

/// Bytes compared per read when looking for changes.
const COMPARE_CHUNK: usize = 32;

/// Which half of a sector a history read decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Temperature,
    Humidity,
}

/// Rolling history of the `N` most recent samples in one sector of a
/// non-volatile byte store.
///
/// The log owns the store exclusively. All writes use update semantics: each
/// operation builds the new sector image and issues at most one store write,
/// spanning the first to the last byte that differs. Nothing is written when
/// the store already holds the image. On flash every write costs a page erase,
/// so one write per operation bounds the erase count.
///
/// A power cut in the middle of a [`push`](Self::push) write can leave one
/// slot with a stale temperature next to a fresh humidity (or the other way
/// round) until the slot is overwritten again.
pub struct CircularLog<S, const N: usize = SAMPLE_DEPTH> {
    storage: S,
    sector: u8,
    base: u32,
    temperature: Quantizer,
    humidity: Quantizer,
}

impl<S, const N: usize> CircularLog<S, N>
where
    S: Storage,
    S::Error: Debug,
{
    /// Wrap a store. Nothing is read until [`begin`](Self::begin).
    pub fn new(storage: S, config: &LogConfig) -> Self {
        const {
            assert!(N > 0 && N < u8::MAX as usize, "sample depth must fit the pointer byte");
        }

        Self {
            storage,
            sector: 0,
            base: 0,
            temperature: Quantizer::new(config.temperature),
            humidity: Quantizer::new(config.humidity),
        }
    }

    /// Size in bytes of one sector of this log.
    pub const fn sector_size() -> usize {
        sector_size(N)
    }

    /// Select the sector to use and repair its front pointer.
    ///
    /// An index of [`MAX_SECTORS`] or above selects sector 0. A stored pointer
    /// outside `0..N` is rewritten to 0.
    pub fn begin(&mut self, sector: u8) -> Result<()> {
        let sector = if sector < MAX_SECTORS {
            sector
        } else {
            warn!("Log sector {} out of range, using sector 0", sector);
            0
        };

        let required = (sector as usize + 1) * Self::sector_size();
        let capacity = self.storage.capacity();
        if required > capacity {
            return Err(HygroError::SectorOutOfCapacity {
                sector,
                required,
                capacity,
            });
        }

        self.sector = sector;
        self.base = sector as u32 * Self::sector_size() as u32;

        let stored = self.read_byte(self.base)?;
        if stored as usize >= N {
            warn!(
                "Log sector {}: front pointer {} invalid, resetting to 0",
                sector, stored
            );
            self.update_byte(self.base, 0)?;
        }

        info!("Log using sector {} at offset {}", self.sector, self.base);
        Ok(())
    }

    /// Currently selected sector.
    pub fn sector(&self) -> u8 {
        self.sector
    }

    /// Index of the slot the next [`push`](Self::push) writes.
    pub fn front(&mut self) -> Result<usize> {
        let stored = self.read_byte(self.base)? as usize;
        Ok(if stored < N { stored } else { 0 })
    }

    /// Store one sample over the oldest slot and advance the pointer.
    pub fn push(&mut self, temperature: f32, humidity: f32) -> Result<()> {
        let mut buf = [0u8; IMAGE_MAX];
        let image = self.load(&mut buf)?;

        let stored = image[0] as usize;
        let slot = if stored < N { stored } else { 0 };
        image[1 + slot] = self.temperature.encode(temperature);
        image[1 + N + slot] = self.humidity.encode(humidity);
        image[0] = ((slot + 1) % N) as u8;
        self.write_changed(self.base, image)?;

        debug!(
            "Logged {:.2} C / {:.2} %RH into slot {}",
            temperature, humidity, slot
        );
        Ok(())
    }

    /// Decode the temperature history, oldest first.
    pub fn read_temperature_history(&mut self, out: &mut [f32; N]) -> Result<()> {
        self.read_history(Channel::Temperature, out)
    }

    /// Decode the humidity history, oldest first.
    pub fn read_humidity_history(&mut self, out: &mut [f32; N]) -> Result<()> {
        self.read_history(Channel::Humidity, out)
    }

    /// Decode one channel, oldest first. Empty slots decode to 0.
    pub fn read_history(&mut self, channel: Channel, out: &mut [f32; N]) -> Result<()> {
        let front = self.front()?;
        let (start, quantizer) = match channel {
            Channel::Temperature => (self.temperature_offset(0), self.temperature),
            Channel::Humidity => (self.humidity_offset(0), self.humidity),
        };

        let mut raw = [0u8; N];
        self.read_span(start, &mut raw)?;

        for (i, value) in out.iter_mut().enumerate() {
            *value = quantizer.decode(raw[(front + i) % N]);
        }
        Ok(())
    }

    /// Zero the whole sector, pointer included.
    pub fn reset(&mut self) -> Result<()> {
        info!("Resetting log sector {} to zero", self.sector);
        let image = [0u8; IMAGE_MAX];
        self.write_changed(self.base, &image[..Self::sector_size()])
    }

    /// Reset the pointer and fill every slot with the encoded defaults.
    pub fn reset_with_defaults(&mut self, temperature: f32, humidity: f32) -> Result<()> {
        info!(
            "Resetting log sector {} to {:.1} C / {:.1} %RH",
            self.sector, temperature, humidity
        );
        let mut buf = [0u8; IMAGE_MAX];
        let image = &mut buf[..Self::sector_size()];
        image[0] = 0;
        image[1..=N].fill(self.temperature.encode(temperature));
        image[1 + N..].fill(self.humidity.encode(humidity));
        self.write_changed(self.base, image)
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    pub fn into_storage(self) -> S {
        self.storage
    }

    fn temperature_offset(&self, slot: usize) -> u32 {
        self.base + 1 + slot as u32
    }

    fn humidity_offset(&self, slot: usize) -> u32 {
        self.base + 1 + N as u32 + slot as u32
    }

    /// Read the current sector into the front of `buf`.
    fn load<'b>(&mut self, buf: &'b mut [u8; IMAGE_MAX]) -> Result<&'b mut [u8]> {
        let image = &mut buf[..Self::sector_size()];
        self.read_span(self.base, image)?;
        Ok(image)
    }

    fn read_span(&mut self, offset: u32, bytes: &mut [u8]) -> Result<()> {
        let len = bytes.len();
        self.storage.read(offset, bytes).map_err(|e| {
            error!("Log read of {} bytes at {} failed: {:?}", len, offset, e);
            HygroError::Storage { offset, len }
        })
    }

    fn read_byte(&mut self, offset: u32) -> Result<u8> {
        let mut byte = [0u8; 1];
        self.read_span(offset, &mut byte)?;
        Ok(byte[0])
    }

    fn update_byte(&mut self, offset: u32, value: u8) -> Result<()> {
        self.write_changed(offset, &[value])
    }

    /// Bring the store at `start` to `new` with at most one write, covering
    /// the first through the last differing byte.
    fn write_changed(&mut self, start: u32, new: &[u8]) -> Result<()> {
        let mut changed: Option<(usize, usize)> = None;
        let mut old = [0u8; COMPARE_CHUNK];
        for (n, part) in new.chunks(COMPARE_CHUNK).enumerate() {
            let at = n * COMPARE_CHUNK;
            let old = &mut old[..part.len()];
            self.read_span(start + at as u32, old)?;
            for (i, (was, now)) in old.iter().zip(part).enumerate() {
                if was != now {
                    let index = at + i;
                    changed = Some(changed.map_or((index, index), |(first, _)| (first, index)));
                }
            }
        }

        let Some((first, last)) = changed else {
            return Ok(());
        };
        let offset = start + first as u32;
        let bytes = &new[first..=last];
        self.storage.write(offset, bytes).map_err(|e| {
            error!("Log write of {} bytes at {} failed: {:?}", bytes.len(), offset, e);
            HygroError::Storage {
                offset,
                len: bytes.len(),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{EMPTY_SLOT, MAX_CODE, MemStorage};

    const STORE: usize = 256;

    type Log = CircularLog<MemStorage<STORE>, SAMPLE_DEPTH>;

    fn log() -> Log {
        let mut log = Log::new(MemStorage::new(), &LogConfig::default());
        log.begin(0).unwrap();
        log
    }

    fn temperature_step() -> f32 {
        Quantizer::new(LogConfig::default().temperature).step()
    }

    #[test]
    fn test_single_push_on_empty_sector() {
        let mut log = Log::new(MemStorage::new(), &LogConfig::default());
        log.storage_mut().as_bytes_mut()[0] = 0;
        log.begin(0).unwrap();

        log.push(20.0, 50.0).unwrap();

        let mut temps = [0.0; SAMPLE_DEPTH];
        let mut hums = [0.0; SAMPLE_DEPTH];
        log.read_temperature_history(&mut temps).unwrap();
        log.read_humidity_history(&mut hums).unwrap();

        assert!(temps[..SAMPLE_DEPTH - 1].iter().all(|&t| t == 0.0));
        assert!(hums[..SAMPLE_DEPTH - 1].iter().all(|&h| h == 0.0));
        assert!((temps[SAMPLE_DEPTH - 1] - 20.0).abs() <= temperature_step());
        assert!((hums[SAMPLE_DEPTH - 1] - 50.0).abs() <= 100.0 / 255.0);
        assert_eq!(log.front().unwrap(), 1);
    }

    #[test]
    fn test_pointer_wraps_after_depth_pushes() {
        let mut log = log();
        let start = log.front().unwrap();
        for i in 0..SAMPLE_DEPTH {
            log.push(i as f32, 10.0).unwrap();
        }
        assert_eq!(log.front().unwrap(), start);
    }

    #[test]
    fn test_overwrite_keeps_newest_in_order() {
        let mut log = log();
        for i in 0..SAMPLE_DEPTH {
            log.push(i as f32, 0.0).unwrap();
        }
        let k = 5;
        for i in 0..k {
            log.push(100.0 + i as f32, 0.0).unwrap();
        }

        let mut temps = [0.0; SAMPLE_DEPTH];
        log.read_temperature_history(&mut temps).unwrap();

        // Oldest surviving first-round sample is index k
        for (i, &t) in temps[..SAMPLE_DEPTH - k].iter().enumerate() {
            let expected = (i + k) as f32;
            assert!((t - expected).abs() <= temperature_step(), "slot {i}: {t}");
        }
        // 100+ clamps to the top code of the range
        let top = Quantizer::new(LogConfig::default().temperature).decode(MAX_CODE);
        for &t in &temps[SAMPLE_DEPTH - k..] {
            assert_eq!(t, top);
        }
    }

    #[test]
    fn test_corrupted_pointer_self_heals() {
        for bad in [SAMPLE_DEPTH as u8, SAMPLE_DEPTH as u8 + 5, 0xFF] {
            let mut store = MemStorage::<STORE>::new();
            store.as_bytes_mut()[0] = bad;
            let mut log = Log::new(store, &LogConfig::default());
            log.begin(0).unwrap();

            assert_eq!(log.storage().as_bytes()[0], 0);
            log.push(21.0, 40.0).unwrap();
            assert_eq!(log.front().unwrap(), 1);
            // Nothing written beyond the sector
            let sector = Log::sector_size();
            assert!(log.storage().as_bytes()[sector..].iter().all(|&b| b == EMPTY_SLOT));
        }
    }

    #[test]
    fn test_sector_selection_and_clamp() {
        let mut log = Log::new(MemStorage::new(), &LogConfig::default());
        log.begin(2).unwrap();
        assert_eq!(log.sector(), 2);
        log.push(0.0, 0.0).unwrap();
        let base = 2 * Log::sector_size();
        assert_eq!(log.storage().as_bytes()[base], 1);

        log.begin(7).unwrap();
        assert_eq!(log.sector(), 0);
    }

    #[test]
    fn test_sector_must_fit_store() {
        let mut log: CircularLog<MemStorage<100>> =
            CircularLog::new(MemStorage::new(), &LogConfig::default());
        assert_eq!(
            log.begin(1),
            Err(HygroError::SectorOutOfCapacity {
                sector: 1,
                required: 114,
                capacity: 100
            })
        );
        assert!(log.begin(0).is_ok());
    }

    #[test]
    fn test_reset_variants() {
        let mut log = log();
        log.push(30.0, 60.0).unwrap();

        log.reset().unwrap();
        let sector = Log::sector_size();
        assert!(log.storage().as_bytes()[..sector].iter().all(|&b| b == 0));

        log.reset_with_defaults(20.0, 30.0).unwrap();
        let mut temps = [0.0; SAMPLE_DEPTH];
        let mut hums = [0.0; SAMPLE_DEPTH];
        log.read_temperature_history(&mut temps).unwrap();
        log.read_humidity_history(&mut hums).unwrap();
        assert_eq!(log.front().unwrap(), 0);
        assert!(temps.iter().all(|&t| (t - 20.0).abs() <= temperature_step()));
        assert!(hums.iter().all(|&h| (h - 30.0).abs() <= 100.0 / 255.0));
    }

    #[test]
    fn test_unchanged_bytes_are_not_rewritten() {
        let mut log = log();
        log.reset_with_defaults(20.0, 30.0).unwrap();
        let writes = log.storage().write_count();

        log.reset_with_defaults(20.0, 30.0).unwrap();
        assert_eq!(log.storage().write_count(), writes);

        // Same values as the default fill: only the pointer changes
        log.push(20.0, 30.0).unwrap();
        assert_eq!(log.storage().write_count(), writes + 1);
    }

    #[test]
    fn test_each_operation_is_a_single_write() {
        let mut log = log();
        log.reset_with_defaults(20.0, 30.0).unwrap();
        assert_eq!(log.storage().write_ops(), 2);

        for i in 0..SAMPLE_DEPTH + 3 {
            let ops = log.storage().write_ops();
            log.push(21.0 + i as f32, 40.0 + i as f32).unwrap();
            assert_eq!(log.storage().write_ops(), ops + 1, "push {i}");
        }

        let ops = log.storage().write_ops();
        log.reset().unwrap();
        assert_eq!(log.storage().write_ops(), ops + 1);
    }

    #[test]
    fn test_push_write_covers_only_the_changed_span() {
        let mut log = log();
        log.reset_with_defaults(20.0, 30.0).unwrap();
        let writes = log.storage().write_count();

        // Slot 0: pointer, temperature 0 and humidity 0 are 1 + N bytes apart
        log.push(25.0, 50.0).unwrap();
        assert_eq!(log.storage().write_count(), writes + SAMPLE_DEPTH + 2);
        assert_eq!(log.front().unwrap(), 1);
    }

    #[test]
    fn test_smaller_depth() {
        let mut log: CircularLog<MemStorage<64>, 4> =
            CircularLog::new(MemStorage::filled(0), &LogConfig::default());
        log.begin(3).unwrap();
        for t in [1.0, 2.0, 3.0, 4.0, 5.0, 6.0] {
            log.push(t, 0.0).unwrap();
        }
        let mut temps = [0.0; 4];
        log.read_temperature_history(&mut temps).unwrap();
        for (got, want) in temps.iter().zip([3.0, 4.0, 5.0, 6.0]) {
            assert!((got - want).abs() <= temperature_step());
        }
    }
}
