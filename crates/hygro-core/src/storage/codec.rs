//! One-byte quantization of temperature and humidity samples.

use crate::config::QuantizationRange;

/// Raw byte marking an unwritten or erased slot.
pub const EMPTY_SLOT: u8 = 0xFF;

/// Highest code `encode` produces; `EMPTY_SLOT` is reserved.
pub const MAX_CODE: u8 = EMPTY_SLOT - 1;

/// Affine map between a value range and the byte range 0..=255.
///
/// Resolution is `(max - min) / 255` per code, about 0.43 °C for the default
/// temperature span. Out-of-range input is clamped, never rejected.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantizer {
    range: QuantizationRange,
}

impl Quantizer {
    pub const fn new(range: QuantizationRange) -> Self {
        Self { range }
    }

    pub const fn range(&self) -> QuantizationRange {
        self.range
    }

    /// Value difference between two adjacent codes.
    pub fn step(&self) -> f32 {
        self.range.span() / 255.0
    }

    /// Encode a value with a +0.5 rounding bias.
    ///
    /// Values in the top half-step of the range would round to the empty
    /// sentinel and are stored as [`MAX_CODE`] instead.
    pub fn encode(&self, value: f32) -> u8 {
        let QuantizationRange { min, max } = self.range;
        // NaN fails every comparison and is treated as the bottom of the range
        let clamped = if value >= max {
            max
        } else if value > min {
            value
        } else {
            min
        };

        let scaled = (clamped - min) * 255.0 / (max - min) + 0.5;
        (scaled as u8).min(MAX_CODE)
    }

    /// Decode a stored byte. The empty sentinel decodes to 0.
    pub fn decode(&self, raw: u8) -> f32 {
        if raw == EMPTY_SLOT {
            return 0.0;
        }
        raw as f32 * self.range.span() / 255.0 + self.range.min
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature() -> Quantizer {
        Quantizer::new(QuantizationRange::TEMPERATURE)
    }

    #[test]
    fn test_range_ends() {
        let q = temperature();
        assert_eq!(q.encode(-50.0), 0);
        assert_eq!(q.encode(-80.0), 0);
        assert_eq!(q.encode(60.0), MAX_CODE);
        assert_eq!(q.encode(500.0), MAX_CODE);
        assert_eq!(q.encode(f32::NAN), 0);
    }

    #[test]
    fn test_decode_empty_is_zero() {
        assert_eq!(temperature().decode(EMPTY_SLOT), 0.0);
        let hum = Quantizer::new(QuantizationRange::HUMIDITY);
        assert_eq!(hum.decode(EMPTY_SLOT), 0.0);
    }

    #[test]
    fn test_error_within_one_step() {
        for q in [
            temperature(),
            Quantizer::new(QuantizationRange::HUMIDITY),
        ] {
            let QuantizationRange { min, max } = q.range();
            let mut value = min;
            while value <= max {
                let code = q.encode(value);
                assert_ne!(code, EMPTY_SLOT, "sentinel produced for {value}");
                let err = (q.decode(code) - value).abs();
                assert!(err <= q.step() + 1e-4, "value {value} decoded with error {err}");
                value += 0.05;
            }
        }
    }

    #[test]
    fn test_known_codes() {
        let q = temperature();
        // (20 + 50) * 255 / 110 = 162.27
        assert_eq!(q.encode(20.0), 162);
        let hum = Quantizer::new(QuantizationRange::HUMIDITY);
        // 50 * 255 / 100 = 127.5, rounded up
        assert_eq!(hum.encode(50.0), 128);
        assert_eq!(hum.decode(0), 0.0);
    }
}
