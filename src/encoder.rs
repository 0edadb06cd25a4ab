//! Fixed-point encoding of physical quantities into circuit field elements

use alloy_primitives::U256;
use tracing::warn;

use crate::error::{PipelineError, Result};
use crate::types::{EncodedReading, Reading};

/// Largest integer an IEEE-754 double holds exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

/// BN254 scalar field modulus.
pub const FIELD_MODULUS: U256 = U256::from_limbs([
    0x43e1_f593_f000_0001,
    0x2833_e848_79b9_7091,
    0xb850_45b6_8181_585d,
    0x3064_4e72_e131_a029,
]);

pub const SPEED_SCALE: u64 = 100;
pub const COORDINATE_SCALE: u64 = 1_000_000;

/// How the scaled value is reduced to an integer.
///
/// Both agree on every finite input today; they are kept apart because the
/// circuit defines speed and coordinates separately.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rounding {
    /// trunc(|value * scale|)
    TowardZero,
    /// floor(|value| * scale)
    FloorAbs,
}

/// Scale `value` and reduce it to an unsigned integer. The sign is dropped.
pub fn encode(value: f64, scale: u64, rounding: Rounding, name: &str) -> Result<u64> {
    if value.is_nan() {
        return Err(PipelineError::InvalidReading(format!("{} is NaN", name)));
    }

    let scaled = match rounding {
        Rounding::TowardZero => (value * scale as f64).abs().trunc(),
        Rounding::FloorAbs => (value.abs() * scale as f64).floor(),
    };

    if !scaled.is_finite() || scaled > MAX_SAFE_INTEGER as f64 {
        return Err(PipelineError::PrecisionOverflow {
            name: name.to_string(),
            value,
            scale,
        });
    }

    let encoded = scaled as u64;
    if U256::from(encoded) >= FIELD_MODULUS {
        return Err(PipelineError::PrecisionOverflow {
            name: name.to_string(),
            value,
            scale,
        });
    }

    Ok(encoded)
}

pub fn encode_speed(speed: f64) -> Result<u64> {
    encode(speed, SPEED_SCALE, Rounding::TowardZero, "speed")
}

pub fn encode_coordinate(coord: f64, name: &str) -> Result<u64> {
    encode(coord, COORDINATE_SCALE, Rounding::FloorAbs, name)
}

/// Encode every numeric field of a reading
pub fn encode_reading(reading: &Reading) -> Result<EncodedReading> {
    if reading.latitude() < 0.0 || reading.longitude() < 0.0 {
        warn!(
            timestamp = reading.timestamp,
            "Coordinate sign discarded by fixed-point encoding: ({}, {})",
            reading.latitude(),
            reading.longitude()
        );
    }

    if reading.timestamp > MAX_SAFE_INTEGER {
        return Err(PipelineError::PrecisionOverflow {
            name: "timestamp".to_string(),
            value: reading.timestamp as f64,
            scale: 1,
        });
    }

    Ok(EncodedReading {
        speed_fixed: encode_speed(reading.speed)?,
        lat_fixed: encode_coordinate(reading.latitude(), "latitude")?,
        lon_fixed: encode_coordinate(reading.longitude(), "longitude")?,
        timestamp: reading.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_and_coordinate_scaling() {
        assert_eq!(encode_speed(110.59).unwrap(), 11059);
        assert_eq!(encode_speed(110.29).unwrap(), 11029);
        assert_eq!(encode_coordinate(37.7749, "latitude").unwrap(), 37_774_900);
        assert_eq!(encode_coordinate(-122.4194, "longitude").unwrap(), 122_419_400);
    }

    #[test]
    fn test_truncates_fraction() {
        assert_eq!(encode_speed(55.559).unwrap(), 5555);
        assert_eq!(encode_coordinate(1.0000009, "latitude").unwrap(), 1_000_000);
    }

    #[test]
    fn test_deterministic_and_sign_discarded() {
        let samples = [0.0, 0.01, 12.5, 99.999, 180.0, 1234.5678];
        for v in samples {
            for (scale, rounding) in [
                (SPEED_SCALE, Rounding::TowardZero),
                (COORDINATE_SCALE, Rounding::FloorAbs),
            ] {
                let first = encode(v, scale, rounding, "v").unwrap();
                assert_eq!(first, encode(v, scale, rounding, "v").unwrap());
                assert_eq!(first, encode(-v, scale, rounding, "v").unwrap());
            }
        }
    }

    #[test]
    fn test_overflow_is_rejected() {
        let err = encode(1e16, SPEED_SCALE, Rounding::TowardZero, "speed").unwrap_err();
        assert!(matches!(err, PipelineError::PrecisionOverflow { ref name, .. } if name == "speed"));

        let err = encode(f64::INFINITY, COORDINATE_SCALE, Rounding::FloorAbs, "latitude").unwrap_err();
        assert!(matches!(err, PipelineError::PrecisionOverflow { .. }));

        // Exactly at the boundary is still representable.
        assert_eq!(
            encode(MAX_SAFE_INTEGER as f64, 1, Rounding::FloorAbs, "edge").unwrap(),
            MAX_SAFE_INTEGER
        );
    }

    #[test]
    fn test_nan_is_invalid() {
        let err = encode_speed(f64::NAN).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidReading(_)));
    }

    #[test]
    fn test_encode_reading() {
        let reading = Reading::new(1_700_000_000, 37.7749, -122.4194, 110.59);
        let encoded = encode_reading(&reading).unwrap();

        assert_eq!(
            encoded,
            EncodedReading {
                speed_fixed: 11059,
                lat_fixed: 37_774_900,
                lon_fixed: 122_419_400,
                timestamp: 1_700_000_000,
            }
        );
    }

    #[test]
    fn test_timestamp_beyond_safe_range() {
        let reading = Reading::new(MAX_SAFE_INTEGER + 1, 0.0, 0.0, 10.0);
        let err = encode_reading(&reading).unwrap_err();
        assert!(matches!(err, PipelineError::PrecisionOverflow { ref name, .. } if name == "timestamp"));
    }

    #[test]
    fn test_field_modulus_limbs() {
        let expected = U256::from_str_radix(
            "21888242871839275222246405745257275088548364400416034343698204186575808495617",
            10,
        )
        .unwrap();
        assert_eq!(FIELD_MODULUS, expected);
    }
}
