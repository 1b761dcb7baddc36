use std::fmt;

use half::f16;
use serde::Deserialize;

use crate::{take, DecodeError, EncodeError};

/// Width of the floating-point values carried by a packet.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum FloatEncoding {
    /// IEEE 754 binary16.
    ///
    /// Values must round-trip exactly, so only small integers and a limited set of fractions are representable.
    #[default]
    #[serde(alias = "f16")]
    Float16,

    /// IEEE 754 binary32. Values are rounded to the nearest representable value.
    #[serde(alias = "f32")]
    Float32,

    /// IEEE 754 binary64.
    #[serde(alias = "f64")]
    Float64,
}

impl FloatEncoding {
    /// Returns the identifier stored in the low two bits of the version byte.
    pub const fn wire_id(self) -> u8 {
        match self {
            Self::Float16 => 0,
            Self::Float32 => 1,
            Self::Float64 => 2,
        }
    }

    /// Maps the low two bits of a version byte back to an encoding.
    ///
    /// Returns `None` for identifiers that do not name an encoding.
    pub const fn from_wire_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::Float16),
            1 => Some(Self::Float32),
            2 => Some(Self::Float64),
            _ => None,
        }
    }

    /// Returns the number of bytes each value occupies on the wire.
    pub const fn width(self) -> usize {
        match self {
            Self::Float16 => 2,
            Self::Float32 => 4,
            Self::Float64 => 8,
        }
    }

    /// Encodes `value` into `out`, returning the encoded bytes.
    ///
    /// Nothing is written anywhere else, which lets callers validate a value before committing any other part of an
    /// entry to a buffer.
    pub(crate) fn encode(self, value: f64, out: &mut [u8; 8]) -> Result<&[u8], EncodeError> {
        match self {
            Self::Float16 => {
                let half = f16::from_f64(value);
                if half.to_f64() != value && !value.is_nan() {
                    return Err(EncodeError::Unrepresentable { value, encoding: self });
                }
                out[..2].copy_from_slice(&half.to_bits().to_be_bytes());
            }
            Self::Float32 => out[..4].copy_from_slice(&(value as f32).to_bits().to_be_bytes()),
            Self::Float64 => out.copy_from_slice(&value.to_bits().to_be_bytes()),
        }

        Ok(&out[..self.width()])
    }

    /// Appends `value` to `buf`.
    ///
    /// On error, `buf` is left untouched.
    pub fn append(self, buf: &mut Vec<u8>, value: f64) -> Result<(), EncodeError> {
        let mut scratch = [0; 8];
        buf.extend_from_slice(self.encode(value, &mut scratch)?);
        Ok(())
    }

    /// Reads a single value from the front of `input`, returning the remaining input and the value.
    pub fn consume(self, input: &[u8]) -> Result<(&[u8], f64), DecodeError> {
        let (rest, raw) = take(input, self.width())?;
        let value = match self {
            Self::Float16 => f16::from_bits(u16::from_be_bytes([raw[0], raw[1]])).to_f64(),
            Self::Float32 => f32::from_bits(u32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]])) as f64,
            Self::Float64 => f64::from_bits(u64::from_be_bytes([
                raw[0], raw[1], raw[2], raw[3], raw[4], raw[5], raw[6], raw[7],
            ])),
        };

        Ok((rest, value))
    }
}

impl fmt::Display for FloatEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float16 => f.write_str("float16"),
            Self::Float32 => f.write_str("float32"),
            Self::Float64 => f.write_str("float64"),
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const ALL: [FloatEncoding; 3] = [FloatEncoding::Float16, FloatEncoding::Float32, FloatEncoding::Float64];

    fn round_trip(encoding: FloatEncoding, value: f64) -> f64 {
        let mut buf = Vec::new();
        encoding.append(&mut buf, value).unwrap();
        assert_eq!(buf.len(), encoding.width());

        let (rest, decoded) = encoding.consume(&buf).unwrap();
        assert!(rest.is_empty());
        decoded
    }

    #[test]
    fn wire_ids_round_trip() {
        for encoding in ALL {
            assert_eq!(FloatEncoding::from_wire_id(encoding.wire_id()), Some(encoding));
        }
        assert_eq!(FloatEncoding::from_wire_id(3), None);
    }

    #[test]
    fn float16_exact_values() {
        for value in [0.0, -0.0, 1.0, -2.0, 0.5, 1024.0, 65504.0, f64::INFINITY, f64::NEG_INFINITY] {
            let decoded = round_trip(FloatEncoding::Float16, value);
            assert_eq!(decoded.to_bits(), value.to_bits(), "value {}", value);
        }

        assert!(round_trip(FloatEncoding::Float16, f64::NAN).is_nan());
    }

    #[test]
    fn float16_big_endian_layout() {
        let mut buf = Vec::new();
        FloatEncoding::Float16.append(&mut buf, 1.0).unwrap();
        assert_eq!(buf, [0x3c, 0x00]);
    }

    #[test]
    fn float16_unrepresentable_leaves_buffer() {
        let mut buf = vec![0xaa];
        for value in [0.1, 65505.0, 1e10, 1.0 + f64::EPSILON] {
            let err = FloatEncoding::Float16.append(&mut buf, value).unwrap_err();
            assert_eq!(
                err,
                EncodeError::Unrepresentable {
                    value,
                    encoding: FloatEncoding::Float16
                }
            );
        }
        assert_eq!(buf, [0xaa]);
    }

    #[test]
    fn consume_short_input() {
        for encoding in ALL {
            let short = vec![0; encoding.width() - 1];
            assert_eq!(
                encoding.consume(&short),
                Err(DecodeError::BufferTooSmall {
                    needed: encoding.width(),
                    remaining: encoding.width() - 1
                })
            );
        }
    }

    #[test]
    fn deserialize_names_and_aliases() {
        use serde::de::{value::StrDeserializer, IntoDeserializer as _};

        let cases = [
            ("float16", FloatEncoding::Float16),
            ("float32", FloatEncoding::Float32),
            ("f64", FloatEncoding::Float64),
        ];
        for (name, expected) in cases {
            let deserializer: StrDeserializer<'_, serde::de::value::Error> = name.into_deserializer();
            assert_eq!(FloatEncoding::deserialize(deserializer).unwrap(), expected);
        }
    }

    proptest! {
        #[test]
        fn property_float64_is_lossless(value in any::<f64>()) {
            let decoded = round_trip(FloatEncoding::Float64, value);
            if value.is_nan() {
                prop_assert!(decoded.is_nan());
            } else {
                prop_assert_eq!(decoded.to_bits(), value.to_bits());
            }
        }

        #[test]
        fn property_float32_rounds_to_nearest(value in any::<f32>()) {
            let decoded = round_trip(FloatEncoding::Float32, value as f64);
            if value.is_nan() {
                prop_assert!(decoded.is_nan());
            } else {
                prop_assert_eq!(decoded, value as f64);
            }
        }

        #[test]
        fn property_float16_small_integers(value in -2048i32..=2048) {
            prop_assert_eq!(round_trip(FloatEncoding::Float16, value as f64), value as f64);
        }
    }
}
