use crate::{DecodeError, FloatEncoding};

const FLOAT_WIDTH_MASK: u8 = 0b0000_0011;
const HEADERS_PRESENT: u8 = 0b0000_0100;
const RESERVED_MASK: u8 = !(FLOAT_WIDTH_MASK | HEADERS_PRESENT);

/// The leading byte of a packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Version {
    encoding: FloatEncoding,
    headers_present: bool,
}

impl Version {
    /// Creates a new `Version`.
    pub const fn new(encoding: FloatEncoding, headers_present: bool) -> Self {
        Self {
            encoding,
            headers_present,
        }
    }

    /// Returns the float encoding of the packet's values.
    pub const fn encoding(&self) -> FloatEncoding {
        self.encoding
    }

    /// Returns `true` if a header count and header entries follow the instance ID.
    pub const fn headers_present(&self) -> bool {
        self.headers_present
    }

    /// Returns the wire representation of this version.
    pub const fn to_byte(self) -> u8 {
        let headers = if self.headers_present { HEADERS_PRESENT } else { 0 };
        self.encoding.wire_id() | headers
    }

    /// Parses a version byte.
    ///
    /// Reserved bits must be zero and the float width must name a known encoding.
    pub fn from_byte(version: u8) -> Result<Self, DecodeError> {
        if version & RESERVED_MASK != 0 {
            return Err(DecodeError::UnknownVersion { version });
        }

        let encoding =
            FloatEncoding::from_wire_id(version & FLOAT_WIDTH_MASK).ok_or(DecodeError::UnknownVersion { version })?;

        Ok(Self {
            encoding,
            headers_present: version & HEADERS_PRESENT != 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_layout() {
        assert_eq!(Version::new(FloatEncoding::Float16, false).to_byte(), 0b000);
        assert_eq!(Version::new(FloatEncoding::Float32, false).to_byte(), 0b001);
        assert_eq!(Version::new(FloatEncoding::Float64, false).to_byte(), 0b010);
        assert_eq!(Version::new(FloatEncoding::Float16, true).to_byte(), 0b100);
        assert_eq!(Version::new(FloatEncoding::Float64, true).to_byte(), 0b110);
    }

    #[test]
    fn every_byte_either_parses_or_is_unknown() {
        let mut known = 0;
        for byte in 0..=u8::MAX {
            match Version::from_byte(byte) {
                Ok(version) => {
                    known += 1;
                    assert_eq!(version.to_byte(), byte);
                }
                Err(e) => assert_eq!(e, DecodeError::UnknownVersion { version: byte }),
            }
        }

        // Three float widths, with and without headers.
        assert_eq!(known, 6);
    }

    #[test]
    fn reserved_width_rejected() {
        assert_eq!(Version::from_byte(0b011), Err(DecodeError::UnknownVersion { version: 0b011 }));
        assert_eq!(Version::from_byte(0b111), Err(DecodeError::UnknownVersion { version: 0b111 }));
    }
}
