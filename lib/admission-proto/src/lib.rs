//! The admission wire protocol.
//!
//! A packet carries many key/value metric samples in a single datagram:
//!
//! ```text
//! [1]   version         float width (bits 0-1), headers present (bit 2), reserved (bits 3-7, must be zero)
//! [1]   len(application)
//! [..]  application
//! [1]   len(instance_id)
//! [..]  instance_id
//! [1]?  header_count    only when the headers-present bit is set
//!       header_count x { len(key), key, len(value), value }
//!       repeated { incrementally-encoded key, fixed-width big-endian float } until the end of the payload
//! [4]   CRC32-C (Castagnoli) of every preceding byte, big-endian
//! ```
//!
//! [`Writer`] and [`Reader`] handle everything but the trailing checksum, which is added and verified with
//! [`add_checksum`] and [`check_checksum`]. Inbound data must always go through [`check_checksum`] before it reaches a
//! [`Reader`].
use snafu::Snafu;

mod checksum;
pub use self::checksum::{add_checksum, check_checksum, checksum, CHECKSUM_LEN};

mod float;
pub use self::float::FloatEncoding;

mod incremental;
pub use self::incremental::{KeyReader, KeyWriter};

mod reader;
pub use self::reader::{Preamble, Reader};

mod version;
pub use self::version::Version;

mod writer;
pub use self::writer::Writer;

/// Maximum length, in bytes, of any length-prefixed field: application, instance ID, header keys and values, and
/// metric keys.
pub const MAX_FIELD_LEN: usize = u8::MAX as usize;

/// An error while encoding a packet.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(context(suffix(false)))]
pub enum EncodeError {
    /// A length-prefixed field was longer than [`MAX_FIELD_LEN`].
    #[snafu(display("{} is {} bytes long, exceeding the maximum of {}", field, len, MAX_FIELD_LEN))]
    FieldTooLong {
        /// Name of the field.
        field: &'static str,

        /// Actual length of the field.
        len: usize,
    },

    /// The value cannot be represented exactly at the packet's float width.
    #[snafu(display("value {} is not representable as {}", value, encoding))]
    Unrepresentable {
        /// Value that was being encoded.
        value: f64,

        /// Float encoding of the packet.
        encoding: FloatEncoding,
    },

    /// A header was written after the first metric, or more headers were written than were declared.
    #[snafu(display("header written out of order: {}", reason))]
    HeaderOutOfOrder {
        /// What went wrong.
        reason: &'static str,
    },

    /// A metric was appended before all declared headers were written.
    #[snafu(display("{} declared header(s) not written before the first metric", missing))]
    MissingHeaders {
        /// Number of declared headers still outstanding.
        missing: usize,
    },
}

impl EncodeError {
    /// Returns `true` if this error only concerns the single value being appended.
    ///
    /// Such errors can be handled by skipping the sample, whereas the others indicate misuse or misconfiguration that
    /// will keep failing for every subsequent sample.
    pub fn is_per_sample(&self) -> bool {
        match self {
            Self::Unrepresentable { .. } => true,
            Self::FieldTooLong { field, .. } => *field == "key",
            _ => false,
        }
    }
}

/// An error while decoding a packet.
#[derive(Debug, PartialEq, Snafu)]
#[snafu(context(suffix(false)), module)]
pub enum DecodeError {
    /// A field needed more bytes than the buffer had left.
    #[snafu(display("buffer too small (needed {} bytes, {} remaining)", needed, remaining))]
    BufferTooSmall {
        /// Bytes needed by the field.
        needed: usize,

        /// Bytes remaining in the buffer.
        remaining: usize,
    },

    /// The version byte is not one this decoder understands.
    #[snafu(display("unknown version byte {:#04x}", version))]
    UnknownVersion {
        /// Raw version byte.
        version: u8,
    },

    /// An incrementally-encoded key could not be reconstructed.
    #[snafu(display("malformed key: {}", reason))]
    MalformedKey {
        /// What went wrong.
        reason: &'static str,
    },

    /// An entry was read in the wrong position, such as a metric before all headers.
    #[snafu(display("header read out of order: {}", reason))]
    HeaderOutOfOrder {
        /// What went wrong.
        reason: &'static str,
    },

    /// Entries were read before the packet preamble.
    #[snafu(display("packet preamble has not been read"))]
    NotStarted,

    /// The trailing checksum does not match the payload.
    #[snafu(display("checksum mismatch (expected {:#010x}, computed {:#010x})", expected, actual))]
    ChecksumMismatch {
        /// Checksum carried by the packet.
        expected: u32,

        /// Checksum computed over the payload.
        actual: u32,
    },
}

/// Splits `n` bytes off the front of `input`, returning the rest and the split bytes.
fn take(input: &[u8], n: usize) -> Result<(&[u8], &[u8]), DecodeError> {
    if input.len() < n {
        return Err(DecodeError::BufferTooSmall {
            needed: n,
            remaining: input.len(),
        });
    }

    let (data, rest) = input.split_at(n);
    Ok((rest, data))
}

/// Splits a length-prefixed field off the front of `input`.
fn take_prefixed(input: &[u8]) -> Result<(&[u8], &[u8]), DecodeError> {
    let (input, len) = take(input, 1)?;
    take(input, len[0] as usize)
}

/// Appends a length-prefixed field to `buf`.
///
/// The caller is responsible for checking the length against [`MAX_FIELD_LEN`].
fn put_prefixed(buf: &mut Vec<u8>, field: &[u8]) {
    debug_assert!(field.len() <= MAX_FIELD_LEN);
    buf.push(field.len() as u8);
    buf.extend_from_slice(field);
}

fn check_field_len(field: &'static str, len: usize) -> Result<(), EncodeError> {
    if len > MAX_FIELD_LEN {
        return Err(EncodeError::FieldTooLong { field, len });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_exact_and_short() {
        let (rest, data) = take(b"abc", 3).unwrap();
        assert_eq!(data, b"abc");
        assert!(rest.is_empty());

        assert_eq!(
            take(b"ab", 3),
            Err(DecodeError::BufferTooSmall { needed: 3, remaining: 2 })
        );
    }

    #[test]
    fn prefixed_overrun() {
        assert_eq!(
            take_prefixed(&[5, b'a', b'b']),
            Err(DecodeError::BufferTooSmall { needed: 5, remaining: 2 })
        );
        assert_eq!(take_prefixed(&[]), Err(DecodeError::BufferTooSmall { needed: 1, remaining: 0 }));
    }

    #[test]
    fn per_sample_classification() {
        assert!(EncodeError::Unrepresentable {
            value: 0.1,
            encoding: FloatEncoding::Float16
        }
        .is_per_sample());
        assert!(EncodeError::FieldTooLong { field: "key", len: 300 }.is_per_sample());
        assert!(!EncodeError::FieldTooLong {
            field: "application",
            len: 300
        }
        .is_per_sample());
        assert!(!EncodeError::MissingHeaders { missing: 1 }.is_per_sample());
    }
}
