use crate::DecodeError;

/// Length of the checksum trailer, in bytes.
pub const CHECKSUM_LEN: usize = 4;

/// Computes the CRC32-C (Castagnoli) checksum of `data`.
pub fn checksum(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// Appends the big-endian checksum of the current contents of `buf` to `buf`.
pub fn add_checksum(buf: &mut Vec<u8>) {
    let sum = checksum(buf);
    buf.extend_from_slice(&sum.to_be_bytes());
}

/// Verifies the checksum trailer of `buf`, returning the payload without the trailer.
///
/// # Errors
///
/// If `buf` is shorter than the trailer, an error variant will be returned. If the trailer does not match the
/// payload, an error variant will be returned.
pub fn check_checksum(buf: &[u8]) -> Result<&[u8], DecodeError> {
    let Some(payload_len) = buf.len().checked_sub(CHECKSUM_LEN) else {
        return Err(DecodeError::BufferTooSmall {
            needed: CHECKSUM_LEN,
            remaining: buf.len(),
        });
    };

    let (payload, trailer) = buf.split_at(payload_len);
    let expected = u32::from_be_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]);
    let actual = checksum(payload);
    if expected != actual {
        return Err(DecodeError::ChecksumMismatch { expected, actual });
    }

    Ok(payload)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn castagnoli_check_value() {
        assert_eq!(checksum(b"123456789"), 0xe306_9283);
    }

    #[test]
    fn trailer_is_big_endian() {
        let mut buf = b"123456789".to_vec();
        add_checksum(&mut buf);
        assert_eq!(&buf[9..], &[0xe3, 0x06, 0x92, 0x83]);
        assert_eq!(check_checksum(&buf), Ok(&b"123456789"[..]));
    }

    #[test]
    fn short_buffer() {
        assert_eq!(
            check_checksum(&[1, 2, 3]),
            Err(DecodeError::BufferTooSmall { needed: 4, remaining: 3 })
        );
    }

    #[test]
    fn empty_payload() {
        let mut buf = Vec::new();
        add_checksum(&mut buf);
        assert_eq!(check_checksum(&buf), Ok(&[][..]));
    }

    proptest! {
        #[test]
        fn property_single_bit_flip_detected(payload in proptest::collection::vec(any::<u8>(), 0..512), bit in any::<prop::sample::Index>()) {
            let mut buf = payload.clone();
            add_checksum(&mut buf);

            let bit = bit.index(buf.len() * 8);
            buf[bit / 8] ^= 1 << (bit % 8);

            let is_mismatch = matches!(check_checksum(&buf), Err(DecodeError::ChecksumMismatch { .. }));
            prop_assert!(is_mismatch);
        }
    }
}
