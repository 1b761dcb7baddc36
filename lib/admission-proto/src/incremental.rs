//! Incremental key compression.
//!
//! Each key is written as the length of the prefix it shares with the previous key in the packet, followed by the
//! length of the remaining suffix and the suffix itself:
//!
//! ```text
//! [1] shared prefix length
//! [1] suffix length
//! [..] suffix
//! ```
//!
//! Metric keys within a packet tend to be emitted in sorted order with long common prefixes, so most keys collapse to
//! a handful of bytes.
use crate::{check_field_len, take, DecodeError, EncodeError, MAX_FIELD_LEN};

/// Writes incrementally-compressed keys.
#[derive(Debug, Default)]
pub struct KeyWriter {
    previous: Vec<u8>,
}

impl KeyWriter {
    /// Creates a new `KeyWriter` with no previous key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forgets the previous key, so that the next key is written in full.
    pub fn reset(&mut self) {
        self.previous.clear();
    }

    /// Appends `key` to `buf`.
    ///
    /// # Errors
    ///
    /// If the key is longer than 255 bytes, an error variant will be returned and neither `buf` nor the previous key
    /// are modified.
    pub fn append(&mut self, buf: &mut Vec<u8>, key: &[u8]) -> Result<(), EncodeError> {
        check_field_len("key", key.len())?;

        let shared = shared_prefix_len(&self.previous, key);
        let suffix = &key[shared..];

        buf.reserve(2 + suffix.len());
        buf.push(shared as u8);
        buf.push(suffix.len() as u8);
        buf.extend_from_slice(suffix);

        self.previous.truncate(shared);
        self.previous.extend_from_slice(suffix);

        Ok(())
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

/// Reads incrementally-compressed keys, reconstructing each one into a caller-provided scratch buffer.
///
/// Keys are only valid until the next call to [`next`][Self::next], since they are rebuilt in place.
#[derive(Debug)]
pub struct KeyReader<'s> {
    scratch: &'s mut [u8],
    len: usize,
}

impl<'s> KeyReader<'s> {
    /// Creates a new `KeyReader` that rebuilds keys in `scratch`.
    ///
    /// Keys longer than `scratch` are rejected as malformed, so a scratch buffer of at least 255 bytes is needed to
    /// read every key a [`KeyWriter`] can produce.
    pub fn with_scratch(scratch: &'s mut [u8]) -> Self {
        Self { scratch, len: 0 }
    }

    /// Forgets the previous key.
    pub fn reset(&mut self) {
        self.len = 0;
    }

    /// Returns the most recently read key.
    pub fn current(&self) -> &[u8] {
        &self.scratch[..self.len]
    }

    /// Reads the next key from the front of `input`, returning the remaining input and the key.
    ///
    /// # Errors
    ///
    /// If the length bytes are missing, an error variant will be returned. If the shared prefix is longer than the
    /// previous key, the suffix runs past the end of `input`, or the key does not fit in the scratch buffer, a
    /// malformed key error will be returned.
    pub fn next<'b>(&mut self, input: &'b [u8]) -> Result<(&'b [u8], &[u8]), DecodeError> {
        let (input, lens) = take(input, 2)?;
        let shared = lens[0] as usize;
        let suffix_len = lens[1] as usize;

        if shared > self.len {
            return Err(DecodeError::MalformedKey {
                reason: "shared prefix is longer than the previous key",
            });
        }
        if suffix_len > input.len() {
            return Err(DecodeError::MalformedKey {
                reason: "suffix runs past the end of the buffer",
            });
        }

        let key_len = shared + suffix_len;
        if key_len > MAX_FIELD_LEN {
            return Err(DecodeError::MalformedKey {
                reason: "key is longer than 255 bytes",
            });
        }
        if key_len > self.scratch.len() {
            return Err(DecodeError::MalformedKey {
                reason: "key does not fit in the scratch buffer",
            });
        }

        let (suffix, rest) = input.split_at(suffix_len);
        self.scratch[shared..key_len].copy_from_slice(suffix);
        self.len = key_len;

        Ok((rest, &self.scratch[..key_len]))
    }
}
