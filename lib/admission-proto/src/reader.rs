use crate::{take, take_prefixed, DecodeError, FloatEncoding, KeyReader, Version};

/// The fixed leading fields of a packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Preamble<'b> {
    /// Version byte of the packet.
    pub version: Version,

    /// Name of the sending application.
    pub application: &'b [u8],

    /// Identifier of the sending instance.
    pub instance_id: &'b [u8],

    /// Number of headers that follow the preamble.
    pub header_count: usize,
}

/// Decodes packets produced by a [`Writer`][crate::Writer].
///
/// The reader expects a payload that has already had its checksum verified and removed. Keys are rebuilt in a
/// caller-provided scratch buffer, so a single reader can decode any number of packets without allocating.
///
/// # Usage
///
/// Call [`begin`][Self::begin] to read the preamble, then [`next_header`][Self::next_header] once per declared header,
/// and finally [`next`][Self::next] until the remaining input is empty.
#[derive(Debug)]
pub struct Reader<'s> {
    keys: KeyReader<'s>,
    encoding: Option<FloatEncoding>,
    headers_remaining: usize,
}

impl<'s> Reader<'s> {
    /// Creates a new `Reader` that rebuilds keys in `scratch`.
    pub fn with_scratch(scratch: &'s mut [u8]) -> Self {
        Self {
            keys: KeyReader::with_scratch(scratch),
            encoding: None,
            headers_remaining: 0,
        }
    }

    /// Returns the number of declared headers that have not been read yet.
    pub fn headers_remaining(&self) -> usize {
        self.headers_remaining
    }

    /// Reads the preamble of a new packet, returning the remaining input and the preamble.
    ///
    /// Any state left over from a previous packet is discarded.
    pub fn begin<'b>(&mut self, input: &'b [u8]) -> Result<(&'b [u8], Preamble<'b>), DecodeError> {
        self.keys.reset();
        self.encoding = None;
        self.headers_remaining = 0;

        let (input, version) = take(input, 1)?;
        let version = Version::from_byte(version[0])?;
        let (input, application) = take_prefixed(input)?;
        let (input, instance_id) = take_prefixed(input)?;
        let (input, header_count) = if version.headers_present() {
            let (input, count) = take(input, 1)?;
            (input, count[0] as usize)
        } else {
            (input, 0)
        };

        self.encoding = Some(version.encoding());
        self.headers_remaining = header_count;

        Ok((
            input,
            Preamble {
                version,
                application,
                instance_id,
                header_count,
            },
        ))
    }

    /// Reads the next header, returning the remaining input, the header key, and the header value.
    pub fn next_header<'b>(&mut self, input: &'b [u8]) -> Result<(&'b [u8], &'b [u8], &'b [u8]), DecodeError> {
        if self.encoding.is_none() {
            return Err(DecodeError::NotStarted);
        }
        if self.headers_remaining == 0 {
            return Err(DecodeError::HeaderOutOfOrder {
                reason: "all declared headers have been read",
            });
        }

        let (input, key) = take_prefixed(input)?;
        let (input, value) = take_prefixed(input)?;
        self.headers_remaining -= 1;

        Ok((input, key, value))
    }

    /// Reads the next metric sample, returning the remaining input, the key, and the value.
    ///
    /// The key borrows the reader's scratch buffer and is only valid until the next call.
    pub fn next<'b>(&mut self, input: &'b [u8]) -> Result<(&'b [u8], &[u8], f64), DecodeError> {
        let encoding = self.encoding.ok_or(DecodeError::NotStarted)?;
        if self.headers_remaining > 0 {
            return Err(DecodeError::HeaderOutOfOrder {
                reason: "headers must be read before metrics",
            });
        }

        let (input, key) = self.keys.next(input)?;
        let (input, value) = encoding.consume(input)?;

        Ok((input, key, value))
    }
}
