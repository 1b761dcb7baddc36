use crate::{check_field_len, put_prefixed, EncodeError, FloatEncoding, KeyWriter, Version, MAX_FIELD_LEN};

/// Encodes packets into a caller-provided buffer.
///
/// A packet is started with [`begin`][Self::begin], followed by exactly as many [`append_header`][Self::append_header]
/// calls as headers were declared, followed by any number of [`append`][Self::append] calls. The checksum trailer is
/// not written by the writer; see [`add_checksum`][crate::add_checksum].
///
/// Every method either writes a complete entry or, on error, leaves both the buffer and the writer's state exactly as
/// they were. This lets callers snapshot the buffer length before an append and roll back to it.
#[derive(Debug)]
pub struct Writer {
    encoding: FloatEncoding,
    keys: KeyWriter,
    headers_remaining: usize,
    metrics_started: bool,
}

impl Writer {
    /// Creates a new `Writer` that encodes values with the given float encoding.
    pub fn new(encoding: FloatEncoding) -> Self {
        Self {
            encoding,
            keys: KeyWriter::new(),
            headers_remaining: 0,
            metrics_started: false,
        }
    }

    /// Returns the float encoding used for values.
    pub fn encoding(&self) -> FloatEncoding {
        self.encoding
    }

    /// Returns the number of declared headers that have not been written yet.
    pub fn headers_remaining(&self) -> usize {
        self.headers_remaining
    }

    /// Forgets the previously written key, so that the next key is written in full.
    pub fn reset(&mut self) {
        self.keys.reset();
    }

    /// Starts a new packet, writing the version byte, application, instance ID, and header count.
    ///
    /// Any state left over from a previous packet is discarded.
    ///
    /// # Errors
    ///
    /// If the application, instance ID, or header count exceed 255, an error variant will be returned.
    pub fn begin(
        &mut self, buf: &mut Vec<u8>, application: &str, instance_id: &[u8], header_count: usize,
    ) -> Result<(), EncodeError> {
        check_field_len("application", application.len())?;
        check_field_len("instance ID", instance_id.len())?;
        if header_count > MAX_FIELD_LEN {
            return Err(EncodeError::FieldTooLong {
                field: "header count",
                len: header_count,
            });
        }

        self.reset();
        self.metrics_started = false;
        self.headers_remaining = header_count;

        let headers_present = header_count > 0;
        buf.push(Version::new(self.encoding, headers_present).to_byte());
        put_prefixed(buf, application.as_bytes());
        put_prefixed(buf, instance_id);
        if headers_present {
            buf.push(header_count as u8);
        }

        Ok(())
    }

    /// Appends a header.
    ///
    /// # Errors
    ///
    /// If a metric has already been appended, or all declared headers have already been written, an error variant will
    /// be returned. If the key or value is longer than 255 bytes, an error variant will be returned.
    pub fn append_header(&mut self, buf: &mut Vec<u8>, key: &[u8], value: &[u8]) -> Result<(), EncodeError> {
        if self.metrics_started {
            return Err(EncodeError::HeaderOutOfOrder {
                reason: "headers must precede all metrics",
            });
        }
        if self.headers_remaining == 0 {
            return Err(EncodeError::HeaderOutOfOrder {
                reason: "more headers written than declared",
            });
        }
        check_field_len("header key", key.len())?;
        check_field_len("header value", value.len())?;

        put_prefixed(buf, key);
        put_prefixed(buf, value);
        self.headers_remaining -= 1;

        Ok(())
    }

    /// Appends a metric sample.
    ///
    /// # Errors
    ///
    /// If declared headers are still outstanding, an error variant will be returned. If the key is longer than 255
    /// bytes, or the value cannot be represented in the writer's float encoding, an error variant will be returned.
    pub fn append(&mut self, buf: &mut Vec<u8>, key: &str, value: f64) -> Result<(), EncodeError> {
        if self.headers_remaining > 0 {
            return Err(EncodeError::MissingHeaders {
                missing: self.headers_remaining,
            });
        }

        let mut scratch = [0; 8];
        let encoded = self.encoding.encode(value, &mut scratch)?;
        self.keys.append(buf, key.as_bytes())?;
        buf.extend_from_slice(encoded);
        self.metrics_started = true;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn begun(encoding: FloatEncoding, header_count: usize) -> (Writer, Vec<u8>) {
        let mut writer = Writer::new(encoding);
        let mut buf = Vec::new();
        writer.begin(&mut buf, "app", b"inst", header_count).unwrap();
        (writer, buf)
    }

    #[test]
    fn preamble_layout() {
        let (_, buf) = begun(FloatEncoding::Float32, 0);
        assert_eq!(buf, [0b001, 3, b'a', b'p', b'p', 4, b'i', b'n', b's', b't']);

        let (_, buf) = begun(FloatEncoding::Float64, 2);
        assert_eq!(buf, [0b110, 3, b'a', b'p', b'p', 4, b'i', b'n', b's', b't', 2]);
    }

    #[test]
    fn begin_rejects_long_fields() {
        let mut writer = Writer::new(FloatEncoding::Float64);
        let mut buf = Vec::new();
        let long = "a".repeat(256);

        assert_eq!(
            writer.begin(&mut buf, &long, b"", 0),
            Err(EncodeError::FieldTooLong {
                field: "application",
                len: 256
            })
        );
        assert_eq!(
            writer.begin(&mut buf, "app", long.as_bytes(), 0),
            Err(EncodeError::FieldTooLong {
                field: "instance ID",
                len: 256
            })
        );
        assert_eq!(
            writer.begin(&mut buf, "app", b"", 256),
            Err(EncodeError::FieldTooLong {
                field: "header count",
                len: 256
            })
        );
        assert!(buf.is_empty());
    }

    #[test]
    fn begin_resets_key_state() {
        let (mut writer, mut buf) = begun(FloatEncoding::Float64, 0);
        writer.append(&mut buf, "metric.one", 1.0).unwrap();

        let mut second = Vec::new();
        writer.begin(&mut second, "app", b"inst", 0).unwrap();
        let start = second.len();
        writer.append(&mut second, "metric.one", 1.0).unwrap();

        // Written in full rather than relative to the previous packet's last key.
        assert_eq!(&second[start..start + 2], &[0, 10]);
    }

    #[test]
    fn header_ordering() {
        let (mut writer, mut buf) = begun(FloatEncoding::Float64, 1);

        assert_eq!(
            writer.append(&mut buf, "early", 1.0),
            Err(EncodeError::MissingHeaders { missing: 1 })
        );

        writer.append_header(&mut buf, b"k", b"v").unwrap();
        assert_eq!(writer.headers_remaining(), 0);
        assert!(matches!(
            writer.append_header(&mut buf, b"k2", b"v2"),
            Err(EncodeError::HeaderOutOfOrder { .. })
        ));

        writer.append(&mut buf, "late", 1.0).unwrap();
        assert!(matches!(
            writer.append_header(&mut buf, b"k3", b"v3"),
            Err(EncodeError::HeaderOutOfOrder { .. })
        ));
    }

    #[test]
    fn failed_append_is_atomic() {
        let (mut writer, mut buf) = begun(FloatEncoding::Float16, 0);
        writer.append(&mut buf, "metric.a", 1.0).unwrap();
        let snapshot = buf.clone();

        assert!(matches!(
            writer.append(&mut buf, "metric.b", 0.1),
            Err(EncodeError::Unrepresentable { .. })
        ));
        assert!(matches!(
            writer.append(&mut buf, &"m".repeat(300), 1.0),
            Err(EncodeError::FieldTooLong { .. })
        ));
        assert_eq!(buf, snapshot);

        // Key compression continues relative to "metric.a".
        let start = buf.len();
        writer.append(&mut buf, "metric.c", 2.0).unwrap();
        assert_eq!(&buf[start..start + 3], &[7, 1, b'c']);
    }
}
