//! Pooled datagram storage.
use std::{fmt, net::SocketAddr};

use admission_proto::Reader;

use crate::{pooled_newtype, pooling::Clearable};

/// Default size of a message's receive buffer, in bytes.
pub const DEFAULT_MESSAGE_SIZE: usize = 1024;

/// Default size of a message's key scratch buffer, in bytes.
pub const DEFAULT_SCRATCH_SIZE: usize = 256;

/// Backing storage for a [`Message`].
///
/// Holds a fixed-size receive buffer, the number of bytes actually received into it, the address they came from, and a
/// scratch buffer that a [`Reader`] uses to rebuild keys without allocating.
pub struct MessageBuffer {
    raw: Box<[u8]>,
    len: usize,
    scratch: Box<[u8]>,
    remote_addr: Option<SocketAddr>,
}

impl MessageBuffer {
    /// Creates a new `MessageBuffer` with the default buffer sizes.
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_MESSAGE_SIZE, DEFAULT_SCRATCH_SIZE)
    }

    /// Creates a new `MessageBuffer` with the given receive and scratch buffer sizes.
    pub fn with_sizes(message_size: usize, scratch_size: usize) -> Self {
        Self {
            raw: vec![0; message_size].into_boxed_slice(),
            len: 0,
            scratch: vec![0; scratch_size].into_boxed_slice(),
            remote_addr: None,
        }
    }
}

impl Default for MessageBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Clearable for MessageBuffer {
    fn clear(&mut self) {
        // The scratch buffer is overwritten before it is read, so only the bookkeeping needs resetting.
        self.len = 0;
        self.remote_addr = None;
    }
}

pooled_newtype! {
    outer => Message,
    inner => MessageBuffer,
}

impl Message {
    /// Returns the received bytes.
    pub fn data(&self) -> &[u8] {
        let inner = self.inner();
        &inner.raw[..inner.len]
    }

    /// Returns the number of received bytes.
    pub fn len(&self) -> usize {
        self.inner().len
    }

    /// Returns `true` if no bytes have been received.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the size of the receive buffer.
    pub fn capacity(&self) -> usize {
        self.inner().raw.len()
    }

    /// Returns the address of the sender, if known.
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.inner().remote_addr
    }

    /// Returns the entire receive buffer, for filling by a receiver.
    ///
    /// The contents only become visible through [`data`][Self::data] once [`set_received`][Self::set_received] has
    /// been called.
    pub fn receive_buffer(&mut self) -> &mut [u8] {
        &mut self.inner_mut().raw[..]
    }

    /// Records that `len` bytes were received from `remote_addr`.
    ///
    /// `len` is clamped to the capacity of the receive buffer.
    pub fn set_received(&mut self, len: usize, remote_addr: Option<SocketAddr>) {
        let inner = self.inner_mut();
        inner.len = len.min(inner.raw.len());
        inner.remote_addr = remote_addr;
    }

    /// Shortens the received data to `len` bytes.
    ///
    /// Has no effect if `len` is not smaller than the current length.
    pub fn truncate(&mut self, len: usize) {
        let inner = self.inner_mut();
        inner.len = inner.len.min(len);
    }

    /// Returns the received bytes alongside the scratch buffer.
    pub fn split_mut(&mut self) -> (&[u8], &mut [u8]) {
        let inner = self.inner_mut();
        (&inner.raw[..inner.len], &mut inner.scratch[..])
    }

    /// Returns the received bytes alongside a [`Reader`] that rebuilds keys in this message's scratch buffer.
    pub fn reader(&mut self) -> (&[u8], Reader<'_>) {
        let (data, scratch) = self.split_mut();
        (data, Reader::with_scratch(scratch))
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .field("remote_addr", &self.remote_addr())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use admission_proto::{FloatEncoding, Writer};

    use super::*;
    use crate::pooling::{helpers::unpooled, BoundedObjectPool, ObjectPool as _};

    fn received(message: &mut Message, payload: &[u8]) {
        message.receive_buffer()[..payload.len()].copy_from_slice(payload);
        message.set_received(payload.len(), Some(([127, 0, 0, 1], 6969).into()));
    }

    #[test]
    fn data_is_bounded_by_received_len() {
        let mut message = unpooled::<Message>(MessageBuffer::with_sizes(16, 8));
        assert!(message.is_empty());
        assert_eq!(message.capacity(), 16);

        received(&mut message, b"hello");
        assert_eq!(message.data(), b"hello");

        message.truncate(2);
        assert_eq!(message.data(), b"he");
        message.truncate(10);
        assert_eq!(message.data(), b"he");

        message.set_received(100, None);
        assert_eq!(message.len(), 16);
    }

    #[test]
    fn cleared_on_return_to_pool() {
        let pool = BoundedObjectPool::<Message>::new("messages", 4);

        let mut message = pool.acquire();
        received(&mut message, b"payload");
        assert!(message.remote_addr().is_some());
        drop(message);

        let message = pool.acquire();
        assert!(message.is_empty());
        assert_eq!(message.remote_addr(), None);
    }

    #[test]
    fn reader_uses_scratch() {
        let mut buf = Vec::new();
        let mut writer = Writer::new(FloatEncoding::Float32);
        writer.begin(&mut buf, "app", b"i", 0).unwrap();
        writer.append(&mut buf, "metric", 2.5).unwrap();

        let mut message = unpooled::<Message>(MessageBuffer::new());
        received(&mut message, &buf);

        let (data, mut reader) = message.reader();
        let (rest, preamble) = reader.begin(data).unwrap();
        assert_eq!(preamble.application, b"app");

        let (rest, key, value) = reader.next(rest).unwrap();
        assert_eq!(key, b"metric");
        assert_eq!(value, 2.5);
        assert!(rest.is_empty());
    }
}
