use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use admission_core::{
    dispatcher::DispatcherConfiguration,
    message::{Message, MessageBuffer, DEFAULT_MESSAGE_SIZE, DEFAULT_SCRATCH_SIZE},
    pooling::BoundedObjectPool,
};
use serde::Deserialize;

use crate::net::{bind_udp, ListenerError, UdpBatchReceiver};

const fn default_listen_address() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 6969)
}

const fn default_message_size() -> usize {
    DEFAULT_MESSAGE_SIZE
}

const fn default_scratch_size() -> usize {
    DEFAULT_SCRATCH_SIZE
}

const fn default_pool_capacity() -> usize {
    1024
}

/// Receiver configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ReceiverConfiguration {
    /// Address to listen on.
    ///
    /// Defaults to `0.0.0.0:6969`.
    #[serde(default = "default_listen_address")]
    pub listen_address: SocketAddr,

    /// Requested size of the socket receive buffer, in bytes.
    ///
    /// Defaults to the operating system default.
    #[serde(default)]
    pub receive_buffer_size: Option<usize>,

    /// Size of each message's receive buffer, in bytes.
    ///
    /// Datagrams longer than this are truncated and will fail checksum validation. Defaults to 1024.
    #[serde(default = "default_message_size")]
    pub message_size: usize,

    /// Size of each message's key scratch buffer, in bytes.
    ///
    /// Defaults to 256.
    #[serde(default = "default_scratch_size")]
    pub scratch_size: usize,

    /// Maximum number of idle messages the pool retains.
    ///
    /// Defaults to 1024.
    #[serde(default = "default_pool_capacity")]
    pub pool_capacity: usize,

    /// Dispatcher settings, read from the same level as the fields above (`batch_size`, `max_in_flight`).
    #[serde(flatten)]
    pub dispatcher: DispatcherConfiguration,
}

impl ReceiverConfiguration {
    /// Binds the listening socket and wraps it in a batch receiver.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// ## Errors
    ///
    /// If the socket cannot be bound or configured, an error is returned.
    pub fn build_receiver(&self) -> Result<UdpBatchReceiver, ListenerError> {
        bind_udp(self.listen_address, self.receive_buffer_size).map(UdpBatchReceiver::new)
    }

    /// Builds the message pool.
    pub fn build_pool(&self) -> BoundedObjectPool<Message> {
        let (message_size, scratch_size) = (self.message_size, self.scratch_size);
        BoundedObjectPool::with_builder("messages", self.pool_capacity, move || {
            MessageBuffer::with_sizes(message_size, scratch_size)
        })
    }
}

impl Default for ReceiverConfiguration {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            receive_buffer_size: None,
            message_size: default_message_size(),
            scratch_size: default_scratch_size(),
            pool_capacity: default_pool_capacity(),
            dispatcher: DispatcherConfiguration::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use admission_core::pooling::ObjectPool as _;

    use super::*;

    #[test]
    fn defaults() {
        let config = ReceiverConfiguration::default();
        assert_eq!(config.listen_address.port(), 6969);
        assert!(config.listen_address.ip().is_unspecified());
        assert_eq!(config.receive_buffer_size, None);
        assert_eq!(config.dispatcher.batch_size, 128);
    }

    #[test]
    fn pool_uses_configured_sizes() {
        let config = ReceiverConfiguration {
            message_size: 64,
            pool_capacity: 2,
            ..Default::default()
        };

        let pool = config.build_pool();
        assert_eq!(pool.capacity(), 2);
        assert_eq!(pool.acquire().capacity(), 64);
    }

    #[tokio::test]
    async fn binds_ephemeral_port() {
        let config = ReceiverConfiguration {
            listen_address: "127.0.0.1:0".parse().unwrap(),
            receive_buffer_size: Some(64 * 1024),
            ..Default::default()
        };

        let receiver = config.build_receiver().unwrap();
        assert_ne!(receiver.local_addr().unwrap().port(), 0);
    }
}
