use std::{io, net::SocketAddr};

use admission_core::{dispatcher::BatchReceiver, message::Message};
use async_trait::async_trait;
use tokio::net::UdpSocket;

#[cfg(target_os = "linux")]
mod linux;

#[cfg(any(not(target_os = "linux"), test))]
mod non_linux;

/// A [`BatchReceiver`] over a UDP socket.
///
/// On Linux, each batch is read with a single `recvmmsg(2)` call. On other platforms, datagrams are read one at a time
/// until the socket has no more queued or the batch is full.
pub struct UdpBatchReceiver {
    socket: UdpSocket,
}

impl UdpBatchReceiver {
    /// Creates a new `UdpBatchReceiver` from a bound socket.
    pub fn new(socket: UdpSocket) -> Self {
        Self { socket }
    }

    /// Returns the local address of the underlying socket.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

#[async_trait]
impl BatchReceiver for UdpBatchReceiver {
    #[cfg(target_os = "linux")]
    async fn receive_batch(&mut self, messages: &mut [Message]) -> io::Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        let socket = &self.socket;
        socket
            .async_io(tokio::io::Interest::READABLE, || linux::recv_batch(socket, messages))
            .await
    }

    #[cfg(not(target_os = "linux"))]
    async fn receive_batch(&mut self, messages: &mut [Message]) -> io::Result<usize> {
        if messages.is_empty() {
            return Ok(0);
        }

        loop {
            self.socket.readable().await?;
            match non_linux::recv_batch(&self.socket, messages) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(e),
            }
        }
    }
}
