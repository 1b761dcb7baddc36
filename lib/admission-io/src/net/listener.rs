use std::{io, net::SocketAddr};

use snafu::{ResultExt as _, Snafu};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;
use tracing::debug;

/// A listener error.
#[derive(Debug, Snafu)]
#[snafu(context(suffix(false)))]
pub enum ListenerError {
    /// Failed to bind to the listen address.
    #[snafu(display("failed to bind to listen address {}: {}", address, source))]
    FailedToBind {
        /// Listen address.
        address: SocketAddr,

        /// Source of the error.
        source: io::Error,
    },

    /// Failed to configure a setting on the listening socket.
    #[snafu(display("failed to configure {} for listener on address {}: {}", setting, address, source))]
    FailedToConfigureListener {
        /// Listen address.
        address: SocketAddr,

        /// Name of the setting.
        setting: &'static str,

        /// Source of the error.
        source: io::Error,
    },
}

/// Binds a UDP socket to `address`.
///
/// When `receive_buffer_size` is set, the socket's receive buffer (`SO_RCVBUF`) is resized before binding. The
/// operating system may round or clamp the requested size.
///
/// Must be called from within a Tokio runtime.
///
/// ## Errors
///
/// If the socket cannot be created, configured, or bound, an error is returned.
pub fn bind_udp(address: SocketAddr, receive_buffer_size: Option<usize>) -> Result<UdpSocket, ListenerError> {
    let socket = Socket::new(Domain::for_address(address), Type::DGRAM, Some(Protocol::UDP))
        .context(FailedToBind { address })?;

    if let Some(size) = receive_buffer_size {
        socket.set_recv_buffer_size(size).context(FailedToConfigureListener {
            address,
            setting: "receive buffer size",
        })?;
    }
    socket.set_nonblocking(true).context(FailedToConfigureListener {
        address,
        setting: "non-blocking mode",
    })?;
    socket.bind(&address.into()).context(FailedToBind { address })?;

    let socket = UdpSocket::from_std(socket.into()).context(FailedToBind { address })?;
    debug!(
        listen_addr = %address,
        receive_buffer_size = socket2::SockRef::from(&socket).recv_buffer_size().ok(),
        "Bound UDP listener."
    );

    Ok(socket)
}
