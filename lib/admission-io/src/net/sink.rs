use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket},
};

use admission_core::packetizer::PacketSink;

/// A [`PacketSink`] that sends each packet as a single datagram to a fixed address.
pub struct UdpSink {
    socket: UdpSocket,
}

impl UdpSink {
    /// Creates a new `UdpSink` connected to `address`, from an ephemeral local port.
    pub fn connect(address: SocketAddr) -> io::Result<Self> {
        let local: SocketAddr = match address {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local)?;
        socket.connect(address)?;
        Ok(Self { socket })
    }

    /// Returns the local address the sink sends from.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }
}

impl PacketSink for UdpSink {
    fn send(&mut self, packet: &[u8]) -> io::Result<()> {
        let sent = self.socket.send(packet)?;
        if sent != packet.len() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("datagram truncated ({} of {} bytes sent)", sent, packet.len()),
            ));
        }
        Ok(())
    }
}
