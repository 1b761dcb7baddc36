use std::{io, net::SocketAddr};

use admission_core::message::Message;
#[cfg(not(target_os = "linux"))]
use tokio::net::UdpSocket;

/// Reads queued datagrams into `messages` until the socket would block or the batch is full.
///
/// Returns an error only if no datagram was read at all.
#[cfg(not(target_os = "linux"))]
pub(super) fn recv_batch(socket: &UdpSocket, messages: &mut [Message]) -> io::Result<usize> {
    fill_batch(messages, |buf| socket.try_recv_from(buf))
}

fn fill_batch<F>(messages: &mut [Message], mut recv_from: F) -> io::Result<usize>
where
    F: FnMut(&mut [u8]) -> io::Result<(usize, SocketAddr)>,
{
    let mut received = 0;
    for message in messages.iter_mut() {
        match recv_from(message.receive_buffer()) {
            Ok((len, remote_addr)) => {
                message.set_received(len, Some(remote_addr));
                received += 1;
            }
            // Datagrams already read are handed out first. A persistent error resurfaces on the next call.
            Err(_) if received > 0 => break,
            Err(e) => return Err(e),
        }
    }

    Ok(received)
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use admission_core::{message::MessageBuffer, pooling::helpers::unpooled};

    use super::*;

    fn messages(n: usize) -> Vec<Message> {
        (0..n).map(|_| unpooled::<Message>(MessageBuffer::with_sizes(16, 8))).collect()
    }

    fn scripted(
        mut script: VecDeque<io::Result<&'static [u8]>>,
    ) -> impl FnMut(&mut [u8]) -> io::Result<(usize, SocketAddr)> {
        move |buf| {
            let payload = script
                .pop_front()
                .unwrap_or_else(|| Err(io::ErrorKind::WouldBlock.into()))?;
            buf[..payload.len()].copy_from_slice(payload);
            Ok((payload.len(), ([127, 0, 0, 1], 7000).into()))
        }
    }

    #[test]
    fn stops_when_socket_would_block() {
        let mut batch = messages(4);
        let received = fill_batch(&mut batch, scripted(VecDeque::from([Ok(&b"one"[..]), Ok(&b"two"[..])]))).unwrap();

        assert_eq!(received, 2);
        assert_eq!(batch[0].data(), b"one");
        assert_eq!(batch[1].data(), b"two");
        assert!(batch[2].is_empty());
    }

    #[test]
    fn error_after_partial_batch_keeps_received() {
        let mut batch = messages(4);
        let script = VecDeque::from([
            Ok(&b"kept"[..]),
            Err(io::Error::from(io::ErrorKind::ConnectionReset)),
            Ok(&b"later"[..]),
        ]);
        let received = fill_batch(&mut batch, scripted(script)).unwrap();

        assert_eq!(received, 1);
        assert_eq!(batch[0].data(), b"kept");
        assert_eq!(batch[0].remote_addr(), Some(([127, 0, 0, 1], 7000).into()));
    }

    #[test]
    fn error_on_empty_batch_is_returned() {
        let mut batch = messages(4);
        let script = VecDeque::from([Err(io::Error::from(io::ErrorKind::ConnectionReset))]);

        let err = fill_batch(&mut batch, scripted(script)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionReset);

        let err = fill_batch(&mut batch, scripted(VecDeque::new())).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
    }
}
