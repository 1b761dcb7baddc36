use std::{io, mem, os::fd::AsRawFd as _, ptr};

use admission_core::message::Message;
use socket2::SockAddr;
use tokio::net::UdpSocket;

/// Reads up to `messages.len()` datagrams with a single non-blocking `recvmmsg(2)` call.
///
/// Returns `WouldBlock` when nothing is queued, so this can be driven by `UdpSocket::async_io`.
pub(super) fn recv_batch(socket: &UdpSocket, messages: &mut [Message]) -> io::Result<usize> {
    // SAFETY: `sockaddr_storage` is plain data, and all-zeroes is a valid value.
    let empty_addr: libc::sockaddr_storage = unsafe { mem::zeroed() };
    let mut addrs = vec![empty_addr; messages.len()];

    let mut iovecs = messages
        .iter_mut()
        .map(|message| {
            let buf = message.receive_buffer();
            libc::iovec {
                iov_base: buf.as_mut_ptr().cast(),
                iov_len: buf.len(),
            }
        })
        .collect::<Vec<_>>();

    let mut headers = iovecs
        .iter_mut()
        .zip(addrs.iter_mut())
        .map(|(iov, addr)| {
            // SAFETY: `mmsghdr` is plain data, and all-zeroes is a valid value.
            let mut header: libc::mmsghdr = unsafe { mem::zeroed() };
            header.msg_hdr.msg_name = (addr as *mut libc::sockaddr_storage).cast();
            header.msg_hdr.msg_namelen = mem::size_of::<libc::sockaddr_storage>() as libc::socklen_t;
            header.msg_hdr.msg_iov = iov;
            header.msg_hdr.msg_iovlen = 1;
            header
        })
        .collect::<Vec<_>>();

    // SAFETY: every header points at an iovec and an address slot that live until the end of this function, and every
    // iovec covers the receive buffer of a message we hold exclusively for the duration of the call.
    let received = unsafe {
        libc::recvmmsg(
            socket.as_raw_fd(),
            headers.as_mut_ptr(),
            headers.len() as _,
            libc::MSG_DONTWAIT as _,
            ptr::null_mut(),
        )
    };
    if received < 0 {
        return Err(io::Error::last_os_error());
    }

    let received = received as usize;
    for ((message, header), addr) in messages.iter_mut().zip(&headers).zip(&addrs).take(received) {
        // SAFETY: the kernel initialized `msg_namelen` bytes of the address slot.
        let remote_addr = unsafe { SockAddr::new(*addr, header.msg_hdr.msg_namelen) }.as_socket();
        message.set_received(header.msg_len as usize, remote_addr);
    }

    Ok(received)
}
