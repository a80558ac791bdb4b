//! UDP sockets.

use std::{io, net::SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Type};
use sysio_buf::{BufResult, IoBuf, IoBufMut};
use sysio_driver::{AsRawFd, RawFd};

use crate::socket::Socket;

/// A UDP socket bound to a local address.
pub struct UdpSocket {
    inner: Socket,
}

impl UdpSocket {
    /// Creates a UDP socket bound to `addr`.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::DGRAM, Some(Protocol::UDP))?;
        socket.bind(&SockAddr::from(addr))?;
        Ok(Self { inner: socket })
    }

    /// Set the default destination (and filter the source) of datagrams.
    ///
    /// A datagram connect assigns the peer without any handshake, so this
    /// resolves without suspending.
    pub async fn connect(&self, addr: SocketAddr) -> io::Result<()> {
        self.inner.connect(&SockAddr::from(addr)).await
    }

    /// Receive a datagram from the connected peer.
    pub async fn recv<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.recv(buffer).await
    }

    /// Send a datagram to the connected peer.
    pub async fn send<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.send(buffer).await
    }

    /// Receive a datagram and the address it came from.
    pub async fn recv_from<B: IoBufMut>(&self, buffer: B) -> BufResult<(usize, SocketAddr), B> {
        let BufResult(res, buffer) = self.inner.recv_from(buffer).await;
        let res = res.and_then(|(n, addr)| {
            let addr = addr.as_socket().ok_or_else(|| {
                io::Error::new(io::ErrorKind::InvalidData, "datagram from a non-inet address")
            })?;
            Ok((n, addr))
        });
        BufResult(res, buffer)
    }

    /// Send a datagram to `addr`.
    pub async fn send_to<B: IoBuf>(&self, buffer: B, addr: SocketAddr) -> BufResult<usize, B> {
        self.inner.send_to(buffer, &SockAddr::from(addr)).await
    }

    /// Returns the local address this socket is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()?.as_socket().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidData, "socket has a non-inet address")
        })
    }
}

impl AsRawFd for UdpSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
