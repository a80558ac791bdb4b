//! TCP streams and listeners.

use std::{io, net::SocketAddr};

use socket2::{Domain, Protocol, SockAddr, Type};
use sysio_buf::{BufResult, IoBuf, IoBufMut};
use sysio_driver::{AsRawFd, RawFd};

use crate::{
    resolve,
    socket::{default_backlog, Socket},
    Family,
};

fn as_socket_addr(addr: SockAddr) -> io::Result<SocketAddr> {
    addr.as_socket().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidData, "socket has a non-inet address")
    })
}

/// A TCP socket server, listening for connections.
///
/// ```
/// use sysio_net::{TcpListener, TcpStream};
///
/// sysio_runtime::block_on(async {
///     let listener = TcpListener::bind("127.0.0.1:0".parse().unwrap()).unwrap();
///     let addr = listener.local_addr().unwrap();
///
///     let tx_fut = TcpStream::connect(addr);
///     let rx_fut = listener.accept();
///     let (tx, (rx, _)) = futures_util::try_join!(tx_fut, rx_fut).unwrap();
///
///     tx.send_all("test").await.0.unwrap();
///     let (_, buf) = rx.recv_exact(Vec::with_capacity(4)).await.unwrap();
///     assert_eq!(buf, b"test");
/// });
/// ```
pub struct TcpListener {
    inner: Socket,
}

impl TcpListener {
    /// Creates a new `TcpListener` bound to the specified address, ready
    /// for accepting connections.
    ///
    /// Binding with port 0 asks the OS to assign a port; query it back
    /// with [`local_addr`](TcpListener::local_addr). The listen backlog is
    /// the largest value the platform accepts.
    pub fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.bind(&SockAddr::from(addr))?;
        socket.listen(default_backlog())?;
        Ok(Self { inner: socket })
    }

    /// Resolve `host` and bind to the first endpoint that accepts,
    /// surfacing the last failure if none does.
    pub fn bind_resolved(host: &str, port: u16, family: Option<Family>) -> io::Result<Self> {
        let mut last_err = None;
        for addr in resolve(host, port, family)? {
            match Self::bind(addr) {
                Ok(listener) => return Ok(listener),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(could_not_resolve))
    }

    /// Accepts a new incoming connection. Resolves once a connection is
    /// established, to the stream and the remote peer's address.
    pub async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        let (socket, addr) = self.inner.accept().await?;
        Ok((TcpStream { inner: socket }, as_socket_addr(addr)?))
    }

    /// Returns the local address this listener is bound to.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        as_socket_addr(self.inner.local_addr()?)
    }
}

impl AsRawFd for TcpListener {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

/// A TCP stream between a local and a remote socket.
#[derive(Debug)]
pub struct TcpStream {
    inner: Socket,
}

impl TcpStream {
    /// Opens a TCP connection to `addr`.
    pub async fn connect(addr: SocketAddr) -> io::Result<Self> {
        let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
        socket.connect(&SockAddr::from(addr)).await?;
        Ok(Self { inner: socket })
    }

    /// Resolve `host` and connect to the endpoints in order until one
    /// accepts, surfacing the last failure if none does.
    pub async fn connect_resolved(
        host: &str,
        port: u16,
        family: Option<Family>,
    ) -> io::Result<Self> {
        let mut last_err = None;
        for addr in resolve(host, port, family)? {
            match Self::connect(addr).await {
                Ok(stream) => return Ok(stream),
                Err(e) => last_err = Some(e),
            }
        }
        Err(last_err.unwrap_or_else(could_not_resolve))
    }

    /// Receive into the buffer's spare capacity; resolves to 0 once the
    /// peer has shut down its sending half.
    pub async fn recv<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.recv(buffer).await
    }

    /// Fill the buffer's spare capacity completely.
    pub async fn recv_exact<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.recv_exact(buffer).await
    }

    /// Send from the buffer; the socket may impose a short write.
    pub async fn send<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.send(buffer).await
    }

    /// Send the whole buffer.
    pub async fn send_all<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        self.inner.send_all(buffer).await
    }

    /// Shut down one or both halves of the connection.
    pub fn shutdown(&self, how: std::net::Shutdown) -> io::Result<()> {
        self.inner.shutdown(how)
    }

    /// Returns the local address of this stream.
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        as_socket_addr(self.inner.local_addr()?)
    }

    /// Returns the address of the remote peer.
    pub fn peer_addr(&self) -> io::Result<SocketAddr> {
        as_socket_addr(self.inner.peer_addr()?)
    }
}

impl AsRawFd for TcpStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

fn could_not_resolve() -> io::Error {
    io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        "could not resolve to any address",
    )
}
