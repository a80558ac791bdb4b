//! The low-level socket resource.

use std::{io, net::Shutdown};

use socket2::{Domain, Protocol, SockAddr, Type};
use sysio_buf::{BufResult, IntoInner, IoBuf, IoBufMut, Slice};
use sysio_driver::{
    op::{Accept, Connect, Recv, RecvFrom, Send, SendTo},
    AsRawFd, RawFd, SocketHandle,
};
use sysio_runtime::Attacher;

#[cfg(unix)]
use libc::sockaddr_storage;
#[cfg(windows)]
use windows_sys::Win32::Networking::WinSock::SOCKADDR_STORAGE as sockaddr_storage;

/// A socket owned by the calling thread's event queue.
///
/// Created non-blocking and non-inheritable; every pending operation on it
/// suspends into the queue. At most one operation may wait on a socket at
/// any time.
#[derive(Debug)]
pub struct Socket {
    handle: Attacher<SocketHandle>,
}

impl Socket {
    /// Create a new socket.
    pub fn new(domain: Domain, ty: Type, protocol: Option<Protocol>) -> io::Result<Self> {
        let raw = sys_socket(
            domain.into(),
            ty.into(),
            protocol.map(Into::into).unwrap_or(0),
        )?;
        // SAFETY: the socket id is fresh.
        Self::from_handle(unsafe { SocketHandle::from_raw(raw) })
    }

    pub(crate) fn from_handle(handle: SocketHandle) -> io::Result<Self> {
        Ok(Self {
            handle: Attacher::new(handle)?,
        })
    }

    /// Bind the socket to an address.
    pub fn bind(&self, addr: &SockAddr) -> io::Result<()> {
        sys_bind(self.as_raw_fd(), addr)
    }

    /// Start listening for connections.
    ///
    /// A `backlog` of 0 leaves the queue length to the OS default. The
    /// kernel clamps values above its limit.
    pub fn listen(&self, backlog: i32) -> io::Result<()> {
        sys_listen(self.as_raw_fd(), backlog)
    }

    /// The address the socket is bound to.
    pub fn local_addr(&self) -> io::Result<SockAddr> {
        sys_name(self.as_raw_fd(), false)
    }

    /// The address of the connected peer.
    pub fn peer_addr(&self) -> io::Result<SockAddr> {
        sys_name(self.as_raw_fd(), true)
    }

    /// Shut down one or both halves of the connection.
    pub fn shutdown(&self, how: Shutdown) -> io::Result<()> {
        sys_shutdown(self.as_raw_fd(), how)
    }

    /// Connect to `addr`.
    #[cfg(unix)]
    pub async fn connect(&self, addr: &SockAddr) -> io::Result<()> {
        let op = Connect::new(self.as_raw_fd(), addr.clone());
        let (res, _op) = sysio_runtime::submit(op).await;
        res.map(|_| ())
    }

    /// Connect to `addr`.
    #[cfg(windows)]
    pub async fn connect(&self, addr: &SockAddr) -> io::Result<()> {
        // ConnectEx wants a bound socket.
        if self.local_addr().is_err() {
            let local = if addr.domain() == Domain::IPV6 {
                SockAddr::from(std::net::SocketAddr::new(
                    std::net::Ipv6Addr::UNSPECIFIED.into(),
                    0,
                ))
            } else {
                SockAddr::from(std::net::SocketAddr::new(
                    std::net::Ipv4Addr::UNSPECIFIED.into(),
                    0,
                ))
            };
            self.bind(&local)?;
        }
        let op = Connect::new(self.as_raw_fd(), addr.clone());
        let (res, op) = sysio_runtime::submit(op).await;
        res?;
        op.update_context()?;
        Ok(())
    }

    /// Accept a connection, returning the connected socket and the peer
    /// address.
    #[cfg(unix)]
    pub async fn accept(&self) -> io::Result<(Self, SockAddr)> {
        let op = Accept::new(self.as_raw_fd());
        let (res, op) = sysio_runtime::submit(op).await;
        let raw = res? as RawFd;
        // SAFETY: accept returned a fresh socket id.
        let socket = Self::from_handle(unsafe { SocketHandle::from_raw(raw) })?;
        Ok((socket, op.into_addr()))
    }

    /// Accept a connection, returning the connected socket and the peer
    /// address.
    #[cfg(windows)]
    pub async fn accept(&self) -> io::Result<(Self, SockAddr)> {
        let domain = self.local_addr()?.domain();
        let accept_raw = sys_socket(
            domain.into(),
            Type::STREAM.into(),
            Protocol::TCP.into(),
        )?;
        // SAFETY: the socket id is fresh; it is owned by the operation
        // until AcceptEx resolves.
        let accept_handle = unsafe { SocketHandle::from_raw(accept_raw) };
        let op = Accept::new(self.as_raw_fd(), accept_handle.as_raw_fd());
        let (res, op) = sysio_runtime::submit(op).await;
        res?;
        op.update_context()?;
        let addr = op.into_addr()?;
        Ok((Self::from_handle(accept_handle)?, addr))
    }

    /// Receive into the buffer's spare capacity; resolves to 0 once the
    /// peer has shut down its sending half.
    pub async fn recv<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        let op = Recv::new(self.as_raw_fd(), buffer);
        BufResult::from(sysio_runtime::submit(op).await).into_inner()
    }

    /// Fill the buffer's spare capacity completely; an early end-of-stream
    /// surfaces as [`io::ErrorKind::UnexpectedEof`].
    pub async fn recv_exact<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        let need = buffer.buf_capacity();
        let mut filled = buffer.buf_len();
        let mut slice = Slice::new(buffer, filled);
        while filled < need {
            slice = Slice::new(slice.into_inner(), filled);
            let BufResult(res, ret) = self.recv(slice).await;
            slice = ret;
            match res {
                Ok(0) => {
                    return BufResult(
                        Err(io::ErrorKind::UnexpectedEof.into()),
                        slice.into_inner(),
                    )
                }
                Ok(n) => filled += n,
                Err(e) => return BufResult(Err(e), slice.into_inner()),
            }
        }
        BufResult(Ok(filled), slice.into_inner())
    }

    /// Send from the buffer; a socket may impose a short write.
    pub async fn send<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        let op = Send::new(self.as_raw_fd(), buffer);
        BufResult::from(sysio_runtime::submit(op).await).into_inner()
    }

    /// Send the whole buffer, looping over short writes.
    pub async fn send_all<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        let len = buffer.buf_len();
        let mut written = 0;
        let mut slice = Slice::new(buffer, 0);
        while written < len {
            slice = Slice::new(slice.into_inner(), written);
            let BufResult(res, ret) = self.send(slice).await;
            slice = ret;
            match res {
                Ok(0) => {
                    return BufResult(
                        Err(io::ErrorKind::WriteZero.into()),
                        slice.into_inner(),
                    )
                }
                Ok(n) => written += n,
                Err(e) => return BufResult(Err(e), slice.into_inner()),
            }
        }
        BufResult(Ok(written), slice.into_inner())
    }

    /// Receive a datagram and its source address.
    pub async fn recv_from<B: IoBufMut>(&self, buffer: B) -> BufResult<(usize, SockAddr), B> {
        let op = RecvFrom::new(self.as_raw_fd(), buffer);
        let (res, op) = sysio_runtime::submit(op).await;
        let (addr, buffer) = op.into_addr();
        BufResult(res, buffer).map(|n, buffer| ((n, addr), buffer))
    }

    /// Send a datagram to `addr`.
    pub async fn send_to<B: IoBuf>(&self, buffer: B, addr: &SockAddr) -> BufResult<usize, B> {
        let op = SendTo::new(self.as_raw_fd(), buffer, addr.clone());
        BufResult::from(sysio_runtime::submit(op).await).into_inner()
    }
}

impl AsRawFd for Socket {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// The largest backlog the platform accepts; the kernel clamps it down to
/// its own limit.
pub(crate) fn default_backlog() -> i32 {
    #[cfg(unix)]
    {
        i32::MAX
    }
    #[cfg(windows)]
    {
        windows_sys::Win32::Networking::WinSock::SOMAXCONN as i32
    }
}

#[cfg(unix)]
fn sys_socket(domain: i32, ty: i32, protocol: i32) -> io::Result<RawFd> {
    use sysio_driver::syscall;

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        syscall!(libc::socket(
            domain,
            ty | libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK,
            protocol
        ))
    }
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        // No atomic flags on this platform.
        let fd = syscall!(libc::socket(domain, ty, protocol))?;
        let res = syscall!(libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))
            .and_then(|_| syscall!(libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK)));
        if let Err(e) = res {
            unsafe { libc::close(fd) };
            return Err(e);
        }
        Ok(fd)
    }
}

#[cfg(unix)]
fn sys_bind(fd: RawFd, addr: &SockAddr) -> io::Result<()> {
    use sysio_driver::syscall;

    syscall!(libc::bind(fd, addr.as_ptr().cast(), addr.len())).map(|_| ())
}

#[cfg(unix)]
fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    use sysio_driver::syscall;

    syscall!(libc::listen(fd, backlog)).map(|_| ())
}

#[cfg(unix)]
fn sys_name(fd: RawFd, peer: bool) -> io::Result<SockAddr> {
    use sysio_driver::syscall;

    let mut storage: sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<sockaddr_storage>() as libc::socklen_t;
    let ptr = &mut storage as *mut sockaddr_storage as *mut libc::sockaddr;
    if peer {
        syscall!(libc::getpeername(fd, ptr, &mut len))?;
    } else {
        syscall!(libc::getsockname(fd, ptr, &mut len))?;
    }
    Ok(unsafe { SockAddr::new(storage, len) })
}

#[cfg(unix)]
fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    use sysio_driver::syscall;

    let how = match how {
        Shutdown::Read => libc::SHUT_RD,
        Shutdown::Write => libc::SHUT_WR,
        Shutdown::Both => libc::SHUT_RDWR,
    };
    syscall!(libc::shutdown(fd, how)).map(|_| ())
}

#[cfg(windows)]
pub(crate) fn startup() -> io::Result<()> {
    use once_cell::sync::OnceCell;
    use windows_sys::Win32::Networking::WinSock::{WSAStartup, WSADATA};

    static STARTUP: OnceCell<()> = OnceCell::new();

    STARTUP
        .get_or_try_init(|| {
            let mut data: WSADATA = unsafe { std::mem::zeroed() };
            let res = unsafe { WSAStartup(0x202, &mut data) };
            if res == 0 {
                Ok(())
            } else {
                Err(io::Error::from_raw_os_error(res))
            }
        })
        .map(|_| ())
}

#[cfg(windows)]
fn sys_socket(domain: i32, ty: i32, protocol: i32) -> io::Result<RawFd> {
    use windows_sys::Win32::Networking::WinSock::{
        WSASocketW, INVALID_SOCKET, WSA_FLAG_NO_HANDLE_INHERIT, WSA_FLAG_OVERLAPPED,
    };

    startup()?;
    let raw = unsafe {
        WSASocketW(
            domain,
            ty,
            protocol,
            std::ptr::null(),
            0,
            WSA_FLAG_OVERLAPPED | WSA_FLAG_NO_HANDLE_INHERIT,
        )
    };
    if raw == INVALID_SOCKET {
        Err(io::Error::last_os_error())
    } else {
        Ok(raw as RawFd)
    }
}

#[cfg(windows)]
fn sys_bind(fd: RawFd, addr: &SockAddr) -> io::Result<()> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Networking::WinSock::bind;

    syscall!(SOCKET, bind(fd as _, addr.as_ptr().cast(), addr.len())).map(|_| ())
}

#[cfg(windows)]
fn sys_listen(fd: RawFd, backlog: i32) -> io::Result<()> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Networking::WinSock::listen;

    syscall!(SOCKET, listen(fd as _, backlog)).map(|_| ())
}

#[cfg(windows)]
fn sys_name(fd: RawFd, peer: bool) -> io::Result<SockAddr> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Networking::WinSock::{getpeername, getsockname, SOCKADDR};

    let mut storage: sockaddr_storage = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<sockaddr_storage>() as i32;
    let ptr = &mut storage as *mut sockaddr_storage as *mut SOCKADDR;
    let res = if peer {
        syscall!(SOCKET, getpeername(fd as _, ptr, &mut len))
    } else {
        syscall!(SOCKET, getsockname(fd as _, ptr, &mut len))
    };
    res.map(|_| unsafe { SockAddr::new(storage, len) })
}

#[cfg(windows)]
fn sys_shutdown(fd: RawFd, how: Shutdown) -> io::Result<()> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Networking::WinSock::{shutdown, SD_BOTH, SD_RECEIVE, SD_SEND};

    let how = match how {
        Shutdown::Read => SD_RECEIVE,
        Shutdown::Write => SD_SEND,
        Shutdown::Both => SD_BOTH,
    };
    syscall!(SOCKET, shutdown(fd as _, how)).map(|_| ())
}
