//! Operation definitions shared by every backend.
//!
//! An operation owns everything the kernel may look at while it is in
//! flight: the buffer, the peer address storage, the overlapped record on
//! Windows. The queue keeps the operation alive until its completion entry
//! is consumed or the kernel confirms a cancellation.

use socket2::SockAddr;
use sysio_buf::{IntoInner, IoBuf, IoBufMut};

use crate::{sys, RawFd};

#[cfg(unix)]
pub use crate::sys::op::{Accept, PollOnce};
#[cfg(windows)]
pub use crate::sys::op::{Accept, ReadAt, WriteAt};

/// Receive data from a stream resource (pipe or connected socket).
pub struct Recv<T: IoBufMut> {
    pub(crate) fd: RawFd,
    pub(crate) buffer: T,
}

impl<T: IoBufMut> Recv<T> {
    /// Create [`Recv`].
    pub fn new(fd: RawFd, buffer: T) -> Self {
        Self { fd, buffer }
    }
}

impl<T: IoBufMut> IntoInner for Recv<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

/// Send data to a stream resource (pipe or connected socket).
pub struct Send<T: IoBuf> {
    pub(crate) fd: RawFd,
    pub(crate) buffer: T,
}

impl<T: IoBuf> Send<T> {
    /// Create [`Send`].
    pub fn new(fd: RawFd, buffer: T) -> Self {
        Self { fd, buffer }
    }
}

impl<T: IoBuf> IntoInner for Send<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

/// Receive a datagram and the address it came from.
pub struct RecvFrom<T: IoBufMut> {
    pub(crate) fd: RawFd,
    pub(crate) buffer: T,
    pub(crate) addr: sys::sockaddr_storage,
    pub(crate) addr_len: sys::socklen_t,
    #[cfg(windows)]
    pub(crate) flags: u32,
}

impl<T: IoBufMut> RecvFrom<T> {
    /// Create [`RecvFrom`].
    pub fn new(fd: RawFd, buffer: T) -> Self {
        Self {
            fd,
            buffer,
            addr: unsafe { std::mem::zeroed() },
            addr_len: std::mem::size_of::<sys::sockaddr_storage>() as _,
            #[cfg(windows)]
            flags: 0,
        }
    }

    /// The source address of the received datagram.
    pub fn into_addr(self) -> (SockAddr, T) {
        let addr = unsafe { SockAddr::new(self.addr, self.addr_len) };
        (addr, self.buffer)
    }
}

impl<T: IoBufMut> IntoInner for RecvFrom<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

/// Send a datagram to an address.
pub struct SendTo<T: IoBuf> {
    pub(crate) fd: RawFd,
    pub(crate) buffer: T,
    pub(crate) addr: SockAddr,
}

impl<T: IoBuf> SendTo<T> {
    /// Create [`SendTo`].
    pub fn new(fd: RawFd, buffer: T, addr: SockAddr) -> Self {
        Self { fd, buffer, addr }
    }
}

impl<T: IoBuf> IntoInner for SendTo<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

/// Connect a socket to an address.
///
/// On POSIX an in-progress connect waits for writability and the final
/// status is read back with `SO_ERROR`. On Windows the socket must already
/// be bound; `ConnectEx` performs the connect and the wrapper applies
/// `SO_UPDATE_CONNECT_CONTEXT` afterwards.
pub struct Connect {
    pub(crate) fd: RawFd,
    pub(crate) addr: SockAddr,
}

impl Connect {
    /// Create [`Connect`].
    pub fn new(fd: RawFd, addr: SockAddr) -> Self {
        Self { fd, addr }
    }
}
