//! Readiness implementations of the shared operations.

use std::{io, task::Poll};

use socket2::SockAddr;
use sysio_buf::{IoBuf, IoBufMut};

use super::{sockaddr_storage, socklen_t, Decision, Interest, OpCode, RawFd};
use crate::{
    op::{Connect, Recv, RecvFrom, Send, SendTo},
    syscall,
};

impl<T: IoBufMut> OpCode for Recv<T> {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_readable(self.fd))
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let slice = self.buffer.as_uninit();
        let (ptr, len) = (slice.as_mut_ptr(), slice.len());
        match syscall!(break libc::read(fd, ptr as _, len as _)) {
            Poll::Ready(Ok(n)) => {
                unsafe { self.buffer.set_buf_init(n) };
                Poll::Ready(Ok(n))
            }
            res => res,
        }
    }
}

impl<T: IoBuf> OpCode for Send<T> {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_writable(self.fd))
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let slice = self.buffer.as_slice();
        syscall!(break libc::write(self.fd, slice.as_ptr() as _, slice.len() as _))
    }
}

impl<T: IoBufMut> OpCode for RecvFrom<T> {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_readable(self.fd))
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let slice = self.buffer.as_uninit();
        let (ptr, len) = (slice.as_mut_ptr(), slice.len());
        self.addr_len = std::mem::size_of::<sockaddr_storage>() as _;
        let addr = &mut self.addr as *mut sockaddr_storage;
        let addr_len = &mut self.addr_len as *mut socklen_t;
        match syscall!(break libc::recvfrom(fd, ptr as _, len as _, 0, addr as _, addr_len)) {
            Poll::Ready(Ok(n)) => {
                unsafe { self.buffer.set_buf_init(n) };
                Poll::Ready(Ok(n))
            }
            res => res,
        }
    }
}

impl<T: IoBuf> OpCode for SendTo<T> {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_writable(self.fd))
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let slice = self.buffer.as_slice();
        syscall!(break libc::sendto(
            self.fd,
            slice.as_ptr() as _,
            slice.len() as _,
            0,
            self.addr.as_ptr().cast(),
            self.addr.len()
        ))
    }
}

impl OpCode for Connect {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        syscall!(
            libc::connect(self.fd, self.addr.as_ptr().cast(), self.addr.len()),
            wait_writable(self.fd)
        )
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let mut err: libc::c_int = 0;
        let mut err_len = std::mem::size_of::<libc::c_int>() as socklen_t;

        let res = syscall!(libc::getsockopt(
            self.fd,
            libc::SOL_SOCKET,
            libc::SO_ERROR,
            &mut err as *mut _ as *mut _,
            &mut err_len
        ));
        Poll::Ready(res.and_then(|_| {
            if err == 0 {
                Ok(0)
            } else {
                Err(io::Error::from_raw_os_error(err))
            }
        }))
    }
}

/// Accept a connection.
///
/// The accepted socket is created close-on-exec and non-blocking, ready to
/// join the queue of the accepting thread.
pub struct Accept {
    pub(crate) fd: RawFd,
    pub(crate) addr: sockaddr_storage,
    pub(crate) addr_len: socklen_t,
}

impl Accept {
    /// Create [`Accept`].
    pub fn new(fd: RawFd) -> Self {
        Self {
            fd,
            addr: unsafe { std::mem::zeroed() },
            addr_len: std::mem::size_of::<sockaddr_storage>() as _,
        }
    }

    /// The remote address of the accepted connection.
    pub fn into_addr(self) -> SockAddr {
        unsafe { SockAddr::new(self.addr, self.addr_len) }
    }
}

impl OpCode for Accept {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_readable(self.fd))
    }

    #[cfg(any(target_os = "linux", target_os = "freebsd", target_os = "netbsd"))]
    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let addr = &mut self.addr as *mut sockaddr_storage;
        let addr_len = &mut self.addr_len as *mut socklen_t;
        syscall!(break libc::accept4(
            fd,
            addr as _,
            addr_len,
            libc::SOCK_CLOEXEC | libc::SOCK_NONBLOCK
        ))
    }

    #[cfg(not(any(target_os = "linux", target_os = "freebsd", target_os = "netbsd")))]
    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let addr = &mut self.addr as *mut sockaddr_storage;
        let addr_len = &mut self.addr_len as *mut socklen_t;
        match syscall!(break libc::accept(fd, addr as _, addr_len)) {
            Poll::Ready(Ok(conn)) => {
                let conn = conn as RawFd;
                // No atomic flags on accept here; set them before the fd can
                // leak into a fork or block a reader.
                let res = syscall!(libc::fcntl(conn, libc::F_SETFD, libc::FD_CLOEXEC))
                    .and_then(|_| syscall!(libc::fcntl(conn, libc::F_SETFL, libc::O_NONBLOCK)));
                match res {
                    Ok(_) => Poll::Ready(Ok(conn as usize)),
                    Err(e) => {
                        unsafe { libc::close(conn) };
                        Poll::Ready(Err(e))
                    }
                }
            }
            res => res,
        }
    }
}

/// Wait until a resource is ready for an interest, without transferring
/// any data. Completes with 0.
pub struct PollOnce {
    pub(crate) fd: RawFd,
    pub(crate) interest: Interest,
}

impl PollOnce {
    /// Create [`PollOnce`].
    pub fn new(fd: RawFd, interest: Interest) -> Self {
        Self { fd, interest }
    }
}

impl OpCode for PollOnce {
    fn pre_submit(&mut self) -> io::Result<Decision> {
        Ok(Decision::wait_for(self.fd, self.interest))
    }

    fn on_event(&mut self) -> Poll<io::Result<usize>> {
        Poll::Ready(Ok(0))
    }
}
