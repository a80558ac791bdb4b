//! Completion implementations of the shared operations.

use std::{
    io,
    ptr::{null, null_mut, read_unaligned},
    task::Poll,
};

use once_cell::sync::OnceCell;
use socket2::SockAddr;
use sysio_buf::{IntoInner, IoBuf, IoBufMut};
use windows_sys::{
    core::GUID,
    Win32::{
        Foundation::{
            GetLastError, ERROR_BROKEN_PIPE, ERROR_HANDLE_EOF, ERROR_IO_INCOMPLETE,
            ERROR_IO_PENDING, ERROR_NETNAME_DELETED, ERROR_NO_DATA, ERROR_NO_MORE_ITEMS,
            ERROR_PIPE_CONNECTED, ERROR_PIPE_NOT_CONNECTED,
        },
        Networking::WinSock::{
            setsockopt, WSAIoctl, WSARecv, WSARecvFrom, WSASend, WSASendTo,
            LPFN_ACCEPTEX, LPFN_CONNECTEX, LPFN_GETACCEPTEXSOCKADDRS,
            SIO_GET_EXTENSION_FUNCTION_POINTER, SOCKADDR, SOL_SOCKET, SO_UPDATE_ACCEPT_CONTEXT,
            SO_UPDATE_CONNECT_CONTEXT, WSABUF, WSAID_ACCEPTEX, WSAID_CONNECTEX,
            WSAID_GETACCEPTEXSOCKADDRS,
        },
        Storage::FileSystem::{ReadFile, WriteFile},
        System::IO::OVERLAPPED,
    },
};

use super::{sockaddr_storage, socklen_t, OpCode, RawFd};
use crate::{
    op::{Connect, Recv, RecvFrom, Send, SendTo},
    syscall,
};

#[inline]
fn winapi_result(transferred: u32) -> Poll<io::Result<usize>> {
    let error = unsafe { GetLastError() };
    assert_ne!(error, 0);
    match error {
        ERROR_IO_PENDING => Poll::Pending,
        ERROR_IO_INCOMPLETE | ERROR_NETNAME_DELETED | ERROR_HANDLE_EOF | ERROR_BROKEN_PIPE
        | ERROR_NO_MORE_ITEMS | ERROR_PIPE_CONNECTED | ERROR_PIPE_NOT_CONNECTED
        | ERROR_NO_DATA => Poll::Ready(Ok(transferred as _)),
        _ => Poll::Ready(Err(io::Error::from_raw_os_error(error as _))),
    }
}

#[inline]
fn win32_result(res: i32, transferred: u32) -> Poll<io::Result<usize>> {
    if res == 0 {
        winapi_result(transferred)
    } else {
        Poll::Ready(Ok(transferred as _))
    }
}

#[inline]
fn winsock_result(res: i32, transferred: u32) -> Poll<io::Result<usize>> {
    if res != 0 {
        winapi_result(transferred)
    } else {
        Poll::Ready(Ok(transferred as _))
    }
}

fn get_wsa_fn<F>(handle: RawFd, fguid: GUID) -> io::Result<Option<F>> {
    let mut fptr = None;
    let mut returned = 0;
    syscall!(
        SOCKET,
        WSAIoctl(
            handle as _,
            SIO_GET_EXTENSION_FUNCTION_POINTER,
            std::ptr::addr_of!(fguid).cast(),
            std::mem::size_of_val(&fguid) as _,
            std::ptr::addr_of_mut!(fptr).cast(),
            std::mem::size_of::<F>() as _,
            &mut returned,
            null_mut(),
            None,
        )
    )?;
    Ok(fptr)
}

impl<T: IoBufMut> OpCode for Recv<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let slice = self.buffer.as_uninit();
        let mut transferred = 0;
        let res = ReadFile(
            fd,
            slice.as_mut_ptr() as _,
            slice.len() as _,
            &mut transferred,
            optr,
        );
        match win32_result(res, transferred) {
            Poll::Ready(Ok(n)) => {
                self.buffer.set_buf_init(n);
                Poll::Ready(Ok(n))
            }
            res => res,
        }
    }
}

impl<T: IoBuf> OpCode for Send<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let slice = self.buffer.as_slice();
        let mut transferred = 0;
        let res = WriteFile(
            self.fd,
            slice.as_ptr() as _,
            slice.len() as _,
            &mut transferred,
            optr,
        );
        win32_result(res, transferred)
    }
}

impl<T: IoBufMut> OpCode for RecvFrom<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let fd = self.fd;
        let slice = self.buffer.as_uninit();
        let buf = WSABUF {
            len: slice.len() as _,
            buf: slice.as_mut_ptr() as _,
        };
        self.addr_len = std::mem::size_of::<sockaddr_storage>() as _;
        let mut received = 0;
        self.flags = 0;
        let res = WSARecvFrom(
            fd as _,
            &buf,
            1,
            &mut received,
            &mut self.flags,
            &mut self.addr as *mut _ as *mut SOCKADDR,
            &mut self.addr_len,
            optr,
            None,
        );
        match winsock_result(res, received) {
            Poll::Ready(Ok(n)) => {
                self.buffer.set_buf_init(n);
                Poll::Ready(Ok(n))
            }
            res => res,
        }
    }
}

impl<T: IoBuf> OpCode for SendTo<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let slice = self.buffer.as_slice();
        let buf = WSABUF {
            len: slice.len() as _,
            buf: slice.as_ptr() as _,
        };
        let mut sent = 0;
        let res = WSASendTo(
            self.fd as _,
            &buf,
            1,
            &mut sent,
            0,
            self.addr.as_ptr().cast(),
            self.addr.len(),
            optr,
            None,
        );
        winsock_result(res, sent)
    }
}

static CONNECT_EX: OnceCell<LPFN_CONNECTEX> = OnceCell::new();

impl Connect {
    /// Update the connect context after a successful `ConnectEx`.
    pub fn update_context(&self) -> io::Result<()> {
        syscall!(
            SOCKET,
            setsockopt(
                self.fd as _,
                SOL_SOCKET,
                SO_UPDATE_CONNECT_CONTEXT,
                null(),
                0,
            )
        )?;
        Ok(())
    }
}

impl OpCode for Connect {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let connect_fn = CONNECT_EX
            .get_or_try_init(|| get_wsa_fn(self.fd, WSAID_CONNECTEX))?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::Unsupported, "cannot retrieve ConnectEx")
            })?;
        let mut sent = 0;
        let res = connect_fn(
            self.fd as _,
            self.addr.as_ptr().cast(),
            self.addr.len(),
            null(),
            0,
            &mut sent,
            optr,
        );
        win32_result(res, sent)
    }
}

static ACCEPT_EX: OnceCell<LPFN_ACCEPTEX> = OnceCell::new();
static GET_ADDRS: OnceCell<LPFN_GETACCEPTEXSOCKADDRS> = OnceCell::new();

const ACCEPT_ADDR_BUFFER_SIZE: usize = std::mem::size_of::<sockaddr_storage>() + 16;
const ACCEPT_BUFFER_SIZE: usize = ACCEPT_ADDR_BUFFER_SIZE * 2;

/// Accept a connection.
///
/// The caller creates the socket that receives the connection and hands it
/// over; `AcceptEx` fills it in.
pub struct Accept {
    pub(crate) fd: RawFd,
    pub(crate) accept_fd: RawFd,
    pub(crate) buffer: [u8; ACCEPT_BUFFER_SIZE],
}

impl Accept {
    /// Create [`Accept`]. `accept_fd` must be an unbound socket of the same
    /// family as the listener.
    pub fn new(fd: RawFd, accept_fd: RawFd) -> Self {
        Self {
            fd,
            accept_fd,
            buffer: [0u8; ACCEPT_BUFFER_SIZE],
        }
    }

    /// Update the accept context of the accepted socket.
    pub fn update_context(&self) -> io::Result<()> {
        syscall!(
            SOCKET,
            setsockopt(
                self.accept_fd as _,
                SOL_SOCKET,
                SO_UPDATE_ACCEPT_CONTEXT,
                &self.fd as *const _ as _,
                std::mem::size_of_val(&self.fd) as _,
            )
        )?;
        Ok(())
    }

    /// The remote address of the accepted connection.
    pub fn into_addr(self) -> io::Result<SockAddr> {
        let get_addrs_fn = GET_ADDRS
            .get_or_try_init(|| get_wsa_fn(self.fd, WSAID_GETACCEPTEXSOCKADDRS))?
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::Unsupported,
                    "cannot retrieve GetAcceptExSockAddrs",
                )
            })?;
        let mut local_addr: *mut SOCKADDR = null_mut();
        let mut local_addr_len = 0;
        let mut remote_addr: *mut SOCKADDR = null_mut();
        let mut remote_addr_len = 0;
        unsafe {
            get_addrs_fn(
                &self.buffer as *const _ as *const _,
                0,
                ACCEPT_ADDR_BUFFER_SIZE as _,
                ACCEPT_ADDR_BUFFER_SIZE as _,
                &mut local_addr,
                &mut local_addr_len,
                &mut remote_addr,
                &mut remote_addr_len,
            );
        }
        Ok(unsafe {
            SockAddr::new(
                read_unaligned(remote_addr.cast::<sockaddr_storage>()),
                remote_addr_len,
            )
        })
    }
}

impl OpCode for Accept {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        let accept_fn = ACCEPT_EX
            .get_or_try_init(|| get_wsa_fn(self.fd, WSAID_ACCEPTEX))?
            .ok_or_else(|| {
                io::Error::new(io::ErrorKind::Unsupported, "cannot retrieve AcceptEx")
            })?;
        let mut received = 0;
        let res = accept_fn(
            self.fd as _,
            self.accept_fd as _,
            self.buffer.as_mut_ptr() as _,
            0,
            ACCEPT_ADDR_BUFFER_SIZE as _,
            ACCEPT_ADDR_BUFFER_SIZE as _,
            &mut received,
            optr,
        );
        win32_result(res, received)
    }
}

/// Read from a seekable file at an explicit offset.
///
/// The kernel does not advance the file pointer for overlapped I/O; the
/// file wrapper tracks the position and passes it here.
pub struct ReadAt<T: IoBufMut> {
    pub(crate) fd: RawFd,
    pub(crate) offset: u64,
    pub(crate) buffer: T,
}

impl<T: IoBufMut> ReadAt<T> {
    /// Create [`ReadAt`].
    pub fn new(fd: RawFd, offset: u64, buffer: T) -> Self {
        Self { fd, offset, buffer }
    }
}

impl<T: IoBufMut> IntoInner for ReadAt<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

impl<T: IoBufMut> OpCode for ReadAt<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        if let Some(overlapped) = optr.as_mut() {
            overlapped.Anonymous.Anonymous.Offset = (self.offset & 0xFFFFFFFF) as _;
            overlapped.Anonymous.Anonymous.OffsetHigh = (self.offset >> 32) as _;
        }
        let fd = self.fd;
        let slice = self.buffer.as_uninit();
        let mut transferred = 0;
        let res = ReadFile(
            fd,
            slice.as_mut_ptr() as _,
            slice.len() as _,
            &mut transferred,
            optr,
        );
        match win32_result(res, transferred) {
            Poll::Ready(Ok(n)) => {
                self.buffer.set_buf_init(n);
                Poll::Ready(Ok(n))
            }
            res => res,
        }
    }
}

/// Write to a seekable file at an explicit offset.
pub struct WriteAt<T: IoBuf> {
    pub(crate) fd: RawFd,
    pub(crate) offset: u64,
    pub(crate) buffer: T,
}

impl<T: IoBuf> WriteAt<T> {
    /// Create [`WriteAt`].
    pub fn new(fd: RawFd, offset: u64, buffer: T) -> Self {
        Self { fd, offset, buffer }
    }
}

impl<T: IoBuf> IntoInner for WriteAt<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

impl<T: IoBuf> OpCode for WriteAt<T> {
    fn fd(&self) -> RawFd {
        self.fd
    }

    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>> {
        if let Some(overlapped) = optr.as_mut() {
            overlapped.Anonymous.Anonymous.Offset = (self.offset & 0xFFFFFFFF) as _;
            overlapped.Anonymous.Anonymous.OffsetHigh = (self.offset >> 32) as _;
        }
        let slice = self.buffer.as_slice();
        let mut transferred = 0;
        let res = WriteFile(
            self.fd,
            slice.as_ptr() as _,
            slice.len() as _,
            &mut transferred,
            optr,
        );
        win32_result(res, transferred)
    }
}
