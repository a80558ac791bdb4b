//! RAII ownership of raw kernel resource ids.

use std::{fmt, io, marker::PhantomData};

use crate::{AsRawFd, RawFd};

mod sealed {
    pub trait Sealed {}
    impl Sealed for super::File {}
    impl Sealed for super::Socket {}
}

/// The kind of kernel resource a [`Handle`] owns.
///
/// On unix every id is a file descriptor; on Windows files and sockets are
/// released through different system calls, so the kind decides how a
/// handle closes.
pub trait HandleKind: sealed::Sealed {
    /// The sentinel value of an invalid id.
    const INVALID: RawFd;

    /// Release the id.
    ///
    /// # Safety
    ///
    /// `raw` must be an id of this kind that the caller owns.
    unsafe fn close(raw: RawFd) -> io::Result<()>;

    /// Whether the error from [`HandleKind::close`] means the id was
    /// already closed.
    fn is_closed_error(err: &io::Error) -> bool;
}

/// Marker for generic file ids (files, pipes, event queue objects).
#[derive(Debug)]
pub enum File {}

/// Marker for socket ids.
#[derive(Debug)]
pub enum Socket {}

#[cfg(unix)]
impl HandleKind for File {
    const INVALID: RawFd = -1;

    unsafe fn close(raw: RawFd) -> io::Result<()> {
        crate::syscall!(libc::close(raw)).map(|_| ())
    }

    fn is_closed_error(err: &io::Error) -> bool {
        err.raw_os_error() == Some(libc::EBADF)
    }
}

#[cfg(unix)]
impl HandleKind for Socket {
    const INVALID: RawFd = -1;

    unsafe fn close(raw: RawFd) -> io::Result<()> {
        crate::syscall!(libc::close(raw)).map(|_| ())
    }

    fn is_closed_error(err: &io::Error) -> bool {
        err.raw_os_error() == Some(libc::EBADF)
    }
}

#[cfg(windows)]
impl HandleKind for File {
    const INVALID: RawFd = windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;

    unsafe fn close(raw: RawFd) -> io::Result<()> {
        crate::syscall!(BOOL, windows_sys::Win32::Foundation::CloseHandle(raw)).map(|_| ())
    }

    fn is_closed_error(err: &io::Error) -> bool {
        err.raw_os_error()
            == Some(windows_sys::Win32::Foundation::ERROR_INVALID_HANDLE as _)
    }
}

#[cfg(windows)]
impl HandleKind for Socket {
    const INVALID: RawFd = windows_sys::Win32::Networking::WinSock::INVALID_SOCKET as RawFd;

    unsafe fn close(raw: RawFd) -> io::Result<()> {
        crate::syscall!(
            SOCKET,
            windows_sys::Win32::Networking::WinSock::closesocket(raw as _)
        )
        .map(|_| ())
    }

    fn is_closed_error(err: &io::Error) -> bool {
        err.raw_os_error() == Some(windows_sys::Win32::Networking::WinSock::WSAENOTSOCK)
    }
}

/// Exclusive ownership of a raw kernel resource id.
///
/// A live handle releases its id exactly once, when it is dropped or
/// explicitly [`close`](Handle::close)d; [`into_raw`](Handle::into_raw)
/// gives the id up without releasing it. Handles cannot be copied or
/// cloned, so a double release cannot be expressed.
pub struct Handle<K: HandleKind> {
    raw: RawFd,
    _kind: PhantomData<K>,
}

/// A handle owning a file id.
pub type FileHandle = Handle<File>;

/// A handle owning a socket id.
pub type SocketHandle = Handle<Socket>;

impl<K: HandleKind> Handle<K> {
    /// Take ownership of `raw`.
    ///
    /// # Safety
    ///
    /// `raw` must be an open id of kind `K` that nothing else will close.
    pub const unsafe fn from_raw(raw: RawFd) -> Self {
        Self {
            raw,
            _kind: PhantomData,
        }
    }

    /// Borrow the id for the lifetime of the handle. The caller must not
    /// close it.
    pub fn as_raw(&self) -> RawFd {
        self.raw
    }

    /// Yield the id and invalidate the handle. Dropping the handle
    /// afterwards does nothing.
    pub fn into_raw(mut self) -> RawFd {
        std::mem::replace(&mut self.raw, K::INVALID)
    }

    /// Release the id now.
    ///
    /// # Panics
    ///
    /// Closing an invalid or already-closed handle is a programmer error
    /// and panics.
    pub fn close(mut self) -> io::Result<()> {
        let raw = std::mem::replace(&mut self.raw, K::INVALID);
        if raw == K::INVALID {
            panic!("close of an invalid handle");
        }
        match unsafe { K::close(raw) } {
            Err(e) if K::is_closed_error(&e) => {
                panic!("close of an already-closed handle {raw}: {e}")
            }
            res => res,
        }
    }
}

impl<K: HandleKind> Drop for Handle<K> {
    fn drop(&mut self) {
        if self.raw != K::INVALID {
            // Errors cannot be reported from here; in particular a
            // closed-handle condition must not panic mid-unwind.
            if let Err(_e) = unsafe { K::close(self.raw) } {
                sysio_log::debug!("error closing handle {}: {}", self.raw, _e);
            }
        }
    }
}

impl<K: HandleKind> AsRawFd for Handle<K> {
    fn as_raw_fd(&self) -> RawFd {
        self.raw
    }
}

impl<K: HandleKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Handle").field(&self.raw).finish()
    }
}
