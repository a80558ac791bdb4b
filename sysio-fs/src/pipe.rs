//! Anonymous pipes, with blocking and queue-driven ends.

use std::io;

use sysio_buf::{BufResult, IntoInner, IoBuf, IoBufMut, Slice};
use sysio_driver::{
    op::{Recv, Send},
    AsRawFd, FileHandle, RawFd,
};
use sysio_runtime::Attacher;

use crate::error::{partial_write, write_zero};

/// Creates a pair of blocking anonymous pipe ends, reader first.
///
/// Both ends are close-on-exec. Reading returns 0 once every write end is
/// closed; writing with every read end closed raises a broken-pipe error.
pub fn pipe() -> io::Result<(Receiver, Sender)> {
    let (rx, tx) = sys_pipe(false)?;
    Ok((Receiver { handle: rx }, Sender { handle: tx }))
}

/// Creates a pair of queue-driven anonymous pipe ends, reader first.
///
/// Both ends belong to the calling thread's event queue and cannot leave
/// the thread.
pub fn pipe_async() -> io::Result<(AsyncReceiver, AsyncSender)> {
    let (rx, tx) = sys_pipe(true)?;
    Ok((
        AsyncReceiver {
            handle: Attacher::new(rx)?,
        },
        AsyncSender {
            handle: Attacher::new(tx)?,
        },
    ))
}

/// The blocking read end of an anonymous pipe.
#[derive(Debug)]
pub struct Receiver {
    handle: FileHandle,
}

impl Receiver {
    /// Read up to `buf.len()` bytes; 0 means every write end is closed.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        crate::file::sys_read(self.handle.as_raw_fd(), buf)
    }
}

impl AsRawFd for Receiver {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// The blocking write end of an anonymous pipe.
#[derive(Debug)]
pub struct Sender {
    handle: FileHandle,
}

impl Sender {
    /// Write up to `buf.len()` bytes; a pipe may impose a short write.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        crate::file::sys_write(self.handle.as_raw_fd(), buf)
    }

    /// Write the whole of `buf`, looping over short writes.
    pub fn write_all(&self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match self.write(&buf[written..]) {
                Ok(0) => return Err(write_zero(written)),
                Ok(n) => written += n,
                Err(e) => return Err(partial_write(written, e)),
            }
        }
        Ok(written)
    }
}

impl AsRawFd for Sender {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// The queue-driven read end of an anonymous pipe.
pub struct AsyncReceiver {
    handle: Attacher<FileHandle>,
}

impl AsyncReceiver {
    /// Read up to the buffer's capacity; resolves to 0 once every write
    /// end is closed.
    pub async fn read<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        let op = Recv::new(self.handle.as_raw_fd(), buffer);
        BufResult::from(sysio_runtime::submit(op).await).into_inner()
    }

    /// Fill the buffer's spare capacity completely, looping over partial
    /// reads. An early end-of-file surfaces as
    /// [`io::ErrorKind::UnexpectedEof`].
    pub async fn read_exact<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        let need = buffer.buf_capacity();
        let mut filled = buffer.buf_len();
        let mut slice = Slice::new(buffer, filled);
        while filled < need {
            slice = Slice::new(slice.into_inner(), filled);
            let BufResult(res, ret) = self.read(slice).await;
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
}

impl AsRawFd for AsyncReceiver {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

/// The queue-driven write end of an anonymous pipe.
pub struct AsyncSender {
    handle: Attacher<FileHandle>,
}

impl AsyncSender {
    /// Write up to the buffer's length; a pipe may impose a short write.
    pub async fn write<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        let op = Send::new(self.handle.as_raw_fd(), buffer);
        BufResult::from(sysio_runtime::submit(op).await).into_inner()
    }

    /// Write the whole buffer, looping over short writes.
    pub async fn write_all<B: IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        let len = buffer.buf_len();
        let mut written = 0;
        let mut slice = Slice::new(buffer, 0);
        while written < len {
            slice = Slice::new(slice.into_inner(), written);
            let BufResult(res, ret) = self.write(slice).await;
            slice = ret;
            match res {
                Ok(0) => return BufResult(Err(write_zero(written)), slice.into_inner()),
                Ok(n) => written += n,
                Err(e) => {
                    return BufResult(Err(partial_write(written, e)), slice.into_inner())
                }
            }
        }
        BufResult(Ok(written), slice.into_inner())
    }
}

impl AsRawFd for AsyncSender {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

#[cfg(unix)]
fn sys_pipe(nonblocking: bool) -> io::Result<(FileHandle, FileHandle)> {
    use sysio_driver::syscall;

    let mut fds: [RawFd; 2] = [-1; 2];

    #[cfg(not(any(target_os = "macos", target_os = "ios")))]
    {
        let flags = libc::O_CLOEXEC | if nonblocking { libc::O_NONBLOCK } else { 0 };
        syscall!(libc::pipe2(fds.as_mut_ptr(), flags))?;
    }
    #[cfg(any(target_os = "macos", target_os = "ios"))]
    {
        // No pipe2 here; the flags go on right after creation, before the
        // fds can leak into a fork.
        syscall!(libc::pipe(fds.as_mut_ptr()))?;
        for fd in fds {
            syscall!(libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC))?;
            if nonblocking {
                syscall!(libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK))?;
            }
        }
    }

    // SAFETY: the pipe fds are fresh.
    Ok(unsafe { (FileHandle::from_raw(fds[0]), FileHandle::from_raw(fds[1])) })
}

#[cfg(windows)]
fn sys_pipe(overlapped: bool) -> io::Result<(FileHandle, FileHandle)> {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use sysio_driver::syscall;
    use widestring::U16CString;
    use windows_sys::Win32::{
        Foundation::GENERIC_WRITE,
        Storage::FileSystem::{
            CreateFileW, FILE_FLAG_FIRST_PIPE_INSTANCE, FILE_FLAG_OVERLAPPED, OPEN_EXISTING,
            PIPE_ACCESS_INBOUND,
        },
        System::{
            Pipes::{CreateNamedPipeW, CreatePipe, PIPE_READMODE_BYTE, PIPE_TYPE_BYTE, PIPE_WAIT},
            Threading::GetCurrentProcessId,
        },
    };

    if !overlapped {
        let mut rx = 0;
        let mut tx = 0;
        syscall!(BOOL, CreatePipe(&mut rx, &mut tx, std::ptr::null(), 0))?;
        // SAFETY: CreatePipe returned fresh handles.
        return Ok(unsafe { (FileHandle::from_raw(rx), FileHandle::from_raw(tx)) });
    }

    // Anonymous pipes cannot do overlapped I/O; emulate one with a
    // uniquely-named named pipe, as the standard library does for process
    // stdio.
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let name = format!(
        r"\\.\pipe\__sysio_anon_{}_{}",
        unsafe { GetCurrentProcessId() },
        COUNTER.fetch_add(1, Ordering::Relaxed),
    );
    let wide = U16CString::from_str(&name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pipe name contains a NUL"))?;
    let rx = syscall!(
        HANDLE,
        CreateNamedPipeW(
            wide.as_ptr(),
            PIPE_ACCESS_INBOUND | FILE_FLAG_OVERLAPPED | FILE_FLAG_FIRST_PIPE_INSTANCE,
            PIPE_TYPE_BYTE | PIPE_READMODE_BYTE | PIPE_WAIT,
            1,
            65536,
            65536,
            0,
            std::ptr::null(),
        )
    )?;
    // SAFETY: the server handle is fresh.
    let rx = unsafe { FileHandle::from_raw(rx) };
    let tx = syscall!(
        HANDLE,
        CreateFileW(
            wide.as_ptr(),
            GENERIC_WRITE,
            0,
            std::ptr::null(),
            OPEN_EXISTING,
            FILE_FLAG_OVERLAPPED,
            0,
        )
    )?;
    // SAFETY: the client handle is fresh.
    let tx = unsafe { FileHandle::from_raw(tx) };
    Ok((rx, tx))
}
