//! Queue-driven files for Windows.
//!
//! Overlapped file I/O does not move the kernel's file pointer, so the
//! wrapper keeps its own 64-bit position and advances it by the number of
//! bytes each operation transferred.

use std::{cell::Cell, io, path::Path};

use sysio_buf::{BufResult, IntoInner, IoBufMut};
use sysio_driver::{
    op::{ReadAt, WriteAt},
    syscall, AsRawFd, FileHandle, RawFd,
};
use sysio_runtime::Attacher;
use widestring::U16CString;
use windows_sys::Win32::{
    Foundation::GENERIC_READ,
    Storage::FileSystem::{
        CreateFileW, CREATE_ALWAYS, FILE_FLAG_OVERLAPPED, FILE_GENERIC_WRITE, FILE_SHARE_DELETE,
        FILE_SHARE_READ, FILE_SHARE_WRITE, OPEN_EXISTING,
    },
};

/// A file attached to the thread's event queue.
pub struct AsyncFile {
    handle: Attacher<FileHandle>,
    pos: Cell<u64>,
}

impl AsyncFile {
    /// Open an existing file for reading.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_access(path.as_ref(), GENERIC_READ, OPEN_EXISTING)
    }

    /// Create (or truncate) a file for writing.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        Self::with_access(path.as_ref(), FILE_GENERIC_WRITE, CREATE_ALWAYS)
    }

    fn with_access(path: &Path, access: u32, disposition: u32) -> io::Result<Self> {
        let path = U16CString::from_os_str(path.as_os_str())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL"))?;
        let handle = syscall!(
            HANDLE,
            CreateFileW(
                path.as_ptr(),
                access,
                FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
                std::ptr::null(),
                disposition,
                FILE_FLAG_OVERLAPPED,
                0,
            )
        )?;
        // SAFETY: CreateFileW returned a fresh handle.
        let handle = unsafe { FileHandle::from_raw(handle) };
        Ok(Self {
            handle: Attacher::new(handle)?,
            pos: Cell::new(0),
        })
    }

    /// The current file position.
    pub fn position(&self) -> u64 {
        self.pos.get()
    }

    /// Move the file position.
    pub fn set_position(&self, pos: u64) {
        self.pos.set(pos);
    }

    /// Read up to the buffer's capacity at the current position; resolves
    /// to 0 at end-of-file.
    pub async fn read<B: IoBufMut>(&self, buffer: B) -> BufResult<usize, B> {
        let op = ReadAt::new(self.handle.as_raw_fd(), self.pos.get(), buffer);
        let (res, op) = sysio_runtime::submit(op).await;
        if let Ok(n) = res {
            self.advance(n);
        }
        BufResult(res, op.into_inner())
    }

    /// Write the buffer at the current position.
    pub async fn write<B: sysio_buf::IoBuf>(&self, buffer: B) -> BufResult<usize, B> {
        let op = WriteAt::new(self.handle.as_raw_fd(), self.pos.get(), buffer);
        let (res, op) = sysio_runtime::submit(op).await;
        if let Ok(n) = res {
            self.advance(n);
        }
        BufResult(res, op.into_inner())
    }

    fn advance(&self, n: usize) {
        let pos = self
            .pos
            .get()
            .checked_add(n as u64)
            .unwrap_or_else(|| panic!("file position overflowed 64 bits"));
        self.pos.set(pos);
    }
}

impl AsRawFd for AsyncFile {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}
