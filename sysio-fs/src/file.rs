//! Synchronous files.

use std::{io, path::Path};

use sysio_driver::{AsRawFd, FileHandle, RawFd};

use crate::error::{partial_write, write_zero};

/// Options and flags which can be used to configure how a file is opened.
#[derive(Debug, Clone)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    truncate: bool,
    create: bool,
    create_new: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenOptions {
    /// Creates a blank new set of options ready for configuration. All
    /// options are initially `false`.
    pub fn new() -> Self {
        Self {
            read: false,
            write: false,
            append: false,
            truncate: false,
            create: false,
            create_new: false,
        }
    }

    /// Sets the option for read access.
    pub fn read(&mut self, read: bool) -> &mut Self {
        self.read = read;
        self
    }

    /// Sets the option for write access.
    pub fn write(&mut self, write: bool) -> &mut Self {
        self.write = write;
        self
    }

    /// Sets the option for append mode.
    pub fn append(&mut self, append: bool) -> &mut Self {
        self.append = append;
        self
    }

    /// Sets the option for truncating a previous file.
    pub fn truncate(&mut self, truncate: bool) -> &mut Self {
        self.truncate = truncate;
        self
    }

    /// Sets the option to create the file if it does not exist.
    pub fn create(&mut self, create: bool) -> &mut Self {
        self.create = create;
        self
    }

    /// Sets the option to create a new file, failing if it already exists.
    pub fn create_new(&mut self, create_new: bool) -> &mut Self {
        self.create_new = create_new;
        self
    }

    fn check(&self) -> io::Result<()> {
        if (self.create || self.create_new || self.truncate) && !(self.write || self.append) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "creating or truncating a file requires write access",
            ));
        }
        Ok(())
    }

    /// Opens a file at `path` with the options specified by `self`.
    pub fn open(&self, path: impl AsRef<Path>) -> io::Result<File> {
        self.check()?;
        sys_open(path.as_ref(), self).map(|handle| File { handle })
    }
}

/// A synchronous file.
///
/// Reads return up to the requested length, 0 at end-of-file. Writes
/// transfer the whole buffer or raise an error carrying the number of
/// bytes written so far (see [`PartialWriteError`](crate::PartialWriteError)).
#[derive(Debug)]
pub struct File {
    handle: FileHandle,
}

/// Where to seek from.
#[derive(Debug, Clone, Copy)]
pub enum SeekFrom {
    /// From the start of the file.
    Start(u64),
    /// From the end of the file.
    End(i64),
    /// From the current position.
    Current(i64),
}

impl File {
    /// Attempts to open a file in read-only mode.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        OpenOptions::new().read(true).open(path)
    }

    /// Opens a file in write-only mode, creating it if needed and
    /// truncating it otherwise.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
    }

    /// Take ownership of a raw file id.
    ///
    /// # Safety
    ///
    /// `fd` must be an open file id that nothing else will close.
    pub unsafe fn from_raw(fd: RawFd) -> Self {
        Self {
            handle: FileHandle::from_raw(fd),
        }
    }

    /// Read up to `buf.len()` bytes. Returns the number of bytes read,
    /// which may be less than requested; 0 means end-of-file.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        sys_read(self.handle.as_raw_fd(), buf)
    }

    /// Write the whole of `buf`.
    ///
    /// A file does not impose short writes: either every byte is
    /// transferred, or the error reports how many were.
    pub fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            match sys_write(self.handle.as_raw_fd(), &buf[written..]) {
                Ok(0) => return Err(write_zero(written)),
                Ok(n) => written += n,
                Err(e) => return Err(partial_write(written, e)),
            }
        }
        Ok(written)
    }

    /// Seek to a position in the file, returning the new position.
    pub fn seek(&self, pos: SeekFrom) -> io::Result<u64> {
        sys_seek(self.handle.as_raw_fd(), pos)
    }

    /// Flush file data and metadata to disk.
    pub fn sync_all(&self) -> io::Result<()> {
        sys_sync(self.handle.as_raw_fd())
    }

    /// Yield the raw file id, invalidating the file.
    pub fn into_raw(self) -> RawFd {
        self.handle.into_raw()
    }
}

impl AsRawFd for File {
    fn as_raw_fd(&self) -> RawFd {
        self.handle.as_raw_fd()
    }
}

#[cfg(unix)]
fn sys_open(path: &Path, opts: &OpenOptions) -> io::Result<FileHandle> {
    use std::{ffi::CString, os::unix::ffi::OsStrExt};

    use sysio_driver::syscall;

    let path = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte"))?;
    let access = match (opts.read, opts.write, opts.append) {
        (true, false, false) => libc::O_RDONLY,
        (false, true, false) => libc::O_WRONLY,
        (true, true, false) => libc::O_RDWR,
        (_, _, true) => {
            libc::O_APPEND | if opts.read { libc::O_RDWR } else { libc::O_WRONLY }
        }
        (false, false, false) => {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "the file must be opened for reading, writing or appending",
            ))
        }
    };
    let creation = match (opts.create, opts.truncate, opts.create_new) {
        (_, _, true) => libc::O_CREAT | libc::O_EXCL,
        (true, true, false) => libc::O_CREAT | libc::O_TRUNC,
        (true, false, false) => libc::O_CREAT,
        (false, true, false) => libc::O_TRUNC,
        (false, false, false) => 0,
    };
    let fd = syscall!(libc::open(
        path.as_ptr(),
        access | creation | libc::O_CLOEXEC,
        0o666
    ))?;
    // SAFETY: open returned a fresh fd.
    Ok(unsafe { FileHandle::from_raw(fd) })
}

#[cfg(unix)]
pub(crate) fn sys_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    use sysio_driver::syscall;

    loop {
        match syscall!(libc::read(fd, buf.as_mut_ptr() as _, buf.len() as _)) {
            Ok(n) => return Ok(n as usize),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(unix)]
pub(crate) fn sys_write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    use sysio_driver::syscall;

    loop {
        match syscall!(libc::write(fd, buf.as_ptr() as _, buf.len() as _)) {
            Ok(n) => return Ok(n as usize),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

#[cfg(unix)]
fn sys_seek(fd: RawFd, pos: SeekFrom) -> io::Result<u64> {
    use sysio_driver::syscall;

    let (whence, offset) = match pos {
        SeekFrom::Start(n) => (libc::SEEK_SET, n as libc::off_t),
        SeekFrom::End(n) => (libc::SEEK_END, n as libc::off_t),
        SeekFrom::Current(n) => (libc::SEEK_CUR, n as libc::off_t),
    };
    let off = syscall!(libc::lseek(fd, offset, whence))?;
    Ok(off as u64)
}

#[cfg(unix)]
fn sys_sync(fd: RawFd) -> io::Result<()> {
    use sysio_driver::syscall;

    syscall!(libc::fsync(fd)).map(|_| ())
}

#[cfg(windows)]
fn sys_open(path: &Path, opts: &OpenOptions) -> io::Result<FileHandle> {
    use sysio_driver::syscall;
    use widestring::U16CString;
    use windows_sys::Win32::{
        Foundation::GENERIC_READ,
        Storage::FileSystem::{
            CreateFileW, CREATE_ALWAYS, CREATE_NEW, FILE_APPEND_DATA, FILE_ATTRIBUTE_NORMAL,
            FILE_GENERIC_WRITE, FILE_SHARE_DELETE, FILE_SHARE_READ, FILE_SHARE_WRITE,
            OPEN_ALWAYS, OPEN_EXISTING, TRUNCATE_EXISTING,
        },
    };

    let path = U16CString::from_os_str(path.as_os_str())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL"))?;
    let mut access = 0;
    if opts.read {
        access |= GENERIC_READ;
    }
    if opts.write {
        access |= FILE_GENERIC_WRITE;
    }
    if opts.append {
        access |= FILE_APPEND_DATA;
    }
    let disposition = match (opts.create, opts.truncate, opts.create_new) {
        (_, _, true) => CREATE_NEW,
        (true, true, false) => CREATE_ALWAYS,
        (true, false, false) => OPEN_ALWAYS,
        (false, true, false) => TRUNCATE_EXISTING,
        (false, false, false) => OPEN_EXISTING,
    };
    let handle = syscall!(
        HANDLE,
        CreateFileW(
            path.as_ptr(),
            access,
            FILE_SHARE_READ | FILE_SHARE_WRITE | FILE_SHARE_DELETE,
            std::ptr::null(),
            disposition,
            FILE_ATTRIBUTE_NORMAL,
            0,
        )
    )?;
    // SAFETY: CreateFileW returned a fresh handle.
    Ok(unsafe { FileHandle::from_raw(handle) })
}

#[cfg(windows)]
pub(crate) fn sys_read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    use windows_sys::Win32::{
        Foundation::{ERROR_BROKEN_PIPE, ERROR_HANDLE_EOF},
        Storage::FileSystem::ReadFile,
    };

    let mut read = 0;
    let res = unsafe {
        ReadFile(
            fd,
            buf.as_mut_ptr() as _,
            buf.len() as _,
            &mut read,
            std::ptr::null_mut(),
        )
    };
    if res == 0 {
        let e = io::Error::last_os_error();
        match e.raw_os_error() {
            // A closed pipe peer and the end of a file both mean
            // end-of-stream, not an error.
            Some(code)
                if code == ERROR_BROKEN_PIPE as i32 || code == ERROR_HANDLE_EOF as i32 =>
            {
                Ok(0)
            }
            _ => Err(e),
        }
    } else {
        Ok(read as usize)
    }
}

#[cfg(windows)]
pub(crate) fn sys_write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Storage::FileSystem::WriteFile;

    let mut written = 0;
    syscall!(
        BOOL,
        WriteFile(
            fd,
            buf.as_ptr() as _,
            buf.len() as _,
            &mut written,
            std::ptr::null_mut(),
        )
    )?;
    Ok(written as usize)
}

#[cfg(windows)]
fn sys_seek(fd: RawFd, pos: SeekFrom) -> io::Result<u64> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Storage::FileSystem::{
        SetFilePointerEx, FILE_BEGIN, FILE_CURRENT, FILE_END,
    };

    let (method, offset) = match pos {
        SeekFrom::Start(n) => (FILE_BEGIN, n as i64),
        SeekFrom::End(n) => (FILE_END, n),
        SeekFrom::Current(n) => (FILE_CURRENT, n),
    };
    let mut new_pos = 0;
    syscall!(BOOL, SetFilePointerEx(fd, offset, &mut new_pos, method))?;
    Ok(new_pos as u64)
}

#[cfg(windows)]
fn sys_sync(fd: RawFd) -> io::Result<()> {
    use sysio_driver::syscall;
    use windows_sys::Win32::Storage::FileSystem::FlushFileBuffers;

    syscall!(BOOL, FlushFileBuffers(fd)).map(|_| ())
}
