//! Completion backend for Windows, driving an I/O completion port.

use std::{
    collections::{HashMap, HashSet, VecDeque},
    io,
    task::Poll,
    time::Duration,
};

use sysio_log::trace;
use windows_sys::Win32::{
    Foundation::{
        RtlNtStatusToDosError, ERROR_BROKEN_PIPE, ERROR_HANDLE_EOF, ERROR_INVALID_PARAMETER,
        ERROR_NOT_FOUND, ERROR_NO_DATA, ERROR_NO_MORE_ITEMS, ERROR_PIPE_CONNECTED,
        ERROR_PIPE_NOT_CONNECTED, HANDLE, INVALID_HANDLE_VALUE, NTSTATUS, WAIT_TIMEOUT,
    },
    Storage::FileSystem::SetFileCompletionNotificationModes,
    System::{
        Threading::INFINITE,
        WindowsProgramming::{FILE_SKIP_COMPLETION_PORT_ON_SUCCESS, FILE_SKIP_SET_EVENT_ON_HANDLE},
        IO::{
            CancelIoEx, CreateIoCompletionPort, GetQueuedCompletionStatusEx, OVERLAPPED,
            OVERLAPPED_ENTRY,
        },
    },
};

use crate::{already_queued, premature_close, syscall, Entry, FileHandle};

pub(crate) mod op;

pub(crate) use windows_sys::Win32::Networking::WinSock::{
    socklen_t, SOCKADDR_STORAGE as sockaddr_storage,
};

/// On Windows, handles and sockets have the same size and both attach to a
/// completion port, so both are treated as the raw fd type.
pub type RawFd = HANDLE;

/// Extracts raw fds.
pub trait AsRawFd {
    /// Extracts the raw fd.
    fn as_raw_fd(&self) -> RawFd;
}

/// Abstraction of completion-driven operations.
pub trait OpCode {
    /// The handle the operation targets; completions are matched by it.
    fn fd(&self) -> RawFd;

    /// Perform the Windows API call with the given pointer to an overlapped
    /// struct. `Poll::Ready` means the call finished synchronously and no
    /// completion packet will arrive (the port skips packets on synchronous
    /// success).
    ///
    /// # Safety
    ///
    /// `self` and `optr` must stay valid until the operation completes.
    unsafe fn operate(&mut self, optr: *mut OVERLAPPED) -> Poll<io::Result<usize>>;
}

/// The overlapped struct actually submitted to the kernel, carrying the
/// queue's key for the operation.
#[repr(C)]
pub(crate) struct Overlapped {
    pub base: OVERLAPPED,
    pub user_data: usize,
}

impl Overlapped {
    fn new(user_data: usize) -> Self {
        Self {
            base: unsafe { std::mem::zeroed() },
            user_data,
        }
    }
}

struct Waiter {
    user_data: usize,
    overlapped: Box<Overlapped>,
}

impl Waiter {
    fn optr(&self) -> *const OVERLAPPED {
        &self.overlapped.base as *const OVERLAPPED
    }
}

/// Low-level driver of IOCP.
pub(crate) struct Driver {
    port: FileHandle,
    /// Handles bound to the port and not yet unregistered.
    registered: HashSet<RawFd>,
    /// Handles logically unregistered whose port association persists until
    /// they are closed.
    orphans: HashSet<RawFd>,
    /// One in-flight operation per handle.
    waiters: HashMap<RawFd, Waiter>,
    /// Reverse map from operation key to its handle.
    fds: HashMap<usize, RawFd>,
    /// Overlappeds of cancelled operations, kept alive (with their
    /// operations) until the kernel reports completion or cancellation.
    cancelled: HashMap<usize, Box<Overlapped>>,
}

impl Driver {
    pub fn new() -> io::Result<Self> {
        let port = syscall!(BOOL, CreateIoCompletionPort(INVALID_HANDLE_VALUE, 0, 0, 1))?;
        trace!("new iocp driver: {}", port);
        Ok(Self {
            // SAFETY: CreateIoCompletionPort returned a fresh handle.
            port: unsafe { FileHandle::from_raw(port) },
            registered: HashSet::new(),
            orphans: HashSet::new(),
            waiters: HashMap::new(),
            fds: HashMap::new(),
            cancelled: HashMap::new(),
        })
    }

    pub fn attach(&mut self, fd: RawFd) -> io::Result<()> {
        if self.registered.contains(&fd) {
            // A second registration without an unregister in between means
            // the original handle was closed and the value reused.
            premature_close(fd);
        }
        match syscall!(
            BOOL,
            CreateIoCompletionPort(fd, self.port.as_raw(), fd as usize, 0)
        ) {
            Ok(_) => {}
            Err(e)
                if e.raw_os_error() == Some(ERROR_INVALID_PARAMETER as _)
                    && self.orphans.contains(&fd) =>
            {
                // The kernel still holds the association from before the
                // logical unregister; the handle is already bound.
            }
            Err(e) => return Err(e),
        }
        syscall!(
            BOOL,
            SetFileCompletionNotificationModes(
                fd,
                (FILE_SKIP_COMPLETION_PORT_ON_SUCCESS | FILE_SKIP_SET_EVENT_ON_HANDLE) as _
            )
        )?;
        self.orphans.remove(&fd);
        self.registered.insert(fd);
        trace!("attach handle {}", fd);
        Ok(())
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty() || !self.cancelled.is_empty()
    }

    /// # Safety
    /// `op` must stay valid until its entry is surfaced or it is cancelled.
    pub unsafe fn submit(
        &mut self,
        op: *mut dyn OpCode,
        user_data: usize,
    ) -> Poll<io::Result<usize>> {
        let op = unsafe { &mut *op };
        let fd = op.fd();
        if !self.registered.contains(&fd) {
            panic!("handle {fd} was never persisted to the completion port");
        }
        if self.waiters.contains_key(&fd) {
            return Poll::Ready(Err(already_queued(fd)));
        }
        let mut overlapped = Box::new(Overlapped::new(user_data));
        let optr = &mut overlapped.base as *mut OVERLAPPED;
        match unsafe { op.operate(optr) } {
            // Skip-on-success is set during attach, so a synchronous byte
            // count is final and no packet will follow.
            Poll::Ready(res) => Poll::Ready(res),
            Poll::Pending => {
                self.fds.insert(user_data, fd);
                self.waiters.insert(fd, Waiter {
                    user_data,
                    overlapped,
                });
                Poll::Pending
            }
        }
    }

    pub fn poll(
        &mut self,
        timeout: Option<Duration>,
        cqueue: &mut VecDeque<Entry>,
    ) -> io::Result<()> {
        let capacity = (self.waiters.len() + self.cancelled.len()).max(1);
        let mut entries: Vec<OVERLAPPED_ENTRY> = Vec::with_capacity(capacity);
        let mut recv_count = 0u32;
        let timeout = match timeout {
            Some(timeout) => timeout.as_millis().min(u32::MAX as u128) as u32,
            None => INFINITE,
        };
        let res = syscall!(
            BOOL,
            GetQueuedCompletionStatusEx(
                self.port.as_raw(),
                entries.as_mut_ptr(),
                capacity as _,
                &mut recv_count,
                timeout,
                0
            )
        );
        if let Err(e) = res {
            return if e.raw_os_error() == Some(WAIT_TIMEOUT as _) {
                Ok(())
            } else {
                Err(e)
            };
        }
        // SAFETY: the port initialized `recv_count` entries.
        unsafe { entries.set_len(recv_count as usize) };

        for entry in &entries {
            let optr = entry.lpOverlapped;
            if optr.is_null() {
                continue;
            }
            if let Some(overlapped) = self.cancelled.remove(&(optr as usize)) {
                // The kernel has let go of the buffers; release the
                // operation without surfacing it.
                trace!("cancelled operation {} drained", overlapped.user_data);
                cqueue.push_back(Entry::new_cancelled(overlapped.user_data));
                continue;
            }
            let fd = entry.lpCompletionKey as RawFd;
            let matches = self
                .waiters
                .get(&fd)
                .is_some_and(|w| std::ptr::eq(w.optr(), optr));
            if !matches {
                // A stray packet, e.g. from a duplicated handle.
                trace!("ignoring stray completion for handle {}", fd);
                continue;
            }
            let waiter = self.waiters.remove(&fd).unwrap();
            self.fds.remove(&waiter.user_data);
            let result = overlapped_result(&waiter.overlapped.base);
            cqueue.push_back(Entry::new(waiter.user_data, result));
        }
        Ok(())
    }

    pub fn unregister(&mut self, fd: RawFd) -> io::Result<Option<usize>> {
        if let Some(waiter) = self.waiters.remove(&fd) {
            self.fds.remove(&waiter.user_data);
            self.cancel_waiter(fd, waiter)?;
        }
        if self.registered.remove(&fd) {
            self.orphans.insert(fd);
        }
        trace!("unregister handle {}", fd);
        // The operation stays alive until the cancellation drains.
        Ok(None)
    }

    pub fn cancel(&mut self, user_data: usize) -> bool {
        if let Some(fd) = self.fds.remove(&user_data) {
            if let Some(waiter) = self.waiters.remove(&fd) {
                self.cancel_waiter(fd, waiter).ok();
                return false;
            }
        }
        true
    }

    fn cancel_waiter(&mut self, fd: RawFd, waiter: Waiter) -> io::Result<()> {
        let optr = waiter.optr() as *mut OVERLAPPED;
        match syscall!(BOOL, CancelIoEx(fd, optr)) {
            Ok(_) => {}
            // Already completed; the packet will be drained by the next
            // poll.
            Err(e) if e.raw_os_error() == Some(ERROR_NOT_FOUND as _) => {}
            Err(e) => return Err(e),
        }
        self.cancelled.insert(optr as usize, waiter.overlapped);
        Ok(())
    }
}

fn overlapped_result(overlapped: &OVERLAPPED) -> io::Result<usize> {
    let status = overlapped.Internal as NTSTATUS;
    if status >= 0 {
        Ok(overlapped.InternalHigh)
    } else {
        let error = unsafe { RtlNtStatusToDosError(status) };
        match error {
            ERROR_HANDLE_EOF | ERROR_BROKEN_PIPE | ERROR_NO_MORE_ITEMS | ERROR_PIPE_CONNECTED
            | ERROR_PIPE_NOT_CONNECTED | ERROR_NO_DATA => Ok(0),
            _ => Err(io::Error::from_raw_os_error(error as _)),
        }
    }
}
