//! The per-thread event queue and its platform backends.
//!
//! An [`EventQueue`] multiplexes kernel notifications for a single thread:
//! readiness events from epoll (Linux) or kqueue (BSD, macOS), and
//! completion packets from an I/O completion port (Windows). Suspended
//! operations are owned by the queue and identified by a `user_data` key;
//! when the kernel reports an event the matching operation is driven and,
//! once finished, surfaced as an [`Entry`].
//!
//! Some types differ by compilation target.

#![warn(missing_docs)]

use std::{collections::VecDeque, io, mem::ManuallyDrop, ptr::NonNull, time::Duration};

use slab::Slab;
use sysio_log::{instrument, trace};

mod handle;
pub use handle::{FileHandle, Handle, HandleKind, SocketHandle};

pub mod op;

mod sys;
pub use sys::{AsRawFd, OpCode, RawFd};
#[cfg(unix)]
pub use sys::{Decision, Interest, WaitArg};

#[cfg(windows)]
#[macro_export]
#[doc(hidden)]
macro_rules! syscall {
    (BOOL, $e:expr) => {
        $crate::syscall!($e, == 0)
    };
    (SOCKET, $e:expr) => {
        $crate::syscall!($e, != 0)
    };
    (HANDLE, $e:expr) => {
        $crate::syscall!($e, == ::windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE)
    };
    ($e:expr, $op: tt $rhs: expr) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { $e };
        if res $op $rhs {
            Err(::std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// Helper macro to execute a system call.
#[cfg(unix)]
#[macro_export]
#[doc(hidden)]
macro_rules! syscall {
    (break $e:expr) => {
        loop {
            match $crate::syscall!($e) {
                Ok(res) => break ::std::task::Poll::Ready(Ok(res as usize)),
                Err(e) if e.kind() == ::std::io::ErrorKind::WouldBlock
                    || e.raw_os_error() == Some(::libc::EINPROGRESS) =>
                {
                    break ::std::task::Poll::Pending
                }
                Err(e) if e.kind() == ::std::io::ErrorKind::Interrupted => {}
                Err(e) => break ::std::task::Poll::Ready(Err(e)),
            }
        }
    };
    ($e:expr, $f:ident($fd:expr)) => {
        match $crate::syscall!(break $e) {
            ::std::task::Poll::Pending => Ok($crate::Decision::$f($fd)),
            ::std::task::Poll::Ready(Ok(res)) => Ok($crate::Decision::Completed(res)),
            ::std::task::Poll::Ready(Err(e)) => Err(e),
        }
    };
    ($e:expr) => {{
        #[allow(unused_unsafe)]
        let res = unsafe { $e };
        if res == -1 {
            Err(::std::io::Error::last_os_error())
        } else {
            Ok(res)
        }
    }};
}

/// The queue rejects a second operation on a resource that already has one
/// parked: the caller broke the one-waiter-per-resource contract.
pub(crate) fn already_queued(fd: RawFd) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("another operation is already waiting on resource {fd}"),
    )
}

/// A resource id vanished from the kernel set (or was replaced by a reused
/// id) while the queue still held state for it. The owner closed it without
/// unregistering first.
#[cold]
pub(crate) fn premature_close(fd: RawFd) -> ! {
    panic!("resource {fd} was closed or replaced while still registered with the event queue")
}

/// An completed entry returned from the kernel.
#[derive(Debug)]
pub struct Entry {
    user_data: usize,
    result: io::Result<usize>,
    cancelled: bool,
}

impl Entry {
    pub(crate) fn new(user_data: usize, result: io::Result<usize>) -> Self {
        Self {
            user_data,
            result,
            cancelled: false,
        }
    }

    #[cfg(windows)]
    pub(crate) fn new_cancelled(user_data: usize) -> Self {
        Self {
            user_data,
            result: Ok(0),
            cancelled: true,
        }
    }

    /// The key returned by [`EventQueue::push`] for this operation.
    pub fn user_data(&self) -> usize {
        self.user_data
    }

    /// The result of the operation.
    pub fn into_result(self) -> io::Result<usize> {
        self.result
    }
}

pub(crate) struct RawOp(NonNull<dyn OpCode>);

impl RawOp {
    pub(crate) fn new(op: impl OpCode + 'static) -> Self {
        let op = Box::new(op);
        Self(unsafe { NonNull::new_unchecked(Box::into_raw(op as Box<dyn OpCode>)) })
    }

    pub(crate) fn as_dyn_mut(&mut self) -> &mut dyn OpCode {
        unsafe { self.0.as_mut() }
    }

    pub(crate) fn as_dyn_ptr(&mut self) -> *mut dyn OpCode {
        self.0.as_ptr()
    }

    pub(crate) unsafe fn into_inner<T: OpCode>(self) -> T {
        let this = ManuallyDrop::new(self);
        *Box::from_raw(this.0.cast().as_ptr())
    }
}

impl Drop for RawOp {
    fn drop(&mut self) {
        drop(unsafe { Box::from_raw(self.0.as_ptr()) })
    }
}

/// An operation given back by the queue after its completion entry was
/// consumed.
pub struct OwnedOperation {
    op: RawOp,
    user_data: usize,
}

impl OwnedOperation {
    pub(crate) fn new(op: RawOp, user_data: usize) -> Self {
        Self { op, user_data }
    }

    /// Restore the original operation.
    ///
    /// # Safety
    ///
    /// The caller must guarantee that the operation was pushed with exactly
    /// this type.
    pub unsafe fn into_op<T: OpCode + 'static>(self) -> T {
        self.op.into_inner()
    }

    /// The key this operation was pushed with.
    pub fn user_data(&self) -> usize {
        self.user_data
    }
}

/// The per-thread event queue.
///
/// Operations are pushed, parked until the kernel reports them ready or
/// complete, and surfaced as [`Entry`] values from [`EventQueue::poll`].
/// The queue owns every in-flight operation, which keeps kernel-visible
/// buffers alive for as long as the kernel may touch them.
pub struct EventQueue {
    sys: sys::Driver,
    ops: Slab<RawOp>,
    squeue: VecDeque<usize>,
    cqueue: VecDeque<Entry>,
}

impl EventQueue {
    /// Create an [`EventQueue`] sized for 1024 concurrent operations.
    pub fn new() -> io::Result<Self> {
        Self::with_entries(1024)
    }

    /// Create an [`EventQueue`] sized for the given number of concurrent
    /// operations. The size is a capacity hint, not a limit.
    pub fn with_entries(entries: u32) -> io::Result<Self> {
        Ok(Self {
            sys: sys::Driver::new()?,
            ops: Slab::with_capacity(entries as _),
            squeue: VecDeque::with_capacity(entries as _),
            cqueue: VecDeque::new(),
        })
    }

    /// Whether any operation is queued or parked.
    pub fn running(&self) -> bool {
        !self.squeue.is_empty() || !self.cqueue.is_empty() || self.sys.has_waiters()
    }

    /// Declare that `fd` will repeatedly wait on this queue.
    ///
    /// ## Platform specific
    /// * IOCP: binds `fd` to the completion port (the handle itself is the
    ///   completion key) and enables skipping the completion packet on
    ///   synchronous success. Must be called exactly once per handle, before
    ///   the first push targeting it.
    /// * epoll/kqueue: does nothing and returns `Ok(())`.
    pub fn persist(&mut self, fd: RawFd) -> io::Result<()> {
        self.sys.attach(fd)
    }

    /// Push an operation into the queue and return the key associated with
    /// it. The operation is submitted on the next [`EventQueue::poll`];
    /// failures (including a second waiter on an already-waited resource)
    /// surface as the operation's completion entry.
    pub fn push(&mut self, op: impl OpCode + 'static) -> usize {
        let user_data = self.ops.insert(RawOp::new(op));
        self.squeue.push_back(user_data);
        trace!("push operation {}", user_data);
        user_data
    }

    /// Cancel an operation.
    ///
    /// The cancellation is silent: the operation never surfaces as an entry,
    /// and its buffers are released once the kernel lets go of them.
    pub fn cancel(&mut self, user_data: usize) {
        instrument!(sysio_log::Level::DEBUG, "cancel", user_data);
        if let Some(pos) = self.squeue.iter().position(|&ud| ud == user_data) {
            self.squeue.remove(pos);
            self.ops.try_remove(user_data);
            return;
        }
        if self.sys.cancel(user_data) {
            self.ops.try_remove(user_data);
        }
    }

    /// Drop any parked operation for `fd` and remove the resource from the
    /// kernel's event set.
    ///
    /// ## Platform specific
    /// * epoll: the id is deleted from the interest set; finding it already
    ///   gone is a programmer error (the resource was closed before it was
    ///   unregistered) and panics.
    /// * kqueue: the registered filter is deleted; absence is tolerated.
    /// * IOCP: in-flight I/O is cancelled with `CancelIoEx` and the waiter
    ///   is kept alive until the kernel confirms cancellation; the handle's
    ///   port association persists until it is closed.
    pub fn unregister(&mut self, fd: RawFd) -> io::Result<()> {
        instrument!(sysio_log::Level::DEBUG, "unregister", fd);
        if let Some(user_data) = self.sys.unregister(fd)? {
            self.ops.try_remove(user_data);
        }
        Ok(())
    }

    /// Poll the queue and collect completed entries.
    ///
    /// Blocks up to `timeout` (`None` blocks indefinitely, a zero duration
    /// drains without blocking) and returns immediately when nothing is
    /// queued or parked. Entries are surfaced in the order the kernel
    /// reported them; operations pushed while a poll is in progress are not
    /// eligible within the same poll. An elapsed timeout with no entries is
    /// reported as [`io::ErrorKind::TimedOut`].
    pub fn poll(
        &mut self,
        timeout: Option<Duration>,
        entries: &mut impl Extend<Entry>,
    ) -> io::Result<()> {
        instrument!(sysio_log::Level::TRACE, "poll", ?timeout);
        if !self.running() {
            return Ok(());
        }
        self.submit_squeue();
        if self.cqueue.is_empty() {
            self.sys.poll(timeout, &mut self.cqueue)?;
            if self.cqueue.is_empty() && timeout.is_some() {
                return Err(io::ErrorKind::TimedOut.into());
            }
        }
        while let Some(entry) = self.cqueue.pop_front() {
            if entry.cancelled {
                self.ops.try_remove(entry.user_data);
            } else {
                entries.extend(std::iter::once(entry));
            }
        }
        Ok(())
    }

    /// Poll repeatedly, without timeouts, until nothing is queued or
    /// parked.
    pub fn run(&mut self, entries: &mut impl Extend<Entry>) -> io::Result<()> {
        while self.running() {
            self.poll(None, entries)?;
        }
        Ok(())
    }

    /// Take an operation back from the queue after its entry was consumed.
    ///
    /// Returns `None` if the operation was cancelled in the meantime.
    pub fn take_op(&mut self, user_data: usize) -> Option<OwnedOperation> {
        self.ops
            .try_remove(user_data)
            .map(|op| OwnedOperation::new(op, user_data))
    }

    fn submit_squeue(&mut self) {
        while let Some(user_data) = self.squeue.pop_front() {
            // The slot may have been cancelled between push and poll.
            let Some(op) = self.ops.get_mut(user_data) else {
                continue;
            };
            let op = op.as_dyn_ptr();
            // SAFETY: the boxed operation is stable and owned by `self.ops`
            // until its entry is consumed or it is cancelled.
            match unsafe { self.sys.submit(op, user_data) } {
                std::task::Poll::Pending => {
                    trace!("operation {} parked", user_data);
                }
                std::task::Poll::Ready(res) => {
                    self.cqueue.push_back(Entry::new(user_data, res));
                }
            }
        }
    }
}
