//! Items shared by the readiness backends.

use std::{io, task::Poll};

#[doc(no_inline)]
pub use std::os::fd::{AsRawFd, RawFd};

pub(crate) use libc::{sockaddr_storage, socklen_t};

pub(crate) mod op;

/// Abstraction of readiness-driven operations.
pub trait OpCode {
    /// Perform the operation before submission, and return a [`Decision`]
    /// indicating whether the queue needs to park it.
    fn pre_submit(&mut self) -> io::Result<Decision>;

    /// Perform the operation after a readiness event. `Poll::Pending` means
    /// the wakeup was spurious and the registration is re-armed.
    fn on_event(&mut self) -> Poll<io::Result<usize>>;
}

/// Result of [`OpCode::pre_submit`].
pub enum Decision {
    /// Instant operation, no need to park.
    Completed(usize),
    /// The operation waits for a readiness event.
    Wait(WaitArg),
}

impl Decision {
    /// Decide to wait for the given fd with the given interest.
    pub fn wait_for(fd: RawFd, interest: Interest) -> Self {
        Self::Wait(WaitArg { fd, interest })
    }

    /// Decide to wait for the given fd to be readable.
    pub fn wait_readable(fd: RawFd) -> Self {
        Self::wait_for(fd, Interest::Readable)
    }

    /// Decide to wait for the given fd to be writable.
    pub fn wait_writable(fd: RawFd) -> Self {
        Self::wait_for(fd, Interest::Writable)
    }
}

/// Meta of a parked operation.
#[derive(Debug, Clone, Copy)]
pub struct WaitArg {
    /// The raw fd of the operation.
    pub fd: RawFd,
    /// The readiness condition to wait for.
    pub interest: Interest,
}

/// The readiness condition a parked operation waits for.
///
/// The kernel may additionally report error and hang-up conditions; those
/// cannot be waited for, and resume the parked operation alongside the
/// registered interest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interest {
    /// The resource has data to read.
    Readable,
    /// The resource accepts writes.
    Writable,
    /// The resource has out-of-band data to read. Only epoll can wait for
    /// this; kqueue rejects it.
    PriorityRead,
}
