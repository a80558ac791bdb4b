//! Readiness backend for BSD and macOS, driving oneshot kevents.

use std::{cmp, collections::HashMap, io, ptr, task::Poll, time::Duration};

use sysio_log::trace;

use super::{Decision, Interest, OpCode, RawFd};
use crate::{already_queued, syscall, Entry, FileHandle};

// Type of the `nchanges` and `nevents` parameters in the `kevent` function.
#[cfg(not(target_os = "netbsd"))]
type Count = libc::c_int;
#[cfg(target_os = "netbsd")]
type Count = libc::size_t;

// Type of the `filter` field in the `kevent` structure.
#[cfg(any(target_os = "dragonfly", target_os = "freebsd", target_os = "openbsd"))]
type Filter = libc::c_short;
#[cfg(any(target_os = "macos", target_os = "ios"))]
type Filter = i16;
#[cfg(target_os = "netbsd")]
type Filter = u32;

// Type of the `data` field in the `kevent` structure.
#[cfg(any(
    target_os = "dragonfly",
    target_os = "freebsd",
    target_os = "ios",
    target_os = "macos"
))]
type Data = libc::intptr_t;
#[cfg(any(target_os = "netbsd", target_os = "openbsd"))]
type Data = i64;

// Type of the `udata` field in the `kevent` structure.
#[cfg(not(target_os = "netbsd"))]
type UData = *mut libc::c_void;
#[cfg(target_os = "netbsd")]
type UData = libc::intptr_t;

macro_rules! kevent {
    ($id: expr, $filter: expr, $flags: expr, $data: expr) => {
        libc::kevent {
            ident: $id as libc::uintptr_t,
            filter: $filter as Filter,
            flags: $flags,
            fflags: 0,
            data: 0,
            udata: $data as UData,
        }
    };
}

struct Waiter {
    user_data: usize,
    filter: Filter,
    op: *mut dyn OpCode,
}

/// Low-level driver of kqueue.
pub(crate) struct Driver {
    kq: FileHandle,
    /// One parked operation per fd.
    waiters: HashMap<RawFd, Waiter>,
    /// Filter last registered per fd, while the kernel still knows it.
    kernel: HashMap<RawFd, Filter>,
}

impl Driver {
    pub fn new() -> io::Result<Self> {
        let kq = syscall!(libc::kqueue())?;
        let driver = Self {
            // SAFETY: kqueue() returned a fresh fd.
            kq: unsafe { FileHandle::from_raw(kq) },
            waiters: HashMap::new(),
            kernel: HashMap::new(),
        };
        syscall!(libc::fcntl(kq, libc::F_SETFD, libc::FD_CLOEXEC))?;
        trace!("new kqueue driver: {}", kq);
        Ok(driver)
    }

    pub fn attach(&mut self, _fd: RawFd) -> io::Result<()> {
        Ok(())
    }

    pub fn has_waiters(&self) -> bool {
        !self.waiters.is_empty()
    }

    /// # Safety
    /// `op` must stay valid until its entry is surfaced or it is cancelled.
    pub unsafe fn submit(
        &mut self,
        op: *mut dyn OpCode,
        user_data: usize,
    ) -> Poll<io::Result<usize>> {
        let decision = match unsafe { &mut *op }.pre_submit() {
            Ok(decision) => decision,
            Err(e) => return Poll::Ready(Err(e)),
        };
        match decision {
            Decision::Completed(res) => Poll::Ready(Ok(res)),
            Decision::Wait(arg) => {
                match self.register(arg.fd, arg.interest, user_data, op) {
                    Ok(()) => Poll::Pending,
                    Err(e) => Poll::Ready(Err(e)),
                }
            }
        }
    }

    fn register(
        &mut self,
        fd: RawFd,
        interest: Interest,
        user_data: usize,
        op: *mut dyn OpCode,
    ) -> io::Result<()> {
        if self.waiters.contains_key(&fd) {
            return Err(already_queued(fd));
        }
        let filter = interest_filter(interest)?;
        let mut changes = [kevent!(
            fd,
            filter,
            libc::EV_ADD | libc::EV_DISPATCH | libc::EV_RECEIPT,
            0
        )];
        // Ignore EPIPE: old macOS returns it when the peer end of a pipe is
        // already gone, yet still reports events for the fd.
        kevent_register(self.kq.as_raw(), &mut changes, &[libc::EPIPE as Data])?;
        self.kernel.insert(fd, filter);
        self.waiters.insert(
            fd,
            Waiter {
                user_data,
                filter,
                op,
            },
        );
        trace!("register fd {} for {:?}", fd, interest);
        Ok(())
    }

    pub fn poll(
        &mut self,
        timeout: Option<Duration>,
        cqueue: &mut std::collections::VecDeque<Entry>,
    ) -> io::Result<()> {
        let timeout = timeout.map(|to| libc::timespec {
            tv_sec: cmp::min(to.as_secs(), libc::time_t::MAX as u64) as libc::time_t,
            tv_nsec: libc::c_long::from(to.subsec_nanos() as i32),
        });
        let timeout = timeout
            .as_ref()
            .map(|s| s as *const _)
            .unwrap_or(ptr::null());

        let capacity = self.waiters.len().max(1);
        let mut events: Vec<libc::kevent> = Vec::with_capacity(capacity);
        let n = syscall!(libc::kevent(
            self.kq.as_raw(),
            ptr::null(),
            0,
            events.as_mut_ptr(),
            capacity as Count,
            timeout,
        ))?;
        // SAFETY: kevent initialized `n` entries.
        unsafe { events.set_len(n as usize) };

        for ev in &events {
            let fd = ev.ident as RawFd;
            let Some(waiter) = self.waiters.remove(&fd) else {
                panic!("kqueue reported an event for fd {fd} with no parked operation");
            };
            // EV_EOF and EV_ERROR still resume the operation; the retried
            // system call reports the actual condition.
            match unsafe { &mut *waiter.op }.on_event() {
                Poll::Ready(res) => {
                    trace!("fd {} completed", fd);
                    cqueue.push_back(Entry::new(waiter.user_data, res));
                }
                Poll::Pending => {
                    // Spurious wakeup; re-enable the dispatched event.
                    let mut changes = [kevent!(
                        fd,
                        waiter.filter,
                        libc::EV_ADD | libc::EV_DISPATCH | libc::EV_RECEIPT,
                        0
                    )];
                    kevent_register(self.kq.as_raw(), &mut changes, &[libc::EPIPE as Data])?;
                    self.waiters.insert(fd, waiter);
                }
            }
        }
        Ok(())
    }

    pub fn unregister(&mut self, fd: RawFd) -> io::Result<Option<usize>> {
        let waiter = self.waiters.remove(&fd);
        if let Some(filter) = self.kernel.remove(&fd) {
            let mut changes = [kevent!(fd, filter, libc::EV_DELETE | libc::EV_RECEIPT, 0)];
            // The filter may be gone already (the fd was closed, which
            // removes kevents); that is tolerated here.
            kevent_register(
                self.kq.as_raw(),
                &mut changes,
                &[libc::ENOENT as Data, libc::EBADF as Data, libc::EPIPE as Data],
            )?;
        }
        trace!("unregister fd {}", fd);
        Ok(waiter.map(|w| w.user_data))
    }

    pub fn cancel(&mut self, user_data: usize) -> bool {
        let fd = self
            .waiters
            .iter()
            .find(|(_, w)| w.user_data == user_data)
            .map(|(fd, _)| *fd);
        if let Some(fd) = fd {
            self.waiters.remove(&fd);
            if let Some(filter) = self.kernel.remove(&fd) {
                let mut changes = [kevent!(fd, filter, libc::EV_DELETE | libc::EV_RECEIPT, 0)];
                kevent_register(
                    self.kq.as_raw(),
                    &mut changes,
                    &[libc::ENOENT as Data, libc::EBADF as Data, libc::EPIPE as Data],
                )
                .ok();
            }
        }
        true
    }
}

fn interest_filter(interest: Interest) -> io::Result<Filter> {
    match interest {
        Interest::Readable => Ok(libc::EVFILT_READ as Filter),
        Interest::Writable => Ok(libc::EVFILT_WRITE as Filter),
        Interest::PriorityRead => Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "kqueue cannot wait for out-of-band data",
        )),
    }
}

fn kevent_register(
    kq: RawFd,
    changes: &mut [libc::kevent],
    ignored_errors: &[Data],
) -> io::Result<()> {
    syscall!(libc::kevent(
        kq,
        changes.as_ptr(),
        changes.len() as Count,
        changes.as_mut_ptr(),
        changes.len() as Count,
        ptr::null(),
    ))
    .map(|_| ())
    .or_else(|err| {
        // According to the manual page of FreeBSD: "When kevent() call
        // fails with EINTR error, all changes in the changelist have been
        // applied", so an EINTR here can be ignored.
        if err.raw_os_error() == Some(libc::EINTR) {
            Ok(())
        } else {
            Err(err)
        }
    })
    .and_then(|()| check_errors(changes, ignored_errors))
}

fn check_errors(events: &[libc::kevent], ignored_errors: &[Data]) -> io::Result<()> {
    for event in events {
        // We can't use references to the `flags` and `data` fields of
        // packed structures, hence the copies.
        let flags = event.flags;
        let data = event.data;
        if (flags & libc::EV_ERROR != 0) && data != 0 && !ignored_errors.contains(&data) {
            return Err(io::Error::from_raw_os_error(data as i32));
        }
    }
    Ok(())
}
