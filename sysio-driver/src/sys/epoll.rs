//! Readiness backend for Linux, driving a oneshot epoll set.

use std::{collections::HashMap, io, task::Poll, time::Duration};

use sysio_log::trace;

use super::{Decision, Interest, OpCode, RawFd};
use crate::{already_queued, premature_close, syscall, Entry, FileHandle};

struct Waiter {
    user_data: usize,
    interest: Interest,
    op: *mut dyn OpCode,
}

/// Low-level driver of epoll.
pub(crate) struct Driver {
    ep: FileHandle,
    /// One parked operation per fd.
    waiters: HashMap<RawFd, Waiter>,
    /// Fds with a live (possibly disarmed) entry in the kernel set.
    kernel: std::collections::HashSet<RawFd>,
}

impl Driver {
    pub fn new() -> io::Result<Self> {
        let ep = syscall!(libc::epoll_create1(libc::EPOLL_CLOEXEC))?;
        trace!("new epoll driver: {}", ep);
        Ok(Self {
            // SAFETY: epoll_create1 returned a fresh fd.
            ep: unsafe { FileHandle::from_raw(ep) },
            waiters: HashMap::new(),
            kernel: std::collections::HashSet::new(),
        })
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
        let occupied = self.waiters.contains_key(&fd);
        let mut ev = libc::epoll_event {
            events: (interest_bits(interest) | libc::EPOLLONESHOT) as u32,
            u64: fd as u64,
        };
        let ep = self.ep.as_raw();
        match syscall!(libc::epoll_ctl(ep, libc::EPOLL_CTL_ADD, fd, &mut ev)) {
            Ok(_) => {
                if occupied {
                    // The kernel did not know this fd although a waiter is
                    // parked on it: the original fd was closed without
                    // unregistering and the number was reused.
                    premature_close(fd);
                }
            }
            Err(e) if e.raw_os_error() == Some(libc::EEXIST) => {
                if occupied {
                    return Err(already_queued(fd));
                }
                syscall!(libc::epoll_ctl(ep, libc::EPOLL_CTL_MOD, fd, &mut ev))?;
            }
            Err(e) => return Err(e),
        }
        self.kernel.insert(fd);
        self.waiters.insert(
            fd,
            Waiter {
                user_data,
                interest,
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
        let capacity = self.waiters.len().max(1);
        let mut events: Vec<libc::epoll_event> = Vec::with_capacity(capacity);
        let n = syscall!(libc::epoll_wait(
            self.ep.as_raw(),
            events.as_mut_ptr(),
            capacity as i32,
            timeout_millis(timeout),
        ))?;
        // SAFETY: epoll_wait initialized `n` entries.
        unsafe { events.set_len(n as usize) };

        for ev in &events {
            let fd = ev.u64 as RawFd;
            let Some(waiter) = self.waiters.remove(&fd) else {
                panic!("epoll reported an event for fd {fd} with no parked operation");
            };
            let events_bits = ev.events;
            let bits = events_bits as libc::c_int;
            let wanted = interest_bits(waiter.interest) | libc::EPOLLERR | libc::EPOLLHUP;
            if bits & wanted == 0 {
                panic!(
                    "epoll reported unexpected events {:#x} for fd {fd} registered for {:?}",
                    events_bits, waiter.interest
                );
            }
            match unsafe { &mut *waiter.op }.on_event() {
                Poll::Ready(res) => {
                    trace!("fd {} completed", fd);
                    cqueue.push_back(Entry::new(waiter.user_data, res));
                }
                Poll::Pending => {
                    // Spurious wakeup; re-arm the disarmed oneshot entry.
                    let mut ev = libc::epoll_event {
                        events: (interest_bits(waiter.interest) | libc::EPOLLONESHOT) as u32,
                        u64: fd as u64,
                    };
                    syscall!(libc::epoll_ctl(
                        self.ep.as_raw(),
                        libc::EPOLL_CTL_MOD,
                        fd,
                        &mut ev
                    ))?;
                    self.waiters.insert(fd, waiter);
                }
            }
        }
        Ok(())
    }

    pub fn unregister(&mut self, fd: RawFd) -> io::Result<Option<usize>> {
        let waiter = self.waiters.remove(&fd);
        if !self.kernel.remove(&fd) {
            return Ok(waiter.map(|w| w.user_data));
        }
        if let Err(e) = syscall!(libc::epoll_ctl(
            self.ep.as_raw(),
            libc::EPOLL_CTL_DEL,
            fd,
            std::ptr::null_mut()
        )) {
            match e.raw_os_error() {
                // The fd left the kernel set without going through the
                // queue: it was closed while still registered.
                Some(libc::ENOENT) | Some(libc::EBADF) => premature_close(fd),
                _ => return Err(e),
            }
        }
        trace!("unregister fd {}", fd);
        Ok(waiter.map(|w| w.user_data))
    }

    /// Drop the waiter holding `user_data`, removing its kernel entry so a
    /// stale event cannot fire into an empty slot. Returns whether the
    /// operation can be released immediately.
    pub fn cancel(&mut self, user_data: usize) -> bool {
        let fd = self
            .waiters
            .iter()
            .find(|(_, w)| w.user_data == user_data)
            .map(|(fd, _)| *fd);
        if let Some(fd) = fd {
            self.waiters.remove(&fd);
            self.kernel.remove(&fd);
            syscall!(libc::epoll_ctl(
                self.ep.as_raw(),
                libc::EPOLL_CTL_DEL,
                fd,
                std::ptr::null_mut()
            ))
            .ok();
        }
        true
    }
}

fn interest_bits(interest: Interest) -> libc::c_int {
    match interest {
        Interest::Readable => libc::EPOLLIN,
        Interest::Writable => libc::EPOLLOUT,
        Interest::PriorityRead => libc::EPOLLPRI,
    }
}

// `Duration::as_millis` truncates, so round up: a sub-millisecond timeout
// must not turn into a busy zero timeout unless the caller asked for zero.
fn timeout_millis(timeout: Option<Duration>) -> libc::c_int {
    match timeout {
        Some(to) => to
            .checked_add(Duration::from_nanos(999_999))
            .unwrap_or(to)
            .as_millis()
            .min(libc::c_int::MAX as u128) as libc::c_int,
        None => -1,
    }
}
