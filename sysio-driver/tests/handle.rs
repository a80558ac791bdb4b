#![cfg(unix)]

use sysio_driver::{FileHandle, RawFd};

fn pipe_fds() -> (RawFd, RawFd) {
    let mut fds = [-1; 2];
    assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
    (fds[0], fds[1])
}

fn is_open(fd: RawFd) -> bool {
    unsafe { libc::fcntl(fd, libc::F_GETFD) != -1 }
}

#[test]
fn drop_closes_exactly_once() {
    let (r, w) = pipe_fds();
    {
        let _h = unsafe { FileHandle::from_raw(r) };
        assert!(is_open(r));
    }
    assert!(!is_open(r));
    unsafe { libc::close(w) };
}

#[test]
fn into_raw_disarms_the_destructor() {
    let (r, w) = pipe_fds();
    let h = unsafe { FileHandle::from_raw(r) };
    let raw = h.into_raw();
    assert_eq!(raw, r);
    // No double close is possible: the handle was invalidated, so the fd
    // must still be open.
    assert!(is_open(r));
    unsafe { libc::close(r) };
    unsafe { libc::close(w) };
}

#[test]
fn explicit_close_releases() {
    let (r, w) = pipe_fds();
    let h = unsafe { FileHandle::from_raw(r) };
    h.close().unwrap();
    assert!(!is_open(r));
    unsafe { libc::close(w) };
}

#[test]
#[should_panic(expected = "close of an invalid handle")]
fn close_of_invalid_handle_panics() {
    let h = unsafe { FileHandle::from_raw(-1) };
    let _ = h.close();
}

// An fd far above the descriptor limit: guaranteed closed, and immune to
// being handed out to a concurrently running test.
const STALE_FD: RawFd = 1_000_000;

#[test]
#[should_panic(expected = "already-closed handle")]
fn close_of_closed_fd_panics() {
    let h = unsafe { FileHandle::from_raw(STALE_FD) };
    let _ = h.close();
}

#[test]
fn drop_of_closed_fd_is_silent() {
    let h = unsafe { FileHandle::from_raw(STALE_FD) };
    // The destructor must swallow the closed-handle condition.
    drop(h);
}
