#![cfg(unix)]

use std::{io, time::Duration};

use arrayvec::ArrayVec;
use sysio_buf::IntoInner;
use sysio_driver::{
    op::{PollOnce, Recv, Send},
    Entry, EventQueue, Interest, RawFd,
};

fn nonblocking_pipe() -> (RawFd, RawFd) {
    let mut fds = [-1; 2];
    #[cfg(target_os = "linux")]
    assert_eq!(
        unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC | libc::O_NONBLOCK) },
        0
    );
    #[cfg(not(target_os = "linux"))]
    {
        assert_eq!(unsafe { libc::pipe(fds.as_mut_ptr()) }, 0);
        for fd in fds {
            unsafe { libc::fcntl(fd, libc::F_SETFL, libc::O_NONBLOCK) };
        }
    }
    (fds[0], fds[1])
}

fn close(fd: RawFd) {
    unsafe { libc::close(fd) };
}

#[test]
fn timeout() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    let user_data = queue.push(Recv::new(r, Vec::with_capacity(8)));
    let mut entries = ArrayVec::<Entry, 1>::new();
    let err = queue
        .poll(Some(Duration::from_millis(50)), &mut entries)
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(entries.is_empty());

    queue.cancel(user_data);
    close(r);
    close(w);
}

#[test]
fn pipe_round_trip() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    let key_write = queue.push(Send::new(w, "hello world"));
    let key_read = queue.push(Recv::new(r, Vec::with_capacity(32)));

    let mut entries = Vec::new();
    while entries.len() < 2 {
        queue.poll(None, &mut entries).unwrap();
    }

    let mut n_bytes = 0;
    let mut buf = Vec::new();
    for entry in entries {
        let key = entry.user_data();
        let op = queue.take_op(key).unwrap();
        if key == key_write {
            entry.into_result().unwrap();
        } else if key == key_read {
            n_bytes = entry.into_result().unwrap();
            buf = unsafe { op.into_op::<Recv<Vec<u8>>>() }.into_inner();
        }
    }

    assert_eq!(n_bytes, 11);
    assert_eq!(buf, b"hello world");
    close(r);
    close(w);
}

#[test]
fn second_waiter_is_rejected() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    let first = queue.push(Recv::new(r, Vec::with_capacity(8)));
    let second = queue.push(Recv::new(r, Vec::with_capacity(8)));

    let mut entries = Vec::new();
    queue.poll(Some(Duration::ZERO), &mut entries).unwrap();
    assert_eq!(entries.len(), 1);
    let entry = entries.pop().unwrap();
    assert_eq!(entry.user_data(), second);
    let err = entry.into_result().unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    queue.take_op(second).unwrap();

    queue.cancel(first);
    close(r);
    close(w);
}

#[test]
fn unregister_drops_the_waiter() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    queue.push(Recv::new(r, Vec::with_capacity(8)));
    let mut entries = Vec::new();
    let err = queue
        .poll(Some(Duration::from_millis(10)), &mut entries)
        .unwrap_err();
    assert_eq!(err.kind(), io::ErrorKind::TimedOut);
    assert!(queue.running());

    queue.unregister(r).unwrap();
    assert!(!queue.running());

    // The fd is out of the kernel set; polling has nothing left to wait
    // for and returns immediately.
    queue.poll(None, &mut entries).unwrap();
    assert!(entries.is_empty());

    close(r);
    close(w);
}

#[test]
fn poll_once_reports_readiness() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    assert_eq!(unsafe { libc::write(w, b"x".as_ptr() as _, 1) }, 1);
    let user_data = queue.push(PollOnce::new(r, Interest::Readable));

    let mut entries = Vec::new();
    while entries.is_empty() {
        queue.poll(None, &mut entries).unwrap();
    }
    let entry = entries.pop().unwrap();
    assert_eq!(entry.user_data(), user_data);
    assert_eq!(entry.into_result().unwrap(), 0);
    queue.take_op(user_data).unwrap();

    close(r);
    close(w);
}

#[test]
#[should_panic(expected = "closed or replaced")]
fn close_before_unregister_is_detected() {
    let mut queue = EventQueue::new().unwrap();
    let (r, w) = nonblocking_pipe();

    queue.push(Recv::new(r, Vec::with_capacity(8)));
    let mut entries = Vec::new();
    let _ = queue.poll(Some(Duration::ZERO), &mut entries);

    // Closing the fd while it is still registered removes it from the
    // kernel set behind the queue's back.
    close(r);
    close(w);
    let _ = queue.unregister(r);
}
