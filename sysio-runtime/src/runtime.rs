use std::{
    cell::RefCell,
    collections::{HashMap, VecDeque},
    future::Future,
    io,
    task::{Context, Poll, Waker},
};

use async_task::{Runnable, Task};
use sysio_driver::{Entry, EventQueue, OpCode, OwnedOperation, RawFd};
use sysio_log::trace;

use crate::op::OpFuture;

pub(crate) struct Runtime {
    queue: RefCell<EventQueue>,
    runnables: RefCell<VecDeque<Runnable>>,
    wakers: RefCell<HashMap<usize, Waker>>,
    results: RefCell<HashMap<usize, (io::Result<usize>, OwnedOperation)>>,
}

impl Runtime {
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            queue: RefCell::new(EventQueue::new()?),
            runnables: RefCell::default(),
            wakers: RefCell::default(),
            results: RefCell::default(),
        })
    }

    /// # Safety
    /// The future and its output must not outlive the runtime.
    unsafe fn spawn_unchecked<F: Future>(&self, future: F) -> (Runnable, Task<F::Output>) {
        let schedule = move |runnable| self.runnables.borrow_mut().push_back(runnable);
        async_task::spawn_unchecked(future, schedule)
    }

    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        // SAFETY: the task is driven to completion before this frame
        // returns.
        let (runnable, task) = unsafe { self.spawn_unchecked(future) };
        let waker = runnable.waker();
        runnable.schedule();
        let mut cx = Context::from_waker(&waker);
        let mut task = std::pin::pin!(task);
        loop {
            loop {
                let next = self.runnables.borrow_mut().pop_front();
                if let Some(runnable) = next {
                    runnable.run();
                } else {
                    break;
                }
            }
            if let Poll::Ready(res) = task.as_mut().poll(&mut cx) {
                return res;
            }
            self.poll_queue();
        }
    }

    pub fn spawn<F: Future + 'static>(&self, future: F) -> Task<F::Output> {
        // SAFETY: the runtime lives in thread-local storage, which outlives
        // any 'static future it runs.
        let (runnable, task) = unsafe { self.spawn_unchecked(future) };
        runnable.schedule();
        task
    }

    pub fn submit<T: OpCode + 'static>(&self, op: T) -> OpFuture<T> {
        let user_data = self.queue.borrow_mut().push(op);
        OpFuture::new(user_data)
    }

    pub fn persist(&self, fd: RawFd) -> io::Result<()> {
        self.queue.borrow_mut().persist(fd)
    }

    pub fn unregister(&self, fd: RawFd) -> io::Result<()> {
        self.queue.borrow_mut().unregister(fd)
    }

    pub fn poll_task<T: OpCode + 'static>(
        &self,
        cx: &mut Context,
        user_data: usize,
    ) -> Poll<(io::Result<usize>, T)> {
        if let Some((res, op)) = self.results.borrow_mut().remove(&user_data) {
            // SAFETY: `user_data` came from the OpFuture submitted with
            // exactly this operation type.
            Poll::Ready((res, unsafe { op.into_op::<T>() }))
        } else {
            self.wakers
                .borrow_mut()
                .insert(user_data, cx.waker().clone());
            Poll::Pending
        }
    }

    pub fn cancel_op(&self, user_data: usize) {
        self.wakers.borrow_mut().remove(&user_data);
        if self.results.borrow_mut().remove(&user_data).is_some() {
            // Completed but never consumed; the result and buffers are
            // released here.
            return;
        }
        self.queue.borrow_mut().cancel(user_data);
    }

    fn poll_queue(&self) {
        let mut entries = Vec::new();
        let res = self.queue.borrow_mut().poll(None, &mut entries);
        match res {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return,
            Err(e) => panic!("polling the event queue failed: {e}"),
        }
        for entry in entries {
            self.dispatch(entry);
        }
    }

    fn dispatch(&self, entry: Entry) {
        let user_data = entry.user_data();
        let Some(op) = self.queue.borrow_mut().take_op(user_data) else {
            // Cancelled while its completion was in flight.
            return;
        };
        trace!("operation {} resolved", user_data);
        self.results
            .borrow_mut()
            .insert(user_data, (entry.into_result(), op));
        if let Some(waker) = self.wakers.borrow_mut().remove(&user_data) {
            waker.wake();
        }
    }
}
