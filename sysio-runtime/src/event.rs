//! One-shot events for resolving a future from outside the queue.
//!
//! An [`Event`] is the rendezvous between a waiting computation and the
//! code that resolves it: the waiter suspends on [`Event::wait`], the
//! resolver calls [`EventHandle::notify`], and the waiter's task is
//! scheduled for the next runtime turn. Events belong to the thread that
//! created them, like every other queue resource.

use std::{
    future::poll_fn,
    marker::PhantomData,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    task::Poll,
};

use futures_util::task::AtomicWaker;

#[derive(Debug, Default)]
struct Inner {
    waker: AtomicWaker,
    set: AtomicBool,
}

/// An event that won't wake until [`EventHandle::notify`] is called.
#[derive(Debug, Default)]
pub struct Event {
    inner: Arc<Inner>,
}

impl Event {
    /// Create [`Event`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a notify handle.
    pub fn handle(&self) -> EventHandle {
        EventHandle {
            inner: self.inner.clone(),
            _p: PhantomData,
        }
    }

    /// Wait for [`EventHandle::notify`] to be called.
    pub async fn wait(self) {
        poll_fn(|cx| {
            // Quick check to skip registration when already notified.
            if self.inner.set.load(Ordering::Relaxed) {
                return Poll::Ready(());
            }
            self.inner.waker.register(cx.waker());
            // Check again after `register`, or a notification landing in
            // between would be lost.
            if self.inner.set.load(Ordering::Relaxed) {
                Poll::Ready(())
            } else {
                Poll::Pending
            }
        })
        .await
    }
}

/// A wake-up handle to an [`Event`], bound to the owning thread.
pub struct EventHandle {
    inner: Arc<Inner>,
    // The waker it fires belongs to this thread's runtime.
    _p: PhantomData<*const ()>,
}

impl EventHandle {
    /// Notify the event.
    pub fn notify(self) {
        self.inner.set.store(true, Ordering::Relaxed);
        self.inner.waker.wake();
    }
}
