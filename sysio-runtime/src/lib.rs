//! The per-thread async runtime.
//!
//! Every thread that performs queue-driven I/O owns one lazily-created
//! runtime holding its [`EventQueue`](sysio_driver::EventQueue). The
//! runtime cannot be reached from
//! other threads, and neither can the resources registered with it: the
//! queue, its waiters and the resumed computations all stay on the thread
//! that created them.
//!
//! ```
//! let answer = sysio_runtime::block_on(async { 42 });
//! assert_eq!(answer, 42);
//! ```

#![warn(missing_docs)]

use std::{future::Future, io};

use async_task::Task;
use once_cell::unsync::Lazy;
use sysio_driver::{OpCode, RawFd};

mod attacher;
pub use attacher::Attacher;

pub mod event;

mod op;
pub use op::OpFuture;

mod runtime;
use runtime::Runtime;

thread_local! {
    static RUNTIME: Lazy<Runtime> =
        Lazy::new(|| Runtime::new().expect("cannot create the event queue for this thread"));
}

/// Start the thread's runtime and block on the future till it completes.
///
/// This is the only way a computation waits for a pending result: the loop
/// runs scheduled computations, then polls the event queue, until the given
/// future resolves.
pub fn block_on<F: Future>(future: F) -> F::Output {
    RUNTIME.with(|runtime| runtime.block_on(future))
}

/// Spawns a new asynchronous task, returning a [`Task`] for it.
///
/// Spawning a task enables the task to execute concurrently to other tasks
/// on the same thread. Dropping the task cancels it; use
/// [`Task::detach`] to let it run in the background.
pub fn spawn<F: Future + 'static>(future: F) -> Task<F::Output> {
    RUNTIME.with(|runtime| runtime.spawn(future))
}

/// Submit an operation to the thread's event queue and await its result.
///
/// The queue owns the operation while it is in flight; it is handed back
/// together with the result.
pub fn submit<T: OpCode + 'static>(op: T) -> OpFuture<T> {
    RUNTIME.with(|runtime| runtime.submit(op))
}

/// Declare that `fd` will repeatedly wait on this thread's queue.
///
/// See [`EventQueue::persist`](sysio_driver::EventQueue::persist).
pub fn persist(fd: RawFd) -> io::Result<()> {
    RUNTIME.with(|runtime| runtime.persist(fd))
}

/// Drop any parked operation for `fd` and remove it from the kernel's
/// event set of this thread's queue.
///
/// See [`EventQueue::unregister`](sysio_driver::EventQueue::unregister).
/// During thread teardown the runtime may
/// already be gone; that case reports success, as there is no queue left
/// to unregister from.
pub fn unregister(fd: RawFd) -> io::Result<()> {
    RUNTIME
        .try_with(|runtime| runtime.unregister(fd))
        .unwrap_or(Ok(()))
}
