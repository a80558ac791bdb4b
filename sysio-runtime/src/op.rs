use std::{
    future::Future,
    io,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

use sysio_driver::OpCode;

/// The future of a submitted operation.
///
/// Resolves to the operation's result and the operation itself, which
/// carries the buffer back out of the queue. Dropping the future before it
/// resolves cancels the operation.
#[derive(Debug)]
pub struct OpFuture<T: OpCode + 'static> {
    user_data: usize,
    completed: bool,
    _p: PhantomData<&'static T>,
}

impl<T: OpCode> OpFuture<T> {
    pub(crate) fn new(user_data: usize) -> Self {
        Self {
            user_data,
            completed: false,
            _p: PhantomData,
        }
    }
}

impl<T: OpCode> Future for OpFuture<T> {
    type Output = (io::Result<usize>, T);

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let res = crate::RUNTIME.with(|runtime| runtime.poll_task(cx, self.user_data));
        if res.is_ready() {
            self.get_mut().completed = true;
        }
        res
    }
}

impl<T: OpCode> Drop for OpFuture<T> {
    fn drop(&mut self) {
        if !self.completed {
            let _ = crate::RUNTIME.try_with(|runtime| runtime.cancel_op(self.user_data));
        }
    }
}
