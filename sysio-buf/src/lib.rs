//! Owned buffer types for queue-driven I/O.
//!
//! Operations submitted to the event queue take their buffers by ownership:
//! the kernel may look at the memory long after the submitting future was
//! dropped (most visibly during IOCP cancellation), so a borrowed slice is
//! not sound. The queue gives the buffer back together with the result, as a
//! [`BufResult`].

#![warn(missing_docs)]

use std::io;

mod io_buf;
pub use io_buf::*;

mod slice;
pub use slice::Slice;

/// A result type whose `Ok` and `Err` variants both carry the buffer that
/// was passed in by ownership.
#[derive(Debug)]
#[must_use]
pub struct BufResult<T, B>(pub io::Result<T>, pub B);

impl<T, B> BufResult<T, B> {
    /// Map the result part, with access to the buffer.
    pub fn map<U>(self, f: impl FnOnce(T, B) -> (U, B)) -> BufResult<U, B> {
        match self.0 {
            Ok(res) => {
                let (res, buf) = f(res, self.1);
                BufResult(Ok(res), buf)
            }
            Err(e) => BufResult(Err(e), self.1),
        }
    }

    /// Map the result part.
    pub fn map_res<U>(self, f: impl FnOnce(T) -> U) -> BufResult<U, B> {
        BufResult(self.0.map(f), self.1)
    }

    /// Map the buffer part.
    pub fn map_buffer<C>(self, f: impl FnOnce(B) -> C) -> BufResult<T, C> {
        BufResult(self.0, f(self.1))
    }

    /// Unwrap the result, returning the value and the buffer.
    ///
    /// # Panics
    /// Panics with `msg` if the result is an error.
    pub fn expect(self, msg: &str) -> (T, B) {
        (self.0.expect(msg), self.1)
    }

    /// Unwrap the result, returning the value and the buffer.
    pub fn unwrap(self) -> (T, B) {
        (self.0.unwrap(), self.1)
    }
}

impl<T, B> From<BufResult<T, B>> for (io::Result<T>, B) {
    fn from(BufResult(res, buf): BufResult<T, B>) -> Self {
        (res, buf)
    }
}

impl<T, B> From<(io::Result<T>, B)> for BufResult<T, B> {
    fn from((res, buf): (io::Result<T>, B)) -> Self {
        Self(res, buf)
    }
}

/// Unwrap a composed type into its inner buffer.
///
/// Operations implement this so the runtime can hand the buffer back once
/// the kernel is done with it.
pub trait IntoInner {
    /// The inner type.
    type Inner;

    /// Get the inner buffer.
    fn into_inner(self) -> Self::Inner;
}

impl<T: IntoInner, O> IntoInner for BufResult<O, T> {
    type Inner = BufResult<O, T::Inner>;

    fn into_inner(self) -> Self::Inner {
        BufResult(self.0, self.1.into_inner())
    }
}
