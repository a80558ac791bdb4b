use crate::{IntoInner, IoBuf, IoBufMut, SetBufInit};

/// An owned view into a buffer, starting at a fixed offset.
///
/// Used by the `read_exact`/`write_all` style loops to resubmit the
/// remainder of a buffer after a partial transfer, while keeping the whole
/// buffer owned and stable.
pub struct Slice<T> {
    buffer: T,
    begin: usize,
}

impl<T> Slice<T> {
    /// Create an owned view of `buffer` starting at `begin`.
    pub fn new(buffer: T, begin: usize) -> Self {
        Self { buffer, begin }
    }

    /// The offset this view starts at.
    pub fn begin(&self) -> usize {
        self.begin
    }
}

impl<T> IntoInner for Slice<T> {
    type Inner = T;

    fn into_inner(self) -> Self::Inner {
        self.buffer
    }
}

unsafe impl<T: IoBuf> IoBuf for Slice<T> {
    fn as_buf_ptr(&self) -> *const u8 {
        unsafe { self.buffer.as_buf_ptr().add(self.begin) }
    }

    fn buf_len(&self) -> usize {
        self.buffer.buf_len().saturating_sub(self.begin)
    }

    fn buf_capacity(&self) -> usize {
        self.buffer.buf_capacity().saturating_sub(self.begin)
    }
}

impl<T: SetBufInit> SetBufInit for Slice<T> {
    unsafe fn set_buf_init(&mut self, len: usize) {
        self.buffer.set_buf_init(self.begin + len)
    }
}

unsafe impl<T: IoBufMut> IoBufMut for Slice<T> {
    fn as_buf_mut_ptr(&mut self) -> *mut u8 {
        unsafe { self.buffer.as_buf_mut_ptr().add(self.begin) }
    }
}
