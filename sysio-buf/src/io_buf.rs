use std::mem::MaybeUninit;

/// A stable, owned read buffer.
///
/// # Safety
///
/// The pointer returned by [`IoBuf::as_buf_ptr`] must stay valid and
/// unchanged while the queue owns the value, even if the value itself is
/// moved — implementors must point into a heap allocation or static memory.
pub unsafe trait IoBuf: Unpin + 'static {
    /// Raw pointer to the start of the buffer.
    fn as_buf_ptr(&self) -> *const u8;

    /// Number of initialized bytes.
    fn buf_len(&self) -> usize;

    /// Total capacity, including uninitialized memory.
    fn buf_capacity(&self) -> usize;

    /// The initialized part of the buffer.
    fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.as_buf_ptr(), self.buf_len()) }
    }
}

unsafe impl IoBuf for Vec<u8> {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        self.capacity()
    }
}

unsafe impl IoBuf for Box<[u8]> {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        self.len()
    }
}

unsafe impl IoBuf for &'static [u8] {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        self.len()
    }
}

unsafe impl IoBuf for &'static str {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        self.len()
    }
}

unsafe impl IoBuf for String {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        self.capacity()
    }
}

unsafe impl<const N: usize> IoBuf for arrayvec::ArrayVec<u8, N> {
    fn as_buf_ptr(&self) -> *const u8 {
        self.as_ptr()
    }

    fn buf_len(&self) -> usize {
        self.len()
    }

    fn buf_capacity(&self) -> usize {
        N
    }
}

/// Extend the initialized part of a buffer after the kernel wrote into it.
pub trait SetBufInit {
    /// Declare that `len` bytes are now initialized.
    ///
    /// # Safety
    ///
    /// `len` bytes must really have been initialized.
    unsafe fn set_buf_init(&mut self, len: usize);
}

impl SetBufInit for Vec<u8> {
    unsafe fn set_buf_init(&mut self, len: usize) {
        if len > self.len() {
            self.set_len(len);
        }
    }
}

impl SetBufInit for Box<[u8]> {
    unsafe fn set_buf_init(&mut self, _len: usize) {}
}

impl<const N: usize> SetBufInit for arrayvec::ArrayVec<u8, N> {
    unsafe fn set_buf_init(&mut self, len: usize) {
        if len > self.len() {
            self.set_len(len);
        }
    }
}

/// A stable, owned write buffer.
///
/// # Safety
///
/// Same stability requirements as [`IoBuf`], for the mutable pointer.
pub unsafe trait IoBufMut: IoBuf + SetBufInit {
    /// Raw mutable pointer to the start of the buffer.
    fn as_buf_mut_ptr(&mut self) -> *mut u8;

    /// The whole buffer as possibly-uninitialized memory.
    fn as_uninit(&mut self) -> &mut [MaybeUninit<u8>] {
        unsafe {
            std::slice::from_raw_parts_mut(self.as_buf_mut_ptr().cast(), self.buf_capacity())
        }
    }
}

unsafe impl IoBufMut for Vec<u8> {
    fn as_buf_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }
}

unsafe impl IoBufMut for Box<[u8]> {
    fn as_buf_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }
}

unsafe impl<const N: usize> IoBufMut for arrayvec::ArrayVec<u8, N> {
    fn as_buf_mut_ptr(&mut self) -> *mut u8 {
        self.as_mut_ptr()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec_tracks_capacity() {
        let mut buf = Vec::with_capacity(16);
        assert_eq!(buf.buf_len(), 0);
        assert_eq!(buf.buf_capacity(), 16);
        buf.extend_from_slice(b"abc");
        assert_eq!(buf.as_slice(), b"abc");
        unsafe {
            buf.as_uninit()[3].write(b'd');
            buf.set_buf_init(4);
        }
        assert_eq!(buf.as_slice(), b"abcd");
    }

    #[test]
    fn set_init_never_shrinks() {
        let mut buf = b"hello".to_vec();
        unsafe { buf.set_buf_init(1) };
        assert_eq!(buf.as_slice(), b"hello");
    }

    #[test]
    fn array_vec_capacity_is_fixed() {
        let mut buf = arrayvec::ArrayVec::<u8, 8>::new();
        assert_eq!(buf.buf_capacity(), 8);
        buf.try_extend_from_slice(b"ab").unwrap();
        assert_eq!(buf.as_slice(), b"ab");
        unsafe {
            buf.as_uninit()[2].write(b'c');
            buf.set_buf_init(3);
        }
        assert_eq!(buf.as_slice(), b"abc");
    }
}
