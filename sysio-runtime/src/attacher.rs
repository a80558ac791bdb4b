use std::{
    io,
    marker::PhantomData,
    ops::{Deref, DerefMut},
};

use sysio_buf::IntoInner;
use sysio_driver::AsRawFd;

/// Attach a resource to the queue of the current thread.
///
/// A resource can and only can attach once, to one queue; the attacher
/// persists it on construction and unregisters it on drop, before the
/// wrapped handle closes. Attached resources cannot leave their thread.
#[derive(Debug)]
pub struct Attacher<S: AsRawFd> {
    source: S,
    // Queue resources stay on the thread that owns the queue.
    _p: PhantomData<*const ()>,
}

impl<S: AsRawFd> Attacher<S> {
    /// Create [`Attacher`], persisting the source to the current thread's
    /// queue.
    pub fn new(source: S) -> io::Result<Self> {
        crate::persist(source.as_raw_fd())?;
        Ok(Self {
            source,
            _p: PhantomData,
        })
    }
}

impl<S: AsRawFd> Drop for Attacher<S> {
    fn drop(&mut self) {
        // Unregister before the handle closes; there is nothing to report
        // an error to here.
        let _ = crate::unregister(self.source.as_raw_fd());
    }
}

impl<S: AsRawFd> IntoInner for Attacher<S> {
    type Inner = S;

    fn into_inner(mut self) -> Self::Inner {
        let _ = crate::unregister(self.source.as_raw_fd());
        // SAFETY: `source` is not touched again; Drop must not run or it
        // would unregister twice and drop a moved-out field.
        let source = unsafe { std::ptr::read(&self.source) };
        std::mem::forget(self);
        source
    }
}

impl<S: AsRawFd> Deref for Attacher<S> {
    type Target = S;

    fn deref(&self) -> &Self::Target {
        &self.source
    }
}

impl<S: AsRawFd> DerefMut for Attacher<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.source
    }
}
