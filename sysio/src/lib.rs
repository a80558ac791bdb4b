//! Per-thread asynchronous I/O.
//!
//! Each thread owns an event queue multiplexing kernel notifications
//! (epoll on Linux, kqueue on BSD and macOS, IOCP on Windows); files,
//! pipes and sockets submit their operations to it and suspend until the
//! kernel reports them ready or complete.
//!
//! ```
//! use sysio::fs::pipe;
//!
//! sysio::block_on(async {
//!     let (rx, tx) = pipe::pipe_async().unwrap();
//!     tx.write_all("ping").await.0.unwrap();
//!     let (n, buf) = rx.read(Vec::with_capacity(4)).await.unwrap();
//!     assert_eq!(n, 4);
//!     assert_eq!(buf, b"ping");
//! });
//! ```

#![warn(missing_docs)]

#[doc(no_inline)]
pub use sysio_buf as buf;
#[doc(no_inline)]
pub use sysio_driver as driver;
#[doc(no_inline)]
pub use sysio_fs as fs;
#[doc(no_inline)]
pub use sysio_net as net;
#[doc(no_inline)]
pub use sysio_runtime as runtime;

#[doc(no_inline)]
pub use buf::BufResult;
#[doc(no_inline)]
pub use runtime::{block_on, spawn, submit};
