//! File and pipe I/O.
//!
//! [`File`] and the blocking pipe ends follow the synchronous contracts: a
//! read returns up to the requested length and 0 at end-of-file, a file
//! write either transfers the whole buffer or reports how far it got. The
//! async pipe ends (and, on Windows, [`AsyncFile`]) drive the calling
//! thread's event queue instead of blocking.

#![warn(missing_docs)]

mod error;
pub use error::PartialWriteError;

mod file;
pub use file::{File, OpenOptions, SeekFrom};

pub mod pipe;

#[cfg(windows)]
mod async_file;
#[cfg(windows)]
pub use async_file::AsyncFile;
