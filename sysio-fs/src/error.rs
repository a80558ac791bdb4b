use std::{error, fmt, io};

/// Payload of an error raised after part of a buffer was already
/// transferred. Carried inside the [`io::Error`] returned by the
/// full-buffer write paths.
#[derive(Debug)]
pub struct PartialWriteError {
    /// Bytes transferred before the failure.
    pub transferred: usize,
    source: io::Error,
}

impl fmt::Display for PartialWriteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "wrote {} bytes before failing: {}",
            self.transferred, self.source
        )
    }
}

impl error::Error for PartialWriteError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        Some(&self.source)
    }
}

pub(crate) fn partial_write(transferred: usize, source: io::Error) -> io::Error {
    let kind = source.kind();
    io::Error::new(
        kind,
        PartialWriteError {
            transferred,
            source,
        },
    )
}

pub(crate) fn write_zero(transferred: usize) -> io::Error {
    partial_write(
        transferred,
        io::Error::new(io::ErrorKind::WriteZero, "write returned 0 bytes"),
    )
}
