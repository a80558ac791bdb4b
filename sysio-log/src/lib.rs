//! Logging facade used across the sysio crates.
//!
//! The queue's hot paths trace registrations, wakeups and cancellations,
//! which nobody wants to pay for by default: unless the `enable_log`
//! feature is on, every macro here compiles to nothing. With it on, the
//! calls forward to [`tracing`].
//!
//! Only the surface the sysio crates use is exposed: `trace!`, `debug!`,
//! `span!` (for [`instrument!`]) and the [`Level`]/[`Span`] types.

pub use tracing::{Level, Span};

#[cfg(feature = "enable_log")]
pub use tracing::{debug, span, trace};

#[cfg(not(feature = "enable_log"))]
pub mod dummy;

/// Enter a span for the rest of the enclosing scope.
#[cfg(feature = "enable_log")]
#[macro_export]
macro_rules! instrument {
    ($lvl:expr, $name:expr, $($fields:tt)*) => {
        let _guard = $crate::span!(target: module_path!(), $lvl, $name, $($fields)*).entered();
    };
    ($lvl:expr, $name:expr) => {
        let _guard = $crate::span!(target: module_path!(), $lvl, $name).entered();
    };
}

/// Enter a span for the rest of the enclosing scope.
#[cfg(not(feature = "enable_log"))]
#[macro_export]
macro_rules! instrument {
    ($lvl:expr, $name:expr, $($fields:tt)*) => {};
    ($lvl:expr, $name:expr) => {};
}
