//! Conditional logging macros.
//!
//! With the `tracing` feature the engine re-exports the `tracing` macros, so
//! parser diagnostics, clipper splits and silently dropped geometry show up
//! under `RUST_LOG=xyru=debug`. Without it every call site compiles away.

#[cfg(feature = "tracing")]
pub use tracing::{debug, trace, warn};

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {};
}

#[cfg(not(feature = "tracing"))]
pub use crate::{debug, trace, warn};
