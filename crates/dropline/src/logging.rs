//! Here we make logging macros available.
//! Based on features we either export defmt macros or log wrapper macros.
//!
//! All records go out under the `dropline` target, so hosts can filter the
//! link layer separately from the application.

#![allow(unused_macros)]

#[allow(unused_imports)]
#[cfg(all(feature = "defmt-v1", not(feature = "std")))]
pub(crate) use defmt::{debug, error, info, trace, warn};

/// Wrapper macro for log::debug under the dropline target.
#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! debug {
    ($($arg:tt)+) => (log::debug!(target: "dropline", $($arg)+))
}

/// Wrapper macro for log::error under the dropline target.
#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! error {
    ($($arg:tt)+) => (log::error!(target: "dropline", $($arg)+))
}

/// Wrapper macro for log::info under the dropline target.
#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! info {
    ($($arg:tt)+) => (log::info!(target: "dropline", $($arg)+))
}

/// Wrapper macro for log::trace under the dropline target.
#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! trace {
    ($($arg:tt)+) => (log::trace!(target: "dropline", $($arg)+))
}

/// Wrapper macro for log::warn under the dropline target.
///
/// Named `warni` because a `macro_rules!` called `warn` collides with the
/// builtin lint attribute; it is re-exported as `warn` below.
#[clippy::format_args]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
macro_rules! warni {
    ($($arg:tt)+) => (log::warn!(target: "dropline", $($arg)+))
}

#[allow(unused_imports)]
#[cfg(not(all(feature = "defmt-v1", not(feature = "std"))))]
pub(crate) use {debug, error, info, trace, warni as warn};
