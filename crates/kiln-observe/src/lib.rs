//! Logging bootstrap for the kiln daemon.
//!
//! `logger_init` installs the global `tracing` subscriber; with the `subscriber` feature the
//! [`Journal`] taskvisor subscriber turns supervisor events into log lines.

mod logger;
pub use logger::*;

#[cfg(feature = "subscriber")]
mod subscriber;
#[cfg(feature = "subscriber")]
pub use subscriber::*;
