use std::{io, os::fd::RawFd, path::PathBuf};

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TableError {
    #[error("source table is full ({capacity} sources)")]
    CapacityExceeded { capacity: usize },

    #[error("position {position} is out of range (table holds {len} sources)")]
    OutOfRange { position: usize, len: usize },
}

/// Configuration errors reported synchronously to the registering driver.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("handle {0} is already registered")]
    DuplicateHandle(RawFd),

    #[error("handle {0} is not a valid descriptor")]
    InvalidHandle(RawFd),

    #[error("no callback bound to token `{0}`")]
    NotFound(String),

    #[error(transparent)]
    Table(#[from] TableError),
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DispatchError {
    #[error("poll failed ({category}): {errno}")]
    Poll {
        errno: Errno,
        category: &'static str,
    },

    #[error("dispatch loop already stopped")]
    Stopped,
}

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Os(#[from] Errno),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to read config {path:?}: {source}")]
    ConfigRead { path: PathBuf, source: io::Error },

    #[error("unsupported config format: {0:?}")]
    UnsupportedFormat(PathBuf),

    #[error("failed to parse config {path:?}: {reason}")]
    ConfigParse { path: PathBuf, reason: String },

    #[error("poll timeout of {0} ms is out of range")]
    InvalidTimeout(i32),

    #[error("required device `{token}` could not be started: {source}")]
    Device { token: String, source: DriverError },

    #[error("failed to open message log {path:?}: {source}")]
    LogSink { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Os(#[from] Errno),
}

/// Everything that ends the process with a non-zero status.
#[derive(Debug, Error)]
pub enum FcfError {
    #[error(transparent)]
    Startup(#[from] StartupError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("failed to flush message bus: {0}")]
    Flush(#[from] io::Error),
}
