//! Engine error types.
//!
//! Operation failures never surface as Rust errors here: they are reported
//! through `FsReq::result == -1` plus an [`ErrorCode`], exactly as a native
//! completion would carry them. [`UvError`] only covers loop construction and
//! configuration.

use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Native error code (an OS `errno` value).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ErrorCode(i32);

impl ErrorCode {
    #[cfg(unix)]
    pub const EBADF: ErrorCode = ErrorCode(libc::EBADF);
    #[cfg(unix)]
    pub const EFAULT: ErrorCode = ErrorCode(libc::EFAULT);
    #[cfg(unix)]
    pub const EINVAL: ErrorCode = ErrorCode(libc::EINVAL);
    #[cfg(unix)]
    pub const EIO: ErrorCode = ErrorCode(libc::EIO);
    #[cfg(unix)]
    pub const ENOENT: ErrorCode = ErrorCode(libc::ENOENT);
    #[cfg(unix)]
    pub const ENOSYS: ErrorCode = ErrorCode(libc::ENOSYS);

    #[cfg(not(unix))]
    pub const EBADF: ErrorCode = ErrorCode(9);
    #[cfg(not(unix))]
    pub const EFAULT: ErrorCode = ErrorCode(14);
    #[cfg(not(unix))]
    pub const EINVAL: ErrorCode = ErrorCode(22);
    #[cfg(not(unix))]
    pub const EIO: ErrorCode = ErrorCode(5);
    #[cfg(not(unix))]
    pub const ENOENT: ErrorCode = ErrorCode(2);
    #[cfg(not(unix))]
    pub const ENOSYS: ErrorCode = ErrorCode(40);

    pub const fn new(code: i32) -> Self {
        Self(code)
    }

    pub const fn raw(self) -> i32 {
        self.0
    }

    /// Extract the errno carried by an I/O error, defaulting to `EIO`.
    pub fn from_io(err: &io::Error) -> Self {
        err.raw_os_error().map(Self).unwrap_or(Self::EIO)
    }

    pub fn last_os_error() -> Self {
        Self::from_io(&io::Error::last_os_error())
    }

    /// Symbolic name, e.g. `"ENOENT"`. Unknown codes map to `"UNKNOWN"`.
    pub fn name(self) -> &'static str {
        errno_name(self.0).unwrap_or("UNKNOWN")
    }

    /// Human readable description from the platform.
    pub fn description(self) -> String {
        let text = io::Error::from_raw_os_error(self.0).to_string();
        match text.rfind(" (os error ") {
            Some(idx) => text[..idx].to_string(),
            None => text,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {}", self.name(), self.description())
    }
}

macro_rules! errno_names {
    ($($name:ident),* $(,)?) => {
        #[cfg(unix)]
        fn errno_name(code: i32) -> Option<&'static str> {
            $(
                if code == libc::$name {
                    return Some(stringify!($name));
                }
            )*
            None
        }
    };
}

errno_names!(
    EPERM, ENOENT, ESRCH, EINTR, EIO, ENXIO, E2BIG, EBADF, EAGAIN, ENOMEM, EACCES, EFAULT,
    EBUSY, EEXIST, EXDEV, ENODEV, ENOTDIR, EISDIR, EINVAL, ENFILE, EMFILE, ENOTTY, EFBIG,
    ENOSPC, ESPIPE, EROFS, EMLINK, EPIPE, ENAMETOOLONG, ENOSYS, ENOTEMPTY, ELOOP, ENOTSUP,
    ETIMEDOUT, ECANCELED,
);

#[cfg(not(unix))]
fn errno_name(code: i32) -> Option<&'static str> {
    match code {
        2 => Some("ENOENT"),
        5 => Some("EIO"),
        9 => Some("EBADF"),
        14 => Some("EFAULT"),
        22 => Some("EINVAL"),
        40 => Some("ENOSYS"),
        _ => None,
    }
}

/// Errors raised while building or configuring a [`Loop`](crate::Loop).
#[derive(Debug, Error)]
pub enum UvError {
    /// The worker pool could not be started
    #[error("failed to start worker pool: {0}")]
    Runtime(#[source] io::Error),

    /// Config file could not be read
    #[error("failed to read {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML for [`LoopConfig`](crate::LoopConfig)
    #[error("failed to parse {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting is out of range
    #[error("invalid value for {name}: {value}")]
    InvalidSetting { name: &'static str, value: String },
}

/// Result type alias for engine setup.
pub type UvResult<T> = Result<T, UvError>;
