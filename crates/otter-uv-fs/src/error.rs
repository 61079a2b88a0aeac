//! Error translation.
//!
//! A failed completion becomes an [`FsError`]: the native code, its symbolic
//! name, the operation and the path arguments. Synchronous calls return it
//! inside [`FilesError::Fs`]; asynchronous calls deliver it to the callback
//! as `[Int(-1), Error(..)]`.

use std::fmt;

use otter_uv::{ErrorCode, FsReq};
use thiserror::Error;

use crate::object::RangeFault;

/// Translated filesystem error (code + syscall + path context).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsError {
    pub errno: ErrorCode,
    pub code: &'static str,
    pub syscall: &'static str,
    pub path: Option<String>,
    pub dest: Option<String>,
}

impl FsError {
    pub fn new(errno: ErrorCode, syscall: &'static str, path: Option<String>) -> Self {
        Self {
            errno,
            code: errno.name(),
            syscall,
            path,
            dest: None,
        }
    }

    /// Error carried by a failed completion record.
    pub fn from_req(req: &FsReq) -> Self {
        Self::new(req.error_code(), req.fs_type.syscall(), req.path.clone())
    }

    /// Attach the second path of a two-path operation.
    pub fn with_dest(mut self, dest: Option<String>) -> Self {
        self.dest = dest;
        self
    }

    pub fn description(&self) -> String {
        self.errno.description()
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.path, &self.dest) {
            (Some(path), Some(dest)) => write!(
                f,
                "{}: {} '{}' -> '{}': {}",
                self.code,
                self.syscall,
                path,
                dest,
                self.description()
            ),
            (Some(path), None) => write!(
                f,
                "{}: {} '{}': {}",
                self.code,
                self.syscall,
                path,
                self.description()
            ),
            _ => write!(f, "{}: {}: {}", self.code, self.syscall, self.description()),
        }
    }
}

impl std::error::Error for FsError {}

/// Errors returned by [`Files`](crate::Files) operations.
#[derive(Debug, Error)]
pub enum FilesError {
    /// The operation was rejected or failed
    #[error(transparent)]
    Fs(#[from] FsError),

    /// A buffer region outside the managed array
    #[error(transparent)]
    Range(#[from] RangeFault),

    /// Scratch storage could not be allocated
    #[error("out of memory: failed to allocate {requested} byte scratch buffer")]
    OutOfMemory { requested: usize },
}

impl FilesError {
    /// The translated filesystem error, if this is one.
    pub fn as_fs(&self) -> Option<&FsError> {
        match self {
            FilesError::Fs(err) => Some(err),
            _ => None,
        }
    }
}

/// Result type alias for bridge operations.
pub type FilesResult<T> = Result<T, FilesError>;
