//! Filesystem request and completion shapes.
//!
//! [`FsOp`] is the normalized request handed to the engine; [`FsReq`] is the
//! completion record the engine hands back, in the shape a native
//! `uv_fs_t` would have: a kind tag, an integer result (`-1` on failure), an
//! error code, the path the request was issued with, and a payload pointer
//! for results that do not fit in an integer.

use std::collections::TryReserveError;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::error::ErrorCode;

/// Operation kind, numbered like `uv_fs_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum FsType {
    Unknown = -1,
    Custom = 0,
    Open = 1,
    Close = 2,
    Read = 3,
    Write = 4,
    Sendfile = 5,
    Stat = 6,
    Lstat = 7,
    Fstat = 8,
    Ftruncate = 9,
    Utime = 10,
    Futime = 11,
    Chmod = 12,
    Fchmod = 13,
    Fsync = 14,
    Fdatasync = 15,
    Unlink = 16,
    Rmdir = 17,
    Mkdir = 18,
    Rename = 19,
    Readdir = 20,
    Link = 21,
    Symlink = 22,
    Readlink = 23,
    Chown = 24,
    Fchown = 25,
}

impl FsType {
    /// Every kind, in numeric order.
    pub const ALL: [FsType; 27] = [
        FsType::Unknown,
        FsType::Custom,
        FsType::Open,
        FsType::Close,
        FsType::Read,
        FsType::Write,
        FsType::Sendfile,
        FsType::Stat,
        FsType::Lstat,
        FsType::Fstat,
        FsType::Ftruncate,
        FsType::Utime,
        FsType::Futime,
        FsType::Chmod,
        FsType::Fchmod,
        FsType::Fsync,
        FsType::Fdatasync,
        FsType::Unlink,
        FsType::Rmdir,
        FsType::Mkdir,
        FsType::Rename,
        FsType::Readdir,
        FsType::Link,
        FsType::Symlink,
        FsType::Readlink,
        FsType::Chown,
        FsType::Fchown,
    ];

    pub const fn code(self) -> i32 {
        self as i32
    }

    /// Dense index into tables sized `ALL.len()`.
    pub const fn index(self) -> usize {
        (self as i32 + 1) as usize
    }

    pub fn from_code(code: i32) -> Option<FsType> {
        FsType::ALL.iter().copied().find(|t| t.code() == code)
    }

    /// Name of the system call backing this kind.
    pub const fn syscall(self) -> &'static str {
        match self {
            FsType::Unknown => "unknown",
            FsType::Custom => "custom",
            FsType::Open => "open",
            FsType::Close => "close",
            FsType::Read => "read",
            FsType::Write => "write",
            FsType::Sendfile => "sendfile",
            FsType::Stat => "stat",
            FsType::Lstat => "lstat",
            FsType::Fstat => "fstat",
            FsType::Ftruncate => "ftruncate",
            FsType::Utime => "utime",
            FsType::Futime => "futime",
            FsType::Chmod => "chmod",
            FsType::Fchmod => "fchmod",
            FsType::Fsync => "fsync",
            FsType::Fdatasync => "fdatasync",
            FsType::Unlink => "unlink",
            FsType::Rmdir => "rmdir",
            FsType::Mkdir => "mkdir",
            FsType::Rename => "rename",
            FsType::Readdir => "readdir",
            FsType::Link => "link",
            FsType::Symlink => "symlink",
            FsType::Readlink => "readlink",
            FsType::Chown => "chown",
            FsType::Fchown => "fchown",
        }
    }
}

impl fmt::Display for FsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.syscall())
    }
}

/// Byte storage shared between a request owner and the engine.
///
/// The engine locks it for the duration of the syscall that reads into or
/// writes from it. Clones share the same storage.
#[derive(Clone, Default)]
pub struct Buf(Arc<Mutex<Vec<u8>>>);

impl Buf {
    /// Allocate `len` zeroed bytes, reporting allocation failure.
    pub fn try_zeroed(len: usize) -> Result<Self, TryReserveError> {
        let mut bytes = Vec::new();
        bytes.try_reserve_exact(len)?;
        bytes.resize(len, 0);
        Ok(Self::from_vec(bytes))
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Arc::new(Mutex::new(bytes)))
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn lock(&self) -> MutexGuard<'_, Vec<u8>> {
        self.0.lock()
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.lock().clone()
    }
}

impl fmt::Debug for Buf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buf").field("len", &self.len()).finish()
    }
}

/// Normalized filesystem operation.
#[derive(Debug, Clone)]
pub enum FsOp {
    Open {
        path: String,
        flags: i32,
        mode: i32,
    },
    Close {
        fd: i32,
    },
    /// Read up to `len` bytes into `buf`; `position < 0` reads at the
    /// current file offset.
    Read {
        fd: i32,
        buf: Buf,
        len: usize,
        position: i64,
    },
    /// Write the first `len` bytes of `buf`; `position < 0` writes at the
    /// current file offset.
    Write {
        fd: i32,
        buf: Buf,
        len: usize,
        position: i64,
    },
    Unlink {
        path: String,
    },
    Mkdir {
        path: String,
        mode: i32,
    },
    Rmdir {
        path: String,
    },
    Readdir {
        path: String,
        flags: i32,
    },
    Stat {
        path: String,
    },
    Lstat {
        path: String,
    },
    Fstat {
        fd: i32,
    },
    Rename {
        path: String,
        new_path: String,
    },
    Fsync {
        fd: i32,
    },
    Fdatasync {
        fd: i32,
    },
    Ftruncate {
        fd: i32,
        offset: i64,
    },
    Sendfile {
        out_fd: i32,
        in_fd: i32,
        offset: i64,
        length: usize,
    },
    Chmod {
        path: String,
        mode: i32,
    },
    Fchmod {
        fd: i32,
        mode: i32,
    },
    Chown {
        path: String,
        uid: u32,
        gid: u32,
    },
    Fchown {
        fd: i32,
        uid: u32,
        gid: u32,
    },
    /// Timestamps in seconds since the epoch.
    Utime {
        path: String,
        atime: f64,
        mtime: f64,
    },
    Futime {
        fd: i32,
        atime: f64,
        mtime: f64,
    },
    Link {
        path: String,
        new_path: String,
    },
    Symlink {
        path: String,
        new_path: String,
        flags: i32,
    },
    Readlink {
        path: String,
    },
}

impl FsOp {
    pub fn fs_type(&self) -> FsType {
        match self {
            FsOp::Open { .. } => FsType::Open,
            FsOp::Close { .. } => FsType::Close,
            FsOp::Read { .. } => FsType::Read,
            FsOp::Write { .. } => FsType::Write,
            FsOp::Unlink { .. } => FsType::Unlink,
            FsOp::Mkdir { .. } => FsType::Mkdir,
            FsOp::Rmdir { .. } => FsType::Rmdir,
            FsOp::Readdir { .. } => FsType::Readdir,
            FsOp::Stat { .. } => FsType::Stat,
            FsOp::Lstat { .. } => FsType::Lstat,
            FsOp::Fstat { .. } => FsType::Fstat,
            FsOp::Rename { .. } => FsType::Rename,
            FsOp::Fsync { .. } => FsType::Fsync,
            FsOp::Fdatasync { .. } => FsType::Fdatasync,
            FsOp::Ftruncate { .. } => FsType::Ftruncate,
            FsOp::Sendfile { .. } => FsType::Sendfile,
            FsOp::Chmod { .. } => FsType::Chmod,
            FsOp::Fchmod { .. } => FsType::Fchmod,
            FsOp::Chown { .. } => FsType::Chown,
            FsOp::Fchown { .. } => FsType::Fchown,
            FsOp::Utime { .. } => FsType::Utime,
            FsOp::Futime { .. } => FsType::Futime,
            FsOp::Link { .. } => FsType::Link,
            FsOp::Symlink { .. } => FsType::Symlink,
            FsOp::Readlink { .. } => FsType::Readlink,
        }
    }

    /// Primary path argument, if the operation is path based.
    pub fn path(&self) -> Option<&str> {
        match self {
            FsOp::Open { path, .. }
            | FsOp::Unlink { path }
            | FsOp::Mkdir { path, .. }
            | FsOp::Rmdir { path }
            | FsOp::Readdir { path, .. }
            | FsOp::Stat { path }
            | FsOp::Lstat { path }
            | FsOp::Rename { path, .. }
            | FsOp::Chmod { path, .. }
            | FsOp::Chown { path, .. }
            | FsOp::Utime { path, .. }
            | FsOp::Link { path, .. }
            | FsOp::Symlink { path, .. }
            | FsOp::Readlink { path } => Some(path),
            _ => None,
        }
    }

    /// Descriptors the operation acts on.
    fn descriptors(&self) -> [Option<i32>; 2] {
        match self {
            FsOp::Close { fd }
            | FsOp::Read { fd, .. }
            | FsOp::Write { fd, .. }
            | FsOp::Fstat { fd }
            | FsOp::Fsync { fd }
            | FsOp::Fdatasync { fd }
            | FsOp::Ftruncate { fd, .. }
            | FsOp::Fchmod { fd, .. }
            | FsOp::Fchown { fd, .. }
            | FsOp::Futime { fd, .. } => [Some(*fd), None],
            FsOp::Sendfile { out_fd, in_fd, .. } => [Some(*out_fd), Some(*in_fd)],
            _ => [None, None],
        }
    }

    /// Checks performed before any work starts. A failure here is a
    /// submission failure: the operation never runs.
    pub fn validate(&self) -> Result<(), ErrorCode> {
        if self.descriptors().iter().flatten().any(|fd| *fd < 0) {
            return Err(ErrorCode::EBADF);
        }
        let paths = match self {
            FsOp::Rename { path, new_path }
            | FsOp::Link { path, new_path }
            | FsOp::Symlink { path, new_path, .. } => [Some(path.as_str()), Some(new_path.as_str())],
            other => [other.path(), None],
        };
        if paths.iter().flatten().any(|p| p.as_bytes().contains(&0)) {
            return Err(ErrorCode::EINVAL);
        }
        match self {
            FsOp::Read { buf, len, .. } | FsOp::Write { buf, len, .. } if *len > buf.len() => {
                Err(ErrorCode::EINVAL)
            }
            _ => Ok(()),
        }
    }
}

/// Native file status, timestamps in whole seconds.
///
/// `blksize`/`blocks` are `None` on platforms whose stat structure does not
/// expose them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeStat {
    pub dev: u64,
    pub ino: u64,
    pub mode: u32,
    pub nlink: u64,
    pub uid: u32,
    pub gid: u32,
    pub rdev: u64,
    pub size: i64,
    pub blksize: Option<u64>,
    pub blocks: Option<u64>,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
}

/// Engine-owned payload attached to a completion.
#[derive(Debug, Default)]
pub enum FsPtr {
    #[default]
    None,
    /// `stat`, `lstat`, `fstat`
    Stat(NativeStat),
    /// `readdir`: `result` names, each terminated by a NUL byte
    Names(Vec<u8>),
    /// `readlink`: NUL-terminated target
    Link(Vec<u8>),
}

/// Completion record for one filesystem operation.
#[derive(Debug)]
pub struct FsReq {
    pub fs_type: FsType,
    /// `-1` on failure, otherwise descriptor, byte count, entry count or 0.
    pub result: i64,
    pub errorno: Option<ErrorCode>,
    pub path: Option<String>,
    ptr: FsPtr,
}

impl FsReq {
    pub fn new(fs_type: FsType, path: Option<String>) -> Self {
        Self {
            fs_type,
            result: 0,
            errorno: None,
            path,
            ptr: FsPtr::None,
        }
    }

    pub(crate) fn for_op(op: &FsOp) -> Self {
        Self::new(op.fs_type(), op.path().map(str::to_string))
    }

    pub fn succeed(mut self, result: i64) -> Self {
        self.result = result;
        self.errorno = None;
        self
    }

    pub fn fail(mut self, code: ErrorCode) -> Self {
        self.result = -1;
        self.errorno = Some(code);
        self.ptr = FsPtr::None;
        self
    }

    pub fn with_ptr(mut self, ptr: FsPtr) -> Self {
        self.ptr = ptr;
        self
    }

    pub fn is_err(&self) -> bool {
        self.result < 0
    }

    /// Error code of a failed request; `EIO` if the engine left none.
    pub fn error_code(&self) -> ErrorCode {
        self.errorno.unwrap_or(ErrorCode::EIO)
    }

    pub fn ptr(&self) -> &FsPtr {
        &self.ptr
    }

    /// Release the engine-owned payload.
    pub fn cleanup(&mut self) {
        self.ptr = FsPtr::None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fs_type_codes_round_trip() {
        for (idx, kind) in FsType::ALL.iter().enumerate() {
            assert_eq!(kind.index(), idx);
            assert_eq!(FsType::from_code(kind.code()), Some(*kind));
        }
        assert_eq!(FsType::from_code(99), None);
    }

    #[test]
    fn negative_descriptor_fails_validation() {
        let op = FsOp::Sendfile {
            out_fd: 1,
            in_fd: -1,
            offset: 0,
            length: 10,
        };
        assert_eq!(op.validate(), Err(ErrorCode::EBADF));
    }

    #[test]
    fn nul_in_second_path_fails_validation() {
        let op = FsOp::Rename {
            path: "a".into(),
            new_path: "b\0c".into(),
        };
        assert_eq!(op.validate(), Err(ErrorCode::EINVAL));
    }

    #[test]
    fn read_longer_than_buffer_fails_validation() {
        let op = FsOp::Read {
            fd: 0,
            buf: Buf::from_vec(vec![0; 4]),
            len: 5,
            position: 0,
        };
        assert_eq!(op.validate(), Err(ErrorCode::EINVAL));
    }

    #[test]
    fn cleanup_drops_payload() {
        let mut req = FsReq::new(FsType::Readdir, Some("d".into()))
            .with_ptr(FsPtr::Names(b"a\0".to_vec()))
            .succeed(1);
        req.cleanup();
        assert!(matches!(req.ptr(), FsPtr::None));
    }
}
