//! Operation facade.
//!
//! Every operation takes a trailing `callback`. With `0` the call blocks and
//! returns the converted result (or the translated error). With any other
//! id the operation is queued on the loop, the call returns at once, and the
//! result later reaches the bound [`FileCallbackTarget`] under that id.

use std::fmt;
use std::sync::Arc;

use otter_uv::{Buf, ErrorCode, FsOp, FsReq, FsType, Loop};

use crate::callbacks::{CallbackId, FileCallbackTarget, FileCallbacks};
use crate::codec::{self, Decoded};
use crate::error::{FilesError, FilesResult, FsError};
use crate::object::ByteArray;
use crate::path;
use crate::request::FileRequest;
use crate::stats::Stats;

/// Conversion of a synchronous result; asynchronous calls return
/// [`Outcome::submitted`].
trait Outcome: Sized {
    fn submitted() -> Self;
    fn from_decoded(kind: FsType, decoded: Decoded) -> Self;
}

fn mismatch(kind: FsType, decoded: &Decoded) -> ! {
    panic!("unexpected {decoded:?} for {kind} completion")
}

impl Outcome for i32 {
    fn submitted() -> Self {
        0
    }

    fn from_decoded(kind: FsType, decoded: Decoded) -> Self {
        match decoded {
            Decoded::Empty => 0,
            Decoded::Integer(v) => v,
            other => mismatch(kind, &other),
        }
    }
}

impl Outcome for i64 {
    fn submitted() -> Self {
        0
    }

    fn from_decoded(kind: FsType, decoded: Decoded) -> Self {
        match decoded {
            Decoded::Empty => 0,
            Decoded::Long(v) => v,
            other => mismatch(kind, &other),
        }
    }
}

impl Outcome for Option<Stats> {
    fn submitted() -> Self {
        None
    }

    fn from_decoded(kind: FsType, decoded: Decoded) -> Self {
        match decoded {
            Decoded::Stat(stats) => stats,
            other => mismatch(kind, &other),
        }
    }
}

impl Outcome for Option<String> {
    fn submitted() -> Self {
        None
    }

    fn from_decoded(kind: FsType, decoded: Decoded) -> Self {
        match decoded {
            Decoded::Str(s) => Some(s),
            other => mismatch(kind, &other),
        }
    }
}

impl Outcome for Option<Vec<String>> {
    fn submitted() -> Self {
        None
    }

    fn from_decoded(kind: FsType, decoded: Decoded) -> Self {
        match decoded {
            Decoded::Names(names) => Some(names),
            other => mismatch(kind, &other),
        }
    }
}

/// Fixed completion hook for every asynchronous operation.
fn on_complete(mut req: FsReq, mut request: FileRequest, dest: Option<String>) {
    request.mark_completed(!req.is_err());
    let decoded = match codec::decode(&req, Some(&mut request)) {
        Decoded::Failed(err) => Decoded::Failed(err.with_dest(dest)),
        decoded => decoded,
    };
    req.cleanup();
    request
        .callbacks()
        .deliver(req.fs_type, request.callback_id(), decoded.into_reply());
    request.dispose();
}

/// Filesystem operations over one [`Loop`].
pub struct Files {
    uv: Arc<Loop>,
    callbacks: Arc<FileCallbacks>,
}

impl Files {
    pub fn new(uv: Arc<Loop>) -> Self {
        FileCallbacks::static_initialize();
        Self {
            uv,
            callbacks: Arc::new(FileCallbacks::new()),
        }
    }

    /// Bind the receiver of asynchronous completions. Must happen before the
    /// first asynchronous call.
    pub fn initialize(&self, target: Arc<dyn FileCallbackTarget>) {
        self.callbacks.initialize(target);
    }

    pub fn callbacks(&self) -> &Arc<FileCallbacks> {
        &self.callbacks
    }

    pub fn event_loop(&self) -> &Arc<Loop> {
        &self.uv
    }

    fn call<T: Outcome>(
        &self,
        callback: CallbackId,
        op: FsOp,
        dest: Option<&str>,
        request: Option<FileRequest>,
    ) -> FilesResult<T> {
        let kind = op.fs_type();
        if callback == 0 {
            let mut req = self.uv.fs_sync(op);
            let decoded = codec::decode(&req, None);
            req.cleanup();
            return match decoded {
                Decoded::Failed(err) => Err(err.with_dest(dest.map(str::to_owned)).into()),
                decoded => Ok(T::from_decoded(kind, decoded)),
            };
        }

        self.callbacks.ensure_initialized();
        let mut request = match request {
            Some(request) => request,
            None => FileRequest::create(Arc::clone(&self.callbacks), callback, None, 0, 0)?,
        };
        request.mark_submitted();

        let path = op.path().map(str::to_owned);
        let hook_dest = dest.map(str::to_owned);
        let status = self.uv.fs_submit(
            op,
            Box::new(move |req| on_complete(req, request, hook_dest)),
        );
        if status < 0 {
            let err = FsError::new(ErrorCode::new(-status), kind.syscall(), path)
                .with_dest(dest.map(str::to_owned));
            return Err(err.into());
        }
        Ok(T::submitted())
    }

    pub fn open(&self, path: &str, flags: i32, mode: i32, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Open {
            path: path.to_owned(),
            flags,
            mode,
        };
        self.call(callback, op, None, None)
    }

    pub fn close(&self, fd: i32, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Close { fd }, None, None)
    }

    /// Read up to `length` bytes into `buffer[offset..]`. `position < 0`
    /// reads at the current file offset.
    pub fn read(
        &self,
        fd: i32,
        buffer: &ByteArray,
        length: usize,
        offset: usize,
        position: i64,
        callback: CallbackId,
    ) -> FilesResult<i64> {
        buffer.check_region(offset, length)?;
        if callback == 0 {
            let scratch = Buf::try_zeroed(length)
                .map_err(|_| FilesError::OutOfMemory { requested: length })?;
            let op = FsOp::Read {
                fd,
                buf: scratch.clone(),
                len: length,
                position,
            };
            let bytes_read: i64 = self.call(0, op, None, None)?;
            let staged = scratch.lock();
            buffer.set_region(offset, &staged[..bytes_read as usize])?;
            return Ok(bytes_read);
        }

        let request = FileRequest::create(
            Arc::clone(&self.callbacks),
            callback,
            Some(buffer),
            length,
            offset,
        )?;
        let op = FsOp::Read {
            fd,
            buf: request.scratch(),
            len: length,
            position,
        };
        self.call(callback, op, None, Some(request))
    }

    /// Write `buffer[offset..offset + length]`. `position < 0` writes at the
    /// current file offset.
    pub fn write(
        &self,
        fd: i32,
        buffer: &ByteArray,
        length: usize,
        offset: usize,
        position: i64,
        callback: CallbackId,
    ) -> FilesResult<i64> {
        if callback == 0 {
            let scratch = Buf::from_vec(buffer.get_region(offset, length)?);
            let op = FsOp::Write {
                fd,
                buf: scratch,
                len: length,
                position,
            };
            return self.call(0, op, None, None);
        }

        let mut request =
            FileRequest::create(Arc::clone(&self.callbacks), callback, None, length, 0)?;
        let scratch = request.stage_in(buffer, length, offset)?;
        let op = FsOp::Write {
            fd,
            buf: scratch,
            len: length,
            position,
        };
        self.call(callback, op, None, Some(request))
    }

    pub fn unlink(&self, path: &str, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Unlink {
            path: path.to_owned(),
        };
        self.call(callback, op, None, None)
    }

    pub fn mkdir(&self, path: &str, mode: i32, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Mkdir {
            path: path.to_owned(),
            mode,
        };
        self.call(callback, op, None, None)
    }

    pub fn rmdir(&self, path: &str, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Rmdir {
            path: path.to_owned(),
        };
        self.call(callback, op, None, None)
    }

    /// Entry names of `path`; `None` when queued.
    pub fn readdir(
        &self,
        path: &str,
        flags: i32,
        callback: CallbackId,
    ) -> FilesResult<Option<Vec<String>>> {
        let op = FsOp::Readdir {
            path: path.to_owned(),
            flags,
        };
        self.call(callback, op, None, None)
    }

    pub fn stat(&self, path: &str, callback: CallbackId) -> FilesResult<Option<Stats>> {
        let op = FsOp::Stat {
            path: path.to_owned(),
        };
        self.call(callback, op, None, None)
    }

    pub fn lstat(&self, path: &str, callback: CallbackId) -> FilesResult<Option<Stats>> {
        let op = FsOp::Lstat {
            path: path.to_owned(),
        };
        self.call(callback, op, None, None)
    }

    pub fn fstat(&self, fd: i32, callback: CallbackId) -> FilesResult<Option<Stats>> {
        self.call(callback, FsOp::Fstat { fd }, None, None)
    }

    pub fn rename(&self, path: &str, new_path: &str, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Rename {
            path: path.to_owned(),
            new_path: new_path.to_owned(),
        };
        self.call(callback, op, Some(new_path), None)
    }

    pub fn fsync(&self, fd: i32, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Fsync { fd }, None, None)
    }

    pub fn fdatasync(&self, fd: i32, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Fdatasync { fd }, None, None)
    }

    pub fn ftruncate(&self, fd: i32, offset: i64, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Ftruncate { fd, offset }, None, None)
    }

    /// Copy up to `length` bytes from `in_fd` (at `offset`) to `out_fd`.
    pub fn sendfile(
        &self,
        out_fd: i32,
        in_fd: i32,
        offset: i64,
        length: usize,
        callback: CallbackId,
    ) -> FilesResult<i64> {
        let op = FsOp::Sendfile {
            out_fd,
            in_fd,
            offset,
            length,
        };
        self.call(callback, op, None, None)
    }

    pub fn chmod(&self, path: &str, mode: i32, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Chmod {
            path: path.to_owned(),
            mode,
        };
        self.call(callback, op, None, None)
    }

    pub fn fchmod(&self, fd: i32, mode: i32, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Fchmod { fd, mode }, None, None)
    }

    pub fn chown(&self, path: &str, uid: u32, gid: u32, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Chown {
            path: path.to_owned(),
            uid,
            gid,
        };
        self.call(callback, op, None, None)
    }

    pub fn fchown(&self, fd: i32, uid: u32, gid: u32, callback: CallbackId) -> FilesResult<i32> {
        self.call(callback, FsOp::Fchown { fd, uid, gid }, None, None)
    }

    /// Set access and modification times, in seconds since the epoch.
    pub fn utime(&self, path: &str, atime: f64, mtime: f64, callback: CallbackId) -> FilesResult<i64> {
        let op = FsOp::Utime {
            path: path.to_owned(),
            atime,
            mtime,
        };
        self.call(callback, op, None, None)
    }

    pub fn futime(&self, fd: i32, atime: f64, mtime: f64, callback: CallbackId) -> FilesResult<i64> {
        self.call(callback, FsOp::Futime { fd, atime, mtime }, None, None)
    }

    pub fn link(&self, path: &str, new_path: &str, callback: CallbackId) -> FilesResult<i32> {
        let op = FsOp::Link {
            path: path.to_owned(),
            new_path: new_path.to_owned(),
        };
        self.call(callback, op, Some(new_path), None)
    }

    pub fn symlink(
        &self,
        path: &str,
        new_path: &str,
        flags: i32,
        callback: CallbackId,
    ) -> FilesResult<i32> {
        let op = FsOp::Symlink {
            path: path.to_owned(),
            new_path: new_path.to_owned(),
            flags,
        };
        self.call(callback, op, Some(new_path), None)
    }

    pub fn readlink(&self, path: &str, callback: CallbackId) -> FilesResult<Option<String>> {
        let op = FsOp::Readlink {
            path: path.to_owned(),
        };
        self.call(callback, op, None, None)
    }

    /// Path of the file open on `fd`. Always synchronous.
    pub fn get_path(&self, fd: i32) -> FilesResult<String> {
        path::descriptor_path(&self.uv, fd)
    }
}

impl fmt::Debug for Files {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Files")
            .field("loop", &self.uv)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
