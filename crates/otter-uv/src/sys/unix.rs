//! POSIX syscall layer.

use std::ffi::CString;
use std::io;
use std::mem::MaybeUninit;
use std::os::unix::ffi::OsStrExt;

use crate::error::ErrorCode;
use crate::fs::{Buf, FsOp, FsPtr, NativeStat};

/// Bounce buffer size for the `sendfile` emulation.
const SENDFILE_CHUNK: usize = 64 * 1024;

type SysResult = Result<(i64, FsPtr), ErrorCode>;

pub(super) fn run(op: FsOp) -> SysResult {
    match op {
        FsOp::Open { path, flags, mode } => {
            let path = cstring(&path)?;
            let fd = retry(|| unsafe {
                libc::open(path.as_ptr(), flags | libc::O_CLOEXEC, mode as libc::c_uint) as isize
            })?;
            Ok((fd, FsPtr::None))
        }
        FsOp::Close { fd } => status(unsafe { libc::close(fd) }),
        FsOp::Read {
            fd,
            buf,
            len,
            position,
        } => Ok((read(fd, &buf, len, position)?, FsPtr::None)),
        FsOp::Write {
            fd,
            buf,
            len,
            position,
        } => Ok((write(fd, &buf, len, position)?, FsPtr::None)),
        FsOp::Unlink { path } => {
            let path = cstring(&path)?;
            status(unsafe { libc::unlink(path.as_ptr()) })
        }
        FsOp::Mkdir { path, mode } => {
            let path = cstring(&path)?;
            status(unsafe { libc::mkdir(path.as_ptr(), mode as libc::mode_t) })
        }
        FsOp::Rmdir { path } => {
            let path = cstring(&path)?;
            status(unsafe { libc::rmdir(path.as_ptr()) })
        }
        FsOp::Readdir { path, .. } => readdir(&path),
        FsOp::Stat { path } => {
            let path = cstring(&path)?;
            stat_with(|st| unsafe { libc::stat(path.as_ptr(), st) })
        }
        FsOp::Lstat { path } => {
            let path = cstring(&path)?;
            stat_with(|st| unsafe { libc::lstat(path.as_ptr(), st) })
        }
        FsOp::Fstat { fd } => stat_with(|st| unsafe { libc::fstat(fd, st) }),
        FsOp::Rename { path, new_path } => {
            let (from, to) = (cstring(&path)?, cstring(&new_path)?);
            status(unsafe { libc::rename(from.as_ptr(), to.as_ptr()) })
        }
        FsOp::Fsync { fd } => status(unsafe { libc::fsync(fd) }),
        FsOp::Fdatasync { fd } => status(fdatasync(fd)),
        FsOp::Ftruncate { fd, offset } => {
            status(unsafe { libc::ftruncate(fd, offset as libc::off_t) })
        }
        FsOp::Sendfile {
            out_fd,
            in_fd,
            offset,
            length,
        } => Ok((sendfile(out_fd, in_fd, offset, length)?, FsPtr::None)),
        FsOp::Chmod { path, mode } => {
            let path = cstring(&path)?;
            status(unsafe { libc::chmod(path.as_ptr(), mode as libc::mode_t) })
        }
        FsOp::Fchmod { fd, mode } => status(unsafe { libc::fchmod(fd, mode as libc::mode_t) }),
        FsOp::Chown { path, uid, gid } => {
            let path = cstring(&path)?;
            status(unsafe { libc::chown(path.as_ptr(), uid as libc::uid_t, gid as libc::gid_t) })
        }
        FsOp::Fchown { fd, uid, gid } => {
            status(unsafe { libc::fchown(fd, uid as libc::uid_t, gid as libc::gid_t) })
        }
        FsOp::Utime { path, atime, mtime } => {
            let path = cstring(&path)?;
            let times = [timespec(atime), timespec(mtime)];
            status(unsafe { libc::utimensat(libc::AT_FDCWD, path.as_ptr(), times.as_ptr(), 0) })
        }
        FsOp::Futime { fd, atime, mtime } => {
            let times = [timespec(atime), timespec(mtime)];
            status(unsafe { libc::futimens(fd, times.as_ptr()) })
        }
        FsOp::Link { path, new_path } => {
            let (from, to) = (cstring(&path)?, cstring(&new_path)?);
            status(unsafe { libc::link(from.as_ptr(), to.as_ptr()) })
        }
        FsOp::Symlink { path, new_path, .. } => {
            let (target, link) = (cstring(&path)?, cstring(&new_path)?);
            status(unsafe { libc::symlink(target.as_ptr(), link.as_ptr()) })
        }
        FsOp::Readlink { path } => {
            let target = std::fs::read_link(&path).map_err(|e| ErrorCode::from_io(&e))?;
            let mut bytes = target.as_os_str().as_bytes().to_vec();
            bytes.push(0);
            Ok((0, FsPtr::Link(bytes)))
        }
    }
}

fn cstring(path: &str) -> Result<CString, ErrorCode> {
    CString::new(path).map_err(|_| ErrorCode::EINVAL)
}

fn status(ret: libc::c_int) -> SysResult {
    if ret < 0 {
        Err(ErrorCode::last_os_error())
    } else {
        Ok((ret as i64, FsPtr::None))
    }
}

/// Run a syscall returning a count, retrying on `EINTR`.
fn retry(mut call: impl FnMut() -> isize) -> Result<i64, ErrorCode> {
    loop {
        let ret = call();
        if ret >= 0 {
            return Ok(ret as i64);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(ErrorCode::from_io(&err));
        }
    }
}

fn read(fd: i32, buf: &Buf, len: usize, position: i64) -> Result<i64, ErrorCode> {
    let mut bytes = buf.lock();
    let target = &mut bytes[..len];
    retry(|| unsafe {
        if position < 0 {
            libc::read(fd, target.as_mut_ptr().cast(), len)
        } else {
            libc::pread(fd, target.as_mut_ptr().cast(), len, position as libc::off_t)
        }
    })
}

fn write(fd: i32, buf: &Buf, len: usize, position: i64) -> Result<i64, ErrorCode> {
    let bytes = buf.lock();
    let source = &bytes[..len];
    retry(|| unsafe {
        if position < 0 {
            libc::write(fd, source.as_ptr().cast(), len)
        } else {
            libc::pwrite(fd, source.as_ptr().cast(), len, position as libc::off_t)
        }
    })
}

fn readdir(path: &str) -> SysResult {
    let entries = std::fs::read_dir(path).map_err(|e| ErrorCode::from_io(&e))?;
    let mut names = Vec::new();
    let mut count = 0_i64;
    for entry in entries {
        let entry = entry.map_err(|e| ErrorCode::from_io(&e))?;
        names.extend_from_slice(entry.file_name().as_bytes());
        names.push(0);
        count += 1;
    }
    Ok((count, FsPtr::Names(names)))
}

fn stat_with(call: impl FnOnce(*mut libc::stat) -> libc::c_int) -> SysResult {
    let mut st = MaybeUninit::<libc::stat>::uninit();
    if call(st.as_mut_ptr()) < 0 {
        return Err(ErrorCode::last_os_error());
    }
    // SAFETY: the call returned success, so the structure is initialized.
    let st = unsafe { st.assume_init() };
    Ok((0, FsPtr::Stat(native_stat(&st))))
}

#[allow(clippy::unnecessary_cast)]
fn native_stat(st: &libc::stat) -> NativeStat {
    NativeStat {
        dev: st.st_dev as u64,
        ino: st.st_ino as u64,
        mode: st.st_mode as u32,
        nlink: st.st_nlink as u64,
        uid: st.st_uid as u32,
        gid: st.st_gid as u32,
        rdev: st.st_rdev as u64,
        size: st.st_size as i64,
        blksize: Some(st.st_blksize as u64),
        blocks: Some(st.st_blocks as u64),
        atime: st.st_atime as i64,
        mtime: st.st_mtime as i64,
        ctime: st.st_ctime as i64,
    }
}

#[cfg(target_vendor = "apple")]
fn fdatasync(fd: i32) -> libc::c_int {
    unsafe { libc::fsync(fd) }
}

#[cfg(not(target_vendor = "apple"))]
fn fdatasync(fd: i32) -> libc::c_int {
    unsafe { libc::fdatasync(fd) }
}

/// Copy `length` bytes from `in_fd` (at `offset`, or the current offset when
/// negative) to `out_fd` through a bounce buffer. Stops early at end of file.
fn sendfile(out_fd: i32, in_fd: i32, offset: i64, length: usize) -> Result<i64, ErrorCode> {
    let mut bounce = vec![0_u8; length.clamp(1, SENDFILE_CHUNK)];
    let mut total = 0_usize;
    while total < length {
        let want = (length - total).min(bounce.len());
        let position = offset + total as i64;
        let got = retry(|| unsafe {
            if offset < 0 {
                libc::read(in_fd, bounce.as_mut_ptr().cast(), want)
            } else {
                libc::pread(in_fd, bounce.as_mut_ptr().cast(), want, position as libc::off_t)
            }
        })? as usize;
        if got == 0 {
            break;
        }
        let mut written = 0_usize;
        while written < got {
            let chunk = &bounce[written..got];
            written += retry(|| unsafe {
                libc::write(out_fd, chunk.as_ptr().cast(), chunk.len())
            })? as usize;
        }
        total += got;
    }
    Ok(total as i64)
}

fn timespec(seconds: f64) -> libc::timespec {
    let whole = seconds.floor();
    // SAFETY: timespec is plain data; zeroing covers platform padding fields.
    let mut ts: libc::timespec = unsafe { std::mem::zeroed() };
    ts.tv_sec = whole as libc::time_t;
    ts.tv_nsec = ((seconds - whole) * 1e9) as _;
    ts
}
