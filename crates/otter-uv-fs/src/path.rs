//! Descriptor to path resolution, one implementation per platform family.

use otter_uv::Loop;

use crate::error::FilesResult;

#[cfg(target_vendor = "apple")]
pub(crate) fn descriptor_path(_uv: &Loop, fd: i32) -> FilesResult<String> {
    use otter_uv::ErrorCode;

    use crate::error::FsError;

    let mut buf = vec![0_u8; libc::PATH_MAX as usize];
    // SAFETY: F_GETPATH writes at most PATH_MAX bytes, NUL terminated.
    let ret = unsafe { libc::fcntl(fd, libc::F_GETPATH, buf.as_mut_ptr()) };
    if ret < 0 {
        return Err(FsError::new(ErrorCode::last_os_error(), "fcntl", None).into());
    }
    let end = buf.iter().position(|b| *b == 0).unwrap_or(buf.len());
    Ok(String::from_utf8_lossy(&buf[..end]).into_owned())
}

#[cfg(windows)]
pub(crate) fn descriptor_path(_uv: &Loop, fd: i32) -> FilesResult<String> {
    use otter_uv::ErrorCode;
    use windows_sys::Win32::Foundation::HANDLE;
    use windows_sys::Win32::Storage::FileSystem::GetFinalPathNameByHandleW;

    use crate::error::FsError;

    // SAFETY: get_osfhandle only inspects the CRT descriptor table.
    let handle = unsafe { libc::get_osfhandle(fd) };
    if handle == -1 {
        return Err(FsError::new(ErrorCode::EBADF, "get_osfhandle", None).into());
    }
    let mut wide = vec![0_u16; 32 * 1024];
    // SAFETY: `wide` outlives the call and its length is passed alongside.
    let len = unsafe {
        GetFinalPathNameByHandleW(handle as HANDLE, wide.as_mut_ptr(), wide.len() as u32, 0)
    };
    if len == 0 {
        let code = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        let errno = errno_from_win32(code as u32);
        return Err(FsError::new(errno, "GetFinalPathNameByHandleW", None).into());
    }
    if len as usize > wide.len() {
        return Err(FsError::new(ErrorCode::EIO, "GetFinalPathNameByHandleW", None).into());
    }
    let path = String::from_utf16_lossy(&wide[..len as usize]);
    Ok(path.strip_prefix(r"\\?\").map(str::to_owned).unwrap_or(path))
}

/// Translate a `GetLastError` value; anything unlisted becomes `EIO`.
#[cfg(any(windows, test))]
fn errno_from_win32(code: u32) -> otter_uv::ErrorCode {
    use otter_uv::ErrorCode;

    const ERROR_FILE_NOT_FOUND: u32 = 2;
    const ERROR_PATH_NOT_FOUND: u32 = 3;
    const ERROR_INVALID_HANDLE: u32 = 6;
    const ERROR_INVALID_PARAMETER: u32 = 87;
    const ERROR_NOACCESS: u32 = 998;

    match code {
        ERROR_FILE_NOT_FOUND | ERROR_PATH_NOT_FOUND => ErrorCode::ENOENT,
        ERROR_INVALID_HANDLE => ErrorCode::EBADF,
        ERROR_INVALID_PARAMETER => ErrorCode::EINVAL,
        ERROR_NOACCESS => ErrorCode::EFAULT,
        _ => ErrorCode::EIO,
    }
}

/// Reads the `/proc/self/fd` link through the engine.
#[cfg(all(unix, not(target_vendor = "apple")))]
pub(crate) fn descriptor_path(uv: &Loop, fd: i32) -> FilesResult<String> {
    use otter_uv::FsOp;

    use crate::codec::{self, Decoded};

    let mut req = uv.fs_sync(FsOp::Readlink {
        path: format!("/proc/self/fd/{fd}"),
    });
    let decoded = codec::decode(&req, None);
    req.cleanup();
    match decoded {
        Decoded::Str(path) => Ok(path),
        Decoded::Failed(err) => Err(err.into()),
        other => panic!("unexpected {other:?} for readlink completion"),
    }
}

#[cfg(not(any(unix, windows)))]
pub(crate) fn descriptor_path(_uv: &Loop, _fd: i32) -> FilesResult<String> {
    use otter_uv::ErrorCode;

    use crate::error::FsError;

    Err(FsError::new(ErrorCode::ENOSYS, "get_path", None).into())
}
