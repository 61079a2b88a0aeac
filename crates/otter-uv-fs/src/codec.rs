//! Completion decoding.
//!
//! One branch per operation kind turns a native completion record into the
//! value(s) a callback receives. Failed records decode to
//! [`Decoded::Failed`] regardless of kind.

use otter_uv::{ErrorCode, FsPtr, FsReq, FsType};

use crate::error::FsError;
use crate::object::{ByteArray, Value};
use crate::request::FileRequest;
use crate::stats::Stats;

/// Decoded completion.
#[derive(Debug, Clone)]
pub enum Decoded {
    Empty,
    Integer(i32),
    Long(i64),
    Stat(Option<Stats>),
    Str(String),
    Names(Vec<String>),
    Read { bytes_read: i64, buffer: ByteArray },
    Failed(FsError),
}

/// How a decoded completion is handed to the receiver.
#[derive(Debug, Clone)]
pub enum Reply {
    Single(Value),
    Multi(Vec<Value>),
}

impl Decoded {
    pub fn into_reply(self) -> Reply {
        match self {
            Decoded::Empty => Reply::Single(Value::Null),
            Decoded::Integer(v) => Reply::Single(Value::Int(v)),
            Decoded::Long(v) => Reply::Single(Value::Long(v)),
            Decoded::Stat(stats) => Reply::Single(Value::from(stats)),
            Decoded::Str(s) => Reply::Single(Value::String(s)),
            Decoded::Names(names) => Reply::Multi(names.into_iter().map(Value::String).collect()),
            Decoded::Read { bytes_read, buffer } => {
                Reply::Multi(vec![Value::Long(bytes_read), Value::Bytes(buffer)])
            }
            Decoded::Failed(err) => Reply::Multi(vec![Value::Int(-1), Value::Error(err)]),
        }
    }
}

/// Decode `req`. `request` is the asynchronous request state, absent on the
/// synchronous path; a read without it decodes to its byte count.
///
/// # Panics
///
/// Panics on a kind no filesystem completion can carry.
pub fn decode(req: &FsReq, request: Option<&mut FileRequest>) -> Decoded {
    if req.is_err() {
        return Decoded::Failed(FsError::from_req(req));
    }
    match req.fs_type {
        FsType::Close
        | FsType::Rename
        | FsType::Unlink
        | FsType::Rmdir
        | FsType::Mkdir
        | FsType::Ftruncate
        | FsType::Fsync
        | FsType::Fdatasync
        | FsType::Link
        | FsType::Symlink
        | FsType::Chmod
        | FsType::Fchmod
        | FsType::Chown
        | FsType::Fchown => Decoded::Empty,
        FsType::Open => Decoded::Integer(req.result as i32),
        FsType::Utime | FsType::Futime | FsType::Write | FsType::Sendfile => {
            Decoded::Long(req.result)
        }
        FsType::Read => match request {
            Some(request) => read_result(req, request),
            None => Decoded::Long(req.result),
        },
        FsType::Stat | FsType::Lstat | FsType::Fstat => Decoded::Stat(match req.ptr() {
            FsPtr::Stat(st) => Stats::from_native(Some(st)),
            _ => None,
        }),
        FsType::Readlink => match req.ptr() {
            FsPtr::Link(bytes) => Decoded::Str(c_string(bytes)),
            _ => Decoded::Str(String::new()),
        },
        FsType::Readdir => match req.ptr() {
            FsPtr::Names(bytes) => Decoded::Names(name_list(bytes, req.result as usize)),
            _ => Decoded::Names(Vec::new()),
        },
        FsType::Unknown | FsType::Custom => {
            panic!("unhandled fs response type: {}", req.fs_type.code())
        }
    }
}

fn read_result(req: &FsReq, request: &mut FileRequest) -> Decoded {
    match request.commit_out(req.result as usize) {
        Ok(buffer) => Decoded::Read {
            bytes_read: req.result,
            buffer,
        },
        Err(fault) => {
            tracing::warn!(%fault, "read completion does not fit its destination");
            Decoded::Failed(FsError::new(
                ErrorCode::EFAULT,
                req.fs_type.syscall(),
                req.path.clone(),
            ))
        }
    }
}

/// Bytes up to the first NUL, or all of them.
fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Exactly `count` NUL-terminated names from the front of `bytes`; nothing
/// past the `count`-th terminator is read.
fn name_list(bytes: &[u8], count: usize) -> Vec<String> {
    let mut names = Vec::with_capacity(count);
    let mut rest = bytes;
    for _ in 0..count {
        let end = rest.iter().position(|b| *b == 0).unwrap_or(rest.len());
        names.push(String::from_utf8_lossy(&rest[..end]).into_owned());
        rest = rest.get(end + 1..).unwrap_or_default();
    }
    names
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use otter_uv::NativeStat;

    use super::*;
    use crate::callbacks::FileCallbacks;

    fn ok(kind: FsType, result: i64) -> FsReq {
        FsReq::new(kind, Some("p".into())).succeed(result)
    }

    #[test]
    fn status_kinds_decode_empty() {
        for kind in [FsType::Close, FsType::Mkdir, FsType::Symlink, FsType::Fchown] {
            assert!(matches!(decode(&ok(kind, 0), None), Decoded::Empty));
        }
    }

    #[test]
    fn open_is_integer_and_write_is_long() {
        assert!(matches!(decode(&ok(FsType::Open, 3), None), Decoded::Integer(3)));
        assert!(matches!(decode(&ok(FsType::Write, 5), None), Decoded::Long(5)));
        assert!(matches!(decode(&ok(FsType::Sendfile, 9), None), Decoded::Long(9)));
    }

    #[test]
    fn name_list_stops_at_count() {
        let req = ok(FsType::Readdir, 2).with_ptr(FsPtr::Names(b"a\0b\0stale\0".to_vec()));
        let Decoded::Names(names) = decode(&req, None) else {
            panic!("expected names");
        };
        assert_eq!(names, ["a", "b"]);
    }

    #[test]
    fn empty_directory_yields_no_names() {
        let req = ok(FsType::Readdir, 0).with_ptr(FsPtr::Names(Vec::new()));
        assert!(matches!(decode(&req, None), Decoded::Names(names) if names.is_empty()));
    }

    #[test]
    fn readlink_stops_at_terminator() {
        let req = ok(FsType::Readlink, 0).with_ptr(FsPtr::Link(b"target\0junk".to_vec()));
        assert!(matches!(decode(&req, None), Decoded::Str(s) if s == "target"));
    }

    #[test]
    fn stat_goes_through_codec() {
        let native = NativeStat {
            mtime: 2,
            ..NativeStat::default()
        };
        let req = ok(FsType::Fstat, 0).with_ptr(FsPtr::Stat(native));
        let Decoded::Stat(Some(stats)) = decode(&req, None) else {
            panic!("expected stats");
        };
        assert_eq!(stats.mtime, 2000);
    }

    #[test]
    fn failure_has_error_shape() {
        let req = FsReq::new(FsType::Stat, Some("missing".into())).fail(ErrorCode::ENOENT);
        let Reply::Multi(values) = decode(&req, None).into_reply() else {
            panic!("expected multi reply");
        };
        assert_eq!(values.len(), 2);
        assert_eq!(values[0].as_int(), Some(-1));
        let err = values[1].as_error().unwrap();
        assert_eq!(err.errno, ErrorCode::ENOENT);
        assert_eq!(err.path.as_deref(), Some("missing"));
    }

    #[test]
    fn async_read_commits_into_destination() {
        let dest = ByteArray::new(4);
        let mut request =
            FileRequest::create(Arc::new(FileCallbacks::new()), 1, Some(&dest), 3, 1).unwrap();
        request.scratch().lock().copy_from_slice(b"xyz");
        let decoded = decode(&ok(FsType::Read, 2), Some(&mut request));
        let Reply::Multi(values) = decoded.into_reply() else {
            panic!("expected multi reply");
        };
        assert_eq!(values[0].as_long(), Some(2));
        assert!(values[1].as_bytes().unwrap().ptr_eq(&dest));
        assert_eq!(dest.to_vec(), b"\0xy\0");
    }

    #[test]
    #[should_panic(expected = "unhandled fs response type")]
    fn custom_kind_aborts() {
        decode(&ok(FsType::Custom, 0), None);
    }
}
