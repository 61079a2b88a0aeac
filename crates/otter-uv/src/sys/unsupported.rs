//! Fallback for targets without a POSIX syscall layer.

use crate::error::ErrorCode;
use crate::fs::{FsOp, FsPtr};

pub(super) fn run(_op: FsOp) -> Result<(i64, FsPtr), ErrorCode> {
    Err(ErrorCode::ENOSYS)
}
