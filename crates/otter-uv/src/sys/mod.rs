//! Platform syscall layer.
//!
//! `execute` is the single entry point used by both the blocking and the
//! queued paths of the loop.

#[cfg(unix)]
mod unix;
#[cfg(unix)]
use unix as imp;

#[cfg(not(unix))]
mod unsupported;
#[cfg(not(unix))]
use unsupported as imp;

use crate::fs::{FsOp, FsReq};

/// Run `op` to completion on the current thread.
pub(crate) fn execute(op: FsOp) -> FsReq {
    let req = FsReq::for_op(&op);
    if let Err(code) = op.validate() {
        return req.fail(code);
    }
    match imp::run(op) {
        Ok((result, ptr)) => req.succeed(result).with_ptr(ptr),
        Err(code) => req.fail(code),
    }
}
