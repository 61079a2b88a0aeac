//! otter-uv - callback-driven filesystem engine.
//!
//! Every operation exists in two forms:
//!
//! - [`Loop::fs_sync`] runs the syscall on the calling thread and returns the
//!   completion record.
//! - [`Loop::fs_submit`] queues the syscall on a worker pool and later hands
//!   the completion record to a hook, on the thread that drives
//!   [`Loop::run`].
//!
//! Completion records ([`FsReq`]) keep the native shape: an integer result
//! that is `-1` on failure, an errno, and an engine-owned payload for stat
//! structures, directory name lists and link targets.
//!
//! # Example
//!
//! ```no_run
//! use otter_uv::{FsOp, FsReq, Loop, LoopConfig, RunMode};
//!
//! let lp = Loop::new(LoopConfig::default()).unwrap();
//! let status = lp.fs_submit(
//!     FsOp::Mkdir { path: "/tmp/otter-uv-demo".into(), mode: 0o755 },
//!     Box::new(|req: FsReq| println!("mkdir finished: {}", req.result)),
//! );
//! assert_eq!(status, 0);
//! lp.run(RunMode::Default);
//! ```

pub mod config;
pub mod error;
pub mod event_loop;
pub mod fs;
mod sys;

pub use config::LoopConfig;
pub use error::{ErrorCode, UvError, UvResult};
pub use event_loop::{FsCb, Loop, RunMode};
pub use fs::{Buf, FsOp, FsPtr, FsReq, FsType, NativeStat};

/// Open flags and permission bits accepted by [`FsOp::Open`].
#[cfg(unix)]
pub mod flags {
    pub const O_RDONLY: i32 = libc::O_RDONLY;
    pub const O_WRONLY: i32 = libc::O_WRONLY;
    pub const O_RDWR: i32 = libc::O_RDWR;
    pub const O_CREAT: i32 = libc::O_CREAT;
    pub const O_TRUNC: i32 = libc::O_TRUNC;
    pub const O_APPEND: i32 = libc::O_APPEND;
    pub const O_EXCL: i32 = libc::O_EXCL;
}
