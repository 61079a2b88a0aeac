//! otter-uv-fs - filesystem bridge from otter-uv to managed callbacks.
//!
//! [`Files`] exposes the primitive filesystem operations in two modes. A
//! synchronous call (callback id `0`) runs on the calling thread and returns
//! the converted value or an [`FsError`]. An asynchronous call queues the
//! operation on the [`Loop`](otter_uv::Loop) and returns immediately; when
//! the loop delivers the completion, the result is decoded and handed to the
//! [`FileCallbackTarget`] bound to the facade, exactly once.
//!
//! Managed buffers ([`ByteArray`]) never reach the engine. Reads and writes
//! go through a per-request scratch buffer, and a read's destination stays
//! pinned by a [`GlobalRef`] until the request is disposed.
//!
//! ```no_run
//! use otter_uv::{Loop, LoopConfig, RunMode};
//! use otter_uv_fs::{CallbackTable, Files};
//!
//! let lp = Loop::new(LoopConfig::default()).unwrap();
//! let files = Files::new(lp.clone());
//! let table = CallbackTable::new();
//! files.initialize(table.clone());
//!
//! let id = table.register(|_, completion| println!("{completion:?}"));
//! files.stat("Cargo.toml", id).unwrap();
//! lp.run(RunMode::Default);
//! ```

pub mod callbacks;
pub mod codec;
pub mod error;
pub mod files;
pub mod object;
mod path;
pub mod request;
pub mod stats;

pub use callbacks::{
    CallbackId, CallbackTable, Completion, EntryPoint, FileCallbackTarget, FileCallbacks,
    ReplyShape, entry_point,
};
pub use codec::{Decoded, Reply, decode};
pub use error::{FilesError, FilesResult, FsError};
pub use files::Files;
pub use object::{ByteArray, GlobalRef, Managed, RangeFault, Value, live_global_refs};
pub use request::{FileRequest, RequestState};
pub use stats::Stats;
