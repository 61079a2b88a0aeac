//! Event loop: submission, worker execution and completion delivery.
//!
//! Filesystem syscalls run on a tokio blocking pool. Their completions are
//! queued and only delivered, i.e. their hooks invoked, by whichever thread
//! calls [`Loop::run`]. That thread is the loop thread; everything a hook
//! touches is therefore touched from one thread only.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use crossbeam_channel::{Receiver, Sender};
use tokio::runtime::{Handle, Runtime};

use crate::config::LoopConfig;
use crate::error::{ErrorCode, UvError, UvResult};
use crate::fs::{FsOp, FsReq};
use crate::sys;

/// Completion hook. Invoked at most once, on the loop thread.
pub type FsCb = Box<dyn FnOnce(FsReq) + Send + 'static>;

struct Completion {
    req: FsReq,
    cb: FsCb,
}

/// How long [`Loop::run`] keeps delivering completions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Until no submitted request is outstanding
    Default,
    /// Block for one completion (if any is outstanding), then drain what is ready
    Once,
    /// Deliver only completions that are already queued
    NoWait,
}

/// Decrements the outstanding count when dropped, including unwind paths.
struct PendingGuard<'a>(&'a AtomicUsize);

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Callback-driven filesystem engine.
pub struct Loop {
    /// Taken on drop and shut down without blocking
    runtime: Option<Runtime>,
    handle: Handle,
    completions_tx: Sender<Completion>,
    completions_rx: Receiver<Completion>,
    /// Submitted requests whose hook has not yet run
    pending: AtomicUsize,
    /// Total accepted submissions, for diagnostics
    submitted: AtomicU64,
    config: LoopConfig,
}

impl Loop {
    /// Create a loop with its own worker pool.
    pub fn new(config: LoopConfig) -> UvResult<Arc<Self>> {
        config.validate()?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(config.threadpool_size)
            .thread_name(config.thread_name.clone())
            .build()
            .map_err(UvError::Runtime)?;
        let handle = runtime.handle().clone();
        let (completions_tx, completions_rx) = crossbeam_channel::unbounded();

        tracing::debug!(
            threadpool_size = config.threadpool_size,
            thread_name = %config.thread_name,
            "otter-uv loop created"
        );

        Ok(Arc::new(Self {
            runtime: Some(runtime),
            handle,
            completions_tx,
            completions_rx,
            pending: AtomicUsize::new(0),
            submitted: AtomicU64::new(0),
            config,
        }))
    }

    pub fn config(&self) -> &LoopConfig {
        &self.config
    }

    /// Requests submitted but not yet delivered.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Total submissions accepted since creation.
    pub fn submitted(&self) -> u64 {
        self.submitted.load(Ordering::Relaxed)
    }

    /// Blocking form: run `op` on the calling thread and return its completion.
    pub fn fs_sync(&self, op: FsOp) -> FsReq {
        let fs_type = op.fs_type();
        let req = sys::execute(op);
        tracing::trace!(%fs_type, result = req.result, "fs op completed synchronously");
        req
    }

    /// Queued form: returns `0` once `op` is accepted, or `-errno` when it is
    /// rejected before any work starts. A rejected hook is dropped without
    /// being invoked; an accepted one is invoked exactly once by [`Loop::run`].
    pub fn fs_submit(&self, op: FsOp, cb: FsCb) -> i32 {
        let fs_type = op.fs_type();
        if let Err(code) = op.validate() {
            tracing::warn!(%fs_type, code = code.name(), "fs submission rejected");
            return -code.raw();
        }

        // Count before spawning so `run` never observes a transient zero.
        self.pending.fetch_add(1, Ordering::AcqRel);
        self.submitted.fetch_add(1, Ordering::Relaxed);

        let tx = self.completions_tx.clone();
        self.handle.spawn_blocking(move || {
            let fallback = FsReq::for_op(&op);
            let req = catch_unwind(AssertUnwindSafe(|| sys::execute(op)))
                .unwrap_or_else(|_| fallback.fail(ErrorCode::EIO));
            // The receiver lives in the loop; if the loop is gone so is the hook.
            let _ = tx.send(Completion { req, cb });
        });

        tracing::trace!(%fs_type, "fs op submitted");
        0
    }

    /// Deliver completions on the calling thread according to `mode`.
    ///
    /// Returns `true` while requests remain outstanding.
    pub fn run(&self, mode: RunMode) -> bool {
        let _span = tracing::debug_span!("uv_run", ?mode).entered();
        match mode {
            RunMode::Default => {
                while self.pending() > 0 {
                    match self.completions_rx.recv() {
                        Ok(completion) => self.deliver(completion),
                        Err(_) => break,
                    }
                }
            }
            RunMode::Once => {
                if self.pending() > 0
                    && let Ok(completion) = self.completions_rx.recv()
                {
                    self.deliver(completion);
                }
                self.drain_ready();
            }
            RunMode::NoWait => self.drain_ready(),
        }
        self.pending() > 0
    }

    fn drain_ready(&self) {
        while let Ok(completion) = self.completions_rx.try_recv() {
            self.deliver(completion);
        }
    }

    fn deliver(&self, completion: Completion) {
        let _guard = PendingGuard(&self.pending);
        let Completion { req, cb } = completion;
        tracing::trace!(fs_type = %req.fs_type, result = req.result, "fs completion delivered");
        cb(req);
    }
}

impl Drop for Loop {
    fn drop(&mut self) {
        // Must not block: the last reference may go away inside an async
        // context. Undelivered hooks are dropped unrun.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
        tracing::debug!(pending = self.pending(), "otter-uv loop dropped");
    }
}

impl fmt::Debug for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Loop")
            .field("pending", &self.pending())
            .field("submitted", &self.submitted())
            .field("config", &self.config)
            .finish()
    }
}
