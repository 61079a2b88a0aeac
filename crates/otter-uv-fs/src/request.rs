//! Per-call state of an asynchronous operation.

use std::fmt;
use std::sync::Arc;

use otter_uv::Buf;

use crate::callbacks::{CallbackId, FileCallbacks};
use crate::error::{FilesError, FilesResult};
use crate::object::{ByteArray, GlobalRef, RangeFault};

/// Lifecycle of a [`FileRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Created,
    Submitted,
    Succeeded,
    Failed,
    Disposed,
}

/// Everything needed to complete one asynchronous operation.
///
/// The destination array, if any, is held through a [`GlobalRef`] from
/// `create` until the request is dropped. The engine only ever sees the
/// scratch buffer.
pub struct FileRequest {
    callbacks: Arc<FileCallbacks>,
    callback_id: CallbackId,
    destination: Option<GlobalRef<ByteArray>>,
    offset: usize,
    scratch: Buf,
    state: RequestState,
}

impl FileRequest {
    pub fn create(
        callbacks: Arc<FileCallbacks>,
        callback_id: CallbackId,
        destination: Option<&ByteArray>,
        scratch_size: usize,
        offset: usize,
    ) -> FilesResult<Self> {
        let scratch = if scratch_size > 0 {
            Buf::try_zeroed(scratch_size).map_err(|_| FilesError::OutOfMemory {
                requested: scratch_size,
            })?
        } else {
            Buf::default()
        };
        Ok(Self {
            callbacks,
            callback_id,
            destination: destination.map(GlobalRef::new),
            offset,
            scratch,
            state: RequestState::Created,
        })
    }

    pub fn callbacks(&self) -> &Arc<FileCallbacks> {
        &self.callbacks
    }

    pub fn callback_id(&self) -> CallbackId {
        self.callback_id
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    /// Handle to the scratch buffer, for the engine.
    pub fn scratch(&self) -> Buf {
        self.scratch.clone()
    }

    /// Copy `length` bytes of `source` starting at `offset` into the scratch
    /// buffer and return it.
    pub fn stage_in(&mut self, source: &ByteArray, length: usize, offset: usize) -> FilesResult<Buf> {
        let bytes = source.get_region(offset, length)?;
        let mut scratch = self.scratch.lock();
        let capacity = scratch.len();
        let target = scratch.get_mut(..length).ok_or(RangeFault {
            start: 0,
            len: length,
            capacity,
        })?;
        target.copy_from_slice(&bytes);
        drop(scratch);
        Ok(self.scratch.clone())
    }

    /// Copy the first `length` scratch bytes into the destination at the
    /// request offset and return the destination.
    ///
    /// # Panics
    ///
    /// Panics if the request was created without a destination.
    pub fn commit_out(&mut self, length: usize) -> Result<ByteArray, RangeFault> {
        let destination = self
            .destination
            .as_deref()
            .unwrap_or_else(|| panic!("commit_out on a request without a destination"));
        let scratch = self.scratch.lock();
        let staged = scratch.get(..length).ok_or(RangeFault {
            start: 0,
            len: length,
            capacity: scratch.len(),
        })?;
        destination.set_region(self.offset, staged)?;
        Ok(destination.clone())
    }

    pub(crate) fn mark_submitted(&mut self) {
        debug_assert_eq!(self.state, RequestState::Created, "request submitted twice");
        self.state = RequestState::Submitted;
    }

    pub(crate) fn mark_completed(&mut self, ok: bool) {
        debug_assert_eq!(self.state, RequestState::Submitted);
        self.state = if ok {
            RequestState::Succeeded
        } else {
            RequestState::Failed
        };
    }

    /// Release the destination reference and the scratch buffer.
    pub fn dispose(self) {
        drop(self);
    }
}

impl Drop for FileRequest {
    fn drop(&mut self) {
        let previous = std::mem::replace(&mut self.state, RequestState::Disposed);
        tracing::trace!(
            callback_id = self.callback_id,
            state = ?previous,
            pinned = self.destination.is_some(),
            "file request disposed"
        );
    }
}

impl fmt::Debug for FileRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileRequest")
            .field("callback_id", &self.callback_id)
            .field("state", &self.state)
            .field("destination", &self.destination)
            .field("offset", &self.offset)
            .field("scratch", &self.scratch)
            .finish()
    }
}
