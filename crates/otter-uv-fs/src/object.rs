//! Managed-side object model seen by callback targets.
//!
//! [`Value`] is what a completion is converted into before it crosses the
//! boundary. [`ByteArray`] is a managed buffer that callers own; the bridge
//! never hands it to the engine directly. [`GlobalRef`] keeps a managed
//! object alive (and pinned) while a native operation is outstanding.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use thiserror::Error;

use crate::error::FsError;
use crate::stats::Stats;

/// Number of [`GlobalRef`]s currently alive in the process.
static LIVE_GLOBAL_REFS: AtomicUsize = AtomicUsize::new(0);

/// Global references acquired and not yet released, process wide.
pub fn live_global_refs() -> usize {
    LIVE_GLOBAL_REFS.load(Ordering::Acquire)
}

/// Out-of-bounds region access on a [`ByteArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("region [{start}, {start}+{len}) out of bounds for array of length {capacity}")]
pub struct RangeFault {
    pub start: usize,
    pub len: usize,
    pub capacity: usize,
}

struct ArrayInner {
    bytes: Mutex<Vec<u8>>,
    pins: AtomicUsize,
}

/// Managed byte array. Clones share storage.
#[derive(Clone)]
pub struct ByteArray(Arc<ArrayInner>);

impl ByteArray {
    /// Zero-filled array of `len` bytes.
    pub fn new(len: usize) -> Self {
        Self::from_vec(vec![0; len])
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Arc::new(ArrayInner {
            bytes: Mutex::new(bytes),
            pins: AtomicUsize::new(0),
        }))
    }

    pub fn len(&self) -> usize {
        self.0.bytes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fails unless `[start, start + len)` lies inside the array.
    pub fn check_region(&self, start: usize, len: usize) -> Result<(), RangeFault> {
        let capacity = self.len();
        match start.checked_add(len) {
            Some(end) if end <= capacity => Ok(()),
            _ => Err(RangeFault {
                start,
                len,
                capacity,
            }),
        }
    }

    /// Copy `len` bytes starting at `start` out of the array.
    pub fn get_region(&self, start: usize, len: usize) -> Result<Vec<u8>, RangeFault> {
        self.check_region(start, len)?;
        Ok(self.0.bytes.lock()[start..start + len].to_vec())
    }

    /// Overwrite the bytes starting at `start` with `src`.
    pub fn set_region(&self, start: usize, src: &[u8]) -> Result<(), RangeFault> {
        self.check_region(start, src.len())?;
        self.0.bytes.lock()[start..start + src.len()].copy_from_slice(src);
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.bytes.lock().clone()
    }

    /// Number of global references currently pinning this array.
    pub fn pin_count(&self) -> usize {
        self.0.pins.load(Ordering::Acquire)
    }

    /// Whether both handles refer to the same storage.
    pub fn ptr_eq(&self, other: &ByteArray) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ByteArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ByteArray")
            .field("len", &self.len())
            .field("pins", &self.pin_count())
            .finish()
    }
}

/// Objects that can be held by a [`GlobalRef`].
pub trait Managed: Clone + Send + Sync + 'static {
    /// Called once when a global reference is acquired.
    fn pin(&self) {}

    /// Called once when that reference is released.
    fn unpin(&self) {}
}

impl Managed for ByteArray {
    fn pin(&self) {
        self.0.pins.fetch_add(1, Ordering::AcqRel);
    }

    fn unpin(&self) {
        self.0.pins.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Strong, lifetime-extending reference to a managed object.
///
/// Acquired by [`GlobalRef::new`] and released exactly once, when dropped.
/// Not `Clone`: every acquisition has a single owner.
pub struct GlobalRef<T: Managed> {
    value: T,
}

impl<T: Managed> GlobalRef<T> {
    pub fn new(value: &T) -> Self {
        value.pin();
        LIVE_GLOBAL_REFS.fetch_add(1, Ordering::AcqRel);
        Self {
            value: value.clone(),
        }
    }
}

impl<T: Managed> Deref for GlobalRef<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.value
    }
}

impl<T: Managed> Drop for GlobalRef<T> {
    fn drop(&mut self) {
        self.value.unpin();
        LIVE_GLOBAL_REFS.fetch_sub(1, Ordering::AcqRel);
    }
}

impl<T: Managed + fmt::Debug> fmt::Debug for GlobalRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("GlobalRef").field(&self.value).finish()
    }
}

/// Boundary-safe value handed to a callback target.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    String(String),
    Stats(Stats),
    Bytes(ByteArray),
    Error(FsError),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_int(&self) -> Option<i32> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Value::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_stats(&self) -> Option<&Stats> {
        match self {
            Value::Stats(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&ByteArray> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&FsError> {
        match self {
            Value::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Option<Stats>> for Value {
    fn from(stats: Option<Stats>) -> Self {
        stats.map(Value::Stats).unwrap_or(Value::Null)
    }
}
