//! Callback dispatch to the managed side.
//!
//! A [`FileCallbacks`] instance belongs to one [`Files`](crate::Files)
//! facade and holds the single receiver its completions go to. The receiver
//! exposes two entry points, one taking a single value and one taking an
//! argument array; every completed request reaches exactly one of them.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::{Arc, OnceLock};

use otter_uv::FsType;
use parking_lot::Mutex;

use crate::codec::Reply;
use crate::error::FsError;
use crate::object::Value;

/// Caller-chosen token identifying a registered callback. `0` means the
/// call is synchronous.
pub type CallbackId = i32;

/// Which receiver entry point a successful completion of a kind uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyShape {
    Single,
    Multi,
}

/// Registry entry for one operation kind.
#[derive(Debug, Clone, Copy)]
pub struct EntryPoint {
    pub kind: FsType,
    pub syscall: &'static str,
    /// `None` for kinds no completion may carry.
    pub success: Option<ReplyShape>,
}

static ENTRY_POINTS: OnceLock<[EntryPoint; FsType::ALL.len()]> = OnceLock::new();

fn build_entry_points() -> [EntryPoint; FsType::ALL.len()] {
    FsType::ALL.map(|kind| EntryPoint {
        kind,
        syscall: kind.syscall(),
        success: match kind {
            FsType::Unknown | FsType::Custom => None,
            FsType::Read | FsType::Readdir => Some(ReplyShape::Multi),
            _ => Some(ReplyShape::Single),
        },
    })
}

/// Registry lookup.
///
/// # Panics
///
/// Panics if [`FileCallbacks::static_initialize`] has not run.
pub fn entry_point(kind: FsType) -> &'static EntryPoint {
    let table = ENTRY_POINTS
        .get()
        .unwrap_or_else(|| panic!("file callback entry points used before static_initialize"));
    &table[kind.index()]
}

/// Managed-side receiver of completions.
pub trait FileCallbackTarget: Send + Sync {
    /// Single-value entry point.
    fn call(&self, kind: FsType, callback_id: CallbackId, value: Value);

    /// Array-valued entry point.
    fn call_multi(&self, kind: FsType, callback_id: CallbackId, values: Vec<Value>);
}

/// Per-facade dispatcher bound to one [`FileCallbackTarget`].
#[derive(Default)]
pub struct FileCallbacks {
    target: OnceLock<Arc<dyn FileCallbackTarget>>,
}

impl FileCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the process-wide entry-point registry. Idempotent.
    pub fn static_initialize() {
        let mut built = false;
        ENTRY_POINTS.get_or_init(|| {
            built = true;
            build_entry_points()
        });
        if built {
            tracing::debug!(kinds = FsType::ALL.len(), "file callback entry points registered");
        }
    }

    /// Bind the receiver.
    ///
    /// # Panics
    ///
    /// Panics when called a second time.
    pub fn initialize(&self, target: Arc<dyn FileCallbackTarget>) {
        if self.target.set(target).is_err() {
            panic!("file callbacks initialized twice");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.target.get().is_some()
    }

    fn target(&self) -> &Arc<dyn FileCallbackTarget> {
        self.target
            .get()
            .unwrap_or_else(|| panic!("file callbacks used before initialize"))
    }

    /// Fails fast when the receiver is missing.
    pub(crate) fn ensure_initialized(&self) {
        self.target();
    }

    pub fn invoke(&self, kind: FsType, callback_id: CallbackId, value: Value) {
        debug_assert_eq!(entry_point(kind).success, Some(ReplyShape::Single));
        self.target().call(kind, callback_id, value);
    }

    pub fn invoke_multi(&self, kind: FsType, callback_id: CallbackId, values: Vec<Value>) {
        // Any real kind may carry an error pair.
        debug_assert!(
            entry_point(kind).success.is_some(),
            "no completion shape for {kind}"
        );
        self.target().call_multi(kind, callback_id, values);
    }

    /// Route a decoded reply to the matching entry point.
    pub(crate) fn deliver(&self, kind: FsType, callback_id: CallbackId, reply: Reply) {
        tracing::trace!(%kind, callback_id, "fs callback");
        match reply {
            Reply::Single(value) => self.invoke(kind, callback_id, value),
            Reply::Multi(values) => self.invoke_multi(kind, callback_id, values),
        }
    }
}

impl fmt::Debug for FileCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileCallbacks")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// What a callback received.
#[derive(Debug, Clone)]
pub enum Completion {
    Single(Value),
    Multi(Vec<Value>),
}

impl Completion {
    /// The error of an error-shaped completion (`[Int(-1), Error(..)]`).
    pub fn error(&self) -> Option<&FsError> {
        match self {
            Completion::Multi(values) if values.first().and_then(Value::as_int) == Some(-1) => {
                values.get(1).and_then(Value::as_error)
            }
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        self.error().is_some()
    }
}

type Handler = Box<dyn FnOnce(FsType, Completion) + Send>;

/// Receiver that hands out callback ids and routes each completion to a
/// one-shot handler registered under that id.
pub struct CallbackTable {
    next_id: AtomicI32,
    handlers: Mutex<HashMap<CallbackId, Handler>>,
}

impl Default for CallbackTable {
    fn default() -> Self {
        Self {
            next_id: AtomicI32::new(1),
            handlers: Mutex::new(HashMap::new()),
        }
    }
}

impl CallbackTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a handler and return its (non-zero) id.
    pub fn register(
        &self,
        handler: impl FnOnce(FsType, Completion) + Send + 'static,
    ) -> CallbackId {
        let id = loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id > 0 {
                break id;
            }
            // Wrapped around.
            self.next_id.store(1, Ordering::Relaxed);
        };
        self.handlers.lock().insert(id, Box::new(handler));
        id
    }

    /// Handlers registered and not yet called.
    pub fn len(&self) -> usize {
        self.handlers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn dispatch(&self, kind: FsType, callback_id: CallbackId, completion: Completion) {
        let handler = self.handlers.lock().remove(&callback_id);
        match handler {
            Some(handler) => handler(kind, completion),
            None => tracing::warn!(%kind, callback_id, "completion for unknown callback id"),
        }
    }
}

impl FileCallbackTarget for CallbackTable {
    fn call(&self, kind: FsType, callback_id: CallbackId, value: Value) {
        self.dispatch(kind, callback_id, Completion::Single(value));
    }

    fn call_multi(&self, kind: FsType, callback_id: CallbackId, values: Vec<Value>) {
        self.dispatch(kind, callback_id, Completion::Multi(values));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_shapes() {
        FileCallbacks::static_initialize();
        assert_eq!(entry_point(FsType::Open).success, Some(ReplyShape::Single));
        assert_eq!(entry_point(FsType::Read).success, Some(ReplyShape::Multi));
        assert_eq!(entry_point(FsType::Readdir).success, Some(ReplyShape::Multi));
        assert_eq!(entry_point(FsType::Custom).success, None);
        assert_eq!(entry_point(FsType::Fchown).syscall, "fchown");
        for kind in FsType::ALL {
            assert_eq!(entry_point(kind).kind, kind);
        }
    }

    #[test]
    fn table_routes_once_per_id() {
        FileCallbacks::static_initialize();
        let table = CallbackTable::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = table.register(move |kind, completion| sink.lock().push((kind, completion)));
        assert!(id > 0);

        let callbacks = FileCallbacks::new();
        callbacks.initialize(table.clone());
        callbacks.invoke(FsType::Open, id, Value::Int(7));
        callbacks.invoke(FsType::Open, id, Value::Int(8));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(seen[0], (FsType::Open, Completion::Single(Value::Int(7)))));
        assert!(table.is_empty());
    }

    #[test]
    #[should_panic(expected = "before initialize")]
    fn invoke_without_target_panics() {
        FileCallbacks::static_initialize();
        FileCallbacks::new().invoke(FsType::Close, 1, Value::Null);
    }

    #[test]
    #[should_panic(expected = "initialized twice")]
    fn double_initialize_panics() {
        let callbacks = FileCallbacks::new();
        callbacks.initialize(CallbackTable::new());
        callbacks.initialize(CallbackTable::new());
    }

    #[test]
    fn error_pair_accepted_for_single_shaped_kind() {
        FileCallbacks::static_initialize();
        let table = CallbackTable::new();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let id = table.register(move |_, completion| *sink.lock() = Some(completion));

        let callbacks = FileCallbacks::new();
        callbacks.initialize(table);
        let err = FsError::new(otter_uv::ErrorCode::ENOENT, "stat", Some("x".into()));
        callbacks.invoke_multi(FsType::Stat, id, vec![Value::Int(-1), Value::Error(err)]);
        assert!(seen.lock().as_ref().is_some_and(Completion::is_error));
    }

    #[cfg(debug_assertions)]
    #[test]
    #[should_panic(expected = "no completion shape for custom")]
    fn invoke_multi_rejects_kind_without_entry_point() {
        FileCallbacks::static_initialize();
        let callbacks = FileCallbacks::new();
        callbacks.initialize(CallbackTable::new());
        callbacks.invoke_multi(FsType::Custom, 1, vec![Value::Null]);
    }

    #[test]
    fn error_completion_is_recognized() {
        let err = FsError::new(otter_uv::ErrorCode::EIO, "read", None);
        let completion = Completion::Multi(vec![Value::Int(-1), Value::Error(err.clone())]);
        assert_eq!(completion.error(), Some(&err));
        assert!(!Completion::Multi(vec![Value::Long(3)]).is_error());
    }
}
