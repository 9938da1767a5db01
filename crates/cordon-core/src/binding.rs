//! Live-binding cells
//!
//! Every exported name of a module instance is backed by a binding cell.
//! A cell starts in the temporal dead zone (TDZ): reads and assignments
//! raise a reference error until the defining module initializes the
//! binding. Observers subscribe through a [`Notifier`]; a subscription made
//! before initialization is queued and fires on the initializing write, a
//! subscription made after fires immediately with the current value.
//! Observers are always invoked in registration order.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::value::Value;

/// Observer callback invoked with each new value of a binding
pub type Updater = Arc<dyn Fn(&Value) + Send + Sync>;

/// Errors raised by binding access
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// Read or assignment while the binding is still in the TDZ
    #[error("cannot access '{0}' before initialization")]
    Tdz(String),

    /// Second initialization of a fixed binding
    #[error("binding '{0}' is already initialized")]
    AlreadyInitialized(String),

    /// Reassignment of a fixed binding
    #[error("assignment to constant binding '{0}'")]
    Immutable(String),
}

struct CellState {
    value: Option<Value>,
    observers: Vec<Updater>,
}

/// A single live or fixed binding
///
/// Fixed bindings are initialized exactly once; live bindings may be
/// updated repeatedly and every write fans out to observers.
pub struct BindingCell {
    name: String,
    mutable: bool,
    state: Mutex<CellState>,
}

impl BindingCell {
    /// Create a fixed (const-like) binding in the TDZ
    pub fn fixed(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            mutable: false,
            state: Mutex::new(CellState {
                value: None,
                observers: Vec::new(),
            }),
        })
    }

    /// Create a live (let-like) binding in the TDZ
    pub fn live(name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            mutable: true,
            state: Mutex::new(CellState {
                value: None,
                observers: Vec::new(),
            }),
        })
    }

    /// Local name of the binding, for diagnostics
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the binding may be reassigned
    pub fn is_live(&self) -> bool {
        self.mutable
    }

    /// Whether the binding has left the TDZ
    pub fn is_initialized(&self) -> bool {
        self.state.lock().value.is_some()
    }

    /// Read the current value
    pub fn get(&self) -> Result<Value, BindingError> {
        self.state
            .lock()
            .value
            .clone()
            .ok_or_else(|| BindingError::Tdz(self.name.clone()))
    }

    /// One-shot initialization, leaving the TDZ
    ///
    /// Queued observers fire with the value, in registration order.
    pub fn init(&self, value: Value) -> Result<(), BindingError> {
        let observers = {
            let mut state = self.state.lock();
            if state.value.is_some() {
                return Err(BindingError::AlreadyInitialized(self.name.clone()));
            }
            state.value = Some(value.clone());
            state.observers.clone()
        };
        for observer in observers {
            observer(&value);
        }
        Ok(())
    }

    /// Declaring write of a live binding
    ///
    /// Leaves the TDZ if still inside it. Every write fans out to
    /// observers.
    pub fn update(&self, value: Value) -> Result<(), BindingError> {
        if !self.mutable {
            return Err(BindingError::Immutable(self.name.clone()));
        }
        let observers = {
            let mut state = self.state.lock();
            state.value = Some(value.clone());
            state.observers.clone()
        };
        for observer in observers {
            observer(&value);
        }
        Ok(())
    }

    /// Source-level assignment to a live binding
    ///
    /// Unlike [`update`](Self::update) this honors the TDZ: assignment
    /// before the declaring write raises a reference error.
    pub fn set(&self, value: Value) -> Result<(), BindingError> {
        if !self.mutable {
            return Err(BindingError::Immutable(self.name.clone()));
        }
        if !self.is_initialized() {
            return Err(BindingError::Tdz(self.name.clone()));
        }
        self.update(value)
    }

    /// Subscribe an observer
    ///
    /// Fires immediately with the current value when the binding is
    /// already initialized; otherwise the observer is queued until the
    /// initializing write.
    pub fn subscribe(&self, updater: Updater) {
        let current = {
            let mut state = self.state.lock();
            state.observers.push(updater.clone());
            state.value.clone()
        };
        if let Some(value) = current {
            updater(&value);
        }
    }

    /// A shareable subscription handle for this binding
    pub fn notifier(self: &Arc<Self>) -> Notifier {
        Notifier {
            cell: Arc::clone(self),
        }
    }
}

impl fmt::Debug for BindingCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingCell")
            .field("name", &self.name)
            .field("live", &self.mutable)
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

/// Subscription handle to one exported binding
///
/// Importers hold notifiers rather than owning references to the exporting
/// instance; the notifier is the only capability an import edge carries.
#[derive(Clone)]
pub struct Notifier {
    cell: Arc<BindingCell>,
}

impl Notifier {
    /// Subscribe an updater to the underlying binding
    pub fn notify(&self, updater: Updater) {
        self.cell.subscribe(updater);
    }

    /// The underlying binding cell
    pub fn cell(&self) -> &Arc<BindingCell> {
        &self.cell
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Notifier({})", self.cell.name())
    }
}

/// A module-local lexical slot for an imported name
///
/// The functor of a module declares one slot per imported name; the slot's
/// [`updater`](Self::updater) is subscribed to the exporting module's
/// notifier during linkage, and the functor body reads the slot. Reads
/// before the first update observe the TDZ.
#[derive(Clone)]
pub struct LexicalSlot {
    name: Arc<str>,
    value: Arc<RwLock<Option<Value>>>,
}

impl LexicalSlot {
    /// Create an empty slot
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            value: Arc::new(RwLock::new(None)),
        }
    }

    /// The updater that fills this slot
    pub fn updater(&self) -> Updater {
        let value = Arc::clone(&self.value);
        Arc::new(move |next: &Value| {
            *value.write() = Some(next.clone());
        })
    }

    /// Read the slot, raising a reference error while empty
    pub fn get(&self) -> Result<Value, BindingError> {
        self.value
            .read()
            .clone()
            .ok_or_else(|| BindingError::Tdz(self.name.to_string()))
    }

    /// Read the slot without a TDZ check
    pub fn peek(&self) -> Option<Value> {
        self.value.read().clone()
    }
}

impl fmt::Debug for LexicalSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LexicalSlot({})", self.name)
    }
}
