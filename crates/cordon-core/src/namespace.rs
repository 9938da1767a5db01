//! Module exports namespaces
//!
//! A namespace handle is created *before* its module is loaded or executed
//! so that cycles and cross-compartment references can be wired early. The
//! handle is a two-state sum: `Pending` until the owning instance
//! activates it, then `Active` over a sealed, sorted table of binding
//! cells. After activation the handle behaves like a namespace exotic
//! object: null prototype, sorted own string keys, non-writable entries,
//! truthful and idempotent `prevent_extensions`, and undefined reads for
//! unknown keys.
//!
//! Handle identity (the `Arc` pointer, mirrored by [`NamespaceId`]) is the
//! module identity other compartments alias against.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::binding::{BindingCell, BindingError};
use crate::value::Value;

static NEXT_NAMESPACE_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a namespace handle
///
/// Used as the key of the process-wide alias registry, standing in for
/// weak object-keyed identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NamespaceId(u64);

/// Errors raised by namespace access
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamespaceError {
    /// Read before the owning module initialized its exports
    #[error("cannot read module exports namespace before the module initializes")]
    Pending,

    /// Attempted mutation of the sealed namespace
    #[error("cannot modify module exports namespace")]
    Frozen,

    /// Read of an export still in the TDZ
    #[error(transparent)]
    Binding(#[from] BindingError),
}

enum NamespaceState {
    Pending,
    Active(BTreeMap<String, Arc<BindingCell>>),
}

/// A deferred module exports namespace
pub struct ModuleNamespace {
    id: NamespaceId,
    state: RwLock<NamespaceState>,
}

impl ModuleNamespace {
    /// Create a pending namespace handle
    pub fn pending() -> Arc<Self> {
        Arc::new(Self {
            id: NamespaceId(NEXT_NAMESPACE_ID.fetch_add(1, Ordering::Relaxed)),
            state: RwLock::new(NamespaceState::Pending),
        })
    }

    /// Process-unique identity of this handle
    pub fn id(&self) -> NamespaceId {
        self.id
    }

    /// Whether the namespace has been activated
    pub fn is_active(&self) -> bool {
        matches!(*self.state.read(), NamespaceState::Active(_))
    }

    /// Seal the namespace over its final export table
    ///
    /// Idempotent: activation after the first is ignored.
    pub fn activate(&self, entries: BTreeMap<String, Arc<BindingCell>>) {
        let mut state = self.state.write();
        if matches!(*state, NamespaceState::Pending) {
            *state = NamespaceState::Active(entries);
        }
    }

    /// Read an export
    ///
    /// `Ok(None)` for a name the module does not export; an error before
    /// activation or while the export is in the TDZ.
    pub fn get(&self, name: &str) -> Result<Option<Value>, NamespaceError> {
        match &*self.state.read() {
            NamespaceState::Pending => Err(NamespaceError::Pending),
            NamespaceState::Active(entries) => match entries.get(name) {
                Some(cell) => Ok(Some(cell.get()?)),
                None => Ok(None),
            },
        }
    }

    /// Own export names, sorted
    pub fn keys(&self) -> Result<Vec<String>, NamespaceError> {
        match &*self.state.read() {
            NamespaceState::Pending => Err(NamespaceError::Pending),
            NamespaceState::Active(entries) => Ok(entries.keys().cloned().collect()),
        }
    }

    /// Whether the namespace exports a name (false while pending)
    pub fn has(&self, name: &str) -> bool {
        match &*self.state.read() {
            NamespaceState::Pending => false,
            NamespaceState::Active(entries) => entries.contains_key(name),
        }
    }

    /// Attempted property write; always fails
    pub fn set(&self, _name: &str, _value: Value) -> Result<(), NamespaceError> {
        Err(NamespaceError::Frozen)
    }

    /// Refuse further extensions
    ///
    /// The namespace is born non-extensible, so this always succeeds and
    /// repeated calls are no-ops.
    pub fn prevent_extensions(&self) -> bool {
        true
    }
}

impl fmt::Debug for ModuleNamespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.state.read() {
            NamespaceState::Pending => write!(f, "ModuleNamespace(pending)"),
            NamespaceState::Active(entries) => f
                .debug_struct("ModuleNamespace")
                .field("keys", &entries.keys().collect::<Vec<_>>())
                .finish(),
        }
    }
}
