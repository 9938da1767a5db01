//! Compartments
//!
//! A compartment owns an isolated global table, a module-record map, an
//! instance map, a deferred-exports table, and the host hooks that feed
//! them. Module identity is per compartment: the same static record
//! instantiated in two compartments yields two distinct instances, unless
//! one compartment explicitly aliases the other through its module map.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use thiserror::Error;

use cordon_core::ident::ensure_identifier;
use cordon_core::ident::IdentError;
use cordon_core::namespace::ModuleNamespace;
use cordon_core::value::Value;

use crate::aliases;
use crate::deferred::DeferredExports;
use crate::hooks::{EvalScope, EvaluateHook, ImportHook, ModuleMapHook, ResolveHook};
use crate::instance::{ExecuteError, ModuleInstance};
use crate::linker::{self, LinkError};
use crate::loader::{self, LoadError, RecordEntry, SharedRecordFuture};

static NEXT_COMPARTMENT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique compartment identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CompartmentId(u64);

/// Errors raised at the compartment's public surface
#[derive(Debug, Error)]
pub enum CompartmentError {
    /// A module specifier argument was empty
    #[error("module specifier must be a non-empty string")]
    EmptySpecifier,

    /// A module-map value is not a namespace known to the alias registry
    #[error("module map entry '{specifier}' is not a known module exports namespace")]
    UnrecognizedModuleMapEntry {
        /// The offending module-map key
        specifier: String,
    },

    /// A global-lexical name is not a valid identifier
    #[error(transparent)]
    Lexical(#[from] IdentError),

    /// Module operations require resolve and import hooks
    #[error("compartment '{0}' has no resolve or import hook")]
    MissingModuleHooks(String),

    /// `evaluate` requires an evaluate hook
    #[error("compartment '{0}' has no evaluator")]
    NoEvaluator(String),

    /// The evaluate hook failed
    #[error("evaluation failed: {0}")]
    Eval(#[source] anyhow::Error),

    /// Module discovery failed
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Module linkage failed
    #[error(transparent)]
    Link(#[from] LinkError),

    /// Module execution failed
    #[error(transparent)]
    Execute(#[from] ExecuteError),
}

/// Construction options for [`Compartment::new`]
#[derive(Default)]
pub struct CompartmentOptions {
    /// Compartment name, used in diagnostics
    pub name: Option<String>,
    /// Resolves import specifiers against referrer full specifiers
    pub resolve_hook: Option<Arc<dyn ResolveHook>>,
    /// Acquires static module records
    pub import_hook: Option<Arc<dyn ImportHook>>,
    /// Maps full specifiers to foreign namespaces ahead of the import hook
    pub module_map_hook: Option<Arc<dyn ModuleMapHook>>,
    /// The confined evaluator backing [`Compartment::evaluate`]
    pub evaluate_hook: Option<Arc<dyn EvaluateHook>>,
    /// Constants visible in the scope of every program and module
    pub global_lexicals: FxHashMap<String, Value>,
}

pub(crate) struct CompartmentInner {
    pub(crate) id: CompartmentId,
    pub(crate) name: String,
    pub(crate) globals: RwLock<FxHashMap<String, Value>>,
    pub(crate) global_lexicals: FxHashMap<String, Value>,
    pub(crate) module_map: FxHashMap<String, Arc<ModuleNamespace>>,
    pub(crate) resolve_hook: Option<Arc<dyn ResolveHook>>,
    pub(crate) import_hook: Option<Arc<dyn ImportHook>>,
    pub(crate) module_map_hook: Option<Arc<dyn ModuleMapHook>>,
    pub(crate) evaluate_hook: Option<Arc<dyn EvaluateHook>>,
    pub(crate) records: Mutex<FxHashMap<String, RecordEntry>>,
    pub(crate) pending_loads: Mutex<FxHashMap<String, SharedRecordFuture>>,
    pub(crate) instances: Mutex<FxHashMap<String, Arc<ModuleInstance>>>,
    pub(crate) deferred: DeferredExports,
}

/// An isolated execution compartment
///
/// Cheap to clone; clones share the same compartment. Dropping every
/// strong handle drops the compartment's module graph.
#[derive(Clone)]
pub struct Compartment {
    pub(crate) inner: Arc<CompartmentInner>,
}

impl Compartment {
    /// Create a compartment
    ///
    /// `endowments` are copied onto the global table. Every `module_map`
    /// value must be an exports namespace recognized by the process-wide
    /// alias registry; every `global_lexicals` name must be a valid
    /// identifier. A shallow copy of the lexicals is frozen at
    /// construction.
    pub fn new(
        endowments: impl IntoIterator<Item = (String, Value)>,
        module_map: impl IntoIterator<Item = (String, Arc<ModuleNamespace>)>,
        options: CompartmentOptions,
    ) -> Result<Self, CompartmentError> {
        let id = CompartmentId(NEXT_COMPARTMENT_ID.fetch_add(1, Ordering::Relaxed));
        let name = options
            .name
            .unwrap_or_else(|| format!("compartment:{}", id.0));

        for lexical_name in options.global_lexicals.keys() {
            ensure_identifier(lexical_name)?;
        }

        let mut map = FxHashMap::default();
        for (specifier, namespace) in module_map {
            if aliases::alias_of(&namespace).is_none() {
                return Err(CompartmentError::UnrecognizedModuleMapEntry { specifier });
            }
            map.insert(specifier, namespace);
        }

        log::debug!("creating compartment '{}'", name);

        Ok(Self {
            inner: Arc::new(CompartmentInner {
                id,
                name,
                globals: RwLock::new(endowments.into_iter().collect()),
                global_lexicals: options.global_lexicals,
                module_map: map,
                resolve_hook: options.resolve_hook,
                import_hook: options.import_hook,
                module_map_hook: options.module_map_hook,
                evaluate_hook: options.evaluate_hook,
                records: Mutex::new(FxHashMap::default()),
                pending_loads: Mutex::new(FxHashMap::default()),
                instances: Mutex::new(FxHashMap::default()),
                deferred: DeferredExports::new(),
            }),
        })
    }

    /// Compartment name
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub(crate) fn id(&self) -> CompartmentId {
        self.inner.id
    }

    /// Read a global (endowments live here)
    pub fn global(&self, name: &str) -> Option<Value> {
        self.inner.globals.read().get(name).cloned()
    }

    /// Define or replace a global
    pub fn define_global(&self, name: impl Into<String>, value: Value) {
        self.inner.globals.write().insert(name.into(), value);
    }

    /// Read a frozen global lexical
    pub fn global_lexical(&self, name: &str) -> Option<Value> {
        self.inner.global_lexicals.get(name).cloned()
    }

    /// The exports namespace for a specifier, without loading
    ///
    /// Module-mapped specifiers yield the mapped foreign namespace itself,
    /// preserving identity across compartments; anything else yields this
    /// compartment's deferred handle for the specifier.
    pub fn module(&self, specifier: &str) -> Result<Arc<ModuleNamespace>, CompartmentError> {
        self.require_module_hooks()?;
        require_specifier(specifier)?;
        if let Some(namespace) = self.inner.module_map.get(specifier) {
            return Ok(Arc::clone(namespace));
        }
        if let Some(hook) = &self.inner.module_map_hook {
            if let Some(namespace) = hook.lookup(specifier) {
                return Ok(namespace);
            }
        }
        Ok(self.inner.deferred.get_or_create(self, specifier))
    }

    /// Load the transitive module graph reachable from a specifier
    pub async fn load(&self, specifier: &str) -> Result<(), CompartmentError> {
        require_specifier(specifier)?;
        loader::load(self, specifier).await?;
        Ok(())
    }

    /// Load, link, execute, and return the exports namespace
    pub async fn import(&self, specifier: &str) -> Result<Arc<ModuleNamespace>, CompartmentError> {
        self.load(specifier).await?;
        self.import_now(specifier)
    }

    /// Link and execute an already-loaded specifier synchronously
    pub fn import_now(&self, specifier: &str) -> Result<Arc<ModuleNamespace>, CompartmentError> {
        require_specifier(specifier)?;
        let instance = linker::link(self, specifier)?;
        instance.execute()?;
        Ok(instance.namespace())
    }

    /// Evaluate program source in the compartment's scope
    pub fn evaluate(&self, source: &str) -> Result<Value, CompartmentError> {
        self.evaluate_with(source, FxHashMap::default())
    }

    /// Evaluate with per-call endowments
    ///
    /// Per-call endowments shadow the compartment scope for this program
    /// only; they are never visible to modules.
    pub fn evaluate_with(
        &self,
        source: &str,
        endowments: FxHashMap<String, Value>,
    ) -> Result<Value, CompartmentError> {
        let hook = self
            .inner
            .evaluate_hook
            .clone()
            .ok_or_else(|| CompartmentError::NoEvaluator(self.inner.name.clone()))?;
        let scope = EvalScope::new(
            self.inner.globals.read().clone(),
            self.inner.global_lexicals.clone(),
            endowments,
        );
        hook.evaluate(source, &scope).map_err(CompartmentError::Eval)
    }

    /// A weak handle that does not keep the compartment alive
    pub fn downgrade(&self) -> WeakCompartment {
        WeakCompartment {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn require_module_hooks(&self) -> Result<(), CompartmentError> {
        if self.inner.resolve_hook.is_none() || self.inner.import_hook.is_none() {
            return Err(CompartmentError::MissingModuleHooks(
                self.inner.name.clone(),
            ));
        }
        Ok(())
    }
}

impl PartialEq for Compartment {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Compartment {}

impl fmt::Debug for Compartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compartment({})", self.inner.name)
    }
}

/// Weak compartment handle
///
/// Record tables and the alias registry hold compartments weakly so that
/// mutually aliased compartments can still be reclaimed once the host
/// drops them.
#[derive(Clone)]
pub struct WeakCompartment {
    inner: Weak<CompartmentInner>,
}

impl WeakCompartment {
    /// Upgrade to a strong handle, if the compartment is still alive
    pub fn upgrade(&self) -> Option<Compartment> {
        self.inner.upgrade().map(|inner| Compartment { inner })
    }
}

impl fmt::Debug for WeakCompartment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(compartment) => write!(f, "WeakCompartment({})", compartment.name()),
            None => write!(f, "WeakCompartment(<dropped>)"),
        }
    }
}

fn require_specifier(specifier: &str) -> Result<(), CompartmentError> {
    if specifier.is_empty() {
        return Err(CompartmentError::EmptySpecifier);
    }
    Ok(())
}
