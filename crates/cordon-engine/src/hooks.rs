//! Host hook contracts
//!
//! A compartment delegates everything that touches the outside world to
//! hooks supplied at construction:
//! - [`ResolveHook`] turns an import specifier and a referrer into a full
//!   specifier; pure and deterministic per compartment.
//! - [`ImportHook`] acquires the static module record for a full
//!   specifier, possibly asynchronously, possibly redirecting to a
//!   canonical specifier.
//! - [`ModuleMapHook`] maps a full specifier to a foreign compartment's
//!   exports namespace before the import hook is consulted.
//! - [`EvaluateHook`] is the opaque confined evaluator used by
//!   [`Compartment::evaluate`](crate::compartment::Compartment::evaluate).
//!
//! Hooks report failures as [`anyhow::Error`]; the engine attaches the
//! failing specifier when surfacing them. Every hook trait is implemented
//! for plain closures.

use std::sync::Arc;

use futures::future::BoxFuture;
use rustc_hash::FxHashMap;

use cordon_core::namespace::ModuleNamespace;
use cordon_core::value::Value;

use crate::record::StaticModuleRecord;

/// Future returned by an import hook
pub type ImportHookFuture = BoxFuture<'static, anyhow::Result<ImportHookResolution>>;

/// Outcome of an import hook
#[derive(Debug, Clone)]
pub enum ImportHookResolution {
    /// A record for the requested specifier
    Record(Arc<StaticModuleRecord>),
    /// A record under a canonical specifier distinct from the requested
    /// one (index or extension redirects)
    Redirect {
        /// The canonical record
        record: Arc<StaticModuleRecord>,
        /// The canonical full specifier
        specifier: String,
    },
}

/// Resolves import specifiers to full specifiers
pub trait ResolveHook: Send + Sync {
    /// Resolve `import_specifier` as written in the module identified by
    /// `referrer`
    fn resolve(&self, import_specifier: &str, referrer: &str) -> anyhow::Result<String>;
}

impl<F> ResolveHook for F
where
    F: Fn(&str, &str) -> anyhow::Result<String> + Send + Sync,
{
    fn resolve(&self, import_specifier: &str, referrer: &str) -> anyhow::Result<String> {
        self(import_specifier, referrer)
    }
}

/// Acquires static module records
pub trait ImportHook: Send + Sync {
    /// Fetch the record for a full specifier
    fn import(&self, full_specifier: &str) -> ImportHookFuture;
}

impl<F> ImportHook for F
where
    F: Fn(&str) -> ImportHookFuture + Send + Sync,
{
    fn import(&self, full_specifier: &str) -> ImportHookFuture {
        self(full_specifier)
    }
}

/// Maps full specifiers to foreign exports namespaces
pub trait ModuleMapHook: Send + Sync {
    /// Return the foreign namespace this specifier aliases, if any
    fn lookup(&self, full_specifier: &str) -> Option<Arc<ModuleNamespace>>;
}

impl<F> ModuleMapHook for F
where
    F: Fn(&str) -> Option<Arc<ModuleNamespace>> + Send + Sync,
{
    fn lookup(&self, full_specifier: &str) -> Option<Arc<ModuleNamespace>> {
        self(full_specifier)
    }
}

/// The confined evaluator
pub trait EvaluateHook: Send + Sync {
    /// Evaluate program source against a compartment scope
    fn evaluate(&self, source: &str, scope: &EvalScope) -> anyhow::Result<Value>;
}

impl<F> EvaluateHook for F
where
    F: Fn(&str, &EvalScope) -> anyhow::Result<Value> + Send + Sync,
{
    fn evaluate(&self, source: &str, scope: &EvalScope) -> anyhow::Result<Value> {
        self(source, scope)
    }
}

/// Wrap a closure as a resolve hook
pub fn resolve_fn<F>(f: F) -> Arc<dyn ResolveHook>
where
    F: Fn(&str, &str) -> anyhow::Result<String> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an import hook
pub fn import_fn<F>(f: F) -> Arc<dyn ImportHook>
where
    F: Fn(&str) -> ImportHookFuture + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a module-map hook
pub fn module_map_fn<F>(f: F) -> Arc<dyn ModuleMapHook>
where
    F: Fn(&str) -> Option<Arc<ModuleNamespace>> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as an evaluate hook
pub fn evaluate_fn<F>(f: F) -> Arc<dyn EvaluateHook>
where
    F: Fn(&str, &EvalScope) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// The scope visible to one `evaluate` call
///
/// Name lookup consults per-call endowments first, then the compartment's
/// frozen global lexicals, then the global table. Per-call endowments are
/// never visible to modules.
#[derive(Debug, Clone, Default)]
pub struct EvalScope {
    globals: FxHashMap<String, Value>,
    lexicals: FxHashMap<String, Value>,
    endowments: FxHashMap<String, Value>,
}

impl EvalScope {
    pub(crate) fn new(
        globals: FxHashMap<String, Value>,
        lexicals: FxHashMap<String, Value>,
        endowments: FxHashMap<String, Value>,
    ) -> Self {
        Self {
            globals,
            lexicals,
            endowments,
        }
    }

    /// Look up a name through the full scope chain
    pub fn lookup(&self, name: &str) -> Option<Value> {
        self.endowments
            .get(name)
            .or_else(|| self.lexicals.get(name))
            .or_else(|| self.globals.get(name))
            .cloned()
    }

    /// Read a per-call endowment
    pub fn endowment(&self, name: &str) -> Option<Value> {
        self.endowments.get(name).cloned()
    }

    /// Read a compartment global lexical
    pub fn lexical(&self, name: &str) -> Option<Value> {
        self.lexicals.get(name).cloned()
    }

    /// Read a compartment global
    pub fn global(&self, name: &str) -> Option<Value> {
        self.globals.get(name).cloned()
    }
}
