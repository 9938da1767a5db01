//! Asynchronous module discovery
//!
//! The loader walks the import graph reachable from a root full specifier
//! and records every module it finds in the compartment's record table.
//! Discovery of one specifier happens at most once per compartment: the
//! first request installs a memoized shared future whose settled result
//! (success or failure) is replayed for every later request, so the import
//! hook is never consulted twice for the same specifier and repeated loads
//! fail identically.
//!
//! A drive loop owns a set of in-flight record futures and enqueues the
//! children each one reveals: the resolved imports of a module record, or
//! the target of an alias record (in the target compartment). A visited
//! set keyed by `(compartment, specifier)` breaks dependency cycles,
//! including cycles that cross compartment boundaries. Siblings are
//! discovered in parallel; the first failure rejects the drive and leaves
//! the remaining record futures cached for later loads.

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::aliases;
use crate::compartment::{Compartment, CompartmentId, WeakCompartment};
use crate::hooks::ImportHookResolution;
use crate::record::StaticModuleRecord;

/// Errors raised during module discovery
///
/// `Clone` so the memoized record future can replay a failure for every
/// later load of the same specifier.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LoadError {
    /// The compartment has no import hook
    #[error("compartment '{0}' has no import hook")]
    NoImportHook(String),

    /// The compartment has no resolve hook
    #[error("compartment '{0}' has no resolve hook")]
    NoResolveHook(String),

    /// The resolve hook failed for an import specifier
    #[error("cannot resolve '{import_specifier}' against '{referrer}': {message}")]
    Resolve {
        /// The import specifier as written
        import_specifier: String,
        /// The full specifier of the importing module
        referrer: String,
        /// The hook's failure message
        message: String,
    },

    /// The import hook failed for a full specifier
    #[error("cannot load module '{specifier}': {message}")]
    Import {
        /// The requested full specifier
        specifier: String,
        /// The hook's failure message
        message: String,
    },

    /// A module-map entry does not denote a module in any live compartment
    #[error("module map for '{specifier}' does not denote a module in a live compartment")]
    UnknownAlias {
        /// The mapped full specifier
        specifier: String,
    },

    /// A compartment was dropped while its graph was loading
    #[error("compartment was dropped while loading '{0}'")]
    CompartmentDropped(String),
}

/// A loaded module record: the immutable output of discovery for one full
/// specifier in one compartment
#[derive(Debug)]
pub struct ModuleRecord {
    /// The canonical full specifier of the module
    pub module_specifier: String,
    /// The static record acquired from the import hook
    pub static_record: Arc<StaticModuleRecord>,
    /// Import specifier to full specifier, via the resolve hook
    pub resolved_imports: FxHashMap<String, String>,
}

/// An entry of the compartment's record table
#[derive(Clone)]
pub(crate) enum RecordEntry {
    /// A module owned by this compartment
    Module(Arc<ModuleRecord>),
    /// A delegation to a module of another compartment
    Alias {
        compartment: WeakCompartment,
        specifier: String,
    },
}

type Children = Vec<(WeakCompartment, String)>;

/// Memoized per-specifier discovery future
pub(crate) type SharedRecordFuture = Shared<BoxFuture<'static, Result<Children, LoadError>>>;

/// Load the transitive graph reachable from `root_specifier`
pub(crate) async fn load(compartment: &Compartment, root_specifier: &str) -> Result<(), LoadError> {
    let mut seen: FxHashSet<(CompartmentId, String)> = FxHashSet::default();
    let mut jobs: FuturesUnordered<BoxFuture<'static, Result<Children, LoadError>>> =
        FuturesUnordered::new();

    seen.insert((compartment.id(), root_specifier.to_string()));
    jobs.push(record_job(compartment.clone(), root_specifier.to_string()));

    while let Some(children) = jobs.next().await {
        for (weak, specifier) in children? {
            let Some(target) = weak.upgrade() else {
                return Err(LoadError::CompartmentDropped(specifier));
            };
            if seen.insert((target.id(), specifier.clone())) {
                jobs.push(record_job(target, specifier));
            }
        }
    }
    Ok(())
}

fn record_job(
    compartment: Compartment,
    specifier: String,
) -> BoxFuture<'static, Result<Children, LoadError>> {
    let shared = memoized_record(&compartment, &specifier);
    async move {
        // keep the target compartment alive while its record resolves
        let _compartment = compartment;
        shared.await
    }
    .boxed()
}

/// The discovery future for one specifier, created on first request
fn memoized_record(compartment: &Compartment, full_specifier: &str) -> SharedRecordFuture {
    let mut pending = compartment.inner.pending_loads.lock();
    if let Some(shared) = pending.get(full_specifier) {
        return shared.clone();
    }
    log::debug!(
        "discovering '{}' in {}",
        full_specifier,
        compartment.name()
    );
    let shared = discover(compartment.downgrade(), full_specifier.to_string())
        .boxed()
        .shared();
    pending.insert(full_specifier.to_string(), shared.clone());
    shared
}

async fn discover(weak: WeakCompartment, full_specifier: String) -> Result<Children, LoadError> {
    let compartment = weak
        .upgrade()
        .ok_or_else(|| LoadError::CompartmentDropped(full_specifier.clone()))?;

    if let Some(entry) = compartment.inner.records.lock().get(&full_specifier) {
        return Ok(children_of(&weak, entry));
    }

    // The static module map takes precedence over the module-map hook;
    // both take precedence over the import hook.
    let mapped = compartment
        .inner
        .module_map
        .get(&full_specifier)
        .cloned()
        .or_else(|| {
            compartment
                .inner
                .module_map_hook
                .as_ref()
                .and_then(|hook| hook.lookup(&full_specifier))
        });
    if let Some(namespace) = mapped {
        let (target, target_specifier) =
            aliases::alias_of(&namespace).ok_or_else(|| LoadError::UnknownAlias {
                specifier: full_specifier.clone(),
            })?;
        let entry = RecordEntry::Alias {
            compartment: target.downgrade(),
            specifier: target_specifier.clone(),
        };
        compartment
            .inner
            .records
            .lock()
            .insert(full_specifier.clone(), entry);
        log::debug!(
            "aliased '{}' in {} to '{}' in {}",
            full_specifier,
            compartment.name(),
            target_specifier,
            target.name()
        );
        return Ok(vec![(target.downgrade(), target_specifier)]);
    }

    let import_hook = compartment
        .inner
        .import_hook
        .clone()
        .ok_or_else(|| LoadError::NoImportHook(compartment.name().to_string()))?;
    let resolve_hook = compartment
        .inner
        .resolve_hook
        .clone()
        .ok_or_else(|| LoadError::NoResolveHook(compartment.name().to_string()))?;

    let pending_import = import_hook.import(&full_specifier);
    // do not pin the compartment while the host hook is in flight
    drop(compartment);
    let resolution = pending_import.await.map_err(|error| LoadError::Import {
        specifier: full_specifier.clone(),
        message: format!("{error:#}"),
    })?;
    let compartment = weak
        .upgrade()
        .ok_or_else(|| LoadError::CompartmentDropped(full_specifier.clone()))?;

    let (static_record, canonical) = match resolution {
        ImportHookResolution::Record(record) => (record, full_specifier.clone()),
        ImportHookResolution::Redirect { record, specifier } => (record, specifier),
    };

    let mut resolved_imports = FxHashMap::default();
    let mut children: Children = Vec::new();
    // `export *` sources are dependencies too
    let declared = static_record
        .imports()
        .iter()
        .chain(static_record.reexports());
    for import_specifier in declared {
        if resolved_imports.contains_key(import_specifier) {
            continue;
        }
        let resolved = resolve_hook
            .resolve(import_specifier, &canonical)
            .map_err(|error| LoadError::Resolve {
                import_specifier: import_specifier.clone(),
                referrer: canonical.clone(),
                message: format!("{error:#}"),
            })?;
        children.push((weak.clone(), resolved.clone()));
        resolved_imports.insert(import_specifier.clone(), resolved);
    }

    let record = Arc::new(ModuleRecord {
        module_specifier: canonical.clone(),
        static_record,
        resolved_imports,
    });

    // A record may already exist under the canonical specifier when an
    // earlier direct load raced this redirect; the first record wins and
    // the requested specifier shares it.
    let entry = {
        let mut records = compartment.inner.records.lock();
        let entry = records
            .entry(canonical.clone())
            .or_insert_with(|| RecordEntry::Module(record))
            .clone();
        if canonical != full_specifier {
            records.insert(full_specifier.clone(), entry.clone());
        }
        entry
    };
    log::debug!("loaded record for '{}' in {}", canonical, compartment.name());
    Ok(children_of(&weak, &entry))
}

fn children_of(weak: &WeakCompartment, entry: &RecordEntry) -> Children {
    match entry {
        RecordEntry::Module(record) => record
            .resolved_imports
            .values()
            .map(|specifier| (weak.clone(), specifier.clone()))
            .collect(),
        RecordEntry::Alias {
            compartment,
            specifier,
        } => vec![(compartment.clone(), specifier.clone())],
    }
}
