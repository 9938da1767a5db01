//! Shared fixtures for the integration suites
//!
//! Provides an identity resolver, a counting in-memory record store
//! backing an import hook, and a small builder for parsed static module
//! records.

#![allow(dead_code)]

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::FutureExt;

use cordon_engine::{
    functor_fn, import_fn, resolve_fn, ImportHook, ImportHookFuture, ImportHookResolution,
    LiveExportSpec, ModuleEnvironment, ModuleFunctor, ParsedModuleRecord, ResolveHook,
    StaticModuleRecord,
};

/// A resolver that treats every import specifier as already full
pub fn identity_resolver() -> Arc<dyn ResolveHook> {
    resolve_fn(|specifier, _referrer| Ok(specifier.to_string()))
}

enum StoreEntry {
    Record(Arc<StaticModuleRecord>),
    Redirect { canonical: String },
}

/// An in-memory module store that counts import-hook consultations
pub struct RecordStore {
    entries: Mutex<HashMap<String, StoreEntry>>,
    calls: Mutex<HashMap<String, usize>>,
    yielding: AtomicBool,
}

impl RecordStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            entries: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            yielding: AtomicBool::new(false),
        })
    }

    /// Register a record under a full specifier
    pub fn insert(&self, specifier: &str, record: Arc<StaticModuleRecord>) {
        self.entries
            .lock()
            .unwrap()
            .insert(specifier.to_string(), StoreEntry::Record(record));
    }

    /// Make `requested` redirect to the record stored under `canonical`
    pub fn redirect(&self, requested: &str, canonical: &str) {
        self.entries.lock().unwrap().insert(
            requested.to_string(),
            StoreEntry::Redirect {
                canonical: canonical.to_string(),
            },
        );
    }

    /// Make every import-hook future suspend once before resolving
    pub fn set_yielding(&self, yielding: bool) {
        self.yielding.store(yielding, Ordering::SeqCst);
    }

    /// How many times the import hook was asked for a specifier
    pub fn calls(&self, specifier: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .get(specifier)
            .copied()
            .unwrap_or(0)
    }

    /// Total import-hook consultations
    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().values().sum()
    }

    fn lookup(&self, specifier: &str) -> anyhow::Result<ImportHookResolution> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(specifier.to_string())
            .or_insert(0) += 1;
        let entries = self.entries.lock().unwrap();
        match entries.get(specifier) {
            Some(StoreEntry::Record(record)) => {
                Ok(ImportHookResolution::Record(Arc::clone(record)))
            }
            Some(StoreEntry::Redirect { canonical }) => match entries.get(canonical) {
                Some(StoreEntry::Record(record)) => Ok(ImportHookResolution::Redirect {
                    record: Arc::clone(record),
                    specifier: canonical.clone(),
                }),
                _ => Err(anyhow::anyhow!("no module '{}'", canonical)),
            },
            None => Err(anyhow::anyhow!("no module '{}'", specifier)),
        }
    }

    /// An import hook backed by this store
    pub fn hook(self: &Arc<Self>) -> Arc<dyn ImportHook> {
        let store = Arc::clone(self);
        import_fn(move |specifier| -> ImportHookFuture {
            let store = Arc::clone(&store);
            let specifier = specifier.to_string();
            async move {
                if store.yielding.load(Ordering::SeqCst) {
                    YieldOnce::new().await;
                }
                store.lookup(&specifier)
            }
            .boxed()
        })
    }
}

/// A future that suspends exactly once before completing
pub struct YieldOnce {
    yielded: bool,
}

impl YieldOnce {
    pub fn new() -> Self {
        Self { yielded: false }
    }
}

impl Future for YieldOnce {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            Poll::Ready(())
        } else {
            self.yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    }
}

/// Builder for parsed static module records
#[derive(Default)]
pub struct ModuleBuilder {
    imports: Vec<String>,
    fixed: Vec<(String, String)>,
    live: Vec<(String, String, bool)>,
    reexports: Vec<String>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn import(mut self, specifier: &str) -> Self {
        self.imports.push(specifier.to_string());
        self
    }

    pub fn fixed_export(mut self, exported: &str, local: &str) -> Self {
        self.fixed.push((exported.to_string(), local.to_string()));
        self
    }

    pub fn live_export(mut self, exported: &str, local: &str, assignable: bool) -> Self {
        self.live
            .push((exported.to_string(), local.to_string(), assignable));
        self
    }

    pub fn reexport(mut self, specifier: &str) -> Self {
        self.reexports.push(specifier.to_string());
        self
    }

    /// Finish the record with the given module body
    pub fn functor<F>(self, functor: F) -> Arc<StaticModuleRecord>
    where
        F: Fn(&ModuleEnvironment<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.build(functor_fn(functor))
    }

    fn build(self, functor: Arc<dyn ModuleFunctor>) -> Arc<StaticModuleRecord> {
        Arc::new(StaticModuleRecord::Parsed(ParsedModuleRecord {
            imports: self.imports,
            fixed_exports: self.fixed.into_iter().collect(),
            live_exports: self
                .live
                .into_iter()
                .map(|(exported, local, assignable)| {
                    (exported, LiveExportSpec { local, assignable })
                })
                .collect(),
            reexports: self.reexports,
            functor,
        }))
    }
}
