//! Per-compartment deferred exports
//!
//! A compartment hands out one namespace handle per full specifier,
//! created on first request and returned unchanged thereafter, whether or
//! not the module has loaded, linked, or executed yet. The handle starts
//! pending; the owning module instance activates it when its exports are
//! sealed.
//! Every handle is registered in the process-wide alias registry so other
//! compartments can map against it.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::sync::Arc;

use cordon_core::namespace::ModuleNamespace;

use crate::aliases;
use crate::compartment::Compartment;

/// Table of deferred exports namespaces, keyed by full specifier
#[derive(Default)]
pub struct DeferredExports {
    table: Mutex<FxHashMap<String, Arc<ModuleNamespace>>>,
}

impl DeferredExports {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// The namespace handle for a full specifier, created if absent
    pub fn get_or_create(
        &self,
        compartment: &Compartment,
        full_specifier: &str,
    ) -> Arc<ModuleNamespace> {
        let mut table = self.table.lock();
        if let Some(namespace) = table.get(full_specifier) {
            return Arc::clone(namespace);
        }
        let namespace = ModuleNamespace::pending();
        aliases::register(&namespace, compartment, full_specifier);
        table.insert(full_specifier.to_string(), Arc::clone(&namespace));
        namespace
    }

    /// The handle for a full specifier, if one was already requested
    pub fn peek(&self, full_specifier: &str) -> Option<Arc<ModuleNamespace>> {
        self.table.lock().get(full_specifier).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::CompartmentOptions;

    #[test]
    fn test_stable_handle() {
        let compartment = Compartment::new([], [], CompartmentOptions::default()).unwrap();
        let table = DeferredExports::new();

        let a = table.get_or_create(&compartment, "./a.js");
        let b = table.get_or_create(&compartment, "./a.js");
        let c = table.get_or_create(&compartment, "./c.js");

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert!(table.peek("./a.js").is_some());
        assert!(table.peek("./missing.js").is_none());
    }

    #[test]
    fn test_handles_are_registered() {
        let compartment = Compartment::new([], [], CompartmentOptions::default()).unwrap();
        let table = DeferredExports::new();

        let ns = table.get_or_create(&compartment, "./registered.js");
        let (found, specifier) = aliases::alias_of(&ns).unwrap();
        assert_eq!(found, compartment);
        assert_eq!(specifier, "./registered.js");
    }
}
