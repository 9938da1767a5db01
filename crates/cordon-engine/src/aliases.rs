//! Process-wide namespace alias registry
//!
//! A namespace handle obtained from one compartment may be passed as a
//! module-map entry of another. The receiving compartment must recognize
//! the handle as *that* module in *that* compartment, so the registry
//! associates every namespace handle the engine creates with its
//! `(compartment, specifier)` identity. Compartments are held weakly: the
//! registry never keeps a compartment alive, and entries for dropped
//! compartments read as absent.

use std::sync::OnceLock;

use dashmap::DashMap;

use cordon_core::namespace::{ModuleNamespace, NamespaceId};

use crate::compartment::{Compartment, WeakCompartment};

struct RegisteredAlias {
    compartment: WeakCompartment,
    specifier: String,
}

fn registry() -> &'static DashMap<NamespaceId, RegisteredAlias> {
    static REGISTRY: OnceLock<DashMap<NamespaceId, RegisteredAlias>> = OnceLock::new();
    REGISTRY.get_or_init(DashMap::new)
}

/// Record the identity of a freshly created namespace handle
pub(crate) fn register(namespace: &ModuleNamespace, compartment: &Compartment, specifier: &str) {
    registry().insert(
        namespace.id(),
        RegisteredAlias {
            compartment: compartment.downgrade(),
            specifier: specifier.to_string(),
        },
    );
}

/// The `(compartment, specifier)` a namespace handle denotes
///
/// `None` for handles the engine did not create, and for handles whose
/// compartment has been dropped (the stale entry is evicted).
pub fn alias_of(namespace: &ModuleNamespace) -> Option<(Compartment, String)> {
    let id = namespace.id();
    let resolved = registry()
        .get(&id)
        .and_then(|entry| {
            entry
                .compartment
                .upgrade()
                .map(|compartment| (compartment, entry.specifier.clone()))
        });
    if resolved.is_none() {
        registry().remove(&id);
    }
    resolved
}
