//! Synchronous module linkage
//!
//! Linking turns loaded records into module instances without executing
//! any module code. The walk is cycle-tolerant: an instance shell (cells,
//! notifiers, namespace handle) is cached *before* its imports are linked,
//! so re-entering a specifier mid-link finds the partially constructed
//! instance. Alias records delegate to the target compartment and cache
//! the shared instance under the local specifier; redirect records share
//! the canonical specifier's instance.

use std::sync::Arc;

use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::compartment::Compartment;
use crate::instance::ModuleInstance;
use crate::loader::RecordEntry;
use crate::record::RecordError;

/// Errors raised during linkage
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LinkError {
    /// The specifier was never loaded in this compartment
    #[error("module '{0}' has not been loaded")]
    NotLoaded(String),

    /// The specifier aliases a module of a dropped compartment
    #[error("module '{0}' aliases a compartment that no longer exists")]
    DeadCompartment(String),

    /// The static record failed validation
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Link a loaded specifier into a module instance
pub(crate) fn link(
    compartment: &Compartment,
    full_specifier: &str,
) -> Result<Arc<ModuleInstance>, LinkError> {
    if let Some(instance) = compartment.inner.instances.lock().get(full_specifier) {
        return Ok(Arc::clone(instance));
    }

    let entry = compartment
        .inner
        .records
        .lock()
        .get(full_specifier)
        .cloned()
        .ok_or_else(|| LinkError::NotLoaded(full_specifier.to_string()))?;

    match entry {
        RecordEntry::Alias {
            compartment: weak,
            specifier,
        } => {
            let target = weak
                .upgrade()
                .ok_or_else(|| LinkError::DeadCompartment(full_specifier.to_string()))?;
            let instance = link(&target, &specifier)?;
            if let Some(namespace) = compartment.inner.deferred.peek(full_specifier) {
                instance.adopt_namespace(namespace);
            }
            compartment
                .inner
                .instances
                .lock()
                .insert(full_specifier.to_string(), Arc::clone(&instance));
            log::debug!(
                "linked '{}' in {} to '{}' in {}",
                full_specifier,
                compartment.name(),
                specifier,
                target.name()
            );
            Ok(instance)
        }
        RecordEntry::Module(record) => {
            let canonical = record.module_specifier.clone();

            // A redirected specifier shares the canonical instance.
            if canonical != full_specifier {
                let existing = compartment
                    .inner
                    .instances
                    .lock()
                    .get(&canonical)
                    .map(Arc::clone);
                if let Some(instance) = existing {
                    adopt_requested_namespace(compartment, full_specifier, &instance);
                    compartment
                        .inner
                        .instances
                        .lock()
                        .insert(full_specifier.to_string(), Arc::clone(&instance));
                    return Ok(instance);
                }
            }

            let instance = ModuleInstance::new_shell(compartment, Arc::clone(&record))?;
            {
                let mut instances = compartment.inner.instances.lock();
                instances.insert(canonical.clone(), Arc::clone(&instance));
                if canonical != full_specifier {
                    instances.insert(full_specifier.to_string(), Arc::clone(&instance));
                }
            }
            if canonical != full_specifier {
                adopt_requested_namespace(compartment, full_specifier, &instance);
            }
            log::debug!("linked '{}' in {}", canonical, compartment.name());

            let mut imports = FxHashMap::default();
            for (import_specifier, resolved) in &record.resolved_imports {
                imports.insert(import_specifier.clone(), link(compartment, resolved)?);
            }
            instance.attach_imports(imports);
            Ok(instance)
        }
    }
}

/// Keep a deferred handle created under a pre-redirect specifier in step
/// with the canonical instance's exports.
fn adopt_requested_namespace(
    compartment: &Compartment,
    requested_specifier: &str,
    instance: &Arc<ModuleInstance>,
) {
    if let Some(namespace) = compartment.inner.deferred.peek(requested_specifier) {
        instance.adopt_namespace(namespace);
    }
}
