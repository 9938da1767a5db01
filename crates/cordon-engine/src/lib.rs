//! Cordon Module Engine
//!
//! This crate provides the confined-compartment module machinery:
//! - **Records**: immutable static module records acquired from host hooks
//!   (`record` module)
//! - **Hooks**: the host contract for resolving, importing, mapping, and
//!   evaluating (`hooks` module)
//! - **Loader**: async transitive discovery of module records (`loader`
//!   module)
//! - **Linker**: synchronous, cycle-tolerant instantiation (`linker`
//!   module)
//! - **Instances**: live-binding linkage and exactly-once execution
//!   (`instance` module)
//! - **Compartments**: the public container type (`compartment` module)
//!
//! # Example
//!
//! ```rust,ignore
//! use cordon_engine::{Compartment, CompartmentOptions};
//!
//! let compartment = Compartment::new([], [], CompartmentOptions {
//!     resolve_hook: Some(resolve),
//!     import_hook: Some(import),
//!     ..CompartmentOptions::default()
//! })?;
//!
//! let namespace = futures::executor::block_on(compartment.import("./main.js"))?;
//! let answer = namespace.get("default")?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod aliases;
pub mod compartment;
pub mod deferred;
pub mod hooks;
pub mod instance;
pub mod linker;
pub mod loader;
pub mod record;

pub use compartment::{Compartment, CompartmentError, CompartmentOptions, WeakCompartment};
pub use hooks::{
    evaluate_fn, import_fn, module_map_fn, resolve_fn, EvalScope, EvaluateHook, ImportHook,
    ImportHookFuture, ImportHookResolution, ModuleMapHook, ResolveHook,
};
pub use instance::{
    ExecuteError, ExportsHandle, ImportUpdaters, ModuleEnvironment, ModuleInstance, StickyError,
};
pub use linker::LinkError;
pub use loader::{LoadError, ModuleRecord};
pub use record::{
    functor_fn, initializer_fn, LiveExportSpec, ModuleFunctor, ParsedModuleRecord, RecordError,
    StaticModuleRecord, ThirdPartyInitializer, ThirdPartyModuleRecord,
};

// Core primitives, re-exported for embedders and tests.
pub use cordon_core::{
    BindingCell, BindingError, LexicalSlot, ModuleNamespace, NamespaceError, NativeFunction,
    Notifier, Object, Updater, Value, ValueError,
};
