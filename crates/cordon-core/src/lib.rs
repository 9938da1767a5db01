//! Cordon Core Runtime Primitives
//!
//! This crate provides the runtime primitives shared by every Cordon
//! compartment:
//! - Dynamic value representation (`value`)
//! - Live-binding cells with TDZ semantics and update fan-out (`binding`)
//! - Module exports namespaces (`namespace`)
//! - Identifier validation (`ident`)
//!
//! The loader, linker, and compartment machinery live in `cordon-engine`;
//! everything here is synchronous and self-contained.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod binding;
pub mod ident;
pub mod namespace;
pub mod value;

pub use binding::{BindingCell, BindingError, LexicalSlot, Notifier, Updater};
pub use ident::{ensure_identifier, is_identifier, IdentError};
pub use namespace::{ModuleNamespace, NamespaceError, NamespaceId};
pub use value::{NativeFunction, Object, Value, ValueError};
