//! Static module records
//!
//! A static module record is the immutable, parsed description of a single
//! module: what it imports, what it exports and how (fixed vs. live), and
//! the opaque functor that executes its body. Records are produced by host
//! import hooks and may be shared across compartments; each compartment
//! instantiates its own module instance from a record.
//!
//! Two flavors exist as a tagged variant: *parsed* records whose functor
//! follows the `imports`/`onceVar`/`liveVar` protocol, and *third-party*
//! records (synthetic or host-native modules) that enumerate their export
//! names and initialize them through a plain exports handle.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use cordon_core::ident::is_identifier;

use crate::compartment::Compartment;
use crate::instance::{ExportsHandle, ModuleEnvironment};

/// Errors raised by static module record validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RecordError {
    /// An export name appears in both the fixed and the live export map
    #[error("export '{0}' is declared both fixed and live")]
    ExportCollision(String),

    /// A local name backs both a fixed and a live export
    #[error("local binding '{0}' is declared both fixed and live")]
    LocalCollision(String),

    /// An export or local name is not a valid identifier
    #[error("'{0}' is not a valid binding name")]
    InvalidName(String),

    /// A third-party record enumerates the same export twice
    #[error("export '{0}' is declared more than once")]
    DuplicateExport(String),
}

/// A live export declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveExportSpec {
    /// Local binding name backing the export
    pub local: String,
    /// Whether module source may assign to the binding after
    /// initialization
    pub assignable: bool,
}

/// Execution functor of a parsed module
///
/// The functor is the compiled module body. When invoked it must call
/// [`ModuleEnvironment::imports`] at most once (before reading any
/// imported binding), then initialize its own exports through
/// [`ModuleEnvironment::init`] and [`ModuleEnvironment::update`].
///
/// Implemented for any matching closure.
pub trait ModuleFunctor: Send + Sync {
    /// Run the module body
    fn execute(&self, env: &ModuleEnvironment<'_>) -> anyhow::Result<()>;
}

impl<F> ModuleFunctor for F
where
    F: Fn(&ModuleEnvironment<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn execute(&self, env: &ModuleEnvironment<'_>) -> anyhow::Result<()> {
        self(env)
    }
}

/// Initializer of a third-party module
///
/// Receives the mutable exports handle, the compartment the instance
/// belongs to, and the record's resolved imports (import specifier to full
/// specifier). Implemented for any matching closure.
pub trait ThirdPartyInitializer: Send + Sync {
    /// Populate the module's exports
    fn initialize(
        &self,
        exports: &ExportsHandle<'_>,
        compartment: &Compartment,
        resolved_imports: &FxHashMap<String, String>,
    ) -> anyhow::Result<()>;
}

impl<F> ThirdPartyInitializer for F
where
    F: Fn(&ExportsHandle<'_>, &Compartment, &FxHashMap<String, String>) -> anyhow::Result<()>
        + Send
        + Sync,
{
    fn initialize(
        &self,
        exports: &ExportsHandle<'_>,
        compartment: &Compartment,
        resolved_imports: &FxHashMap<String, String>,
    ) -> anyhow::Result<()> {
        self(exports, compartment, resolved_imports)
    }
}

/// Wrap a closure as a parsed-module functor
pub fn functor_fn<F>(f: F) -> Arc<dyn ModuleFunctor>
where
    F: Fn(&ModuleEnvironment<'_>) -> anyhow::Result<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap a closure as a third-party initializer
pub fn initializer_fn<F>(f: F) -> Arc<dyn ThirdPartyInitializer>
where
    F: Fn(&ExportsHandle<'_>, &Compartment, &FxHashMap<String, String>) -> anyhow::Result<()>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

/// A parsed static module record
#[derive(Clone)]
pub struct ParsedModuleRecord {
    /// Import specifiers as written in source
    pub imports: Vec<String>,
    /// Fixed (const-like) exports: exported name to local name
    pub fixed_exports: FxHashMap<String, String>,
    /// Live exports: exported name to local declaration
    pub live_exports: FxHashMap<String, LiveExportSpec>,
    /// `export *` source specifiers, in source order
    pub reexports: Vec<String>,
    /// The module body
    pub functor: Arc<dyn ModuleFunctor>,
}

/// A third-party static module record
#[derive(Clone)]
pub struct ThirdPartyModuleRecord {
    /// Import specifiers the host wants resolved for the initializer
    pub imports: Vec<String>,
    /// Enumerated export names
    pub exports: Vec<String>,
    /// The initializer run at execution
    pub initializer: Arc<dyn ThirdPartyInitializer>,
}

/// An immutable static module record, shareable across compartments
#[derive(Clone)]
pub enum StaticModuleRecord {
    /// A record produced by parsing module source
    Parsed(ParsedModuleRecord),
    /// A synthetic or host-native record
    ThirdParty(ThirdPartyModuleRecord),
}

impl StaticModuleRecord {
    /// Import specifiers declared by the record
    pub fn imports(&self) -> &[String] {
        match self {
            StaticModuleRecord::Parsed(record) => &record.imports,
            StaticModuleRecord::ThirdParty(record) => &record.imports,
        }
    }

    /// `export *` source specifiers declared by the record
    pub fn reexports(&self) -> &[String] {
        match self {
            StaticModuleRecord::Parsed(record) => &record.reexports,
            StaticModuleRecord::ThirdParty(_) => &[],
        }
    }

    /// Validate export maps and binding names
    pub fn validate(&self) -> Result<(), RecordError> {
        match self {
            StaticModuleRecord::Parsed(record) => record.validate(),
            StaticModuleRecord::ThirdParty(record) => record.validate(),
        }
    }
}

impl fmt::Debug for StaticModuleRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaticModuleRecord::Parsed(record) => f
                .debug_struct("StaticModuleRecord::Parsed")
                .field("imports", &record.imports)
                .field("fixed", &record.fixed_exports.keys().collect::<Vec<_>>())
                .field("live", &record.live_exports.keys().collect::<Vec<_>>())
                .field("reexports", &record.reexports)
                .finish(),
            StaticModuleRecord::ThirdParty(record) => f
                .debug_struct("StaticModuleRecord::ThirdParty")
                .field("imports", &record.imports)
                .field("exports", &record.exports)
                .finish(),
        }
    }
}

impl ParsedModuleRecord {
    fn validate(&self) -> Result<(), RecordError> {
        for (exported, local) in &self.fixed_exports {
            if !is_identifier(exported) {
                return Err(RecordError::InvalidName(exported.clone()));
            }
            if !is_identifier(local) {
                return Err(RecordError::InvalidName(local.clone()));
            }
            if self.live_exports.contains_key(exported) {
                return Err(RecordError::ExportCollision(exported.clone()));
            }
        }
        let fixed_locals: FxHashSet<&str> =
            self.fixed_exports.values().map(String::as_str).collect();
        for (exported, spec) in &self.live_exports {
            if !is_identifier(exported) {
                return Err(RecordError::InvalidName(exported.clone()));
            }
            if !is_identifier(&spec.local) {
                return Err(RecordError::InvalidName(spec.local.clone()));
            }
            if fixed_locals.contains(spec.local.as_str()) {
                return Err(RecordError::LocalCollision(spec.local.clone()));
            }
        }
        Ok(())
    }
}

impl ThirdPartyModuleRecord {
    fn validate(&self) -> Result<(), RecordError> {
        let mut seen = FxHashSet::default();
        for name in &self.exports {
            if !is_identifier(name) {
                return Err(RecordError::InvalidName(name.clone()));
            }
            if !seen.insert(name.as_str()) {
                return Err(RecordError::DuplicateExport(name.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_functor() -> Arc<dyn ModuleFunctor> {
        functor_fn(|_env| Ok(()))
    }

    fn parsed() -> ParsedModuleRecord {
        ParsedModuleRecord {
            imports: Vec::new(),
            fixed_exports: FxHashMap::default(),
            live_exports: FxHashMap::default(),
            reexports: Vec::new(),
            functor: noop_functor(),
        }
    }

    #[test]
    fn test_valid_parsed_record() {
        let mut record = parsed();
        record
            .fixed_exports
            .insert("default".to_string(), "main".to_string());
        record.live_exports.insert(
            "count".to_string(),
            LiveExportSpec {
                local: "count".to_string(),
                assignable: true,
            },
        );

        assert!(StaticModuleRecord::Parsed(record).validate().is_ok());
    }

    #[test]
    fn test_export_collision() {
        let mut record = parsed();
        record
            .fixed_exports
            .insert("x".to_string(), "x".to_string());
        record.live_exports.insert(
            "x".to_string(),
            LiveExportSpec {
                local: "x2".to_string(),
                assignable: false,
            },
        );

        assert_eq!(
            StaticModuleRecord::Parsed(record).validate(),
            Err(RecordError::ExportCollision("x".to_string()))
        );
    }

    #[test]
    fn test_local_collision() {
        let mut record = parsed();
        record
            .fixed_exports
            .insert("a".to_string(), "shared".to_string());
        record.live_exports.insert(
            "b".to_string(),
            LiveExportSpec {
                local: "shared".to_string(),
                assignable: false,
            },
        );

        assert_eq!(
            StaticModuleRecord::Parsed(record).validate(),
            Err(RecordError::LocalCollision("shared".to_string()))
        );
    }

    #[test]
    fn test_invalid_binding_name() {
        let mut record = parsed();
        record
            .fixed_exports
            .insert("not an export".to_string(), "x".to_string());

        assert_eq!(
            StaticModuleRecord::Parsed(record).validate(),
            Err(RecordError::InvalidName("not an export".to_string()))
        );
    }

    #[test]
    fn test_third_party_duplicate_export() {
        let record = ThirdPartyModuleRecord {
            imports: Vec::new(),
            exports: vec!["a".to_string(), "b".to_string(), "a".to_string()],
            initializer: initializer_fn(|_exports, _compartment, _imports| Ok(())),
        };

        assert_eq!(
            StaticModuleRecord::ThirdParty(record).validate(),
            Err(RecordError::DuplicateExport("a".to_string()))
        );
    }
}
