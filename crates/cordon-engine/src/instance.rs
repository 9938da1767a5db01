//! Module instances
//!
//! A module instance is the per-compartment, per-specifier executable
//! realization of a static record: a table of binding cells, a notifier
//! per exported name, the deferred namespace handle it will activate, and
//! an exactly-once execution state machine. Import edges are capability
//! handles (notifiers) rather than owning references, so cyclic graphs
//! need no special ownership treatment.
//!
//! Execution is cycle-tolerant: the pending execution unit is taken out of
//! the state machine *before* the functor runs, so a cyclic dependency
//! re-entering `execute` observes the running state and short-circuits. A
//! functor failure is sticky: every later `execute` surfaces the same
//! error.

use std::cell::Cell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use cordon_core::binding::{BindingCell, BindingError, LexicalSlot, Notifier, Updater};
use cordon_core::namespace::ModuleNamespace;
use cordon_core::value::Value;

use crate::compartment::{Compartment, WeakCompartment};
use crate::linker::LinkError;
use crate::loader::ModuleRecord;
use crate::record::{ParsedModuleRecord, StaticModuleRecord, ThirdPartyModuleRecord};

/// A shared, clonable wrapper over a module body failure
///
/// Sticky failure requires surfacing the *same* error on every repeated
/// `execute`; the `Arc` preserves that identity.
#[derive(Clone)]
pub struct StickyError(Arc<anyhow::Error>);

impl StickyError {
    fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// The underlying error
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Whether two handles carry the same underlying error object
    pub fn same(&self, other: &StickyError) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Display for StickyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for StickyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

/// Errors raised during module execution and import wiring
#[derive(Debug, Error, Clone)]
pub enum ExecuteError {
    /// A wired import name is not exported by the dependency
    #[error("module '{module_specifier}' does not provide an export named '{name}'")]
    MissingExport {
        /// The import specifier of the dependency, as written
        module_specifier: String,
        /// The missing export name
        name: String,
    },

    /// The functor wired a specifier the record never declared
    #[error("module declares no import '{0}'")]
    UnknownImportSpecifier(String),

    /// The functor called `imports` more than once
    #[error("module imports may only be wired once")]
    DuplicateImportsCall,

    /// The functor addressed a local binding the record never declared
    #[error("module has no local binding '{0}'")]
    UnknownBinding(String),

    /// Source assignment to a live export that was not declared assignable
    #[error("module binding '{0}' is not assignable")]
    NotAssignable(String),

    /// A third-party initializer wrote an undeclared export
    #[error("module does not declare an export named '{0}'")]
    UndeclaredExport(String),

    /// The owning compartment was dropped before execution
    #[error("compartment was dropped before module '{0}' could execute")]
    CompartmentDropped(String),

    /// A TDZ or mutability violation on a binding
    #[error(transparent)]
    Binding(#[from] BindingError),

    /// The module body itself failed
    #[error("module evaluation failed: {0}")]
    Evaluation(StickyError),
}

/// The update record a functor passes to [`ModuleEnvironment::imports`]
///
/// Maps import specifiers to import names to updater callbacks, in
/// registration order.
#[derive(Default)]
pub struct ImportUpdaters {
    entries: Vec<(String, Vec<(String, Vec<Updater>)>)>,
}

impl ImportUpdaters {
    /// An empty update record
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `updater` to `name` exported by `specifier`
    pub fn add(&mut self, specifier: &str, name: &str, updater: Updater) {
        let entry = match self.entries.iter().position(|(s, _)| s == specifier) {
            Some(index) => index,
            None => {
                self.entries.push((specifier.to_string(), Vec::new()));
                self.entries.len() - 1
            }
        };
        let names = &mut self.entries[entry].1;
        let slot = match names.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                names.push((name.to_string(), Vec::new()));
                names.len() - 1
            }
        };
        names[slot].1.push(updater);
    }

    /// Wire `name` exported by `specifier` into a lexical slot
    pub fn add_slot(&mut self, specifier: &str, name: &str, slot: &LexicalSlot) {
        self.add(specifier, name, slot.updater());
    }

    /// Whether no updaters were registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum ExecKind {
    Parsed {
        record: Arc<ModuleRecord>,
        parsed: ParsedModuleRecord,
        /// Binding cells by local name
        cells: FxHashMap<String, Arc<BindingCell>>,
        /// Own exports: exported name to cell
        exports: Vec<(String, Arc<BindingCell>)>,
        /// Local names assignable from module source
        assignable: FxHashSet<String>,
    },
    ThirdParty {
        record: Arc<ModuleRecord>,
        third_party: ThirdPartyModuleRecord,
        /// Binding cells by export name
        cells: FxHashMap<String, Arc<BindingCell>>,
    },
}

struct ExecUnit {
    kind: ExecKind,
    /// Import specifier to linked dependency instance, attached by the
    /// linker after shell construction
    imports: FxHashMap<String, Arc<ModuleInstance>>,
}

enum ExecPhase {
    Ready(Box<ExecUnit>),
    Running,
    Done,
    Failed(ExecuteError),
}

/// A linked, executable module
pub struct ModuleInstance {
    compartment: WeakCompartment,
    module_specifier: String,
    /// Namespace handles activated when exports seal; the first is the
    /// canonical one
    facets: RwLock<Vec<Arc<ModuleNamespace>>>,
    /// The sealed export table, kept for late-adopted facets
    sealed: RwLock<Option<BTreeMap<String, Arc<BindingCell>>>>,
    notifiers: RwLock<FxHashMap<String, Notifier>>,
    exec: Mutex<ExecPhase>,
}

impl ModuleInstance {
    pub(crate) fn new_shell(
        compartment: &Compartment,
        record: Arc<ModuleRecord>,
    ) -> Result<Arc<Self>, LinkError> {
        record.static_record.validate()?;
        let namespace = compartment
            .inner
            .deferred
            .get_or_create(compartment, &record.module_specifier);

        let (kind, notifier_seed) = match &*record.static_record {
            StaticModuleRecord::Parsed(parsed) => {
                let mut cells: FxHashMap<String, Arc<BindingCell>> = FxHashMap::default();
                for local in parsed.fixed_exports.values() {
                    cells
                        .entry(local.clone())
                        .or_insert_with(|| BindingCell::fixed(local.clone()));
                }
                let mut assignable = FxHashSet::default();
                for spec in parsed.live_exports.values() {
                    cells
                        .entry(spec.local.clone())
                        .or_insert_with(|| BindingCell::live(spec.local.clone()));
                    if spec.assignable {
                        assignable.insert(spec.local.clone());
                    }
                }

                let mut exports: Vec<(String, Arc<BindingCell>)> = Vec::new();
                for (exported, local) in &parsed.fixed_exports {
                    exports.push((exported.clone(), Arc::clone(&cells[local])));
                }
                for (exported, spec) in &parsed.live_exports {
                    exports.push((exported.clone(), Arc::clone(&cells[&spec.local])));
                }

                let seed: Vec<(String, Notifier)> = exports
                    .iter()
                    .map(|(name, cell)| (name.clone(), cell.notifier()))
                    .collect();
                (
                    ExecKind::Parsed {
                        record: Arc::clone(&record),
                        parsed: parsed.clone(),
                        cells,
                        exports,
                        assignable,
                    },
                    seed,
                )
            }
            StaticModuleRecord::ThirdParty(third_party) => {
                let mut cells = FxHashMap::default();
                for name in &third_party.exports {
                    cells.insert(name.clone(), BindingCell::live(name.clone()));
                }
                let seed: Vec<(String, Notifier)> = cells
                    .iter()
                    .map(|(name, cell)| (name.clone(), cell.notifier()))
                    .collect();
                (
                    ExecKind::ThirdParty {
                        record: Arc::clone(&record),
                        third_party: third_party.clone(),
                        cells,
                    },
                    seed,
                )
            }
        };

        Ok(Arc::new(Self {
            compartment: compartment.downgrade(),
            module_specifier: record.module_specifier.clone(),
            facets: RwLock::new(vec![namespace]),
            sealed: RwLock::new(None),
            notifiers: RwLock::new(notifier_seed.into_iter().collect()),
            exec: Mutex::new(ExecPhase::Ready(Box::new(ExecUnit {
                kind,
                imports: FxHashMap::default(),
            }))),
        }))
    }

    /// The canonical full specifier of the instance
    pub fn module_specifier(&self) -> &str {
        &self.module_specifier
    }

    /// The canonical exports namespace handle
    pub fn namespace(&self) -> Arc<ModuleNamespace> {
        Arc::clone(&self.facets.read()[0])
    }

    /// The notifier for an exported name, if the instance provides it
    pub fn notifier(&self, name: &str) -> Option<Notifier> {
        self.notifiers.read().get(name).cloned()
    }

    pub(crate) fn attach_imports(&self, imports: FxHashMap<String, Arc<ModuleInstance>>) {
        if let ExecPhase::Ready(unit) = &mut *self.exec.lock() {
            unit.imports = imports;
        }
    }

    /// Activate `namespace` together with the canonical one, immediately
    /// if exports are already sealed
    pub(crate) fn adopt_namespace(&self, namespace: Arc<ModuleNamespace>) {
        let sealed = self.sealed.read().clone();
        match sealed {
            Some(entries) => namespace.activate(entries),
            None => self.facets.write().push(namespace),
        }
    }

    fn add_notifiers(&self, additions: Vec<(String, Notifier)>) {
        let mut notifiers = self.notifiers.write();
        for (name, notifier) in additions {
            notifiers.entry(name).or_insert(notifier);
        }
    }

    fn seal_exports(&self, entries: BTreeMap<String, Arc<BindingCell>>) {
        *self.sealed.write() = Some(entries.clone());
        for facet in self.facets.read().iter() {
            facet.activate(entries.clone());
        }
    }

    /// Export names and notifiers, sorted by name
    pub(crate) fn notifier_snapshot(&self) -> Vec<(String, Notifier)> {
        let mut snapshot: Vec<(String, Notifier)> = self
            .notifiers
            .read()
            .iter()
            .map(|(name, notifier)| (name.clone(), notifier.clone()))
            .collect();
        snapshot.sort_by(|a, b| a.0.cmp(&b.0));
        snapshot
    }

    /// Run the module body at most once
    ///
    /// Re-entry during a dependency cycle is a no-op; a completed
    /// execution is a no-op; a failed execution re-surfaces the identical
    /// error.
    pub fn execute(&self) -> Result<(), ExecuteError> {
        let unit = {
            let mut phase = self.exec.lock();
            match &*phase {
                ExecPhase::Done | ExecPhase::Running => return Ok(()),
                ExecPhase::Failed(error) => return Err(error.clone()),
                ExecPhase::Ready(_) => {}
            }
            match std::mem::replace(&mut *phase, ExecPhase::Running) {
                ExecPhase::Ready(unit) => unit,
                _ => return Ok(()),
            }
        };

        log::debug!("executing module '{}'", self.module_specifier);
        let result = self.run(&unit);
        let mut phase = self.exec.lock();
        match &result {
            Ok(()) => *phase = ExecPhase::Done,
            Err(error) => *phase = ExecPhase::Failed(error.clone()),
        }
        result
    }

    fn run(&self, unit: &ExecUnit) -> Result<(), ExecuteError> {
        let compartment = self
            .compartment
            .upgrade()
            .ok_or_else(|| ExecuteError::CompartmentDropped(self.module_specifier.clone()))?;

        match &unit.kind {
            ExecKind::Parsed {
                record,
                parsed,
                cells,
                exports,
                assignable,
            } => {
                let env = ModuleEnvironment {
                    instance: self,
                    record,
                    parsed,
                    imports: &unit.imports,
                    cells,
                    exports,
                    assignable,
                    compartment,
                    imports_called: Cell::new(false),
                };
                match parsed.functor.execute(&env) {
                    Ok(()) => {
                        if !env.imports_called.get() {
                            env.wire(ImportUpdaters::new())?;
                        }
                        Ok(())
                    }
                    Err(error) => Err(into_execute_error(error)),
                }
            }
            ExecKind::ThirdParty {
                record,
                third_party,
                cells,
            } => {
                let entries: BTreeMap<String, Arc<BindingCell>> = cells
                    .iter()
                    .map(|(name, cell)| (name.clone(), Arc::clone(cell)))
                    .collect();
                self.seal_exports(entries);
                let handle = ExportsHandle { cells };
                third_party
                    .initializer
                    .initialize(&handle, &compartment, &record.resolved_imports)
                    .map_err(into_execute_error)
            }
        }
    }
}

impl fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ModuleInstance({})", self.module_specifier)
    }
}

fn into_execute_error(error: anyhow::Error) -> ExecuteError {
    match error.downcast::<ExecuteError>() {
        Ok(error) => error,
        Err(error) => match error.downcast::<BindingError>() {
            Ok(error) => ExecuteError::Binding(error),
            Err(error) => ExecuteError::Evaluation(StickyError::new(error)),
        },
    }
}

/// The scope a parsed functor executes against
///
/// Exposes the `imports` wiring protocol, the module's own bindings
/// (`init` for fixed, `update` and `set` for live), and the compartment
/// scope (frozen global lexicals and the global table).
pub struct ModuleEnvironment<'a> {
    instance: &'a ModuleInstance,
    record: &'a Arc<ModuleRecord>,
    parsed: &'a ParsedModuleRecord,
    imports: &'a FxHashMap<String, Arc<ModuleInstance>>,
    cells: &'a FxHashMap<String, Arc<BindingCell>>,
    exports: &'a [(String, Arc<BindingCell>)],
    assignable: &'a FxHashSet<String>,
    compartment: Compartment,
    imports_called: Cell<bool>,
}

impl ModuleEnvironment<'_> {
    /// Wire imported bindings; callable at most once
    ///
    /// Executes each wired dependency, subscribes the given updaters to
    /// its notifiers, merges `export *` sources, then seals and activates
    /// this module's exports namespace.
    pub fn imports(&self, update_record: ImportUpdaters) -> Result<(), ExecuteError> {
        if self.imports_called.replace(true) {
            return Err(ExecuteError::DuplicateImportsCall);
        }
        self.wire(update_record)
    }

    fn wire(&self, update_record: ImportUpdaters) -> Result<(), ExecuteError> {
        for (specifier, names) in update_record.entries {
            let dependency = self
                .imports
                .get(&specifier)
                .ok_or_else(|| ExecuteError::UnknownImportSpecifier(specifier.clone()))?;
            dependency.execute()?;
            for (name, updaters) in names {
                let notifier =
                    dependency
                        .notifier(&name)
                        .ok_or_else(|| ExecuteError::MissingExport {
                            module_specifier: specifier.clone(),
                            name: name.clone(),
                        })?;
                log::trace!(
                    "'{}' subscribes to '{}' of '{}'",
                    self.record.module_specifier,
                    name,
                    specifier
                );
                for updater in updaters {
                    notifier.notify(updater);
                }
            }
        }

        // Merge `export *` sources: `default` is never re-exported, and a
        // name provided by more than one source is dropped as ambiguous.
        let mut candidates: BTreeMap<String, Option<Notifier>> = BTreeMap::new();
        for specifier in &self.parsed.reexports {
            let dependency = self
                .imports
                .get(specifier)
                .ok_or_else(|| ExecuteError::UnknownImportSpecifier(specifier.clone()))?;
            dependency.execute()?;
            for (name, notifier) in dependency.notifier_snapshot() {
                if name == "default" {
                    continue;
                }
                candidates
                    .entry(name)
                    .and_modify(|slot| *slot = None)
                    .or_insert(Some(notifier));
            }
        }

        let mut entries: BTreeMap<String, Arc<BindingCell>> =
            self.exports.iter().cloned().collect();
        let mut forwards: Vec<(String, Notifier)> = Vec::new();
        for (name, candidate) in candidates {
            let Some(source) = candidate else {
                continue;
            };
            if entries.contains_key(&name) {
                continue;
            }
            let forward = BindingCell::live(name.clone());
            let sink = Arc::clone(&forward);
            source.notify(Arc::new(move |value: &Value| {
                let _ = sink.update(value.clone());
            }));
            forwards.push((name.clone(), forward.notifier()));
            entries.insert(name, forward);
        }

        self.instance.add_notifiers(forwards);
        self.instance.seal_exports(entries);
        Ok(())
    }

    /// Initialize a fixed local binding (the `onceVar` sink)
    pub fn init(&self, local: &str, value: Value) -> Result<(), ExecuteError> {
        Ok(self.cell(local)?.init(value)?)
    }

    /// Declaring write of a live local binding (the `liveVar` sink)
    pub fn update(&self, local: &str, value: Value) -> Result<(), ExecuteError> {
        Ok(self.cell(local)?.update(value)?)
    }

    /// Source assignment to a live local binding; honors the TDZ and the
    /// record's assignability declaration
    pub fn set(&self, local: &str, value: Value) -> Result<(), ExecuteError> {
        if !self.assignable.contains(local) {
            return Err(ExecuteError::NotAssignable(local.to_string()));
        }
        Ok(self.cell(local)?.set(value)?)
    }

    /// Read one of the module's own bindings
    pub fn get(&self, local: &str) -> Result<Value, ExecuteError> {
        Ok(self.cell(local)?.get()?)
    }

    /// A direct handle to one of the module's own binding cells, for
    /// closures that outlive the module body
    pub fn binding(&self, local: &str) -> Result<Arc<BindingCell>, ExecuteError> {
        Ok(Arc::clone(self.cell(local)?))
    }

    /// Read a frozen compartment global lexical
    ///
    /// This is the only compartment scope a module body closes over;
    /// endowments are not in scope.
    pub fn lexical(&self, name: &str) -> Option<Value> {
        self.compartment.global_lexical(name)
    }

    /// Read the compartment's global table (endowments)
    pub fn global(&self, name: &str) -> Option<Value> {
        self.compartment.global(name)
    }

    /// The compartment this instance executes in
    pub fn compartment(&self) -> &Compartment {
        &self.compartment
    }

    /// The canonical full specifier of the executing module
    pub fn specifier(&self) -> &str {
        &self.record.module_specifier
    }

    fn cell(&self, local: &str) -> Result<&Arc<BindingCell>, ExecuteError> {
        self.cells
            .get(local)
            .ok_or_else(|| ExecuteError::UnknownBinding(local.to_string()))
    }
}

/// The mutable exports surface handed to a third-party initializer
pub struct ExportsHandle<'a> {
    cells: &'a FxHashMap<String, Arc<BindingCell>>,
}

impl ExportsHandle<'_> {
    /// Write a declared export; fans out to importers
    pub fn set(&self, name: &str, value: Value) -> Result<(), ExecuteError> {
        let cell = self
            .cells
            .get(name)
            .ok_or_else(|| ExecuteError::UndeclaredExport(name.to_string()))?;
        Ok(cell.update(value)?)
    }

    /// Read a declared export
    pub fn get(&self, name: &str) -> Result<Value, ExecuteError> {
        let cell = self
            .cells
            .get(name)
            .ok_or_else(|| ExecuteError::UndeclaredExport(name.to_string()))?;
        Ok(cell.get()?)
    }

    /// Declared export names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cells.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compartment::CompartmentOptions;
    use crate::record::{functor_fn, initializer_fn, ModuleFunctor};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn compartment() -> Compartment {
        Compartment::new([], [], CompartmentOptions::default()).unwrap()
    }

    fn parsed_record(
        specifier: &str,
        imports: &[&str],
        fixed: &[(&str, &str)],
        functor: Arc<dyn ModuleFunctor>,
    ) -> Arc<ModuleRecord> {
        let mut fixed_exports = FxHashMap::default();
        for (exported, local) in fixed {
            fixed_exports.insert(exported.to_string(), local.to_string());
        }
        Arc::new(ModuleRecord {
            module_specifier: specifier.to_string(),
            static_record: Arc::new(StaticModuleRecord::Parsed(ParsedModuleRecord {
                imports: imports.iter().map(|s| s.to_string()).collect(),
                fixed_exports,
                live_exports: FxHashMap::default(),
                reexports: Vec::new(),
                functor,
            })),
            resolved_imports: imports
                .iter()
                .map(|s| (s.to_string(), s.to_string()))
                .collect(),
        })
    }

    #[test]
    fn test_execute_runs_once() {
        let compartment = compartment();
        let runs = Arc::new(AtomicUsize::new(0));
        let functor = {
            let runs = Arc::clone(&runs);
            functor_fn(move |env| {
                runs.fetch_add(1, Ordering::SeqCst);
                env.init("answer", Value::Number(42.0))?;
                Ok(())
            })
        };
        let record = parsed_record("./mod.js", &[], &[("answer", "answer")], functor);
        let instance = ModuleInstance::new_shell(&compartment, record).unwrap();

        instance.execute().unwrap();
        instance.execute().unwrap();

        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let namespace = instance.namespace();
        assert!(namespace.is_active());
        assert_eq!(namespace.get("answer").unwrap(), Some(Value::Number(42.0)));
    }

    #[test]
    fn test_sticky_failure() {
        let compartment = compartment();
        let functor = functor_fn(|_env| Err(anyhow::anyhow!("deliberate failure")));
        let record = parsed_record("./bad.js", &[], &[], functor);
        let instance = ModuleInstance::new_shell(&compartment, record).unwrap();

        let first = instance.execute().unwrap_err();
        let second = instance.execute().unwrap_err();

        let (ExecuteError::Evaluation(a), ExecuteError::Evaluation(b)) = (&first, &second) else {
            panic!("expected evaluation errors, got {first:?} and {second:?}");
        };
        assert!(a.same(b));
        assert!(a.inner().to_string().contains("deliberate failure"));
    }

    #[test]
    fn test_missing_export() {
        let compartment = compartment();

        let leaf = parsed_record(
            "./b.js",
            &[],
            &[],
            functor_fn(|_env| Ok(())),
        );
        let leaf_instance = ModuleInstance::new_shell(&compartment, leaf).unwrap();

        let slot = LexicalSlot::new("missing");
        let functor = {
            let slot = slot.clone();
            functor_fn(move |env| {
                let mut updaters = ImportUpdaters::new();
                updaters.add_slot("./b.js", "missing", &slot);
                env.imports(updaters)?;
                Ok(())
            })
        };
        let root = parsed_record("./a.js", &["./b.js"], &[], functor);
        let root_instance = ModuleInstance::new_shell(&compartment, root).unwrap();
        let mut imports = FxHashMap::default();
        imports.insert("./b.js".to_string(), Arc::clone(&leaf_instance));
        root_instance.attach_imports(imports);

        let error = root_instance.execute().unwrap_err();
        assert!(matches!(
            error,
            ExecuteError::MissingExport { module_specifier, name }
                if module_specifier == "./b.js" && name == "missing"
        ));
    }

    #[test]
    fn test_duplicate_imports_call() {
        let compartment = compartment();
        let functor = functor_fn(|env| {
            env.imports(ImportUpdaters::new())?;
            env.imports(ImportUpdaters::new())?;
            Ok(())
        });
        let record = parsed_record("./twice.js", &[], &[], functor);
        let instance = ModuleInstance::new_shell(&compartment, record).unwrap();

        assert!(matches!(
            instance.execute(),
            Err(ExecuteError::DuplicateImportsCall)
        ));
    }

    #[test]
    fn test_third_party_initializer() {
        let compartment = compartment();
        let record = Arc::new(ModuleRecord {
            module_specifier: "synthetic:answers".to_string(),
            static_record: Arc::new(StaticModuleRecord::ThirdParty(ThirdPartyModuleRecord {
                imports: Vec::new(),
                exports: vec!["answer".to_string()],
                initializer: initializer_fn(|exports, _compartment, _imports| {
                    exports.set("answer", Value::Number(42.0))?;
                    Ok(())
                }),
            })),
            resolved_imports: FxHashMap::default(),
        });
        let instance = ModuleInstance::new_shell(&compartment, record).unwrap();

        instance.execute().unwrap();
        let namespace = instance.namespace();
        assert_eq!(namespace.get("answer").unwrap(), Some(Value::Number(42.0)));
        assert_eq!(namespace.keys().unwrap(), vec!["answer".to_string()]);
    }

    #[test]
    fn test_third_party_undeclared_export() {
        let compartment = compartment();
        let record = Arc::new(ModuleRecord {
            module_specifier: "synthetic:rogue".to_string(),
            static_record: Arc::new(StaticModuleRecord::ThirdParty(ThirdPartyModuleRecord {
                imports: Vec::new(),
                exports: vec!["declared".to_string()],
                initializer: initializer_fn(|exports, _compartment, _imports| {
                    exports.set("undeclared", Value::Null)?;
                    Ok(())
                }),
            })),
            resolved_imports: FxHashMap::default(),
        });
        let instance = ModuleInstance::new_shell(&compartment, record).unwrap();

        assert!(matches!(
            instance.execute(),
            Err(ExecuteError::UndeclaredExport(name)) if name == "undeclared"
        ));
    }
}
