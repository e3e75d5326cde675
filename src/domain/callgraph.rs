// Call graph index for Callscope.
// Merges per-translation-unit facts into one graph keyed by callable identity.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, info, warn};

use crate::domain::callable::{Callable, CallableId, Diagnostic, Fact};
use crate::domain::error::{CallGraphError, Result};
use crate::domain::identity::{self, DisplayPaths};
use crate::ports::AnalysisProvider;

/// A node of the graph. Callees are arena positions, kept in discovery order.
#[derive(Debug)]
struct CallGraphNode {
    callable: Callable,
    callees: IndexSet<usize>,
}

/// Outcome of one successful `ingest`.
#[derive(Debug, Default, Clone)]
pub struct IngestReport {
    /// Callables inserted or upgraded by this ingest, in merge order.
    pub updated: Vec<CallableId>,
    pub edges_added: usize,
    pub filtered: usize,
    pub warnings: Vec<Diagnostic>,
}

/// The single source of truth for what is currently known about the call graph.
///
/// Records are never deleted. A definition is never replaced by a declaration, and a
/// record that already has outgoing edges is considered finalized.
pub struct CallGraphIndex {
    provider: Box<dyn AnalysisProvider>,
    paths: DisplayPaths,
    nodes: IndexMap<CallableId, CallGraphNode>,
    ingested: IndexSet<PathBuf>,
}

impl CallGraphIndex {
    pub fn new(provider: Box<dyn AnalysisProvider>, paths: DisplayPaths) -> Self {
        Self {
            provider,
            paths,
            nodes: IndexMap::new(),
            ingested: IndexSet::new(),
        }
    }

    /// Drops every record and adopts new display paths. Used when a new catalog is opened.
    pub fn reset(&mut self, paths: DisplayPaths) {
        self.nodes.clear();
        self.ingested.clear();
        self.paths = paths;
    }

    /// Analyzes `file` and merges its facts.
    ///
    /// The provider runs before anything is merged, so a `SourceNotFound` or `AnalysisError`
    /// leaves the index exactly as it was.
    pub fn ingest(
        &mut self,
        file: &Path,
        arguments: &[String],
        include_system_headers: bool,
    ) -> Result<IngestReport> {
        let file = fs::canonicalize(file)
            .map_err(|_| CallGraphError::SourceNotFound(file.to_path_buf()))?;
        info!("Ingesting {}", file.display());

        let unit = self.provider.analyze(&file, arguments)?;
        let prefixes = if include_system_headers {
            Vec::new()
        } else {
            self.provider.system_include_prefixes(arguments)
        };

        let mut report = IngestReport {
            warnings: unit.warnings,
            ..IngestReport::default()
        };
        for warning in &report.warnings {
            warn!("{}", warning);
        }

        // Callers whose edges this ingest may extend.
        let mut open_callers: HashSet<usize> = HashSet::new();

        for fact in unit.facts {
            match fact {
                Fact::Callable(symbol) => {
                    if prefixes.iter().any(|p| symbol.source_file.starts_with(p)) {
                        report.filtered += 1;
                        continue;
                    }
                    let callable = identity::to_callable(&symbol, &self.paths);
                    match self.nodes.get_full_mut(&callable.id) {
                        None => {
                            let is_definition = callable.is_definition;
                            report.updated.push(callable.id.clone());
                            let (position, _) = self.nodes.insert_full(
                                callable.id.clone(),
                                CallGraphNode {
                                    callable,
                                    callees: IndexSet::new(),
                                },
                            );
                            if is_definition {
                                open_callers.insert(position);
                            }
                        }
                        Some((position, _, node)) => {
                            if !callable.is_definition || !node.callees.is_empty() {
                                continue;
                            }
                            if !node.callable.is_definition {
                                debug!("Upgrading {} to its definition", callable.id);
                                report.updated.push(callable.id.clone());
                            }
                            node.callable = callable;
                            open_callers.insert(position);
                        }
                    }
                }
                Fact::Call { caller, callee } => {
                    let Some(caller) = self.nodes.get_index_of(&caller) else {
                        continue;
                    };
                    if !open_callers.contains(&caller) {
                        continue;
                    }
                    let Some(callee) = self.nodes.get_index_of(&callee) else {
                        continue;
                    };
                    if self.nodes[caller].callees.insert(callee) {
                        report.edges_added += 1;
                    }
                }
            }
        }

        self.ingested.insert(file.clone());
        info!(
            "Merged {}: {} callables updated, {} edges added, {} filtered",
            file.display(),
            report.updated.len(),
            report.edges_added,
            report.filtered
        );
        Ok(report)
    }

    /// Callees of `id` in discovery order; empty when `id` is unknown.
    pub fn callees_of(&self, id: &CallableId) -> Vec<&Callable> {
        self.nodes
            .get(id)
            .map(|node| {
                node.callees
                    .iter()
                    .filter_map(|&i| self.nodes.get_index(i))
                    .map(|(_, callee)| &callee.callable)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn lookup(&self, id: &CallableId) -> Result<&Callable> {
        self.nodes
            .get(id)
            .map(|node| &node.callable)
            .ok_or_else(|| CallGraphError::UnknownSymbol(id.clone()))
    }

    pub fn callables_declared_in(&self, file: &Path) -> Vec<&Callable> {
        let file = fs::canonicalize(file).unwrap_or_else(|_| file.to_path_buf());
        self.callables()
            .filter(|callable| callable.source_file == file)
            .collect()
    }

    pub fn callables(&self) -> impl Iterator<Item = &Callable> {
        self.nodes.values().map(|node| &node.callable)
    }

    pub fn is_ingested(&self, file: &Path) -> bool {
        match fs::canonicalize(file) {
            Ok(file) => self.ingested.contains(&file),
            Err(_) => self.ingested.contains(file),
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: &CallableId) -> bool {
        self.nodes.contains_key(id)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::callable::{CallableKind, Severity, SymbolFact, UnitFacts};
    use std::collections::HashMap;
    use std::rc::Rc;
    use std::cell::RefCell;
    use tempfile::TempDir;

    /// In-memory provider keyed by file name. Files still have to exist on disk.
    #[derive(Clone, Default)]
    pub(crate) struct FakeProvider {
        pub units: Rc<RefCell<HashMap<PathBuf, std::result::Result<Vec<Fact>, Vec<Diagnostic>>>>>,
    }

    impl FakeProvider {
        pub(crate) fn set(&self, file: &Path, facts: Vec<Fact>) {
            let file = fs::canonicalize(file).unwrap();
            self.units.borrow_mut().insert(file, Ok(facts));
        }

        pub(crate) fn fail(&self, file: &Path, diagnostics: Vec<Diagnostic>) {
            let file = fs::canonicalize(file).unwrap();
            self.units.borrow_mut().insert(file, Err(diagnostics));
        }
    }

    impl AnalysisProvider for FakeProvider {
        fn analyze(&self, file: &Path, _arguments: &[String]) -> Result<UnitFacts> {
            match self.units.borrow().get(file) {
                Some(Ok(facts)) => Ok(UnitFacts {
                    translation_unit: file.to_path_buf(),
                    facts: facts.clone(),
                    warnings: Vec::new(),
                }),
                Some(Err(diagnostics)) => Err(CallGraphError::AnalysisError {
                    file: file.to_path_buf(),
                    diagnostics: diagnostics.clone(),
                }),
                None => Ok(UnitFacts {
                    translation_unit: file.to_path_buf(),
                    ..UnitFacts::default()
                }),
            }
        }
    }

    pub(crate) fn function(name: &str, file: &Path, is_definition: bool) -> Fact {
        Fact::Callable(SymbolFact {
            kind: CallableKind::Function,
            scope: Vec::new(),
            spelling: name.to_string(),
            display_name: format!("{}()", name),
            result_type: "void".to_string(),
            is_definition,
            source_file: file.to_path_buf(),
            translation_unit: file.to_path_buf(),
        })
    }

    pub(crate) fn call(caller: &str, callee: &str) -> Fact {
        Fact::Call {
            caller: CallableId::from(caller),
            callee: CallableId::from(callee),
        }
    }

    pub(crate) fn touch(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, "").unwrap();
        fs::canonicalize(path).unwrap()
    }

    fn ids(callables: Vec<&Callable>) -> Vec<&str> {
        callables.into_iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_callees_keep_discovery_order() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.cpp");
        let provider = FakeProvider::default();
        provider.set(
            &a,
            vec![
                function("z", &a, true),
                function("b", &a, true),
                function("main", &a, true),
                call("main()", "z()"),
                call("main()", "b()"),
                call("main()", "z()"),
            ],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        let report = index.ingest(&a, &[], false).unwrap();

        assert_eq!(report.edges_added, 2);
        assert_eq!(ids(index.callees_of(&"main()".into())), vec!["z()", "b()"]);
        assert!(index.callees_of(&"unknown()".into()).is_empty());
    }

    #[test]
    fn test_reingest_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.cpp");
        let provider = FakeProvider::default();
        provider.set(
            &a,
            vec![function("g", &a, true), function("f", &a, true), call("f()", "g()")],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&a, &[], false).unwrap();
        let second = index.ingest(&a, &[], false).unwrap();

        assert_eq!(second.edges_added, 0);
        assert!(second.updated.is_empty());
        assert_eq!(ids(index.callees_of(&"f()".into())), vec!["g()"]);
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_declaration_never_downgrades_definition() {
        let dir = TempDir::new().unwrap();
        let def = touch(&dir, "def.cpp");
        let decl = touch(&dir, "decl.cpp");
        let provider = FakeProvider::default();
        provider.set(
            &def,
            vec![function("h", &def, true), function("f", &def, true), call("f()", "h()")],
        );
        provider.set(&decl, vec![function("f", &decl, false)]);

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&def, &[], false).unwrap();
        index.ingest(&decl, &[], false).unwrap();

        let f = index.lookup(&"f()".into()).unwrap();
        assert!(f.is_definition);
        assert_eq!(f.source_file, def);
        assert_eq!(ids(index.callees_of(&"f()".into())), vec!["h()"]);
    }

    #[test]
    fn test_declaration_is_upgraded_once_definition_is_seen() {
        let dir = TempDir::new().unwrap();
        let user = touch(&dir, "user.cpp");
        let def = touch(&dir, "def.cpp");
        let provider = FakeProvider::default();
        provider.set(
            &user,
            vec![function("f", &user, false), function("g", &user, true), call("g()", "f()")],
        );
        provider.set(
            &def,
            vec![function("f", &def, true), call("f()", "f()")],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&user, &[], false).unwrap();
        assert!(!index.lookup(&"f()".into()).unwrap().is_definition);

        let report = index.ingest(&def, &[], false).unwrap();
        assert_eq!(report.updated, vec![CallableId::from("f()")]);
        let f = index.lookup(&"f()".into()).unwrap();
        assert!(f.is_definition);
        assert_eq!(ids(index.callees_of(&"f()".into())), vec!["f()"]);
    }

    #[test]
    fn test_expanded_definition_is_finalized() {
        let dir = TempDir::new().unwrap();
        let first = touch(&dir, "first.cpp");
        let second = touch(&dir, "second.cpp");
        let provider = FakeProvider::default();
        provider.set(
            &first,
            vec![function("a", &first, true), function("f", &first, true), call("f()", "a()")],
        );
        provider.set(
            &second,
            vec![function("b", &second, true), function("f", &second, true), call("f()", "b()")],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&first, &[], false).unwrap();
        index.ingest(&second, &[], false).unwrap();

        assert_eq!(index.lookup(&"f()".into()).unwrap().source_file, first);
        assert_eq!(ids(index.callees_of(&"f()".into())), vec!["a()"]);
    }

    #[test]
    fn test_system_header_facts_are_filtered() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.cpp");
        let sys = fs::canonicalize(dir.path()).unwrap().join("sys");
        fs::create_dir(&sys).unwrap();
        let header = sys.join("lib.h");
        let provider = FakeProvider::default();
        provider.set(
            &a,
            vec![
                function("printf", &header, false),
                function("main", &a, true),
                call("main()", "printf()"),
            ],
        );
        let arguments = vec!["-isystem".to_string(), sys.display().to_string()];

        let mut filtered = CallGraphIndex::new(Box::new(provider.clone()), DisplayPaths::default());
        let report = filtered.ingest(&a, &arguments, false).unwrap();
        assert_eq!(report.filtered, 1);
        assert!(!filtered.contains(&"printf()".into()));
        assert!(filtered.callees_of(&"main()".into()).is_empty());

        let mut unfiltered = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        unfiltered.ingest(&a, &arguments, true).unwrap();
        assert_eq!(ids(unfiltered.callees_of(&"main()".into())), vec!["printf()"]);
    }

    #[test]
    fn test_failed_ingest_leaves_index_untouched() {
        let dir = TempDir::new().unwrap();
        let good = touch(&dir, "good.cpp");
        let broken = touch(&dir, "broken.cpp");
        let provider = FakeProvider::default();
        provider.set(&good, vec![function("g", &good, true)]);
        provider.fail(
            &broken,
            vec![Diagnostic {
                severity: Severity::Error,
                message: "expected ';'".to_string(),
                file: broken.clone(),
                line: 1,
                column: 9,
            }],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&good, &[], false).unwrap();

        let err = index.ingest(&broken, &[], false).unwrap_err();
        assert!(matches!(err, CallGraphError::AnalysisError { .. }));
        assert_eq!(index.len(), 1);
        assert!(!index.is_ingested(&broken));

        let missing = dir.path().join("missing.cpp");
        let err = index.ingest(&missing, &[], false).unwrap_err();
        assert!(matches!(err, CallGraphError::SourceNotFound(_)));
    }

    #[test]
    fn test_lookup_and_declared_in() {
        let dir = TempDir::new().unwrap();
        let a = touch(&dir, "a.cpp");
        let header = touch(&dir, "a.h");
        let provider = FakeProvider::default();
        provider.set(
            &a,
            vec![function("decl", &header, false), function("g", &a, true)],
        );

        let mut index = CallGraphIndex::new(Box::new(provider), DisplayPaths::default());
        index.ingest(&a, &[], false).unwrap();

        assert_eq!(ids(index.callables_declared_in(&a)), vec!["g()"]);
        assert_eq!(ids(index.callables_declared_in(&header)), vec!["decl()"]);
        let err = index.lookup(&"nope()".into()).unwrap_err();
        assert!(matches!(err, CallGraphError::UnknownSymbol(_)));
    }
}
