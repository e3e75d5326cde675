//! Call-tree session.
//!
//! An explicit state machine over one `CallGraphIndex`. Every operation checks the current
//! phase first; a rejected operation returns `InvalidTransition` and changes nothing.

use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexSet;
use serde::Serialize;
use tracing::{debug, info};

use crate::domain::callable::{Callable, CallableId};
use crate::domain::callgraph::CallGraphIndex;
use crate::domain::error::{CallGraphError, Result};
use crate::domain::identity::DisplayPaths;
use crate::domain::resolver::{DefinitionResolver, Resolution};
use crate::infrastructure::compilation_catalog::CompilationCatalog;
use crate::ports::sequence_exporter::SequenceExporter;
use crate::ports::{AnalysisProvider, SessionObserver};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Initialized,
    ArgumentsSet,
    ReadyToSelectTU,
    ReadyToSelectRoot,
    Interactive,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Initialized => "Initialized",
            SessionState::ArgumentsSet => "ArgumentsSet",
            SessionState::ReadyToSelectTU => "ReadyToSelectTU",
            SessionState::ReadyToSelectRoot => "ReadyToSelectRoot",
            SessionState::Interactive => "Interactive",
        };
        f.write_str(name)
    }
}

pub struct CallTreeSession {
    state: SessionState,
    extra_arguments: Vec<String>,
    display_root: Option<PathBuf>,
    include_system_headers: bool,
    catalog: Option<CompilationCatalog>,
    index: CallGraphIndex,
    root: Option<CallableId>,
    included: IndexSet<CallableId>,
    observer: Box<dyn SessionObserver>,
}

impl CallTreeSession {
    pub fn new(provider: Box<dyn AnalysisProvider>, observer: Box<dyn SessionObserver>) -> Self {
        Self {
            state: SessionState::Initialized,
            extra_arguments: Vec::new(),
            display_root: None,
            include_system_headers: false,
            catalog: None,
            index: CallGraphIndex::new(provider, DisplayPaths::default()),
            root: None,
            included: IndexSet::new(),
            observer,
        }
    }

    /// Fixes the directory participant labels are made relative to. Without it, the deepest
    /// directory shared by the opened catalog's files is used.
    pub fn with_display_root(mut self, display_root: Option<PathBuf>) -> Self {
        self.display_root = display_root;
        self
    }

    pub fn set_extra_arguments(&mut self, arguments: Vec<String>) -> Result<()> {
        self.require(
            "set_extra_arguments",
            &[SessionState::Initialized, SessionState::ArgumentsSet],
        )?;
        debug!("Extra compiler arguments: {:?}", arguments);
        self.extra_arguments = arguments;
        self.transition(SessionState::ArgumentsSet);
        Ok(())
    }

    /// Opens a compilation database or a single source file. Starts a fresh graph.
    pub fn open(&mut self, source: &Path) -> Result<()> {
        self.require(
            "open",
            &[
                SessionState::Initialized,
                SessionState::ArgumentsSet,
                SessionState::ReadyToSelectTU,
            ],
        )?;
        let catalog = CompilationCatalog::open(source, &self.extra_arguments)?;
        let paths = match &self.display_root {
            Some(root) => DisplayPaths::new(Some(root.clone())),
            None => catalog.display_paths(),
        };
        self.index.reset(paths);
        self.catalog = Some(catalog);
        self.root = None;
        self.included.clear();
        self.transition(SessionState::ReadyToSelectTU);
        Ok(())
    }

    /// Ingests `file` and returns the callables declared in it.
    pub fn select_translation_unit(
        &mut self,
        file: &Path,
        include_system_headers: bool,
    ) -> Result<Vec<Callable>> {
        self.require(
            "select_translation_unit",
            &[SessionState::ReadyToSelectTU, SessionState::ReadyToSelectRoot],
        )?;
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| CallGraphError::PreconditionFailed("no catalog open".to_string()))?;
        let arguments = catalog
            .arguments_for(file)
            .ok_or_else(|| CallGraphError::UnknownFile(file.to_path_buf()))?;

        let report = self
            .index
            .ingest(file, arguments, include_system_headers)?;
        self.include_system_headers = include_system_headers;
        let updated: IndexSet<&CallableId> = report.updated.iter().collect();
        for id in updated {
            if let Ok(callable) = self.index.lookup(id) {
                self.observer.callable_updated(callable);
            }
        }
        self.transition(SessionState::ReadyToSelectRoot);

        Ok(self
            .index
            .callables_declared_in(file)
            .into_iter()
            .cloned()
            .collect())
    }

    pub fn select_root(&mut self, id: &CallableId) -> Result<()> {
        self.require(
            "select_root",
            &[SessionState::ReadyToSelectRoot, SessionState::Interactive],
        )?;
        self.index.lookup(id)?;
        info!("Root set to {}", id);
        self.root = Some(id.clone());
        self.transition(SessionState::Interactive);
        Ok(())
    }

    /// Looks for the definition of `id` in files not ingested yet.
    /// Finding none is not an error; check `is_definition` on the result.
    pub fn load_definition(&mut self, id: &CallableId) -> Result<Resolution> {
        self.require("load_definition", &[SessionState::Interactive])?;
        let catalog = self
            .catalog
            .as_ref()
            .ok_or_else(|| CallGraphError::PreconditionFailed("no catalog open".to_string()))?;
        let resolution = DefinitionResolver::new(catalog, self.include_system_headers)
            .resolve(&mut self.index, id)?;
        let updated: IndexSet<&CallableId> = resolution.updated.iter().collect();
        for id in updated {
            if let Ok(callable) = self.index.lookup(id) {
                self.observer.callable_updated(callable);
            }
        }
        Ok(resolution)
    }

    pub fn include(&mut self, id: &CallableId) -> Result<()> {
        self.require("include", &[SessionState::Interactive])?;
        self.index.lookup(id)?;
        if self.included.insert(id.clone()) {
            self.observer.inclusion_changed(id, true);
        }
        Ok(())
    }

    /// Excluding an id that is not included is a no-op.
    pub fn exclude(&mut self, id: &CallableId) -> Result<()> {
        self.require("exclude", &[SessionState::Interactive])?;
        if self.included.shift_remove(id) {
            self.observer.inclusion_changed(id, false);
        }
        Ok(())
    }

    pub fn export(&self) -> Result<String> {
        if self.state != SessionState::Interactive {
            return Err(CallGraphError::PreconditionFailed(format!(
                "export needs a selected root (session is {})",
                self.state
            )));
        }
        let root = self
            .root
            .as_ref()
            .ok_or_else(|| CallGraphError::PreconditionFailed("no root selected".to_string()))?;
        Ok(SequenceExporter::export(&self.index, root, &self.included))
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn root(&self) -> Option<&CallableId> {
        self.root.as_ref()
    }

    pub fn extra_arguments(&self) -> &[String] {
        &self.extra_arguments
    }

    pub fn translation_units(&self) -> Vec<PathBuf> {
        self.catalog
            .as_ref()
            .map(|catalog| catalog.files().map(Path::to_path_buf).collect())
            .unwrap_or_default()
    }

    pub fn callees_of(&self, id: &CallableId) -> Vec<&Callable> {
        self.index.callees_of(id)
    }

    pub fn lookup(&self, id: &CallableId) -> Result<&Callable> {
        self.index.lookup(id)
    }

    pub fn is_included(&self, id: &CallableId) -> bool {
        self.included.contains(id)
    }

    pub fn included(&self) -> impl Iterator<Item = &CallableId> {
        self.included.iter()
    }

    pub fn index(&self) -> &CallGraphIndex {
        &self.index
    }

    fn require(&self, operation: &'static str, allowed: &[SessionState]) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(CallGraphError::InvalidTransition {
                operation,
                state: self.state,
            })
        }
    }

    fn transition(&mut self, next: SessionState) {
        if self.state != next {
            debug!("Session {} -> {}", self.state, next);
            self.state = next;
            self.observer.state_changed(next);
        }
    }
}
