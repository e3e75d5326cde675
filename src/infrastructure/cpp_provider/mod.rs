//! C++ Analysis Provider
//!
//! Parses a translation unit and its quoted and `-I` includes with tree-sitter-cpp, then
//! reports the callables it declares and the calls their bodies make.
//!
//! Resolution is syntactic: overloads are told apart by argument count, receivers by the
//! declared type of locals, parameters, fields and globals. Macros are not expanded.

mod calls;
mod includes;
mod symbols;
mod syntax;

use std::path::Path;

use tracing::{debug, warn};

use crate::domain::callable::{Diagnostic, Fact, UnitFacts};
use crate::domain::error::{CallGraphError, Result};
use crate::ports::AnalysisProvider;
use includes::IncludePaths;

#[derive(Debug, Default)]
pub struct CppAnalysisProvider;

impl CppAnalysisProvider {
    pub fn new() -> Self {
        Self
    }
}

impl AnalysisProvider for CppAnalysisProvider {
    fn analyze(&self, file: &Path, arguments: &[String]) -> Result<UnitFacts> {
        if !file.is_file() {
            return Err(CallGraphError::SourceNotFound(file.to_path_buf()));
        }
        let paths = IncludePaths::from_arguments(arguments);
        let unit = includes::load_unit(file, &paths)?;

        let (errors, warnings): (Vec<Diagnostic>, Vec<Diagnostic>) = unit
            .diagnostics
            .into_iter()
            .partition(|diagnostic| diagnostic.severity.is_fatal());
        if !errors.is_empty() {
            return Err(CallGraphError::AnalysisError {
                file: file.to_path_buf(),
                diagnostics: errors,
            });
        }
        for diagnostic in &warnings {
            warn!("{}", diagnostic);
        }

        let translation_unit = unit
            .files
            .last()
            .map(|source| source.path.clone())
            .unwrap_or_else(|| file.to_path_buf());
        let table = symbols::collect(&unit.files, &translation_unit);
        let edges = calls::collect(&table, &unit.files);
        debug!(
            "{}: {} files, {} callables, {} calls",
            translation_unit.display(),
            unit.files.len(),
            table.symbols.len(),
            edges.len()
        );

        let mut facts: Vec<Fact> = table
            .symbols
            .iter()
            .map(|symbol| Fact::Callable(symbol.fact.clone()))
            .collect();
        facts.extend(edges.into_iter().map(|(caller, callee)| Fact::Call {
            caller: table.symbols[caller].id.clone(),
            callee: table.symbols[callee].id.clone(),
        }));

        Ok(UnitFacts {
            translation_unit,
            facts,
            warnings,
        })
    }
}
