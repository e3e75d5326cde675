use std::path::{Path, PathBuf};

use crate::domain::callable::{Callable, CallableId, UnitFacts};
use crate::domain::error::Result;
use crate::domain::session::SessionState;
use crate::infrastructure::compilation_catalog;

pub mod sequence_exporter;

/// Parses one translation unit and reports what it contains.
///
/// Implementations return every fact of the unit or an error, never a partial stream:
/// the index relies on this to keep a failed ingest free of side effects.
pub trait AnalysisProvider {
    fn analyze(&self, file: &Path, arguments: &[String]) -> Result<UnitFacts>;

    /// Directories whose headers count as system headers for these arguments.
    fn system_include_prefixes(&self, arguments: &[String]) -> Vec<PathBuf> {
        compilation_catalog::system_include_prefixes(arguments)
    }
}

/// Receives session changes synchronously, after the mutation has been applied.
pub trait SessionObserver {
    fn state_changed(&self, _state: SessionState) {}

    fn callable_updated(&self, _callable: &Callable) {}

    fn inclusion_changed(&self, _id: &CallableId, _included: bool) {}
}

/// Observer for callers that poll the session instead.
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}
