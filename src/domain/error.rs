//! Error taxonomy shared by the index, the resolver and the session.

use std::path::PathBuf;

use thiserror::Error;

use crate::domain::callable::{CallableId, Diagnostic};
use crate::domain::session::SessionState;

#[derive(Debug, Error)]
pub enum CallGraphError {
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    #[error("analysis of {} failed:\n{}", file.display(), render_diagnostics(diagnostics))]
    AnalysisError {
        file: PathBuf,
        diagnostics: Vec<Diagnostic>,
    },

    #[error("unknown symbol: {0}")]
    UnknownSymbol(CallableId),

    #[error("file is not part of the compilation catalog: {}", .0.display())]
    UnknownFile(PathBuf),

    #[error("'{operation}' is not allowed in state {state}")]
    InvalidTransition {
        operation: &'static str,
        state: SessionState,
    },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("invalid compilation database {}: {reason}", path.display())]
    InvalidCompilationDatabase { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CallGraphError {
    /// Short machine-readable name, used by the JSON protocol.
    pub fn kind(&self) -> &'static str {
        match self {
            CallGraphError::SourceNotFound(_) => "SourceNotFound",
            CallGraphError::AnalysisError { .. } => "AnalysisError",
            CallGraphError::UnknownSymbol(_) => "UnknownSymbol",
            CallGraphError::UnknownFile(_) => "UnknownFile",
            CallGraphError::InvalidTransition { .. } => "InvalidTransition",
            CallGraphError::PreconditionFailed(_) => "PreconditionFailed",
            CallGraphError::InvalidCompilationDatabase { .. } => "InvalidCompilationDatabase",
            CallGraphError::Io(_) => "Io",
            CallGraphError::Json(_) => "Json",
        }
    }
}

fn render_diagnostics(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

pub type Result<T> = std::result::Result<T, CallGraphError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::callable::Severity;

    #[test]
    fn analysis_error_lists_every_diagnostic() {
        let err = CallGraphError::AnalysisError {
            file: PathBuf::from("broken.cpp"),
            diagnostics: vec![
                Diagnostic {
                    severity: Severity::Error,
                    message: "expected '}'".to_string(),
                    file: PathBuf::from("broken.cpp"),
                    line: 1,
                    column: 11,
                },
                Diagnostic {
                    severity: Severity::Fatal,
                    message: "too many errors".to_string(),
                    file: PathBuf::from("broken.cpp"),
                    line: 2,
                    column: 1,
                },
            ],
        };

        let text = err.to_string();
        assert!(text.contains("Error: expected '}' in file broken.cpp, line 1, column 11"));
        assert!(text.contains("Fatal: too many errors in file broken.cpp, line 2, column 1"));
        assert_eq!(err.kind(), "AnalysisError");
    }
}
