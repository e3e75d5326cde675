use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::callable::{Callable, Diagnostic};
use crate::domain::error::CallGraphError;
use crate::domain::resolver::{CandidateFailure, Resolution};
use crate::domain::session::CallTreeSession;

#[derive(Debug, Serialize, Deserialize)]
pub struct CallableDto {
    pub id: String,
    pub qualified_name: String,
    pub kind: String,
    pub participant: String,
    pub is_definition: bool,
    pub source_file: PathBuf,
    pub included: bool,
}

impl CallableDto {
    pub fn new(callable: &Callable, session: &CallTreeSession) -> Self {
        Self {
            id: callable.id.to_string(),
            qualified_name: callable.qualified_name.clone(),
            kind: callable.kind.label().to_string(),
            participant: callable.participant.clone(),
            is_definition: callable.is_definition,
            source_file: callable.source_file.clone(),
            included: session.is_included(&callable.id),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ResolutionDto {
    pub callable: CallableDto,
    pub attempted: Vec<PathBuf>,
    pub failures: Vec<CandidateFailure>,
}

impl ResolutionDto {
    pub fn new(resolution: Resolution, session: &CallTreeSession) -> Self {
        Self {
            callable: CallableDto::new(&resolution.callable, session),
            attempted: resolution.attempted,
            failures: resolution.failures,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StateDto {
    pub state: String,
    pub root: Option<String>,
    pub extra_arguments: Vec<String>,
    pub translation_units: Vec<PathBuf>,
    pub included: Vec<String>,
}

impl From<&CallTreeSession> for StateDto {
    fn from(session: &CallTreeSession) -> Self {
        Self {
            state: session.state().to_string(),
            root: session.root().map(ToString::to_string),
            extra_arguments: session.extra_arguments().to_vec(),
            translation_units: session.translation_units(),
            included: session.included().map(ToString::to_string).collect(),
        }
    }
}

/// Error payload. `diagnostics` is only filled for analysis failures.
#[derive(Debug, Serialize)]
pub struct ErrorDto {
    pub kind: String,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl From<&anyhow::Error> for ErrorDto {
    fn from(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<CallGraphError>() {
            Some(error) => Self {
                kind: error.kind().to_string(),
                message: error.to_string(),
                diagnostics: match error {
                    CallGraphError::AnalysisError { diagnostics, .. } => diagnostics.clone(),
                    _ => Vec::new(),
                },
            },
            None => Self {
                kind: "BadRequest".to_string(),
                message: format!("{:#}", err),
                diagnostics: Vec::new(),
            },
        }
    }
}
