//! Definition resolver.
//!
//! Best-effort search for the definition of a declaration-only callable among the catalog
//! files that have not been ingested yet. Candidates are pre-filtered textually and ranked by
//! how much of their path they share with the translation unit the declaration was seen from. Neither step
//! is a semantic check: a definition formatted across lines can be missed, and an unrelated
//! symbol of the same name produces a false candidate.

use std::fs::File;
use std::path::{Component, Path, PathBuf};

use memmap2::Mmap;
use rayon::prelude::*;
use regex::bytes::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::domain::callable::{Callable, CallableId};
use crate::domain::callgraph::CallGraphIndex;
use crate::domain::error::Result;
use crate::infrastructure::compilation_catalog::CompilationCatalog;

/// A candidate whose ingestion failed. The search continued past it.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateFailure {
    pub file: PathBuf,
    pub kind: &'static str,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct Resolution {
    /// The record after the search; check `is_definition`.
    pub callable: Callable,
    /// Candidates ingested, in the order they were tried.
    pub attempted: Vec<PathBuf>,
    pub failures: Vec<CandidateFailure>,
    /// Callables inserted or upgraded by the candidate ingests, in merge order.
    pub updated: Vec<CallableId>,
}

pub struct DefinitionResolver<'a> {
    catalog: &'a CompilationCatalog,
    include_system_headers: bool,
}

impl<'a> DefinitionResolver<'a> {
    pub fn new(catalog: &'a CompilationCatalog, include_system_headers: bool) -> Self {
        Self {
            catalog,
            include_system_headers,
        }
    }

    /// Ingests ranked candidates until `id` is a definition or none are left.
    ///
    /// Fails only if `id` is unknown to the index.
    pub fn resolve(&self, index: &mut CallGraphIndex, id: &CallableId) -> Result<Resolution> {
        let target = index.lookup(id)?.clone();
        let mut resolution = Resolution {
            callable: target,
            attempted: Vec::new(),
            failures: Vec::new(),
            updated: Vec::new(),
        };
        if resolution.callable.is_definition {
            return Ok(resolution);
        }

        let candidates = self.candidates(index, &resolution.callable);
        debug!("{} candidate(s) for {}", candidates.len(), id);

        for file in candidates {
            if index.is_ingested(&file) {
                continue;
            }
            let arguments = self.catalog.arguments_for(&file).unwrap_or(&[]);
            resolution.attempted.push(file.clone());
            match index.ingest(&file, arguments, self.include_system_headers) {
                Ok(report) => resolution.updated.extend(report.updated),
                Err(e) => {
                    warn!("Skipping candidate {}: {}", file.display(), e);
                    resolution.failures.push(CandidateFailure {
                        file,
                        kind: e.kind(),
                        message: e.to_string(),
                    });
                    continue;
                }
            }
            if index.lookup(id)?.is_definition {
                break;
            }
        }

        resolution.callable = index.lookup(id)?.clone();
        if resolution.callable.is_definition {
            info!(
                "Found definition of {} in {}",
                id,
                resolution.callable.source_file.display()
            );
        } else {
            info!("No definition found for {}", id);
        }
        Ok(resolution)
    }

    /// Not-yet-ingested catalog files mentioning the callable's spelling, best rank first.
    pub fn candidates(&self, index: &CallGraphIndex, callable: &Callable) -> Vec<PathBuf> {
        let Ok(pattern) = Regex::new(&regex::escape(&callable.spelling)) else {
            return Vec::new();
        };
        let pending: Vec<&Path> = self
            .catalog
            .files()
            .filter(|file| !index.is_ingested(file))
            .collect();

        let mut candidates: Vec<(usize, PathBuf)> = pending
            .par_iter()
            .filter(|file| mentions(file, &pattern))
            .map(|file| (rank(&callable.translation_unit, file), file.to_path_buf()))
            .collect();

        // Stable: equal ranks keep catalog order.
        candidates.sort_by(|a, b| b.0.cmp(&a.0));
        candidates.into_iter().map(|(_, file)| file).collect()
    }
}

/// Number of leading path components `reference` and `candidate` share.
pub fn rank(reference: &Path, candidate: &Path) -> usize {
    reference
        .components()
        .zip(candidate.components())
        .take_while(|(a, b)| a == b)
        .filter(|(a, _)| !matches!(a, Component::RootDir | Component::Prefix(_)))
        .count()
}

fn mentions(file: &Path, pattern: &Regex) -> bool {
    let Ok(handle) = File::open(file) else {
        return false;
    };
    match handle.metadata() {
        Ok(meta) if meta.len() == 0 => return false,
        Ok(_) => {}
        Err(_) => return false,
    }
    // SAFETY: the mapping is read-only and dropped before returning; a file truncated
    // concurrently by another process is outside what the scan guards against.
    match unsafe { Mmap::map(&handle) } {
        Ok(bytes) => pattern.is_match(&bytes),
        Err(e) => {
            debug!("Cannot map {}: {}", file.display(), e);
            false
        }
    }
}
