//! Batch dump mode: the call tree below an entry point as indented text.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

use crate::domain::callable::CallableId;
use crate::domain::callgraph::CallGraphIndex;
use crate::domain::identity::DisplayPaths;
use crate::domain::resolver::DefinitionResolver;
use crate::infrastructure::compilation_catalog::CompilationCatalog;
use crate::ports::AnalysisProvider;

const INDENT: &str = "  ";

pub struct DumpUsecase {
    provider: Box<dyn AnalysisProvider>,
    display_root: Option<PathBuf>,
}

impl DumpUsecase {
    pub fn new(provider: Box<dyn AnalysisProvider>) -> Self {
        Self {
            provider,
            display_root: None,
        }
    }

    pub fn with_display_root(mut self, display_root: Option<PathBuf>) -> Self {
        self.display_root = display_root;
        self
    }

    /// Ingests catalog files in order until `entry` is defined, then lists its callees
    /// depth-first, two spaces per level. Ingest failures abort the dump.
    pub fn dump(
        self,
        entry: &CallableId,
        path: &Path,
        include_system_headers: bool,
        extra_arguments: &[String],
    ) -> Result<String> {
        let catalog = CompilationCatalog::open(path, extra_arguments)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let paths = match self.display_root {
            Some(root) => DisplayPaths::new(Some(root)),
            None => catalog.display_paths(),
        };
        let mut index = CallGraphIndex::new(self.provider, paths);

        for file in catalog.files() {
            if index.lookup(entry).map(|c| c.is_definition).unwrap_or(false) {
                break;
            }
            let arguments = catalog.arguments_for(file).unwrap_or(&[]);
            index.ingest(file, arguments, include_system_headers)?;
        }
        match index.lookup(entry) {
            Ok(callable) if callable.is_definition => {}
            Ok(_) => bail!("No definition of {} in {}", entry, path.display()),
            Err(_) => bail!("Entry point {} not found in {}", entry, path.display()),
        }
        info!("Dumping call tree of {}", entry);

        let resolver = DefinitionResolver::new(&catalog, include_system_headers);
        let mut out = String::new();
        let mut trail = vec![entry.clone()];
        push_line(&mut out, 0, entry);
        write_callees(&resolver, &mut index, entry, &mut trail, &mut out)?;
        Ok(out)
    }
}

fn write_callees(
    resolver: &DefinitionResolver<'_>,
    index: &mut CallGraphIndex,
    id: &CallableId,
    trail: &mut Vec<CallableId>,
    out: &mut String,
) -> Result<()> {
    let callees: Vec<CallableId> = index
        .callees_of(id)
        .into_iter()
        .map(|callee| callee.id.clone())
        .collect();

    for callee in callees {
        push_line(out, trail.len(), &callee);
        if trail.contains(&callee) {
            continue;
        }
        if !index.lookup(&callee)?.is_definition {
            let resolution = resolver.resolve(index, &callee)?;
            if !resolution.callable.is_definition {
                debug!("{} stays a declaration", callee);
            }
        }
        trail.push(callee.clone());
        write_callees(resolver, index, &callee, trail, out)?;
        trail.pop();
    }
    Ok(())
}

fn push_line(out: &mut String, depth: usize, id: &CallableId) {
    out.push_str(&INDENT.repeat(depth));
    out.push_str(id.as_str());
    out.push('\n');
}
