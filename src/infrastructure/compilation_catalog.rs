use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::{debug, info};

use crate::domain::error::{CallGraphError, Result};
use crate::domain::identity::DisplayPaths;

/// One `compile_commands.json` entry.
#[derive(Debug, Deserialize)]
struct CompileCommand {
    file: PathBuf,
    #[serde(default)]
    directory: Option<PathBuf>,
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    arguments: Option<Vec<String>>,
}

/// Maps every known source file to the compiler arguments it is analyzed with.
#[derive(Debug, Clone)]
pub struct CompilationCatalog {
    source: PathBuf,
    entries: IndexMap<PathBuf, Vec<String>>,
}

impl CompilationCatalog {
    /// Opens a compilation database (`*.json`) or treats `path` as a single source file.
    pub fn open(path: &Path, extra_arguments: &[String]) -> Result<Self> {
        if !path.exists() {
            return Err(CallGraphError::SourceNotFound(path.to_path_buf()));
        }
        let is_database = path.extension().map(|ext| ext == "json").unwrap_or(false);
        let catalog = if is_database {
            Self::from_database(path, extra_arguments)?
        } else {
            Self::from_source_file(path, extra_arguments)
        };
        info!(
            "Opened {} with {} translation units",
            catalog.source.display(),
            catalog.entries.len()
        );
        Ok(catalog)
    }

    pub fn from_source_file(path: &Path, extra_arguments: &[String]) -> Self {
        let file = canonical(path);
        let mut entries = IndexMap::new();
        entries.insert(file.clone(), extra_arguments.to_vec());
        Self {
            source: file,
            entries,
        }
    }

    /// Builds a catalog from already resolved entries, keeping their order.
    pub fn from_entries(
        source: impl Into<PathBuf>,
        entries: impl IntoIterator<Item = (PathBuf, Vec<String>)>,
    ) -> Self {
        Self {
            source: source.into(),
            entries: entries
                .into_iter()
                .map(|(file, arguments)| (canonical(&file), arguments))
                .collect(),
        }
    }

    pub fn from_database(path: &Path, extra_arguments: &[String]) -> Result<Self> {
        let invalid = |reason: String| CallGraphError::InvalidCompilationDatabase {
            path: path.to_path_buf(),
            reason,
        };
        let content = fs::read_to_string(path)?;
        let commands: Vec<CompileCommand> =
            serde_json::from_str(&content).map_err(|e| invalid(e.to_string()))?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();

        let mut entries = IndexMap::new();
        for command in commands {
            let directory = match &command.directory {
                Some(dir) if dir.is_absolute() => dir.clone(),
                Some(dir) => base.join(dir),
                None => base.clone(),
            };
            let raw = match (&command.arguments, &command.command) {
                (Some(arguments), _) => arguments.clone(),
                (None, Some(line)) => shlex::split(line).ok_or_else(|| {
                    invalid(format!("unbalanced quoting in command for {}", command.file.display()))
                })?,
                (None, None) => {
                    return Err(invalid(format!(
                        "entry for {} has neither 'command' nor 'arguments'",
                        command.file.display()
                    )))
                }
            };
            let file = canonical(&directory.join(&command.file));
            let mut arguments = normalize_arguments(&raw, &command.file, &file, &directory);
            arguments.extend(extra_arguments.iter().cloned());
            debug!("{} -> {:?}", file.display(), arguments);
            entries.insert(file, arguments);
        }

        Ok(Self {
            source: canonical(path),
            entries,
        })
    }

    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.entries.keys().map(PathBuf::as_path)
    }

    pub fn arguments_for(&self, file: &Path) -> Option<&[String]> {
        self.entries.get(&canonical(file)).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Display paths relative to the deepest directory shared by all catalog files.
    pub fn display_paths(&self) -> DisplayPaths {
        DisplayPaths::new(DisplayPaths::common_directory(self.files()))
    }
}

/// Values of `-isystem <p>` and `-isystem<p>`, in argument order, canonicalized when they exist.
pub fn system_include_prefixes(arguments: &[String]) -> Vec<PathBuf> {
    let mut prefixes = Vec::new();
    let mut iter = arguments.iter();
    while let Some(argument) = iter.next() {
        if argument == "-isystem" {
            if let Some(value) = iter.next() {
                prefixes.push(canonical(Path::new(value)));
            }
        } else if let Some(value) = argument.strip_prefix("-isystem") {
            prefixes.push(canonical(Path::new(value)));
        }
    }
    prefixes
}

/// Strips the compiler, the output and the source file, and anchors include paths.
fn normalize_arguments(raw: &[String], file: &Path, resolved: &Path, directory: &Path) -> Vec<String> {
    let mut arguments = Vec::new();
    let mut iter = raw.iter().peekable();

    // The compiler executable, possibly behind a launcher such as ccache.
    if iter.peek().map(|first| !first.starts_with('-')).unwrap_or(false) {
        if let Some(program) = iter.next() {
            if is_launcher(program) {
                iter.next();
            }
        }
    }

    while let Some(argument) = iter.next() {
        match argument.as_str() {
            "-c" => {}
            "-o" => {
                iter.next();
            }
            "-I" | "-isystem" | "-iquote" => {
                arguments.push(argument.clone());
                if let Some(value) = iter.next() {
                    arguments.push(anchor(value, directory));
                }
            }
            _ if argument.starts_with("-o") && argument.len() > 2 => {}
            _ if is_include_flag(argument) => {
                let (flag, value) = split_include_flag(argument);
                arguments.push(format!("{}{}", flag, anchor(value, directory)));
            }
            _ if !argument.starts_with('-') && is_source_file(argument, file, resolved, directory) => {}
            _ => arguments.push(argument.clone()),
        }
    }
    arguments
}

fn is_launcher(program: &str) -> bool {
    let name = Path::new(program)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(program);
    matches!(name, "ccache" | "sccache" | "distcc")
}

fn is_include_flag(argument: &str) -> bool {
    ["-isystem", "-iquote", "-I"]
        .iter()
        .any(|flag| argument.starts_with(flag) && argument.len() > flag.len())
}

fn split_include_flag(argument: &str) -> (&str, &str) {
    for flag in ["-isystem", "-iquote", "-I"] {
        if let Some(value) = argument.strip_prefix(flag) {
            return (flag, value);
        }
    }
    ("", argument)
}

fn anchor(value: &str, directory: &Path) -> String {
    let path = Path::new(value);
    if path.is_absolute() {
        value.to_string()
    } else {
        directory.join(path).display().to_string()
    }
}

fn is_source_file(argument: &str, file: &Path, resolved: &Path, directory: &Path) -> bool {
    let candidate = Path::new(argument);
    candidate == file || canonical(&directory.join(candidate)) == resolved
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
