// Loads a translation unit and the headers it includes, each parsed once.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use tree_sitter::{Node, Parser, Tree};

use super::syntax::{named_children, text};
use crate::domain::callable::{Diagnostic, Severity};
use crate::domain::error::{CallGraphError, Result};

pub(super) struct SourceFile {
    pub path: PathBuf,
    pub text: String,
    pub tree: Tree,
    /// Found through an `-isystem` directory.
    pub system: bool,
}

/// Include search directories taken from the compiler arguments.
#[derive(Debug, Default)]
pub(super) struct IncludePaths {
    quote: Vec<PathBuf>,
    angle: Vec<PathBuf>,
    system: Vec<PathBuf>,
}

impl IncludePaths {
    pub(super) fn from_arguments(arguments: &[String]) -> Self {
        let mut paths = IncludePaths::default();
        let mut iter = arguments.iter();
        while let Some(argument) = iter.next() {
            for flag in ["-isystem", "-iquote", "-I"] {
                let Some(value) = argument.strip_prefix(flag) else {
                    continue;
                };
                let value = if value.is_empty() {
                    match iter.next() {
                        Some(next) => next.as_str(),
                        None => break,
                    }
                } else {
                    value
                };
                let dir = fs::canonicalize(value).unwrap_or_else(|_| PathBuf::from(value));
                match flag {
                    "-iquote" => paths.quote.push(dir),
                    "-isystem" => {
                        paths.angle.push(dir.clone());
                        paths.system.push(dir);
                    }
                    _ => paths.angle.push(dir),
                }
                break;
            }
        }
        paths
    }

    /// Quoted includes look next to the including file first, then in every directory;
    /// angle includes only in `-I` and `-isystem` directories.
    pub(super) fn resolve(&self, including: &Path, target: &str, quoted: bool) -> Option<PathBuf> {
        let local = quoted
            .then(|| including.parent().map(|dir| dir.join(target)))
            .flatten();
        let quote_dirs: &[PathBuf] = if quoted { &self.quote } else { &[] };
        local
            .into_iter()
            .chain(quote_dirs.iter().map(|dir| dir.join(target)))
            .chain(self.angle.iter().map(|dir| dir.join(target)))
            .find(|candidate| candidate.is_file())
            .map(|found| fs::canonicalize(&found).unwrap_or(found))
    }

    pub(super) fn is_system(&self, path: &Path) -> bool {
        self.system.iter().any(|prefix| path.starts_with(prefix))
    }
}

/// Every file of a translation unit, headers before the file that includes them.
pub(super) struct LoadedUnit {
    pub files: Vec<SourceFile>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Include {
    target: String,
    quoted: bool,
    line: usize,
    column: usize,
}

struct Pending {
    file: SourceFile,
    includes: Vec<Include>,
    next: usize,
}

pub(super) fn load_unit(file: &Path, paths: &IncludePaths) -> Result<LoadedUnit> {
    let mut parser = Parser::new();
    parser
        .set_language(&tree_sitter_cpp::LANGUAGE.into())
        .map_err(|e| CallGraphError::Io(std::io::Error::other(e.to_string())))?;

    let root = fs::canonicalize(file).map_err(|_| CallGraphError::SourceNotFound(file.to_path_buf()))?;
    let mut diagnostics = Vec::new();
    let mut seen: HashSet<PathBuf> = HashSet::new();
    seen.insert(root.clone());

    let first = parse(&mut parser, &root, false)?;
    let mut stack = vec![pending(first, &mut diagnostics)];
    let mut files = Vec::new();

    while let Some(top) = stack.last_mut() {
        if top.next == top.includes.len() {
            if let Some(done) = stack.pop() {
                files.push(done.file);
            }
            continue;
        }
        let include = &top.includes[top.next];
        top.next += 1;

        match paths.resolve(&top.file.path, &include.target, include.quoted) {
            Some(path) => {
                if !seen.insert(path.clone()) {
                    continue;
                }
                match parse(&mut parser, &path, paths.is_system(&path)) {
                    Ok(header) => {
                        let next = pending(header, &mut diagnostics);
                        stack.push(next);
                    }
                    Err(e) => diagnostics.push(Diagnostic {
                        severity: Severity::Warning,
                        message: format!("cannot read '{}': {}", path.display(), e),
                        file: top.file.path.clone(),
                        line: include.line,
                        column: include.column,
                    }),
                }
            }
            None if include.quoted => diagnostics.push(Diagnostic {
                severity: Severity::Warning,
                message: format!("'{}' file not found", include.target),
                file: top.file.path.clone(),
                line: include.line,
                column: include.column,
            }),
            None => debug!("Skipping <{}>", include.target),
        }
    }

    Ok(LoadedUnit { files, diagnostics })
}

fn parse(parser: &mut Parser, path: &Path, system: bool) -> Result<SourceFile> {
    let bytes = fs::read(path)?;
    let text = String::from_utf8_lossy(&bytes).into_owned();
    let tree = parser.parse(&text, None).ok_or_else(|| {
        CallGraphError::Io(std::io::Error::other(format!(
            "parser produced no tree for {}",
            path.display()
        )))
    })?;
    Ok(SourceFile {
        path: path.to_path_buf(),
        text,
        tree,
        system,
    })
}

fn pending(file: SourceFile, diagnostics: &mut Vec<Diagnostic>) -> Pending {
    diagnostics.extend(syntax_errors(&file));
    let includes = find_includes(&file);
    Pending {
        file,
        includes,
        next: 0,
    }
}

fn find_includes(file: &SourceFile) -> Vec<Include> {
    let mut includes = Vec::new();
    let mut stack = vec![file.tree.root_node()];
    while let Some(node) = stack.pop() {
        if node.kind() == "preproc_include" {
            if let Some(path) = node.child_by_field_name("path") {
                let raw = text(path, &file.text);
                let target = raw
                    .trim_matches(|c| c == '"' || c == '<' || c == '>')
                    .to_string();
                let position = node.start_position();
                includes.push(Include {
                    target,
                    quoted: path.kind() == "string_literal",
                    line: position.row + 1,
                    column: position.column + 1,
                });
            }
            continue;
        }
        stack.extend(named_children(node).into_iter().rev());
    }
    includes
}

/// ERROR and MISSING nodes as diagnostics; downgraded to warnings in system headers.
fn syntax_errors(file: &SourceFile) -> Vec<Diagnostic> {
    let root = file.tree.root_node();
    if !root.has_error() {
        return Vec::new();
    }
    let severity = if file.system {
        Severity::Warning
    } else {
        Severity::Error
    };

    let mut diagnostics = Vec::new();
    let mut stack: Vec<Node> = vec![root];
    while let Some(node) = stack.pop() {
        let message = if node.is_missing() {
            Some(format!("expected '{}'", node.kind()))
        } else if node.is_error() {
            Some(format!("unexpected '{}'", snippet(text(node, &file.text))))
        } else {
            None
        };
        if let Some(message) = message {
            let position = node.start_position();
            diagnostics.push(Diagnostic {
                severity,
                message,
                file: file.path.clone(),
                line: position.row + 1,
                column: position.column + 1,
            });
            continue;
        }
        let mut cursor = node.walk();
        let children: Vec<Node> = node
            .children(&mut cursor)
            .filter(|child| child.has_error() || child.is_missing())
            .collect();
        stack.extend(children.into_iter().rev());
    }
    diagnostics
}

fn snippet(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or("").trim();
    if first_line.chars().count() > 30 {
        format!("{}...", first_line.chars().take(30).collect::<String>())
    } else {
        first_line.to_string()
    }
}
