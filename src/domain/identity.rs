//! Symbol identity.
//!
//! Pure functions deciding when two observations denote the same callable, and which
//! diagram participant a callable belongs to. Kind-specific behaviour is a `match` over
//! [`CallableKind`], not a family of types.

use std::path::{Path, PathBuf};

use crate::domain::callable::{Callable, CallableId, CallableKind, SymbolFact};

/// Shortens file paths for display. Threaded explicitly into whatever derives labels.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DisplayPaths {
    root: Option<PathBuf>,
}

impl DisplayPaths {
    pub fn new(root: Option<PathBuf>) -> Self {
        Self { root }
    }

    /// Deepest directory shared by every path; `None` for an empty input.
    pub fn common_directory<'a>(paths: impl IntoIterator<Item = &'a Path>) -> Option<PathBuf> {
        let mut common: Option<PathBuf> = None;
        for path in paths {
            let dir = path.parent().unwrap_or(path).to_path_buf();
            common = Some(match common {
                None => dir,
                Some(current) => current
                    .components()
                    .zip(dir.components())
                    .take_while(|(a, b)| a == b)
                    .map(|(a, _)| a)
                    .collect(),
            });
        }
        common
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn label(&self, path: &Path) -> String {
        let shortened = self
            .root
            .as_deref()
            .and_then(|root| path.strip_prefix(root).ok())
            .filter(|rest| !rest.as_os_str().is_empty())
            .unwrap_or(path);
        shortened.to_string_lossy().into_owned()
    }
}

/// `scope::display_name`, the identity key.
pub fn callable_id(fact: &SymbolFact) -> CallableId {
    CallableId::new(scoped(&fact.scope, &fact.display_name))
}

pub fn qualified_name(fact: &SymbolFact) -> String {
    let name = scoped(&fact.scope, &fact.display_name);
    match &fact.kind {
        CallableKind::FunctionPointerVariable { declaration } => declaration.clone(),
        CallableKind::Constructor | CallableKind::Destructor => format!("void {}", name),
        _ if fact.result_type.is_empty() => name,
        _ => format!("{} {}", fact.result_type, name),
    }
}

/// Members belong to their enclosing type; free functions, lambdas and function pointers
/// belong to the translation unit they were observed in.
pub fn participant(fact: &SymbolFact, paths: &DisplayPaths) -> String {
    if fact.kind.is_member() && !fact.scope.is_empty() {
        fact.scope.join("::")
    } else {
        paths.label(&fact.translation_unit)
    }
}

pub fn to_callable(fact: &SymbolFact, paths: &DisplayPaths) -> Callable {
    Callable {
        id: callable_id(fact),
        spelling: fact.spelling.clone(),
        qualified_name: qualified_name(fact),
        kind: fact.kind.clone(),
        participant: participant(fact, paths),
        is_definition: fact.is_definition,
        source_file: fact.source_file.clone(),
        translation_unit: fact.translation_unit.clone(),
    }
}

fn scoped(scope: &[String], name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{}::{}", scope.join("::"), name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fact(kind: CallableKind, scope: &[&str], display: &str, result: &str) -> SymbolFact {
        SymbolFact {
            kind,
            scope: scope.iter().map(|s| s.to_string()).collect(),
            spelling: display.split('(').next().unwrap_or(display).to_string(),
            display_name: display.to_string(),
            result_type: result.to_string(),
            is_definition: true,
            source_file: PathBuf::from("/work/src/foo.h"),
            translation_unit: PathBuf::from("/work/src/foo.cpp"),
        }
    }

    #[test]
    fn test_free_function_belongs_to_translation_unit() {
        let paths = DisplayPaths::new(Some(PathBuf::from("/work")));
        let f = fact(CallableKind::Function, &[], "f(int)", "void");
        assert_eq!(callable_id(&f).as_str(), "f(int)");
        assert_eq!(qualified_name(&f), "void f(int)");
        assert_eq!(participant(&f, &paths), "src/foo.cpp");
    }

    #[test]
    fn test_method_belongs_to_enclosing_type() {
        let paths = DisplayPaths::default();
        let m = fact(CallableKind::Method, &["ns", "Foo"], "bar(int)", "void");
        assert_eq!(callable_id(&m).as_str(), "ns::Foo::bar(int)");
        assert_eq!(qualified_name(&m), "void ns::Foo::bar(int)");
        assert_eq!(participant(&m, &paths), "ns::Foo");
    }

    #[test]
    fn test_constructor_and_destructor_names() {
        let ctor = fact(CallableKind::Constructor, &["X"], "X(const X &)", "");
        let dtor = fact(CallableKind::Destructor, &["X"], "~X()", "");
        assert_eq!(qualified_name(&ctor), "void X::X(const X &)");
        assert_eq!(qualified_name(&dtor), "void X::~X()");
        assert_eq!(participant(&dtor, &DisplayPaths::default()), "X");
    }

    #[test]
    fn test_function_pointer_uses_declaration_text() {
        let fp = fact(
            CallableKind::FunctionPointerVariable {
                declaration: "void (*foo)(int)".to_string(),
            },
            &[],
            "foo",
            "",
        );
        assert_eq!(qualified_name(&fp), "void (*foo)(int)");
        assert_eq!(participant(&fp, &DisplayPaths::default()), "/work/src/foo.cpp");
    }

    #[test]
    fn test_local_lambda_is_scoped_by_its_function() {
        let l = fact(CallableKind::Lambda, &["run()"], "step", "auto");
        assert_eq!(callable_id(&l).as_str(), "run()::step");
        assert_eq!(qualified_name(&l), "auto run()::step");
    }

    #[test]
    fn test_common_directory() {
        let a = PathBuf::from("/w/src/a/x.cpp");
        let b = PathBuf::from("/w/src/b/y.cpp");
        let common = DisplayPaths::common_directory([a.as_path(), b.as_path()]);
        assert_eq!(common, Some(PathBuf::from("/w/src")));

        let single = DisplayPaths::common_directory([a.as_path()]);
        assert_eq!(single, Some(PathBuf::from("/w/src/a")));
        assert_eq!(DisplayPaths::common_directory(std::iter::empty()), None);
    }

    #[test]
    fn test_label_keeps_path_outside_root() {
        let paths = DisplayPaths::new(Some(PathBuf::from("/w/src")));
        assert_eq!(paths.label(Path::new("/w/src/a/x.cpp")), "a/x.cpp");
        assert_eq!(paths.label(Path::new("/other/y.cpp")), "/other/y.cpp");
    }
}
