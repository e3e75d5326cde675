// Callable records and the raw facts an analysis provider reports about them.

use std::borrow::Borrow;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Stable identity key of a callable. The same underlying symbol always yields the same key,
/// whichever translation unit it was observed in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallableId(String);

impl CallableId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CallableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CallableId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for CallableId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl Borrow<str> for CallableId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Closed set of callable kinds. Per-kind data lives in the variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallableKind {
    Function,
    Method,
    Constructor,
    Destructor,
    ConversionOperator,
    /// `declaration` is the normalized declarator text, e.g. `void (*handler)(int)`.
    FunctionPointerVariable { declaration: String },
    Lambda,
}

impl CallableKind {
    pub fn label(&self) -> &'static str {
        match self {
            CallableKind::Function => "function",
            CallableKind::Method => "method",
            CallableKind::Constructor => "constructor",
            CallableKind::Destructor => "destructor",
            CallableKind::ConversionOperator => "conversion operator",
            CallableKind::FunctionPointerVariable { .. } => "function pointer",
            CallableKind::Lambda => "lambda",
        }
    }

    /// Members are attributed to their enclosing type, everything else to the translation unit.
    pub fn is_member(&self) -> bool {
        matches!(
            self,
            CallableKind::Method
                | CallableKind::Constructor
                | CallableKind::Destructor
                | CallableKind::ConversionOperator
        )
    }
}

/// One observation of a callable, as reported by an analysis provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolFact {
    pub kind: CallableKind,
    /// Semantic parents, outermost first (`["ns", "Foo"]` for `ns::Foo::bar`).
    pub scope: Vec<String>,
    /// Bare name as written, e.g. `bar`, `~Foo`, `operator int`.
    pub spelling: String,
    /// Name plus canonical parameter list, e.g. `bar(int, const char *)`.
    pub display_name: String,
    pub result_type: String,
    pub is_definition: bool,
    pub source_file: PathBuf,
    pub translation_unit: PathBuf,
}

/// A fact stream entry, in provider-reported order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fact {
    Callable(SymbolFact),
    Call { caller: CallableId, callee: CallableId },
}

/// Everything a provider learned from one translation unit.
#[derive(Debug, Clone, Default)]
pub struct UnitFacts {
    pub translation_unit: PathBuf,
    pub facts: Vec<Fact>,
    /// Non-fatal diagnostics; fatal ones are returned as an error instead.
    pub warnings: Vec<Diagnostic>,
}

/// The merged, queryable record the index keeps per identity key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Callable {
    pub id: CallableId,
    pub spelling: String,
    pub qualified_name: String,
    pub kind: CallableKind,
    pub participant: String,
    pub is_definition: bool,
    pub source_file: PathBuf,
    /// Unit the record was observed from. For a declaration seen through a header, this is
    /// the file that included it.
    pub translation_unit: PathBuf,
}

impl fmt::Display for Callable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Ignored,
    Note,
    Warning,
    Error,
    Fatal,
}

impl Severity {
    pub fn is_fatal(self) -> bool {
        self >= Severity::Error
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Ignored => "Ignored",
            Severity::Note => "Note",
            Severity::Warning => "Warning",
            Severity::Error => "Error",
            Severity::Fatal => "Fatal",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub file: PathBuf,
    /// 1-based.
    pub line: usize,
    /// 1-based.
    pub column: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} in file {}, line {}, column {}",
            self.severity,
            self.message,
            self.file.display(),
            self.line,
            self.column
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_callable_id_borrows_as_str() {
        let mut map: HashMap<CallableId, u32> = HashMap::new();
        map.insert(CallableId::from("Foo::bar()"), 1);
        assert_eq!(map.get("Foo::bar()"), Some(&1));
    }

    #[test]
    fn test_member_kinds() {
        assert!(CallableKind::Constructor.is_member());
        assert!(CallableKind::ConversionOperator.is_member());
        assert!(!CallableKind::Lambda.is_member());
        assert!(!CallableKind::FunctionPointerVariable {
            declaration: "void (*fp)()".to_string()
        }
        .is_member());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Fatal.is_fatal());
        assert!(Severity::Error.is_fatal());
        assert!(!Severity::Warning.is_fatal());
    }
}
