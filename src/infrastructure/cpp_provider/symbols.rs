// First pass: every callable declared in the unit, plus the type information calls need.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tree_sitter::Node;

use super::includes::SourceFile;
use super::syntax::{
    canonical_tokens, children, declared_name, field_children, function_pointer, function_shape,
    join_tokens, named_children, operator_spelling, parameters, qualified_parts, split_qualified,
    strip_whitespace, text, FunctionShape, Parameters,
};
use crate::domain::callable::{CallableId, CallableKind, SymbolFact};
use crate::domain::identity;

/// A type as written: candidate names (the type, then its template arguments) and the
/// scope it was written in.
#[derive(Debug, Clone)]
pub(super) struct TypeRef {
    pub names: Vec<Vec<String>>,
    pub scope: Vec<String>,
}

impl TypeRef {
    pub(super) fn from_node(node: Node<'_>, source: &str, scope: &[String]) -> Option<TypeRef> {
        let mut names = Vec::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            match current.kind() {
                "type_identifier" => names.push(vec![text(current, source).to_string()]),
                "qualified_identifier" => {
                    names.push(qualified_parts(current, source));
                    let (_, last) = split_qualified(current, source);
                    if let Some(arguments) = last.child_by_field_name("arguments") {
                        stack.extend(named_children(arguments).into_iter().rev());
                    }
                }
                "template_type" => {
                    if let Some(name) = current.child_by_field_name("name") {
                        names.push(vec![text(name, source).to_string()]);
                    }
                    if let Some(arguments) = current.child_by_field_name("arguments") {
                        stack.extend(named_children(arguments).into_iter().rev());
                    }
                }
                "type_descriptor" => stack.extend(current.child_by_field_name("type")),
                _ => {}
            }
        }
        (!names.is_empty()).then(|| TypeRef {
            names,
            scope: scope.to_vec(),
        })
    }

    pub(super) fn named(name: &str, scope: &[String]) -> TypeRef {
        TypeRef {
            names: vec![vec![name.to_string()]],
            scope: scope.to_vec(),
        }
    }
}

pub(super) struct Symbol {
    pub fact: SymbolFact,
    pub id: CallableId,
    /// Qualified name of the enclosing class, for members.
    pub owner: Option<String>,
    /// Lambdas local to a function body, reachable only through that body.
    pub local: bool,
    pub min_args: usize,
    pub max_args: usize,
}

impl Symbol {
    pub(super) fn accepts(&self, arguments: usize) -> bool {
        self.min_args <= arguments && arguments <= self.max_args
    }
}

/// A callable body to scan for calls.
pub(super) struct Body<'t> {
    pub symbol: usize,
    pub node: Node<'t>,
    pub file: usize,
    pub scope: Vec<String>,
    pub class: Option<String>,
    pub parameters: Vec<(String, TypeRef)>,
}

#[derive(Debug, Default)]
pub(super) struct ClassInfo {
    pub bases: Vec<TypeRef>,
    pub fields: HashMap<String, TypeRef>,
}

#[derive(Default)]
pub(super) struct SymbolTable<'t> {
    pub symbols: Vec<Symbol>,
    pub by_spelling: HashMap<String, Vec<usize>>,
    pub classes: HashMap<String, ClassInfo>,
    pub namespaces: HashSet<String>,
    /// Namespace-scope variables by qualified name.
    pub globals: HashMap<String, TypeRef>,
    pub bodies: Vec<Body<'t>>,
    /// `lambda_expression` node id to the symbol of the variable holding it.
    pub named_lambdas: HashMap<usize, usize>,
}

impl SymbolTable<'_> {
    /// Innermost class visible from the type's scope.
    pub(super) fn resolve_class(&self, ty: &TypeRef) -> Option<String> {
        for name in &ty.names {
            for depth in (0..=ty.scope.len()).rev() {
                let mut parts = ty.scope[..depth].to_vec();
                parts.extend(name.iter().cloned());
                let qualified = parts.join("::");
                if self.classes.contains_key(&qualified) {
                    return Some(qualified);
                }
            }
        }
        None
    }

    pub(super) fn named(&self, spelling: &str) -> impl Iterator<Item = (usize, &Symbol)> {
        let symbols = &self.symbols;
        self.by_spelling
            .get(spelling)
            .into_iter()
            .flatten()
            .map(move |&index| (index, &symbols[index]))
    }
}

#[derive(Debug, Clone, Default)]
struct Context {
    scope: Vec<String>,
    class: Option<String>,
}

enum NameHint {
    Plain,
    Destructor,
    Conversion,
}

pub(super) fn collect<'t>(files: &'t [SourceFile], translation_unit: &Path) -> SymbolTable<'t> {
    let mut collector = Collector {
        table: SymbolTable::default(),
        contexts: vec![Context::default()],
        paths: files.iter().map(|file| file.path.clone()).collect(),
        translation_unit,
    };
    for (index, file) in files.iter().enumerate() {
        collector.walk_file(index, file);
    }
    collector.table
}

struct Collector<'a, 't> {
    table: SymbolTable<'t>,
    contexts: Vec<Context>,
    paths: Vec<PathBuf>,
    translation_unit: &'a Path,
}

impl<'a, 't> Collector<'a, 't> {
    fn walk_file(&mut self, file_index: usize, file: &'t SourceFile) {
        let source = file.text.as_str();
        let mut stack: Vec<(Node<'t>, usize)> = vec![(file.tree.root_node(), 0)];

        while let Some((node, ctx)) = stack.pop() {
            match node.kind() {
                "translation_unit" | "declaration_list" | "field_declaration_list"
                | "template_declaration" | "linkage_specification" | "preproc_if"
                | "preproc_ifdef" | "preproc_else" | "preproc_elif" | "preproc_elifdef" => {
                    push_children(&mut stack, node, ctx);
                }
                "namespace_definition" => {
                    let mut scope = self.contexts[ctx].scope.clone();
                    if let Some(name) = node.child_by_field_name("name") {
                        for part in text(name, source).split("::").map(str::trim) {
                            if part.is_empty() {
                                continue;
                            }
                            scope.push(part.to_string());
                            self.table.namespaces.insert(scope.join("::"));
                        }
                    }
                    if let Some(body) = node.child_by_field_name("body") {
                        let inner = self.context(scope, None);
                        push_children(&mut stack, body, inner);
                    }
                }
                "class_specifier" | "struct_specifier" | "union_specifier" => {
                    if let Some(inner) = self.class(node, source, ctx) {
                        if let Some(body) = node.child_by_field_name("body") {
                            push_children(&mut stack, body, inner);
                        }
                    }
                }
                "function_definition" => self.function_definition(node, file_index, source, ctx),
                "declaration" | "field_declaration" => {
                    if let Some(ty) = node.child_by_field_name("type") {
                        if matches!(ty.kind(), "class_specifier" | "struct_specifier" | "union_specifier") {
                            stack.push((ty, ctx));
                        }
                    }
                    self.declaration(node, file_index, source, ctx);
                }
                _ => {}
            }
        }
    }

    fn context(&mut self, scope: Vec<String>, class: Option<String>) -> usize {
        self.contexts.push(Context { scope, class });
        self.contexts.len() - 1
    }

    fn class(&mut self, node: Node<'t>, source: &str, ctx: usize) -> Option<usize> {
        let name = node.child_by_field_name("name")?;
        let outer = self.contexts[ctx].scope.clone();
        let mut scope = outer.clone();
        scope.extend(qualified_parts(name, source));
        let qualified = scope.join("::");

        let info = self.table.classes.entry(qualified.clone()).or_default();
        for clause in children(node)
            .into_iter()
            .filter(|child| child.kind() == "base_class_clause")
        {
            info.bases.extend(
                named_children(clause)
                    .into_iter()
                    .filter_map(|base| TypeRef::from_node(base, source, &outer)),
            );
        }
        Some(self.context(scope, Some(qualified)))
    }

    fn function_definition(&mut self, node: Node<'t>, file: usize, source: &str, ctx: usize) {
        let Some(shape) = node.child_by_field_name("declarator").and_then(function_shape) else {
            return;
        };
        let body = node.child_by_field_name("body");
        let defaulted = children(node)
            .iter()
            .any(|child| child.kind() == "default_method_clause");
        let is_definition = body.is_some() || defaulted;
        self.function(node, shape, file, source, ctx, is_definition, body);
    }

    #[allow(clippy::too_many_arguments)]
    fn function(
        &mut self,
        declaration: Node<'t>,
        shape: FunctionShape<'t>,
        file: usize,
        source: &str,
        ctx: usize,
        is_definition: bool,
        body: Option<Node<'t>>,
    ) {
        let (qualifiers, name) = split_qualified(shape.name, source);
        let (spelling, hint) = match name.kind() {
            "destructor_name" => (strip_whitespace(text(name, source)), NameHint::Destructor),
            "operator_cast" => {
                let target = name
                    .child_by_field_name("type")
                    .map(|ty| canonical_tokens(ty, source, &[]))
                    .unwrap_or_default();
                (format!("operator {}", target), NameHint::Conversion)
            }
            "operator_name" => (operator_spelling(text(name, source)), NameHint::Plain),
            "template_function" => (
                name.child_by_field_name("name")
                    .map(|n| text(n, source).to_string())
                    .unwrap_or_default(),
                NameHint::Plain,
            ),
            _ => (text(name, source).to_string(), NameHint::Plain),
        };
        if spelling.is_empty() {
            return;
        }

        let context = &self.contexts[ctx];
        let mut scope = context.scope.clone();
        scope.extend(qualifiers.iter().cloned());
        let owner = if qualifiers.is_empty() {
            context.class.clone()
        } else {
            // An unknown qualifier is taken for a class declared in a header we did not see.
            let qualified = scope.join("::");
            (self.table.classes.contains_key(&qualified)
                || !self.table.namespaces.contains(&qualified))
            .then_some(qualified)
        };

        let kind = match (&hint, &owner) {
            (NameHint::Destructor, Some(_)) => CallableKind::Destructor,
            (NameHint::Conversion, Some(_)) => CallableKind::ConversionOperator,
            (_, Some(class)) if class.rsplit("::").next() == Some(spelling.as_str()) => {
                CallableKind::Constructor
            }
            (_, Some(_)) => CallableKind::Method,
            _ => CallableKind::Function,
        };

        let params = shape
            .parameters
            .map(|list| parameters(list, source))
            .unwrap_or_else(Parameters::none);
        let result_type = match kind {
            CallableKind::Function | CallableKind::Method => {
                let mut tokens = vec![result_type(declaration, source)];
                tokens.extend(shape.result_suffix.iter().map(|s| s.to_string()));
                let tokens: Vec<&str> = tokens.iter().map(String::as_str).filter(|t| !t.is_empty()).collect();
                join_tokens(&tokens)
            }
            _ => String::new(),
        };

        let fact = SymbolFact {
            kind,
            scope: scope.clone(),
            display_name: format!("{}({})", spelling, params.display.join(", ")),
            spelling,
            result_type,
            is_definition,
            source_file: self.path_of(file),
            translation_unit: self.translation_unit.to_path_buf(),
        };
        let display_name = fact.display_name.clone();
        let symbol = self.add(fact, owner.clone(), false, params.min, params.max);

        if let Some(body) = body {
            let parameters = typed_parameters(&params, source, &scope);
            self.table.bodies.push(Body {
                symbol,
                node: body,
                file,
                scope: scope.clone(),
                class: owner.clone(),
                parameters,
            });
            let mut lambda_scope = scope.clone();
            lambda_scope.push(display_name);
            self.local_lambdas(body, file, source, &lambda_scope, &scope, owner);
        }
    }

    /// Lambdas stored in named variables inside a function body.
    fn local_lambdas(
        &mut self,
        body: Node<'t>,
        file: usize,
        source: &str,
        lambda_scope: &[String],
        body_scope: &[String],
        class: Option<String>,
    ) {
        let mut stack = vec![body];
        while let Some(node) = stack.pop() {
            if node.kind() == "init_declarator" {
                if let (Some(name), Some(value)) = (
                    node.child_by_field_name("declarator"),
                    node.child_by_field_name("value"),
                ) {
                    if name.kind() == "identifier" && value.kind() == "lambda_expression" {
                        self.lambda(
                            text(name, source),
                            value,
                            file,
                            source,
                            lambda_scope,
                            body_scope,
                            class.clone(),
                            true,
                        );
                    }
                }
            }
            stack.extend(named_children(node).into_iter().rev());
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn lambda(
        &mut self,
        name: &str,
        lambda: Node<'t>,
        file: usize,
        source: &str,
        scope: &[String],
        body_scope: &[String],
        class: Option<String>,
        local: bool,
    ) {
        let params = lambda
            .child_by_field_name("declarator")
            .and_then(|declarator| declarator.child_by_field_name("parameters"))
            .map(|list| parameters(list, source))
            .unwrap_or_else(Parameters::none);
        let fact = SymbolFact {
            kind: CallableKind::Lambda,
            scope: scope.to_vec(),
            spelling: name.to_string(),
            display_name: name.to_string(),
            result_type: "auto".to_string(),
            is_definition: true,
            source_file: self.path_of(file),
            translation_unit: self.translation_unit.to_path_buf(),
        };
        let symbol = self.add(fact, None, local, params.min, params.max);
        self.table.named_lambdas.insert(lambda.id(), symbol);

        if let Some(body) = lambda.child_by_field_name("body") {
            let parameters = typed_parameters(&params, source, body_scope);
            self.table.bodies.push(Body {
                symbol,
                node: body,
                file,
                scope: body_scope.to_vec(),
                class,
                parameters,
            });
        }
    }

    fn declaration(&mut self, node: Node<'t>, file: usize, source: &str, ctx: usize) {
        let ty = node.child_by_field_name("type");
        let is_extern = named_children(node).into_iter().any(|child| {
            child.kind() == "storage_class_specifier" && text(child, source) == "extern"
        });
        let context = self.contexts[ctx].clone();

        for declarator in field_children(node, "declarator") {
            if let Some(shape) = function_shape(declarator) {
                self.function(node, shape, file, source, ctx, false, None);
                continue;
            }
            if let Some((function, name)) = function_pointer(declarator) {
                let type_text = result_type(node, source);
                let declaration = join_tokens(&[
                    type_text.as_str(),
                    canonical_tokens(function, source, &[]).as_str(),
                ]);
                let name = text(name, source).to_string();
                let fact = SymbolFact {
                    kind: CallableKind::FunctionPointerVariable { declaration },
                    scope: context.scope.clone(),
                    spelling: name.clone(),
                    display_name: name,
                    result_type: type_text,
                    is_definition: !is_extern,
                    source_file: self.path_of(file),
                    translation_unit: self.translation_unit.to_path_buf(),
                };
                self.add(fact, context.class.clone(), false, 0, usize::MAX);
                continue;
            }
            if declarator.kind() == "init_declarator" {
                let name = declarator.child_by_field_name("declarator");
                let value = declarator.child_by_field_name("value");
                if let (Some(name), Some(value)) = (name, value) {
                    if name.kind() == "identifier" && value.kind() == "lambda_expression" {
                        self.lambda(
                            text(name, source),
                            value,
                            file,
                            source,
                            &context.scope,
                            &context.scope,
                            context.class.clone(),
                            false,
                        );
                        continue;
                    }
                }
            }

            // A plain variable: remember its type for receiver lookups.
            let (Some(name), Some(ty)) = (declared_name(declarator), ty) else {
                continue;
            };
            let Some(type_ref) = TypeRef::from_node(ty, source, &context.scope) else {
                continue;
            };
            let name = text(name, source).to_string();
            match &context.class {
                Some(class) => {
                    self.table
                        .classes
                        .entry(class.clone())
                        .or_default()
                        .fields
                        .insert(name, type_ref);
                }
                None => {
                    let mut qualified = context.scope.clone();
                    qualified.push(name);
                    self.table.globals.insert(qualified.join("::"), type_ref);
                }
            }
        }
    }

    fn add(
        &mut self,
        fact: SymbolFact,
        owner: Option<String>,
        local: bool,
        min_args: usize,
        max_args: usize,
    ) -> usize {
        let index = self.table.symbols.len();
        self.table
            .by_spelling
            .entry(fact.spelling.clone())
            .or_default()
            .push(index);
        self.table.symbols.push(Symbol {
            id: identity::callable_id(&fact),
            fact,
            owner,
            local,
            min_args,
            max_args,
        });
        index
    }

    fn path_of(&self, file: usize) -> PathBuf {
        self.paths[file].clone()
    }
}

fn push_children<'t>(stack: &mut Vec<(Node<'t>, usize)>, node: Node<'t>, ctx: usize) {
    stack.extend(named_children(node).into_iter().rev().map(|child| (child, ctx)));
}

/// Written result type: leading qualifiers plus the `type` field.
fn result_type(declaration: Node<'_>, source: &str) -> String {
    let Some(ty) = declaration.child_by_field_name("type") else {
        return String::new();
    };
    let mut parts: Vec<String> = named_children(declaration)
        .into_iter()
        .take_while(|child| child.id() != ty.id())
        .filter(|child| child.kind() == "type_qualifier")
        .map(|child| text(child, source).to_string())
        .collect();
    parts.push(canonical_tokens(ty, source, &[]));
    let parts: Vec<&str> = parts.iter().map(String::as_str).collect();
    join_tokens(&parts)
}

fn typed_parameters(params: &Parameters<'_>, source: &str, scope: &[String]) -> Vec<(String, TypeRef)> {
    params
        .named
        .iter()
        .filter_map(|(name, ty)| {
            TypeRef::from_node(*ty, source, scope).map(|type_ref| (name.clone(), type_ref))
        })
        .collect()
}
