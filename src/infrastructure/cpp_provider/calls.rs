// Second pass: resolves the calls made inside every collected body.

use std::collections::{HashMap, HashSet};

use tree_sitter::Node;

use super::includes::SourceFile;
use super::symbols::{Body, SymbolTable, TypeRef};
use super::syntax::{
    argument_count, declared_name, field_children, named_children, operator_spelling,
    scope_name, split_qualified, strip_whitespace, text,
};
use crate::domain::callable::CallableKind;

enum Local {
    Typed(TypeRef),
    Lambda(usize),
}

/// `(caller, callee)` symbol indices in the order the calls appear.
pub(super) fn collect(table: &SymbolTable<'_>, files: &[SourceFile]) -> Vec<(usize, usize)> {
    let mut edges = Vec::new();
    for body in &table.bodies {
        let resolver = Resolver {
            table,
            body,
            source: files[body.file].text.as_str(),
            locals: body
                .parameters
                .iter()
                .map(|(name, ty)| (name.clone(), Local::Typed(ty.clone())))
                .collect(),
        };
        edges.extend(
            resolver
                .calls()
                .into_iter()
                .map(|callee| (body.symbol, callee)),
        );
    }
    edges
}

struct Resolver<'a, 't> {
    table: &'a SymbolTable<'t>,
    body: &'a Body<'t>,
    source: &'a str,
    locals: HashMap<String, Local>,
}

impl<'a, 't> Resolver<'a, 't> {
    fn calls(mut self) -> Vec<usize> {
        let mut callees = Vec::new();
        let mut stack = vec![self.body.node];

        while let Some(node) = stack.pop() {
            // Named lambdas are bodies of their own.
            if self.table.named_lambdas.contains_key(&node.id()) {
                continue;
            }
            let callee = match node.kind() {
                "call_expression" => self.call(node),
                "new_expression" => self.new_expression(node),
                "delete_expression" => self.delete_expression(node),
                "declaration" => {
                    self.declaration(node, &mut callees);
                    None
                }
                _ => None,
            };
            callees.extend(callee);
            stack.extend(named_children(node).into_iter().rev());
        }
        callees
    }

    fn call(&self, node: Node<'t>) -> Option<usize> {
        let function = node.child_by_field_name("function")?;
        let arguments = node
            .child_by_field_name("arguments")
            .map(argument_count)
            .unwrap_or(0);

        match function.kind() {
            "identifier" => self.unqualified(text(function, self.source), arguments),
            "template_function" => {
                let name = function.child_by_field_name("name")?;
                self.unqualified(text(name, self.source), arguments)
            }
            "qualified_identifier" => self.qualified(function, arguments),
            "field_expression" => {
                let receiver = function.child_by_field_name("argument")?;
                let field = function.child_by_field_name("field")?;
                let class = self.expression_class(receiver)?;
                let name = match field.kind() {
                    "destructor_name" => strip_whitespace(text(field, self.source)),
                    "operator_name" => operator_spelling(text(field, self.source)),
                    _ => scope_name(field, self.source),
                };
                self.member(&class, &name, arguments)
            }
            _ => None,
        }
    }

    fn unqualified(&self, name: &str, arguments: usize) -> Option<usize> {
        match self.locals.get(name) {
            Some(Local::Lambda(symbol)) => return Some(*symbol),
            Some(Local::Typed(_)) => return None,
            None => {}
        }
        if let Some(class) = &self.body.class {
            if let Some(found) = self.member(class, name, arguments) {
                return Some(found);
            }
        }
        if let Some(class) = self.table.resolve_class(&TypeRef::named(name, &self.body.scope)) {
            return self.constructor(&class, arguments);
        }
        self.free(name, arguments)
    }

    /// Innermost enclosing namespace first; a unique match anywhere otherwise.
    fn free(&self, name: &str, arguments: usize) -> Option<usize> {
        let candidates: Vec<usize> = self
            .table
            .named(name)
            .filter(|(_, symbol)| {
                !symbol.local && symbol.owner.is_none() && symbol.accepts(arguments)
            })
            .map(|(index, _)| index)
            .collect();

        let scope = &self.body.scope;
        for depth in (0..=scope.len()).rev() {
            if let Some(&found) = candidates
                .iter()
                .find(|&&index| self.table.symbols[index].fact.scope == scope[..depth])
            {
                return Some(found);
            }
        }

        let first = *candidates.first()?;
        let id = &self.table.symbols[first].id;
        candidates
            .iter()
            .all(|&index| &self.table.symbols[index].id == id)
            .then_some(first)
    }

    fn qualified(&self, function: Node<'t>, arguments: usize) -> Option<usize> {
        let (qualifiers, name) = split_qualified(function, self.source);
        let spelling = match name.kind() {
            "destructor_name" => strip_whitespace(text(name, self.source)),
            "operator_name" => operator_spelling(text(name, self.source)),
            _ => scope_name(name, self.source),
        };

        let scope = &self.body.scope;
        for depth in (0..=scope.len()).rev() {
            let mut prefix = scope[..depth].to_vec();
            prefix.extend(qualifiers.iter().cloned());
            let qualified = prefix.join("::");

            if self.table.classes.contains_key(&qualified) {
                if let Some(found) = self.member(&qualified, &spelling, arguments) {
                    return Some(found);
                }
            }
            let full = format!("{}::{}", qualified, spelling);
            if self.table.classes.contains_key(&full) {
                if let Some(found) = self.constructor(&full, arguments) {
                    return Some(found);
                }
            }
            let direct = self.table.named(&spelling).find(|(_, symbol)| {
                symbol.accepts(arguments)
                    && !symbol.local
                    && match &symbol.owner {
                        Some(owner) => owner == &qualified,
                        None => symbol.fact.scope == prefix,
                    }
            });
            if let Some((index, _)) = direct {
                return Some(index);
            }
        }
        None
    }

    /// Looks up a member in `class` and then its bases.
    fn member(&self, class: &str, name: &str, arguments: usize) -> Option<usize> {
        let mut visited = HashSet::new();
        let mut stack = vec![class.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let found = self.table.named(name).find(|(_, symbol)| {
                symbol.owner.as_deref() == Some(current.as_str()) && symbol.accepts(arguments)
            });
            if let Some((index, _)) = found {
                return Some(index);
            }
            if let Some(info) = self.table.classes.get(&current) {
                stack.extend(
                    info.bases
                        .iter()
                        .rev()
                        .filter_map(|base| self.table.resolve_class(base)),
                );
            }
        }
        None
    }

    fn constructor(&self, class: &str, arguments: usize) -> Option<usize> {
        let name = class.rsplit("::").next()?;
        self.table
            .named(name)
            .find(|(_, symbol)| {
                matches!(symbol.fact.kind, CallableKind::Constructor)
                    && symbol.owner.as_deref() == Some(class)
                    && symbol.accepts(arguments)
            })
            .map(|(index, _)| index)
    }

    fn new_expression(&self, node: Node<'t>) -> Option<usize> {
        let ty = node.child_by_field_name("type")?;
        let class = self
            .table
            .resolve_class(&TypeRef::from_node(ty, self.source, &self.body.scope)?)?;
        let arguments = node
            .child_by_field_name("arguments")
            .map(argument_count)
            .unwrap_or(0);
        self.constructor(&class, arguments)
    }

    fn delete_expression(&self, node: Node<'t>) -> Option<usize> {
        let operand = named_children(node).into_iter().next_back()?;
        let class = self.expression_class(operand)?;
        let name = format!("~{}", class.rsplit("::").next()?);
        self.member(&class, &name, 0)
    }

    /// Records locals and the constructor calls their declarations make.
    fn declaration(&mut self, node: Node<'t>, callees: &mut Vec<usize>) {
        let ty = node.child_by_field_name("type");
        let type_ref = ty.and_then(|ty| TypeRef::from_node(ty, self.source, &self.body.scope));
        let class = type_ref
            .as_ref()
            .and_then(|type_ref| self.table.resolve_class(type_ref));

        for declarator in field_children(node, "declarator") {
            if declarator.kind() == "init_declarator" {
                let name = declarator.child_by_field_name("declarator");
                let value = declarator.child_by_field_name("value");
                if let (Some(name), Some(value)) = (name, value) {
                    if let Some(&symbol) = self.table.named_lambdas.get(&value.id()) {
                        self.locals
                            .insert(text(name, self.source).to_string(), Local::Lambda(symbol));
                        continue;
                    }
                }
            }

            let Some(name) = declared_name(declarator) else {
                continue;
            };
            if let Some(type_ref) = &type_ref {
                self.locals.insert(
                    text(name, self.source).to_string(),
                    Local::Typed(type_ref.clone()),
                );
            }

            // Objects held by value are constructed here.
            let Some(class) = &class else {
                continue;
            };
            let arguments = match declarator.kind() {
                "identifier" => Some(0),
                "init_declarator" => declarator
                    .child_by_field_name("value")
                    .filter(|value| matches!(value.kind(), "argument_list" | "initializer_list"))
                    .map(argument_count),
                _ => None,
            };
            if let Some(arguments) = arguments {
                callees.extend(self.constructor(class, arguments));
            }
        }
    }

    /// The class an expression evaluates to, looking through pointers and smart pointers.
    fn expression_class(&self, expression: Node<'t>) -> Option<String> {
        match expression.kind() {
            "parenthesized_expression" => named_children(expression)
                .into_iter()
                .next()
                .and_then(|inner| self.expression_class(inner)),
            "pointer_expression" => self.expression_class(expression.child_by_field_name("argument")?),
            "this" => self.body.class.clone(),
            "identifier" => {
                let name = text(expression, self.source);
                if let Some(local) = self.locals.get(name) {
                    return match local {
                        Local::Typed(ty) => self.table.resolve_class(ty),
                        Local::Lambda(_) => None,
                    };
                }
                if let Some(class) = &self.body.class {
                    if let Some(ty) = self.field_type(class, name) {
                        return self.table.resolve_class(&ty);
                    }
                }
                self.global_class(&[name.to_string()])
            }
            "qualified_identifier" => {
                let (mut parts, last) = split_qualified(expression, self.source);
                parts.push(text(last, self.source).to_string());
                self.global_class(&parts)
            }
            "field_expression" => {
                let owner = self.expression_class(expression.child_by_field_name("argument")?)?;
                let field = expression.child_by_field_name("field")?;
                let ty = self.field_type(&owner, text(field, self.source))?;
                self.table.resolve_class(&ty)
            }
            _ => None,
        }
    }

    fn field_type(&self, class: &str, name: &str) -> Option<TypeRef> {
        let mut visited = HashSet::new();
        let mut stack = vec![class.to_string()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(info) = self.table.classes.get(&current) else {
                continue;
            };
            if let Some(ty) = info.fields.get(name) {
                return Some(ty.clone());
            }
            stack.extend(
                info.bases
                    .iter()
                    .rev()
                    .filter_map(|base| self.table.resolve_class(base)),
            );
        }
        None
    }

    fn global_class(&self, parts: &[String]) -> Option<String> {
        let scope = &self.body.scope;
        (0..=scope.len()).rev().find_map(|depth| {
            let mut qualified = scope[..depth].to_vec();
            qualified.extend(parts.iter().cloned());
            self.table
                .globals
                .get(&qualified.join("::"))
                .and_then(|ty| self.table.resolve_class(ty))
        })
    }
}
