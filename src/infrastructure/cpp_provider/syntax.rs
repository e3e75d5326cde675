// Small helpers over the tree-sitter-cpp syntax tree.

use tree_sitter::Node;

pub(super) fn text<'s>(node: Node<'_>, source: &'s str) -> &'s str {
    node.utf8_text(source.as_bytes()).unwrap_or("")
}

pub(super) fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor)
        .filter(|child| child.kind() != "comment")
        .collect()
}

pub(super) fn children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

pub(super) fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Leaf tokens of `node` joined canonically, skipping the subtrees whose ids are in `skip`.
pub(super) fn canonical_tokens(node: Node<'_>, source: &str, skip: &[usize]) -> String {
    let mut tokens = Vec::new();
    let mut stack = vec![node];
    while let Some(current) = stack.pop() {
        if skip.contains(&current.id()) || current.kind() == "comment" {
            continue;
        }
        if current.child_count() == 0 {
            let token = text(current, source).trim();
            if !token.is_empty() {
                tokens.push(token);
            }
            continue;
        }
        stack.extend(children(current).into_iter().rev());
    }
    join_tokens(&tokens)
}

/// Joins tokens so that equivalent spellings (`const char* s`, `const char *s`) agree.
pub(super) fn join_tokens(tokens: &[&str]) -> String {
    let mut out = String::new();
    let mut previous: Option<&str> = None;
    for &token in tokens {
        if let Some(prev) = previous {
            if needs_space(prev, token) {
                out.push(' ');
            }
        }
        out.push_str(token);
        previous = Some(token);
    }
    out
}

fn needs_space(prev: &str, next: &str) -> bool {
    const POINTERS: [&str; 3] = ["*", "&", "&&"];
    if matches!(next, "," | ")" | "]" | ">" | "::" | "<" | "[") {
        return false;
    }
    if matches!(prev, "(" | "[" | "<" | "::" | "~") {
        return false;
    }
    if prev == ")" && next == "(" {
        return false;
    }
    if POINTERS.contains(&next) && POINTERS.contains(&prev) {
        return false;
    }
    if POINTERS.contains(&prev) && !matches!(next, "const" | "volatile") {
        return false;
    }
    true
}

/// `operator ()` becomes `operator()`; word operators keep their space (`operator new[]`).
pub(super) fn operator_spelling(raw: &str) -> String {
    let rest: String = raw
        .trim_start_matches("operator")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let word = rest.chars().next().map(char::is_alphabetic).unwrap_or(false);
    if word {
        format!("operator {}", rest.replace(" [", "[").replace("[ ", "["))
    } else {
        format!("operator{}", rest.replace(' ', ""))
    }
}

pub(super) fn strip_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect()
}

/// Name of a scope component: `Foo` for `Foo<T>`, the text otherwise.
pub(super) fn scope_name(node: Node<'_>, source: &str) -> String {
    match node.kind() {
        "template_type" | "template_function" | "template_method" => node
            .child_by_field_name("name")
            .map(|name| text(name, source).to_string())
            .unwrap_or_else(|| text(node, source).to_string()),
        _ => text(node, source).to_string(),
    }
}

/// Splits `a::b::name` into its qualifiers and the final name node.
pub(super) fn split_qualified<'t>(node: Node<'t>, source: &str) -> (Vec<String>, Node<'t>) {
    let mut qualifiers = Vec::new();
    let mut current = node;
    while current.kind() == "qualified_identifier" {
        if let Some(scope) = current.child_by_field_name("scope") {
            qualifiers.push(scope_name(scope, source));
        }
        match current.child_by_field_name("name") {
            Some(name) => current = name,
            None => break,
        }
    }
    (qualifiers, current)
}

/// All components of a possibly qualified name, templates reduced to their names.
pub(super) fn qualified_parts(node: Node<'_>, source: &str) -> Vec<String> {
    let (mut parts, name) = split_qualified(node, source);
    parts.push(scope_name(name, source));
    parts
}

/// The identifier a declarator ultimately names, if any.
pub(super) fn declared_name<'t>(declarator: Node<'t>) -> Option<Node<'t>> {
    let mut current = declarator;
    loop {
        match current.kind() {
            "identifier" | "field_identifier" => return Some(current),
            "pointer_declarator" | "reference_declarator" | "array_declarator"
            | "init_declarator" | "attributed_declarator" | "function_declarator"
            | "parenthesized_declarator" => {
                current = current
                    .child_by_field_name("declarator")
                    .or_else(|| named_children(current).into_iter().next_back())?;
            }
            _ => return None,
        }
    }
}

/// Where a function declarator keeps its name and parameters.
pub(super) struct FunctionShape<'t> {
    pub name: Node<'t>,
    pub parameters: Option<Node<'t>>,
    /// Pointer and reference tokens that belong to the result type.
    pub result_suffix: Vec<&'static str>,
}

/// Finds the function a declarator declares. Function pointers are not functions.
pub(super) fn function_shape(declarator: Node<'_>) -> Option<FunctionShape<'_>> {
    let mut current = declarator;
    let mut result_suffix = Vec::new();
    loop {
        match current.kind() {
            "function_declarator" => {
                let name = current.child_by_field_name("declarator")?;
                if name.kind() == "parenthesized_declarator" {
                    return None;
                }
                return Some(FunctionShape {
                    name,
                    parameters: current.child_by_field_name("parameters"),
                    result_suffix,
                });
            }
            "operator_cast" => {
                return Some(FunctionShape {
                    name: current,
                    parameters: cast_parameters(current),
                    result_suffix,
                });
            }
            "qualified_identifier" => {
                let mut name = current;
                while name.kind() == "qualified_identifier" {
                    name = name.child_by_field_name("name")?;
                }
                if name.kind() != "operator_cast" {
                    return None;
                }
                return Some(FunctionShape {
                    name: current,
                    parameters: cast_parameters(name),
                    result_suffix,
                });
            }
            "pointer_declarator" => {
                result_suffix.push("*");
                current = current.child_by_field_name("declarator")?;
            }
            "reference_declarator" => {
                result_suffix.push("&");
                current = named_children(current).into_iter().next_back()?;
            }
            "init_declarator" | "attributed_declarator" => {
                current = current.child_by_field_name("declarator")?;
            }
            _ => return None,
        }
    }
}

fn cast_parameters(cast: Node<'_>) -> Option<Node<'_>> {
    cast.child_by_field_name("declarator")?
        .child_by_field_name("parameters")
}

/// The declarator of a function-pointer variable, without its initializer, and its name.
pub(super) fn function_pointer<'t>(declarator: Node<'t>) -> Option<(Node<'t>, Node<'t>)> {
    let function = match declarator.kind() {
        "init_declarator" => declarator.child_by_field_name("declarator")?,
        _ => declarator,
    };
    if function.kind() != "function_declarator" {
        return None;
    }
    let inner = function.child_by_field_name("declarator")?;
    if inner.kind() != "parenthesized_declarator" {
        return None;
    }
    let pointer = named_children(inner)
        .into_iter()
        .find(|child| child.kind() == "pointer_declarator")?;
    let name = declared_name(pointer)?;
    Some((function, name))
}

/// Canonical parameter types of a `parameter_list`, plus the named parameters' types.
pub(super) struct Parameters<'t> {
    pub display: Vec<String>,
    pub min: usize,
    pub max: usize,
    pub named: Vec<(String, Node<'t>)>,
}

impl Parameters<'_> {
    pub(super) fn none() -> Self {
        Parameters {
            display: Vec::new(),
            min: 0,
            max: 0,
            named: Vec::new(),
        }
    }
}

pub(super) fn parameters<'t>(list: Node<'t>, source: &str) -> Parameters<'t> {
    let mut result = Parameters::none();
    let mut variadic = false;

    for child in children(list) {
        match child.kind() {
            "..." => {
                variadic = true;
                result.display.push("...".to_string());
            }
            "parameter_declaration"
            | "optional_parameter_declaration"
            | "variadic_parameter_declaration" => {
                let name = child
                    .child_by_field_name("declarator")
                    .and_then(declared_name);
                let mut skip: Vec<usize> = name.iter().map(|n| n.id()).collect();
                let default = child.child_by_field_name("default_value");
                if let Some(default) = default {
                    skip.push(default.id());
                    skip.extend(
                        children(child)
                            .into_iter()
                            .filter(|token| token.kind() == "=")
                            .map(|token| token.id()),
                    );
                }
                result.display.push(canonical_tokens(child, source, &skip));

                if child.kind() == "variadic_parameter_declaration" {
                    variadic = true;
                } else if default.is_none() {
                    result.min += 1;
                }
                result.max += 1;

                if let (Some(name), Some(ty)) = (name, child.child_by_field_name("type")) {
                    result.named.push((text(name, source).to_string(), ty));
                }
            }
            _ => {}
        }
    }

    if result.display == ["void"] {
        return Parameters::none();
    }
    if variadic {
        result.max = usize::MAX;
    }
    result
}

/// Number of arguments in an `argument_list` or `initializer_list`.
pub(super) fn argument_count(arguments: Node<'_>) -> usize {
    named_children(arguments).len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_tokens() {
        assert_eq!(join_tokens(&["const", "char", "*"]), "const char *");
        assert_eq!(join_tokens(&["const", "X", "&"]), "const X &");
        assert_eq!(join_tokens(&["std", "::", "map", "<", "int", ",", "int", ">"]), "std::map<int, int>");
        assert_eq!(join_tokens(&["void", "(", "*", ")", "(", "int", ")"]), "void (*)(int)");
        assert_eq!(join_tokens(&["(", "*", "handler", ")", "(", "int", ")"]), "(*handler)(int)");
        assert_eq!(join_tokens(&["int", "*", "*"]), "int **");
        assert_eq!(join_tokens(&["char", "*", "const"]), "char * const");
    }

    #[test]
    fn test_operator_spelling() {
        assert_eq!(operator_spelling("operator ()"), "operator()");
        assert_eq!(operator_spelling("operator=="), "operator==");
        assert_eq!(operator_spelling("operator  new [ ]"), "operator new[]");
        assert_eq!(operator_spelling("operator delete"), "operator delete");
    }
}
