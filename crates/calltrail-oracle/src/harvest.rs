use crate::hierarchy::ClassHierarchy;
use crate::syntax::TreeSitterSyntaxOracle;
use crate::{SyntaxKind, SyntaxOracle};
use calltrail_core::{FunctionRecord, SyntaxNodeId};
use std::collections::HashSet;
use tracing::debug;

/// Build the function catalog from parsed sources: one record per named
/// function-like node, with its enclosing class and dotted lexical path.
/// Emission is pre-order per file, so when functions nest the outer record
/// comes first and the index's per-line map lets the inner one win on
/// shared lines.
pub fn harvest_functions(syntax: &TreeSitterSyntaxOracle, snapshot: &str) -> Vec<FunctionRecord> {
    let mut records = Vec::new();
    let mut seen_starts: HashSet<(u32, u32)> = HashSet::new();

    for (file_index, path) in syntax.files().into_iter().enumerate() {
        for node in syntax.nodes(&path) {
            if syntax.classify(node) != SyntaxKind::FunctionLike {
                continue;
            }
            let Some((name, is_method)) = function_name(syntax, node) else {
                continue;
            };
            let (start_line, _) = syntax.start_position(node);
            if !seen_starts.insert((file_index as u32, start_line)) {
                debug!(file = %path.display(), start_line, name = %name, "skipping same-line function");
                continue;
            }
            let class_name = if is_method {
                enclosing_class_name(syntax, node)
            } else {
                None
            };
            let lexical_path = lexical_path(syntax, node, &name);
            records.push(FunctionRecord::new(
                name,
                class_name,
                &path,
                start_line,
                syntax.end_line(node),
                lexical_path,
                snapshot,
            ));
        }
    }
    records
}

/// Collect `extends`/`implements` clauses, abstract markers, and interface
/// declarations into a [`ClassHierarchy`].
pub fn harvest_hierarchy(syntax: &TreeSitterSyntaxOracle) -> ClassHierarchy {
    let mut hierarchy = ClassHierarchy::new();

    for path in syntax.files() {
        for node in syntax.nodes(&path) {
            match syntax.grammar(node) {
                "class_declaration" | "abstract_class_declaration" | "class" => {
                    let Some(name_node) = syntax.child_by_field(node, "name") else {
                        continue;
                    };
                    let name = syntax.text(name_node);
                    let is_abstract = syntax.grammar(node) == "abstract_class_declaration";
                    hierarchy.add_class(name.clone(), is_abstract);

                    for child in syntax.children_of(node) {
                        if syntax.grammar(child) != "class_heritage" {
                            continue;
                        }
                        for clause in syntax.children_of(child) {
                            match syntax.grammar(clause) {
                                "extends_clause" => {
                                    for parent in type_names(syntax, clause) {
                                        hierarchy.add_extends(name.clone(), parent);
                                    }
                                }
                                "implements_clause" => {
                                    for interface in type_names(syntax, clause) {
                                        hierarchy.add_implements(name.clone(), interface);
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                }
                "interface_declaration" => {
                    let Some(name_node) = syntax.child_by_field(node, "name") else {
                        continue;
                    };
                    let name = syntax.text(name_node);
                    hierarchy.add_interface(name.clone());
                    for child in syntax.children_of(node) {
                        if syntax.grammar(child) == "extends_type_clause" {
                            for parent in type_names(syntax, child) {
                                hierarchy.add_extends(name.clone(), parent);
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }
    hierarchy
}

fn type_names(syntax: &TreeSitterSyntaxOracle, clause: SyntaxNodeId) -> Vec<String> {
    syntax
        .children_of(clause)
        .into_iter()
        .filter(|&child| {
            matches!(syntax.grammar(child), "identifier" | "type_identifier")
        })
        .map(|child| syntax.text(child))
        .collect()
}

fn function_name(
    syntax: &TreeSitterSyntaxOracle,
    node: SyntaxNodeId,
) -> Option<(String, bool)> {
    match syntax.grammar(node) {
        "function_declaration" | "generator_function_declaration" => {
            let name = syntax.child_by_field(node, "name")?;
            Some((syntax.text(name), false))
        }
        "method_definition" => {
            let name = syntax.child_by_field(node, "name")?;
            Some((syntax.text(name), true))
        }
        "arrow_function" | "function_expression" | "function" | "generator_function" => {
            let parent = syntax.parent(node)?;
            match syntax.grammar(parent) {
                "variable_declarator" => {
                    let name = syntax.child_by_field(parent, "name")?;
                    if syntax.grammar(name) != "identifier" {
                        return None;
                    }
                    Some((syntax.text(name), false))
                }
                "public_field_definition" => {
                    let name = syntax.child_by_field(parent, "name")?;
                    Some((syntax.text(name), true))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

fn enclosing_class_name(
    syntax: &TreeSitterSyntaxOracle,
    node: SyntaxNodeId,
) -> Option<String> {
    let mut current = syntax.parent(node);
    while let Some(candidate) = current {
        if syntax.classify(candidate) == SyntaxKind::Class {
            return syntax
                .child_by_field(candidate, "name")
                .map(|name| syntax.text(name));
        }
        current = syntax.parent(candidate);
    }
    None
}

/// Dotted qualifier unique within the file: enclosing classes and named
/// functions from the outside in, ending with the function's own name.
fn lexical_path(syntax: &TreeSitterSyntaxOracle, node: SyntaxNodeId, name: &str) -> String {
    let mut segments = Vec::new();
    let mut current = syntax.parent(node);
    while let Some(candidate) = current {
        match syntax.classify(candidate) {
            SyntaxKind::FunctionLike => {
                if let Some((ancestor_name, _)) = function_name(syntax, candidate) {
                    segments.push(ancestor_name);
                }
            }
            SyntaxKind::Class => {
                if let Some(name_node) = syntax.child_by_field(candidate, "name") {
                    segments.push(syntax.text(name_node));
                }
            }
            _ => {}
        }
        current = syntax.parent(candidate);
    }
    segments.reverse();
    segments.push(name.to_string());
    segments.join(".")
}
