use crate::{CalleeShape, NewTarget, OracleError, SyntaxKind, SyntaxOracle};
use calltrail_core::{SyntaxNodeId, normalize_path};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tree_sitter::{Language, Parser, Tree};

/// One parsed file flattened into a pre-order node table. The tree-sitter
/// `Tree` is dropped after flattening; only coordinates, kinds, and parent
/// links survive, so no AST pointer can leak past the adapter.
pub(crate) struct FileSyntax {
    pub(crate) path: PathBuf,
    pub(crate) source: String,
    pub(crate) nodes: Vec<FlatNode>,
}

pub(crate) struct FlatNode {
    pub(crate) grammar: &'static str,
    pub(crate) kind: SyntaxKind,
    pub(crate) start_byte: usize,
    pub(crate) end_byte: usize,
    pub(crate) start_line: u32,
    pub(crate) start_col: u32,
    pub(crate) end_line: u32,
    pub(crate) parent: Option<u32>,
    pub(crate) field: Option<&'static str>,
    pub(crate) children: Vec<u32>,
}

/// [`SyntaxOracle`] over TypeScript sources. Parsing happens once at
/// construction; every query afterwards is a table lookup, which keeps
/// the traversal order identical between walks.
pub struct TreeSitterSyntaxOracle {
    files: Vec<FileSyntax>,
    by_path: HashMap<PathBuf, u32>,
}

impl TreeSitterSyntaxOracle {
    /// Parse the given `(path, source)` pairs. Files are ordered by
    /// normalized path so node ids are stable regardless of input order.
    pub fn parse(sources: Vec<(PathBuf, String)>) -> Result<Self, OracleError> {
        let language: Language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into();
        let mut parser = Parser::new();
        parser.set_language(&language)?;

        let mut sources: Vec<(PathBuf, String)> = sources
            .into_iter()
            .map(|(path, source)| (normalize_path(&path), source))
            .collect();
        sources.sort_by(|a, b| a.0.cmp(&b.0));

        let mut files = Vec::with_capacity(sources.len());
        let mut by_path = HashMap::new();
        for (path, source) in sources {
            let tree = parser
                .parse(source.as_bytes(), None)
                .ok_or_else(|| OracleError::Parse(path.clone()))?;
            let nodes = flatten(&tree);
            by_path.insert(path.clone(), files.len() as u32);
            files.push(FileSyntax {
                path,
                source,
                nodes,
            });
        }

        Ok(Self { files, by_path })
    }

    pub(crate) fn file_syntax(&self, file: u32) -> Option<&FileSyntax> {
        self.files.get(file as usize)
    }

    pub(crate) fn flat(&self, node: SyntaxNodeId) -> Option<&FlatNode> {
        self.files
            .get(node.file as usize)
            .and_then(|f| f.nodes.get(node.index as usize))
    }

    pub(crate) fn grammar(&self, node: SyntaxNodeId) -> &'static str {
        self.flat(node).map_or("", |n| n.grammar)
    }

    pub(crate) fn file_index(&self, path: &Path) -> Option<u32> {
        self.by_path.get(&normalize_path(path)).copied()
    }

    pub(crate) fn file_count(&self) -> u32 {
        self.files.len() as u32
    }

    pub(crate) fn child_by_field(
        &self,
        node: SyntaxNodeId,
        field: &str,
    ) -> Option<SyntaxNodeId> {
        let flat = self.flat(node)?;
        let file = self.files.get(node.file as usize)?;
        for &child in &flat.children {
            if let Some(candidate) = file.nodes.get(child as usize)
                && candidate.field == Some(field)
            {
                return Some(SyntaxNodeId {
                    file: node.file,
                    index: child,
                });
            }
        }
        None
    }

    pub(crate) fn children_of(&self, node: SyntaxNodeId) -> Vec<SyntaxNodeId> {
        self.flat(node)
            .map(|flat| {
                flat.children
                    .iter()
                    .map(|&index| SyntaxNodeId {
                        file: node.file,
                        index,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub(crate) fn end_line(&self, node: SyntaxNodeId) -> u32 {
        self.flat(node).map_or(0, |n| n.end_line)
    }

    fn node_text(&self, node: SyntaxNodeId) -> &str {
        let Some(file) = self.files.get(node.file as usize) else {
            return "";
        };
        let Some(flat) = file.nodes.get(node.index as usize) else {
            return "";
        };
        file.source.get(flat.start_byte..flat.end_byte).unwrap_or("")
    }
}

impl SyntaxOracle for TreeSitterSyntaxOracle {
    fn files(&self) -> Vec<PathBuf> {
        self.files.iter().map(|f| f.path.clone()).collect()
    }

    fn nodes(&self, file: &Path) -> Vec<SyntaxNodeId> {
        let Some(&file_index) = self.by_path.get(&normalize_path(file)) else {
            return Vec::new();
        };
        let count = self.files[file_index as usize].nodes.len() as u32;
        (0..count)
            .map(|index| SyntaxNodeId {
                file: file_index,
                index,
            })
            .collect()
    }

    fn classify(&self, node: SyntaxNodeId) -> SyntaxKind {
        self.flat(node).map_or(SyntaxKind::Other, |n| n.kind)
    }

    fn text(&self, node: SyntaxNodeId) -> String {
        self.node_text(node).to_string()
    }

    fn start_position(&self, node: SyntaxNodeId) -> (u32, u32) {
        self.flat(node).map_or((0, 0), |n| (n.start_line, n.start_col))
    }

    fn parent(&self, node: SyntaxNodeId) -> Option<SyntaxNodeId> {
        self.flat(node)?.parent.map(|index| SyntaxNodeId {
            file: node.file,
            index,
        })
    }

    fn enclosing_function(&self, node: SyntaxNodeId) -> Option<SyntaxNodeId> {
        let mut current = self.parent(node);
        while let Some(candidate) = current {
            if self.classify(candidate) == SyntaxKind::FunctionLike {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    fn call_callee(&self, call: SyntaxNodeId) -> Option<CalleeShape> {
        if self.classify(call) != SyntaxKind::Call {
            return None;
        }
        let callee = self.child_by_field(call, "function")?;
        match self.classify(callee) {
            SyntaxKind::Identifier => Some(CalleeShape::Identifier {
                name: self.node_text(callee).to_string(),
                node: callee,
            }),
            SyntaxKind::PropertyAccess => {
                let receiver = self.child_by_field(callee, "object")?;
                let property = self.child_by_field(callee, "property")?;
                let optional_chain = self
                    .children_of(callee)
                    .iter()
                    .any(|&child| self.grammar(child) == "optional_chain");
                Some(CalleeShape::Member {
                    receiver,
                    receiver_text: self.node_text(receiver).to_string(),
                    property: self.node_text(property).to_string(),
                    optional_chain,
                    is_this: self.classify(receiver) == SyntaxKind::This,
                })
            }
            _ => None,
        }
    }

    fn new_target(&self, new_node: SyntaxNodeId) -> Option<NewTarget> {
        if self.classify(new_node) != SyntaxKind::New {
            return None;
        }
        let constructor = self.child_by_field(new_node, "constructor")?;
        if self.classify(constructor) != SyntaxKind::Identifier {
            return None;
        }
        Some(NewTarget {
            name: self.node_text(constructor).to_string(),
            node: constructor,
        })
    }
}

fn classify_grammar(grammar: &str) -> SyntaxKind {
    match grammar {
        "call_expression" => SyntaxKind::Call,
        "new_expression" => SyntaxKind::New,
        "member_expression" => SyntaxKind::PropertyAccess,
        "identifier" | "property_identifier" | "type_identifier" => SyntaxKind::Identifier,
        "this" => SyntaxKind::This,
        "function_declaration"
        | "function_expression"
        | "function"
        | "generator_function"
        | "generator_function_declaration"
        | "arrow_function"
        | "method_definition" => SyntaxKind::FunctionLike,
        "class_declaration" | "abstract_class_declaration" | "class" => SyntaxKind::Class,
        "module" | "internal_module" => SyntaxKind::ModuleDecl,
        "import_statement" => SyntaxKind::ImportDecl,
        _ => SyntaxKind::Other,
    }
}

/// Depth-first pre-order flattening; children indices are filled in a
/// second pass so they stay in source order.
fn flatten(tree: &Tree) -> Vec<FlatNode> {
    let mut nodes: Vec<FlatNode> = Vec::new();
    let mut cursor = tree.walk();
    let mut ancestors: Vec<u32> = Vec::new();

    'walk: loop {
        let node = cursor.node();
        let index = nodes.len() as u32;
        nodes.push(FlatNode {
            grammar: node.kind(),
            kind: classify_grammar(node.kind()),
            start_byte: node.start_byte(),
            end_byte: node.end_byte(),
            start_line: node.start_position().row as u32 + 1,
            start_col: node.start_position().column as u32 + 1,
            end_line: node.end_position().row as u32 + 1,
            parent: ancestors.last().copied(),
            field: cursor.field_name(),
            children: Vec::new(),
        });

        if cursor.goto_first_child() {
            ancestors.push(index);
            continue;
        }
        loop {
            if cursor.goto_next_sibling() {
                continue 'walk;
            }
            if !cursor.goto_parent() {
                break 'walk;
            }
            ancestors.pop();
        }
    }

    for index in 0..nodes.len() {
        if let Some(parent) = nodes[index].parent {
            nodes[parent as usize].children.push(index as u32);
        }
    }
    nodes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(source: &str) -> TreeSitterSyntaxOracle {
        TreeSitterSyntaxOracle::parse(vec![(PathBuf::from("/test.ts"), source.to_string())])
            .expect("fixture parses")
    }

    fn nodes_of_kind(oracle: &TreeSitterSyntaxOracle, kind: SyntaxKind) -> Vec<SyntaxNodeId> {
        oracle
            .nodes(Path::new("/test.ts"))
            .into_iter()
            .filter(|&n| oracle.classify(n) == kind)
            .collect()
    }

    #[test]
    fn test_walk_is_deterministic() {
        let oracle = parse_one("function a() { b(); }\nfunction b() {}\n");
        let first = oracle.nodes(Path::new("/test.ts"));
        let second = oracle.nodes(Path::new("/test.ts"));
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }

    #[test]
    fn test_identifier_callee_shape() {
        let oracle = parse_one("function a() { greet(); }\nfunction greet() {}\n");
        let calls = nodes_of_kind(&oracle, SyntaxKind::Call);
        assert_eq!(calls.len(), 1);
        match oracle.call_callee(calls[0]) {
            Some(CalleeShape::Identifier { name, .. }) => assert_eq!(name, "greet"),
            other => panic!("unexpected callee shape: {other:?}"),
        }
    }

    #[test]
    fn test_member_callee_shape() {
        let oracle = parse_one("function a(d: Dog) { d.speak(); }\n");
        let calls = nodes_of_kind(&oracle, SyntaxKind::Call);
        assert_eq!(calls.len(), 1);
        match oracle.call_callee(calls[0]) {
            Some(CalleeShape::Member {
                receiver_text,
                property,
                optional_chain,
                is_this,
                ..
            }) => {
                assert_eq!(receiver_text, "d");
                assert_eq!(property, "speak");
                assert!(!optional_chain);
                assert!(!is_this);
            }
            other => panic!("unexpected callee shape: {other:?}"),
        }
    }

    #[test]
    fn test_optional_chain_flag() {
        let oracle = parse_one("function a(d: Dog) { d?.speak(); }\n");
        let calls = nodes_of_kind(&oracle, SyntaxKind::Call);
        match oracle.call_callee(calls[0]) {
            Some(CalleeShape::Member { optional_chain, .. }) => assert!(optional_chain),
            other => panic!("unexpected callee shape: {other:?}"),
        }
    }

    #[test]
    fn test_this_receiver() {
        let oracle = parse_one("class C { foo() { this.bar(); } bar() {} }\n");
        let calls = nodes_of_kind(&oracle, SyntaxKind::Call);
        assert_eq!(calls.len(), 1);
        match oracle.call_callee(calls[0]) {
            Some(CalleeShape::Member { is_this, property, .. }) => {
                assert!(is_this);
                assert_eq!(property, "bar");
            }
            other => panic!("unexpected callee shape: {other:?}"),
        }
    }

    #[test]
    fn test_new_target() {
        let oracle = parse_one("function a() { const d = new Dog(); }\nclass Dog {}\n");
        let news = nodes_of_kind(&oracle, SyntaxKind::New);
        assert_eq!(news.len(), 1);
        let target = oracle.new_target(news[0]).expect("new target");
        assert_eq!(target.name, "Dog");
    }

    #[test]
    fn test_enclosing_function() {
        let oracle = parse_one("function outer() { inner(); }\nfunction inner() {}\n");
        let calls = nodes_of_kind(&oracle, SyntaxKind::Call);
        let enclosing = oracle.enclosing_function(calls[0]).expect("enclosing fn");
        assert_eq!(oracle.classify(enclosing), SyntaxKind::FunctionLike);
        let (line, _) = oracle.start_position(enclosing);
        assert_eq!(line, 1);
    }

    #[test]
    fn test_positions_are_one_based() {
        let oracle = parse_one("function a() {}\n");
        let functions = nodes_of_kind(&oracle, SyntaxKind::FunctionLike);
        let (line, col) = oracle.start_position(functions[0]);
        assert_eq!((line, col), (1, 1));
    }

    #[test]
    fn test_unknown_file_yields_no_nodes() {
        let oracle = parse_one("function a() {}\n");
        assert!(oracle.nodes(Path::new("/missing.ts")).is_empty());
    }
}
