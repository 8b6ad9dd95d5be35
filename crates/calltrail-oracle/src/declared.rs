use crate::syntax::TreeSitterSyntaxOracle;
use crate::{DeclSite, OracleError, SymbolInfo, SyntaxKind, SyntaxOracle, TypeOracle};
use calltrail_core::{SyntaxNodeId, normalize_path};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

struct ImportBinding {
    specifier: String,
    target: Option<DeclSite>,
}

#[derive(Default)]
struct FileBindings {
    /// local name → import that binds it
    imports: HashMap<String, ImportBinding>,
    /// variable/parameter/field name → declared type text
    var_types: HashMap<String, String>,
    /// same-file function/class/interface declarations, name → start line
    decls: HashMap<String, u32>,
}

/// [`TypeOracle`] derived from declaration syntax: import bindings, type
/// annotations, and `new T()` initializers. The builtin-module list is
/// configuration, never baked in.
pub struct DeclaredTypeOracle {
    syntax: Arc<TreeSitterSyntaxOracle>,
    builtins: HashSet<String>,
    files: Vec<FileBindings>,
    cache: RwLock<HashMap<SyntaxNodeId, Option<SymbolInfo>>>,
}

impl DeclaredTypeOracle {
    pub fn build(syntax: Arc<TreeSitterSyntaxOracle>, builtins: HashSet<String>) -> Self {
        let file_count = syntax.file_count();

        // Declaration tables first, so import targets can point into any
        // file regardless of build order.
        let mut decl_tables: Vec<HashMap<String, u32>> = Vec::with_capacity(file_count as usize);
        for file in 0..file_count {
            decl_tables.push(collect_declarations(&syntax, file));
        }

        let mut files = Vec::with_capacity(file_count as usize);
        for file in 0..file_count {
            let imports = collect_imports(&syntax, file, &decl_tables);
            let var_types = collect_var_types(&syntax, file);
            files.push(FileBindings {
                imports,
                var_types,
                decls: decl_tables[file as usize].clone(),
            });
        }

        Self {
            syntax,
            builtins,
            files,
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl TypeOracle for DeclaredTypeOracle {
    fn lookup_symbol(&self, node: SyntaxNodeId) -> Result<Option<SymbolInfo>, OracleError> {
        if let Some(hit) = self.cache.read().get(&node) {
            return Ok(hit.clone());
        }

        let name = self.syntax.text(node);
        let info = self
            .files
            .get(node.file as usize)
            .and_then(|bindings| resolve_name(&self.syntax, node.file, bindings, &name));

        self.cache.write().insert(node, info.clone());
        Ok(info)
    }

    fn declared_type_text(&self, node: SyntaxNodeId) -> Result<Option<String>, OracleError> {
        if self.syntax.classify(node) != SyntaxKind::Identifier {
            return Ok(None);
        }
        let name = self.syntax.text(node);
        Ok(self
            .files
            .get(node.file as usize)
            .and_then(|bindings| bindings.var_types.get(&name).cloned()))
    }

    fn is_builtin_module(&self, specifier: &str) -> bool {
        self.builtins.contains(specifier)
    }

    fn clear_cache(&self) {
        self.cache.write().clear();
    }
}

fn resolve_name(
    syntax: &TreeSitterSyntaxOracle,
    file: u32,
    bindings: &FileBindings,
    name: &str,
) -> Option<SymbolInfo> {
    if let Some(binding) = bindings.imports.get(name) {
        return Some(SymbolInfo {
            declarations: binding.target.clone().into_iter().collect(),
            module_specifier: Some(binding.specifier.clone()),
        });
    }
    if let Some(&line) = bindings.decls.get(name) {
        let path = syntax.file_syntax(file)?.path.clone();
        return Some(SymbolInfo {
            declarations: vec![DeclSite { file: path, line }],
            module_specifier: None,
        });
    }
    if bindings.var_types.contains_key(name) {
        // A local variable: known, but it declares nothing callable.
        return Some(SymbolInfo {
            declarations: Vec::new(),
            module_specifier: None,
        });
    }
    None
}

fn descendants(syntax: &TreeSitterSyntaxOracle, root: SyntaxNodeId) -> Vec<SyntaxNodeId> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let children = syntax.children_of(node);
        for &child in children.iter().rev() {
            stack.push(child);
        }
        out.extend(children);
    }
    out
}

fn collect_declarations(syntax: &TreeSitterSyntaxOracle, file: u32) -> HashMap<String, u32> {
    let mut decls = HashMap::new();
    let Some(file_syntax) = syntax.file_syntax(file) else {
        return decls;
    };
    let path = file_syntax.path.clone();
    for node in syntax.nodes(&path) {
        let grammar = syntax.grammar(node);
        let declares = matches!(
            grammar,
            "function_declaration"
                | "generator_function_declaration"
                | "class_declaration"
                | "abstract_class_declaration"
                | "interface_declaration"
        );
        if !declares {
            continue;
        }
        if let Some(name_node) = syntax.child_by_field(node, "name") {
            let name = syntax.text(name_node);
            let (line, _) = syntax.start_position(node);
            decls.entry(name).or_insert(line);
        }
    }
    decls
}

fn collect_imports(
    syntax: &TreeSitterSyntaxOracle,
    file: u32,
    decl_tables: &[HashMap<String, u32>],
) -> HashMap<String, ImportBinding> {
    let mut imports = HashMap::new();
    let Some(file_syntax) = syntax.file_syntax(file) else {
        return imports;
    };
    let path = file_syntax.path.clone();

    for node in syntax.nodes(&path) {
        if syntax.classify(node) != SyntaxKind::ImportDecl {
            continue;
        }
        let Some(source_node) = syntax.child_by_field(node, "source") else {
            continue;
        };
        let specifier = syntax
            .text(source_node)
            .trim_matches(|c| c == '"' || c == '\'')
            .to_string();
        let target_file = resolve_specifier(syntax, &path, &specifier);

        for descendant in descendants(syntax, node) {
            match syntax.grammar(descendant) {
                "import_specifier" => {
                    let Some(name_node) = syntax.child_by_field(descendant, "name") else {
                        continue;
                    };
                    let imported = syntax.text(name_node);
                    let local = syntax
                        .child_by_field(descendant, "alias")
                        .map(|alias| syntax.text(alias))
                        .unwrap_or_else(|| imported.clone());
                    let target = lookup_target(syntax, decl_tables, target_file, &imported);
                    imports.insert(
                        local,
                        ImportBinding {
                            specifier: specifier.clone(),
                            target,
                        },
                    );
                }
                "namespace_import" => {
                    for child in syntax.children_of(descendant) {
                        if syntax.grammar(child) == "identifier" {
                            imports.insert(
                                syntax.text(child),
                                ImportBinding {
                                    specifier: specifier.clone(),
                                    target: None,
                                },
                            );
                        }
                    }
                }
                "import_clause" => {
                    // A default import binds a bare identifier directly
                    // under the clause.
                    for child in syntax.children_of(descendant) {
                        if syntax.grammar(child) == "identifier" {
                            let local = syntax.text(child);
                            let target =
                                lookup_target(syntax, decl_tables, target_file, &local);
                            imports.insert(
                                local,
                                ImportBinding {
                                    specifier: specifier.clone(),
                                    target,
                                },
                            );
                        }
                    }
                }
                _ => {}
            }
        }
    }
    imports
}

fn lookup_target(
    syntax: &TreeSitterSyntaxOracle,
    decl_tables: &[HashMap<String, u32>],
    target_file: Option<u32>,
    imported: &str,
) -> Option<DeclSite> {
    let file = target_file?;
    let line = *decl_tables.get(file as usize)?.get(imported)?;
    Some(DeclSite {
        file: syntax.file_syntax(file)?.path.clone(),
        line,
    })
}

/// Relative specifiers resolve against the importing file's directory,
/// trying the bare path, `.ts`, and `/index.ts`. Anything else (packages,
/// builtins) stays unresolved and is judged by the builtin list alone.
fn resolve_specifier(
    syntax: &TreeSitterSyntaxOracle,
    importer: &PathBuf,
    specifier: &str,
) -> Option<u32> {
    if !specifier.starts_with('.') {
        return None;
    }
    let base = importer.parent()?;
    let joined = normalize_path(&base.join(specifier));

    let mut candidates = vec![joined.clone()];
    if joined.extension().is_none() {
        let mut with_ext = joined.clone().into_os_string();
        with_ext.push(".ts");
        candidates.push(PathBuf::from(with_ext));
        candidates.push(joined.join("index.ts"));
    }

    for candidate in &candidates {
        if let Some(index) = syntax.file_index(candidate) {
            return Some(index);
        }
    }
    debug!(specifier, importer = %importer.display(), "unresolved module specifier");
    None
}

fn collect_var_types(syntax: &TreeSitterSyntaxOracle, file: u32) -> HashMap<String, String> {
    let mut var_types = HashMap::new();
    let Some(file_syntax) = syntax.file_syntax(file) else {
        return var_types;
    };
    let path = file_syntax.path.clone();

    for node in syntax.nodes(&path) {
        match syntax.grammar(node) {
            "variable_declarator" => {
                let Some(name_node) = syntax.child_by_field(node, "name") else {
                    continue;
                };
                if syntax.grammar(name_node) != "identifier" {
                    continue;
                }
                let name = syntax.text(name_node);
                if let Some(declared) = annotation_text(syntax, node) {
                    var_types.insert(name, declared);
                } else if let Some(value) = syntax.child_by_field(node, "value")
                    && let Some(target) = syntax.new_target(value)
                {
                    var_types.insert(name, target.name);
                }
            }
            "required_parameter" | "optional_parameter" => {
                let Some(pattern) = syntax.child_by_field(node, "pattern") else {
                    continue;
                };
                if syntax.grammar(pattern) != "identifier" && syntax.grammar(pattern) != "this" {
                    continue;
                }
                if let Some(declared) = annotation_text(syntax, node) {
                    var_types.insert(syntax.text(pattern), declared);
                }
            }
            "public_field_definition" => {
                let Some(name_node) = syntax.child_by_field(node, "name") else {
                    continue;
                };
                if let Some(declared) = annotation_text(syntax, node) {
                    var_types.insert(syntax.text(name_node), declared);
                }
            }
            _ => {}
        }
    }
    var_types
}

fn annotation_text(syntax: &TreeSitterSyntaxOracle, node: SyntaxNodeId) -> Option<String> {
    let annotation = syntax.child_by_field(node, "type")?;
    let text = syntax.text(annotation);
    let declared = text.trim_start_matches(':').trim().to_string();
    if declared.is_empty() { None } else { Some(declared) }
}
