use calltrail_core::SyntaxNodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub mod declared;
pub mod harvest;
pub mod hierarchy;
pub mod syntax;

pub use declared::DeclaredTypeOracle;
pub use harvest::{harvest_functions, harvest_hierarchy};
pub use hierarchy::ClassHierarchy;
pub use syntax::TreeSitterSyntaxOracle;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("grammar rejected by tree-sitter: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("failed to parse {0}")]
    Parse(PathBuf),

    #[error("type query failed: {0}")]
    Lookup(String),
}

/// Coarse node classification the resolver works with. Grammar-specific
/// node kinds stay inside the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyntaxKind {
    Call,
    New,
    PropertyAccess,
    Identifier,
    This,
    FunctionLike,
    Class,
    ModuleDecl,
    ImportDecl,
    Other,
}

/// Shape of a call expression's callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalleeShape {
    /// `f(...)`
    Identifier { name: String, node: SyntaxNodeId },
    /// `obj.method(...)`, `this.method(...)`, `obj?.method(...)`
    Member {
        receiver: SyntaxNodeId,
        receiver_text: String,
        property: String,
        optional_chain: bool,
        is_this: bool,
    },
}

/// The class named in a `new T(...)` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTarget {
    pub name: String,
    pub node: SyntaxNodeId,
}

/// Where a symbol is declared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclSite {
    pub file: PathBuf,
    pub line: u32,
}

/// What the type oracle knows about an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolInfo {
    /// Declaration locations, possibly empty when the symbol is known but
    /// its target file is outside the analyzed set.
    pub declarations: Vec<DeclSite>,
    /// The module specifier of the import that binds the symbol. `None`
    /// for symbols declared locally (variables, same-file declarations).
    pub module_specifier: Option<String>,
}

impl SymbolInfo {
    pub fn is_imported(&self) -> bool {
        self.module_specifier.is_some()
    }
}

/// Read-only AST traversal capability. Traversal is pre-order and
/// deterministic: two walks of the same file produce identical node
/// streams.
pub trait SyntaxOracle {
    fn files(&self) -> Vec<PathBuf>;
    /// All nodes of the file in pre-order.
    fn nodes(&self, file: &Path) -> Vec<SyntaxNodeId>;
    fn classify(&self, node: SyntaxNodeId) -> SyntaxKind;
    fn text(&self, node: SyntaxNodeId) -> String;
    /// 1-based `(line, column)`.
    fn start_position(&self, node: SyntaxNodeId) -> (u32, u32);
    fn parent(&self, node: SyntaxNodeId) -> Option<SyntaxNodeId>;
    /// Nearest function-like ancestor, the syntactic caller of a site.
    fn enclosing_function(&self, node: SyntaxNodeId) -> Option<SyntaxNodeId>;
    fn call_callee(&self, call: SyntaxNodeId) -> Option<CalleeShape>;
    fn new_target(&self, new_node: SyntaxNodeId) -> Option<NewTarget>;
}

/// Symbol lookup and declared-type queries. Implementations cache symbol
/// lookups per node; the coordinator clears the cache between runs.
pub trait TypeOracle {
    fn lookup_symbol(&self, node: SyntaxNodeId) -> Result<Option<SymbolInfo>, OracleError>;
    /// Text form of the declared type of an expression node.
    fn declared_type_text(&self, node: SyntaxNodeId) -> Result<Option<String>, OracleError>;
    fn is_builtin_module(&self, specifier: &str) -> bool;
    fn clear_cache(&self);
}

static TYPE_NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Z][A-Za-z0-9_]*").unwrap());

/// Extract the simple type name from a declared-type text: the trailing
/// capitalized identifier (`Promise<Dog>` → `Dog`, `Dog[]` → `Dog`),
/// falling back to the whole text when nothing matches.
pub fn receiver_type_name(declared: &str) -> Option<String> {
    let trimmed = declared.trim();
    if trimmed.is_empty() {
        return None;
    }
    TYPE_NAME_RE
        .find_iter(trimmed)
        .last()
        .map(|m| m.as_str().to_string())
        .or_else(|| Some(trimmed.to_string()))
}
