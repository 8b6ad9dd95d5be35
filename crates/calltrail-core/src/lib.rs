use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};

pub mod edge;
pub mod error;
pub mod function;
pub mod policy;
pub mod site;
pub mod stats;

pub use edge::{CallEdge, CallKind};
pub use error::CoreError;
pub use function::FunctionRecord;
pub use policy::ConfidencePolicy;
pub use site::{InstantiationEvent, InstantiationKind, UnresolvedCall};
pub use stats::{AnalysisStats, MethodReduction, PassTelemetry, StrategyCounters};

/// Stable identifier of a function record. Derived from the record's
/// identity tuple, so the same function in the same snapshot always gets
/// the same id across runs and platforms.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FunctionId(pub String);

impl fmt::Display for FunctionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub String);

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Coordinates of a syntax node inside the per-run node tables:
/// `(file index, pre-order index)`. AST pointers never cross a stage
/// boundary; this pair is all the ledger is allowed to remember about a
/// call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyntaxNodeId {
    pub file: u32,
    pub index: u32,
}

/// The five resolution stages, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassId {
    Local,
    Import,
    Cha,
    Rta,
    Runtime,
}

impl fmt::Display for PassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Import => write!(f, "import"),
            Self::Cha => write!(f, "cha"),
            Self::Rta => write!(f, "rta"),
            Self::Runtime => write!(f, "runtime"),
        }
    }
}

/// How far along the pipeline an edge got before it was accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResolutionLevel {
    LocalExact,
    ImportExact,
    ChaResolved,
    RtaResolved,
    RuntimeConfirmed,
}

impl ResolutionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalExact => "local_exact",
            Self::ImportExact => "import_exact",
            Self::ChaResolved => "cha_resolved",
            Self::RtaResolved => "rta_resolved",
            Self::RuntimeConfirmed => "runtime_confirmed",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "local_exact" => Some(Self::LocalExact),
            "import_exact" => Some(Self::ImportExact),
            "cha_resolved" => Some(Self::ChaResolved),
            "rta_resolved" => Some(Self::RtaResolved),
            "runtime_confirmed" => Some(Self::RuntimeConfirmed),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Finer-grained tag recording which rule inside a stage produced the edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ResolutionSource {
    SameFileFunction,
    SameFileConstructor,
    SameClassThis,
    ImportedFunction,
    ImportedConstructor,
    ImportedProperty,
    HierarchyReceiver,
    HierarchyNameOnly,
    InstantiatedReceiver,
    TraceOverlay,
}

impl ResolutionSource {
    pub fn level(&self) -> ResolutionLevel {
        match self {
            Self::SameFileFunction | Self::SameFileConstructor | Self::SameClassThis => {
                ResolutionLevel::LocalExact
            }
            Self::ImportedFunction | Self::ImportedConstructor | Self::ImportedProperty => {
                ResolutionLevel::ImportExact
            }
            Self::HierarchyReceiver | Self::HierarchyNameOnly => ResolutionLevel::ChaResolved,
            Self::InstantiatedReceiver => ResolutionLevel::RtaResolved,
            Self::TraceOverlay => ResolutionLevel::RuntimeConfirmed,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SameFileFunction => "same_file_function",
            Self::SameFileConstructor => "same_file_constructor",
            Self::SameClassThis => "same_class_this",
            Self::ImportedFunction => "imported_function",
            Self::ImportedConstructor => "imported_constructor",
            Self::ImportedProperty => "imported_property",
            Self::HierarchyReceiver => "hierarchy_receiver",
            Self::HierarchyNameOnly => "hierarchy_name_only",
            Self::InstantiatedReceiver => "instantiated_receiver",
            Self::TraceOverlay => "trace_overlay",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "same_file_function" => Some(Self::SameFileFunction),
            "same_file_constructor" => Some(Self::SameFileConstructor),
            "same_class_this" => Some(Self::SameClassThis),
            "imported_function" => Some(Self::ImportedFunction),
            "imported_constructor" => Some(Self::ImportedConstructor),
            "imported_property" => Some(Self::ImportedProperty),
            "hierarchy_receiver" => Some(Self::HierarchyReceiver),
            "hierarchy_name_only" => Some(Self::HierarchyNameOnly),
            "instantiated_receiver" => Some(Self::InstantiatedReceiver),
            "trace_overlay" => Some(Self::TraceOverlay),
            _ => None,
        }
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lexical path normalization: absolute where possible, `.`/`..` folded.
/// Lookups and record construction both go through this so the same
/// physical file yields one and only one key.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    normalized
}

fn digest(parts: &[&[u8]]) -> String {
    let mut hasher = blake3::Hasher::new();
    for part in parts {
        hasher.update(part);
        hasher.update(&[0x1f]);
    }
    hasher.finalize().to_hex()[..32].to_string()
}

/// Hash of a caller file's identity within a snapshot, carried on every
/// edge so consumers can invalidate edges when the file changes between
/// snapshots.
pub fn origin_file_hash(file: &Path, snapshot: &str) -> String {
    let file = normalize_path(file);
    digest(&[file.to_string_lossy().as_bytes(), snapshot.as_bytes()])
}

pub(crate) fn stable_digest(parts: &[&[u8]]) -> String {
    digest(parts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_folds_dot_segments() {
        let normalized = normalize_path(Path::new("/src/app/../lib/./zoo.ts"));
        assert_eq!(normalized, PathBuf::from("/src/lib/zoo.ts"));
    }

    #[test]
    fn test_normalize_path_is_idempotent() {
        let once = normalize_path(Path::new("/a/b/../c.ts"));
        let twice = normalize_path(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_origin_file_hash_stable() {
        let a = origin_file_hash(Path::new("/src/zoo.ts"), "snap-1");
        let b = origin_file_hash(Path::new("/src/zoo.ts"), "snap-1");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);

        let other_snapshot = origin_file_hash(Path::new("/src/zoo.ts"), "snap-2");
        assert_ne!(a, other_snapshot);
    }

    #[test]
    fn test_resolution_source_maps_to_level() {
        assert_eq!(
            ResolutionSource::SameClassThis.level(),
            ResolutionLevel::LocalExact
        );
        assert_eq!(
            ResolutionSource::HierarchyReceiver.level(),
            ResolutionLevel::ChaResolved
        );
        assert_eq!(
            ResolutionSource::InstantiatedReceiver.level(),
            ResolutionLevel::RtaResolved
        );
    }

    #[test]
    fn test_level_round_trips_through_str() {
        for level in [
            ResolutionLevel::LocalExact,
            ResolutionLevel::ImportExact,
            ResolutionLevel::ChaResolved,
            ResolutionLevel::RtaResolved,
            ResolutionLevel::RuntimeConfirmed,
        ] {
            assert_eq!(ResolutionLevel::from_str(level.as_str()), Some(level));
        }
    }
}
