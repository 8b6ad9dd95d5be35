use crate::{FunctionId, normalize_path, stable_digest};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// One entry of the pre-extracted function catalog. Immutable after
/// indexing: every field participates in the stable id, so a record that
/// moves or is renamed becomes a different function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub id: FunctionId,
    pub name: String,
    /// Enclosing class, when the function is a method or constructor.
    pub class_name: Option<String>,
    pub file_path: PathBuf,
    /// 1-based, inclusive on both ends.
    pub start_line: u32,
    pub end_line: u32,
    /// Dotted qualifier unique within the file, e.g. `Zoo.feed` or
    /// `outer.inner`.
    pub lexical_path: String,
}

impl FunctionRecord {
    pub fn new(
        name: impl Into<String>,
        class_name: Option<String>,
        file_path: impl AsRef<Path>,
        start_line: u32,
        end_line: u32,
        lexical_path: impl Into<String>,
        snapshot: &str,
    ) -> Self {
        let name = name.into();
        let file_path = normalize_path(file_path.as_ref());
        let id = Self::stable_id(&file_path, start_line, &name, class_name.as_deref(), snapshot);
        Self {
            id,
            name,
            class_name,
            file_path,
            start_line,
            end_line,
            lexical_path: lexical_path.into(),
        }
    }

    /// Identity hash over `(file path, start line, name, class qualifier,
    /// snapshot tag)`.
    pub fn stable_id(
        file_path: &Path,
        start_line: u32,
        name: &str,
        class_name: Option<&str>,
        snapshot: &str,
    ) -> FunctionId {
        let file_path = normalize_path(file_path);
        let line = start_line.to_string();
        FunctionId(stable_digest(&[
            file_path.to_string_lossy().as_bytes(),
            line.as_bytes(),
            name.as_bytes(),
            class_name.unwrap_or("").as_bytes(),
            snapshot.as_bytes(),
        ]))
    }

    pub fn is_method(&self) -> bool {
        self.class_name.is_some()
    }

    pub fn is_constructor(&self) -> bool {
        self.class_name.is_some() && self.name == "constructor"
    }

    pub fn contains_line(&self, line: u32) -> bool {
        line >= self.start_line && line <= self.end_line
    }
}
