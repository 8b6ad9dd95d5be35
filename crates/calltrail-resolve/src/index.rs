use calltrail_core::{CoreError, FunctionId, FunctionRecord, normalize_path};
use indexmap::IndexMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

/// Catalog of known functions. Built once per run, read-only afterwards.
///
/// Lines are expanded densely: every line in `[start_line, end_line]` maps
/// back to the function's id, which makes containment lookups O(1). When
/// functions nest, the inner one is indexed later and wins on shared
/// lines.
#[derive(Debug)]
pub struct FunctionIndex {
    by_id: IndexMap<FunctionId, FunctionRecord>,
    by_file_line: HashMap<(PathBuf, u32), FunctionId>,
    by_file_name: HashMap<(PathBuf, String), Vec<FunctionId>>,
    by_name: HashMap<String, Vec<FunctionId>>,
    constructors: HashMap<String, FunctionId>,
}

impl FunctionIndex {
    /// Fails fast on malformed records; resolution never starts over a
    /// broken catalog.
    pub fn build(records: Vec<FunctionRecord>) -> Result<Self, CoreError> {
        let mut by_id = IndexMap::with_capacity(records.len());
        let mut by_file_line = HashMap::new();
        let mut by_file_name: HashMap<(PathBuf, String), Vec<FunctionId>> = HashMap::new();
        let mut by_name: HashMap<String, Vec<FunctionId>> = HashMap::new();
        let mut constructors = HashMap::new();
        let mut start_keys: HashSet<(PathBuf, u32)> = HashSet::new();

        for mut record in records {
            record.file_path = normalize_path(&record.file_path);

            if record.end_line < record.start_line {
                return Err(CoreError::EndBeforeStart {
                    id: record.id,
                    start_line: record.start_line,
                    end_line: record.end_line,
                });
            }
            if by_id.contains_key(&record.id) {
                return Err(CoreError::DuplicateFunctionId(record.id));
            }
            if !start_keys.insert((record.file_path.clone(), record.start_line)) {
                return Err(CoreError::DuplicateFileLine {
                    file: record.file_path,
                    line: record.start_line,
                });
            }

            for line in record.start_line..=record.end_line {
                by_file_line.insert((record.file_path.clone(), line), record.id.clone());
            }
            by_file_name
                .entry((record.file_path.clone(), record.name.clone()))
                .or_default()
                .push(record.id.clone());
            by_name
                .entry(record.name.clone())
                .or_default()
                .push(record.id.clone());
            if record.is_constructor()
                && let Some(class) = &record.class_name
            {
                constructors
                    .entry(class.clone())
                    .or_insert_with(|| record.id.clone());
            }
            by_id.insert(record.id.clone(), record);
        }

        Ok(Self {
            by_id,
            by_file_line,
            by_file_name,
            by_name,
            constructors,
        })
    }

    pub fn by_id(&self, id: &FunctionId) -> Option<&FunctionRecord> {
        self.by_id.get(id)
    }

    pub fn contains(&self, id: &FunctionId) -> bool {
        self.by_id.contains_key(id)
    }

    /// The function containing the given line, innermost on overlap.
    pub fn by_file_line(&self, file: &Path, line: u32) -> Option<&FunctionId> {
        self.by_file_line.get(&(normalize_path(file), line))
    }

    /// Functions named `name` within one file, in source order.
    pub fn by_name(&self, file: &Path, name: &str) -> &[FunctionId] {
        self.by_file_name
            .get(&(normalize_path(file), name.to_string()))
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    /// Functions named `name` anywhere in the catalog, in catalog order.
    pub fn functions_named(&self, name: &str) -> &[FunctionId] {
        self.by_name
            .get(name)
            .map(|ids| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn constructor_of(&self, class: &str) -> Option<&FunctionId> {
        self.constructors.get(class)
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(
        name: &str,
        class: Option<&str>,
        file: &str,
        start: u32,
        end: u32,
    ) -> FunctionRecord {
        FunctionRecord::new(
            name,
            class.map(str::to_string),
            file,
            start,
            end,
            name,
            "snap-1",
        )
    }

    #[test]
    fn test_by_file_line_is_dense() {
        let index =
            FunctionIndex::build(vec![record("feed", None, "/zoo.ts", 5, 9)]).unwrap();
        let id = index.by_file_line(Path::new("/zoo.ts"), 7).unwrap();
        assert_eq!(index.by_id(id).unwrap().name, "feed");
        assert!(index.by_file_line(Path::new("/zoo.ts"), 4).is_none());
        assert!(index.by_file_line(Path::new("/zoo.ts"), 10).is_none());
    }

    #[test]
    fn test_inner_function_wins_on_shared_lines() {
        let outer = record("outer", None, "/zoo.ts", 1, 10);
        let inner = record("inner", None, "/zoo.ts", 3, 5);
        let index = FunctionIndex::build(vec![outer, inner]).unwrap();

        let at_4 = index.by_file_line(Path::new("/zoo.ts"), 4).unwrap();
        assert_eq!(index.by_id(at_4).unwrap().name, "inner");
        let at_8 = index.by_file_line(Path::new("/zoo.ts"), 8).unwrap();
        assert_eq!(index.by_id(at_8).unwrap().name, "outer");
    }

    #[test]
    fn test_end_before_start_fails_fast() {
        let broken = record("broken", None, "/zoo.ts", 9, 5);
        match FunctionIndex::build(vec![broken]) {
            Err(CoreError::EndBeforeStart { start_line, end_line, .. }) => {
                assert_eq!((start_line, end_line), (9, 5));
            }
            other => panic!("expected EndBeforeStart, got {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_id_fails_fast() {
        let a = record("feed", None, "/zoo.ts", 1, 2);
        let b = a.clone();
        assert!(matches!(
            FunctionIndex::build(vec![a, b]),
            Err(CoreError::DuplicateFileLine { .. }) | Err(CoreError::DuplicateFunctionId(_))
        ));
    }

    #[test]
    fn test_duplicate_start_line_fails_fast() {
        let a = record("feed", None, "/zoo.ts", 1, 2);
        let b = record("walk", None, "/zoo.ts", 1, 3);
        assert!(matches!(
            FunctionIndex::build(vec![a, b]),
            Err(CoreError::DuplicateFileLine { .. })
        ));
    }

    #[test]
    fn test_path_normalization_unifies_keys() {
        let index =
            FunctionIndex::build(vec![record("feed", None, "/a/b/../zoo.ts", 1, 3)]).unwrap();
        assert!(index.by_file_line(Path::new("/a/zoo.ts"), 2).is_some());
        assert_eq!(index.by_name(Path::new("/a/zoo.ts"), "feed").len(), 1);
    }

    #[test]
    fn test_constructor_lookup() {
        let index = FunctionIndex::build(vec![
            record("constructor", Some("Dog"), "/zoo.ts", 2, 4),
            record("speak", Some("Dog"), "/zoo.ts", 5, 7),
        ])
        .unwrap();
        let ctor = index.constructor_of("Dog").unwrap();
        assert_eq!(index.by_id(ctor).unwrap().start_line, 2);
        assert!(index.constructor_of("Cat").is_none());
    }

    #[test]
    fn test_global_name_lookup_spans_files() {
        let index = FunctionIndex::build(vec![
            record("speak", Some("Dog"), "/dog.ts", 2, 4),
            record("speak", Some("Cat"), "/cat.ts", 2, 4),
        ])
        .unwrap();
        assert_eq!(index.functions_named("speak").len(), 2);
        assert_eq!(index.by_name(Path::new("/dog.ts"), "speak").len(), 1);
    }
}
