use calltrail_core::{
    CallEdge, CallKind, EdgeId, FunctionId, FunctionRecord, ResolutionLevel, ResolutionSource,
};
use rusqlite::{Connection, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

mod schema;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt column {column}: {reason}")]
    Corrupt { column: &'static str, reason: String },
}

/// SQLite persistence for analysis output: the `edge` and
/// `function_index` relations, both keyed by snapshot. Hosts that do not
/// persist simply never construct one of these.
pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let _ = conn.busy_timeout(Duration::from_millis(2_500));
        let _ = conn.pragma_update(None, "journal_mode", "WAL");
        let _ = conn.pragma_update(None, "synchronous", "NORMAL");
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let storage = Self { conn };
        storage.init()?;
        Ok(storage)
    }

    fn init(&self) -> Result<(), StorageError> {
        schema::create_tables(&self.conn)?;
        schema::create_indexes(&self.conn)
    }

    pub fn insert_functions_batch(
        &mut self,
        snapshot: &str,
        functions: &[FunctionRecord],
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO function_index
                 (function_id, snapshot_id, name, class, file_path, start_line, end_line, lexical_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for function in functions {
                stmt.execute(params![
                    function.id.0,
                    snapshot,
                    function.name,
                    function.class_name,
                    function.file_path.to_string_lossy(),
                    function.start_line,
                    function.end_line,
                    function.lexical_path,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn insert_edges_batch(
        &mut self,
        snapshot: &str,
        edges: &[CallEdge],
    ) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO edge
                 (edge_id, snapshot_id, caller_id, callee_id, callee_name, callee_class,
                  call_line, call_column, call_kind, optional_chaining, conf, res_level,
                  res_source, runtime_confirmed, candidates, origin_file_hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            )?;
            for edge in edges {
                stmt.execute(params![
                    edge.id.0,
                    snapshot,
                    edge.caller_id.0,
                    edge.callee_id.0,
                    edge.callee_name,
                    edge.callee_class,
                    edge.line,
                    edge.column,
                    edge.kind.as_str(),
                    edge.optional_chaining,
                    edge.confidence,
                    edge.level.as_str(),
                    edge.source.as_str(),
                    edge.runtime_confirmed,
                    serialize_candidates(&edge.candidates),
                    edge.origin_file_hash,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Edges of one snapshot, in insertion order.
    pub fn edges_for_snapshot(&self, snapshot: &str) -> Result<Vec<CallEdge>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT edge_id, caller_id, callee_id, callee_name, callee_class, call_line,
                    call_column, call_kind, optional_chaining, conf, res_level, res_source,
                    runtime_confirmed, candidates, origin_file_hash
             FROM edge WHERE snapshot_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![snapshot], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, u32>(5)?,
                row.get::<_, u32>(6)?,
                row.get::<_, String>(7)?,
                row.get::<_, bool>(8)?,
                row.get::<_, f32>(9)?,
                row.get::<_, String>(10)?,
                row.get::<_, String>(11)?,
                row.get::<_, bool>(12)?,
                row.get::<_, String>(13)?,
                row.get::<_, String>(14)?,
            ))
        })?;

        let mut edges = Vec::new();
        for row in rows {
            let (
                edge_id,
                caller_id,
                callee_id,
                callee_name,
                callee_class,
                line,
                column,
                kind,
                optional_chaining,
                confidence,
                level,
                source,
                runtime_confirmed,
                candidates,
                origin_file_hash,
            ) = row?;
            edges.push(CallEdge {
                id: EdgeId(edge_id),
                caller_id: FunctionId(caller_id),
                callee_id: FunctionId(callee_id),
                callee_name,
                callee_class,
                kind: CallKind::from_str(&kind).ok_or_else(|| StorageError::Corrupt {
                    column: "call_kind",
                    reason: kind.clone(),
                })?,
                line,
                column,
                optional_chaining,
                confidence,
                level: ResolutionLevel::from_str(&level).ok_or_else(|| {
                    StorageError::Corrupt {
                        column: "res_level",
                        reason: level.clone(),
                    }
                })?,
                source: ResolutionSource::from_str(&source).ok_or_else(|| {
                    StorageError::Corrupt {
                        column: "res_source",
                        reason: source.clone(),
                    }
                })?,
                candidates: parse_candidates(&candidates)?,
                runtime_confirmed,
                origin_file_hash,
            });
        }
        Ok(edges)
    }

    pub fn functions_for_snapshot(
        &self,
        snapshot: &str,
    ) -> Result<Vec<FunctionRecord>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT function_id, name, class, file_path, start_line, end_line, lexical_path
             FROM function_index WHERE snapshot_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![snapshot], |row| {
            Ok(FunctionRecord {
                id: FunctionId(row.get(0)?),
                name: row.get(1)?,
                class_name: row.get(2)?,
                file_path: PathBuf::from(row.get::<_, String>(3)?),
                start_line: row.get(4)?,
                end_line: row.get(5)?,
                lexical_path: row.get(6)?,
            })
        })?;
        let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(collected)
    }

    pub fn clear_snapshot(&mut self, snapshot: &str) -> Result<(), StorageError> {
        let tx = self.conn.transaction()?;
        tx.execute("DELETE FROM edge WHERE snapshot_id = ?1", params![snapshot])?;
        tx.execute(
            "DELETE FROM function_index WHERE snapshot_id = ?1",
            params![snapshot],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Length-prefixed id list: `N|id0,id1,...`. The prefix is verified on
/// parse so a truncated row fails loudly instead of shrinking a candidate
/// set silently.
fn serialize_candidates(candidates: &[FunctionId]) -> String {
    let ids: Vec<&str> = candidates.iter().map(|id| id.0.as_str()).collect();
    format!("{}|{}", ids.len(), ids.join(","))
}

fn parse_candidates(raw: &str) -> Result<Vec<FunctionId>, StorageError> {
    let (count, rest) = raw.split_once('|').ok_or_else(|| StorageError::Corrupt {
        column: "candidates",
        reason: "missing length prefix".to_string(),
    })?;
    let count: usize = count.parse().map_err(|_| StorageError::Corrupt {
        column: "candidates",
        reason: format!("bad length prefix {count:?}"),
    })?;
    let ids: Vec<FunctionId> = if rest.is_empty() {
        Vec::new()
    } else {
        rest.split(',').map(|id| FunctionId(id.to_string())).collect()
    };
    if ids.len() != count {
        return Err(StorageError::Corrupt {
            column: "candidates",
            reason: format!("expected {count} ids, found {}", ids.len()),
        });
    }
    Ok(ids)
}
