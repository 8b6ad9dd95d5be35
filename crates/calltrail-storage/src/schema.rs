use super::StorageError;
use rusqlite::Connection;

const TABLE_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS edge (
        edge_id TEXT NOT NULL,
        snapshot_id TEXT NOT NULL,
        caller_id TEXT NOT NULL,
        callee_id TEXT NOT NULL,
        callee_name TEXT NOT NULL,
        callee_class TEXT,
        call_line INTEGER NOT NULL,
        call_column INTEGER NOT NULL,
        call_kind TEXT NOT NULL,
        optional_chaining INTEGER NOT NULL DEFAULT 0,
        conf REAL NOT NULL,
        res_level TEXT NOT NULL,
        res_source TEXT NOT NULL,
        runtime_confirmed INTEGER NOT NULL DEFAULT 0,
        candidates TEXT NOT NULL,
        origin_file_hash TEXT NOT NULL,
        PRIMARY KEY (edge_id, snapshot_id)
    )",
    "CREATE TABLE IF NOT EXISTS function_index (
        function_id TEXT NOT NULL,
        snapshot_id TEXT NOT NULL,
        name TEXT NOT NULL,
        class TEXT,
        file_path TEXT NOT NULL,
        start_line INTEGER NOT NULL,
        end_line INTEGER NOT NULL,
        lexical_path TEXT NOT NULL,
        PRIMARY KEY (function_id, snapshot_id)
    )",
];

const INDEX_STATEMENTS: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_edge_snapshot ON edge(snapshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_edge_caller ON edge(caller_id)",
    "CREATE INDEX IF NOT EXISTS idx_edge_callee ON edge(callee_id)",
    "CREATE INDEX IF NOT EXISTS idx_function_snapshot ON function_index(snapshot_id)",
    "CREATE INDEX IF NOT EXISTS idx_function_file ON function_index(file_path)",
];

pub(super) fn create_tables(conn: &Connection) -> Result<(), StorageError> {
    for statement in TABLE_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}

pub(super) fn create_indexes(conn: &Connection) -> Result<(), StorageError> {
    for statement in INDEX_STATEMENTS {
        conn.execute(statement, [])?;
    }
    Ok(())
}
