//! Database connection primitives for the corpus store.
//!
//! One SQLite file per corpus holds every entity group as an append-only
//! table. Connections are opened fresh per operation and configured the same
//! way on every path; the single-writer guarantee lives in
//! [`crate::core::broker`], not here.

use crate::core::error::EngineError;
use rusqlite::Connection;
use std::path::Path;

/// Establish a SQLite connection with the engine's standard configuration.
///
/// Enables:
/// - WAL (Write-Ahead Logging) mode so readers never block each other
/// - Foreign key constraints
/// - 5-second busy timeout for lock contention
///
/// Do not mutate through a connection obtained here directly; route writes
/// through `CorpusBroker::with_write` so appends stay serialized and audited.
pub fn db_connect(db_path: &Path) -> Result<Connection, EngineError> {
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(std::time::Duration::from_secs(5))
        .map_err(EngineError::Rusqlite)?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))
        .map_err(EngineError::Rusqlite)?;
    conn.execute("PRAGMA foreign_keys=ON;", [])
        .map_err(EngineError::Rusqlite)?;
    Ok(conn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_connect_creates_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("corpus.db");
        let conn = db_connect(&path).unwrap();
        conn.execute("CREATE TABLE t (id INTEGER)", []).unwrap();
        assert!(path.exists());
    }
}
