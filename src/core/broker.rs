//! Write serialization for the corpus store.
//!
//! A single exclusive writer lock exists per corpus file; readers open
//! fresh WAL connections and never block each other. The lock map is
//! process-wide so every `CorpusStore` handle for the same path shares one
//! writer lock.

use crate::core::db;
use crate::core::error::EngineError;
use rusqlite::Connection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

#[derive(Debug)]
pub struct CorpusBroker {
    db_path: PathBuf,
}

impl CorpusBroker {
    pub fn new(db_path: &Path) -> Self {
        Self {
            db_path: db_path.to_path_buf(),
        }
    }

    /// Execute a closure holding the corpus's exclusive writer lock.
    ///
    /// The connection is opened after the lock is acquired and dropped
    /// before it is released; no writer handle outlives the critical
    /// section.
    pub fn with_write<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let lock = writer_lock(&self.db_path)?;
        let _guard = lock
            .lock()
            .map_err(|_| EngineError::Internal("corpus writer lock poisoned".to_string()))?;
        let conn = db::db_connect(&self.db_path)?;
        f(&conn)
    }

    /// Execute a closure with a read connection. WAL mode allows unbounded
    /// concurrent readers; no lock is taken.
    pub fn with_read<F, R>(&self, f: F) -> Result<R, EngineError>
    where
        F: FnOnce(&Connection) -> Result<R, EngineError>,
    {
        let conn = db::db_connect(&self.db_path)?;
        f(&conn)
    }
}

fn writer_lock_map() -> &'static Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> {
    static LOCKS: OnceLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> = OnceLock::new();
    LOCKS.get_or_init(|| Mutex::new(HashMap::new()))
}

fn writer_lock(db_path: &Path) -> Result<Arc<Mutex<()>>, EngineError> {
    let mut map = writer_lock_map()
        .lock()
        .map_err(|_| EngineError::Internal("writer lock map poisoned".to_string()))?;
    Ok(map
        .entry(db_path.to_path_buf())
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writes_serialize_on_one_path() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("corpus.db");
        let broker = CorpusBroker::new(&db_path);
        broker
            .with_write(|conn| {
                conn.execute("CREATE TABLE t (n INTEGER)", [])?;
                Ok(())
            })
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..8 {
            let broker = CorpusBroker::new(&db_path);
            handles.push(std::thread::spawn(move || {
                broker
                    .with_write(|conn| {
                        conn.execute("INSERT INTO t(n) VALUES(?1)", [i])?;
                        Ok(())
                    })
                    .unwrap();
            }));
        }
        for h in handles {
            h.join().unwrap();
        }

        let count: i64 = broker
            .with_read(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?)
            })
            .unwrap();
        assert_eq!(count, 8);
    }
}
