//! Processed-file ledger (C4): a durable set of already-ingested
//! remote paths, backed by the same SQLite database as the blob store
//! so both can share one connection/transaction where convenient.

use crate::error::{IngestError, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection};
use std::sync::Arc;

pub struct Ledger {
    conn: Arc<Mutex<Connection>>,
}

impl Ledger {
    /// Share the same connection the [`crate::store::BlobStore`] opened
    /// (it already ran the schema that creates `processed_paths`).
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    pub fn seen(&self, path: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM processed_paths WHERE path = ?1)",
                params![path],
                |r| r.get(0),
            )
            .map_err(IngestError::from)?;
        Ok(exists)
    }

    /// Insert-if-absent; marking the same path twice is a no-op.
    pub fn mark(&self, path: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO processed_paths (path) VALUES (?1)",
            params![path],
        )
        .map_err(IngestError::from)?;
        Ok(())
    }
}
