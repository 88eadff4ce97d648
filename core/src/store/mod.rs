//! SQLite persistence layer.
//!
//! RULE: Only the store talks to the database.
//! The classifier works on in-memory snapshots and never executes SQL.

use crate::error::AuditResult;
use rusqlite::{params, Connection, OptionalExtension};

mod finding;
mod snapshot;

pub struct AuditStore {
    conn: Connection,
}

impl AuditStore {
    /// Open (or create) the audit database at `path`.
    pub fn open(path: &str) -> AuditResult<Self> {
        let conn = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_WRITE
                | rusqlite::OpenFlags::SQLITE_OPEN_CREATE
                | rusqlite::OpenFlags::SQLITE_OPEN_URI,
        )?;
        // WAL mode only for real files (shared-memory and :memory: ignore it).
        let _ = conn.execute_batch("PRAGMA journal_mode=WAL;");
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Open an in-memory database (used in tests).
    pub fn in_memory() -> AuditResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;
        Ok(Self { conn })
    }

    /// Apply all schema migrations in order.
    pub fn migrate(&self) -> AuditResult<()> {
        self.conn
            .execute_batch(include_str!("../../../migrations/001_snapshot.sql"))?;
        self.conn
            .execute_batch(include_str!("../../../migrations/002_findings.sql"))?;
        Ok(())
    }

    // ── Run ────────────────────────────────────────────────────

    pub fn run_event_count(&self, run_id: &str) -> AuditResult<Option<i64>> {
        let count = self
            .conn
            .query_row(
                "SELECT event_count FROM audit_run WHERE run_id = ?1",
                params![run_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(count)
    }
}
